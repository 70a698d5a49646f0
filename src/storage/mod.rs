//! Blob-store capability: runs reference their model, data, and result
//! files by opaque string keys owned by this layer.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Reference to a stored blob, as held by run records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobHandle {
    pub key: String,
    pub filename: String,
}

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("blob '{key}' not found")]
    NotFound { key: String },
    #[error("failed to download blob '{key}' to '{path}': {message}")]
    Download {
        key: String,
        path: String,
        message: String,
    },
    #[error("failed to upload '{path}': {message}")]
    Upload { path: String, message: String },
}

pub trait BlobStore: Send + Sync + 'static {
    fn download(&self, key: &str, local_path: &Path) -> Result<(), BlobStoreError>;
    fn upload(&self, local_path: &Path) -> Result<BlobHandle, BlobStoreError>;
}

pub type SharedBlobStore = Arc<dyn BlobStore>;

/// Directory-rooted store: every key is a path relative to the root.
/// Uploads mint a fresh UUID-prefixed key so distinct uploads of the same
/// filename never collide.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl BlobStore for FsBlobStore {
    fn download(&self, key: &str, local_path: &Path) -> Result<(), BlobStoreError> {
        let source = self.blob_path(key);
        if !source.is_file() {
            return Err(BlobStoreError::NotFound {
                key: key.to_string(),
            });
        }
        let download_error = |error: std::io::Error| BlobStoreError::Download {
            key: key.to_string(),
            path: local_path.display().to_string(),
            message: error.to_string(),
        };
        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent).map_err(download_error)?;
        }
        fs::copy(source.as_path(), local_path).map_err(download_error)?;
        Ok(())
    }

    fn upload(&self, local_path: &Path) -> Result<BlobHandle, BlobStoreError> {
        let filename = local_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| BlobStoreError::Upload {
                path: local_path.display().to_string(),
                message: String::from("path has no file name"),
            })?;
        let key = format!("{}/{}", Uuid::new_v4(), filename);
        let destination = self.blob_path(key.as_str());
        let upload_error = |error: std::io::Error| BlobStoreError::Upload {
            path: local_path.display().to_string(),
            message: error.to_string(),
        };
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(upload_error)?;
        }
        fs::copy(local_path, destination.as_path()).map_err(upload_error)?;
        Ok(BlobHandle { key, filename })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_root(label: &str) -> PathBuf {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();
        std::env::temp_dir().join(format!("gridsolve_blobs_{label}_{stamp}"))
    }

    #[test]
    fn uploads_then_downloads_the_same_bytes() {
        let root = temp_root("round");
        let store = FsBlobStore::new(root.as_path());

        let source = root.join("outbox/data.txt");
        fs::create_dir_all(source.parent().expect("source has a parent"))
            .expect("outbox should create");
        fs::write(source.as_path(), b"param x := 1;").expect("source should write");

        let handle = store.upload(source.as_path()).expect("upload should work");
        assert_eq!(handle.filename, "data.txt");
        assert!(handle.key.ends_with("/data.txt"));

        let fetched = root.join("inbox/data.txt");
        store
            .download(handle.key.as_str(), fetched.as_path())
            .expect("download should work");
        let raw = fs::read(fetched.as_path()).expect("downloaded file should read");
        assert_eq!(raw, b"param x := 1;");

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn distinct_uploads_of_the_same_filename_get_distinct_keys() {
        let root = temp_root("keys");
        let store = FsBlobStore::new(root.as_path());

        let source = root.join("data.txt");
        fs::create_dir_all(root.as_path()).expect("root should create");
        fs::write(source.as_path(), b"x").expect("source should write");

        let first = store.upload(source.as_path()).expect("first upload");
        let second = store.upload(source.as_path()).expect("second upload");
        assert_ne!(first.key, second.key);

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn download_of_a_missing_key_reports_not_found() {
        let root = temp_root("missing");
        let store = FsBlobStore::new(root.as_path());

        let error = store
            .download("no-such/key.txt", root.join("out.txt").as_path())
            .expect_err("missing blob should error");
        assert!(matches!(
            error,
            BlobStoreError::NotFound { key } if key == "no-such/key.txt"
        ));

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn download_creates_missing_parent_directories() {
        let root = temp_root("parents");
        let store = FsBlobStore::new(root.as_path());

        let source = root.join("model.txt");
        fs::create_dir_all(root.as_path()).expect("root should create");
        fs::write(source.as_path(), b"set YEAR;").expect("source should write");
        let handle = store.upload(source.as_path()).expect("upload should work");

        let nested = root.join("scratch/run-1/model.txt");
        store
            .download(handle.key.as_str(), nested.as_path())
            .expect("download should create parents");
        assert!(nested.is_file());

        let _ = fs::remove_dir_all(root);
    }
}

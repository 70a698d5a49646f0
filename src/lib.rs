pub mod compute;
pub mod pipeline;
pub mod run;
pub mod settings;
pub mod storage;

use std::path::PathBuf;

pub fn default_settings_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(settings::DEFAULT_SETTINGS_PATH)
}

use std::io::{self, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

use super::log::RunLog;

/// One external tool invocation: a program and its argument list. Arguments
/// are passed verbatim, never through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn display(&self) -> String {
        let mut rendered = self.program.clone();
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(arg.as_str());
        }
        rendered
    }
}

pub fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageResult {
    pub exit_code: i32,
    pub captured_output: String,
    pub elapsed: Duration,
}

#[derive(Debug, Error)]
pub enum CommandFailure {
    #[error("failed to launch '{command}': {source}")]
    Launch {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("'{command}' exited with code {exit_code}")]
    NonZeroExit {
        command: String,
        exit_code: i32,
        captured_output: String,
    },
    #[error("failed to capture output of '{command}': {source}")]
    OutputCapture {
        command: String,
        #[source]
        source: io::Error,
    },
}

pub trait CommandRunner: Send + Sync + 'static {
    fn run(&self, spec: &CommandSpec) -> Result<StageResult, CommandFailure>;
}

pub type SharedCommandRunner = Arc<dyn CommandRunner>;

/// Runs commands synchronously, teeing combined stdout and stderr to the
/// run log chunk-by-chunk as it arrives. The captured combined output rides
/// along on failure values.
#[derive(Clone)]
pub struct ShellCommandRunner {
    log: RunLog,
}

impl ShellCommandRunner {
    pub fn new(log: RunLog) -> Self {
        Self { log }
    }
}

impl CommandRunner for ShellCommandRunner {
    fn run(&self, spec: &CommandSpec) -> Result<StageResult, CommandFailure> {
        let command_line = spec.display();
        self.log.info(format!("$ {command_line}").as_str());
        let started = Instant::now();

        let mut child = Command::new(spec.program.as_str())
            .args(spec.args.iter().map(String::as_str))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CommandFailure::Launch {
                command: command_line.clone(),
                source,
            })?;

        let captured = Arc::new(Mutex::new(Vec::new()));
        let mut drains = Vec::new();
        if let Some(stream) = child.stdout.take() {
            drains.push(spawn_drain(stream, self.log.clone(), Arc::clone(&captured)));
        }
        if let Some(stream) = child.stderr.take() {
            drains.push(spawn_drain(stream, self.log.clone(), Arc::clone(&captured)));
        }

        let mut capture_error: Option<io::Error> = None;
        for drain in drains {
            match drain.join() {
                Ok(Ok(())) => {}
                Ok(Err(error)) => capture_error = Some(error),
                Err(_) => capture_error = Some(io::Error::other("output reader thread panicked")),
            }
        }

        // Always reap the child, even when capture failed part-way.
        let status = child.wait().map_err(|source| CommandFailure::OutputCapture {
            command: command_line.clone(),
            source,
        })?;

        if let Some(source) = capture_error {
            return Err(CommandFailure::OutputCapture {
                command: command_line,
                source,
            });
        }

        let captured_output = {
            let bytes = captured.lock().unwrap_or_else(PoisonError::into_inner);
            String::from_utf8_lossy(bytes.as_slice()).to_string()
        };
        let elapsed = started.elapsed();
        let exit_code = status.code().unwrap_or(-1);

        if exit_code != 0 {
            return Err(CommandFailure::NonZeroExit {
                command: command_line,
                exit_code,
                captured_output,
            });
        }

        self.log
            .info(format!("finished in {:.2}s", elapsed.as_secs_f64()).as_str());
        Ok(StageResult {
            exit_code,
            captured_output,
            elapsed,
        })
    }
}

fn spawn_drain<R>(
    mut stream: R,
    log: RunLog,
    captured: Arc<Mutex<Vec<u8>>>,
) -> thread::JoinHandle<io::Result<()>>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = [0u8; 1024];
        loop {
            let read = stream.read(&mut buf)?;
            if read == 0 {
                break;
            }
            let chunk = &buf[..read];
            log.write_raw(chunk);
            captured
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(chunk);
        }
        Ok(())
    })
}

use std::fs;
use std::io::{self, Read};
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::QuotaError;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirOwner {
    pub name: String,
    pub uid: u32,
}

pub trait SystemExecutor {
    /// A non-zero exit is not an error here; callers decide what a status means.
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, QuotaError>;

    fn exists(&self, path: &Path) -> bool;

    /// `Ok(None)` when the attribute is not set on `path`.
    fn read_xattr(&self, path: &Path, name: &str) -> Result<Option<Vec<u8>>, QuotaError>;

    fn child_owners(&self, path: &Path) -> Result<Vec<DirOwner>, QuotaError>;
}

#[derive(Debug, Clone)]
pub struct HostExecutor {
    timeout: Duration,
}

impl HostExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for HostExecutor {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl SystemExecutor for HostExecutor {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, QuotaError> {
        debug!("running {} {}", program, args.join(" "));
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| match err.kind() {
                io::ErrorKind::NotFound => QuotaError::ExternalToolUnavailable {
                    tool: program.to_string(),
                },
                _ => QuotaError::io(program, err),
            })?;

        // Drain both pipes on their own threads so a chatty child cannot
        // block on a full pipe while we poll for exit.
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_reader = thread::spawn(move || drain(stdout));
        let stderr_reader = thread::spawn(move || drain(stderr));

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(QuotaError::CommandTimedOut {
                        program: program.to_string(),
                        timeout: self.timeout,
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(err) => return Err(QuotaError::io(program, err)),
            }
        };

        Ok(CommandOutput {
            status: exit_code(status),
            stdout: stdout_reader.join().unwrap_or_default(),
            stderr: stderr_reader.join().unwrap_or_default(),
        })
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_xattr(&self, path: &Path, name: &str) -> Result<Option<Vec<u8>>, QuotaError> {
        match xattr::get(path, name) {
            Ok(value) => Ok(value),
            // A filesystem without this attribute namespace has no such key.
            Err(err) if attribute_unsupported(&err) => {
                debug!("{name} unsupported on {}: {err}", path.display());
                Ok(None)
            }
            Err(err) => Err(QuotaError::io(path, err)),
        }
    }

    fn child_owners(&self, path: &Path) -> Result<Vec<DirOwner>, QuotaError> {
        let entries = fs::read_dir(path).map_err(|err| QuotaError::io(path, err))?;
        let mut owners = Vec::new();
        for entry in entries.flatten() {
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            owners.push(DirOwner {
                name: entry.file_name().to_string_lossy().to_string(),
                uid: metadata.uid(),
            });
        }
        Ok(owners)
    }
}

fn drain<R: Read>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn attribute_unsupported(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::Unsupported
        || matches!(
            err.raw_os_error(),
            Some(code) if code == libc::ENOTSUP || code == libc::EOPNOTSUPP
        )
}

fn exit_code(status: ExitStatus) -> i32 {
    // Killed by a signal: no code, report as a generic failure.
    status.code().unwrap_or(-1)
}

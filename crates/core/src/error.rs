use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("invalid path specification `{spec}`: expected path:filesystem[:alias]")]
    InvalidPathSpec { spec: String },

    #[error("external tool `{tool}` is not available")]
    ExternalToolUnavailable { tool: String },

    #[error("`{program}` exited with status {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: i32,
        stderr: String,
    },

    #[error("`{program}` did not finish within {timeout:?}")]
    CommandTimedOut { program: String, timeout: Duration },

    #[error("unexpected output: {detail}")]
    RawOutputParse { detail: String },

    #[error("attribute `{name}` unavailable on {}", path.display())]
    AttributeUnavailable { path: PathBuf, name: String },

    #[error("path not found: {}", path.display())]
    PathNotFound { path: PathBuf },

    #[error("permission denied: {detail}")]
    PermissionDenied { detail: String },

    #[error("unknown user `{user}`")]
    UnknownUser { user: String },

    #[error("missing credential: {detail}")]
    MissingCredential { detail: String },

    #[error("mail transport failed: {detail}")]
    Transport { status: Option<u16>, detail: String },

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl QuotaError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::PermissionDenied {
            return Self::PermissionDenied {
                detail: format!("{}: {}", path.display(), source),
            };
        }
        Self::Io { path, source }
    }
}

use tracing::{debug, error, warn};

use crate::error::QuotaError;
use crate::executor::SystemExecutor;
use crate::model::{FilesystemKind, QuotaRecord};
use crate::reader::{QuotaReader, ReadTarget};

const KIB: u64 = 1024;
const FIELD_COUNT: usize = 8;

// `quota` cannot take both a filesystem and a user, so the last line of the
// per-user listing is taken as this path's row.
#[derive(Debug, Clone)]
pub struct XfsReader {
    quota_bin: String,
}

impl XfsReader {
    pub fn new(quota_bin: impl Into<String>) -> Self {
        Self {
            quota_bin: quota_bin.into(),
        }
    }

    fn args(user: &str) -> Vec<String> {
        ["-w", "--hide-device", "-p", "-u", user]
            .iter()
            .map(|arg| arg.to_string())
            .collect()
    }
}

impl QuotaReader for XfsReader {
    fn kind(&self) -> FilesystemKind {
        FilesystemKind::Xfs
    }

    fn read(&self, exec: &dyn SystemExecutor, target: &ReadTarget<'_>) -> Option<QuotaRecord> {
        // `quota` exits non-zero when the user is over quota, so the status
        // says nothing about whether the listing is usable.
        let output = match exec.run(&self.quota_bin, &Self::args(target.user)) {
            Ok(output) => output,
            Err(QuotaError::ExternalToolUnavailable { tool }) => {
                error!("no such file or directory: {tool}. Is 'quota' installed?");
                return None;
            }
            Err(err) => {
                error!("quota lookup for {} failed: {err}", target.user);
                return None;
            }
        };
        debug!("quota exited with {} for {}", output.status, target.user);

        let fields = match parse_quota_line(&output.stdout) {
            Ok(fields) => fields,
            Err(err) => {
                warn!(
                    "an error occurred processing quota for {}: {err}",
                    target.user
                );
                return None;
            }
        };

        Some(QuotaRecord {
            user: target.user.to_string(),
            path: target.path.to_string_lossy().to_string(),
            alias: target.alias.to_string(),
            filesystem: FilesystemKind::Xfs,
            blocks_used: Some(fields[0].saturating_mul(KIB)),
            blocks_soft: Some(fields[1].saturating_mul(KIB)),
            blocks_hard: Some(fields[2].saturating_mul(KIB)),
            blocks_grace_days: Some(fields[3]),
            files_used: Some(fields[4]),
            files_soft: Some(fields[5]),
            files_hard: Some(fields[6]),
            files_grace_days: Some(fields[7]),
            blocks_pct: None,
            files_pct: None,
        })
    }
}

pub fn parse_quota_line(raw: &str) -> Result<[u64; FIELD_COUNT], QuotaError> {
    let line = raw.trim().lines().last().unwrap_or_default().replace('*', "");

    let tokens = line
        .split_whitespace()
        .map(|token| {
            token.parse::<u64>().map_err(|_| QuotaError::RawOutputParse {
                detail: format!("invalid literal `{token}` in `{}`", line.trim()),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if tokens.len() < FIELD_COUNT {
        return Err(QuotaError::RawOutputParse {
            detail: format!(
                "expected {FIELD_COUNT} fields, found {} in `{}`",
                tokens.len(),
                line.trim()
            ),
        });
    }

    let mut fields = [0_u64; FIELD_COUNT];
    fields.copy_from_slice(&tokens[..FIELD_COUNT]);
    Ok(fields)
}

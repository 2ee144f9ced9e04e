use std::path::Path;

use tracing::error;

use crate::error::QuotaError;
use crate::executor::SystemExecutor;
use crate::model::{FilesystemKind, QuotaRecord};
use crate::reader::{QuotaReader, ReadTarget};

const MAX_BYTES: &str = "ceph.quota.max_bytes";
const RBYTES: &str = "ceph.dir.rbytes";
const MAX_FILES: &str = "ceph.quota.max_files";
const RFILES: &str = "ceph.dir.rfiles";

/// Reads the live quota counters CephFS exposes as extended attributes on
/// each user's directory (`<path>/<user>`). All four must be present.
#[derive(Debug, Clone, Copy, Default)]
pub struct CephReader;

impl QuotaReader for CephReader {
    fn kind(&self) -> FilesystemKind {
        FilesystemKind::Ceph
    }

    fn read(&self, exec: &dyn SystemExecutor, target: &ReadTarget<'_>) -> Option<QuotaRecord> {
        let dir = target.path.join(target.user);
        if !exec.exists(&dir) {
            error!("could not find {}", dir.display());
            return None;
        }

        let counters = [MAX_BYTES, RBYTES, MAX_FILES, RFILES]
            .into_iter()
            .map(|name| read_counter(exec, &dir, name))
            .collect::<Result<Vec<_>, _>>();

        let counters = match counters {
            Ok(counters) => counters,
            Err(QuotaError::AttributeUnavailable { name, .. }) => {
                error!("could not find key {name}. Is this a Ceph filesystem?");
                return None;
            }
            Err(err) => {
                error!("could not read ceph quota for {}: {err}", dir.display());
                return None;
            }
        };
        let (max_bytes, rbytes, max_files, rfiles) =
            (counters[0], counters[1], counters[2], counters[3]);

        Some(QuotaRecord {
            user: target.user.to_string(),
            path: target.path.to_string_lossy().to_string(),
            alias: target.alias.to_string(),
            filesystem: FilesystemKind::Ceph,
            blocks_used: Some(rbytes),
            blocks_soft: Some(max_bytes),
            blocks_hard: Some(max_bytes),
            blocks_grace_days: None,
            files_used: Some(rfiles),
            files_soft: Some(max_files),
            files_hard: Some(max_files),
            files_grace_days: None,
            blocks_pct: None,
            files_pct: None,
        })
    }
}

fn read_counter(exec: &dyn SystemExecutor, dir: &Path, name: &str) -> Result<u64, QuotaError> {
    let unavailable = || QuotaError::AttributeUnavailable {
        path: dir.to_path_buf(),
        name: name.to_string(),
    };
    let raw = exec.read_xattr(dir, name)?.ok_or_else(unavailable)?;
    String::from_utf8_lossy(&raw)
        .trim()
        .parse::<u64>()
        .map_err(|_| QuotaError::RawOutputParse {
            detail: format!("{name} on {} is not an integer", dir.display()),
        })
}

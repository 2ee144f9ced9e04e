use tracing::{debug, error, warn};

use crate::executor::SystemExecutor;
use crate::model::{FilesystemKind, QuotaRecord};
use crate::reader::{QuotaReader, ReadTarget};

const UNLIMITED: &[&str] = &["none", "-"];

#[derive(Debug, Clone)]
pub struct ZfsReader {
    zfs_bin: String,
}

impl ZfsReader {
    pub fn new(zfs_bin: impl Into<String>) -> Self {
        Self {
            zfs_bin: zfs_bin.into(),
        }
    }

    fn property(
        &self,
        exec: &dyn SystemExecutor,
        property: &str,
        identity: &str,
        target: &ReadTarget<'_>,
    ) -> Option<u64> {
        let args = vec![
            "get".to_string(),
            "-H".to_string(),
            "-p".to_string(),
            "-o".to_string(),
            "value".to_string(),
            format!("{property}@{identity}"),
            target.path.to_string_lossy().to_string(),
        ];

        let output = match exec.run(&self.zfs_bin, &args) {
            Ok(output) => output,
            Err(err) => {
                error!(
                    "zfs query {property}@{identity} on {} failed: {err}",
                    target.path.display()
                );
                return None;
            }
        };
        if !output.success() {
            error!(
                "zfs query {property}@{identity} on {} exited with {}: {}",
                target.path.display(),
                output.status,
                output.stderr.trim()
            );
            return None;
        }

        parse_property(&output.stdout).unwrap_or_else(|| {
            warn!(
                "zfs query {property}@{identity} returned non-numeric `{}`",
                output.stdout.trim()
            );
            None
        })
    }
}

impl QuotaReader for ZfsReader {
    fn kind(&self) -> FilesystemKind {
        FilesystemKind::Zfs
    }

    fn read(&self, exec: &dyn SystemExecutor, target: &ReadTarget<'_>) -> Option<QuotaRecord> {
        let identity = target.user;
        let user = if is_numeric(identity) {
            resolve_owner_name(exec, target).unwrap_or_else(|| identity.to_string())
        } else {
            identity.to_string()
        };

        let quota = self.property(exec, "userquota", identity, target);
        let used = self.property(exec, "userused", identity, target);
        let objused = self.property(exec, "userobjused", identity, target);
        let objquota = self.property(exec, "userobjquota", identity, target);

        Some(QuotaRecord {
            user,
            path: target.path.to_string_lossy().to_string(),
            alias: target.alias.to_string(),
            filesystem: FilesystemKind::Zfs,
            blocks_used: used,
            blocks_soft: quota,
            blocks_hard: quota,
            blocks_grace_days: None,
            files_used: objused,
            files_soft: objquota,
            files_hard: objquota,
            files_grace_days: None,
            blocks_pct: None,
            files_pct: None,
        })
    }
}

fn parse_property(raw: &str) -> Option<Option<u64>> {
    let value = raw.trim();
    if UNLIMITED.contains(&value) {
        return Some(None);
    }
    value.parse::<u64>().ok().map(Some)
}

fn is_numeric(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}

/// Finds a readable name for a numeric identity by looking for a child of
/// the dataset root owned by that uid. First match in iteration order wins,
/// so ties between several owned entries are unspecified.
fn resolve_owner_name(exec: &dyn SystemExecutor, target: &ReadTarget<'_>) -> Option<String> {
    let uid = target
        .uid
        .or_else(|| target.user.parse::<u32>().ok())?;
    let children = match exec.child_owners(target.path) {
        Ok(children) => children,
        Err(err) => {
            warn!("could not list {}: {err}", target.path.display());
            return None;
        }
    };
    let found = children.into_iter().find(|child| child.uid == uid);
    match &found {
        Some(child) => debug!("resolved uid {uid} to {}", child.name),
        None => debug!("no entry under {} owned by {uid}", target.path.display()),
    }
    found.map(|child| child.name)
}

use std::path::Path;

use crate::ceph::CephReader;
use crate::config::QuotaConfig;
use crate::executor::SystemExecutor;
use crate::model::{FilesystemKind, QuotaRecord};
use crate::xfs::XfsReader;
use crate::zfs::ZfsReader;

#[derive(Debug, Clone, Copy)]
pub struct ReadTarget<'a> {
    pub user: &'a str,
    pub uid: Option<u32>,
    pub path: &'a Path,
    pub alias: &'a str,
}

/// One storage backend's native quota representation.
///
/// Implementations never fail past this boundary: every problem is logged
/// and yields `None`, and the caller just leaves the record out.
pub trait QuotaReader {
    fn kind(&self) -> FilesystemKind;

    fn read(&self, exec: &dyn SystemExecutor, target: &ReadTarget<'_>) -> Option<QuotaRecord>;
}

#[derive(Debug, Clone)]
pub struct ReaderSet {
    xfs: XfsReader,
    zfs: ZfsReader,
    ceph: CephReader,
}

impl ReaderSet {
    pub fn new(config: &QuotaConfig) -> Self {
        Self {
            xfs: XfsReader::new(config.quota_bin.clone()),
            zfs: ZfsReader::new(config.zfs_bin.clone()),
            ceph: CephReader,
        }
    }

    pub fn reader(&self, kind: FilesystemKind) -> &dyn QuotaReader {
        match kind {
            FilesystemKind::Xfs => &self.xfs,
            FilesystemKind::Zfs => &self.zfs,
            FilesystemKind::Ceph => &self.ceph,
        }
    }
}

impl Default for ReaderSet {
    fn default() -> Self {
        Self::new(&QuotaConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::ReaderSet;
    use crate::model::FilesystemKind;

    #[test]
    fn dispatches_by_tag() {
        let readers = ReaderSet::default();
        for kind in [FilesystemKind::Xfs, FilesystemKind::Zfs, FilesystemKind::Ceph] {
            assert_eq!(readers.reader(kind).kind(), kind);
        }
    }
}

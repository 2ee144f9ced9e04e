use std::fs::Permissions;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::QuotaError;
use crate::model::{QuotaRecord, TableStyle};
use crate::report::login_report;

pub const OVER_QUOTA_WARNING: &str =
    "WARNING: you are over quota on one or more filesystems. Please remove unneeded files.";

pub fn compose_login_banner(records: &[QuotaRecord], with_header: bool) -> String {
    let mut out = login_report(records, TableStyle::Plain, with_header);
    out.push('\n');
    if records.iter().any(QuotaRecord::is_over_quota) {
        out.push_str(OVER_QUOTA_WARNING);
    }
    out.push('\n');
    out
}

#[derive(Debug, Clone)]
pub struct ReportPublisher {
    report_name: String,
}

/// A fully written report waiting to replace the published one. Dropping it
/// without [`StagedReport::commit`] removes the temporary file and leaves the
/// published report untouched.
#[derive(Debug)]
pub struct StagedReport {
    temp: NamedTempFile,
    target: PathBuf,
}

impl ReportPublisher {
    pub fn new(report_name: impl Into<String>) -> Self {
        Self {
            report_name: report_name.into(),
        }
    }

    pub fn target(&self, dir: &Path) -> PathBuf {
        dir.join(&self.report_name)
    }

    pub fn stage(&self, dir: &Path, contents: &str) -> Result<StagedReport, QuotaError> {
        let target = self.target(dir);
        let mut temp = tempfile::Builder::new()
            .prefix(&format!("{}.", self.report_name))
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|err| QuotaError::io(dir, err))?;

        temp.write_all(contents.as_bytes())
            .and_then(|_| temp.as_file().sync_all())
            .and_then(|_| {
                temp.as_file()
                    .set_permissions(Permissions::from_mode(0o644))
            })
            .map_err(|err| QuotaError::io(temp.path(), err))?;

        Ok(StagedReport { temp, target })
    }

    pub fn publish(&self, dir: &Path, contents: &str) -> Result<PathBuf, QuotaError> {
        self.stage(dir, contents)?.commit()
    }
}

impl StagedReport {
    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn commit(self) -> Result<PathBuf, QuotaError> {
        let StagedReport { temp, target } = self;
        temp.persist(&target)
            .map_err(|err| QuotaError::io(&target, err.error))?;
        debug!("published {}", target.display());
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    use tempfile::TempDir;

    use super::{compose_login_banner, ReportPublisher, OVER_QUOTA_WARNING};
    use crate::error::QuotaError;
    use crate::model::{FilesystemKind, QuotaRecord};

    fn record(pct: Option<f64>) -> QuotaRecord {
        QuotaRecord {
            user: "alice".to_string(),
            path: "/home".to_string(),
            alias: "Home".to_string(),
            filesystem: FilesystemKind::Xfs,
            blocks_used: Some(1024),
            blocks_soft: Some(1024),
            blocks_hard: Some(1024),
            blocks_grace_days: None,
            files_used: Some(1),
            files_soft: None,
            files_hard: None,
            files_grace_days: None,
            blocks_pct: pct,
            files_pct: None,
        }
    }

    fn temp_entries(temp: &TempDir) -> Vec<String> {
        fs::read_dir(temp.path())
            .expect("read dir")
            .flatten()
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .filter(|name| name.ends_with(".tmp"))
            .collect()
    }

    #[test]
    fn publish_replaces_previous_report() {
        let temp = TempDir::new().expect("tempdir");
        let publisher = ReportPublisher::new(".quota_report");
        fs::write(temp.path().join(".quota_report"), "old").expect("seed");

        let path = publisher.publish(temp.path(), "new").expect("publish");
        assert_eq!(fs::read_to_string(&path).expect("read"), "new");
        assert_eq!(
            fs::metadata(&path).expect("meta").permissions().mode() & 0o777,
            0o644
        );
        assert!(temp_entries(&temp).is_empty());
    }

    #[test]
    fn abandoned_stage_leaves_previous_report_intact() {
        let temp = TempDir::new().expect("tempdir");
        let publisher = ReportPublisher::new(".quota_report");
        fs::write(temp.path().join(".quota_report"), "previous").expect("seed");

        let staged = publisher
            .stage(temp.path(), "half-finished")
            .expect("stage");
        assert_eq!(temp_entries(&temp).len(), 1);
        drop(staged);

        assert_eq!(
            fs::read_to_string(temp.path().join(".quota_report")).expect("read"),
            "previous"
        );
        assert!(temp_entries(&temp).is_empty());
    }

    #[test]
    fn abandoned_stage_without_previous_report_creates_nothing() {
        let temp = TempDir::new().expect("tempdir");
        let publisher = ReportPublisher::new(".quota_report");
        drop(publisher.stage(temp.path(), "x").expect("stage"));
        assert!(!temp.path().join(".quota_report").exists());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let temp = TempDir::new().expect("tempdir");
        let publisher = ReportPublisher::new(".quota_report");
        let result = publisher.publish(&temp.path().join("missing"), "x");
        assert!(matches!(result, Err(QuotaError::Io { .. })));
    }

    #[test]
    fn banner_ends_with_warning_only_when_over_quota() {
        let over = compose_login_banner(&[record(Some(150.0))], true);
        assert!(over.trim_end().ends_with(OVER_QUOTA_WARNING));
        assert!(over.contains("Home"));

        let fine = compose_login_banner(&[record(Some(50.0))], false);
        assert!(!fine.contains(OVER_QUOTA_WARNING));
        assert!(fine.ends_with("\n\n"));
    }
}

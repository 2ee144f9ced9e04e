use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::QuotaError;

pub const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuotaRecord {
    pub user: String,
    pub path: String,
    pub alias: String,
    pub filesystem: FilesystemKind,
    pub blocks_used: Option<u64>,
    pub blocks_soft: Option<u64>,
    pub blocks_hard: Option<u64>,
    #[serde(default)]
    pub blocks_grace_days: Option<u64>,
    pub files_used: Option<u64>,
    pub files_soft: Option<u64>,
    pub files_hard: Option<u64>,
    #[serde(default)]
    pub files_grace_days: Option<u64>,
    #[serde(default)]
    pub blocks_pct: Option<f64>,
    #[serde(default)]
    pub files_pct: Option<f64>,
}

impl QuotaRecord {
    pub fn is_over_quota(&self) -> bool {
        self.blocks_pct.is_some_and(|pct| pct > 100.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FilesystemKind {
    Xfs,
    Zfs,
    Ceph,
}

impl FilesystemKind {
    /// Resolves a backend tag by case-insensitive substring, so `xfs_home`
    /// and `CephFS` both select a backend.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.to_lowercase();
        if tag.contains("xfs") {
            Some(Self::Xfs)
        } else if tag.contains("ceph") {
            Some(Self::Ceph)
        } else if tag.contains("zfs") {
            Some(Self::Zfs)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Xfs => "xfs",
            Self::Zfs => "zfs",
            Self::Ceph => "ceph",
        }
    }
}

impl fmt::Display for FilesystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `path:filesystem[:alias]` argument. The tag is kept raw so that an
/// unknown backend is reported at read time instead of aborting the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSpec {
    pub path: PathBuf,
    pub tag: String,
    pub alias: String,
}

impl PathSpec {
    pub fn parse(raw: &str) -> Result<Self, QuotaError> {
        let mut parts = raw.splitn(3, ':');
        let path = parts.next().unwrap_or_default().trim();
        let tag = parts.next().map(str::trim).unwrap_or_default();

        if path.is_empty() || tag.is_empty() {
            return Err(QuotaError::InvalidPathSpec {
                spec: raw.to_string(),
            });
        }

        let alias = match parts.next().map(str::trim) {
            Some(alias) if !alias.is_empty() => alias.to_string(),
            _ => path.to_string(),
        };

        Ok(Self {
            path: PathBuf::from(path),
            tag: tag.to_string(),
            alias,
        })
    }

    pub fn filesystem(&self) -> Option<FilesystemKind> {
        FilesystemKind::from_tag(&self.tag)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Full,
    #[default]
    Short,
    Login,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TableStyle {
    Plain,
    #[default]
    Simple,
    Github,
    Grid,
    Psql,
    Rounded,
    Html,
}

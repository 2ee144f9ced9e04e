pub mod ceph;
pub mod collect;
pub mod config;
pub mod error;
pub mod executor;
pub mod model;
pub mod normalize;
pub mod notify;
pub mod publish;
pub mod reader;
pub mod report;
pub mod throttle;
pub mod users;
pub mod xfs;
pub mod zfs;

#[cfg(test)]
mod testing;

pub use ceph::CephReader;
pub use collect::{parse_path_specs, QuotaCollector};
pub use config::{MailConfig, QuotaConfig};
pub use error::QuotaError;
pub use executor::{CommandOutput, DirOwner, HostExecutor, SystemExecutor};
pub use model::{FilesystemKind, PathSpec, QuotaRecord, ReportKind, TableStyle};
pub use normalize::normalize;
pub use notify::{
    forward_address, group_by_user, AlertTemplate, MailMessage, MailTransport,
    NotificationOutcome, NotificationStatus, OverQuotaNotifier,
};
pub use publish::{compose_login_banner, ReportPublisher, StagedReport, OVER_QUOTA_WARNING};
pub use reader::{QuotaReader, ReadTarget, ReaderSet};
pub use report::{full_report, login_report, only_over_quota, render_report, short_report, to_gib};
pub use throttle::{NotificationClock, SentinelClock, ThrottleDecision, DEFAULT_NOTIFY_WINDOW};
pub use users::{
    accounts_above, current_account, running_as_root, AccountDirectory, QuotaSubject,
    StaticAccounts, SystemAccounts, UserAccount,
};
pub use xfs::XfsReader;
pub use zfs::ZfsReader;

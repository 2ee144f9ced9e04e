pub mod mailer;
pub mod service;

pub use mailer::MailgunTransport;
pub use service::{
    collect_quotas, hostname, notify_over_quota, notify_over_quota_with, publish_login_reports,
    resolve_subjects, send_report, send_report_with, PublishOutcome, UserSelection,
};

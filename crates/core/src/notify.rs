use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::QuotaError;
use crate::model::{QuotaRecord, TableStyle};
use crate::report::{only_over_quota, short_report};
use crate::throttle::{NotificationClock, ThrottleDecision};
use crate::users::AccountDirectory;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

pub trait MailTransport {
    fn send(&self, message: &MailMessage) -> Result<u16, QuotaError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum NotificationStatus {
    Sent { code: u16 },
    Cooldown,
    Refused,
    UnknownUser,
    NoForwardAddress,
    TransportFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationOutcome {
    pub user: String,
    #[serde(flatten)]
    pub status: NotificationStatus,
}

#[derive(Debug, Clone)]
pub struct AlertTemplate {
    pub hostname: String,
    pub subject: String,
    pub support_contact: String,
}

impl AlertTemplate {
    pub fn body(&self, report_html: &str) -> String {
        format!(
            "<p> Your user account on your login node ({}) has gone over your data quota on \
             one or more file systems: <br>{}<br>Please remove any unneeded files as soon as \
             possible and reply to this email (or contact us at {}) if you need any additional \
             help or have questions/comments.<br><br>Thanks, <br>Research Facilitation Team</p>",
            self.hostname, report_html, self.support_contact
        )
    }
}

pub struct OverQuotaNotifier<'a> {
    pub clock: &'a dyn NotificationClock,
    pub accounts: &'a dyn AccountDirectory,
    pub transport: &'a dyn MailTransport,
    pub template: AlertTemplate,
    pub forward_file: String,
}

impl OverQuotaNotifier<'_> {
    pub fn notify(&self, records: &[QuotaRecord]) -> Vec<NotificationOutcome> {
        group_by_user(&only_over_quota(records))
            .into_iter()
            .map(|(user, records)| {
                let status = self.notify_user(&user, &records);
                NotificationOutcome { user, status }
            })
            .collect()
    }

    fn notify_user(&self, user: &str, records: &[QuotaRecord]) -> NotificationStatus {
        let account = match self.accounts.lookup(user) {
            Ok(account) => account,
            Err(err) => {
                error!("cannot notify {user}: {err}");
                return NotificationStatus::UnknownUser;
            }
        };

        match self.clock.check_and_refresh(&account) {
            ThrottleDecision::Eligible => {}
            ThrottleDecision::Cooldown => {
                info!("{user} was notified recently; skipping");
                return NotificationStatus::Cooldown;
            }
            ThrottleDecision::Refused => return NotificationStatus::Refused,
        }

        let Some(to) = forward_address(&account.home.join(&self.forward_file)) else {
            error!("forward file does not exist! User {user} cannot be notified!");
            return NotificationStatus::NoForwardAddress;
        };

        let message = MailMessage {
            to,
            subject: self.template.subject.clone(),
            html: self.template.body(&short_report(records, TableStyle::Html)),
        };
        match self.transport.send(&message) {
            Ok(code) => {
                info!("notified {user}: response code is {code}");
                NotificationStatus::Sent { code }
            }
            Err(err) => {
                error!("notification to {user} failed: {err}");
                NotificationStatus::TransportFailed
            }
        }
    }
}

pub fn group_by_user(records: &[QuotaRecord]) -> BTreeMap<String, Vec<QuotaRecord>> {
    let mut groups: BTreeMap<String, Vec<QuotaRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry(record.user.clone())
            .or_default()
            .push(record.clone());
    }
    groups
}

pub fn forward_address(path: &Path) -> Option<String> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            warn!("cannot read {}: {err}", path.display());
            return None;
        }
    };
    contents
        .lines()
        .flat_map(|line| line.split(','))
        .map(str::trim)
        .find(|entry| !entry.is_empty() && !entry.starts_with('#'))
        .map(|entry| entry.trim_start_matches('\\').to_string())
}

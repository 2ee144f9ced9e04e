use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use nix::unistd::{geteuid, gethostname};
use quota_report_core::{
    accounts_above, compose_login_banner, current_account, group_by_user, parse_path_specs,
    running_as_root, AccountDirectory, AlertTemplate, HostExecutor, MailMessage, MailTransport,
    NotificationOutcome, OverQuotaNotifier, QuotaCollector, QuotaConfig, QuotaError, QuotaRecord,
    QuotaSubject, ReaderSet, ReportPublisher, SentinelClock, SystemAccounts,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::mailer::MailgunTransport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserSelection {
    Current,
    All,
    // Root only, unless it names the caller.
    Named(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublishOutcome {
    pub user: String,
    pub path: Option<PathBuf>,
    pub error: Option<String>,
}

pub fn resolve_subjects(selection: &UserSelection, config: &QuotaConfig) -> Result<Vec<QuotaSubject>> {
    match selection {
        UserSelection::Current => {
            debug!("getting information for current user");
            let account = current_account().context("cannot resolve the current user")?;
            Ok(vec![QuotaSubject::from(&account)])
        }
        UserSelection::All => {
            debug!("getting information for all users above uid {}", config.min_uid);
            Ok(accounts_above(config.min_uid)
                .iter()
                .map(QuotaSubject::from)
                .collect())
        }
        UserSelection::Named(names) => {
            debug!("getting information for {} named user(s)", names.len());
            if !running_as_root() {
                let me = current_account().context("cannot resolve the current user")?;
                let uid = me.uid.to_string();
                if names.iter().any(|name| *name != me.name && *name != uid) {
                    return Err(QuotaError::PermissionDenied {
                        detail: "only root can get quotas for another user".to_string(),
                    }
                    .into());
                }
            }
            Ok(names.iter().map(String::as_str).map(subject_for).collect())
        }
    }
}

fn subject_for(name: &str) -> QuotaSubject {
    match SystemAccounts.lookup(name) {
        Ok(account) => QuotaSubject {
            identity: name.to_string(),
            uid: Some(account.uid),
        },
        Err(_) => QuotaSubject::named(name),
    }
}

/// Reads every selected user on every path. A malformed path list is the
/// only failure; per-record problems are logged and skipped.
pub fn collect_quotas(
    config: &QuotaConfig,
    subjects: &[QuotaSubject],
    paths: &[String],
) -> Result<Vec<QuotaRecord>> {
    if paths.is_empty() {
        bail!("you must specify a path, e.g. /home:xfs");
    }
    let specs = parse_path_specs(paths)?;
    let collector = QuotaCollector::new(
        HostExecutor::new(config.command_timeout()),
        ReaderSet::new(config),
    );
    let records = collector.collect(subjects, &specs);
    info!(
        "collected {} record(s) for {} user(s) on {} path(s)",
        records.len(),
        subjects.len(),
        specs.len()
    );
    Ok(records)
}

pub fn hostname() -> String {
    gethostname()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "localhost".to_string())
}

pub fn send_report(config: &QuotaConfig, to: &str, report: &str) -> Result<u16> {
    let transport = MailgunTransport::new(&config.mail).context("cannot send report")?;
    send_report_with(&transport, to, report)
}

pub fn send_report_with(transport: &dyn MailTransport, to: &str, report: &str) -> Result<u16> {
    let message = MailMessage {
        to: to.to_string(),
        subject: format!("Quota report for {}", hostname()),
        html: report.to_string(),
    };
    let code = transport
        .send(&message)
        .with_context(|| format!("failed to mail report to {to}"))?;
    Ok(code)
}

pub fn notify_over_quota(
    config: &QuotaConfig,
    records: &[QuotaRecord],
) -> Result<Vec<NotificationOutcome>> {
    let transport = MailgunTransport::new(&config.mail).context("cannot notify users")?;
    Ok(notify_over_quota_with(
        config,
        records,
        &SystemAccounts,
        &transport,
    ))
}

pub fn notify_over_quota_with(
    config: &QuotaConfig,
    records: &[QuotaRecord],
    accounts: &dyn AccountDirectory,
    transport: &dyn MailTransport,
) -> Vec<NotificationOutcome> {
    // Sentinels are created by this process; anything else owning one is
    // not trusted.
    let clock = SentinelClock::new(config.sentinel_name.clone(), config.notify_window())
        .with_trusted_owner(geteuid().as_raw());
    let notifier = OverQuotaNotifier {
        clock: &clock,
        accounts,
        transport,
        template: AlertTemplate {
            hostname: hostname(),
            subject: config.mail.subject.clone(),
            support_contact: config.mail.support_contact.clone(),
        },
        forward_file: config.forward_file.clone(),
    };
    notifier.notify(records)
}

pub fn publish_login_reports(
    config: &QuotaConfig,
    records: &[QuotaRecord],
    accounts: &dyn AccountDirectory,
    with_header: bool,
) -> Vec<PublishOutcome> {
    let publisher = ReportPublisher::new(config.login_report_name.clone());
    group_by_user(records)
        .into_iter()
        .map(|(user, records)| {
            let result = accounts.lookup(&user).and_then(|account| {
                publisher.publish(&account.home, &compose_login_banner(&records, with_header))
            });
            match result {
                Ok(path) => PublishOutcome {
                    user,
                    path: Some(path),
                    error: None,
                },
                Err(err) => {
                    error!("could not publish login report for {user}: {err}");
                    PublishOutcome {
                        user,
                        path: None,
                        error: Some(err.to_string()),
                    }
                }
            }
        })
        .collect()
}

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use quota_report_core::{
    only_over_quota, render_report, QuotaConfig, QuotaRecord, ReportKind, SystemAccounts,
    TableStyle,
};
use quota_report_service::{
    collect_quotas, notify_over_quota, publish_login_reports, resolve_subjects, send_report,
    UserSelection,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "quota-report",
    version,
    about = "Report per-user disk quota usage across XFS, ZFS and CephFS, and alert users over quota."
)]
struct Cli {
    /// Paths with a colon-delimited filesystem type and optional label, e.g. /home:xfs /public:ceph:Public.
    #[arg(long = "path", value_name = "PATH:FS[:ALIAS]", num_args = 1.., action = ArgAction::Append)]
    paths: Vec<String>,

    /// User(s) for whom to get quota information (root only).
    #[arg(long = "user", value_name = "USER", num_args = 1.., action = ArgAction::Append, conflicts_with = "all_users")]
    users: Vec<String>,

    /// Retrieve every user above the configured uid floor.
    #[arg(long)]
    all_users: bool,

    /// JSON configuration file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace). Overrides RUST_LOG.
    #[arg(long, value_name = "LEVEL")]
    log: Option<String>,

    /// Report shape.
    #[arg(long, value_enum, default_value = "short")]
    report: CliReportKind,

    /// Table style.
    #[arg(long, value_enum, default_value = "simple")]
    fmt: CliTableStyle,

    /// Only report quotas that are over 100% of the soft limit.
    #[arg(long)]
    only_full: bool,

    /// Mail the report to this address instead of printing it.
    #[arg(long, value_name = "ADDRESS", conflicts_with = "notify_users")]
    mailto: Option<String>,

    /// Email each over-quota user, at most once per notification window.
    #[arg(long)]
    notify_users: bool,

    /// Write each user's login banner into their home directory.
    #[arg(long)]
    publish_login: bool,

    /// Omit the header row from published login banners.
    #[arg(long, requires = "publish_login")]
    no_login_header: bool,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum CliReportKind {
    Full,
    #[value(alias = "single")]
    Short,
    Login,
}

impl From<CliReportKind> for ReportKind {
    fn from(value: CliReportKind) -> Self {
        match value {
            CliReportKind::Full => ReportKind::Full,
            CliReportKind::Short => ReportKind::Short,
            CliReportKind::Login => ReportKind::Login,
        }
    }
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum CliTableStyle {
    Plain,
    Simple,
    Github,
    Grid,
    Psql,
    Rounded,
    Html,
}

impl From<CliTableStyle> for TableStyle {
    fn from(value: CliTableStyle) -> Self {
        match value {
            CliTableStyle::Plain => TableStyle::Plain,
            CliTableStyle::Simple => TableStyle::Simple,
            CliTableStyle::Github => TableStyle::Github,
            CliTableStyle::Grid => TableStyle::Grid,
            CliTableStyle::Psql => TableStyle::Psql,
            CliTableStyle::Rounded => TableStyle::Rounded,
            CliTableStyle::Html => TableStyle::Html,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log.as_deref());

    let mut config = match &cli.config {
        Some(path) => QuotaConfig::load(path)?,
        None => QuotaConfig::default(),
    };
    config.mail = config
        .mail
        .with_lookup(|key| std::env::var(key).ok());

    let selection = if cli.all_users {
        UserSelection::All
    } else if cli.users.is_empty() {
        UserSelection::Current
    } else {
        UserSelection::Named(cli.users.clone())
    };
    let subjects = resolve_subjects(&selection, &config)?;
    let mut records = collect_quotas(&config, &subjects, &cli.paths)?;

    // Banners always show every path, independent of --only-full.
    if cli.publish_login {
        run_publish(&config, &records, !cli.no_login_header);
    }

    if cli.only_full {
        records = only_over_quota(&records);
        if records.is_empty() {
            println!("All users OK - nothing to report");
            return Ok(());
        }
    }

    let report = render_report(cli.report.into(), &records, cli.fmt.into());
    if let Some(to) = &cli.mailto {
        let code = send_report(&config, to, &report)?;
        info!("report mailed to {to} (response code {code})");
    } else if cli.notify_users {
        run_notify(&config, &records)?;
    } else {
        println!("{report}");
    }

    Ok(())
}

fn run_notify(config: &QuotaConfig, records: &[QuotaRecord]) -> Result<()> {
    let outcomes = notify_over_quota(config, records)?;
    if outcomes.is_empty() {
        info!("no users over quota; nothing to notify");
    }
    for outcome in &outcomes {
        info!(
            "notification for {}: {}",
            outcome.user,
            serde_json::to_string(&outcome.status).context("failed to serialize outcome")?
        );
    }
    Ok(())
}

fn run_publish(config: &QuotaConfig, records: &[QuotaRecord], with_header: bool) {
    let outcomes = publish_login_reports(config, records, &SystemAccounts, with_header);
    let failed = outcomes.iter().filter(|outcome| outcome.error.is_some()).count();
    if failed > 0 {
        warn!(
            "{failed} of {} login report(s) could not be published",
            outcomes.len()
        );
    }
    for outcome in outcomes {
        if let Some(path) = outcome.path {
            info!("login report for {} written to {}", outcome.user, path.display());
        } else if let Some(err) = outcome.error {
            error!("login report for {} failed: {err}", outcome.user);
        }
    }
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level.to_lowercase()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error")),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_MAIL_ENDPOINT: &str = "https://api.mailgun.net/v3/api.ci-connect.net/messages";
pub const MAIL_ENDPOINT_VAR: &str = "MAILGUN_URL";
pub const MAIL_API_KEY_VAR: &str = "MAILGUN_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QuotaConfig {
    pub sentinel_name: String,
    pub login_report_name: String,
    pub forward_file: String,
    pub notify_window_secs: u64,
    pub command_timeout_secs: u64,
    pub quota_bin: String,
    pub zfs_bin: String,
    /// "All users" means every account with a uid strictly above this.
    pub min_uid: u32,
    pub mail: MailConfig,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            sentinel_name: ".quota".to_string(),
            login_report_name: ".quota_report".to_string(),
            forward_file: ".forward".to_string(),
            notify_window_secs: 604_800,
            command_timeout_secs: 30,
            quota_bin: "/bin/quota".to_string(),
            zfs_bin: "zfs".to_string(),
            min_uid: 1000,
            mail: MailConfig::default(),
        }
    }
}

impl QuotaConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: QuotaConfig = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn notify_window(&self) -> Duration {
        Duration::from_secs(self.notify_window_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MailConfig {
    pub endpoint: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub sender: String,
    pub subject: String,
    pub support_contact: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_MAIL_ENDPOINT.to_string(),
            api_key: None,
            sender: "<noreply@api.ci-connect.net>".to_string(),
            subject: "Your account is over quota".to_string(),
            support_contact: "support@opensciencegrid.org".to_string(),
        }
    }
}

impl MailConfig {
    pub fn with_lookup(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        match lookup(MAIL_ENDPOINT_VAR).filter(|value| !value.is_empty()) {
            Some(endpoint) => self.endpoint = endpoint,
            None => warn!("no {MAIL_ENDPOINT_VAR} found in environment, using {}", self.endpoint),
        }
        self.api_key = lookup(MAIL_API_KEY_VAR).filter(|value| !value.is_empty());
        self
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;

    use tempfile::TempDir;

    use super::{MailConfig, QuotaConfig, DEFAULT_MAIL_ENDPOINT};

    #[test]
    fn partial_config_file_keeps_defaults() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("quota.json");
        fs::write(&path, r#"{"sentinel_name": ".notified", "mail": {"sender": "ops@example.org"}}"#)
            .expect("write config");

        let config = QuotaConfig::load(&path).expect("config parses");
        assert_eq!(config.sentinel_name, ".notified");
        assert_eq!(config.login_report_name, ".quota_report");
        assert_eq!(config.notify_window_secs, 604_800);
        assert_eq!(config.mail.sender, "ops@example.org");
        assert_eq!(config.mail.endpoint, DEFAULT_MAIL_ENDPOINT);
    }

    #[test]
    fn environment_overrides_endpoint_and_key() {
        let env = HashMap::from([
            ("MAILGUN_URL", "https://mail.example.org/send"),
            ("MAILGUN_API_KEY", "key-123"),
        ]);
        let config = MailConfig::default().with_lookup(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.endpoint, "https://mail.example.org/send");
        assert_eq!(config.api_key.as_deref(), Some("key-123"));
    }

    #[test]
    fn missing_environment_falls_back_to_default_endpoint() {
        let config = MailConfig::default().with_lookup(|_| None);
        assert_eq!(config.endpoint, DEFAULT_MAIL_ENDPOINT);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn malformed_config_is_an_error() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("quota.json");
        fs::write(&path, "{not json").expect("write config");
        assert!(QuotaConfig::load(&path).is_err());
    }
}

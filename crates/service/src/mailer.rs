use std::time::Duration;

use quota_report_core::config::MAIL_API_KEY_VAR;
use quota_report_core::{MailConfig, MailMessage, MailTransport, QuotaError};
use reqwest::blocking::Client;
use tracing::{error, info};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct MailgunTransport {
    client: Client,
    endpoint: String,
    api_key: String,
    sender: String,
}

impl MailgunTransport {
    // No API key means mail is disabled for this run.
    pub fn new(config: &MailConfig) -> Result<Self, QuotaError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| QuotaError::MissingCredential {
                detail: format!(
                    "no API key present - did you set {MAIL_API_KEY_VAR} in your environment?"
                ),
            })?;
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| QuotaError::Transport {
                status: None,
                detail: format!("failed to create HTTP client: {err}"),
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            sender: config.sender.clone(),
        })
    }
}

impl MailTransport for MailgunTransport {
    fn send(&self, message: &MailMessage) -> Result<u16, QuotaError> {
        let form = [
            ("subject", message.subject.as_str()),
            ("from", self.sender.as_str()),
            ("to", message.to.as_str()),
            ("html", message.html.as_str()),
        ];
        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth("api", Some(&self.api_key))
            .form(&form)
            .send()
            .map_err(|err| QuotaError::Transport {
                status: None,
                detail: err.to_string(),
            })?;

        let status = response.status();
        info!("response code is {}", status.as_u16());
        if status.is_success() {
            return Ok(status.as_u16());
        }

        let body = response.text().unwrap_or_default();
        error!("mail endpoint rejected message to {}: {status}", message.to);
        Err(QuotaError::Transport {
            status: Some(status.as_u16()),
            detail: format!("{status}: {}", body.trim()),
        })
    }
}

//! Blocking HTTP client for the ticketing REST API.

use serde::Deserialize;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use super::retry::{RetryPolicy, is_retryable_status, parse_retry_after};
use super::{CardUpdate, TicketError, TicketingApi};
use crate::config::TicketingConfig;
use crate::model::Credentials;

const ERROR_BODY_MAX_CHARS: usize = 512;

#[derive(Debug, Deserialize)]
struct AttachmentResponse {
    id: String,
}

/// [`TicketingApi`] over `ureq` with bounded timeouts and retries.
#[derive(Debug, Clone)]
pub struct HttpTicketing {
    agent: ureq::Agent,
    base_url: String,
    retry: RetryPolicy,
}

impl HttpTicketing {
    #[must_use]
    pub fn new(
        base_url: &str,
        connect_timeout: Duration,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(connect_timeout)
            .timeout(timeout)
            .user_agent(concat!("ditrack/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        }
    }

    #[must_use]
    pub fn from_config(config: &TicketingConfig) -> Self {
        Self::new(
            &config.base_url,
            Duration::from_millis(config.connect_timeout_ms),
            Duration::from_millis(config.timeout_ms),
            config.retry_policy(),
        )
    }

    fn card_url(&self, card_id: &str, suffix: &str) -> String {
        format!("{}/1/cards/{card_id}{suffix}", self.base_url)
    }

    fn authorized(&self, request: ureq::Request, credentials: &Credentials) -> ureq::Request {
        request
            .query("key", &credentials.api_key)
            .query("token", &credentials.auth_token)
    }

    /// Run `send` until it succeeds, fails terminally, or the retry budget
    /// is spent. Any 404 maps to [`TicketError::NotFound`].
    fn execute(
        &self,
        operation: &'static str,
        card_id: &str,
        send: impl Fn() -> Result<ureq::Response, ureq::Error>,
    ) -> Result<ureq::Response, TicketError> {
        let mut attempt = 0_u32;
        loop {
            attempt = attempt.saturating_add(1);
            match send() {
                Ok(response) => {
                    debug!(operation, card_id, attempt, "ticketing call succeeded");
                    return Ok(response);
                }
                Err(ureq::Error::Status(404, _)) => {
                    return Err(TicketError::NotFound {
                        card_id: card_id.to_string(),
                    });
                }
                Err(ureq::Error::Status(status, response)) => {
                    let retry_after = parse_retry_after(response.header("Retry-After"));
                    if is_retryable_status(status) && self.retry.allows_retry(attempt) {
                        let delay = self.retry.delay(attempt, retry_after);
                        warn!(operation, card_id, status, attempt, ?delay, "retrying ticketing call");
                        thread::sleep(delay);
                        continue;
                    }
                    let body = response.into_string().unwrap_or_default();
                    return Err(TicketError::Status {
                        operation,
                        status,
                        body: truncate(&body),
                    });
                }
                Err(ureq::Error::Transport(transport)) => {
                    if self.retry.allows_retry(attempt) {
                        let delay = self.retry.delay(attempt, None);
                        warn!(operation, card_id, attempt, error = %transport, ?delay, "retrying ticketing call");
                        thread::sleep(delay);
                        continue;
                    }
                    return Err(TicketError::Transport {
                        operation,
                        message: transport.to_string(),
                    });
                }
            }
        }
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(ERROR_BODY_MAX_CHARS).collect()
}

impl TicketingApi for HttpTicketing {
    fn create_comment(
        &self,
        card_id: &str,
        credentials: &Credentials,
        text: &str,
    ) -> Result<(), TicketError> {
        let url = self.card_url(card_id, "/actions/comments");
        self.execute("create comment", card_id, || {
            self.authorized(self.agent.post(&url), credentials)
                .send_form(&[("text", text)])
        })?;
        Ok(())
    }

    fn update_card(
        &self,
        card_id: &str,
        credentials: &Credentials,
        update: &CardUpdate,
    ) -> Result<(), TicketError> {
        let url = self.card_url(card_id, "");
        self.execute("update card", card_id, || {
            self.authorized(self.agent.put(&url), credentials)
                .send_json(update)
        })?;
        Ok(())
    }

    fn create_attachment(
        &self,
        card_id: &str,
        credentials: &Credentials,
        url: &str,
    ) -> Result<String, TicketError> {
        let endpoint = self.card_url(card_id, "/attachments");
        let response = self.execute("create attachment", card_id, || {
            self.authorized(self.agent.post(&endpoint), credentials)
                .send_form(&[("url", url)])
        })?;
        let body: AttachmentResponse =
            response
                .into_json()
                .map_err(|err| TicketError::Decode {
                    operation: "create attachment",
                    message: err.to_string(),
                })?;
        Ok(body.id)
    }
}

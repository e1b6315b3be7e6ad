//! SMS notification via Twilio's REST API.
//!
//! Delivery is a single blocking attempt. Any failure is logged and reported
//! as `DeliveryStatus::Failed`; nothing propagates to the caller.

use std::fmt;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

pub const INTRUDER_ALERT: &str = "Intruder Alert! Someone is trying to break into your house.";

const TWILIO_API: &str = "https://api.twilio.com/2010-04-01";

/// Upper bound on one send, after which the alert counts as failed.
const SEND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Accepted by the provider; carries the provider's status word (e.g. "queued").
    Accepted(String),
    Failed,
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryStatus::Accepted(status) => f.write_str(status),
            DeliveryStatus::Failed => f.write_str("Failed"),
        }
    }
}

pub trait Notifier {
    fn send(&self, to: &str, body: &str) -> DeliveryStatus;
}

impl<N: Notifier + ?Sized> Notifier for Box<N> {
    fn send(&self, to: &str, body: &str) -> DeliveryStatus {
        (**self).send(to, body)
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("environment variable {0} is not set")]
    MissingCredential(&'static str),
    #[error("HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct TwilioCredentials {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

impl TwilioCredentials {
    /// Read `TWILIO_SID`, `TWILIO_AUTH_TOKEN` and `TWILIO_PHONE_NUMBER`.
    pub fn from_env() -> Result<Self, NotifyError> {
        let var = |name: &'static str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or(NotifyError::MissingCredential(name))
        };
        Ok(Self {
            account_sid: var("TWILIO_SID")?,
            auth_token: var("TWILIO_AUTH_TOKEN")?,
            from_number: var("TWILIO_PHONE_NUMBER")?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    status: String,
}

pub struct TwilioNotifier {
    http: Client,
    credentials: TwilioCredentials,
    base_url: String,
}

impl TwilioNotifier {
    pub fn new(credentials: TwilioCredentials) -> Result<Self, NotifyError> {
        Self::with_base_url(credentials, TWILIO_API)
    }

    /// Point the client at another API root (used for local test servers).
    pub fn with_base_url(
        credentials: TwilioCredentials,
        base_url: &str,
    ) -> Result<Self, NotifyError> {
        let http = Client::builder().timeout(SEND_TIMEOUT).build()?;
        Ok(Self {
            http,
            credentials,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn post_message(&self, to: &str, body: &str) -> Result<String, reqwest::Error> {
        let url = format!(
            "{}/Accounts/{}/Messages.json",
            self.base_url, self.credentials.account_sid
        );
        let resp: MessageResponse = self
            .http
            .post(url)
            .basic_auth(&self.credentials.account_sid, Some(&self.credentials.auth_token))
            .form(&[
                ("To", to),
                ("From", self.credentials.from_number.as_str()),
                ("Body", body),
            ])
            .send()?
            .error_for_status()?
            .json()?;
        Ok(resp.status)
    }
}

impl Notifier for TwilioNotifier {
    fn send(&self, to: &str, body: &str) -> DeliveryStatus {
        match self.post_message(to, body) {
            Ok(status) => {
                info!("SMS alert to {} accepted: {}", to, status);
                DeliveryStatus::Accepted(status)
            }
            Err(e) => {
                warn!("Failed to send alert: {}", e);
                DeliveryStatus::Failed
            }
        }
    }
}

/// Stand-in when SMS credentials are missing: every alert is reported failed.
#[derive(Debug, Default)]
pub struct UnconfiguredNotifier;

impl Notifier for UnconfiguredNotifier {
    fn send(&self, to: &str, _body: &str) -> DeliveryStatus {
        warn!("Failed to send alert to {}: SMS provider is not configured", to);
        DeliveryStatus::Failed
    }
}

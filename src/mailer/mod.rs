//! OTP email dispatch
//!
//! The protocol only needs one message shape, so the boundary is a single
//! trait. Production delivery goes through an HTTP mail API; tests plug in
//! a recording double.

use async_trait::async_trait;
use thiserror::Error;

/// Mail dispatch errors
#[derive(Error, Debug)]
pub enum MailError {
    #[error("mail transport error: {0}")]
    Transport(String),

    #[error("mail provider rejected the message with status {0}")]
    Rejected(u16),
}

/// Dispatcher for OTP emails.
#[async_trait]
pub trait OtpMailer: Send + Sync {
    async fn send_otp(&self, to: &str, name: &str, code: &str) -> Result<(), MailError>;
}

/// Mailer that posts messages to an HTTP mail-delivery API.
#[derive(Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    from: String,
    validity_minutes: i64,
}

impl HttpMailer {
    pub fn new(
        endpoint: String,
        api_key: Option<String>,
        from: String,
        validity_minutes: i64,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            from,
            validity_minutes,
        }
    }
}

#[async_trait]
impl OtpMailer for HttpMailer {
    async fn send_otp(&self, to: &str, name: &str, code: &str) -> Result<(), MailError> {
        let body = serde_json::json!({
            "from": self.from,
            "to": to,
            "subject": "Your SolarVest verification code",
            "text": format!(
                "Hi {name},\n\nYour SolarVest verification code is {code}. \
                 It is valid for the next {} minutes.\n\nIf you did not request \
                 this code, you can ignore this message.",
                self.validity_minutes
            ),
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MailError::Rejected(response.status().as_u16()));
        }

        Ok(())
    }
}

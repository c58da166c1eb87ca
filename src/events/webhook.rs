use std::collections::HashMap;
use std::time::Duration;

use super::Event;
use crate::error::{Error, Result};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Delivers events to webhook URLs as JSON POSTs.
pub struct WebhookSender {
    client: reqwest::Client,
}

impl Default for WebhookSender {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookSender {
    #[must_use]
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .expect("failed to build webhook http client");
        Self { client }
    }

    /// Sends one event to one URL. Any HTTP status >= 400 or transport
    /// error is a delivery failure.
    pub async fn send(
        &self,
        url: &str,
        headers: Option<&HashMap<String, String>>,
        event: &Event,
    ) -> Result<()> {
        let mut request = self.client.post(url).json(event);

        if let Some(headers) = headers {
            for (key, value) in headers {
                request = request.header(key, value);
            }
        }

        let response = request.send().await?;
        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(Error::Api {
                status: status.as_u16(),
                message: format!("webhook returned status {status}"),
            });
        }

        Ok(())
    }
}

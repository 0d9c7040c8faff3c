use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use serde_json::json;
use tracing::debug;

use crate::error::SenderError;
use crate::sender::ChannelSender;

/// Delivers by POSTing a JSON payload to the entry's own recipient URL.
pub struct WebhookSender {
    client: reqwest::Client,
}

impl WebhookSender {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for WebhookSender {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelSender for WebhookSender {
    fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> BoxFuture<'_, Result<(), Report<SenderError>>> {
        let recipient = recipient.to_owned();
        let payload = json!({ "subject": subject, "body": body });
        Box::pin(async move {
            let response = self
                .client
                .post(&recipient)
                .json(&payload)
                .send()
                .await
                .change_context(SenderError::Delivery {
                    recipient: recipient.clone(),
                })?;

            if !response.status().is_success() {
                return Err(Report::new(SenderError::Delivery {
                    recipient: recipient.clone(),
                })
                .attach(format!("HTTP status: {}", response.status())));
            }

            debug!(recipient = %recipient, "webhook delivered");
            Ok(())
        })
    }
}

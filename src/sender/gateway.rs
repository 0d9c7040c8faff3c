use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use serde_json::json;
use tracing::debug;

use crate::error::SenderError;
use crate::model::DeliveryMethod;
use crate::sender::ChannelSender;

/// Delivers email/SMS/push by handing an envelope to an HTTP gateway that
/// owns the actual transport.
pub struct GatewaySender {
    client: reqwest::Client,
    method: DeliveryMethod,
    url: String,
}

impl GatewaySender {
    pub fn new(method: DeliveryMethod, url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            method,
            url: url.to_owned(),
        }
    }
}

impl ChannelSender for GatewaySender {
    fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> BoxFuture<'_, Result<(), Report<SenderError>>> {
        let recipient = recipient.to_owned();
        let payload = json!({
            "method": self.method.as_str(),
            "recipient": recipient,
            "subject": subject,
            "body": body,
        });
        Box::pin(async move {
            let response = self
                .client
                .post(&self.url)
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

            debug!(method = %self.method, recipient = %recipient, "gateway accepted delivery");
            Ok(())
        })
    }
}

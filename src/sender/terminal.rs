use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::SenderError;
use crate::model::DeliveryMethod;
use crate::sender::ChannelSender;

/// Development-mode sink for methods without a configured gateway: the
/// notification is written to the log instead of leaving the process.
pub struct TerminalSender {
    method: DeliveryMethod,
}

impl TerminalSender {
    pub fn new(method: DeliveryMethod) -> Self {
        Self { method }
    }
}

impl ChannelSender for TerminalSender {
    fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> BoxFuture<'_, Result<(), Report<SenderError>>> {
        let recipient = recipient.to_owned();
        let subject = subject.to_owned();
        let body = body.to_owned();
        Box::pin(async move {
            tracing::warn!(
                method = %self.method,
                recipient = %recipient,
                subject = %subject,
                "NOTIFICATION: {body}",
            );
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn terminal_sender_always_succeeds() {
        let sender = TerminalSender::new(DeliveryMethod::Email);
        let result = sender
            .send("user@example.com", "Alert: test", "body text")
            .await;
        assert!(result.is_ok());
    }
}

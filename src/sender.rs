pub mod gateway;
pub mod terminal;
pub mod webhook;

use std::collections::HashMap;
use std::sync::Arc;

use error_stack::Report;
use futures::future::BoxFuture;

use crate::config::SendersConfig;
use crate::error::SenderError;
use crate::model::DeliveryMethod;

use gateway::GatewaySender;
use terminal::TerminalSender;
use webhook::WebhookSender;

/// Transport for one delivery method.
///
/// Uses `BoxFuture` instead of `async fn` in trait to keep the trait
/// object-safe (`dyn ChannelSender`).
pub trait ChannelSender: Send + Sync {
    fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> BoxFuture<'_, Result<(), Report<SenderError>>>;
}

/// Method-to-sender lookup table, built once at startup.
///
/// Dispatching an entry whose method has no registered sender is a terminal
/// configuration error, not a retryable delivery failure.
pub struct SenderRegistry {
    senders: HashMap<DeliveryMethod, Arc<dyn ChannelSender>>,
}

impl SenderRegistry {
    pub fn from_config(config: &SendersConfig) -> Self {
        let mut senders: HashMap<DeliveryMethod, Arc<dyn ChannelSender>> = HashMap::new();

        for method in DeliveryMethod::ALL {
            let sender: Arc<dyn ChannelSender> = match method {
                DeliveryMethod::Webhook => Arc::new(WebhookSender::new()),
                _ => match config.gateway_url(method) {
                    Some(url) => Arc::new(GatewaySender::new(method, url)),
                    None => Arc::new(TerminalSender::new(method)),
                },
            };
            senders.insert(method, sender);
        }

        Self { senders }
    }

    pub fn get(&self, method: DeliveryMethod) -> Option<&Arc<dyn ChannelSender>> {
        self.senders.get(&method)
    }

    /// Registry with an explicit sender set; used by tests and embedders.
    pub fn from_senders(senders: HashMap<DeliveryMethod, Arc<dyn ChannelSender>>) -> Self {
        Self { senders }
    }
}

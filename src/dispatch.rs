use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use error_stack::Report;
use tracing::{debug, info, warn};

use crate::error::SenderError;
use crate::model::QueueEntry;
use crate::repo::AlertRepository;
use crate::sender::SenderRegistry;

/// Outcome of one dispatch tick.
#[derive(Debug, Default)]
pub struct DispatchSummary {
    /// Entries claimed and attempted this tick.
    pub processed: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Drains due notification queue entries through the channel senders.
///
/// State machine per entry:
/// `pending → processing → {sent | pending (retry, bounded) | failed}`.
pub struct Dispatcher {
    repo: Arc<dyn AlertRepository>,
    registry: Arc<SenderRegistry>,
    batch_limit: usize,
    send_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        repo: Arc<dyn AlertRepository>,
        registry: Arc<SenderRegistry>,
        batch_limit: usize,
        send_timeout: Duration,
    ) -> Self {
        Self {
            repo,
            registry,
            batch_limit,
            send_timeout,
        }
    }

    pub async fn dispatch_batch(&self, now: DateTime<Utc>) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        let due = match self.repo.find_due_notifications(self.batch_limit, now).await {
            Ok(due) => due,
            Err(e) => {
                warn!(error = ?e, "failed to load due notifications, skipping tick");
                return summary;
            }
        };

        for entry in due {
            // Conditional claim guards against an overlapping slow batch:
            // whoever flips pending -> processing owns the attempt.
            match self.repo.claim_notification(entry.id, now).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(entry = entry.id, "entry no longer pending, skipped");
                    continue;
                }
                Err(e) => {
                    warn!(entry = entry.id, error = ?e, "claim failed");
                    continue;
                }
            }

            summary.processed += 1;
            let attempt = entry.retry_count + 1;

            match self.deliver(&entry).await {
                Ok(()) => {
                    if let Err(e) = self.repo.mark_notification_sent(entry.id, Utc::now()).await {
                        warn!(entry = entry.id, error = ?e, "failed to mark entry sent");
                    } else {
                        summary.sent += 1;
                        debug!(entry = entry.id, method = %entry.method, "notification sent");
                    }
                }
                Err(e) => {
                    let message = e.current_context().to_string();
                    let out_of_retries = attempt >= entry.max_retries;

                    if e.current_context().is_terminal() || out_of_retries {
                        warn!(
                            entry = entry.id,
                            method = %entry.method,
                            attempt,
                            error = %message,
                            "delivery failed permanently"
                        );
                        if let Err(e) = self.repo.mark_notification_failed(entry.id, &message).await
                        {
                            warn!(entry = entry.id, error = ?e, "failed to mark entry failed");
                        } else {
                            summary.failed += 1;
                        }
                    } else {
                        debug!(
                            entry = entry.id,
                            method = %entry.method,
                            attempt,
                            error = %message,
                            "delivery failed, will retry on a later batch"
                        );
                        if let Err(e) = self.repo.mark_notification_retry(entry.id, &message).await
                        {
                            warn!(entry = entry.id, error = ?e, "failed to requeue entry");
                        }
                    }
                }
            }
        }

        // Backlog growth shows up here rather than as memory growth
        let queue_depth = self.repo.queue_depth().await.ok();
        info!(
            processed = summary.processed,
            sent = summary.sent,
            failed = summary.failed,
            queue_depth,
            "dispatch complete"
        );
        summary
    }

    async fn deliver(&self, entry: &QueueEntry) -> Result<(), Report<SenderError>> {
        let sender = self.registry.get(entry.method).ok_or_else(|| {
            Report::new(SenderError::UnsupportedMethod {
                method: entry.method.to_string(),
            })
        })?;

        let send = sender.send(&entry.recipient, &entry.subject, &entry.body);
        match tokio::time::timeout(self.send_timeout, send).await {
            Ok(result) => result,
            Err(_) => Err(Report::new(SenderError::Timeout {
                recipient: entry.recipient.clone(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Alert, DeliveryMethod, NewFiring, NewQueueEntry, QueueStatus, ThresholdCondition,
        TriggerConfig,
    };
    use crate::repo::sqlite::SqliteRepository;
    use crate::repo::sqlite::testutil::in_memory_repo;
    use crate::sender::ChannelSender;
    use futures::future::BoxFuture;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    struct MockSender {
        fail: bool,
        delay: Option<Duration>,
        calls: Arc<StdMutex<Vec<String>>>,
    }

    impl MockSender {
        fn succeeding(calls: Arc<StdMutex<Vec<String>>>) -> Self {
            Self {
                fail: false,
                delay: None,
                calls,
            }
        }

        fn failing(calls: Arc<StdMutex<Vec<String>>>) -> Self {
            Self {
                fail: true,
                delay: None,
                calls,
            }
        }
    }

    impl ChannelSender for MockSender {
        fn send(
            &self,
            recipient: &str,
            _subject: &str,
            _body: &str,
        ) -> BoxFuture<'_, Result<(), Report<SenderError>>> {
            let recipient = recipient.to_owned();
            Box::pin(async move {
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                self.calls.lock().unwrap().push(recipient.clone());
                if self.fail {
                    Err(Report::new(SenderError::Delivery { recipient }))
                } else {
                    Ok(())
                }
            })
        }
    }

    fn entry(method: DeliveryMethod, recipient: &str, priority: i64) -> NewQueueEntry {
        NewQueueEntry {
            user_id: 10,
            alert_id: 0,
            method,
            recipient: recipient.into(),
            priority,
            subject: "Alert: test".into(),
            body: "body".into(),
            scheduled_at: Utc::now(),
            max_retries: 3,
        }
    }

    async fn seed_entries(repo: &SqliteRepository, mut entries: Vec<NewQueueEntry>) -> Vec<i64> {
        let now = Utc::now();
        let alert = Alert {
            id: 0,
            user_id: 10,
            stock_id: 100,
            symbol: "AAPL".into(),
            name: "AAPL over 150".into(),
            trigger: TriggerConfig::PriceThreshold {
                condition: ThresholdCondition::Above,
                threshold: 150.0,
            },
            baseline_price: 140.0,
            baseline_at: now,
            starts_at: now,
            ends_at: None,
            cooldown_minutes: 60,
            last_triggered: None,
            is_active: true,
            market_hours_only: false,
            volume_confirmation: false,
            priority: 2,
            channels: vec![],
        };
        let alert_id = repo.insert_alert(&alert).await;
        for entry in &mut entries {
            entry.alert_id = alert_id;
        }

        repo.record_firing(NewFiring {
            alert_id,
            user_id: 10,
            stock_id: 100,
            trigger_value: 155.0,
            baseline_price: 140.0,
            price_change: 15.0,
            price_change_pct: 10.7,
            volume: 1_000_000.0,
            market_context: serde_json::json!({}),
            triggered_at: now,
            entries,
        })
        .await
        .unwrap();
        repo.all_queue_ids().await
    }

    fn dispatcher_with(
        repo: Arc<SqliteRepository>,
        senders: HashMap<DeliveryMethod, Arc<dyn ChannelSender>>,
        send_timeout: Duration,
    ) -> Dispatcher {
        Dispatcher::new(
            repo as Arc<dyn AlertRepository>,
            Arc::new(SenderRegistry::from_senders(senders)),
            100,
            send_timeout,
        )
    }

    #[tokio::test]
    async fn successful_batch_is_idempotent() {
        let repo = Arc::new(in_memory_repo().await);
        let calls = Arc::new(StdMutex::new(Vec::new()));
        let mut senders: HashMap<DeliveryMethod, Arc<dyn ChannelSender>> = HashMap::new();
        senders.insert(
            DeliveryMethod::Email,
            Arc::new(MockSender::succeeding(Arc::clone(&calls))),
        );

        let ids = seed_entries(
            &repo,
            vec![
                entry(DeliveryMethod::Email, "a@example.com", 1),
                entry(DeliveryMethod::Email, "b@example.com", 1),
            ],
        )
        .await;

        let dispatcher = dispatcher_with(Arc::clone(&repo), senders, Duration::from_secs(5));
        let summary = dispatcher.dispatch_batch(Utc::now()).await;
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.sent, 2);
        assert_eq!(summary.failed, 0);

        for id in &ids {
            let stored = repo.get_queue_entry(*id).await;
            assert_eq!(stored.status, QueueStatus::Sent);
            assert!(stored.sent_at.is_some());
        }

        // Nothing pending and due remains: the next batch is a no-op
        let again = dispatcher.dispatch_batch(Utc::now()).await;
        assert_eq!(again.processed, 0);
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failing_sender_exhausts_retries_then_terminal() {
        let repo = Arc::new(in_memory_repo().await);
        let calls = Arc::new(StdMutex::new(Vec::new()));
        let mut senders: HashMap<DeliveryMethod, Arc<dyn ChannelSender>> = HashMap::new();
        senders.insert(
            DeliveryMethod::Webhook,
            Arc::new(MockSender::failing(Arc::clone(&calls))),
        );

        let ids = seed_entries(
            &repo,
            vec![entry(DeliveryMethod::Webhook, "https://hooks.example.com/x", 1)],
        )
        .await;
        let id = ids[0];

        let dispatcher = dispatcher_with(Arc::clone(&repo), senders, Duration::from_secs(5));

        // Attempts 1 and 2 requeue
        for expected_retry in 1..=2 {
            let summary = dispatcher.dispatch_batch(Utc::now()).await;
            assert_eq!(summary.processed, 1);
            assert_eq!(summary.failed, 0);
            let stored = repo.get_queue_entry(id).await;
            assert_eq!(stored.status, QueueStatus::Pending);
            assert_eq!(stored.retry_count, expected_retry);
            assert!(stored.last_error.is_some());
        }

        // Attempt 3 hits max_retries: terminal
        let summary = dispatcher.dispatch_batch(Utc::now()).await;
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.failed, 1);

        let stored = repo.get_queue_entry(id).await;
        assert_eq!(stored.status, QueueStatus::Failed);
        assert_eq!(stored.retry_count, 3);
        assert!(stored.last_error.is_some());

        // A fourth batch never selects the failed entry
        let after = dispatcher.dispatch_batch(Utc::now()).await;
        assert_eq!(after.processed, 0);
        assert_eq!(calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn entries_dispatched_in_priority_then_time_order() {
        let repo = Arc::new(in_memory_repo().await);
        let calls = Arc::new(StdMutex::new(Vec::new()));
        let mut senders: HashMap<DeliveryMethod, Arc<dyn ChannelSender>> = HashMap::new();
        senders.insert(
            DeliveryMethod::Email,
            Arc::new(MockSender::succeeding(Arc::clone(&calls))),
        );

        seed_entries(
            &repo,
            vec![
                entry(DeliveryMethod::Email, "low@example.com", 3),
                entry(DeliveryMethod::Email, "high@example.com", 1),
                entry(DeliveryMethod::Email, "mid@example.com", 2),
            ],
        )
        .await;

        let dispatcher = dispatcher_with(Arc::clone(&repo), senders, Duration::from_secs(5));
        dispatcher.dispatch_batch(Utc::now()).await;

        let order = calls.lock().unwrap().clone();
        assert_eq!(
            order,
            vec!["high@example.com", "mid@example.com", "low@example.com"]
        );
    }

    #[tokio::test]
    async fn unregistered_method_fails_terminally() {
        let repo = Arc::new(in_memory_repo().await);
        // Registry knows no senders at all
        let senders: HashMap<DeliveryMethod, Arc<dyn ChannelSender>> = HashMap::new();

        let ids = seed_entries(&repo, vec![entry(DeliveryMethod::Push, "device-token", 1)]).await;
        let id = ids[0];

        let dispatcher = dispatcher_with(Arc::clone(&repo), senders, Duration::from_secs(5));
        let summary = dispatcher.dispatch_batch(Utc::now()).await;
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.failed, 1);

        let stored = repo.get_queue_entry(id).await;
        // Terminal on the first attempt, no retries spent on a bad config
        assert_eq!(stored.status, QueueStatus::Failed);
        assert_eq!(stored.retry_count, 1);
        assert!(
            stored
                .last_error
                .as_deref()
                .is_some_and(|e| e.contains("push"))
        );
    }

    #[tokio::test]
    async fn timed_out_send_is_a_retryable_failure() {
        let repo = Arc::new(in_memory_repo().await);
        let calls = Arc::new(StdMutex::new(Vec::new()));
        let mut senders: HashMap<DeliveryMethod, Arc<dyn ChannelSender>> = HashMap::new();
        senders.insert(
            DeliveryMethod::Email,
            Arc::new(MockSender {
                fail: false,
                delay: Some(Duration::from_millis(200)),
                calls: Arc::clone(&calls),
            }),
        );

        let ids = seed_entries(&repo, vec![entry(DeliveryMethod::Email, "slow@example.com", 1)])
            .await;
        let id = ids[0];

        let dispatcher = dispatcher_with(Arc::clone(&repo), senders, Duration::from_millis(50));
        let summary = dispatcher.dispatch_batch(Utc::now()).await;
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.sent, 0);

        let stored = repo.get_queue_entry(id).await;
        assert_eq!(stored.status, QueueStatus::Pending);
        assert_eq!(stored.retry_count, 1);
        assert!(
            stored
                .last_error
                .as_deref()
                .is_some_and(|e| e.contains("timed out"))
        );
    }
}

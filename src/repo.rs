pub mod sqlite;

use chrono::{DateTime, Utc};
use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::RepoError;
use crate::model::{Alert, NewFiring, QueueEntry};

/// Persistence operations the engine needs. Object-safe via `BoxFuture` so
/// the scanner and dispatcher hold `Arc<dyn AlertRepository>`.
pub trait AlertRepository: Send + Sync {
    /// Active alerts whose validity window includes `now`. The filter is
    /// pushed into the query; the eligibility gate still re-checks cooldown
    /// per alert.
    fn find_active_alerts(
        &self,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<Alert>, Report<RepoError>>>;

    /// Persist one firing atomically: the history row, the alert's
    /// `last_triggered` update, and the notification queue entries all
    /// commit or roll back together. Returns the new history id.
    fn record_firing(&self, firing: NewFiring) -> BoxFuture<'_, Result<i64, Report<RepoError>>>;

    /// Up to `limit` entries with `status = pending`, due at `now`, and
    /// retries remaining, ordered by priority ascending (1 = most urgent),
    /// then scheduled time ascending.
    fn find_due_notifications(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<QueueEntry>, Report<RepoError>>>;

    /// Atomically claim an entry for processing: transitions it to
    /// `processing`, increments `retry_count`, and stamps
    /// `last_attempt_at`, but only if the entry is still `pending`.
    /// Returns `false` when another dispatch already claimed it.
    fn claim_notification(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<bool, Report<RepoError>>>;

    fn mark_notification_sent(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<(), Report<RepoError>>>;

    /// Return a failed attempt to `pending` for a later batch, preserving
    /// the error message.
    fn mark_notification_retry(
        &self,
        id: i64,
        error: &str,
    ) -> BoxFuture<'_, Result<(), Report<RepoError>>>;

    fn mark_notification_failed(
        &self,
        id: i64,
        error: &str,
    ) -> BoxFuture<'_, Result<(), Report<RepoError>>>;

    /// Number of entries still `pending`, for backlog visibility.
    fn queue_depth(&self) -> BoxFuture<'_, Result<i64, Report<RepoError>>>;
}

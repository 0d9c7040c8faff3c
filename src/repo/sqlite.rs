use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use sqlx::{
    Row, SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteRow},
};

use crate::error::RepoError;
use crate::model::{
    Alert, DeliveryChannel, DeliveryMethod, NewFiring, QueueEntry, QueueStatus, TriggerConfig,
};
use crate::repo::AlertRepository;

pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Open (or create) a SQLite database at `path` and run migrations.
    pub async fn open(path: &Path) -> Result<Self, Report<RepoError>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .change_context(RepoError::Migration)
                .attach_with(|| format!("cannot create data directory: {}", parent.display()))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .change_context(RepoError::Migration)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(opts)
            .await
            .change_context(RepoError::Migration)
            .attach_with(|| format!("database path: {}", path.display()))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .change_context(RepoError::Migration)?;

        Ok(Self { pool })
    }
}

impl AlertRepository for SqliteRepository {
    fn find_active_alerts(
        &self,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<Alert>, Report<RepoError>>> {
        Box::pin(async move {
            let now_str = now.to_rfc3339();
            let rows = sqlx::query(
                "SELECT id, user_id, stock_id, symbol, name, trigger_config, \
                 baseline_price, baseline_at, starts_at, ends_at, cooldown_minutes, \
                 last_triggered, is_active, market_hours_only, volume_confirmation, \
                 priority, channels \
                 FROM alerts \
                 WHERE is_active = 1 AND starts_at <= ? \
                 AND (ends_at IS NULL OR ends_at >= ?)",
            )
            .bind(&now_str)
            .bind(&now_str)
            .fetch_all(&self.pool)
            .await
            .change_context(RepoError::Query)?;

            rows.iter().map(map_alert_row).collect()
        })
    }

    fn record_firing(&self, firing: NewFiring) -> BoxFuture<'_, Result<i64, Report<RepoError>>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.change_context(RepoError::Insert)?;

            let history = sqlx::query(
                "INSERT INTO alert_history \
                 (alert_id, user_id, stock_id, trigger_value, baseline_price, \
                  price_change, price_change_pct, volume, market_context, \
                  triggered_at, status) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'triggered')",
            )
            .bind(firing.alert_id)
            .bind(firing.user_id)
            .bind(firing.stock_id)
            .bind(firing.trigger_value)
            .bind(firing.baseline_price)
            .bind(firing.price_change)
            .bind(firing.price_change_pct)
            .bind(firing.volume)
            .bind(firing.market_context.to_string())
            .bind(firing.triggered_at.to_rfc3339())
            .execute(&mut *tx)
            .await
            .change_context(RepoError::Insert)?;

            let history_id = history.last_insert_rowid();

            sqlx::query("UPDATE alerts SET last_triggered = ? WHERE id = ?")
                .bind(firing.triggered_at.to_rfc3339())
                .bind(firing.alert_id)
                .execute(&mut *tx)
                .await
                .change_context(RepoError::Update)?;

            for entry in &firing.entries {
                sqlx::query(
                    "INSERT INTO notification_queue \
                     (user_id, alert_id, history_id, method, recipient, priority, \
                      subject, body, scheduled_at, retry_count, max_retries, status) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, 'pending')",
                )
                .bind(entry.user_id)
                .bind(entry.alert_id)
                .bind(history_id)
                .bind(entry.method.as_str())
                .bind(&entry.recipient)
                .bind(entry.priority)
                .bind(&entry.subject)
                .bind(&entry.body)
                .bind(entry.scheduled_at.to_rfc3339())
                .bind(entry.max_retries)
                .execute(&mut *tx)
                .await
                .change_context(RepoError::Insert)?;
            }

            tx.commit().await.change_context(RepoError::Insert)?;
            Ok(history_id)
        })
    }

    fn find_due_notifications(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<QueueEntry>, Report<RepoError>>> {
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT id, user_id, alert_id, history_id, method, recipient, \
                 priority, subject, body, scheduled_at, sent_at, last_attempt_at, \
                 retry_count, max_retries, last_error, status \
                 FROM notification_queue \
                 WHERE status = 'pending' AND scheduled_at <= ? \
                 AND retry_count < max_retries \
                 ORDER BY priority ASC, scheduled_at ASC \
                 LIMIT ?",
            )
            .bind(now.to_rfc3339())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .change_context(RepoError::Query)?;

            rows.iter().map(map_queue_row).collect()
        })
    }

    fn claim_notification(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<bool, Report<RepoError>>> {
        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE notification_queue \
                 SET status = 'processing', retry_count = retry_count + 1, \
                     last_attempt_at = ? \
                 WHERE id = ? AND status = 'pending'",
            )
            .bind(now.to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await
            .change_context(RepoError::Update)?;

            Ok(result.rows_affected() == 1)
        })
    }

    fn mark_notification_sent(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<(), Report<RepoError>>> {
        Box::pin(async move {
            sqlx::query("UPDATE notification_queue SET status = 'sent', sent_at = ? WHERE id = ?")
                .bind(now.to_rfc3339())
                .bind(id)
                .execute(&self.pool)
                .await
                .change_context(RepoError::Update)?;
            Ok(())
        })
    }

    fn mark_notification_retry(
        &self,
        id: i64,
        error: &str,
    ) -> BoxFuture<'_, Result<(), Report<RepoError>>> {
        let error = error.to_string();
        Box::pin(async move {
            sqlx::query(
                "UPDATE notification_queue SET status = 'pending', last_error = ? WHERE id = ?",
            )
            .bind(&error)
            .bind(id)
            .execute(&self.pool)
            .await
            .change_context(RepoError::Update)?;
            Ok(())
        })
    }

    fn mark_notification_failed(
        &self,
        id: i64,
        error: &str,
    ) -> BoxFuture<'_, Result<(), Report<RepoError>>> {
        let error = error.to_string();
        Box::pin(async move {
            sqlx::query(
                "UPDATE notification_queue SET status = 'failed', last_error = ? WHERE id = ?",
            )
            .bind(&error)
            .bind(id)
            .execute(&self.pool)
            .await
            .change_context(RepoError::Update)?;
            Ok(())
        })
    }

    fn queue_depth(&self) -> BoxFuture<'_, Result<i64, Report<RepoError>>> {
        Box::pin(async move {
            let (depth,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM notification_queue WHERE status = 'pending'")
                    .fetch_one(&self.pool)
                    .await
                    .change_context(RepoError::Query)?;
            Ok(depth)
        })
    }

}

fn get<'r, T>(row: &'r SqliteRow, column: &str) -> Result<T, Report<RepoError>>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column).change_context(RepoError::RowDecode {
        column: column.into(),
    })
}

fn parse_time(column: &str, value: &str) -> Result<DateTime<Utc>, Report<RepoError>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .change_context(RepoError::RowDecode {
            column: column.into(),
        })
}

fn parse_time_opt(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, Report<RepoError>> {
    value.map(|v| parse_time(column, &v)).transpose()
}

fn map_alert_row(row: &SqliteRow) -> Result<Alert, Report<RepoError>> {
    let trigger_json: String = get(row, "trigger_config")?;
    let trigger: TriggerConfig =
        serde_json::from_str(&trigger_json).change_context(RepoError::RowDecode {
            column: "trigger_config".into(),
        })?;

    let channels_json: String = get(row, "channels")?;
    let channels: Vec<DeliveryChannel> =
        serde_json::from_str(&channels_json).change_context(RepoError::RowDecode {
            column: "channels".into(),
        })?;

    Ok(Alert {
        id: get(row, "id")?,
        user_id: get(row, "user_id")?,
        stock_id: get(row, "stock_id")?,
        symbol: get(row, "symbol")?,
        name: get(row, "name")?,
        trigger,
        baseline_price: get(row, "baseline_price")?,
        baseline_at: parse_time("baseline_at", &get::<String>(row, "baseline_at")?)?,
        starts_at: parse_time("starts_at", &get::<String>(row, "starts_at")?)?,
        ends_at: parse_time_opt("ends_at", get(row, "ends_at")?)?,
        cooldown_minutes: get(row, "cooldown_minutes")?,
        last_triggered: parse_time_opt("last_triggered", get(row, "last_triggered")?)?,
        is_active: get(row, "is_active")?,
        market_hours_only: get(row, "market_hours_only")?,
        volume_confirmation: get(row, "volume_confirmation")?,
        priority: get(row, "priority")?,
        channels,
    })
}

fn map_queue_row(row: &SqliteRow) -> Result<QueueEntry, Report<RepoError>> {
    let method_str: String = get(row, "method")?;
    let method = DeliveryMethod::from_str(&method_str).ok_or_else(|| {
        Report::new(RepoError::RowDecode {
            column: "method".into(),
        })
    })?;

    let status_str: String = get(row, "status")?;
    let status = QueueStatus::from_str(&status_str).ok_or_else(|| {
        Report::new(RepoError::RowDecode {
            column: "status".into(),
        })
    })?;

    Ok(QueueEntry {
        id: get(row, "id")?,
        user_id: get(row, "user_id")?,
        alert_id: get(row, "alert_id")?,
        history_id: get(row, "history_id")?,
        method,
        recipient: get(row, "recipient")?,
        priority: get(row, "priority")?,
        subject: get(row, "subject")?,
        body: get(row, "body")?,
        scheduled_at: parse_time("scheduled_at", &get::<String>(row, "scheduled_at")?)?,
        sent_at: parse_time_opt("sent_at", get(row, "sent_at")?)?,
        last_attempt_at: parse_time_opt("last_attempt_at", get(row, "last_attempt_at")?)?,
        retry_count: get(row, "retry_count")?,
        max_retries: get(row, "max_retries")?,
        last_error: get(row, "last_error")?,
        status,
    })
}

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::enqueue;
use crate::evaluate::{self, percent_change};
use crate::market::MarketData;
use crate::model::{Alert, NewFiring};
use crate::repo::AlertRepository;

/// Outcome of one scan tick.
#[derive(Debug, Default)]
pub struct ScanSummary {
    /// Eligible alerts evaluated this tick.
    pub processed: usize,
    pub fired: usize,
    pub errors: Vec<String>,
}

/// Walks all active alerts on a fixed interval, evaluates their triggers,
/// and records firings together with their notification queue entries.
///
/// At-least-once: if the process dies mid-batch, already-written history
/// rows stand and the next scan re-evaluates the rest. The cooldown window
/// is the only duplicate-firing guard, so cooldowns shorter than the scan
/// interval can double-fire; conversely a crossing that happens entirely
/// inside a cooldown window is never observed at all.
pub struct AlertScanner {
    repo: Arc<dyn AlertRepository>,
    market: Arc<dyn MarketData>,
    bar_history: usize,
    max_retries: i64,
    /// Price seen at each alert's previous evaluation, for cross detection.
    /// Process-local; a restart falls back to the alert's baseline.
    prev_prices: Mutex<HashMap<i64, f64>>,
}

impl AlertScanner {
    pub fn new(
        repo: Arc<dyn AlertRepository>,
        market: Arc<dyn MarketData>,
        bar_history: usize,
        max_retries: i64,
    ) -> Self {
        Self {
            repo,
            market,
            bar_history,
            max_retries,
            prev_prices: Mutex::new(HashMap::new()),
        }
    }

    pub async fn scan(&self, now: DateTime<Utc>) -> ScanSummary {
        let mut summary = ScanSummary::default();

        let alerts = match self.repo.find_active_alerts(now).await {
            Ok(alerts) => alerts,
            Err(e) => {
                warn!(error = ?e, "failed to load active alerts, skipping tick");
                summary.errors.push("failed to load active alerts".into());
                return summary;
            }
        };

        for alert in &alerts {
            if !evaluate::is_eligible(alert, now) {
                debug!(alert = alert.id, "alert ineligible, skipped");
                continue;
            }

            summary.processed += 1;
            match self.process_alert(alert, now).await {
                Ok(true) => summary.fired += 1,
                Ok(false) => {}
                Err(message) => {
                    // One alert's failure never aborts the batch
                    summary.errors.push(message);
                }
            }
        }

        info!(
            processed = summary.processed,
            fired = summary.fired,
            errors = summary.errors.len(),
            "scan complete"
        );
        summary
    }

    async fn process_alert(&self, alert: &Alert, now: DateTime<Utc>) -> Result<bool, String> {
        let quote = self
            .market
            .latest_quote(&alert.symbol)
            .await
            .map_err(|e| {
                warn!(alert = alert.id, symbol = %alert.symbol, error = ?e, "quote fetch failed");
                format!("alert {}: quote fetch failed", alert.id)
            })?;

        let bars = if alert.trigger.needs_bars() || alert.volume_confirmation {
            self.market
                .daily_bars(&alert.symbol, self.bar_history)
                .await
                .map_err(|e| {
                    warn!(alert = alert.id, symbol = %alert.symbol, error = ?e, "bar fetch failed");
                    format!("alert {}: bar fetch failed", alert.id)
                })?
        } else {
            Vec::new()
        };

        let prev_price = {
            let cache = self.prev_prices.lock().await;
            cache.get(&alert.id).copied().or(Some(alert.baseline_price))
        };

        let evaluation = evaluate::evaluate(alert, &quote, prev_price, &bars, now).map_err(|e| {
            warn!(alert = alert.id, error = ?e, "evaluation failed");
            format!("alert {}: evaluation failed", alert.id)
        })?;

        self.prev_prices
            .lock()
            .await
            .insert(alert.id, quote.last_price);

        if !evaluation.fired {
            return Ok(false);
        }

        let entries = enqueue::build_entries(alert, &evaluation, now, self.max_retries);
        let entry_count = entries.len();

        let firing = NewFiring {
            alert_id: alert.id,
            user_id: alert.user_id,
            stock_id: alert.stock_id,
            trigger_value: evaluation.trigger_value,
            baseline_price: alert.baseline_price,
            price_change: quote.last_price - alert.baseline_price,
            price_change_pct: if alert.baseline_price > 0.0 {
                percent_change(alert.baseline_price, quote.last_price)
            } else {
                0.0
            },
            volume: quote.volume,
            market_context: evaluation.detail.clone(),
            triggered_at: now,
            entries,
        };

        self.repo.record_firing(firing).await.map_err(|e| {
            warn!(alert = alert.id, error = ?e, "failed to record firing");
            format!("alert {}: failed to record firing", alert.id)
        })?;

        info!(
            alert = alert.id,
            symbol = %alert.symbol,
            trigger_value = evaluation.trigger_value,
            notifications = entry_count,
            "alert fired"
        );
        Ok(true)
    }
}

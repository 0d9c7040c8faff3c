use chrono::{DateTime, Duration, Utc};
use error_stack::{Report, bail};
use serde_json::json;

use crate::error::IndicatorError;
use crate::indicator::{self, Indicator, average::VolumeMa};
use crate::market::hours;
use crate::model::{
    Alert, Bar, CrossCondition, Quote, ThresholdCondition, TriggerConfig, VolumeCondition,
};

/// Volume window backing the volume-confirmation modifier.
const CONFIRMATION_VOLUME_PERIOD: usize = 20;

/// Result of evaluating one alert against the latest market state.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub fired: bool,
    pub trigger_value: f64,
    /// Market-context snapshot persisted with the firing.
    pub detail: serde_json::Value,
}

/// Whether an alert may fire right now: active, inside its validity window,
/// and past its cooldown. Checked before any market-data I/O.
pub fn is_eligible(alert: &Alert, now: DateTime<Utc>) -> bool {
    if !alert.is_active {
        return false;
    }
    if now < alert.starts_at {
        return false;
    }
    if let Some(ends_at) = alert.ends_at
        && now > ends_at
    {
        return false;
    }
    if let Some(last) = alert.last_triggered
        && now - last < Duration::minutes(alert.cooldown_minutes)
    {
        return false;
    }
    true
}

/// Evaluate an alert's trigger against the latest quote.
///
/// `prev_price` is the price seen at the previous evaluation (the caller
/// seeds it with the alert's baseline before the first sample); cross
/// conditions fire only on the sample where the relationship flips.
/// `bars` must hold ascending daily bars for volume/indicator triggers and
/// for volume confirmation; other alerts may pass an empty slice.
pub fn evaluate(
    alert: &Alert,
    quote: &Quote,
    prev_price: Option<f64>,
    bars: &[Bar],
    now: DateTime<Utc>,
) -> Result<Evaluation, Report<IndicatorError>> {
    if alert.market_hours_only && !hours::is_market_open(now) {
        return Ok(Evaluation {
            fired: false,
            trigger_value: quote.last_price,
            detail: json!({ "market_closed": true }),
        });
    }

    let (mut fired, trigger_value, mut detail) = match &alert.trigger {
        TriggerConfig::PriceThreshold {
            condition,
            threshold,
        } => {
            let fired = threshold_met(*condition, quote.last_price, prev_price, *threshold);
            (
                fired,
                quote.last_price,
                json!({ "threshold": threshold, "previous_price": prev_price }),
            )
        }
        TriggerConfig::PercentMove {
            condition,
            threshold_pct,
        } => {
            if alert.baseline_price <= 0.0 {
                bail!(IndicatorError::InvalidParameter {
                    name: "baseline_price must be > 0 for percent-move alerts".into(),
                });
            }
            let pct = percent_change(alert.baseline_price, quote.last_price);
            let prev_pct = prev_price.map(|p| percent_change(alert.baseline_price, p));
            let fired = threshold_met(*condition, pct, prev_pct, *threshold_pct);
            (
                fired,
                pct,
                json!({ "baseline_price": alert.baseline_price, "threshold_pct": threshold_pct }),
            )
        }
        TriggerConfig::Volume { condition, period } => {
            let average = trailing_volume_average(bars, *period)?;
            let fired = match condition {
                VolumeCondition::AboveAverage => quote.volume > average,
                VolumeCondition::BelowAverage => quote.volume < average,
                VolumeCondition::Spike { multiplier } => quote.volume > average * multiplier,
            };
            (
                fired,
                quote.volume,
                json!({ "volume_average": average, "period": period }),
            )
        }
        TriggerConfig::Indicator {
            spec,
            condition,
            threshold,
        } => {
            let series = indicator::build(spec)?.series(bars)?;
            let (current, previous) = last_two(&series);
            let fired = threshold_met(*condition, current, previous, *threshold);
            (
                fired,
                current,
                json!({
                    "indicator": spec.kind.as_str(),
                    "period": spec.period,
                    "threshold": threshold,
                    "previous_value": previous,
                }),
            )
        }
        TriggerConfig::IndicatorCross {
            fast,
            slow,
            condition,
        } => {
            let fast_series = indicator::build(fast)?.series(bars)?;
            let slow_series = indicator::build(slow)?.series(bars)?;
            let (fast_now, fast_prev) = last_two(&fast_series);
            let (slow_now, slow_prev) = last_two(&slow_series);

            let fired = match (fast_prev, slow_prev) {
                (Some(fp), Some(sp)) => match condition {
                    CrossCondition::CrossesAbove => fp <= sp && fast_now > slow_now,
                    CrossCondition::CrossesBelow => fp >= sp && fast_now < slow_now,
                },
                // A cross needs two consecutive observations of both lines.
                _ => false,
            };
            (
                fired,
                fast_now - slow_now,
                json!({
                    "fast": { "indicator": fast.kind.as_str(), "period": fast.period, "value": fast_now },
                    "slow": { "indicator": slow.kind.as_str(), "period": slow.period, "value": slow_now },
                }),
            )
        }
    };

    if fired && alert.volume_confirmation {
        let average = trailing_volume_average(bars, CONFIRMATION_VOLUME_PERIOD)?;
        let confirmed = quote.volume > average;
        if let Some(map) = detail.as_object_mut() {
            map.insert("volume_confirmed".into(), json!(confirmed));
            map.insert("confirmation_volume_average".into(), json!(average));
        }
        fired = confirmed;
    }

    if let Some(map) = detail.as_object_mut() {
        map.insert("trigger".into(), json!(alert.trigger.label()));
        map.insert("symbol".into(), json!(quote.symbol));
        map.insert("price".into(), json!(quote.last_price));
        map.insert("volume".into(), json!(quote.volume));
        map.insert("quote_at".into(), json!(quote.timestamp.to_rfc3339()));
    }

    Ok(Evaluation {
        fired,
        trigger_value,
        detail,
    })
}

pub fn percent_change(baseline: f64, price: f64) -> f64 {
    (price - baseline) / baseline * 100.0
}

fn threshold_met(
    condition: ThresholdCondition,
    current: f64,
    previous: Option<f64>,
    threshold: f64,
) -> bool {
    match condition {
        ThresholdCondition::Above => current > threshold,
        ThresholdCondition::Below => current < threshold,
        ThresholdCondition::CrossesAbove => {
            previous.is_some_and(|p| p <= threshold) && current > threshold
        }
        ThresholdCondition::CrossesBelow => {
            previous.is_some_and(|p| p >= threshold) && current < threshold
        }
    }
}

fn last_two(series: &[f64]) -> (f64, Option<f64>) {
    let current = series.last().copied().unwrap_or(0.0);
    let previous = series.len().checked_sub(2).map(|i| series[i]);
    (current, previous)
}

fn trailing_volume_average(bars: &[Bar], period: usize) -> Result<f64, Report<IndicatorError>> {
    let series = VolumeMa::new(period)?.series(bars)?;
    // Non-empty on success
    Ok(series.last().copied().unwrap_or(0.0))
}

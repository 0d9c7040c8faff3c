use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outbound delivery method for a notification.
///
/// String representations match the database encoding (e.g. `"email"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    Email,
    Sms,
    Push,
    Webhook,
}

impl DeliveryMethod {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "email" => Some(Self::Email),
            "sms" => Some(Self::Sms),
            "push" => Some(Self::Push),
            "webhook" => Some(Self::Webhook),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Push => "push",
            Self::Webhook => "webhook",
        }
    }

    pub const ALL: [Self; 4] = [Self::Email, Self::Sms, Self::Push, Self::Webhook];
}

impl fmt::Display for DeliveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One delivery route configured on an alert.
///
/// `target` is the address for the method: an email address, a phone number,
/// a device token, or a webhook URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryChannel {
    pub method: DeliveryMethod,
    pub target: String,
}

/// Lifecycle state of a notification queue entry.
///
/// `pending → processing → {sent | pending (retry) | failed}`.
/// `sent` and `failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Sent,
    Failed,
}

impl QueueStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdCondition {
    Above,
    Below,
    CrossesAbove,
    CrossesBelow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossCondition {
    CrossesAbove,
    CrossesBelow,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VolumeCondition {
    AboveAverage,
    BelowAverage,
    Spike { multiplier: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    Rsi,
    Sma,
    Ema,
    Macd,
    Bollinger,
}

impl IndicatorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rsi => "rsi",
            Self::Sma => "sma",
            Self::Ema => "ema",
            Self::Macd => "macd",
            Self::Bollinger => "bollinger",
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parameters for one indicator computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSpec {
    pub kind: IndicatorKind,
    pub period: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fast_period: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slow_period: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_period: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub std_dev_multiplier: Option<f64>,
}

impl IndicatorSpec {
    pub fn simple(kind: IndicatorKind, period: usize) -> Self {
        Self {
            kind,
            period,
            fast_period: None,
            slow_period: None,
            signal_period: None,
            std_dev_multiplier: None,
        }
    }
}

/// Trigger configuration of an alert, stored as tagged JSON in a single
/// column. Each variant carries exactly the fields its evaluation needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "trigger", rename_all = "snake_case")]
pub enum TriggerConfig {
    PriceThreshold {
        condition: ThresholdCondition,
        threshold: f64,
    },
    PercentMove {
        condition: ThresholdCondition,
        threshold_pct: f64,
    },
    Volume {
        condition: VolumeCondition,
        period: usize,
    },
    Indicator {
        spec: IndicatorSpec,
        condition: ThresholdCondition,
        threshold: f64,
    },
    IndicatorCross {
        fast: IndicatorSpec,
        slow: IndicatorSpec,
        condition: CrossCondition,
    },
}

impl TriggerConfig {
    /// Whether evaluating this trigger needs a historical bar series in
    /// addition to the latest quote.
    pub fn needs_bars(&self) -> bool {
        matches!(
            self,
            Self::Volume { .. } | Self::Indicator { .. } | Self::IndicatorCross { .. }
        )
    }

    /// Short label for logs and rendered notifications.
    pub fn label(&self) -> &'static str {
        match self {
            Self::PriceThreshold { .. } => "price",
            Self::PercentMove { .. } => "percent_move",
            Self::Volume { .. } => "volume",
            Self::Indicator { .. } => "indicator",
            Self::IndicatorCross { .. } => "indicator_cross",
        }
    }
}

/// A user's standing watch rule on one instrument.
#[derive(Debug, Clone)]
pub struct Alert {
    pub id: i64,
    pub user_id: i64,
    pub stock_id: i64,
    pub symbol: String,
    pub name: String,
    pub trigger: TriggerConfig,
    /// Price captured when the alert was created, for percent-move rules
    /// and as the fallback previous sample for cross detection.
    pub baseline_price: f64,
    pub baseline_at: DateTime<Utc>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub cooldown_minutes: i64,
    pub last_triggered: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub market_hours_only: bool,
    pub volume_confirmation: bool,
    /// 1 = most urgent.
    pub priority: i64,
    pub channels: Vec<DeliveryChannel>,
}

/// Everything the repository persists for one firing, in one transaction:
/// the immutable history row, the alert's `last_triggered` update, and the
/// queue entries. History rows are write-only from the engine's side; only
/// a user-driven acknowledgment ever touches them afterwards.
#[derive(Debug, Clone)]
pub struct NewFiring {
    pub alert_id: i64,
    pub user_id: i64,
    pub stock_id: i64,
    pub trigger_value: f64,
    pub baseline_price: f64,
    pub price_change: f64,
    pub price_change_pct: f64,
    pub volume: f64,
    pub market_context: serde_json::Value,
    pub triggered_at: DateTime<Utc>,
    pub entries: Vec<NewQueueEntry>,
}

/// A queue entry about to be inserted; `history_id` is assigned by the
/// repository inside the firing transaction.
#[derive(Debug, Clone)]
pub struct NewQueueEntry {
    pub user_id: i64,
    pub alert_id: i64,
    pub method: DeliveryMethod,
    pub recipient: String,
    pub priority: i64,
    pub subject: String,
    pub body: String,
    pub scheduled_at: DateTime<Utc>,
    pub max_retries: i64,
}

/// One unit of outbound delivery work.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub id: i64,
    pub user_id: i64,
    pub alert_id: i64,
    pub history_id: i64,
    pub method: DeliveryMethod,
    pub recipient: String,
    pub priority: i64,
    pub subject: String,
    pub body: String,
    pub scheduled_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub retry_count: i64,
    pub max_retries: i64,
    pub last_error: Option<String>,
    pub status: QueueStatus,
}

/// Latest traded state of an instrument.
#[derive(Debug, Clone)]
pub struct Quote {
    pub symbol: String,
    pub last_price: f64,
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
}

/// One daily OHLCV bar, used for volume averages and indicator computation.
#[derive(Debug, Clone)]
pub struct Bar {
    pub date: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_method_round_trip() {
        for method in DeliveryMethod::ALL {
            assert_eq!(DeliveryMethod::from_str(method.as_str()), Some(method));
        }
        assert_eq!(DeliveryMethod::from_str("pigeon"), None);
    }

    #[test]
    fn queue_status_round_trip() {
        for status in [
            QueueStatus::Pending,
            QueueStatus::Processing,
            QueueStatus::Sent,
            QueueStatus::Failed,
        ] {
            assert_eq!(QueueStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(QueueStatus::from_str("done"), None);
    }

    #[test]
    fn trigger_config_tagged_json() {
        let trigger = TriggerConfig::PriceThreshold {
            condition: ThresholdCondition::Above,
            threshold: 150.0,
        };
        let json = serde_json::to_string(&trigger).unwrap();
        assert!(json.contains("\"trigger\":\"price_threshold\""));
        let parsed: TriggerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, trigger);
    }

    #[test]
    fn indicator_cross_json_round_trip() {
        let trigger = TriggerConfig::IndicatorCross {
            fast: IndicatorSpec::simple(IndicatorKind::Sma, 20),
            slow: IndicatorSpec::simple(IndicatorKind::Sma, 50),
            condition: CrossCondition::CrossesAbove,
        };
        let json = serde_json::to_string(&trigger).unwrap();
        let parsed: TriggerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, trigger);
    }

    #[test]
    fn volume_spike_json_round_trip() {
        let trigger = TriggerConfig::Volume {
            condition: VolumeCondition::Spike { multiplier: 3.0 },
            period: 20,
        };
        let json = serde_json::to_string(&trigger).unwrap();
        let parsed: TriggerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, trigger);
    }

    #[test]
    fn needs_bars_per_trigger_kind() {
        let price = TriggerConfig::PriceThreshold {
            condition: ThresholdCondition::Above,
            threshold: 1.0,
        };
        let pct = TriggerConfig::PercentMove {
            condition: ThresholdCondition::Above,
            threshold_pct: 5.0,
        };
        let volume = TriggerConfig::Volume {
            condition: VolumeCondition::AboveAverage,
            period: 20,
        };
        assert!(!price.needs_bars());
        assert!(!pct.needs_bars());
        assert!(volume.needs_bars());
    }

    #[test]
    fn unknown_trigger_tag_rejected() {
        let json = r#"{"trigger":"news_sentiment","threshold":0.5}"#;
        assert!(serde_json::from_str::<TriggerConfig>(json).is_err());
    }
}

use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::average::Ema;
use crate::indicator::{Indicator, closes};
use crate::model::Bar;

/// RSI (Relative Strength Index) using Wilder's smoothing method.
pub struct Rsi {
    period: usize,
}

impl Rsi {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        Ok(Self { period })
    }
}

impl Indicator for Rsi {
    fn required_bars(&self) -> usize {
        self.period + 1
    }

    fn series(&self, bars: &[Bar]) -> Result<Vec<f64>, Report<IndicatorError>> {
        let prices = closes(bars);
        if prices.len() < self.required_bars() {
            bail!(IndicatorError::InsufficientData {
                required: self.required_bars(),
                available: prices.len(),
            });
        }

        let deltas: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();

        // Seed with the simple average of the first `period` gains/losses,
        // then apply Wilder smoothing.
        let mut avg_gain: f64 = deltas[..self.period]
            .iter()
            .map(|&d| d.max(0.0))
            .sum::<f64>()
            / self.period as f64;
        let mut avg_loss: f64 = deltas[..self.period]
            .iter()
            .map(|&d| (-d).max(0.0))
            .sum::<f64>()
            / self.period as f64;

        let mut out = vec![rsi_value(avg_gain, avg_loss)];

        for &delta in &deltas[self.period..] {
            let gain = delta.max(0.0);
            let loss = (-delta).max(0.0);
            avg_gain = (avg_gain * (self.period - 1) as f64 + gain) / self.period as f64;
            avg_loss = (avg_loss * (self.period - 1) as f64 + loss) / self.period as f64;
            out.push(rsi_value(avg_gain, avg_loss));
        }

        Ok(out)
    }
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// MACD line (fast EMA minus slow EMA).
pub struct Macd {
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
}

impl Macd {
    pub fn new(
        fast_period: usize,
        slow_period: usize,
        signal_period: usize,
    ) -> Result<Self, Report<IndicatorError>> {
        if fast_period == 0 || slow_period == 0 || signal_period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "all periods must be > 0".into(),
            });
        }
        if fast_period >= slow_period {
            bail!(IndicatorError::InvalidParameter {
                name: "fast_period must be < slow_period".into(),
            });
        }
        Ok(Self {
            fast_period,
            slow_period,
            signal_period,
        })
    }
}

impl Indicator for Macd {
    fn required_bars(&self) -> usize {
        self.slow_period + self.signal_period
    }

    fn series(&self, bars: &[Bar]) -> Result<Vec<f64>, Report<IndicatorError>> {
        let prices = closes(bars);
        if prices.len() < self.required_bars() {
            bail!(IndicatorError::InsufficientData {
                required: self.required_bars(),
                available: prices.len(),
            });
        }

        let fast = Ema::new(self.fast_period)?.over(&prices)?;
        let slow = Ema::new(self.slow_period)?.over(&prices)?;

        // The slow series is shorter by (slow_period - fast_period) points.
        let offset = self.slow_period - self.fast_period;
        let macd_line: Vec<f64> = fast[offset..]
            .iter()
            .zip(slow.iter())
            .map(|(f, s)| f - s)
            .collect();

        Ok(macd_line)
    }
}

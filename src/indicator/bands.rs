use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::average::Sma;
use crate::indicator::{Indicator, closes};
use crate::model::Bar;

pub struct BollingerBands {
    period: usize,
    std_dev_multiplier: f64,
}

impl BollingerBands {
    pub fn new(period: usize, std_dev_multiplier: f64) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        if std_dev_multiplier <= 0.0 {
            bail!(IndicatorError::InvalidParameter {
                name: "std_dev_multiplier must be > 0".into(),
            });
        }
        Ok(Self {
            period,
            std_dev_multiplier,
        })
    }

    /// (upper, middle, lower) band values.
    pub fn bands(&self, bars: &[Bar]) -> Result<Vec<(f64, f64, f64)>, Report<IndicatorError>> {
        let prices = closes(bars);
        if prices.len() < self.period {
            bail!(IndicatorError::InsufficientData {
                required: self.period,
                available: prices.len(),
            });
        }

        let middle = Sma::new(self.period)?.over(&prices)?;

        let bands = prices
            .windows(self.period)
            .zip(middle.iter())
            .map(|(window, &mid)| {
                let variance =
                    window.iter().map(|&p| (p - mid).powi(2)).sum::<f64>() / self.period as f64;
                let std_dev = variance.sqrt();
                (
                    mid + self.std_dev_multiplier * std_dev,
                    mid,
                    mid - self.std_dev_multiplier * std_dev,
                )
            })
            .collect();

        Ok(bands)
    }
}

impl Indicator for BollingerBands {
    fn required_bars(&self) -> usize {
        self.period
    }

    /// Middle band (SMA) values only; threshold rules compare against it.
    fn series(&self, bars: &[Bar]) -> Result<Vec<f64>, Report<IndicatorError>> {
        Ok(self.bands(bars)?.into_iter().map(|(_, m, _)| m).collect())
    }
}

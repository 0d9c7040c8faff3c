use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{Indicator, closes, volumes};
use crate::model::Bar;

fn check_period(period: usize) -> Result<(), Report<IndicatorError>> {
    if period == 0 {
        bail!(IndicatorError::InvalidParameter {
            name: "period must be > 0".into(),
        });
    }
    Ok(())
}

fn rolling_mean(values: &[f64], period: usize) -> Result<Vec<f64>, Report<IndicatorError>> {
    if values.len() < period {
        bail!(IndicatorError::InsufficientData {
            required: period,
            available: values.len(),
        });
    }
    Ok(values
        .windows(period)
        .map(|w| w.iter().sum::<f64>() / period as f64)
        .collect())
}

/// Simple Moving Average of closing prices.
pub struct Sma {
    period: usize,
}

impl Sma {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        check_period(period)?;
        Ok(Self { period })
    }

    /// SMA over a raw value slice; also used by MACD and Bollinger.
    pub fn over(&self, values: &[f64]) -> Result<Vec<f64>, Report<IndicatorError>> {
        rolling_mean(values, self.period)
    }
}

impl Indicator for Sma {
    fn required_bars(&self) -> usize {
        self.period
    }

    fn series(&self, bars: &[Bar]) -> Result<Vec<f64>, Report<IndicatorError>> {
        self.over(&closes(bars))
    }
}

/// Exponential Moving Average, seeded with the SMA of the first `period`
/// values.
pub struct Ema {
    period: usize,
}

impl Ema {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        check_period(period)?;
        Ok(Self { period })
    }

    pub fn over(&self, values: &[f64]) -> Result<Vec<f64>, Report<IndicatorError>> {
        if values.len() < self.period {
            bail!(IndicatorError::InsufficientData {
                required: self.period,
                available: values.len(),
            });
        }

        let k = 2.0 / (self.period as f64 + 1.0);
        let seed: f64 = values[..self.period].iter().sum::<f64>() / self.period as f64;
        let mut ema = seed;
        let mut out = vec![ema];

        for &value in &values[self.period..] {
            ema = value * k + ema * (1.0 - k);
            out.push(ema);
        }

        Ok(out)
    }
}

impl Indicator for Ema {
    fn required_bars(&self) -> usize {
        self.period
    }

    fn series(&self, bars: &[Bar]) -> Result<Vec<f64>, Report<IndicatorError>> {
        self.over(&closes(bars))
    }
}

/// Rolling average of traded volume, used by volume triggers and the
/// volume-confirmation modifier.
pub struct VolumeMa {
    period: usize,
}

impl VolumeMa {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        check_period(period)?;
        Ok(Self { period })
    }
}

impl Indicator for VolumeMa {
    fn required_bars(&self) -> usize {
        self.period
    }

    fn series(&self, bars: &[Bar]) -> Result<Vec<f64>, Report<IndicatorError>> {
        rolling_mean(&volumes(bars), self.period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::testutil::{bars_from_closes, bars_with_volumes};

    #[test]
    fn sma_period_zero_invalid() {
        assert!(Sma::new(0).is_err());
    }

    #[test]
    fn sma_insufficient_data() {
        let sma = Sma::new(5).unwrap();
        assert!(sma.series(&bars_from_closes(&[1.0; 4])).is_err());
    }

    #[test]
    fn sma_known_value() {
        let sma = Sma::new(3).unwrap();
        let values = sma.series(&bars_from_closes(&[1.0, 2.0, 3.0, 4.0])).unwrap();
        assert!((values[0] - 2.0).abs() < 1e-9);
        assert!((values[1] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn ema_period_zero_invalid() {
        assert!(Ema::new(0).is_err());
    }

    #[test]
    fn ema_flat_prices() {
        let ema = Ema::new(3).unwrap();
        let values = ema.series(&bars_from_closes(&[10.0; 6])).unwrap();
        for v in &values {
            assert!((v - 10.0).abs() < 1e-9);
        }
    }

    #[test]
    fn ema_seed_equals_sma() {
        let ema = Ema::new(3).unwrap();
        let values = ema.series(&bars_from_closes(&[1.0, 2.0, 3.0, 4.0])).unwrap();
        // seed = (1+2+3)/3
        assert!((values[0] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn volume_ma_known_value() {
        let vma = VolumeMa::new(3).unwrap();
        let values = vma
            .series(&bars_with_volumes(&[1.0, 2.0, 3.0, 4.0]))
            .unwrap();
        assert!((values[0] - 2.0).abs() < 1e-9);
        assert!((values[1] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn volume_ma_insufficient_data() {
        let vma = VolumeMa::new(5).unwrap();
        assert!(vma.series(&bars_with_volumes(&[1.0; 4])).is_err());
    }
}

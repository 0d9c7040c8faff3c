pub mod average;
pub mod bands;
pub mod oscillator;

use error_stack::Report;

use crate::error::IndicatorError;
use crate::model::{Bar, IndicatorKind, IndicatorSpec};

use average::{Ema, Sma, VolumeMa};
use bands::BollingerBands;
use oscillator::{Macd, Rsi};

/// A technical indicator computed over a slice of daily bars.
///
/// Bars must be in ascending chronological order (oldest first).
pub trait Indicator: Send {
    /// Minimum number of bars required to produce at least one output value.
    fn required_bars(&self) -> usize;

    /// Compute the indicator series, one value per output point. The series
    /// may be shorter than the input depending on the lookback.
    fn series(&self, bars: &[Bar]) -> Result<Vec<f64>, Report<IndicatorError>>;
}

/// Construct the indicator an alert's `IndicatorSpec` describes.
///
/// Parameter validation happens here, so a malformed spec surfaces as a
/// typed error before any market data is touched.
pub fn build(spec: &IndicatorSpec) -> Result<Box<dyn Indicator>, Report<IndicatorError>> {
    match spec.kind {
        IndicatorKind::Rsi => Ok(Box::new(Rsi::new(spec.period)?)),
        IndicatorKind::Sma => Ok(Box::new(Sma::new(spec.period)?)),
        IndicatorKind::Ema => Ok(Box::new(Ema::new(spec.period)?)),
        IndicatorKind::Macd => {
            let fast = spec.fast_period.unwrap_or(12);
            let slow = spec.slow_period.unwrap_or(26);
            let signal = spec.signal_period.unwrap_or(9);
            Ok(Box::new(Macd::new(fast, slow, signal)?))
        }
        IndicatorKind::Bollinger => {
            let mult = spec.std_dev_multiplier.unwrap_or(2.0);
            Ok(Box::new(BollingerBands::new(spec.period, mult)?))
        }
    }
}

/// Closing prices of a bar slice.
pub fn closes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

/// Traded volumes of a bar slice.
pub fn volumes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.volume).collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_rejects_zero_period() {
        let spec = IndicatorSpec::simple(IndicatorKind::Rsi, 0);
        assert!(build(&spec).is_err());
    }

    #[test]
    fn build_macd_defaults() {
        let spec = IndicatorSpec::simple(IndicatorKind::Macd, 0);
        // MACD ignores `period` and falls back to 12/26/9.
        let macd = build(&spec).unwrap();
        assert_eq!(macd.required_bars(), 26 + 9);
    }

    #[test]
    fn build_each_kind() {
        for kind in [
            IndicatorKind::Rsi,
            IndicatorKind::Sma,
            IndicatorKind::Ema,
            IndicatorKind::Bollinger,
        ] {
            let spec = IndicatorSpec::simple(kind, 14);
            assert!(build(&spec).is_ok(), "failed to build {kind}");
        }
    }
}

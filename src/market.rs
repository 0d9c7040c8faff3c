pub mod hours;
pub mod http;

use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::MarketError;
use crate::model::{Bar, Quote};

/// Abstraction over the market data source.
///
/// Uses `BoxFuture` (from `futures` crate) instead of `async fn` in trait
/// to keep the trait object-safe (`dyn MarketData`).
pub trait MarketData: Send + Sync {
    /// Latest traded price/volume for an instrument.
    fn latest_quote(&self, symbol: &str) -> BoxFuture<'_, Result<Quote, Report<MarketError>>>;

    /// Up to `limit` most recent daily bars, ascending chronological order
    /// (oldest first).
    fn daily_bars(
        &self,
        symbol: &str,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Bar>, Report<MarketError>>>;
}

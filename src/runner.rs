use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::dispatch::Dispatcher;
use crate::scanner::AlertScanner;

/// Periodic scan loop. A batch in flight runs to completion; ticks that
/// elapse meanwhile are skipped, not queued, so at most one scan runs at a
/// time.
pub async fn scan_loop(scanner: Arc<AlertScanner>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                scanner.scan(Utc::now()).await;
            }
        }
    }
    info!("scan loop stopped");
}

/// Periodic dispatch loop, independent of the scanner, with the same
/// skip-overdue-ticks behavior.
pub async fn dispatch_loop(
    dispatcher: Arc<Dispatcher>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                dispatcher.dispatch_batch(Utc::now()).await;
            }
        }
    }
    info!("dispatch loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MarketError;
    use crate::market::MarketData;
    use crate::model::{Bar, Quote};
    use crate::repo::AlertRepository;
    use crate::repo::sqlite::testutil::in_memory_repo;
    use crate::scanner::AlertScanner;
    use error_stack::Report;
    use futures::future::BoxFuture;

    struct StubMarket;

    impl MarketData for StubMarket {
        fn latest_quote(
            &self,
            symbol: &str,
        ) -> BoxFuture<'_, Result<Quote, Report<MarketError>>> {
            let symbol = symbol.to_owned();
            Box::pin(async move { Err(Report::new(MarketError::NoQuote { symbol })) })
        }

        fn daily_bars(
            &self,
            _symbol: &str,
            _limit: usize,
        ) -> BoxFuture<'_, Result<Vec<Bar>, Report<MarketError>>> {
            Box::pin(async move { Ok(Vec::new()) })
        }
    }

    #[tokio::test]
    async fn scan_loop_stops_on_cancellation() {
        let repo: Arc<dyn AlertRepository> = Arc::new(in_memory_repo().await);
        let scanner = Arc::new(AlertScanner::new(repo, Arc::new(StubMarket), 200, 3));

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(scan_loop(
            scanner,
            Duration::from_millis(10),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop did not stop after cancellation")
            .unwrap();
    }
}

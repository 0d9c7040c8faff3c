use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use serde::Deserialize;
use tracing::debug;

use crate::config::MarketDataConfig;
use crate::error::MarketError;
use crate::market::MarketData;
use crate::model::{Bar, Quote};

/// REST client for the market data service.
///
/// All requests pass through a direct rate limiter so a large scan batch
/// stays within the upstream request budget, and carry the configured
/// per-request timeout so no evaluation blocks indefinitely.
pub struct HttpMarketData {
    client: reqwest::Client,
    base_url: String,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

#[derive(Debug, Deserialize)]
struct QuoteRow {
    symbol: String,
    last_price: f64,
    volume: f64,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct BarRow {
    date: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl HttpMarketData {
    pub fn new(config: &MarketDataConfig) -> Result<Self, Report<MarketError>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .change_context(MarketError::ClientInit)?;

        let per_second =
            NonZeroU32::new(config.requests_per_second).unwrap_or(nonzero!(1u32));
        let quota = Quota::per_second(per_second);

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        symbol: &str,
    ) -> Result<T, Report<MarketError>> {
        // Wait for the rate limiter before making the request
        self.rate_limiter.until_ready().await;

        let response = request
            .send()
            .await
            .change_context(MarketError::Request {
                symbol: symbol.into(),
            })?;

        if !response.status().is_success() {
            return Err(Report::new(MarketError::Request {
                symbol: symbol.into(),
            })
            .attach(format!("HTTP status: {}", response.status())));
        }

        response
            .json()
            .await
            .change_context(MarketError::ResponseParse {
                symbol: symbol.into(),
            })
    }
}

impl MarketData for HttpMarketData {
    fn latest_quote(&self, symbol: &str) -> BoxFuture<'_, Result<Quote, Report<MarketError>>> {
        let symbol = symbol.to_owned();
        Box::pin(async move {
            let request = self
                .client
                .get(format!("{}/v1/quote/{}", self.base_url, symbol));
            let row: QuoteRow = self.get_json(request, &symbol).await?;

            debug!(symbol = %symbol, price = row.last_price, "quote fetched");

            Ok(Quote {
                symbol: row.symbol,
                last_price: row.last_price,
                volume: row.volume,
                timestamp: row.timestamp,
            })
        })
    }

    fn daily_bars(
        &self,
        symbol: &str,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Bar>, Report<MarketError>>> {
        let symbol = symbol.to_owned();
        Box::pin(async move {
            let request = self
                .client
                .get(format!("{}/v1/history/{}", self.base_url, symbol))
                .query(&[("days", limit as i64)]);
            let rows: Vec<BarRow> = self.get_json(request, &symbol).await?;

            debug!(symbol = %symbol, fetched = rows.len(), "daily bars fetched");

            let mut bars: Vec<Bar> = rows
                .into_iter()
                .map(|r| Bar {
                    date: r.date,
                    open: r.open,
                    high: r.high,
                    low: r.low,
                    close: r.close,
                    volume: r.volume,
                })
                .collect();

            // Ascending chronological order regardless of service ordering
            bars.sort_by_key(|b| b.date);
            Ok(bars)
        })
    }
}

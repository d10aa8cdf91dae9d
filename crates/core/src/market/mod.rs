pub mod types;
pub mod yahoo;

use crate::market::types::{IndexSnapshot, Quote};
use anyhow::Result;
use std::collections::BTreeMap;

pub const NASDAQ_COMPOSITE: &str = "^IXIC";
pub const SP500_EMINI: &str = "ES=F";

/// Symbols quoted as market context for every chat turn.
pub const DEFAULT_SYMBOLS: [&str; 10] = [
    "AAPL", "MSFT", "NVDA", "AMD", "TSLA", "META", "GOOGL", "AMZN", "SMCI", "AVGO",
];

/// Price resolver. A symbol that cannot be resolved maps to `None` rather than
/// an error so callers can drop it before allocation.
#[async_trait::async_trait]
pub trait MarketDataClient: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote>;

    async fn fetch_index_snapshot(&self, symbol: &str) -> Result<IndexSnapshot>;

    async fn get_quotes(&self, symbols: &[String]) -> BTreeMap<String, Option<Quote>> {
        let mut out = BTreeMap::new();
        for symbol in symbols {
            let quote = match self.fetch_quote(symbol).await {
                Ok(q) => Some(q),
                Err(err) => {
                    tracing::warn!(%symbol, error = %err, "quote unavailable");
                    None
                }
            };
            out.insert(symbol.clone(), quote);
        }
        out
    }

    async fn get_index_snapshot(&self, symbol: &str) -> Option<IndexSnapshot> {
        match self.fetch_index_snapshot(symbol).await {
            Ok(s) => Some(s),
            Err(err) => {
                tracing::warn!(%symbol, error = %err, "index snapshot unavailable");
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;

    /// Fixed-price market used by service tests.
    #[derive(Debug, Default)]
    pub struct StaticMarket {
        pub prices: BTreeMap<String, f64>,
    }

    impl StaticMarket {
        pub fn with_prices(prices: &[(&str, f64)]) -> Self {
            Self {
                prices: prices.iter().map(|(s, p)| (s.to_string(), *p)).collect(),
            }
        }
    }

    #[async_trait::async_trait]
    impl MarketDataClient for StaticMarket {
        fn provider_name(&self) -> &'static str {
            "static"
        }

        async fn fetch_quote(&self, symbol: &str) -> Result<Quote> {
            let price = *self
                .prices
                .get(symbol)
                .ok_or_else(|| anyhow::anyhow!("no price for {symbol}"))?;
            types::RawMarketMeta {
                regular_market_price: Some(price),
                ..Default::default()
            }
            .into_quote(0)
            .ok_or_else(|| anyhow::anyhow!("non-positive price for {symbol}"))
        }

        async fn fetch_index_snapshot(&self, symbol: &str) -> Result<IndexSnapshot> {
            anyhow::bail!("no index data for {symbol}")
        }
    }

    #[tokio::test]
    async fn default_get_quotes_maps_failures_to_none() {
        let market = StaticMarket::with_prices(&[("AAPL", 190.0)]);
        let quotes = market
            .get_quotes(&["AAPL".to_string(), "NOPE".to_string()])
            .await;
        assert_eq!(quotes["AAPL"].as_ref().map(|q| q.price), Some(190.0));
        assert!(quotes["NOPE"].is_none());
        assert!(market.get_index_snapshot(NASDAQ_COMPOSITE).await.is_none());
    }
}

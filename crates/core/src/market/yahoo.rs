use crate::config::Settings;
use crate::market::types::{IndexSnapshot, Quote, RawMarketMeta};
use crate::market::MarketDataClient;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const DEFAULT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_RETRIES: u32 = 2;
const USER_AGENT: &str = "Mozilla/5.0 (compatible; northstar/0.1)";

/// Quote client for Yahoo Finance's public chart endpoint.
#[derive(Debug, Clone)]
pub struct YahooFinanceClient {
    http: reqwest::Client,
    base_url: String,
    retries: u32,
}

impl YahooFinanceClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings
            .market_data_base_url
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let timeout_secs = std::env::var("MARKET_DATA_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("MARKET_DATA_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES)
            .max(1);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build market data http client")?;

        Ok(Self {
            http,
            base_url,
            retries,
        })
    }

    fn chart_url(&self, symbol: &str) -> Result<reqwest::Url> {
        let url = format!(
            "{}/v8/finance/chart/{}",
            self.base_url.trim_end_matches('/'),
            encode_symbol(symbol)
        );
        reqwest::Url::parse(&url).with_context(|| format!("invalid market data url: {url}"))
    }

    async fn fetch_meta_once(&self, symbol: &str) -> Result<RawMarketMeta> {
        let url = self.chart_url(symbol)?;
        let res = self
            .http
            .get(url)
            .query(&[("range", "1d"), ("interval", "1d")])
            .send()
            .await
            .context("market data request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read market data response")?;

        if !status.is_success() {
            anyhow::bail!("market data HTTP {status} for {symbol}: {text}");
        }

        let parsed = serde_json::from_str::<ChartResponse>(&text)
            .with_context(|| format!("market data response is not valid chart JSON: {text}"))?;
        parsed.into_meta(symbol)
    }

    async fn fetch_meta(&self, symbol: &str) -> Result<RawMarketMeta> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_meta_once(symbol).await {
                Ok(meta) => return Ok(meta),
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(err);
                    }
                    let backoff = Duration::from_millis(250 << (attempt - 1));
                    tracing::warn!(attempt, %symbol, ?backoff, error = %err, "market data fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl MarketDataClient for YahooFinanceClient {
    fn provider_name(&self) -> &'static str {
        "yahoo_finance"
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote> {
        self.fetch_meta(symbol)
            .await?
            .into_quote(chrono::Utc::now().timestamp_millis())
            .with_context(|| format!("no usable price for {symbol}"))
    }

    async fn fetch_index_snapshot(&self, symbol: &str) -> Result<IndexSnapshot> {
        self.fetch_meta(symbol)
            .await?
            .into_index_snapshot(chrono::Utc::now().timestamp_millis())
            .with_context(|| format!("no usable index level for {symbol}"))
    }

    async fn get_quotes(&self, symbols: &[String]) -> BTreeMap<String, Option<Quote>> {
        let mut set = tokio::task::JoinSet::new();
        for symbol in symbols {
            let client = self.clone();
            let symbol = symbol.clone();
            set.spawn(async move {
                let quote = client.fetch_quote(&symbol).await;
                (symbol, quote)
            });
        }

        let mut out: BTreeMap<String, Option<Quote>> =
            symbols.iter().map(|s| (s.clone(), None)).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((symbol, Ok(quote))) => {
                    out.insert(symbol, Some(quote));
                }
                Ok((symbol, Err(err))) => {
                    tracing::warn!(%symbol, error = %err, "quote unavailable");
                }
                Err(err) => {
                    tracing::error!(error = %err, "quote task failed");
                }
            }
        }
        out
    }
}

// Index symbols carry characters that are not valid in a path segment.
fn encode_symbol(symbol: &str) -> String {
    let mut out = String::with_capacity(symbol.len());
    for c in symbol.trim().chars() {
        match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '.' | '-' | '_' | '=' => out.push(c),
            other => {
                let mut buf = [0u8; 4];
                for b in other.encode_utf8(&mut buf).bytes() {
                    out.push_str(&format!("%{b:02X}"));
                }
            }
        }
    }
    out
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: RawMarketMeta,
}

impl ChartResponse {
    fn into_meta(self, symbol: &str) -> Result<RawMarketMeta> {
        if let Some(err) = self.chart.error.filter(|e| !e.is_null()) {
            anyhow::bail!("market data error for {symbol}: {err}");
        }
        self.chart
            .result
            .and_then(|r| r.into_iter().next())
            .map(|r| r.meta)
            .with_context(|| format!("market data returned no result for {symbol}"))
    }
}

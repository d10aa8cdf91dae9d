use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub low: f64,
    pub high: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub price: f64,
    pub change_percent: f64,
    pub day_range: PriceRange,
    pub fifty_two_week_range: PriceRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<f64>,
    /// Epoch milliseconds at which the quote was taken.
    pub ts: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSnapshot {
    pub price: f64,
    pub change_percent: f64,
    pub ts: i64,
}

/// Raw market fields as returned by the quote source. Everything but the
/// symbol is optional; a quote is only usable with a positive price.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMarketMeta {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub regular_market_price: Option<f64>,
    #[serde(default, alias = "chartPreviousClose")]
    pub regular_market_previous_close: Option<f64>,
    #[serde(default)]
    pub regular_market_day_low: Option<f64>,
    #[serde(default)]
    pub regular_market_day_high: Option<f64>,
    #[serde(default)]
    pub fifty_two_week_low: Option<f64>,
    #[serde(default)]
    pub fifty_two_week_high: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<f64>,
}

impl RawMarketMeta {
    fn price(&self) -> Option<f64> {
        self.regular_market_price
            .filter(|p| p.is_finite() && *p > 0.0)
    }

    fn change_percent(&self, price: f64) -> f64 {
        let previous_close = self
            .regular_market_previous_close
            .filter(|p| *p != 0.0)
            .unwrap_or(price);
        if previous_close == 0.0 {
            return 0.0;
        }
        (price - previous_close) / previous_close * 100.0
    }

    pub fn into_quote(self, ts: i64) -> Option<Quote> {
        let price = self.price()?;
        Some(Quote {
            price,
            change_percent: self.change_percent(price),
            day_range: PriceRange {
                low: self.regular_market_day_low.unwrap_or(price),
                high: self.regular_market_day_high.unwrap_or(price),
            },
            fifty_two_week_range: PriceRange {
                low: self.fifty_two_week_low.unwrap_or(price),
                high: self.fifty_two_week_high.unwrap_or(price),
            },
            market_cap: self.market_cap,
            ts,
        })
    }

    pub fn into_index_snapshot(self, ts: i64) -> Option<IndexSnapshot> {
        let price = self.price()?;
        Some(IndexSnapshot {
            price,
            change_percent: self.change_percent(price),
            ts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_full_meta_into_quote() {
        let meta: RawMarketMeta = serde_json::from_value(json!({
            "symbol": "AAPL",
            "regularMarketPrice": 110.0,
            "chartPreviousClose": 100.0,
            "regularMarketDayLow": 108.0,
            "regularMarketDayHigh": 111.5,
            "fiftyTwoWeekLow": 80.0,
            "fiftyTwoWeekHigh": 130.0
        }))
        .unwrap();

        let q = meta.into_quote(42).unwrap();
        assert_eq!(q.price, 110.0);
        assert!((q.change_percent - 10.0).abs() < 1e-9);
        assert_eq!(q.day_range, PriceRange { low: 108.0, high: 111.5 });
        assert_eq!(q.fifty_two_week_range.high, 130.0);
        assert_eq!(q.market_cap, None);
        assert_eq!(q.ts, 42);
    }

    #[test]
    fn missing_ranges_fall_back_to_price() {
        let meta = RawMarketMeta {
            regular_market_price: Some(50.0),
            ..Default::default()
        };
        let q = meta.into_quote(0).unwrap();
        assert_eq!(q.change_percent, 0.0);
        assert_eq!(q.day_range, PriceRange { low: 50.0, high: 50.0 });
        assert_eq!(q.fifty_two_week_range, PriceRange { low: 50.0, high: 50.0 });
    }

    #[test]
    fn zero_or_missing_price_is_absent() {
        let zero = RawMarketMeta {
            regular_market_price: Some(0.0),
            ..Default::default()
        };
        assert!(zero.into_quote(0).is_none());
        assert!(RawMarketMeta::default().into_index_snapshot(0).is_none());
    }

    #[test]
    fn quote_serializes_camel_case() {
        let q = RawMarketMeta {
            regular_market_price: Some(10.0),
            ..Default::default()
        }
        .into_quote(1)
        .unwrap();
        let v = serde_json::to_value(q).unwrap();
        assert!(v.get("changePercent").is_some());
        assert!(v.get("fiftyTwoWeekRange").is_some());
        assert!(v.get("marketCap").is_none());
    }
}

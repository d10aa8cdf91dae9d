use crate::domain::allocation::{build_plan, AllocationPlan, Candidate, TickerWeight};
use crate::domain::contract::{normalize_symbol, PlanRequest};
use crate::market::types::Quote;
use crate::market::MarketDataClient;
use std::collections::BTreeMap;

pub const NOTE_NO_TICKERS: &str = "No tickers provided";
pub const NOTE_NO_PRICES: &str = "Failed to fetch prices for requested tickers";
pub const NOTE_FALLBACK: &str =
    "Error processing plan. Please verify ticker symbols and try again.";

/// Resolves prices for the requested tickers and allocates the budget across
/// the ones that could be priced. Unpriced tickers are left out of the plan.
pub async fn plan_for_tickers(
    market: &dyn MarketDataClient,
    req: &PlanRequest,
) -> anyhow::Result<AllocationPlan> {
    req.validate()?;

    if req.tickers.is_empty() {
        return Ok(AllocationPlan::empty(req.budget, NOTE_NO_TICKERS));
    }

    let tickers: Vec<TickerWeight> = req
        .tickers
        .iter()
        .map(|t| TickerWeight {
            symbol: normalize_symbol(&t.symbol),
            weight: t.weight,
        })
        .collect();
    let symbols: Vec<String> = tickers.iter().map(|t| t.symbol.clone()).collect();
    let quotes = market.get_quotes(&symbols).await;

    let candidates = resolve_candidates(&tickers, &quotes);
    if candidates.is_empty() {
        tracing::warn!(
            provider = market.provider_name(),
            requested = tickers.len(),
            "no requested ticker could be priced"
        );
        return Ok(AllocationPlan::empty(req.budget, NOTE_NO_PRICES));
    }

    tracing::info!(
        risk = %req.risk,
        budget = req.budget,
        requested = tickers.len(),
        priced = candidates.len(),
        "building allocation plan"
    );
    Ok(build_plan(req.budget, &candidates, req.risk))
}

/// Pairs each ticker with its quoted price, in request order, dropping any
/// symbol the resolver could not price.
pub fn resolve_candidates(
    tickers: &[TickerWeight],
    quotes: &BTreeMap<String, Option<Quote>>,
) -> Vec<Candidate> {
    tickers
        .iter()
        .filter_map(|t| match quotes.get(&t.symbol) {
            Some(Some(q)) if q.price.is_finite() && q.price > 0.0 => Some(Candidate {
                symbol: t.symbol.clone(),
                price: q.price,
                weight: Some(t.weight),
            }),
            _ => {
                tracing::debug!(symbol = %t.symbol, "dropping unpriced ticker");
                None
            }
        })
        .collect()
}

/// Returned when planning fails unexpectedly after the request was accepted.
pub fn conservative_fallback_plan(budget: f64) -> AllocationPlan {
    AllocationPlan {
        tickers: vec![
            TickerWeight {
                symbol: "SPY".to_string(),
                weight: 0.5,
            },
            TickerWeight {
                symbol: "QQQ".to_string(),
                weight: 0.5,
            },
        ],
        shares: Vec::new(),
        cash_left: budget,
        notes: vec![NOTE_FALLBACK.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::allocation::RiskTier;
    use crate::market::mock::StaticMarket;

    fn request(budget: f64, tickers: &[(&str, f64)]) -> PlanRequest {
        PlanRequest {
            budget,
            risk: RiskTier::Medium,
            tickers: tickers
                .iter()
                .map(|(s, w)| TickerWeight {
                    symbol: s.to_string(),
                    weight: *w,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn empty_request_yields_noted_empty_plan() {
        let market = StaticMarket::default();
        let plan = plan_for_tickers(&market, &request(500.0, &[])).await.unwrap();
        assert_eq!(plan.cash_left, 500.0);
        assert_eq!(plan.notes, vec![NOTE_NO_TICKERS.to_string()]);
    }

    #[tokio::test]
    async fn unpriced_tickers_are_dropped_before_allocation() {
        let market = StaticMarket::with_prices(&[("AAPL", 100.0), ("MSFT", 200.0)]);
        let req = request(1000.0, &[("aapl", 0.7), ("GONE", 0.2), ("MSFT", 0.3)]);
        let plan = plan_for_tickers(&market, &req).await.unwrap();

        let symbols: Vec<_> = plan.shares.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["AAPL", "MSFT"]);
        assert_eq!(plan.shares[0].shares, 6);
        assert_eq!(plan.shares[1].shares, 1);
        assert!((plan.cash_left - 200.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn nothing_priced_yields_failure_note() {
        let market = StaticMarket::default();
        let plan = plan_for_tickers(&market, &request(1000.0, &[("XYZ", 1.0)]))
            .await
            .unwrap();
        assert!(plan.shares.is_empty());
        assert_eq!(plan.cash_left, 1000.0);
        assert_eq!(plan.notes, vec![NOTE_NO_PRICES.to_string()]);
    }

    #[tokio::test]
    async fn invalid_request_is_rejected() {
        let market = StaticMarket::default();
        assert!(plan_for_tickers(&market, &request(-5.0, &[("AAPL", 0.5)]))
            .await
            .is_err());
    }

    #[test]
    fn fallback_plan_keeps_whole_budget() {
        let plan = conservative_fallback_plan(750.0);
        assert_eq!(plan.tickers.len(), 2);
        assert!(plan.shares.is_empty());
        assert_eq!(plan.cash_left, 750.0);
        assert_eq!(plan.total_allocated(), 0.0);
    }
}

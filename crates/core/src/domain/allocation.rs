use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Fraction of the budget that is never invested. Fixed, not risk-dependent.
pub const CASH_BUFFER_FRACTION: f64 = 0.02;

pub const NOTE_NO_CANDIDATES: &str = "No candidates provided";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskTier {
    Medium,
    MediumHigh,
    High,
}

impl RiskTier {
    pub const ALL: [RiskTier; 3] = [RiskTier::Medium, RiskTier::MediumHigh, RiskTier::High];

    pub fn as_str(self) -> &'static str {
        match self {
            RiskTier::Medium => "medium",
            RiskTier::MediumHigh => "medium-high",
            RiskTier::High => "high",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskTier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "medium" => Ok(RiskTier::Medium),
            "medium-high" | "medium_high" => Ok(RiskTier::MediumHigh),
            "high" => Ok(RiskTier::High),
            other => anyhow::bail!(
                "unknown risk tier {other:?} (expected medium, medium-high or high)"
            ),
        }
    }
}

/// Default distribution over the three tiers for a given risk appetite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierWeights {
    pub medium: f64,
    #[serde(rename = "medium-high")]
    pub medium_high: f64,
    pub high: f64,
}

impl TierWeights {
    pub fn total(&self) -> f64 {
        self.medium + self.medium_high + self.high
    }
}

pub fn default_weights(risk: RiskTier) -> TierWeights {
    match risk {
        RiskTier::Medium => TierWeights {
            medium: 0.60,
            medium_high: 0.30,
            high: 0.10,
        },
        RiskTier::MediumHigh => TierWeights {
            medium: 0.35,
            medium_high: 0.45,
            high: 0.20,
        },
        RiskTier::High => TierWeights {
            medium: 0.20,
            medium_high: 0.40,
            high: 0.40,
        },
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub symbol: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerWeight {
    pub symbol: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareLine {
    pub symbol: String,
    pub shares: u64,
    pub price: f64,
}

impl ShareLine {
    pub fn cost(&self) -> f64 {
        self.shares as f64 * self.price
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationPlan {
    pub tickers: Vec<TickerWeight>,
    pub shares: Vec<ShareLine>,
    pub cash_left: f64,
    pub notes: Vec<String>,
}

impl AllocationPlan {
    /// A plan that invests nothing and explains why.
    pub fn empty(budget: f64, note: impl Into<String>) -> Self {
        Self {
            tickers: Vec::new(),
            shares: Vec::new(),
            cash_left: budget,
            notes: vec![note.into()],
        }
    }

    pub fn total_allocated(&self) -> f64 {
        self.shares.iter().map(ShareLine::cost).sum()
    }
}

/// Converts candidate weights into whole-share purchases.
///
/// Weights are normalized (all-absent or all-zero weights fall back to equal
/// weighting), 2% of the budget is held back, and each slice is floor-rounded
/// to whole shares. Everything not spent ends up in `cash_left`, so
/// `total_allocated() + cash_left == budget`.
///
/// The reported ticker weights are the realized shares of allocated cash, not
/// the requested ones. When nothing could be bought they fall back to the
/// normalized requested weights.
///
/// Callers must pass a positive budget and only candidates with a resolved
/// positive price; these are checked in debug builds only.
pub fn build_plan(budget: f64, candidates: &[Candidate], risk: RiskTier) -> AllocationPlan {
    debug_assert!(budget.is_finite() && budget > 0.0, "budget must be positive");
    debug_assert!(
        candidates.iter().all(|c| c.price.is_finite() && c.price > 0.0),
        "candidate prices must be positive"
    );
    debug_assert!(
        candidates
            .iter()
            .all(|c| !c.symbol.trim().is_empty()),
        "candidate symbols must be non-empty"
    );

    if candidates.is_empty() {
        return AllocationPlan::empty(budget, NOTE_NO_CANDIDATES);
    }

    let effective = effective_weights(candidates);
    let investable_budget = budget * (1.0 - CASH_BUFFER_FRACTION);

    let allocations: Vec<(ShareLine, f64)> = candidates
        .iter()
        .zip(&effective)
        .map(|(candidate, &weight)| {
            let raw_allocation = investable_budget * weight;
            let shares = (raw_allocation / candidate.price).floor().max(0.0) as u64;
            let line = ShareLine {
                symbol: candidate.symbol.clone(),
                shares,
                price: candidate.price,
            };
            (line, weight)
        })
        .collect();

    let total_allocated: f64 = allocations.iter().map(|(line, _)| line.cost()).sum();
    let cash_left = budget - total_allocated;

    let tickers = allocations
        .iter()
        .map(|(line, weight)| TickerWeight {
            symbol: line.symbol.clone(),
            weight: if total_allocated > 0.0 {
                line.cost() / total_allocated
            } else {
                *weight
            },
        })
        .collect();

    let notes = vec![
        format!("Allocated ${total_allocated:.2} of ${budget:.2} budget"),
        format!(
            "Cash buffer: ${cash_left:.2} ({:.1}%)",
            cash_left / budget * 100.0
        ),
    ];

    tracing::debug!(
        %risk,
        budget,
        candidates = candidates.len(),
        total_allocated,
        cash_left,
        "built allocation plan"
    );

    AllocationPlan {
        tickers,
        shares: allocations.into_iter().map(|(line, _)| line).collect(),
        cash_left,
        notes,
    }
}

/// Normalized weights in candidate order. Sums to 1.0 for non-empty input.
pub fn effective_weights(candidates: &[Candidate]) -> Vec<f64> {
    let total_weight: f64 = candidates.iter().map(|c| c.weight.unwrap_or(0.0)).sum();
    if total_weight == 0.0 {
        let equal = 1.0 / candidates.len() as f64;
        return vec![equal; candidates.len()];
    }

    candidates
        .iter()
        .map(|c| c.weight.unwrap_or(0.0) / total_weight)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn candidate(symbol: &str, price: f64, weight: Option<f64>) -> Candidate {
        Candidate {
            symbol: symbol.to_string(),
            price,
            weight,
        }
    }

    fn assert_conserves(plan: &AllocationPlan, budget: f64) {
        assert!((plan.total_allocated() + plan.cash_left - budget).abs() < EPS);
        assert!(plan.cash_left >= 0.0);
    }

    #[test]
    fn default_weight_rows_sum_to_one() {
        for risk in RiskTier::ALL {
            assert!((default_weights(risk).total() - 1.0).abs() < EPS, "{risk}");
        }
    }

    #[test]
    fn default_weights_match_table() {
        let w = default_weights(RiskTier::Medium);
        assert_eq!((w.medium, w.medium_high, w.high), (0.6, 0.3, 0.1));
        let w = default_weights(RiskTier::MediumHigh);
        assert_eq!((w.medium, w.medium_high, w.high), (0.35, 0.45, 0.2));
        let w = default_weights(RiskTier::High);
        assert_eq!((w.medium, w.medium_high, w.high), (0.2, 0.4, 0.4));
    }

    #[test]
    fn tier_weights_serialize_with_kebab_keys() {
        let v = serde_json::to_value(default_weights(RiskTier::High)).unwrap();
        assert_eq!(v["medium-high"], serde_json::json!(0.4));
    }

    #[test]
    fn risk_tier_parses_and_displays() {
        assert_eq!("medium".parse::<RiskTier>().unwrap(), RiskTier::Medium);
        assert_eq!(" Medium-High ".parse::<RiskTier>().unwrap(), RiskTier::MediumHigh);
        assert_eq!("HIGH".parse::<RiskTier>().unwrap(), RiskTier::High);
        assert!("low".parse::<RiskTier>().is_err());
        assert_eq!(RiskTier::MediumHigh.to_string(), "medium-high");

        let v: RiskTier = serde_json::from_str("\"medium-high\"").unwrap();
        assert_eq!(v, RiskTier::MediumHigh);
    }

    #[test]
    fn empty_candidates_return_empty_plan() {
        let plan = build_plan(1000.0, &[], RiskTier::Medium);
        assert!(plan.tickers.is_empty());
        assert!(plan.shares.is_empty());
        assert_eq!(plan.cash_left, 1000.0);
        assert_eq!(plan.notes, vec!["No candidates provided".to_string()]);
    }

    #[test]
    fn missing_weights_split_evenly_and_floor_shares() {
        let candidates = [candidate("AAPL", 150.0, None), candidate("MSFT", 300.0, None)];
        assert_eq!(effective_weights(&candidates), vec![0.5, 0.5]);

        let plan = build_plan(1000.0, &candidates, RiskTier::Medium);
        assert_eq!(plan.shares[0].shares, 3);
        assert_eq!(plan.shares[1].shares, 1);
        assert!((plan.total_allocated() - 750.0).abs() < EPS);
        assert!((plan.cash_left - 250.0).abs() < EPS);
        assert_conserves(&plan, 1000.0);

        assert!((plan.tickers[0].weight - 450.0 / 750.0).abs() < EPS);
        assert!((plan.tickers[1].weight - 300.0 / 750.0).abs() < EPS);
    }

    #[test]
    fn all_zero_weights_fall_back_to_equal() {
        let candidates = [
            candidate("A", 10.0, Some(0.0)),
            candidate("B", 10.0, Some(0.0)),
            candidate("C", 10.0, None),
            candidate("D", 10.0, Some(0.0)),
        ];
        for w in effective_weights(&candidates) {
            assert!((w - 0.25).abs() < EPS);
        }
    }

    #[test]
    fn custom_weights_favor_heavier_ticker() {
        let candidates = [
            candidate("AAPL", 100.0, Some(0.7)),
            candidate("MSFT", 200.0, Some(0.3)),
        ];
        let plan = build_plan(1000.0, &candidates, RiskTier::Medium);
        assert_eq!(plan.shares[0].shares, 6);
        assert_eq!(plan.shares[1].shares, 1);
        assert!(plan.tickers[0].weight > plan.tickers[1].weight);
        assert_conserves(&plan, 1000.0);
    }

    #[test]
    fn partial_weights_normalize_to_one() {
        let candidates = [
            candidate("A", 5.0, Some(0.2)),
            candidate("B", 5.0, None),
            candidate("C", 5.0, Some(0.2)),
        ];
        let effective = effective_weights(&candidates);
        assert_eq!(effective[1], 0.0);
        assert!((effective.iter().sum::<f64>() - 1.0).abs() < EPS);

        let plan = build_plan(1000.0, &candidates, RiskTier::High);
        assert_eq!(plan.shares[1].shares, 0);
        assert_eq!(plan.tickers[1].weight, 0.0);
    }

    #[test]
    fn unaffordable_candidate_keeps_budget_as_cash() {
        let plan = build_plan(100.0, &[candidate("AAPL", 150.0, None)], RiskTier::Medium);
        assert_eq!(plan.shares.len(), 1);
        assert_eq!(plan.shares[0].shares, 0);
        assert_eq!(plan.cash_left, 100.0);
        // Nothing bought: display weight falls back to the requested one.
        assert!((plan.tickers[0].weight - 1.0).abs() < EPS);
    }

    #[test]
    fn unaffordable_candidate_is_not_dropped() {
        let candidates = [
            candidate("CHEAP", 10.0, Some(0.5)),
            candidate("PRICEY", 5000.0, Some(0.5)),
        ];
        let plan = build_plan(1000.0, &candidates, RiskTier::MediumHigh);
        assert_eq!(plan.shares.len(), 2);
        assert_eq!(plan.shares[1].shares, 0);
        assert_eq!(plan.tickers[1].weight, 0.0);
        assert!((plan.tickers[0].weight - 1.0).abs() < EPS);
        assert_conserves(&plan, 1000.0);
    }

    #[test]
    fn preserves_input_order() {
        let candidates = [
            candidate("ZZZ", 1.0, Some(0.1)),
            candidate("AAA", 300.0, Some(0.6)),
            candidate("MMM", 40.0, Some(0.3)),
        ];
        let plan = build_plan(5000.0, &candidates, RiskTier::High);
        let tickers: Vec<_> = plan.tickers.iter().map(|t| t.symbol.as_str()).collect();
        let shares: Vec<_> = plan.shares.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(tickers, vec!["ZZZ", "AAA", "MMM"]);
        assert_eq!(shares, tickers);
    }

    #[test]
    fn cash_buffer_is_two_percent_without_rounding_loss() {
        let candidates = [candidate("AAPL", 50.0, None), candidate("MSFT", 100.0, None)];
        let plan = build_plan(10_000.0, &candidates, RiskTier::Medium);
        let cash_pct = plan.cash_left / 10_000.0 * 100.0;
        assert!((1.0..=3.0).contains(&cash_pct), "cash_pct={cash_pct}");
        assert!((plan.cash_left - 200.0).abs() < 1e-6);
    }

    #[test]
    fn cash_left_never_below_nominal_buffer() {
        let budgets = [137.5, 1000.0, 2500.0, 99_999.99];
        let candidates = [
            candidate("A", 12.34, Some(0.4)),
            candidate("B", 87.0, Some(0.35)),
            candidate("C", 410.5, Some(0.25)),
        ];
        for budget in budgets {
            let plan = build_plan(budget, &candidates, RiskTier::MediumHigh);
            assert!(plan.cash_left >= budget * CASH_BUFFER_FRACTION * (1.0 - 1e-9));
            assert_conserves(&plan, budget);
        }
    }

    #[test]
    fn notes_report_allocation_and_buffer() {
        let candidates = [candidate("AAPL", 150.0, None), candidate("MSFT", 300.0, None)];
        let plan = build_plan(1000.0, &candidates, RiskTier::Medium);
        assert_eq!(
            plan.notes,
            vec![
                "Allocated $750.00 of $1000.00 budget".to_string(),
                "Cash buffer: $250.00 (25.0%)".to_string(),
            ]
        );
    }

    #[test]
    fn plan_serializes_with_cash_left_key() {
        let plan = build_plan(100.0, &[candidate("AAPL", 150.0, None)], RiskTier::Medium);
        let v = serde_json::to_value(&plan).unwrap();
        assert_eq!(v["cashLeft"], serde_json::json!(100.0));
        assert_eq!(v["shares"][0]["shares"], serde_json::json!(0));
        assert!(v.get("cash_left").is_none());
    }
}

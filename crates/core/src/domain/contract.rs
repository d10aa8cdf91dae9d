use crate::domain::allocation::{RiskTier, TickerWeight};
use crate::domain::session::SessionState;
use anyhow::{bail, ensure};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Ticker/weight block as emitted by the language model, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmProposal {
    pub tickers: Vec<LlmProposalTicker>,
    #[serde(default)]
    pub rationale: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmProposalTicker {
    pub symbol: String,
    #[serde(default)]
    pub weight: Option<f64>,
}

/// Validated weight proposal: normalized symbols, weights in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightProposal {
    pub tickers: Vec<TickerWeight>,
    pub rationale: Vec<String>,
}

impl LlmProposal {
    pub fn validate_and_into_proposal(self) -> anyhow::Result<WeightProposal> {
        ensure!(!self.tickers.is_empty(), "proposal must contain at least one ticker");

        let mut seen = BTreeSet::new();
        let mut tickers = Vec::with_capacity(self.tickers.len());
        for t in self.tickers {
            let symbol = normalize_symbol(&t.symbol);
            ensure!(!symbol.is_empty(), "proposal ticker symbol must be non-empty");
            ensure!(seen.insert(symbol.clone()), "duplicate ticker in proposal: {symbol}");

            let weight = t.weight.unwrap_or(0.0);
            validate_weight(&symbol, weight)?;
            tickers.push(TickerWeight { symbol, weight });
        }

        let rationale = self
            .rationale
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(WeightProposal { tickers, rationale })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRequest {
    pub budget: f64,
    pub risk: RiskTier,
    pub tickers: Vec<TickerWeight>,
}

impl PlanRequest {
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_budget(self.budget)?;

        let mut seen = BTreeSet::new();
        for t in &self.tickers {
            let symbol = normalize_symbol(&t.symbol);
            ensure!(!symbol.is_empty(), "ticker symbol must be non-empty");
            ensure!(seen.insert(symbol.clone()), "duplicate ticker: {symbol}");
            validate_weight(&symbol, t.weight)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub budget: f64,
    pub risk: RiskTier,
    #[serde(default)]
    pub session: Option<SessionState>,
}

impl ChatRequest {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.message.trim().is_empty(), "message must be non-empty");
        validate_budget(self.budget)
    }
}

pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_ascii_uppercase()
}

fn validate_budget(budget: f64) -> anyhow::Result<()> {
    ensure!(
        budget.is_finite() && budget > 0.0,
        "budget must be a positive amount (got {budget})"
    );
    Ok(())
}

fn validate_weight(symbol: &str, weight: f64) -> anyhow::Result<()> {
    if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
        bail!("weight for {symbol} must be between 0 and 1 (got {weight})");
    }
    Ok(())
}

use crate::domain::allocation::{AllocationPlan, RiskTier};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

pub const DEFAULT_BUDGET: f64 = 2500.0;
pub const DEFAULT_RISK: RiskTier = RiskTier::MediumHigh;

/// Everything a client needs to resume a conversation: budget, risk tier and
/// the last computed plan. Passed in and handed back explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub session_id: Uuid,
    pub budget: f64,
    pub risk: RiskTier,
    #[serde(default)]
    pub allocation: Option<AllocationPlan>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            budget: DEFAULT_BUDGET,
            risk: DEFAULT_RISK,
            allocation: None,
        }
    }
}

impl SessionState {
    pub fn with_inputs(mut self, budget: f64, risk: RiskTier) -> Self {
        self.budget = budget;
        self.risk = risk;
        self
    }

    pub fn with_allocation(mut self, allocation: Option<AllocationPlan>) -> Self {
        if allocation.is_some() {
            self.allocation = allocation;
        }
        self
    }

    /// Loads a saved session, or starts a fresh one if the file does not exist.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read session file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("session file {} is not valid JSON", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let text = serde_json::to_string_pretty(self).context("failed to serialize session")?;
        std::fs::write(path, text)
            .with_context(|| format!("failed to write session file {}", path.display()))
    }
}

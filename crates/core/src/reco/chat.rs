use crate::domain::allocation::{AllocationPlan, RiskTier};
use crate::domain::contract::{ChatRequest, PlanRequest, WeightProposal};
use crate::domain::session::SessionState;
use crate::llm::{json as llm_json, prompt, ChatMessage, LlmClient};
use crate::market::{self, MarketDataClient};
use crate::reco::plan;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub provider: String,
    pub reply: String,
    pub proposal: Option<WeightProposal>,
    pub plan: Option<AllocationPlan>,
    pub session: SessionState,
}

/// One chat turn: gathers market context, asks the model for ideas, and
/// turns any ticker/weight block in the reply into an allocation plan.
pub async fn run_chat(
    llm: &dyn LlmClient,
    market: &dyn MarketDataClient,
    req: ChatRequest,
) -> anyhow::Result<ChatResponse> {
    req.validate()?;

    let context = market_context(market).await;
    let user_content = prompt::user_prompt(req.budget, req.risk, &req.message, &context);

    let reply = llm
        .chat(prompt::SYSTEM_PROMPT, &[ChatMessage::user(user_content)])
        .await?;

    let proposal = match llm_json::parse_proposal(&reply) {
        Ok(p) => Some(p),
        Err(err) => {
            tracing::warn!(provider = %llm.provider(), error = %err, "no usable proposal in model reply");
            None
        }
    };

    let plan = match &proposal {
        Some(p) => Some(plan_for_proposal(market, req.budget, req.risk, p).await),
        None => None,
    };

    let session = req
        .session
        .unwrap_or_default()
        .with_inputs(req.budget, req.risk)
        .with_allocation(plan.clone());

    Ok(ChatResponse {
        provider: llm.provider().to_string(),
        reply,
        proposal,
        plan,
        session,
    })
}

async fn plan_for_proposal(
    market: &dyn MarketDataClient,
    budget: f64,
    risk: RiskTier,
    proposal: &WeightProposal,
) -> AllocationPlan {
    let req = PlanRequest {
        budget,
        risk,
        tickers: proposal.tickers.clone(),
    };
    match plan::plan_for_tickers(market, &req).await {
        Ok(p) => p,
        Err(err) => {
            tracing::error!(error = %err, "planning from model proposal failed");
            plan::conservative_fallback_plan(budget)
        }
    }
}

/// Index levels and quotes for the default universe. Anything that could not
/// be fetched is left out.
pub async fn market_context(market: &dyn MarketDataClient) -> Value {
    let mut indexes = Map::new();
    for symbol in [market::NASDAQ_COMPOSITE, market::SP500_EMINI] {
        if let Some(snapshot) = market.get_index_snapshot(symbol).await {
            indexes.insert(symbol.to_string(), json!(snapshot));
        }
    }

    let symbols: Vec<String> = market::DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect();
    let quotes: Map<String, Value> = market
        .get_quotes(&symbols)
        .await
        .into_iter()
        .filter_map(|(symbol, quote)| quote.map(|q| (symbol, json!(q))))
        .collect();

    json!({
        "indexes": indexes,
        "quotes": quotes,
    })
}

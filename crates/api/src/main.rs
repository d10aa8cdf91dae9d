use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use northstar_core::domain::allocation::{default_weights, RiskTier, TierWeights};
use northstar_core::domain::contract::{normalize_symbol, ChatRequest, PlanRequest};
use northstar_core::llm::LlmClient;
use northstar_core::market::types::{IndexSnapshot, Quote};
use northstar_core::market::yahoo::YahooFinanceClient;
use northstar_core::market::{self, MarketDataClient};
use northstar_core::reco::{chat, plan};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = northstar_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let market: Arc<dyn MarketDataClient> = Arc::new(YahooFinanceClient::from_settings(&settings)?);

    let llm: Option<Arc<dyn LlmClient>> = match northstar_core::llm::build_client(&settings) {
        Ok(client) => Some(Arc::from(client)),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "LLM client unavailable; starting API without chat");
            None
        }
    };

    let state = AppState { llm, market };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/market", get(get_market))
        .route("/api/weights/:risk", get(get_default_weights))
        .route("/api/plan", post(post_plan))
        .route("/api/chat", post(post_chat))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    llm: Option<Arc<dyn LlmClient>>,
    market: Arc<dyn MarketDataClient>,
}

#[derive(Debug, Deserialize)]
struct MarketQuery {
    symbols: Option<String>,
}

#[derive(Debug, Serialize)]
struct MarketResponse {
    indexes: BTreeMap<String, IndexSnapshot>,
    quotes: BTreeMap<String, Option<Quote>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<String>,
}

async fn get_market(
    State(state): State<AppState>,
    Query(query): Query<MarketQuery>,
) -> Json<MarketResponse> {
    let mut indexes = BTreeMap::new();
    for symbol in [market::NASDAQ_COMPOSITE, market::SP500_EMINI] {
        if let Some(snapshot) = state.market.get_index_snapshot(symbol).await {
            indexes.insert(symbol.to_string(), snapshot);
        }
    }

    let symbols = parse_symbols(query.symbols.as_deref());
    let quotes = if symbols.is_empty() {
        BTreeMap::new()
    } else {
        state.market.get_quotes(&symbols).await
    };

    let errors = quotes
        .iter()
        .filter(|(_, q)| q.is_none())
        .map(|(symbol, _)| format!("Failed to fetch quote for {symbol}"))
        .collect();

    Json(MarketResponse {
        indexes,
        quotes,
        errors,
    })
}

async fn get_default_weights(Path(risk): Path<String>) -> Result<Json<TierWeights>, Response> {
    let risk = risk
        .parse::<RiskTier>()
        .map_err(|e| invalid_request(&e.to_string()))?;
    Ok(Json(default_weights(risk)))
}

async fn post_plan(
    State(state): State<AppState>,
    payload: Result<Json<PlanRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return invalid_request(&rejection.body_text()),
    };
    if let Err(e) = req.validate() {
        return invalid_request(&format!("{e:#}"));
    }

    match plan::plan_for_tickers(state.market.as_ref(), &req).await {
        Ok(p) => Json(p).into_response(),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "plan failed; returning conservative fallback");
            Json(plan::conservative_fallback_plan(req.budget)).into_response()
        }
    }
}

async fn post_chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return invalid_request(&rejection.body_text()),
    };
    if let Err(e) = req.validate() {
        return invalid_request(&format!("{e:#}"));
    }

    let Some(llm) = &state.llm else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "Chat is not configured"})),
        )
            .into_response();
    };

    match chat::run_chat(llm.as_ref(), state.market.as_ref(), req).await {
        Ok(res) => Json(res).into_response(),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "chat request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to process chat request"})),
            )
                .into_response()
        }
    }
}

fn invalid_request(details: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": "Invalid request", "details": details})),
    )
        .into_response()
}

fn parse_symbols(raw: Option<&str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for symbol in raw.unwrap_or_default().split(',').map(normalize_symbol) {
        if !symbol.is_empty() && !out.contains(&symbol) {
            out.push(symbol);
        }
    }
    out
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &northstar_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_symbols_normalizes_and_dedupes() {
        assert_eq!(
            parse_symbols(Some(" aapl, MSFT,,msft ,nvda")),
            vec!["AAPL", "MSFT", "NVDA"]
        );
        assert!(parse_symbols(None).is_empty());
        assert!(parse_symbols(Some(" , ")).is_empty());
    }

    #[test]
    fn market_response_omits_empty_errors() {
        let res = MarketResponse {
            indexes: BTreeMap::new(),
            quotes: BTreeMap::from([("AAPL".to_string(), None)]),
            errors: Vec::new(),
        };
        let v = serde_json::to_value(&res).unwrap();
        assert!(v.get("errors").is_none());
        assert_eq!(v["quotes"]["AAPL"], serde_json::Value::Null);
    }
}

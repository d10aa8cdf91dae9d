use anyhow::Context;
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use northstar_core::domain::allocation::{build_plan, default_weights, AllocationPlan, RiskTier, TickerWeight};
use northstar_core::domain::contract::{normalize_symbol, ChatRequest, PlanRequest};
use northstar_core::domain::session::SessionState;
use northstar_core::market::types::{Quote, RawMarketMeta};
use northstar_core::market::yahoo::YahooFinanceClient;
use northstar_core::market::{self, MarketDataClient};
use northstar_core::reco::{chat, plan};

#[derive(Debug, Parser)]
#[command(name = "northstar", about = "Educational stock-idea assistant. Not financial advice.")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Turn tickers and weights into a whole-share plan.
    Plan {
        #[arg(long)]
        budget: f64,

        #[arg(long, default_value = "medium-high")]
        risk: RiskTier,

        /// SYMBOL or SYMBOL=WEIGHT; repeatable. Missing weights split evenly.
        #[arg(long = "ticker", required = true)]
        tickers: Vec<String>,

        /// SYMBOL=PRICE; repeatable. When given, no quotes are fetched and
        /// tickers without a price are left out.
        #[arg(long = "price")]
        prices: Vec<String>,

        /// Print the plan as JSON instead of a table.
        #[arg(long)]
        json: bool,

        /// Write the plan as JSON to this file.
        #[arg(long, conflicts_with = "export_dir")]
        export: Option<PathBuf>,

        /// Write the plan as JSON into this directory with a dated file name.
        #[arg(long)]
        export_dir: Option<PathBuf>,
    },

    /// Show the default tier mix for a risk appetite.
    Weights {
        #[arg(long)]
        risk: RiskTier,
    },

    /// Ask the model for ideas and allocate its proposal.
    Chat {
        #[arg(long)]
        message: String,

        /// Defaults to the session's budget.
        #[arg(long)]
        budget: Option<f64>,

        /// Defaults to the session's risk tier.
        #[arg(long)]
        risk: Option<RiskTier>,

        /// JSON file holding the session; created if missing, updated after the turn.
        #[arg(long)]
        session: Option<PathBuf>,
    },

    /// Show index levels and quotes.
    Market {
        #[arg(long, value_delimiter = ',')]
        symbols: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = northstar_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let res = run(args.command, &settings).await;
    if let Err(err) = &res {
        sentry_anyhow::capture_anyhow(err);
    }
    res
}

async fn run(command: Command, settings: &northstar_core::config::Settings) -> anyhow::Result<()> {
    match command {
        Command::Plan {
            budget,
            risk,
            tickers,
            prices,
            json,
            export,
            export_dir,
        } => {
            let req = PlanRequest {
                budget,
                risk,
                tickers: tickers
                    .iter()
                    .map(|s| parse_ticker_arg(s))
                    .collect::<anyhow::Result<_>>()?,
            };
            req.validate()?;

            let plan = if prices.is_empty() {
                let market = YahooFinanceClient::from_settings(settings)?;
                plan::plan_for_tickers(&market, &req).await?
            } else {
                offline_plan(&req, &prices)?
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                print_plan(&plan, budget);
            }

            let export_path = export.or_else(|| export_dir.map(|d| d.join(default_export_name())));
            if let Some(path) = export_path {
                export_plan(&plan, &path)?;
                tracing::info!(path = %path.display(), "exported plan");
            }
        }
        Command::Weights { risk } => {
            let w = default_weights(risk);
            println!("{risk}:");
            println!("  medium       {:>5.1}%", w.medium * 100.0);
            println!("  medium-high  {:>5.1}%", w.medium_high * 100.0);
            println!("  high         {:>5.1}%", w.high * 100.0);
        }
        Command::Chat {
            message,
            budget,
            risk,
            session,
        } => {
            let state = match &session {
                Some(path) => SessionState::load_or_default(path)?,
                None => SessionState::default(),
            };
            let req = ChatRequest {
                message,
                budget: budget.unwrap_or(state.budget),
                risk: risk.unwrap_or(state.risk),
                session: Some(state),
            };
            let budget = req.budget;

            let llm = northstar_core::llm::build_client(settings)?;
            let market = YahooFinanceClient::from_settings(settings)?;
            let res = chat::run_chat(llm.as_ref(), &market, req).await?;

            println!("{}", res.reply.trim());
            if let Some(plan) = &res.plan {
                println!();
                print_plan(plan, budget);
            }

            if let Some(path) = &session {
                res.session.save(path)?;
                tracing::info!(path = %path.display(), session_id = %res.session.session_id, "saved session");
            }
        }
        Command::Market { symbols } => {
            let market = YahooFinanceClient::from_settings(settings)?;
            for symbol in [market::NASDAQ_COMPOSITE, market::SP500_EMINI] {
                match market.get_index_snapshot(symbol).await {
                    Some(s) => println!("{symbol:<8} {:>12.2} {:>+7.2}%", s.price, s.change_percent),
                    None => println!("{symbol:<8} unavailable"),
                }
            }

            let symbols: Vec<String> = symbols
                .iter()
                .map(|s| normalize_symbol(s))
                .filter(|s| !s.is_empty())
                .collect();
            for (symbol, quote) in market.get_quotes(&symbols).await {
                match quote {
                    Some(q) => println!(
                        "{symbol:<8} {:>12.2} {:>+7.2}%  day {:.2}-{:.2}  52w {:.2}-{:.2}",
                        q.price,
                        q.change_percent,
                        q.day_range.low,
                        q.day_range.high,
                        q.fifty_two_week_range.low,
                        q.fifty_two_week_range.high
                    ),
                    None => println!("{symbol:<8} Failed to fetch quote"),
                }
            }
        }
    }
    Ok(())
}

fn parse_ticker_arg(raw: &str) -> anyhow::Result<TickerWeight> {
    let (symbol, weight) = match raw.split_once('=') {
        Some((s, w)) => {
            let weight = w
                .trim()
                .parse::<f64>()
                .with_context(|| format!("invalid weight in --ticker {raw:?}"))?;
            (s, weight)
        }
        None => (raw, 0.0),
    };
    Ok(TickerWeight {
        symbol: normalize_symbol(symbol),
        weight,
    })
}

fn parse_price_args(prices: &[String]) -> anyhow::Result<BTreeMap<String, Option<Quote>>> {
    let ts = chrono::Utc::now().timestamp_millis();
    let mut out = BTreeMap::new();
    for raw in prices {
        let (symbol, price) = raw
            .split_once('=')
            .with_context(|| format!("--price must be SYMBOL=PRICE (got {raw:?})"))?;
        let price = price
            .trim()
            .parse::<f64>()
            .with_context(|| format!("invalid price in --price {raw:?}"))?;
        let quote = RawMarketMeta {
            regular_market_price: Some(price),
            ..Default::default()
        }
        .into_quote(ts);
        anyhow::ensure!(quote.is_some(), "price must be positive in --price {raw:?}");
        out.insert(normalize_symbol(symbol), quote);
    }
    Ok(out)
}

fn offline_plan(req: &PlanRequest, prices: &[String]) -> anyhow::Result<AllocationPlan> {
    let quotes = parse_price_args(prices)?;
    let candidates = plan::resolve_candidates(&req.tickers, &quotes);
    if candidates.is_empty() {
        return Ok(AllocationPlan::empty(req.budget, plan::NOTE_NO_PRICES));
    }
    Ok(build_plan(req.budget, &candidates, req.risk))
}

fn print_plan(plan: &AllocationPlan, budget: f64) {
    if plan.tickers.is_empty() {
        println!("No allocation.");
    }
    for (ticker, line) in plan.tickers.iter().zip(&plan.shares) {
        println!(
            "{:<8} {:>5.1}%  {} shares @ ${:.2} = ${:.2}",
            ticker.symbol,
            ticker.weight * 100.0,
            line.shares,
            line.price,
            line.cost()
        );
    }
    println!("Cash remaining:  ${:.2}", plan.cash_left);
    println!("Total allocated: ${:.2}", budget - plan.cash_left);
    for note in &plan.notes {
        println!("- {note}");
    }
    println!("Educational illustration only; not financial advice.");
}

fn default_export_name() -> String {
    format!("northstar-plan-{}.json", chrono::Utc::now().format("%Y-%m-%d"))
}

fn export_plan(plan: &AllocationPlan, path: &Path) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(plan).context("failed to serialize plan")?;
    std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
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

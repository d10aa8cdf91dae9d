use crate::domain::allocation::{default_weights, RiskTier};

pub const SYSTEM_PROMPT: &str = "You are NorthStar, an educational market chat companion. \
You help the user brainstorm stock ideas using live market context. You must \
1) restate the user's budget and risk tier, \
2) propose 4-8 tickers with a simple allocation table, \
3) explain three short reasons tied to current index context and each ticker's profile, \
4) compute estimated shares and leftover cash, \
5) add a one-sentence risk note. \
Never provide personalized financial advice. \
If data for a ticker is missing or stale, replace it and say so briefly.

Format your response as natural text, but end with a JSON block like this:

```json
{
  \"tickers\": [
    {\"symbol\": \"AAPL\", \"weight\": 0.25},
    {\"symbol\": \"MSFT\", \"weight\": 0.25}
  ],
  \"rationale\": [\"Reason 1\", \"Reason 2\", \"Reason 3\"]
}
```

The JSON must include tickers with symbols and weights (0-1), and rationale as an array of strings.";

pub fn user_prompt(
    budget: f64,
    risk: RiskTier,
    message: &str,
    market_context: &serde_json::Value,
) -> String {
    let mix = default_weights(risk);
    let context = serde_json::to_string_pretty(market_context)
        .unwrap_or_else(|_| market_context.to_string());

    format!(
        "Budget: ${budget:.2}\n\
Risk tier: {risk}\n\
Suggested tier mix: {:.0}% medium / {:.0}% medium-high / {:.0}% high\n\
User message: {}\n\n\
Current market context:\n{context}\n\n\
Please provide stock recommendations following the format specified.",
        mix.medium * 100.0,
        mix.medium_high * 100.0,
        mix.high * 100.0,
        message.trim(),
    )
}

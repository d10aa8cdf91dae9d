use crate::domain::contract::{LlmProposal, WeightProposal};
use anyhow::Context;

const JSON_FENCE: &str = "```json";
const FENCE: &str = "```";

pub fn extract_json(text: &str) -> Option<String> {
    let trimmed = text.trim();

    // Prefer an explicit ```json block anywhere in the reply; the model is
    // asked to end its prose with one.
    if let Some(start) = trimmed.find(JSON_FENCE) {
        let body = &trimmed[start + JSON_FENCE.len()..];
        let end = body.find(FENCE).unwrap_or(body.len());
        return Some(body[..end].trim().to_string());
    }

    if trimmed.starts_with(FENCE) {
        let mut inner = trimmed;
        if let Some(after_first) = inner.splitn(2, '\n').nth(1) {
            inner = after_first;
        }
        if let Some(end) = inner.rfind(FENCE) {
            inner = &inner[..end];
        }
        return Some(inner.trim().to_string());
    }

    // Best-effort extraction: first '{' to last '}'.
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(trimmed[start..=end].trim().to_string())
}

pub fn parse_proposal(text: &str) -> anyhow::Result<WeightProposal> {
    let json_str = extract_json(text).context("model reply contains no JSON block")?;
    let parsed = serde_json::from_str::<LlmProposal>(&json_str)
        .with_context(|| format!("model JSON does not match the proposal schema: {json_str}"))?;
    parsed.validate_and_into_proposal()
}

//! Second parse stage: named, pure reconciliation of a raw model JSON map
//! into domain values. Each lookup takes an ordered list of alias keys; the
//! first present, non-null key wins.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::models::enums::{Gender, SeverityLevel};
use crate::models::RiskFinding;

pub type JsonMap = Map<String, Value>;

static INTEGER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-?\d+").unwrap());

pub const DEFAULT_RISK_CONDITION: &str = "Unknown";
pub const DEFAULT_RISK_REASON: &str = "Based on clinical symptom matching.";

pub fn pick_value<'a>(map: &'a JsonMap, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .find(|v| !v.is_null())
}

/// Non-empty trimmed text. Numbers and booleans are rendered as text.
pub fn pick_str(map: &JsonMap, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .filter_map(value_as_text)
        .find(|s| !s.is_empty())
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Integer score from a number (floats are rounded) or from the first signed
/// integer in a string such as `"85/100"`. Callers clamp.
pub fn pick_score(map: &JsonMap, keys: &[&str]) -> Option<i64> {
    keys.iter().filter_map(|k| map.get(*k)).find_map(|v| match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => first_integer(s),
        _ => None,
    })
}

pub fn pick_string_list(map: &JsonMap, keys: &[&str]) -> Vec<String> {
    match pick_value(map, keys) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(value_as_text)
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

pub fn clamp_score(score: i64) -> u8 {
    score.clamp(0, 100) as u8
}

fn first_integer(text: &str) -> Option<i64> {
    INTEGER.find(text).and_then(|m| m.as_str().parse().ok())
}

/// `m…` → Male, `f…` → Female, anything else named → Other.
/// Blank or explicitly unknown values stay unknown.
pub fn parse_gender(text: &str) -> Option<Gender> {
    let lower = text.trim().to_lowercase();
    match lower.as_str() {
        "" | "unknown" | "n/a" | "na" | "null" | "none" => None,
        s if s.starts_with('m') => Some(Gender::Male),
        s if s.starts_with('f') => Some(Gender::Female),
        _ => Some(Gender::Other),
    }
}

pub fn pick_gender(map: &JsonMap, keys: &[&str]) -> Option<Gender> {
    pick_str(map, keys).as_deref().and_then(parse_gender)
}

/// Non-negative integer age from a number or from the digits of free text
/// (`"45 years"`).
pub fn parse_age(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .and_then(|a| u32::try_from(a).ok()),
        Value::String(s) => first_integer(s).and_then(|a| u32::try_from(a).ok()),
        _ => None,
    }
}

pub fn pick_age(map: &JsonMap, keys: &[&str]) -> Option<u32> {
    pick_value(map, keys).and_then(parse_age)
}

/// Risk entry with defaults filled in. The model's level token is ignored:
/// the level is always recomputed from the clamped score.
pub fn reconcile_risk_finding(map: &JsonMap) -> RiskFinding {
    let score = clamp_score(pick_score(map, &["score", "risk_score"]).unwrap_or(0));
    RiskFinding {
        condition: pick_str(map, &["condition", "name"])
            .unwrap_or_else(|| DEFAULT_RISK_CONDITION.to_string()),
        score,
        level: RiskFinding::level_for_score(score),
        reason: pick_str(map, &["reason", "reasoning"])
            .unwrap_or_else(|| DEFAULT_RISK_REASON.to_string()),
    }
}

/// Parse a level token, logging when the model contradicts its own score.
pub fn reconcile_level(token: Option<&str>, derived: SeverityLevel, step: &str) -> SeverityLevel {
    match token.map(|t| (t, SeverityLevel::from_token(t))) {
        Some((_, Some(parsed))) if parsed != derived => {
            tracing::debug!(step, model_level = %parsed, derived_level = %derived, "Model level disagrees with score, using score");
        }
        Some((raw, None)) => {
            tracing::debug!(step, model_level = raw, "Unrecognized level token, using score");
        }
        _ => {}
    }
    derived
}

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// Fenced block whose body is an object. Lazy so the first closing fence wins.
static FENCED_OBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").expect("fence pattern is valid")
});

/// Which parsing strategy recovered the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Direct,
    Fenced,
    BraceSpan,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Direct => "direct",
            Strategy::Fenced => "fenced",
            Strategy::BraceSpan => "brace_span",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseFailure {
    #[error("model output is empty")]
    Empty,
    #[error("model output contains no {{...}} span")]
    NoObject,
    #[error("no strategy produced a JSON object")]
    Exhausted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub strategy: Strategy,
    pub fields: Map<String, Value>,
}

type StrategyFn = fn(&str) -> Option<Map<String, Value>>;

/// Tried in order; the first object wins.
const STRATEGIES: [(Strategy, StrategyFn); 3] = [
    (Strategy::Direct, parse_direct),
    (Strategy::Fenced, parse_fenced),
    (Strategy::BraceSpan, parse_brace_span),
];

/// Recover the first JSON object from free-form model output.
pub fn parse_object(raw: &str) -> Result<Parsed, ParseFailure> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(ParseFailure::Empty);
    }

    for (strategy, attempt) in STRATEGIES {
        if let Some(fields) = attempt(text) {
            return Ok(Parsed { strategy, fields });
        }
    }

    if brace_span(text).is_none() {
        Err(ParseFailure::NoObject)
    } else {
        Err(ParseFailure::Exhausted)
    }
}

fn parse_direct(text: &str) -> Option<Map<String, Value>> {
    let text = text.trim();
    if text.starts_with('{') && text.ends_with('}') {
        as_object(text)
    } else {
        None
    }
}

fn parse_fenced(text: &str) -> Option<Map<String, Value>> {
    let captures = FENCED_OBJECT.captures(text)?;
    as_object(captures.get(1)?.as_str())
}

fn parse_brace_span(text: &str) -> Option<Map<String, Value>> {
    as_object(brace_span(text)?)
}

/// Slice from the first `{` through the last `}`.
fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

fn as_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

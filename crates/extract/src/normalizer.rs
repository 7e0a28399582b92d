use serde_json::{Map, Value, json};

use crate::schema::{FieldRule, FieldShape, SchemaVariant};

pub const MISSING_POINTS_TITLE: &str = "Analysis";
pub const MISSING_POINTS_DETAIL: &str = "Verified but details missing.";

/// Coerce a parsed object into the shape promised by `variant`.
///
/// Keys without a rule pass through untouched, and a value that already has
/// the right shape is left as is, so the function is idempotent.
pub fn normalize(mut fields: Map<String, Value>, variant: SchemaVariant) -> Map<String, Value> {
    for rule in variant.rules() {
        apply_rule(&mut fields, rule);
    }
    fields
}

fn apply_rule(fields: &mut Map<String, Value>, rule: &FieldRule) {
    match fields.get_mut(rule.key) {
        Some(slot) if !slot.is_null() => {
            let value = slot.take();
            *slot = coerce(rule.shape, value);
        }
        Some(slot) => {
            if rule.required {
                *slot = default_for(rule.shape);
            }
        }
        None => {
            if rule.required {
                fields.insert(rule.key.to_string(), default_for(rule.shape));
            }
        }
    }
}

fn default_for(shape: FieldShape) -> Value {
    match shape {
        FieldShape::Score => json!(0),
        FieldShape::Text { default } => json!(default),
        FieldShape::StringList | FieldShape::SourceLinks => json!([]),
        FieldShape::ReasoningPoints => {
            json!([{ "title": MISSING_POINTS_TITLE, "detail": MISSING_POINTS_DETAIL }])
        }
    }
}

fn coerce(shape: FieldShape, value: Value) -> Value {
    match shape {
        FieldShape::Score => coerce_score(&value),
        FieldShape::Text { .. } => match value {
            Value::String(_) => value,
            other => Value::String(stringify(&other)),
        },
        FieldShape::StringList => coerce_string_list(value),
        FieldShape::ReasoningPoints => coerce_reasoning_points(value),
        FieldShape::SourceLinks => coerce_source_links(value),
    }
}

fn coerce_score(value: &Value) -> Value {
    let raw = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };

    let score = raw
        .filter(|s| s.is_finite())
        .map(|s| s.round().clamp(0.0, 100.0) as i64)
        .unwrap_or(0);

    json!(score)
}

fn coerce_string_list(value: Value) -> Value {
    let Value::Array(items) = value else {
        return json!([]);
    };

    let strings: Vec<Value> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(_) => Some(item),
            Value::Null => None,
            Value::Object(ref map) => Some(match map.get("url").and_then(Value::as_str) {
                Some(url) => json!(url),
                None => json!(stringify(&item)),
            }),
            other => Some(json!(stringify(&other))),
        })
        .collect();

    Value::Array(strings)
}

fn coerce_reasoning_points(value: Value) -> Value {
    let items = match value {
        Value::Array(items) => items,
        other => return json!([analysis_point(stringify(&other))]),
    };

    let points: Vec<Value> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(_) => Some(item),
            Value::Null => None,
            other => Some(analysis_point(stringify(&other))),
        })
        .collect();

    if points.is_empty() {
        default_for(FieldShape::ReasoningPoints)
    } else {
        Value::Array(points)
    }
}

fn coerce_source_links(value: Value) -> Value {
    let Value::Array(items) = value else {
        return json!([]);
    };

    let links: Vec<Value> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(_) => Some(item),
            Value::String(url) => Some(json!({ "site_name": site_name(&url), "url": url })),
            _ => None,
        })
        .collect();

    Value::Array(links)
}

fn analysis_point(detail: String) -> Value {
    json!({ "title": MISSING_POINTS_TITLE, "detail": detail })
}

/// Host of a URL without `www.`, or the input itself when it is not a URL.
fn site_name(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        .unwrap_or_else(|| url.to_string())
}

/// Strings as their contents, everything else as compact JSON.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

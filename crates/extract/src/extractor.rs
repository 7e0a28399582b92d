use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::normalizer::normalize;
use crate::parser::{Strategy, parse_object};
use crate::schema::{Assessment, FactCheck, ReasoningPoint, SchemaVariant, to_object};

pub const PARSE_FAILURE_DETAIL: &str = "Could not parse API output.";

/// Normalized analysis handed back to HTTP callers.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedResult {
    pub fields: Map<String, Value>,
    /// `None` when `fields` is a failure placeholder.
    pub strategy: Option<Strategy>,
}

impl ExtractedResult {
    /// Schema-conformant stand-in carrying a zero score and `detail`.
    pub fn placeholder(variant: SchemaVariant, detail: &str) -> Self {
        Self {
            fields: failure_placeholder(variant, detail),
            strategy: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.strategy.is_none()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

pub fn failure_placeholder(variant: SchemaVariant, detail: &str) -> Map<String, Value> {
    match variant {
        SchemaVariant::FactCheck => to_object(&FactCheck {
            score: 0,
            reasoning: detail.to_string(),
            sources: Vec::new(),
        }),
        SchemaVariant::Assessment => to_object(&Assessment {
            score: 0,
            label: "Error".to_string(),
            reasoning_points: vec![ReasoningPoint::new("Error", detail)],
            sources: Vec::new(),
        }),
    }
}

/// Turn raw model text into a normalized result for `variant`.
///
/// Never fails: output that cannot be parsed yields the variant's failure
/// placeholder.
pub fn extract(raw: &str, variant: SchemaVariant) -> ExtractedResult {
    match parse_object(raw) {
        Ok(parsed) => {
            debug!(
                variant = variant.as_str(),
                strategy = parsed.strategy.as_str(),
                keys = parsed.fields.len(),
                "Extracted JSON object from model output"
            );
            ExtractedResult {
                fields: normalize(parsed.fields, variant),
                strategy: Some(parsed.strategy),
            }
        }
        Err(failure) => {
            warn!(
                variant = variant.as_str(),
                output_len = raw.len(),
                error = %failure,
                "Could not extract JSON from model output"
            );
            ExtractedResult::placeholder(variant, PARSE_FAILURE_DETAIL)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scenario_plain_fact_check() {
        let result = extract(r#"{"score": 80, "sources": []}"#, SchemaVariant::FactCheck);
        assert_eq!(result.strategy, Some(Strategy::Direct));
        assert_eq!(result.into_value(), json!({"score": 80, "sources": []}));
    }

    #[test]
    fn test_scenario_missing_sources() {
        let result = extract(r#"{"score": 80}"#, SchemaVariant::FactCheck);
        assert_eq!(result.into_value(), json!({"score": 80, "sources": []}));
    }

    #[test]
    fn test_scenario_fenced_assessment() {
        let result = extract(
            "```json\n{\"score\":10,\"label\":\"Error\"}\n```",
            SchemaVariant::Assessment,
        );
        assert_eq!(result.strategy, Some(Strategy::Fenced));
        assert_eq!(
            result.into_value(),
            json!({
                "score": 10,
                "label": "Error",
                "reasoning_points": [
                    {"title": "Analysis", "detail": "Verified but details missing."}
                ],
                "sources": []
            })
        );
    }

    #[test]
    fn test_scenario_prose_wrapped() {
        let result = extract(
            "Here is the result: {\"label\":\"Suspicious\"} Thanks!",
            SchemaVariant::Assessment,
        );
        assert_eq!(result.strategy, Some(Strategy::BraceSpan));

        let value = result.into_value();
        assert_eq!(value["label"], json!("Suspicious"));
        assert_eq!(value["score"], json!(0));
        assert_eq!(value["sources"], json!([]));
        assert_eq!(value["reasoning_points"][0]["title"], json!("Analysis"));
    }

    #[test]
    fn test_scenario_not_json() {
        let assessment = extract("not json at all", SchemaVariant::Assessment);
        assert!(assessment.is_placeholder());
        assert_eq!(
            assessment.into_value(),
            json!({
                "score": 0,
                "label": "Error",
                "reasoning_points": [{"title": "Error", "detail": "Could not parse API output."}],
                "sources": []
            })
        );

        let fact_check = extract("not json at all", SchemaVariant::FactCheck);
        assert_eq!(
            fact_check.into_value(),
            json!({"score": 0, "reasoning": "Could not parse API output.", "sources": []})
        );
    }

    #[test]
    fn test_fenced_and_plain_agree() {
        let inner = r#"{"score": 64, "label": "Likely True", "reasoning_points": [{"title": "Source", "detail": "Matches AP"}], "sources": [{"site_name": "AP", "url": "https://apnews.com"}]}"#;
        let fenced = format!("Sure!\n```json\n{}\n```", inner);

        assert_eq!(
            extract(&fenced, SchemaVariant::Assessment).fields,
            extract(inner, SchemaVariant::Assessment).fields
        );
    }

    #[test]
    fn test_placeholder_is_already_normalized() {
        for variant in [SchemaVariant::FactCheck, SchemaVariant::Assessment] {
            let fields = failure_placeholder(variant, "upstream timed out");
            assert_eq!(normalize(fields.clone(), variant), fields);
        }
    }

    #[test]
    fn test_extract_is_deterministic() {
        let raw = "noise {\"score\": \"40\", \"reasoning_points\": \"x\"} noise";
        assert_eq!(
            extract(raw, SchemaVariant::Assessment),
            extract(raw, SchemaVariant::Assessment)
        );
    }
}

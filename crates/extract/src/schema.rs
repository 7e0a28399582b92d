use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Response contract selected by the calling route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaVariant {
    /// `{score, reasoning, sources: [string]}`
    FactCheck,
    /// `{score, label, reasoning_points: [{title, detail, bullets?}], sources: [{site_name, url}]}`
    Assessment,
}

impl SchemaVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaVariant::FactCheck => "fact_check",
            SchemaVariant::Assessment => "assessment",
        }
    }

    /// Field rules the normalizer enforces for this variant.
    pub fn rules(&self) -> &'static [FieldRule] {
        match self {
            SchemaVariant::FactCheck => FACT_CHECK_RULES,
            SchemaVariant::Assessment => ASSESSMENT_RULES,
        }
    }
}

/// Expected shape of a single top-level field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldShape {
    /// Integer in `0..=100`.
    Score,
    /// Plain string, with the value used when the field is missing.
    Text { default: &'static str },
    /// Sequence of strings.
    StringList,
    /// Non-empty sequence of `{title, detail, bullets?}` mappings.
    ReasoningPoints,
    /// Sequence of `{site_name, url}` mappings.
    SourceLinks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
    pub key: &'static str,
    pub shape: FieldShape,
    /// Missing required fields are filled with the shape's default.
    pub required: bool,
}

const FACT_CHECK_RULES: &[FieldRule] = &[
    FieldRule { key: "score", shape: FieldShape::Score, required: false },
    FieldRule { key: "reasoning", shape: FieldShape::Text { default: "" }, required: false },
    FieldRule { key: "sources", shape: FieldShape::StringList, required: true },
];

const ASSESSMENT_RULES: &[FieldRule] = &[
    FieldRule { key: "score", shape: FieldShape::Score, required: true },
    FieldRule { key: "label", shape: FieldShape::Text { default: "Unknown" }, required: true },
    FieldRule { key: "reasoning_points", shape: FieldShape::ReasoningPoints, required: true },
    FieldRule { key: "sources", shape: FieldShape::SourceLinks, required: true },
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactCheck {
    pub score: i64,
    pub reasoning: String,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub score: i64,
    pub label: String,
    pub reasoning_points: Vec<ReasoningPoint>,
    pub sources: Vec<SourceLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningPoint {
    pub title: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bullets: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceLink {
    pub site_name: String,
    pub url: String,
}

impl ReasoningPoint {
    pub fn new(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            detail: detail.into(),
            bullets: None,
        }
    }
}

/// Serialize a typed value into a JSON object map.
pub(crate) fn to_object<T: Serialize>(value: &T) -> Map<String, Value> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

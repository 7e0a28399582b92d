use crate::llm::ModelRequest;
use crate::media::InlineImage;
use crate::schema::SchemaVariant;

/// What the caller asked us to look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    Text(String),
    Image(InlineImage),
}

impl Subject {
    pub fn kind(&self) -> &'static str {
        match self {
            Subject::Text(_) => "text",
            Subject::Image(_) => "image",
        }
    }
}

pub fn build_request(subject: &Subject, variant: SchemaVariant) -> ModelRequest {
    let (material, image) = match subject {
        Subject::Text(text) => (format!("TEXT:\n{}", text.trim()), None),
        Subject::Image(image) => (
            "IMAGE: attached. Read any visible text and claims in it.".to_string(),
            Some(image.clone()),
        ),
    };

    let prompt = match variant {
        SchemaVariant::FactCheck => build_fact_check_prompt(&material),
        SchemaVariant::Assessment => build_assessment_prompt(&material),
    };

    ModelRequest { prompt, image }
}

fn build_fact_check_prompt(material: &str) -> String {
    format!(
        r#"You are a fact-checking assistant. Judge how accurate the following material is.

SCHEMA:
{{
  "score": 0-100,
  "reasoning": "short explanation of the verdict",
  "sources": ["https://..."]
}}

RULES:
- score 100 means fully accurate, 0 means fabricated
- Cite only sources you are confident exist
- Output ONLY the JSON object, no markdown, no explanations

{}

JSON OUTPUT:"#,
        material
    )
}

fn build_assessment_prompt(material: &str) -> String {
    format!(
        r#"You are a fact-checking assistant. Assess the claims in the following material.

SCHEMA:
{{
  "score": 0-100,
  "label": "Truth|Likely True|Unverified|Misleading|High Risk",
  "reasoning_points": [
    {{"title": "short heading", "detail": "one or two sentences", "bullets": ["optional supporting point"]}}
  ],
  "sources": [
    {{"site_name": "Publisher", "url": "https://..."}}
  ]
}}

RULES:
- score 81-100 Truth, 61-80 Likely True, 41-60 Unverified, 21-40 Misleading, 0-20 High Risk
- Give 2-4 reasoning points
- Cite only sources you are confident exist
- Output ONLY the JSON object, no markdown, no explanations

{}

JSON OUTPUT:"#,
        material
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_request_embeds_text() {
        let request = build_request(
            &Subject::Text("  The moon is made of cheese. ".to_string()),
            SchemaVariant::FactCheck,
        );
        assert!(request.image.is_none());
        assert!(request.prompt.contains("TEXT:\nThe moon is made of cheese."));
        assert!(request.prompt.contains("\"reasoning\""));
    }

    #[test]
    fn test_image_request_attaches_image() {
        let image = InlineImage {
            mime_type: "image/jpeg".to_string(),
            data: "/9j/".to_string(),
        };
        let request = build_request(&Subject::Image(image.clone()), SchemaVariant::Assessment);
        assert_eq!(request.image, Some(image));
        assert!(request.prompt.contains("reasoning_points"));
    }
}

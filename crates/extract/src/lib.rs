pub mod schema;
pub mod parser;
pub mod normalizer;
pub mod extractor;
pub mod media;
pub mod llm;
pub mod prompt;

pub use schema::{Assessment, FactCheck, FieldRule, FieldShape, ReasoningPoint, SchemaVariant, SourceLink};
pub use parser::{ParseFailure, Strategy, parse_object};
pub use normalizer::normalize;
pub use extractor::{ExtractedResult, PARSE_FAILURE_DETAIL, extract, failure_placeholder};
pub use media::{InlineImage, MediaError, decode_image};
pub use llm::{AnalysisModel, GeminiClient, ModelError, ModelRequest};
pub use prompt::{Subject, build_request};

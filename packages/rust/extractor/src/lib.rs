//! Fact extraction for firmfacts.
//!
//! Two specializations share the deterministic confidence formula:
//! regex pattern extraction over typed filing sections
//! ([`patterns::extract_from_sections`]) and LLM-based extraction over
//! general content chunks ([`llm::LlmExtractor`]). Embedding generation
//! ([`embed::Embedder`]) is an opaque collaborator boundary.

pub mod confidence;
pub mod embed;
pub mod llm;
pub mod patterns;

use firmfacts_shared::{ExtractionMethod, FactData, FactType};

/// One extracted, locally-scored fact before job/tier attribution.
#[derive(Debug, Clone)]
pub struct ExtractedFact {
    pub fact_type: FactType,
    pub fact_data: FactData,
    pub confidence: f64,
    pub source_url: String,
    pub source_text: String,
    pub method: ExtractionMethod,
}

pub use confidence::{average, score};
pub use embed::{DisabledEmbedder, Embedder, HttpEmbedder};
pub use llm::{
    ChatLlmExtractor, DisabledLlmExtractor, LlmCandidate, LlmExtractor, parse_candidates,
    score_candidates,
};
pub use patterns::{Extraction, extract_from_sections};

//! LLM extraction boundary for general (non-filing) content.
//!
//! The LLM is an external collaborator: it proposes typed fact candidates
//! for a chunk, and the local confidence formula rescores every candidate
//! from its evidence — model-reported confidence is never trusted.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use firmfacts_shared::{
    ExtractionMethod, FactData, FactType, FirmfactsError, LlmConfig, Result, RetryPolicy,
    TextChunk,
};

use crate::confidence;
use crate::ExtractedFact;

/// A fact candidate proposed by the LLM before local rescoring.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmCandidate {
    pub fact_type: FactType,
    pub value: String,
    #[serde(default)]
    pub detail: Option<String>,
}

/// Extracts fact candidates from one chunk of general content.
#[async_trait]
pub trait LlmExtractor: Send + Sync {
    /// Propose typed fact candidates for `chunk` about `company`.
    async fn extract(&self, chunk: &TextChunk, company: &str) -> Result<Vec<LlmCandidate>>;
}

/// No-op extractor used when no LLM API key is configured.
pub struct DisabledLlmExtractor;

#[async_trait]
impl LlmExtractor for DisabledLlmExtractor {
    async fn extract(&self, _chunk: &TextChunk, _company: &str) -> Result<Vec<LlmCandidate>> {
        Ok(Vec::new())
    }
}

/// Turn LLM candidates into locally-scored facts for one chunk.
pub fn score_candidates(chunk: &TextChunk, candidates: Vec<LlmCandidate>) -> Vec<ExtractedFact> {
    candidates
        .into_iter()
        .filter_map(|c| {
            let fact_data = fact_data_from(&c)?;
            let confidence =
                confidence::score(ExtractionMethod::Llm, &chunk.content, &fact_data.value_text());
            Some(ExtractedFact {
                fact_type: c.fact_type,
                fact_data,
                confidence,
                source_url: chunk.source_url.clone(),
                source_text: chunk.content.clone(),
                method: ExtractionMethod::Llm,
            })
        })
        .collect()
}

/// Map a candidate's string value into the typed payload for its fact type.
fn fact_data_from(candidate: &LlmCandidate) -> Option<FactData> {
    let value = candidate.value.trim();
    if value.is_empty() {
        return None;
    }

    Some(match candidate.fact_type {
        FactType::Facility => FactData::Facility {
            name: candidate.detail.clone(),
            location: value.into(),
        },
        FactType::EmployeeCount => FactData::EmployeeCount {
            count: value.replace(',', "").parse().ok()?,
        },
        FactType::BusinessDescription => FactData::BusinessDescription {
            description: value.into(),
        },
        FactType::Product => FactData::Product { name: value.into() },
        FactType::Subsidiary => FactData::Subsidiary { name: value.into() },
        FactType::Geography => FactData::Geography {
            region: value.into(),
        },
        FactType::Financial => FactData::Financial {
            metric: candidate.detail.clone().unwrap_or_else(|| "unknown".into()),
            value: value.into(),
        },
        FactType::Personnel => FactData::Personnel {
            name: value.into(),
            role: candidate.detail.clone(),
        },
    })
}

// ---------------------------------------------------------------------------
// Chat-completions client
// ---------------------------------------------------------------------------

/// OpenRouter-style chat-completions extractor.
pub struct ChatLlmExtractor {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl ChatLlmExtractor {
    pub fn new(config: &LlmConfig, api_key: String, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FirmfactsError::extraction(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            retry,
        })
    }

    fn prompt(chunk: &TextChunk, company: &str) -> String {
        format!(
            "Extract facts about the company \"{company}\" from the text below.\n\
             Respond with a JSON array only. Each element: {{\"fact_type\": one of \
             [\"facility\",\"employee_count\",\"business_description\",\"product\",\
             \"subsidiary\",\"geography\",\"financial\",\"personnel\"], \
             \"value\": string, \"detail\": optional string}}.\n\
             Return [] if the text contains no facts about the company.\n\n\
             Text:\n{content}",
            content = chunk.content
        )
    }
}

#[async_trait]
impl LlmExtractor for ChatLlmExtractor {
    async fn extract(&self, chunk: &TextChunk, company: &str) -> Result<Vec<LlmCandidate>> {
        let url = format!("{}/chat/completions", self.base_url);
        let prompt = Self::prompt(chunk, company);

        let content = self
            .retry
            .run("llm-extract", || async {
                let request = ChatRequest {
                    model: &self.model,
                    messages: vec![ChatMessage {
                        role: "user",
                        content: prompt.clone(),
                    }],
                };

                let resp = self
                    .client
                    .post(&url)
                    .bearer_auth(&self.api_key)
                    .json(&request)
                    .send()
                    .await
                    .map_err(|e| FirmfactsError::extraction(format!("{url}: {e}")))?;

                if !resp.status().is_success() {
                    return Err(FirmfactsError::extraction(format!(
                        "{url}: HTTP {}",
                        resp.status()
                    )));
                }

                let parsed: ChatResponse = resp
                    .json()
                    .await
                    .map_err(|e| FirmfactsError::extraction(format!("{url}: decode: {e}")))?;

                parsed
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .ok_or_else(|| FirmfactsError::extraction("empty completion response"))
            })
            .await?;

        let candidates = parse_candidates(&content)?;
        debug!(
            chunk = %chunk.id,
            candidates = candidates.len(),
            "llm extraction complete"
        );
        Ok(candidates)
    }
}

/// Parse the model's JSON array, tolerating markdown code fences.
pub fn parse_candidates(content: &str) -> Result<Vec<LlmCandidate>> {
    static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("valid regex")
    });

    let trimmed = content.trim();
    let payload = FENCE_RE
        .captures(trimmed)
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| trimmed.to_string());

    serde_json::from_str(&payload)
        .map_err(|e| FirmfactsError::extraction(format!("unparseable LLM response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chunk(content: &str) -> TextChunk {
        TextChunk {
            id: uuid::Uuid::now_v7().to_string(),
            content: content.into(),
            source_url: "https://acme.com/about".into(),
            chunk_index: 0,
            word_count: content.split_whitespace().count() as u64,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn parse_candidates_handles_plain_and_fenced_json() {
        let plain = r#"[{"fact_type": "product", "value": "welding arms"}]"#;
        let parsed = parse_candidates(plain).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].fact_type, FactType::Product);

        let fenced = "```json\n[{\"fact_type\": \"geography\", \"value\": \"Japan\"}]\n```";
        let parsed = parse_candidates(fenced).unwrap();
        assert_eq!(parsed[0].fact_type, FactType::Geography);

        assert!(parse_candidates("the text has no facts").is_err());
    }

    #[test]
    fn score_candidates_recomputes_confidence_locally() {
        let chunk = chunk(
            "Acme Industrial employs roughly 4,200 people and operates plants in \
             Germany and Brazil, serving automotive customers across both regions.",
        );
        let candidates = vec![
            LlmCandidate {
                fact_type: FactType::EmployeeCount,
                value: "4200".into(),
                detail: None,
            },
            LlmCandidate {
                fact_type: FactType::Geography,
                value: "Germany".into(),
                detail: None,
            },
        ];

        let facts = score_candidates(&chunk, candidates);
        assert_eq!(facts.len(), 2);

        // llm base 0.8 + evidence > 100 chars + numeric value
        let employees = &facts[0];
        assert!(employees.confidence > 0.95);
        assert_eq!(employees.method, ExtractionMethod::Llm);
        // non-numeric value misses the numeric bonus
        assert!(facts[1].confidence < employees.confidence);
    }

    #[test]
    fn unparseable_counts_are_dropped() {
        let chunk = chunk("Some text about the company workforce.");
        let candidates = vec![LlmCandidate {
            fact_type: FactType::EmployeeCount,
            value: "about four thousand".into(),
            detail: None,
        }];
        assert!(score_candidates(&chunk, candidates).is_empty());
    }

    #[tokio::test]
    async fn chat_extractor_round_trip() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "choices": [{
                "message": {
                    "content": "[{\"fact_type\": \"subsidiary\", \"value\": \"Acme Europe GmbH\"}]"
                }
            }]
        });
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let config = LlmConfig {
            api_key_env: "TEST_KEY".into(),
            base_url: server.uri(),
            model: "test-model".into(),
            timeout_secs: 5,
        };
        let retry = RetryPolicy::new(&firmfacts_shared::RetryConfig {
            max_retries: 0,
            base_delay_ms: 1,
            max_delay_ms: 1,
            exponential_base: 2.0,
        });
        let extractor = ChatLlmExtractor::new(&config, "secret".into(), retry).unwrap();

        let candidates = extractor
            .extract(&chunk("Acme Europe GmbH handles EU sales."), "Acme")
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].value, "Acme Europe GmbH");
    }
}

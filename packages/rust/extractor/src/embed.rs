//! Embedding boundary.
//!
//! Embeddings are produced per chunk by an external OpenAI-compatible
//! endpoint. The vectors themselves are opaque to the pipeline; only the
//! count feeds job progress. When no API key is configured the disabled
//! embedder produces nothing and the embedding step completes empty.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use firmfacts_shared::{EmbeddingConfig, FirmfactsError, Result, RetryPolicy};

/// Produces one vector per input text.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Used when no embedding API key is configured.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    async fn embed(&self, _inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// HTTP embedder
// ---------------------------------------------------------------------------

/// OpenAI-compatible embeddings client with bounded request batches.
pub struct HttpEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    dimensions: Option<usize>,
    batch_size: usize,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Deserialize)]
struct EmbeddingEntry {
    index: usize,
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: String, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FirmfactsError::extraction(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
            dimensions: config.dimensions,
            batch_size: config.batch_size.max(1),
            retry,
        })
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut parsed: EmbeddingResponse = self
            .retry
            .run("embeddings", || async {
                let request = EmbeddingRequest {
                    model: &self.model,
                    input: batch,
                    dimensions: self.dimensions,
                };

                let resp = self
                    .client
                    .post(&self.endpoint)
                    .bearer_auth(&self.api_key)
                    .json(&request)
                    .send()
                    .await
                    .map_err(|e| FirmfactsError::extraction(format!("embeddings: {e}")))?;

                if !resp.status().is_success() {
                    return Err(FirmfactsError::extraction(format!(
                        "embeddings: HTTP {}",
                        resp.status()
                    )));
                }

                resp.json()
                    .await
                    .map_err(|e| FirmfactsError::extraction(format!("embeddings decode: {e}")))
            })
            .await?;

        if parsed.data.len() != batch.len() {
            return Err(FirmfactsError::extraction(format!(
                "embeddings: {} vectors for {} inputs",
                parsed.data.len(),
                batch.len()
            )));
        }

        parsed.data.sort_by_key(|entry| entry.index);
        Ok(parsed.data.into_iter().map(|e| e.embedding).collect())
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(inputs.len());
        for batch in inputs.chunks(self.batch_size) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        debug!(inputs = inputs.len(), "embedded chunk batch");
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use firmfacts_shared::RetryConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn no_retry() -> RetryPolicy {
        RetryPolicy::new(&RetryConfig {
            max_retries: 0,
            base_delay_ms: 1,
            max_delay_ms: 1,
            exponential_base: 2.0,
        })
    }

    fn config(server_uri: &str, batch_size: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            api_key_env: "TEST_KEY".into(),
            base_url: server_uri.to_string(),
            model: "test-embed".into(),
            dimensions: None,
            batch_size,
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn embeds_and_restores_input_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(|req: &Request| {
                let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
                let n = body["input"].as_array().unwrap().len();
                // Respond with indices reversed to prove we re-sort.
                let data: Vec<serde_json::Value> = (0..n)
                    .rev()
                    .map(|i| {
                        serde_json::json!({"index": i, "embedding": [i as f32, 0.5]})
                    })
                    .collect();
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": data}))
            })
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(&config(&server.uri(), 8), "k".into(), no_retry()).unwrap();
        let vectors = embedder
            .embed(&["alpha".into(), "beta".into(), "gamma".into()])
            .await
            .unwrap();

        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[0][0], 0.0);
        assert_eq!(vectors[2][0], 2.0);
    }

    #[tokio::test]
    async fn splits_oversized_input_into_batches() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(|req: &Request| {
                let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
                let n = body["input"].as_array().unwrap().len();
                assert!(n <= 2, "batch size exceeded");
                let data: Vec<serde_json::Value> = (0..n)
                    .map(|i| serde_json::json!({"index": i, "embedding": [1.0]}))
                    .collect();
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": data}))
            })
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(&config(&server.uri(), 2), "k".into(), no_retry()).unwrap();
        let inputs: Vec<String> = (0..5).map(|i| format!("chunk {i}")).collect();
        let vectors = embedder.embed(&inputs).await.unwrap();
        assert_eq!(vectors.len(), 5);
    }

    #[tokio::test]
    async fn vector_count_mismatch_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"data": [{"index": 0, "embedding": [1.0]}]}),
            ))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(&config(&server.uri(), 8), "k".into(), no_retry()).unwrap();
        let result = embedder.embed(&["a".into(), "b".into()]).await;
        assert!(matches!(
            result.unwrap_err(),
            FirmfactsError::Extraction(_)
        ));
    }

    #[tokio::test]
    async fn disabled_embedder_produces_nothing() {
        let vectors = DisabledEmbedder.embed(&["a".into()]).await.unwrap();
        assert!(vectors.is_empty());
    }
}

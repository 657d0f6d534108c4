//! Local Ollama embeddings (`POST {base_url}/api/embeddings`).
//!
//! Ollama embeds one prompt per request, so a batch is a sequential loop.
//! Failures are not retried; the first one aborts the batch.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{http_client, post_json, EmbedError, EmbeddingProvider};
use crate::cancel::CancelToken;
use crate::config::EmbeddingsConfig;

pub const DEFAULT_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

pub fn dimension_for_model(model: &str) -> usize {
    match model {
        "mxbai-embed-large" => 1024,
        "all-minilm" => 384,
        _ => 768,
    }
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaResponse {
    embedding: Vec<f32>,
}

pub struct OllamaProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    dimension: usize,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingsConfig) -> Result<Self, EmbedError> {
        let model = match config.model.trim() {
            "" => DEFAULT_MODEL.to_string(),
            m => m.to_string(),
        };
        let base_url = match config.base_url.trim() {
            "" => DEFAULT_BASE_URL,
            b => b,
        };

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            url: format!("{}/api/embeddings", base_url.trim_end_matches('/')),
            dimension: dimension_for_model(&model),
            model,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        cancel: &CancelToken,
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text, cancel).await?);
        }
        Ok(vectors)
    }

    async fn embed(&self, text: &str, cancel: &CancelToken) -> Result<Vec<f32>, EmbedError> {
        let request = OllamaRequest {
            model: &self.model,
            prompt: text,
        };
        let response: OllamaResponse =
            post_json(&self.client, &self.url, None, &request, cancel).await?;
        if response.embedding.is_empty() {
            return Err(EmbedError::NoEmbeddings);
        }
        Ok(response.embedding)
    }
}

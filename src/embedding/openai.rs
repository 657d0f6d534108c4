//! OpenAI embeddings (`POST {base_url}/embeddings`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    assemble_by_index, http_client, post_json, resolve_api_key, with_backoff, EmbedError,
    EmbeddingProvider, RetryPolicy,
};
use crate::cancel::CancelToken;
use crate::config::EmbeddingsConfig;

pub const DEFAULT_MODEL: &str = "text-embedding-3-large";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Inputs per request accepted by the API.
pub const MAX_BATCH_SIZE: usize = 2048;

/// Vector width for an OpenAI model; unknown models assume the default's.
pub fn dimension_for_model(model: &str) -> usize {
    match model {
        "text-embedding-3-small" | "text-embedding-ada-002" => 1536,
        _ => 3072,
    }
}

/// Only the third-generation models accept a `dimensions` parameter.
fn accepts_dimensions(model: &str) -> bool {
    model.starts_with("text-embedding-3-")
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    url: String,
    model: String,
    dimension: usize,
    retry: RetryPolicy,
}

impl OpenAiProvider {
    /// # Errors
    ///
    /// [`EmbedError::Config`] when neither `api_key` nor `OPENAI_API_KEY` is set.
    pub fn new(config: &EmbeddingsConfig) -> Result<Self, EmbedError> {
        let api_key = resolve_api_key(&config.api_key, API_KEY_ENV)?;
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
            api_key,
            url: format!("{}/embeddings", base_url.trim_end_matches('/')),
            dimension: dimension_for_model(&model),
            model,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn embed_group(
        &self,
        texts: &[String],
        cancel: &CancelToken,
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        let request = EmbeddingRequest {
            input: texts,
            model: &self.model,
            dimensions: accepts_dimensions(&self.model).then_some(self.dimension),
        };

        let response: EmbeddingResponse = with_backoff("openai", &self.retry, cancel, || {
            post_json(&self.client, &self.url, Some(self.api_key.as_str()), &request, cancel)
        })
        .await?;

        assemble_by_index(
            texts.len(),
            response.data.into_iter().map(|d| (d.index, d.embedding)),
        )
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
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
        for group in texts.chunks(MAX_BATCH_SIZE) {
            debug!(model = %self.model, inputs = group.len(), "requesting OpenAI embeddings");
            vectors.extend(self.embed_group(group, cancel).await?);
        }
        Ok(vectors)
    }
}

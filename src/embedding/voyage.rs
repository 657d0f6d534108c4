//! Voyage AI embeddings.
//!
//! `base_url` is the complete endpoint URL, not a prefix. Inputs are sent as
//! `input_type = "document"`; responses are reassembled by `index` because
//! the API does not promise input order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    assemble_by_index, http_client, post_json, resolve_api_key, with_backoff, EmbedError,
    EmbeddingProvider, RetryPolicy,
};
use crate::cancel::CancelToken;
use crate::config::EmbeddingsConfig;

pub const DEFAULT_MODEL: &str = "voyage-3";
pub const DEFAULT_URL: &str = "https://api.voyageai.com/v1/embeddings";
pub const API_KEY_ENV: &str = "VOYAGE_API_KEY";
pub const MAX_BATCH_SIZE: usize = 128;

pub fn dimension_for_model(model: &str) -> usize {
    match model {
        "voyage-3-lite" => 512,
        "voyage-large-2" | "voyage-2" | "voyage-code-2" => 1536,
        _ => 1024,
    }
}

#[derive(Serialize)]
struct VoyageRequest<'a> {
    input: &'a [String],
    model: &'a str,
    input_type: &'static str,
}

#[derive(Deserialize)]
struct VoyageResponse {
    data: Vec<VoyageEmbedding>,
    #[serde(default)]
    usage: Option<VoyageUsage>,
}

#[derive(Deserialize)]
struct VoyageEmbedding {
    embedding: Vec<f64>,
    index: usize,
}

#[derive(Deserialize)]
struct VoyageUsage {
    total_tokens: u64,
}

pub struct VoyageProvider {
    client: reqwest::Client,
    api_key: String,
    url: String,
    model: String,
    dimension: usize,
    retry: RetryPolicy,
}

impl VoyageProvider {
    pub fn new(config: &EmbeddingsConfig) -> Result<Self, EmbedError> {
        let api_key = resolve_api_key(&config.api_key, API_KEY_ENV)?;
        let model = match config.model.trim() {
            "" => DEFAULT_MODEL.to_string(),
            m => m.to_string(),
        };
        let url = match config.base_url.trim() {
            "" => DEFAULT_URL.to_string(),
            u => u.to_string(),
        };

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key,
            url,
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
        let request = VoyageRequest {
            input: texts,
            model: &self.model,
            input_type: "document",
        };

        let response: VoyageResponse = with_backoff("voyage", &self.retry, cancel, || {
            post_json(&self.client, &self.url, Some(self.api_key.as_str()), &request, cancel)
        })
        .await?;

        if let Some(usage) = &response.usage {
            debug!(tokens = usage.total_tokens, "voyage usage");
        }

        assemble_by_index(
            texts.len(),
            response.data.into_iter().map(|d| {
                let vector = d.embedding.into_iter().map(|x| x as f32).collect();
                (d.index, vector)
            }),
        )
    }
}

#[async_trait]
impl EmbeddingProvider for VoyageProvider {
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
            vectors.extend(self.embed_group(group, cancel).await?);
        }
        Ok(vectors)
    }
}

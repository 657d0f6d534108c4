//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and three backends:
//! - **[`OpenAiProvider`]**: OpenAI `/embeddings`, batches of up to 2048 inputs.
//! - **[`VoyageProvider`]**: Voyage AI embeddings, batches of up to 128 inputs.
//! - **[`OllamaProvider`]**: a local Ollama instance, one request per text.
//!
//! # Provider Selection
//!
//! [`create_provider`] builds the closed [`Embedder`] enum once from
//! configuration; callers hold the enum and never re-dispatch on strings.
//!
//! # Retry Strategy
//!
//! The two remote providers retry rate-limit failures only:
//! - HTTP 429, or a rate-limit/quota error code in the JSON body → retry
//! - any other HTTP error → fail immediately
//! - backoff 10s, 20s, 40s, 80s, 120s (doubling, capped), at most 5 retries
//! - every sleep races the caller's [`CancelToken`]

pub mod ollama;
pub mod openai;
pub mod voyage;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::cancel::{CancelToken, Cancelled};
use crate::config::{EmbeddingsConfig, ProviderKind};

pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use voyage::VoyageProvider;

/// Failure modes of an embedding call.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("invalid embedding configuration: {0}")]
    Config(String),
    #[error("rate limited by embedding provider: {0}")]
    RateLimited(String),
    #[error("embedding API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("embedding request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("invalid embedding response: {0}")]
    Decode(String),
    #[error("embedding provider returned no embeddings")]
    NoEmbeddings,
    #[error("embedding call cancelled")]
    Cancelled,
    #[error("still rate limited after {retries} retries: {last}")]
    RetriesExhausted {
        retries: u32,
        #[source]
        last: Box<EmbedError>,
    },
}

impl From<Cancelled> for EmbedError {
    fn from(_: Cancelled) -> Self {
        EmbedError::Cancelled
    }
}

impl EmbedError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, EmbedError::RateLimited(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, EmbedError::Cancelled)
    }

    /// Classify a non-success HTTP response.
    ///
    /// Status 429 wins; otherwise a structured rate-limit code in the body
    /// marks the failure as retryable.
    pub(crate) fn from_response(status: StatusCode, body: String) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS || has_rate_limit_code(&body) {
            EmbedError::RateLimited(format!("{}: {}", status, body))
        } else {
            EmbedError::Api {
                status: status.as_u16(),
                body,
            }
        }
    }

    /// Classify a transport failure.
    ///
    /// Falls back to matching the message only when reqwest carries no status.
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        match err.status() {
            Some(StatusCode::TOO_MANY_REQUESTS) => EmbedError::RateLimited(err.to_string()),
            Some(_) => EmbedError::Transport(err),
            None if mentions_rate_limit(&err.to_string()) => {
                EmbedError::RateLimited(err.to_string())
            }
            None => EmbedError::Transport(err),
        }
    }
}

const RATE_LIMIT_CODES: &[&str] = &["rate_limit_exceeded", "insufficient_quota", "rate_limit"];

/// True when a JSON error body carries a known rate-limit code.
///
/// Understands `{"error": {"code" | "type": ...}}` and `{"code": ...}`.
fn has_rate_limit_code(body: &str) -> bool {
    let Ok(json) = serde_json::from_str::<serde_json::Value>(body) else {
        return false;
    };
    let error = json.get("error").unwrap_or(&json);
    ["code", "type"].iter().any(|key| {
        error
            .get(key)
            .and_then(|v| v.as_str())
            .is_some_and(|code| RATE_LIMIT_CODES.contains(&code))
    })
}

fn mentions_rate_limit(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("429")
        || message.contains("rate limit")
        || message.contains("rate-limit")
        || message.contains("quota")
}

/// Interface every embedding backend implements.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-large"`).
    fn model_name(&self) -> &str;

    /// Width of every vector this provider returns.
    fn dimension(&self) -> usize;

    /// Embed `texts`, returning one vector per input in input order.
    ///
    /// An empty slice yields an empty result without touching the network.
    async fn embed_batch(
        &self,
        texts: &[String],
        cancel: &CancelToken,
    ) -> Result<Vec<Vec<f32>>, EmbedError>;

    async fn embed(&self, text: &str, cancel: &CancelToken) -> Result<Vec<f32>, EmbedError> {
        self.embed_batch(&[text.to_string()], cancel)
            .await?
            .into_iter()
            .next()
            .ok_or(EmbedError::NoEmbeddings)
    }
}

/// The configured provider, selected once at startup.
pub enum Embedder {
    OpenAi(OpenAiProvider),
    Voyage(VoyageProvider),
    Ollama(OllamaProvider),
}

#[async_trait]
impl EmbeddingProvider for Embedder {
    fn model_name(&self) -> &str {
        match self {
            Embedder::OpenAi(p) => p.model_name(),
            Embedder::Voyage(p) => p.model_name(),
            Embedder::Ollama(p) => p.model_name(),
        }
    }

    fn dimension(&self) -> usize {
        match self {
            Embedder::OpenAi(p) => p.dimension(),
            Embedder::Voyage(p) => p.dimension(),
            Embedder::Ollama(p) => p.dimension(),
        }
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        cancel: &CancelToken,
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        match self {
            Embedder::OpenAi(p) => p.embed_batch(texts, cancel).await,
            Embedder::Voyage(p) => p.embed_batch(texts, cancel).await,
            Embedder::Ollama(p) => p.embed_batch(texts, cancel).await,
        }
    }
}

/// Build the provider named by `config.provider`.
///
/// # Errors
///
/// [`EmbedError::Config`] for an unknown provider or a missing API key.
pub fn create_provider(config: &EmbeddingsConfig) -> Result<Embedder, EmbedError> {
    let kind = config
        .provider_kind()
        .map_err(|e| EmbedError::Config(e.to_string()))?;
    Ok(match kind {
        ProviderKind::OpenAi => Embedder::OpenAi(OpenAiProvider::new(config)?),
        ProviderKind::Voyage => Embedder::Voyage(VoyageProvider::new(config)?),
        ProviderKind::Ollama => Embedder::Ollama(OllamaProvider::new(config)?),
    })
}

// ============ Shared HTTP plumbing ============

/// Exponential backoff parameters for rate-limited requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(10),
            max_backoff: Duration::from_secs(120),
            max_retries: 5,
        }
    }
}

/// Run `call` until it succeeds, fails permanently, or retries run out.
///
/// Only [`EmbedError::RateLimited`] is retried.
pub(crate) async fn with_backoff<T, F, Fut>(
    provider: &str,
    policy: &RetryPolicy,
    cancel: &CancelToken,
    mut call: F,
) -> Result<T, EmbedError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EmbedError>>,
{
    let mut delay = policy.initial_backoff;
    let mut retries = 0;

    loop {
        match call().await {
            Err(err) if err.is_rate_limited() => {
                if retries >= policy.max_retries {
                    return Err(EmbedError::RetriesExhausted {
                        retries,
                        last: Box::new(err),
                    });
                }
                retries += 1;
                warn!(
                    provider,
                    retry = retries,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "rate limited, backing off"
                );
                cancel.sleep(delay).await?;
                delay = (delay * 2).min(policy.max_backoff);
            }
            result => return result,
        }
    }
}

pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client, EmbedError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(EmbedError::Transport)
}

/// POST `body` as JSON and decode a JSON response, racing `cancel`.
pub(crate) async fn post_json<B, R>(
    client: &reqwest::Client,
    url: &str,
    api_key: Option<&str>,
    body: &B,
    cancel: &CancelToken,
) -> Result<R, EmbedError>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let mut request = client.post(url).json(body);
    if let Some(key) = api_key {
        request = request.bearer_auth(key);
    }

    let response = cancel
        .run(request.send())
        .await?
        .map_err(EmbedError::from_transport)?;

    let status = response.status();
    if !status.is_success() {
        let body = cancel.run(response.text()).await?.unwrap_or_default();
        return Err(EmbedError::from_response(status, body));
    }

    let bytes = cancel
        .run(response.bytes())
        .await?
        .map_err(EmbedError::from_transport)?;
    serde_json::from_slice(&bytes).map_err(|e| EmbedError::Decode(e.to_string()))
}

/// Place `(index, vector)` pairs into input order.
///
/// Every index in `0..expected` must appear exactly once.
pub(crate) fn assemble_by_index(
    expected: usize,
    items: impl IntoIterator<Item = (usize, Vec<f32>)>,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    let mut items = items.into_iter().peekable();
    if expected > 0 && items.peek().is_none() {
        return Err(EmbedError::NoEmbeddings);
    }

    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for (index, vector) in items {
        let slot = slots.get_mut(index).ok_or_else(|| {
            EmbedError::Decode(format!(
                "embedding index {} out of range for {} inputs",
                index, expected
            ))
        })?;
        if slot.replace(vector).is_some() {
            return Err(EmbedError::Decode(format!(
                "duplicate embedding index {}",
                index
            )));
        }
    }
    slots
        .into_iter()
        .enumerate()
        .map(|(i, v)| v.ok_or_else(|| EmbedError::Decode(format!("missing embedding {}", i))))
        .collect()
}

/// Resolve the API key for a remote provider.
pub(crate) fn resolve_api_key(configured: &str, env_var: &str) -> Result<String, EmbedError> {
    let key = if configured.trim().is_empty() {
        std::env::var(env_var).unwrap_or_default()
    } else {
        configured.trim().to_string()
    };
    if key.is_empty() {
        return Err(EmbedError::Config(format!(
            "API key required: set embeddings.api_key or {}",
            env_var
        )));
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            max_retries,
        }
    }

    #[test]
    fn test_classify_status() {
        assert!(EmbedError::from_response(StatusCode::TOO_MANY_REQUESTS, String::new())
            .is_rate_limited());
        assert!(!EmbedError::from_response(StatusCode::BAD_REQUEST, "bad input".into())
            .is_rate_limited());
        assert!(!EmbedError::from_response(StatusCode::INTERNAL_SERVER_ERROR, String::new())
            .is_rate_limited());
    }

    #[test]
    fn test_classify_structured_code() {
        let body = r#"{"error":{"message":"slow down","type":"requests","code":"rate_limit_exceeded"}}"#;
        assert!(EmbedError::from_response(StatusCode::BAD_REQUEST, body.into()).is_rate_limited());

        let quota = r#"{"error":{"type":"insufficient_quota"}}"#;
        assert!(EmbedError::from_response(StatusCode::FORBIDDEN, quota.into()).is_rate_limited());

        let other = r#"{"error":{"code":"invalid_api_key"}}"#;
        assert!(!EmbedError::from_response(StatusCode::UNAUTHORIZED, other.into()).is_rate_limited());
    }

    #[test]
    fn test_message_fallback() {
        assert!(mentions_rate_limit("upstream said: Rate limit reached"));
        assert!(mentions_rate_limit("HTTP 429"));
        assert!(mentions_rate_limit("rate-limit exceeded for this key"));
        assert!(mentions_rate_limit("monthly quota used up"));
        assert!(!mentions_rate_limit("operation timed out while we iterate"));
    }

    #[test]
    fn test_assemble_out_of_order() {
        let vectors = assemble_by_index(3, vec![(2, vec![2.0]), (0, vec![0.0]), (1, vec![1.0])])
            .unwrap();
        assert_eq!(vectors, vec![vec![0.0], vec![1.0], vec![2.0]]);
    }

    #[test]
    fn test_assemble_rejects_gaps_and_duplicates() {
        assert!(assemble_by_index(2, vec![(0, vec![0.0])]).is_err());
        assert!(assemble_by_index(2, vec![(0, vec![0.0]), (0, vec![0.0])]).is_err());
        assert!(assemble_by_index(1, vec![(5, vec![0.0])]).is_err());
        assert!(matches!(
            assemble_by_index(1, Vec::new()),
            Err(EmbedError::NoEmbeddings)
        ));
    }

    #[tokio::test]
    async fn test_backoff_retries_rate_limit_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = with_backoff("test", &fast_policy(5), &CancelToken::new(), || {
            let calls = calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(EmbedError::RateLimited("slow down".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_backoff_does_not_retry_permanent_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<(), _> = with_backoff("test", &fast_policy(5), &CancelToken::new(), || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(EmbedError::Api {
                    status: 400,
                    body: "bad".into(),
                })
            }
        })
        .await;
        assert!(matches!(result, Err(EmbedError::Api { status: 400, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_backoff_exhausts() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<(), _> = with_backoff("test", &fast_policy(2), &CancelToken::new(), || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(EmbedError::RateLimited("slow down".into()))
            }
        })
        .await;
        assert!(matches!(result, Err(EmbedError::RetriesExhausted { retries: 2, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_backoff_cancelled_during_sleep() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let policy = RetryPolicy {
            initial_backoff: Duration::from_secs(60),
            ..RetryPolicy::default()
        };
        let result: Result<(), _> = with_backoff("test", &policy, &cancel, || async {
            Err(EmbedError::RateLimited("slow down".into()))
        })
        .await;
        assert!(matches!(result, Err(EmbedError::Cancelled)));
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        let config = EmbeddingsConfig {
            provider: "cohere".into(),
            ..EmbeddingsConfig::default()
        };
        assert!(matches!(create_provider(&config), Err(EmbedError::Config(_))));
    }

    #[test]
    fn test_create_provider_dimensions() {
        let config = EmbeddingsConfig {
            provider: "ollama".into(),
            model: "all-minilm".into(),
            ..EmbeddingsConfig::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "all-minilm");
        assert_eq!(provider.dimension(), 384);

        let config = EmbeddingsConfig {
            provider: "voyage".into(),
            api_key: "vk-test".into(),
            ..EmbeddingsConfig::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "voyage-3");
        assert_eq!(provider.dimension(), 1024);
    }
}

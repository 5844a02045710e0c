//! Gemini embedding and generation backends over the Generative Language
//! REST API.
//!
//! This module is only available when the `gemini` feature is enabled.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::TextGenerator;

/// The default Generative Language API base URL.
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// The default embedding model.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";

/// The dimensionality of `text-embedding-004`.
const DEFAULT_DIMENSIONS: usize = 768;

/// `batchEmbedContents` accepts at most this many requests per call.
const MAX_BATCH_SIZE: usize = 100;

/// The default generative model.
const DEFAULT_GENERATION_MODEL: &str = "gemini-2.5-flash-lite";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// A minimal authenticated client shared by the Gemini backends.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    /// Create a client for the public endpoint.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(RagError::ConfigError("Gemini API key must not be empty".into()));
        }
        Ok(Self { http: reqwest::Client::new(), api_key, base_url: GEMINI_BASE_URL.into() })
    }

    /// Create a client from the `GEMINI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV)
            .map_err(|_| RagError::ConfigError(format!("{API_KEY_ENV} environment variable not set")))?;
        Self::new(api_key)
    }

    /// Point the client at a different API root, e.g. a proxy.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// POST `body` to `models/{model}:{method}`; errors are returned as text
    /// for the caller to classify.
    async fn call<B, R>(&self, model: &str, method: &str, body: &B) -> std::result::Result<R, String>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/models/{model}:{method}", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            error!(provider = "Gemini", %status, method, "API error");
            return Err(format!("API returned {status}: {detail}"));
        }

        response.json().await.map_err(|e| format!("failed to parse response: {e}"))
    }
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient").field("base_url", &self.base_url).finish_non_exhaustive()
    }
}

// ── Gemini API request/response types ──────────────────────────────

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: [Part<'a>; 1],
}

impl<'a> Content<'a> {
    fn text(role: Option<&'a str>, text: &'a str) -> Self {
        Self { role, parts: [Part { text }] }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

// ── Embeddings ─────────────────────────────────────────────────────

/// An [`EmbeddingProvider`] backed by the Gemini embedding API.
///
/// Documents are embedded with task type `RETRIEVAL_DOCUMENT` and queries
/// with `RETRIEVAL_QUERY`, so the same provider serves both sides of an index.
///
/// # Example
///
/// ```rust,ignore
/// use campus_rag::gemini::GeminiEmbeddingProvider;
///
/// let provider = GeminiEmbeddingProvider::from_env()?;
/// let embedding = provider.embed("hostel fees").await?;
/// ```
#[derive(Debug, Clone)]
pub struct GeminiEmbeddingProvider {
    client: GeminiClient,
    model: String,
    resource: String,
    model_id: String,
    dimensions: usize,
    output_dimensionality: Option<usize>,
}

impl GeminiEmbeddingProvider {
    /// Create a provider for `text-embedding-004` with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self::from_client(GeminiClient::new(api_key)?))
    }

    /// Create a provider using the `GEMINI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        Ok(Self::from_client(GeminiClient::from_env()?))
    }

    /// Create a provider over an existing client.
    pub fn from_client(client: GeminiClient) -> Self {
        let mut provider = Self {
            client,
            model: String::new(),
            resource: String::new(),
            model_id: String::new(),
            dimensions: DEFAULT_DIMENSIONS,
            output_dimensionality: None,
        };
        provider.set_model(DEFAULT_EMBEDDING_MODEL);
        provider
    }

    /// Use a different embedding model. Set its dimensions too if they differ.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.set_model(&model.into());
        self
    }

    /// Request vectors truncated to `dims`.
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.output_dimensionality = Some(dims);
        self.model_id = format!("gemini/{}@{dims}", self.model);
        self
    }

    fn set_model(&mut self, model: &str) {
        let model = model.trim_start_matches("models/");
        self.model = model.to_string();
        self.resource = format!("models/{model}");
        self.model_id = match self.output_dimensionality {
            Some(dims) => format!("gemini/{model}@{dims}"),
            None => format!("gemini/{model}"),
        };
    }

    fn request<'a>(&'a self, text: &'a str, task_type: &'static str) -> EmbedContentRequest<'a> {
        EmbedContentRequest {
            model: &self.resource,
            content: Content::text(None, text),
            task_type,
            output_dimensionality: self.output_dimensionality,
        }
    }

    /// Split `texts` into `batchEmbedContents` bodies of at most
    /// [`MAX_BATCH_SIZE`] requests, preserving order.
    fn batch_requests<'a>(&'a self, texts: &[&'a str]) -> Vec<BatchEmbedRequest<'a>> {
        texts
            .chunks(MAX_BATCH_SIZE)
            .map(|batch| BatchEmbedRequest {
                requests: batch.iter().map(|&t| self.request(t, "RETRIEVAL_DOCUMENT")).collect(),
            })
            .collect()
    }

    fn error(&self, message: String) -> RagError {
        RagError::EmbeddingError { provider: self.model_id.clone(), message }
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddingProvider {
    #[instrument(skip_all, fields(model = %self.model, text_len = text.len()))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response: EmbedContentResponse = self
            .client
            .call(&self.model, "embedContent", &self.request(text, "RETRIEVAL_QUERY"))
            .await
            .map_err(|e| self.error(e))?;
        Ok(response.embedding.values)
    }

    #[instrument(skip_all, fields(model = %self.model, batch_size = texts.len()))]
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(provider = "Gemini", batch_size = texts.len(), "embedding batch");

        let mut embeddings = Vec::with_capacity(texts.len());
        for body in self.batch_requests(texts) {
            let response: BatchEmbedResponse = self
                .client
                .call(&self.model, "batchEmbedContents", &body)
                .await
                .map_err(|e| self.error(e))?;
            if response.embeddings.len() != body.requests.len() {
                return Err(self.error(format!(
                    "expected {} embeddings, got {}",
                    body.requests.len(),
                    response.embeddings.len()
                )));
            }
            embeddings.extend(response.embeddings.into_iter().map(|e| e.values));
        }
        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ── Generation ─────────────────────────────────────────────────────

/// A [`TextGenerator`] backed by Gemini `generateContent`.
#[derive(Debug, Clone)]
pub struct GeminiGenerator {
    client: GeminiClient,
    model: String,
    model_id: String,
    max_output_tokens: u32,
}

impl GeminiGenerator {
    /// Create a generator for `gemini-2.5-flash-lite` with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self::from_client(GeminiClient::new(api_key)?))
    }

    /// Create a generator using the `GEMINI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        Ok(Self::from_client(GeminiClient::from_env()?))
    }

    /// Create a generator over an existing client, e.g. one shared with a
    /// [`GeminiEmbeddingProvider`].
    pub fn from_client(client: GeminiClient) -> Self {
        Self {
            client,
            model: DEFAULT_GENERATION_MODEL.into(),
            model_id: format!("gemini/{DEFAULT_GENERATION_MODEL}"),
            max_output_tokens: 1024,
        }
    }

    /// Use a different generative model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        self.model_id = format!("gemini/{model}");
        self.model = model;
        self
    }

    /// Cap the length of each answer.
    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = tokens;
        self
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    #[instrument(skip_all, fields(model = %self.model, prompt_len = prompt.len()))]
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = GenerateContentRequest {
            contents: [Content::text(Some("user"), prompt)],
            generation_config: GenerationConfig { max_output_tokens: self.max_output_tokens },
        };
        let response: GenerateContentResponse = self
            .client
            .call(&self.model, "generateContent", &body)
            .await
            .map_err(|message| RagError::SynthesisError { provider: self.model_id.clone(), message })?;

        let text: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(RagError::SynthesisError {
                provider: self.model_id.clone(),
                message: "response contained no candidate text".into(),
            });
        }
        Ok(text)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

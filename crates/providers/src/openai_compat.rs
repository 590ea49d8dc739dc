//! OpenAI-compatible backend implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, Together AI and any other
//! endpoint exposing `/chat/completions` and `/embeddings`.
//!
//! One client implements both [`GenerationBackend`] and [`EmbeddingBackend`],
//! so an agent can share a single HTTP connection pool for both.

use async_trait::async_trait;
use chorus_core::error::{EmbeddingError, GenerationError};
use chorus_core::provider::{EmbeddingBackend, GenerationBackend};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// System message sent ahead of every prompt.
const SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

/// An OpenAI-compatible generation + embedding client.
pub struct OpenAiCompatClient {
    name: String,
    base_url: String,
    api_key: String,
    generation_model: String,
    embedding_model: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    /// Create a new OpenAI-compatible client.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            generation_model: "gpt-4.1".into(),
            embedding_model: "text-embedding-3-small".into(),
            temperature: 0.5,
            client,
        }
    }

    /// Create an OpenAI client (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Create an Ollama client (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
        )
    }

    /// Build a client from application config.
    ///
    /// Fails with [`GenerationError::NotConfigured`] when no API key is set.
    pub fn from_config(config: &chorus_config::AppConfig) -> Result<Self, GenerationError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            GenerationError::NotConfigured(
                "no API key (set CHORUS_API_KEY or OPENAI_API_KEY, or api_key in config.toml)"
                    .into(),
            )
        })?;

        Ok(Self::new("openai", &config.api_url, api_key)
            .with_generation_model(&config.generation_model)
            .with_embedding_model(&config.embedding_model)
            .with_temperature(config.temperature))
    }

    pub fn with_generation_model(mut self, model: impl Into<String>) -> Self {
        self.generation_model = model.into();
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Request body for a single-prompt chat completion.
    fn completion_body<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.generation_model,
            messages: vec![
                ApiMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ApiMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
        }
    }

    async fn post_json<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, reqwest::Error> {
        self.client
            .post(format!("{}/{path}", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
    }
}

/// Non-success HTTP outcome, before it is mapped onto a backend error type.
#[derive(Debug, PartialEq)]
enum HttpFailure {
    RateLimited,
    Unauthorized,
    Status(u16),
}

fn classify_status(status: u16) -> Option<HttpFailure> {
    match status {
        200 => None,
        429 => Some(HttpFailure::RateLimited),
        401 | 403 => Some(HttpFailure::Unauthorized),
        other => Some(HttpFailure::Status(other)),
    }
}

fn extract_completion(response: ChatResponse) -> Result<String, GenerationError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| GenerationError::InvalidResponse("No choices in response".into()))
}

fn extract_embedding(response: EmbeddingApiResponse) -> Result<Vec<f32>, EmbeddingError> {
    response
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .ok_or_else(|| EmbeddingError::InvalidResponse("No embedding in response".into()))
}

#[async_trait]
impl GenerationBackend for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        debug!(backend = %self.name, model = %self.generation_model, "Sending completion request");

        let response = self
            .post_json("chat/completions", &self.completion_body(prompt))
            .await
            .map_err(|e| GenerationError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        match classify_status(status) {
            None => {}
            Some(HttpFailure::RateLimited) => {
                return Err(GenerationError::RateLimited {
                    retry_after_secs: 5,
                });
            }
            Some(HttpFailure::Unauthorized) => {
                return Err(GenerationError::AuthenticationFailed(
                    "Invalid API key or insufficient permissions".into(),
                ));
            }
            Some(HttpFailure::Status(code)) => {
                let error_body = response.text().await.unwrap_or_default();
                warn!(status = code, body = %error_body, "Backend returned error");
                return Err(GenerationError::ApiError {
                    status_code: code,
                    message: error_body,
                });
            }
        }

        let api_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        extract_completion(api_response)
    }

    async fn health_check(&self) -> Result<bool, GenerationError> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| GenerationError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let body = EmbeddingRequest {
            model: &self.embedding_model,
            input: text,
            encoding_format: "float",
        };

        debug!(backend = %self.name, model = %self.embedding_model, "Sending embedding request");

        let response = self
            .post_json("embeddings", &body)
            .await
            .map_err(|e| EmbeddingError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        match classify_status(status) {
            None => {}
            Some(HttpFailure::RateLimited) => {
                return Err(EmbeddingError::RateLimited {
                    retry_after_secs: 5,
                });
            }
            Some(HttpFailure::Unauthorized) => {
                return Err(EmbeddingError::AuthenticationFailed(
                    "Invalid API key".into(),
                ));
            }
            Some(HttpFailure::Status(code)) => {
                let error_body = response.text().await.unwrap_or_default();
                warn!(status = code, body = %error_body, "Embedding backend returned error");
                return Err(EmbeddingError::ApiError {
                    status_code: code,
                    message: error_body,
                });
            }
        }

        let api_resp: EmbeddingApiResponse = response.json().await.map_err(|e| {
            EmbeddingError::InvalidResponse(format!("Failed to parse embedding response: {e}"))
        })?;

        extract_embedding(api_resp)
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ApiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    encoding_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

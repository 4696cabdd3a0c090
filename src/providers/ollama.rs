use anyhow::{Result, anyhow};
use async_trait::async_trait;
use log::{debug, error};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::errors::ProviderError;
use crate::providers::{InferenceClient, Prompt};

/// Default Ollama port when the endpoint does not name one
const DEFAULT_PORT: u16 = 11434;

/// Ollama client for interacting with Ollama API
#[derive(Debug, Clone)]
pub struct Ollama {
    /// Base URL of the Ollama API
    base_url: String,
    /// HTTP client for making requests
    client: Client,
}

/// Generation options for the Ollama API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationOptions {
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Top-p sampling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Maximum number of tokens to generate, -1 for unlimited
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<i32>,
}

/// Chat message object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// Role of the message sender (system, user or assistant)
    pub role: String,
    /// Content of the message
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

/// Chat request for the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model name to use for generation
    pub model: String,
    /// Messages of the conversation
    pub messages: Vec<ChatMessage>,
    /// Additional model parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<GenerationOptions>,
    /// Whether to stream the response
    pub stream: bool,
}

impl ChatRequest {
    /// Build a non-streaming chat request from a rendered prompt
    pub fn from_prompt(model: impl Into<String>, prompt: &Prompt, temperature: f32) -> Self {
        Self {
            model: model.into(),
            messages: vec![
                ChatMessage::system(prompt.system.clone()),
                ChatMessage::user(prompt.user.clone()),
            ],
            options: Some(GenerationOptions {
                temperature: Some(temperature),
                top_p: Some(0.9),
                num_predict: Some(-1),
            }),
            stream: false,
        }
    }
}

/// Chat response from the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Model name
    #[serde(default)]
    pub model: String,
    /// Response message
    pub message: ChatMessage,
    /// Whether the generation is complete
    #[serde(default)]
    pub done: bool,
    /// Number of prompt tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_eval_count: Option<u64>,
    /// Number of generated tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u64>,
}

/// One entry of `GET /api/tags`
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
}

/// Response of `GET /api/tags`
#[derive(Debug, Serialize, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<ModelInfo>,
}

/// Turn `host`, `host:port` or a full URL into a base URL with scheme and port
pub fn parse_endpoint(endpoint: &str) -> Result<String> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return Err(anyhow!("Endpoint cannot be empty"));
    }

    let url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Url::parse(endpoint)?
    } else {
        Url::parse(&format!("http://{}", endpoint))?
    };

    let host = url.host_str()
        .ok_or_else(|| anyhow!("Invalid host in endpoint: {}", endpoint))?;
    let port = url.port().unwrap_or(if url.scheme() == "https" { 443 } else { DEFAULT_PORT });

    Ok(format!("{}://{}:{}", url.scheme(), host, port))
}

/// Map a transport error onto the provider taxonomy
fn map_transport_error(error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout(error.to_string())
    } else if error.is_connect() {
        ProviderError::ConnectionRefused(error.to_string())
    } else if error.is_decode() {
        ProviderError::MalformedResponse(error.to_string())
    } else {
        ProviderError::RequestFailed(error.to_string())
    }
}

/// Map a non-success status onto the provider taxonomy
fn map_status_error(status: StatusCode, body: String, model: &str) -> ProviderError {
    if status == StatusCode::NOT_FOUND && body.to_lowercase().contains("model") {
        ProviderError::ModelNotFound(model.to_string())
    } else {
        ProviderError::ApiError {
            status_code: status.as_u16(),
            message: body,
        }
    }
}

/// Extract the assistant text from a chat response body.
///
/// Accepts a single JSON object or JSON lines from a streamed reply; in
/// the latter case the content pieces are concatenated.
pub fn parse_chat_body(body: &str) -> Result<String, ProviderError> {
    if let Ok(response) = serde_json::from_str::<ChatResponse>(body) {
        return Ok(response.message.content);
    }

    let mut content = String::new();
    let mut parsed_any = false;
    for line in body.lines().filter(|line| !line.trim().is_empty()) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(line) {
            parsed_any = true;
            if let Some(part) = value.pointer("/message/content").and_then(|v| v.as_str()) {
                content.push_str(part);
            }
        }
    }

    if parsed_any {
        Ok(content)
    } else {
        let preview: String = body.chars().take(500).collect();
        error!("Failed to parse Ollama chat response. Raw response (first 500 chars): {}", preview);
        Err(ProviderError::MalformedResponse("response is not valid JSON".to_string()))
    }
}

impl Ollama {
    /// Create a client for `endpoint` with a per-request timeout
    ///
    /// Ollama speaks HTTP/1.1; connections are kept alive for parallel requests.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let base_url = parse_endpoint(endpoint)?;
        let client = Client::builder()
            .timeout(timeout)
            .http1_only()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(20)
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;

        Ok(Self { base_url, client })
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Chat with the Ollama API
    pub async fn chat(&self, request: &ChatRequest) -> Result<String, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);

        let response = self.client.post(&url)
            .json(request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("Ollama API error ({}): {}", status, error_text);
            return Err(map_status_error(status, error_text, &request.model));
        }

        let body = response.text().await.map_err(map_transport_error)?;
        parse_chat_body(&body)
    }

    /// Names of the locally installed models
    pub async fn tags(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(&url)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status_code: status.as_u16(),
                message: error_text,
            });
        }

        let tags: TagsResponse = response.json().await.map_err(map_transport_error)?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Get the Ollama API version
    pub async fn version(&self) -> Result<String, ProviderError> {
        let url = format!("{}/api/version", self.base_url);
        let response: serde_json::Value = self.client.get(&url)
            .send()
            .await
            .map_err(map_transport_error)?
            .json()
            .await
            .map_err(map_transport_error)?;

        response["version"].as_str()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::MalformedResponse("Invalid version format in response".to_string()))
    }
}

#[async_trait]
impl InferenceClient for Ollama {
    async fn generate(&self, model: &str, prompt: &Prompt, temperature: f32) -> Result<String, ProviderError> {
        let request = ChatRequest::from_prompt(model, prompt, temperature);
        debug!("Sending {} chars to {} via {}", prompt.source_text.chars().count(), model, self.base_url);
        self.chat(&request).await
    }

    async fn list_models(&self) -> Result<Option<Vec<String>>, ProviderError> {
        self.tags().await.map(Some)
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        let version = self.version().await?;
        debug!("Connected to Ollama {} at {}", version, self.base_url);
        Ok(())
    }
}

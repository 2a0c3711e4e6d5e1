//! Completion gateway: the only place provider request shapes live.
//!
//! The engine sees one operation, `complete(system, user)`. Behind it sits a
//! sequential failover chain of OpenAI-compatible providers, each call under
//! its own timeout.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::{GatewayConfig, ProviderConfig};

#[derive(Debug)]
pub enum GatewayError {
    RequestFailed { provider: String, reason: String },
    Status { provider: String, status: u16, body: String },
    InvalidResponse { provider: String, reason: String },
    Timeout { provider: String, secs: u64 },
    NoProviders,
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::RequestFailed { provider, reason } => {
                write!(f, "{provider}: request failed: {reason}")
            }
            GatewayError::Status { provider, status, body } => {
                write!(f, "{provider}: HTTP {status}: {body}")
            }
            GatewayError::InvalidResponse { provider, reason } => {
                write!(f, "{provider}: invalid response: {reason}")
            }
            GatewayError::Timeout { provider, secs } => {
                write!(f, "{provider}: no response within {secs}s")
            }
            GatewayError::NoProviders => write!(f, "no completion providers configured"),
        }
    }
}

impl std::error::Error for GatewayError {}

#[async_trait]
pub trait CompletionGateway: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, system: &str, user: &str) -> Result<String, GatewayError>;
}

// --- OpenAI-compatible provider ---

pub struct OpenAiCompatibleProvider {
    client: Client,
    name: String,
    base_url: String,
    model: String,
    api_key: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: &ProviderConfig, api_key: Option<String>) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .build()
            .map_err(|e| GatewayError::RequestFailed {
                provider: config.name.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            name: config.name.clone(),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            api_key,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// `base_url` may or may not already end in `/v1`.
    fn api_url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let base = base.strip_suffix("/v1").unwrap_or(base);
        format!("{}/v1/{}", base, path.trim_start_matches('/'))
    }

    fn request_body(&self, system: &str, user: &str) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatCompletionMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatCompletionMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

#[async_trait]
impl CompletionGateway for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, GatewayError> {
        let url = self.api_url("chat/completions");
        tracing::debug!(provider = %self.name, %url, "sending completion request");

        let mut request = self.client.post(&url).json(&self.request_body(system, user));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| GatewayError::RequestFailed {
            provider: self.name.clone(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| GatewayError::RequestFailed {
            provider: self.name.clone(),
            reason: format!("failed to read body: {e}"),
        })?;

        if !status.is_success() {
            return Err(GatewayError::Status {
                provider: self.name.clone(),
                status: status.as_u16(),
                body: truncate(&text, 200),
            });
        }

        let parsed: ChatCompletionResponse =
            serde_json::from_str(&text).map_err(|e| GatewayError::InvalidResponse {
                provider: self.name.clone(),
                reason: format!("JSON parse error: {e}"),
            })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| GatewayError::InvalidResponse {
                provider: self.name.clone(),
                reason: "empty completion".to_string(),
            })
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatCompletionMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatCompletionMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponseMessage {
    content: Option<String>,
}

// --- Failover chain ---

/// Tries each provider in order until one answers.
///
/// Every call runs as its own task under `timeout`. A call that times out
/// is abandoned, not cancelled: the task may still finish in the background
/// and its result is dropped.
pub struct FailoverGateway {
    providers: Vec<Arc<dyn CompletionGateway>>,
    timeout: Duration,
}

impl FailoverGateway {
    pub fn new(providers: Vec<Arc<dyn CompletionGateway>>, timeout: Duration) -> Self {
        Self { providers, timeout }
    }

    /// Build the chain from config. Providers whose key variable is named
    /// but unset are skipped.
    pub fn from_config(config: &GatewayConfig) -> Self {
        let mut providers: Vec<Arc<dyn CompletionGateway>> = Vec::new();
        for p in &config.providers {
            let api_key = match &p.api_key_env {
                Some(var) => match std::env::var(var) {
                    Ok(key) if !key.is_empty() => Some(key),
                    _ => {
                        tracing::warn!(provider = %p.name, env = %var, "API key not set, skipping provider");
                        continue;
                    }
                },
                None => None,
            };
            match OpenAiCompatibleProvider::new(p, api_key) {
                Ok(provider) => providers.push(Arc::new(provider)),
                Err(e) => tracing::warn!("skipping provider: {e}"),
            }
        }
        if providers.is_empty() {
            tracing::info!("no completion providers available, replies will use local templates");
        }
        Self::new(providers, Duration::from_secs(config.timeout_secs.max(1)))
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }
}

#[async_trait]
impl CompletionGateway for FailoverGateway {
    fn name(&self) -> &str {
        "failover"
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, GatewayError> {
        let mut last_error = None;

        for (i, provider) in self.providers.iter().enumerate() {
            let call = {
                let provider = Arc::clone(provider);
                let system = system.to_string();
                let user = user.to_string();
                tokio::spawn(async move { provider.complete(&system, &user).await })
            };

            let err = match tokio::time::timeout(self.timeout, call).await {
                Ok(Ok(Ok(text))) => return Ok(text),
                Ok(Ok(Err(e))) => e,
                Ok(Err(join)) => GatewayError::RequestFailed {
                    provider: provider.name().to_string(),
                    reason: format!("provider task failed: {join}"),
                },
                Err(_) => GatewayError::Timeout {
                    provider: provider.name().to_string(),
                    secs: self.timeout.as_secs(),
                },
            };

            match self.providers.get(i + 1) {
                Some(next) => tracing::warn!(
                    error = %err,
                    next_provider = %next.name(),
                    "provider failed, trying next provider"
                ),
                None => tracing::warn!(error = %err, "last provider failed"),
            }
            last_error = Some(err);
        }

        Err(last_error.unwrap_or(GatewayError::NoProviders))
    }
}

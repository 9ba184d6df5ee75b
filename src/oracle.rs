//! The answer-producing oracle: a chat-completion service treated as a
//! black box.
//!
//! [`Oracle`] takes an ordered list of [`ChatMessage`]s and returns free
//! text. [`OpenAIOracle`] speaks the OpenAI-compatible
//! `POST {base_url}/chat/completions` protocol, which also covers LM Studio,
//! vLLM, and Ollama's compatibility endpoint. Oracle calls are never
//! retried: a failure aborts the current question.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::OracleConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait Oracle: Send + Sync {
    /// Returns the model identifier used for completions.
    fn model_name(&self) -> &str;

    /// Runs one chat completion and returns the assistant's text.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Oracle used when `oracle.provider = "disabled"`; every call fails.
pub struct DisabledOracle;

#[async_trait]
impl Oracle for DisabledOracle {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
        bail!("Oracle provider is disabled")
    }
}

pub struct OpenAIOracle {
    model: String,
    base_url: String,
    api_key: Option<String>,
    temperature: f64,
    max_tokens: Option<u32>,
    client: reqwest::Client,
}

impl OpenAIOracle {
    /// The API key is read from `OPENAI_API_KEY`. It is required for the
    /// hosted OpenAI endpoint and optional for self-hosted ones.
    pub fn new(config: &OracleConfig) -> Result<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let api_key = std::env::var("OPENAI_API_KEY").ok();
        if api_key.is_none() && base_url.contains("api.openai.com") {
            bail!("OPENAI_API_KEY environment variable not set");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            base_url,
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client,
        })
    }
}

#[async_trait]
impl Oracle for OpenAIOracle {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "stream": false,
        });
        if let (Some(obj), Some(max_tokens)) = (body.as_object_mut(), self.max_tokens) {
            obj.insert("max_tokens".to_string(), serde_json::json!(max_tokens));
        }

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("chat completion error {}: {}", status, body_text);
        }

        let payload: serde_json::Value = response.json().await?;
        parse_chat_response(&payload)
    }
}

fn parse_chat_response(payload: &serde_json::Value) -> Result<String> {
    payload
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing choices[0].message.content"))
}

pub fn create_oracle(config: &OracleConfig) -> Result<Arc<dyn Oracle>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledOracle)),
        "openai" => Ok(Arc::new(OpenAIOracle::new(config)?)),
        other => bail!("Unknown oracle provider: {}", other),
    }
}

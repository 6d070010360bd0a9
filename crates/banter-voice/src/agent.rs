use crate::config::AgentConfig;
use crate::error::VoiceError;
use crate::traits::ReplyGenerator;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

/// Reply generation via an OpenAI-compatible chat completions endpoint.
///
/// Stateless by contract: every call sends exactly one user message (plus an
/// optional fixed instruction). Whatever memory or personality the agent has
/// lives on the far side of this HTTP call.
#[derive(Debug)]
pub struct ChatAgent {
    config: AgentConfig,
    http: reqwest::Client,
}

impl ChatAgent {
    pub fn new(config: AgentConfig) -> Result<Self, VoiceError> {
        if config.url.is_empty() {
            return Err(VoiceError::Config(
                "agent url is not configured".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VoiceError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self { config, http })
    }
}

/// Builds the chat completions request payload.
fn build_request_body(config: &AgentConfig, user_text: &str) -> Value {
    let mut messages = Vec::new();
    if let Some(instruction) = &config.instruction {
        messages.push(json!({"role": "system", "content": instruction}));
    }
    messages.push(json!({"role": "user", "content": user_text}));
    json!({
        "model": config.model,
        "messages": messages,
    })
}

/// Extracts the reply text from a chat completions response body.
fn parse_reply_body(body: &Value) -> Result<String, VoiceError> {
    let content = body
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();

    if content.is_empty() {
        return Err(VoiceError::Agent(
            "agent returned an empty reply".to_string(),
        ));
    }
    Ok(content.to_string())
}

#[async_trait]
impl ReplyGenerator for ChatAgent {
    async fn generate_reply(&self, user_text: &str) -> Result<String, VoiceError> {
        let body = build_request_body(&self.config, user_text);

        let response = self
            .http
            .post(&self.config.url)
            .bearer_auth(&self.config.api_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    VoiceError::Agent(format!(
                        "agent call timed out after {} seconds",
                        self.config.timeout_secs
                    ))
                } else {
                    VoiceError::Agent(format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(VoiceError::Agent(format!(
                "agent returned status {status}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| VoiceError::Agent(format!("malformed response body: {e}")))?;

        parse_reply_body(&body)
    }
}

//! OpenAI-compatible chat completions backend for [`ModelService`].

use async_trait::async_trait;
use interview_orchestration::model::ModelResult;
use interview_orchestration::prompts::split_tag;
use interview_orchestration::{ModelError, ModelService};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ModelEndpoint;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    reasoning_content: Option<String>,
}

/// Single-prompt client for a chat completions endpoint. Each prompt is sent
/// as one user message.
pub struct OpenAiCompatModel {
    http: reqwest::Client,
    completions_url: String,
    endpoint: ModelEndpoint,
}

impl OpenAiCompatModel {
    pub fn new(endpoint: ModelEndpoint) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(endpoint.timeout)
                .build()?,
            completions_url: format!("{}/chat/completions", endpoint.url.trim_end_matches('/')),
            endpoint,
        })
    }

    pub fn completions_url(&self) -> &str {
        &self.completions_url
    }
}

#[async_trait]
impl ModelService for OpenAiCompatModel {
    async fn complete(&self, prompt: &str) -> ModelResult<String> {
        let (kind, body) = split_tag(prompt);
        let kind = kind.unwrap_or("untagged");
        let request = chat_request(&self.endpoint, body);

        let mut builder = self.http.post(&self.completions_url).json(&request);
        if let Some(key) = &self.endpoint.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ModelError::Timeout(self.endpoint.timeout)
            } else {
                ModelError::Request(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Status { status, body });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ModelError::Request(e.to_string()))?;
        let text = completion_text(&body)?;
        debug!(model = %self.endpoint.model, kind, chars = text.len(), "Model completion received");
        Ok(text)
    }
}

/// One user message carrying the prompt body.
fn chat_request<'a>(endpoint: &'a ModelEndpoint, body: &'a str) -> ChatRequest<'a> {
    ChatRequest {
        model: &endpoint.model,
        messages: vec![ChatMessage {
            role: "user",
            content: body,
        }],
        max_tokens: endpoint.max_tokens,
        temperature: endpoint.temperature,
    }
}

/// Pull the completion text out of a chat completions response body.
/// Reasoning-only answers fall back to the reasoning text.
pub fn completion_text(body: &str) -> ModelResult<String> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| ModelError::Parse(e.to_string()))?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or(ModelError::EmptyResponse)?;

    let text = match (choice.message.content, choice.message.reasoning_content) {
        (Some(content), _) if !content.trim().is_empty() => content,
        (_, Some(reasoning)) if !reasoning.trim().is_empty() => reasoning,
        _ => return Err(ModelError::EmptyResponse),
    };
    Ok(text)
}

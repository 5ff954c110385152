use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::models::{ChatMessage, ChatRequest, ChatResponse};
use crate::provider::{AiProvider, Completion, CompletionRequest, ProviderError};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Provider speaking the OpenAI-compatible `/chat/completions` protocol.
#[derive(Clone)]
pub struct OpenAiProvider {
    api_key: String,
    base_url: String,
    timeout: Duration,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(
        api_key: impl Into<String>,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(Self {
            api_key: api_key.into(),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            timeout,
            client,
        })
    }

    fn classify_send_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout(self.timeout)
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl AiProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        let body = ChatRequest {
            model: request.model.clone(),
            messages: vec![
                ChatMessage::system(request.system_prompt),
                ChatMessage::user(request.user_prompt),
            ],
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
        };

        tracing::debug!(model = %request.model, base_url = %self.base_url, "calling chat completions");

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify_send_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "chat completions request failed");
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Auth {
                    status: status.as_u16(),
                },
                StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
                    status: status.as_u16(),
                },
                _ => ProviderError::Status {
                    status: status.as_u16(),
                    body,
                },
            });
        }

        let chat: ChatResponse = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(self.timeout)
            } else {
                ProviderError::Decode(e.to_string())
            }
        })?;

        tracing::debug!(usage = ?chat.usage, model = ?chat.model, "chat completions response received");

        let text = chat
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or(ProviderError::EmptyResponse)?;

        Ok(Completion {
            text,
            tokens_used: chat.usage.map(|u| u.total_tokens).unwrap_or(0),
        })
    }
}

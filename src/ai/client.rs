use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::{config::AiConfig, AppError, AppResult, GetField};

#[derive(Serialize)]
struct ChatTurn<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [ChatTurn<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
/// Every failure surfaces as [`AppError::Upstream`].
#[derive(Clone)]
pub struct CompletionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl CompletionClient {
    pub fn new(config: &AiConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub async fn complete(&self, system: &str, user: &str) -> AppResult<String> {
        let Some(api_key) = &self.api_key else {
            return Err(AppError::upstream("no API key configured for the completion provider"));
        };

        let body: Value = self.http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&CompletionRequest {
                model: &self.model,
                messages: [
                    ChatTurn { role: "system", content: system },
                    ChatTurn { role: "user", content: user },
                ],
                max_tokens: 500,
                temperature: 0.7,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let choice = body
            .get_array_field("choices")?
            .first()
            .ok_or_else(|| AppError::upstream("completion returned no choices"))?;

        choice.get_obj_field("message")?.get_str_field("content")
    }
}

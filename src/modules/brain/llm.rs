use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::prompt::CompletionRequest;
use crate::error::{AssessError, Result};
use crate::utils::http_client::post_json;
use crate::utils::RetryPolicy;

/// Sends a completion request and returns the model's raw text.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// OpenAI-compatible `/chat/completions` client with a strict JSON-schema response format.
pub struct OpenAiChatModel {
    client: Client,
    api_key: String,
    api_base: String,
    retry: RetryPolicy,
}

impl OpenAiChatModel {
    pub fn new(client: Client, api_key: String, api_base: &str, retry: RetryPolicy) -> Self {
        Self {
            client,
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            retry,
        }
    }

    fn body(request: &CompletionRequest) -> Value {
        json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "risk_assessment",
                    "strict": true,
                    "schema": request.response_schema
                }
            }
        })
    }
}

/// Pulls `choices[0].message.content` out of a completion response.
/// A refusal or a missing content field counts as a malformed response.
fn message_content(raw: &str) -> Result<String> {
    let json_res: Value = serde_json::from_str(raw)?;
    let message = &json_res["choices"][0]["message"];
    if let Some(refusal) = message["refusal"].as_str() {
        return Err(AssessError::MalformedResponse(format!("model refused: {refusal}")));
    }
    message["content"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| AssessError::MalformedResponse("completion has no message content".into()))
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.api_base);
        let body = Self::body(request);

        info!("🧠 [{}] Requesting risk assessment...", request.model);
        debug!(
            "\n================ LLM PROMPT START ================\n{}\n================ LLM PROMPT END ================",
            request.user_prompt()
        );

        let text = self
            .retry
            .run("chat completion", || {
                post_json(&self.client, "chat provider", &url, &self.api_key, &body)
            })
            .await?;

        message_content(&text)
    }
}

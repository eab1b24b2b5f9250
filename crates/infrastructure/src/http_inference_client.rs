use std::time::Duration;

use async_trait::async_trait;
use lumora_application::{InferenceClient, InferenceError, OutpaintingPrompt};
use lumora_domain::{ANALYSIS_LABEL, RESULT_URL_LABEL};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Connection settings for an OpenAI-compatible chat completion endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceSettings {
    /// API base URL without the `/chat/completions` suffix.
    pub base_url: String,
    /// Bearer token.
    pub api_key: String,
    /// Model name.
    pub model: String,
    /// Completion token cap.
    pub max_tokens: u32,
    /// Overall deadline of one attempt.
    pub timeout: Duration,
    /// Attempts made when the request cannot be sent at all.
    pub max_attempts: u8,
    /// Pause between attempts.
    pub retry_delay: Duration,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.siliconflow.cn/v1".to_owned(),
            api_key: String::new(),
            model: "baidu/ERNIE-4.5-300B-A47B".to_owned(),
            max_tokens: 8000,
            timeout: Duration::from_secs(120),
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage; 2],
    stream: bool,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Outpainting inference over an OpenAI-compatible HTTP API.
pub struct HttpInferenceClient {
    http_client: reqwest::Client,
    settings: InferenceSettings,
}

impl HttpInferenceClient {
    /// Creates a client; each attempt is bounded by `settings.timeout`.
    pub fn new(settings: InferenceSettings) -> Result<Self, InferenceError> {
        let http_client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|error| {
                InferenceError::permanent(format!("failed to build inference client: {error}"))
            })?;

        Ok(Self {
            http_client,
            settings: InferenceSettings {
                max_attempts: settings.max_attempts.max(1),
                ..settings
            },
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/'))
    }

    fn build_request<'a>(&'a self, request: &OutpaintingPrompt) -> ChatRequest<'a> {
        ChatRequest {
            model: self.settings.model.as_str(),
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt(),
                },
                ChatMessage {
                    role: "user",
                    content: format!(
                        "Outpainting request:\n{}\nSource image:\n{}",
                        request.prompt, request.image_url
                    ),
                },
            ],
            stream: false,
            max_tokens: self.settings.max_tokens,
        }
    }

    async fn send_with_retry(&self, body: &str) -> Result<reqwest::Response, InferenceError> {
        let mut attempt = 0_u8;
        loop {
            attempt = attempt.saturating_add(1);
            let sent = self
                .http_client
                .post(self.endpoint())
                .bearer_auth(self.settings.api_key.as_str())
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.to_owned())
                .send()
                .await;

            match sent {
                Ok(response) => return Ok(response),
                Err(error) if attempt < self.settings.max_attempts => {
                    warn!(attempt, error = %error, "inference request failed; retrying");
                    tokio::time::sleep(self.settings.retry_delay).await;
                }
                Err(error) => {
                    let message = format!("API call failed: {error}");
                    return Err(if error.is_timeout() || error.is_connect() {
                        InferenceError::recoverable(message)
                    } else {
                        InferenceError::classified(message)
                    });
                }
            }
        }
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn complete(&self, request: &OutpaintingPrompt) -> Result<String, InferenceError> {
        let body = serde_json::to_string(&self.build_request(request)).map_err(|error| {
            InferenceError::permanent(format!("request encoding failed: {error}"))
        })?;

        let response = self.send_with_retry(&body).await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "<response body unavailable>".to_owned());
            let message = format!("API returned error: {} - {detail}", status.as_u16());
            return Err(
                if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    InferenceError::recoverable(message)
                } else {
                    InferenceError::permanent(message)
                },
            );
        }

        let parsed = response.json::<ChatResponse>().await.map_err(|error| {
            InferenceError::permanent(format!("response parsing failed: {error}"))
        })?;
        let content = first_content(parsed)
            .ok_or_else(|| InferenceError::permanent("empty model result"))?;

        debug!(characters = content.len(), "inference completed");
        Ok(content)
    }
}

fn system_prompt() -> String {
    format!(
        "You are a professional image processing assistant.\n\
         Expand the source image according to the user's outpainting request.\n\
         Requests look like:\n\
         Outpainting request:\n{{description}}\n\
         Source image:\n{{image URL}}\n\
         Answer with exactly these two lines:\n\
         {RESULT_URL_LABEL} {{URL of the expanded image}}\n\
         {ANALYSIS_LABEL} {{short analysis of the image}}\n"
    )
}

fn first_content(response: ChatResponse) -> Option<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use lumora_application::OutpaintingPrompt;
    use lumora_domain::{ANALYSIS_LABEL, RESULT_URL_LABEL};

    use super::{ChatResponse, HttpInferenceClient, InferenceSettings, first_content};

    #[test]
    fn request_carries_model_prompt_and_image() {
        let Ok(client) = HttpInferenceClient::new(InferenceSettings {
            api_key: "test-key".to_owned(),
            ..InferenceSettings::default()
        }) else {
            panic!("client should build");
        };
        let request = client.build_request(&OutpaintingPrompt {
            prompt: "expand sky".to_owned(),
            image_url: "https://x/y.png".to_owned(),
        });

        let encoded = serde_json::to_value(&request).unwrap_or_default();
        assert_eq!(encoded["model"], "baidu/ERNIE-4.5-300B-A47B");
        assert_eq!(encoded["max_tokens"], 8000);
        assert_eq!(encoded["stream"], false);
        assert_eq!(encoded["messages"][0]["role"], "system");
        assert_eq!(
            encoded["messages"][1]["content"],
            "Outpainting request:\nexpand sky\nSource image:\nhttps://x/y.png"
        );
        assert_eq!(client.endpoint(), "https://api.siliconflow.cn/v1/chat/completions");
    }

    #[test]
    fn blank_choices_count_as_empty_results() {
        let empty: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#)
            .unwrap_or(ChatResponse { choices: Vec::new() });
        let blank: Option<ChatResponse> =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"  "}}]}"#).ok();

        assert_eq!(first_content(empty), None);
        assert_eq!(blank.and_then(first_content), None);
    }

    #[test]
    fn system_prompt_names_both_output_labels() {
        let prompt = super::system_prompt();

        assert!(prompt.contains(RESULT_URL_LABEL));
        assert!(prompt.contains(ANALYSIS_LABEL));
    }
}

//! LLM Client: the single point of entry for all generative model calls.
//!
//! No other module talks to the model server directly. Speaks the Ollama
//! `/api/generate` protocol with `stream: false`.

use std::time::Duration;

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod prompts;

const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unavailable after {retries} retries")]
    Exhausted { retries: u32 },

    #[error("LLM returned no JSON object")]
    NoJson,

    #[error("LLM returned empty content")]
    EmptyContent,
}

/// Sampling options forwarded verbatim to the model server.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub num_predict: u32,
    pub num_ctx: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

impl GenerateOptions {
    /// Low temperature, long output: structured extraction.
    pub fn extraction() -> Self {
        Self {
            temperature: 0.3,
            num_predict: 2000,
            num_ctx: 4096,
            stop: Vec::new(),
        }
    }

    /// Short free-text assessment.
    pub fn assessment() -> Self {
        Self {
            temperature: 0.7,
            num_predict: 512,
            num_ctx: 2048,
            stop: vec!["---".to_string(), "###".to_string()],
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: &'a GenerateOptions,
}

#[derive(Debug, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub prompt_eval_count: Option<u32>,
    #[serde(default)]
    pub eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaError {
    error: String,
}

#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    base_url: String,
    model: String,
    retry_base_delay: Duration,
}

impl LlmClient {
    pub fn new(base_url: String, model: String, timeout: Duration) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            retry_base_delay: Duration::from_millis(1000),
        })
    }

    /// Overrides the first backoff delay. Later retries double it.
    #[cfg(test)]
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Makes a raw generate call and returns the model's text.
    /// Retries on 429, 5xx and transport errors with exponential backoff.
    pub async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String, LlmError> {
        let request_body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options,
        };
        let url = format!("{}/api/generate", self.base_url);

        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = self.retry_base_delay * (1 << (attempt - 1));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = match self.client.post(&url).json(&request_body).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM server returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<OllamaError>(&body)
                    .map(|e| e.error)
                    .unwrap_or(body);
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let generated: GenerateResponse = response.json().await?;

            debug!(
                "LLM call succeeded: model={}, prompt_tokens={:?}, output_tokens={:?}",
                self.model, generated.prompt_eval_count, generated.eval_count
            );

            if generated.response.trim().is_empty() {
                return Err(LlmError::EmptyContent);
            }
            return Ok(generated.response);
        }

        Err(last_error.unwrap_or(LlmError::Exhausted {
            retries: MAX_RETRIES,
        }))
    }

    /// Calls the model and deserializes the first JSON object in its answer.
    /// The prompt must ask for a single JSON object.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<T, LlmError> {
        let text = self.generate(prompt, options).await?;
        let json = extract_json_object(&text).ok_or(LlmError::NoJson)?;
        serde_json::from_str(json).map_err(LlmError::Parse)
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

/// Slice from the first `{` to the last `}`, after fence stripping.
/// Small local models like to wrap JSON in prose.
fn extract_json_object(text: &str) -> Option<&str> {
    let text = strip_json_fences(text);
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> LlmClient {
        LlmClient::new(server.base_url(), "llama3.2:3b".to_string(), Duration::from_secs(5))
            .unwrap()
            .with_retry_base_delay(Duration::from_millis(1))
    }

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_extract_json_object_from_prose() {
        let input = "Ecco il JSON richiesto:\n{\"name\": \"A\", \"x\": {\"y\": 1}}\nSpero sia utile.";
        assert_eq!(
            extract_json_object(input),
            Some("{\"name\": \"A\", \"x\": {\"y\": 1}}")
        );
        assert_eq!(extract_json_object("nessun oggetto"), None);
        assert_eq!(extract_json_object("} rovesciato {"), None);
    }

    #[tokio::test]
    async fn test_generate_sends_options_and_returns_text() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate").json_body_includes(
                    json!({
                        "model": "llama3.2:3b",
                        "stream": false,
                        "options": {"temperature": 0.3, "num_predict": 2000, "num_ctx": 4096}
                    })
                    .to_string(),
                );
                then.status(200)
                    .json_body(json!({"response": "ciao", "eval_count": 3}));
            })
            .await;

        let text = client(&server)
            .generate("prompt", &GenerateOptions::extraction())
            .await
            .unwrap();
        assert_eq!(text, "ciao");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_retries_server_errors_then_gives_up() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(503).body("loading");
            })
            .await;

        let err = client(&server)
            .generate("prompt", &GenerateOptions::assessment())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Api { status: 503, .. }));
        mock.assert_hits_async(3).await;
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(404)
                    .json_body(json!({"error": "model 'llama3.2:3b' not found"}));
            })
            .await;

        let err = client(&server)
            .generate("prompt", &GenerateOptions::extraction())
            .await
            .unwrap_err();
        match err {
            LlmError::Api { status, message } => {
                assert_eq!(status, 404);
                assert!(message.contains("not found"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_call_json_extracts_fenced_object() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200).json_body(json!({
                    "response": "```json\n{\"name\": \"Anna\", \"skills\": [\"SQL\"]}\n```"
                }));
            })
            .await;

        #[derive(Deserialize)]
        struct Partial {
            name: String,
            skills: Vec<String>,
        }

        let parsed: Partial = client(&server)
            .call_json("prompt", &GenerateOptions::extraction())
            .await
            .unwrap();
        assert_eq!(parsed.name, "Anna");
        assert_eq!(parsed.skills, vec!["SQL"]);
    }

    #[tokio::test]
    async fn test_empty_response_is_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200).json_body(json!({"response": "  "}));
            })
            .await;

        let err = client(&server)
            .generate("prompt", &GenerateOptions::extraction())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::EmptyContent));
    }
}

use std::time::{Duration, Instant};

use async_trait::async_trait;
use fanpulse_config::Remote;
use fanpulse_kernel::intent::{CompletionErrorKind, CompletionRequest};
use fanpulse_kernel::{CompletionClient, CompletionError};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

/// `POST {endpoint}/chat/completions` against any OpenAI-compatible API.
pub struct OpenAiCompatibleClient {
    client: Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiCompatibleClient {
    pub fn new(remote: &Remote, api_key: Option<String>) -> Result<Self, String> {
        let endpoint = remote
            .endpoint
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| "classifier.remote.endpoint is required".to_string())?;
        if !(endpoint.starts_with("https://") || endpoint.starts_with("http://")) {
            return Err(format!(
                "classifier.remote.endpoint must be http(s), got '{endpoint}'"
            ));
        }
        let model = remote
            .model
            .clone()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| "classifier.remote.model is required".to_string())?;

        let client = Client::builder()
            .timeout(Duration::from_millis(remote.timeout_ms.max(1)))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;

        Ok(Self {
            client,
            url: format!("{}/chat/completions", endpoint.trim_end_matches('/')),
            model,
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    /// Reads the API key from the env var named by `api_key_env`, if any.
    pub fn from_config(remote: &Remote) -> Result<Self, String> {
        let api_key = remote
            .api_key_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok());
        Self::new(remote, api_key)
    }
}

fn transport_error(err: &reqwest::Error) -> CompletionError {
    let kind = if err.is_timeout() {
        CompletionErrorKind::Timeout
    } else {
        CompletionErrorKind::Network
    };
    CompletionError::new(kind, err.to_string())
}

fn assistant_content(body: &str) -> Result<String, CompletionError> {
    let data: Value = serde_json::from_str(body).map_err(|e| {
        CompletionError::new(CompletionErrorKind::InvalidResponse, format!("bad JSON: {e}"))
    })?;
    data["choices"]
        .get(0)
        .and_then(|choice| choice["message"]["content"].as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            CompletionError::new(
                CompletionErrorKind::InvalidResponse,
                "no assistant content in response",
            )
        })
}

#[async_trait]
impl CompletionClient for OpenAiCompatibleClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ],
        });

        debug!(model = %self.model, "completion request");
        let started = Instant::now();
        let mut builder = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let resp = builder.send().await.map_err(|e| transport_error(&e))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| transport_error(&e))?;
        if !status.is_success() {
            return Err(CompletionError::from_status(status.as_u16(), &text));
        }
        debug!(
            model = %self.model,
            response_len = text.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "completion received"
        );
        assistant_content(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(endpoint: Option<&str>, model: Option<&str>) -> Remote {
        Remote {
            mode: "openai_compatible".to_string(),
            endpoint: endpoint.map(str::to_string),
            model: model.map(str::to_string),
            api_key_env: None,
            timeout_ms: 500,
        }
    }

    #[test]
    fn builds_chat_completions_url() {
        let client =
            OpenAiCompatibleClient::new(&remote(Some("https://llm.local/v1/"), Some("m")), None)
                .unwrap();
        assert_eq!(client.url, "https://llm.local/v1/chat/completions");
        assert!(client.api_key.is_none());
    }

    #[test]
    fn rejects_missing_model_and_bad_scheme() {
        assert!(OpenAiCompatibleClient::new(&remote(Some("https://x"), None), None).is_err());
        assert!(OpenAiCompatibleClient::new(&remote(Some("ftp://x"), Some("m")), None).is_err());
        assert!(OpenAiCompatibleClient::new(&remote(None, Some("m")), None).is_err());
    }

    #[test]
    fn extracts_first_choice_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"{\"intent\":\"GREETING\"}"}}]}"#;
        assert_eq!(assistant_content(body).unwrap(), r#"{"intent":"GREETING"}"#);
    }

    #[test]
    fn missing_content_is_invalid_response() {
        let err = assistant_content(r#"{"choices":[]}"#).unwrap_err();
        assert_eq!(err.kind, CompletionErrorKind::InvalidResponse);
        let err = assistant_content("not json").unwrap_err();
        assert_eq!(err.kind, CompletionErrorKind::InvalidResponse);
    }
}

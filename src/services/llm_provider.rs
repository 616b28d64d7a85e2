use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

use crate::services::config::{ApiKeys, LlmConfig, LlmProviderKind};
use crate::services::http_fetch::{HttpFetcher, ProviderError, send_json};

pub const SYSTEM_INSTRUCTION: &str = "You are a municipal finance analyst. Respond with a single JSON object only. \
Do not use Markdown, code fences or any text outside the JSON object. \
Use only the keys prediction, interpretation, risks, opportunities, recommendations, confidence and metadata.";

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("{0} not configured")]
    Configuration(String),
    #[error("model provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("model returned no text")]
    EmptyResponse,
}

impl LlmError {
    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::Provider(err) => err.status(),
            _ => None,
        }
    }
}

#[async_trait]
pub trait GenerativeModel: Send + Sync {
    fn provider(&self) -> &str;
    fn model(&self) -> &str;
    /// Raw text produced for `prompt`, before any cleaning.
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

fn non_empty(text: &str) -> Option<String> {
    (!text.trim().is_empty()).then(|| text.to_string())
}

fn candidate_parts(response: &Value) -> Option<String> {
    let parts = response.pointer("/candidates/0/content/parts")?.as_array()?;
    let joined: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    non_empty(&joined)
}

fn candidate_text(response: &Value) -> Option<String> {
    non_empty(response.pointer("/candidates/0/content/text")?.as_str()?)
}

fn candidate_string(response: &Value) -> Option<String> {
    non_empty(response.pointer("/candidates/0/content")?.as_str()?)
}

fn chat_choice(response: &Value) -> Option<String> {
    non_empty(response.pointer("/choices/0/message/content")?.as_str()?)
}

fn output_string(response: &Value) -> Option<String> {
    non_empty(response.get("output")?.as_str()?)
}

fn first_output_string(response: &Value) -> Option<String> {
    non_empty(response.pointer("/output/0")?.as_str()?)
}

fn first_output_parts(response: &Value) -> Option<String> {
    let parts = response.pointer("/output/0/content/parts")?.as_array()?;
    let joined: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    non_empty(&joined)
}

fn first_output_text(response: &Value) -> Option<String> {
    non_empty(response.pointer("/output/0/content/text")?.as_str()?)
}

fn top_level_text(response: &Value) -> Option<String> {
    non_empty(response.get("text")?.as_str()?)
}

fn plain_string(response: &Value) -> Option<String> {
    non_empty(response.as_str()?)
}

/// Response shapes tried in order; the first non-empty text wins.
pub const TEXT_EXTRACTORS: &[fn(&Value) -> Option<String>] = &[
    candidate_parts,
    candidate_text,
    candidate_string,
    chat_choice,
    output_string,
    first_output_string,
    first_output_parts,
    first_output_text,
    top_level_text,
    plain_string,
];

pub fn extract_text(response: &Value) -> Option<String> {
    TEXT_EXTRACTORS.iter().find_map(|extractor| extractor(response))
}

pub struct GeminiClient {
    fetcher: HttpFetcher,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f64,
    max_output_tokens: u32,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig, api_key: &str) -> Result<Self, LlmError> {
        let fetcher = HttpFetcher::new(Duration::from_secs(config.timeout_secs), "revsim/0.1")?;
        Ok(Self {
            fetcher,
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
            model: config.gemini_model.clone(),
            api_key: api_key.to_string(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        })
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    fn provider(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = json!({
            "contents": [{"parts": [{"text": format!("{SYSTEM_INSTRUCTION}\n\n{prompt}")}]}],
            "generationConfig": {
                "maxOutputTokens": self.max_output_tokens,
                "temperature": self.temperature,
            }
        });
        let request = self.fetcher.client().post(&url).json(&body);
        // API keys issued by Google Cloud go in the query string, OAuth tokens as bearer.
        let request = if self.api_key.starts_with("AIza") {
            request.query(&[("key", self.api_key.as_str())])
        } else {
            request.bearer_auth(&self.api_key)
        };
        let response = send_json(request).await.inspect_err(|err| {
            warn!(model = %self.model, status = ?err.status(), error = %err, "gemini call failed");
        })?;
        debug!(model = %self.model, "gemini responded");
        extract_text(&response).ok_or(LlmError::EmptyResponse)
    }
}

pub struct OpenAiClient {
    fetcher: HttpFetcher,
    url: String,
    model: String,
    api_key: String,
    temperature: f64,
    max_output_tokens: u32,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig, api_key: &str) -> Result<Self, LlmError> {
        let fetcher = HttpFetcher::new(Duration::from_secs(config.timeout_secs), "revsim/0.1")?;
        Ok(Self {
            fetcher,
            url: config.openai_url.clone(),
            model: config.openai_model.clone(),
            api_key: api_key.to_string(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        })
    }
}

#[async_trait]
impl GenerativeModel for OpenAiClient {
    fn provider(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_INSTRUCTION},
                {"role": "user", "content": prompt}
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_output_tokens,
        });
        let request = self
            .fetcher
            .client()
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body);
        let response = send_json(request).await.inspect_err(|err| {
            warn!(model = %self.model, status = ?err.status(), error = %err, "openai call failed");
        })?;
        extract_text(&response).ok_or(LlmError::EmptyResponse)
    }
}

/// Builds the configured provider, failing when its API key is absent.
pub fn model_from_config(config: &LlmConfig, keys: &ApiKeys) -> Result<Arc<dyn GenerativeModel>, LlmError> {
    match config.provider {
        LlmProviderKind::Gemini => {
            let key = keys
                .gemini
                .as_deref()
                .ok_or_else(|| LlmError::Configuration("GEMINI_API_KEY".to_string()))?;
            Ok(Arc::new(GeminiClient::new(config, key)?))
        }
        LlmProviderKind::Openai => {
            let key = keys
                .openai
                .as_deref()
                .ok_or_else(|| LlmError::Configuration("OPENAI_API_KEY".to_string()))?;
            Ok(Arc::new(OpenAiClient::new(config, key)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warp::Filter;

    #[test]
    fn extractors_follow_priority_order() {
        let test_cases = vec![
            (
                json!({"candidates": [{"content": {"parts": [{"text": "{\"a\":"}, {"text": "1}"}]}}]}),
                Some("{\"a\":1}"),
            ),
            (json!({"choices": [{"message": {"content": "chat"}}]}), Some("chat")),
            (json!({"candidates": [{"content": {"text": "cct"}}]}), Some("cct")),
            (json!({"candidates": [{"content": "ccs"}]}), Some("ccs")),
            (json!({"output": "out"}), Some("out")),
            (json!({"output": ["first", "second"]}), Some("first")),
            (json!({"output": [{"content": {"parts": [{"text": "p"}]}}]}), Some("p")),
            (json!({"output": [{"content": {"text": "t"}}]}), Some("t")),
            (json!({"text": "{\"confidence\": 0.4}"}), Some("{\"confidence\": 0.4}")),
            (json!("{\"confidence\": 0.4}"), Some("{\"confidence\": 0.4}")),
            (json!({"candidates": [{"content": {"parts": [{"text": "  "}]}}], "text": "later"}), Some("later")),
            (json!({"content": "not a known shape"}), None),
            (json!("   "), None),
            (json!({"unexpected": true}), None),
        ];

        for (response, expected) in test_cases {
            assert_eq!(extract_text(&response).as_deref(), expected, "{response}");
        }
    }

    #[test]
    fn missing_key_is_configuration_error() {
        let config = LlmConfig::default();
        let result = model_from_config(&config, &ApiKeys::default());
        assert!(matches!(result, Err(LlmError::Configuration(name)) if name == "GEMINI_API_KEY"));
    }

    #[tokio::test]
    async fn gemini_sends_key_in_query_for_api_keys() {
        let route = warp::path!("v1beta" / "models" / String)
            .and(warp::post())
            .and(warp::query::<std::collections::HashMap<String, String>>())
            .and(warp::body::json())
            .map(|model: String, query: std::collections::HashMap<String, String>, body: Value| {
                let prompt = body["contents"][0]["parts"][0]["text"].as_str().unwrap_or_default();
                let text = format!(
                    "{}|{}|{}|{}",
                    model,
                    query.get("key").cloned().unwrap_or_default(),
                    prompt.starts_with(SYSTEM_INSTRUCTION),
                    body["generationConfig"]["maxOutputTokens"]
                );
                warp::reply::json(&json!({"candidates": [{"content": {"parts": [{"text": text}]}}]}))
            });
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        let config = LlmConfig {
            gemini_base_url: format!("http://{addr}/v1beta"),
            ..LlmConfig::default()
        };
        let client = GeminiClient::new(&config, "AIzaTestKey").unwrap();

        let text = client.generate("Analyse").await.unwrap();

        assert_eq!(text, "gemini-2.5-flash:generateContent|AIzaTestKey|true|800");
    }

    #[tokio::test]
    async fn provider_status_is_preserved() {
        let route = warp::any().map(|| {
            warp::reply::with_status("quota exceeded", warp::http::StatusCode::TOO_MANY_REQUESTS)
        });
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        let config = LlmConfig {
            openai_url: format!("http://{addr}/v1/chat/completions"),
            ..LlmConfig::default()
        };
        let client = OpenAiClient::new(&config, "sk-test").unwrap();

        let err = client.generate("Analyse").await.unwrap_err();

        assert_eq!(err.status(), Some(429));
    }
}

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

const MAX_ERROR_BODY: usize = 500;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("request timed out")]
    Timeout,
    #[error("provider responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed provider payload: {0}")]
    Malformed(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ProviderError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn can_retry(&self) -> bool {
        match self {
            ProviderError::Timeout | ProviderError::Network(_) => true,
            ProviderError::Status { status, .. } => *status == 429 || *status >= 500,
            ProviderError::Malformed(_) | ProviderError::Configuration(_) => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

/// Thin wrapper over a `reqwest::Client` with a per-call timeout and status mapping.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent.to_string())
            .build()
            .map_err(|err| ProviderError::Configuration(err.to_string()))?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn get_text(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<String, ProviderError> {
        debug!(url, "GET");
        send_text(self.client.get(url).query(query)).await
    }

    pub async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Value, ProviderError> {
        let body = self.get_text(url, query).await?;
        parse_json(&body)
    }
}

/// Sends a prepared request and returns the body of a 2xx response.
pub async fn send_text(request: RequestBuilder) -> Result<String, ProviderError> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        return Err(ProviderError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.text().await?)
}

pub async fn send_json(request: RequestBuilder) -> Result<Value, ProviderError> {
    let body = send_text(request).await?;
    parse_json(&body)
}

pub fn parse_json(body: &str) -> Result<Value, ProviderError> {
    serde_json::from_str(body).map_err(|err| ProviderError::Malformed(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_follows_status_class() {
        let test_cases = vec![
            (ProviderError::Timeout, true),
            (ProviderError::Network("reset".into()), true),
            (ProviderError::Status { status: 429, body: String::new() }, true),
            (ProviderError::Status { status: 503, body: String::new() }, true),
            (ProviderError::Status { status: 403, body: String::new() }, false),
            (ProviderError::Status { status: 404, body: String::new() }, false),
            (ProviderError::Malformed("eof".into()), false),
            (ProviderError::Configuration("no key".into()), false),
        ];

        for (error, expected) in test_cases {
            assert_eq!(error.can_retry(), expected, "{error:?}");
        }
    }

    #[test]
    fn parse_json_reports_malformed_body() {
        assert!(matches!(
            parse_json("<?xml version=\"1.0\"?>"),
            Err(ProviderError::Malformed(_))
        ));
        assert_eq!(parse_json("[1]").ok(), Some(serde_json::json!([1])));
    }
}

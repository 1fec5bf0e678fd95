use async_trait::async_trait;
use log::{debug, error};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::operations::Operation;

pub const DEFAULT_BASE_URL: &str = "https://hx-thermostat.herokuapp.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends one operation to the remote service and returns its `data` object.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, operation: &Operation, bearer: Option<&str>) -> Result<Value>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::new_with_base_url(DEFAULT_BASE_URL.to_string())
    }

    pub fn new_with_base_url(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get_headers(&self, bearer: Option<&str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = bearer {
            let auth_value = format!("Bearer {}", token);
            let value = HeaderValue::from_str(&auth_value)
                .map_err(|e| Error::Auth(format!("Access token is not a valid header: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }

        Ok(headers)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, operation: &Operation, bearer: Option<&str>) -> Result<Value> {
        debug!("Sending operation: {}", operation.name);

        let headers = self.get_headers(bearer)?;
        let response = self
            .client
            .post(&self.base_url)
            .headers(headers)
            .json(&operation.request())
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            error!("Rate limited while running {}", operation.name);
            return Err(Error::RateLimited);
        }

        // GraphQL servers report most failures in the body, often alongside a 200.
        let body: Value = match serde_json::from_str(&response_text) {
            Ok(body) => body,
            Err(e) => {
                if status == StatusCode::UNAUTHORIZED {
                    return Err(Error::Unauthenticated(response_text));
                }
                error!("Failed to parse response to {}: {}", operation.name, e);
                return Err(Error::Api(format!(
                    "Unexpected response to {} (HTTP {}): {}",
                    operation.name, status, response_text
                )));
            }
        };

        if let Some(err) = classify_errors(&body) {
            return Err(err);
        }

        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::Unauthenticated(response_text));
        }

        if !status.is_success() {
            error!("Operation {} failed: {}", operation.name, response_text);
            return Err(Error::Api(format!(
                "Operation {} failed (HTTP {}): {}",
                operation.name, status, response_text
            )));
        }

        match body.get("data") {
            Some(data) if !data.is_null() => Ok(data.clone()),
            _ => Err(Error::Api(format!("Empty response to {}", operation.name))),
        }
    }
}

/// Maps the GraphQL `errors` array onto the crate's error taxonomy.
pub fn classify_errors(body: &Value) -> Option<Error> {
    let errors = body.get("errors")?.as_array()?;
    if errors.is_empty() {
        return None;
    }

    let mut messages = Vec::with_capacity(errors.len());
    for err in errors {
        let message = err.get("message").and_then(Value::as_str).unwrap_or("");
        let code = err
            .pointer("/extensions/code")
            .and_then(Value::as_str)
            .unwrap_or("");

        if code == "UNAUTHENTICATED" || message.contains("UNAUTHENTICATED") {
            return Some(Error::Unauthenticated(message.to_string()));
        }
        if code.contains("RATE_LIMIT") {
            return Some(Error::RateLimited);
        }
        messages.push(message.to_string());
    }

    Some(Error::Api(messages.join("; ")))
}

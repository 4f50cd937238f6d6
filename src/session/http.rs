//! HTTP utilities for OpenStack REST API calls

use reqwest::header::HeaderMap;
use reqwest::{Client, Method};
use serde_json::Value;

use crate::error::{Error, Result};

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips non-printable characters
pub(crate) fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut cut = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!(
            "{}... [truncated, {} bytes total]",
            &body[..cut],
            body.len()
        )
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// A fully read HTTP response: headers and the parsed JSON body
/// (`Value::Null` when the body was empty). Non-success statuses never
/// reach the caller; they become typed errors in [`HttpClient::send`].
#[derive(Debug)]
pub(crate) struct HttpResponse {
    pub headers: HeaderMap,
    pub body: Value,
}

/// HTTP client wrapper for OpenStack API calls
#[derive(Clone)]
pub(crate) struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("ostack/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    /// The underlying reqwest client (shared with the auth layer).
    pub fn inner(&self) -> Client {
        self.client.clone()
    }

    /// Issue one request. The token goes into `X-Auth-Token`; an optional
    /// microversion header pair is added verbatim. Non-2xx responses are
    /// translated into typed errors with the service message extracted.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        token: &str,
        microversion: Option<(&str, &str)>,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<HttpResponse> {
        tracing::debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method, url)
            .header("X-Auth-Token", token);

        if let Some((header, version)) = microversion {
            request = request.header(header, version);
        }
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;

        let status = response.status();
        let headers = response.headers().clone();
        let text = response.text().await?;

        let body = if text.is_empty() {
            Value::Null
        } else {
            // Some endpoints return plain-text bodies on errors
            serde_json::from_str(&text).unwrap_or(Value::String(text.clone()))
        };

        if !status.is_success() {
            // Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&text));
            return Err(Error::from_response(status, &body));
        }

        Ok(HttpResponse { headers, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.contains("truncated, 500 bytes total"));
        assert!(sanitized.len() < body.len());
    }

    #[test]
    fn test_sanitize_strips_control_characters() {
        let sanitized = sanitize_for_log("ok\x07\nline");
        assert_eq!(sanitized, "okline");
    }
}

use crate::{BoxStream, Error, ErrorContext, Result};
use bytes::Bytes;
use futures::TryStreamExt;
use reqwest::Proxy;
use std::time::Duration;
use tracing::{debug, warn};

/// Knobs for building the shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Hard wall-clock ceiling for one upstream call, body included.
    pub timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
    pub proxy_url: Option<String>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            pool_max_idle_per_host: 32,
            pool_idle_timeout: Duration::from_secs(90),
            proxy_url: None,
        }
    }
}

/// Thin POST-and-stream wrapper over `reqwest` bound to one provider base URL.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    provider: String,
}

impl HttpTransport {
    pub fn new(provider: &str, base_url: &str, options: &TransportOptions) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(options.timeout)
            .pool_max_idle_per_host(options.pool_max_idle_per_host)
            .pool_idle_timeout(Some(options.pool_idle_timeout));

        if let Some(proxy_url) = &options.proxy_url {
            let proxy = Proxy::all(proxy_url).map_err(|e| {
                Error::configuration_with_context(
                    format!("invalid proxy url '{}': {}", proxy_url, e),
                    ErrorContext::new().with_field_path("AI_PROXY_URL"),
                )
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| Error::Transport(TransportError::Other(e.to_string())))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            provider: provider.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// POST `body` to `path` and return the raw response byte stream.
    ///
    /// Only connection-level failures are retried, and only `max_retries` times.
    /// A non-2xx status is turned into [`Error::Remote`] with the provider's message.
    pub async fn post_stream(
        &self,
        path: &str,
        body: &serde_json::Value,
        headers: &[(&str, String)],
        max_retries: u32,
    ) -> Result<BoxStream<'static, Bytes>> {
        let url = format!("{}{}", self.base_url, path);

        let mut attempt: u32 = 0;
        let resp = loop {
            let mut req = self
                .client
                .post(&url)
                .json(body)
                .header("accept", "text/event-stream");
            for (name, value) in headers {
                req = req.header(*name, value);
            }

            match req.send().await {
                Ok(resp) => break resp,
                Err(e) if attempt < max_retries && (e.is_connect() || e.is_timeout()) => {
                    attempt += 1;
                    warn!(
                        provider = self.provider.as_str(),
                        attempt,
                        error = %e,
                        "upstream connection failed, retrying"
                    );
                }
                Err(e) => return Err(Error::Transport(TransportError::Http(e))),
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            debug!(
                provider = self.provider.as_str(),
                http_status = status.as_u16(),
                "upstream returned error status"
            );
            return Err(Error::Remote {
                provider: self.provider.clone(),
                status: status.as_u16(),
                message: error_message_from_body(&text),
            });
        }

        let byte_stream = resp
            .bytes_stream()
            .map_err(|e| Error::Transport(TransportError::Http(e)));
        Ok(Box::pin(byte_stream))
    }
}

/// Pull a human-readable message out of an OpenAI/Gemini style error body.
///
/// Falls back to the raw body (or a placeholder when it is empty).
pub fn error_message_from_body(body: &str) -> String {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    let from_json = parsed.as_ref().and_then(|json| {
        let err = json.get("error")?;
        match err {
            serde_json::Value::String(s) => Some(s.clone()),
            _ => err
                .get("message")
                .and_then(|m| m.as_str())
                .map(|s| s.to_string()),
        }
    });

    match from_json {
        Some(msg) => msg,
        None if body.trim().is_empty() => "no response body".to_string(),
        None => body.trim().to_string(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_proxy_url_is_configuration_error() {
        let options = TransportOptions {
            proxy_url: Some("not a proxy url".to_string()),
            ..TransportOptions::default()
        };
        match HttpTransport::new("openrouter", "https://openrouter.ai/api/v1", &options) {
            Err(e @ Error::Configuration { .. }) => {
                assert!(e.to_string().contains("invalid proxy url"));
            }
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(_) => panic!("expected a configuration error"),
        }
    }

    #[test]
    fn test_valid_proxy_url_is_accepted() {
        let options = TransportOptions {
            proxy_url: Some("http://127.0.0.1:8080".to_string()),
            ..TransportOptions::default()
        };
        assert!(HttpTransport::new("openrouter", "https://openrouter.ai/api/v1", &options).is_ok());
    }

    #[test]
    fn test_error_message_openai_shape() {
        let body = r#"{"error":{"message":"Rate limit exceeded: free-models-per-min","code":429}}"#;
        assert_eq!(
            error_message_from_body(body),
            "Rate limit exceeded: free-models-per-min"
        );
    }

    #[test]
    fn test_error_message_plain_string() {
        assert_eq!(error_message_from_body(r#"{"error":"nope"}"#), "nope");
        assert_eq!(error_message_from_body("  bad gateway "), "bad gateway");
        assert_eq!(error_message_from_body(""), "no response body");
    }
}

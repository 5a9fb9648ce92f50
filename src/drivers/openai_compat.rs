//! OpenAI 兼容驱动 — 通过 OpenRouter 聚合器访问免费与付费模型
//!
//! OpenAI-compatible chat completions driver. Used for the aggregator, which speaks the
//! OpenAI wire format for every model it routes to:
//! - `POST {base_url}/chat/completions` with `stream: true`
//! - bearer authentication plus optional attribution headers (`HTTP-Referer`, `X-Title`)
//! - SSE frames carrying `choices[0].delta.content`
//! - throttling may arrive as an `{"error": {...}}` frame after the HTTP 200

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{ProviderClient, TextStream};
use crate::client::GenerationRequest;
use crate::pipeline::{text_stream, FrameMapper};
use crate::transport::http::TransportOptions;
use crate::transport::HttpTransport;
use crate::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

pub struct OpenAiCompatClient {
    transport: HttpTransport,
    api_key: String,
    extra_headers: Vec<(&'static str, String)>,
}

impl OpenAiCompatClient {
    pub fn new(base_url: &str, api_key: impl Into<String>, options: &TransportOptions) -> Result<Self> {
        Ok(Self {
            transport: HttpTransport::new("openrouter", base_url, options)?,
            api_key: api_key.into(),
            extra_headers: Vec::new(),
        })
    }

    /// Add a static header sent with every request (e.g. `HTTP-Referer`).
    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.extra_headers.push((name, value.into()));
        self
    }

    pub fn build_body(request: &GenerationRequest) -> Value {
        json!({
            "model": request.candidate.id,
            "messages": [{ "role": "user", "content": request.prompt }],
            "temperature": request.temperature,
            "stream": true,
        })
    }
}

#[async_trait]
impl ProviderClient for OpenAiCompatClient {
    fn name(&self) -> &str {
        self.transport.provider()
    }

    async fn stream_text(&self, request: &GenerationRequest) -> Result<TextStream> {
        let body = Self::build_body(request);
        let mut headers = vec![("authorization", format!("Bearer {}", self.api_key))];
        headers.extend(self.extra_headers.iter().cloned());

        let bytes = self
            .transport
            .post_stream("/chat/completions", &body, &headers, request.max_retries)
            .await?;

        Ok(text_stream(
            bytes,
            ChatChunkMapper {
                provider: self.transport.provider().to_string(),
            },
        ))
    }
}

struct ChatChunkMapper {
    provider: String,
}

impl FrameMapper for ChatChunkMapper {
    fn map_frame(&self, frame: &Value) -> Result<Option<String>> {
        if let Some(err) = frame.get("error") {
            return Err(in_stream_error(&self.provider, err));
        }
        Ok(frame
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("delta"))
            .and_then(|d| d.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.to_string()))
    }
}

/// Convert an error object delivered inside the event stream into [`Error::Remote`].
///
/// Numeric and numeric-string `code`s are used as the status; anything else maps to 502.
pub(crate) fn in_stream_error(provider: &str, err: &Value) -> Error {
    let status = err
        .get("code")
        .and_then(|c| c.as_u64().or_else(|| c.as_str().and_then(|s| s.parse().ok())))
        .filter(|c| (100..600).contains(c))
        .map(|c| c as u16)
        .unwrap_or(502);
    let message = err
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("upstream reported an error")
        .to_string();
    Error::Remote {
        provider: provider.to_string(),
        status,
        message,
    }
}

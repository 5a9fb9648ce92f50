//! Gemini 直连驱动 — 使用独立凭证的备用通道
//!
//! Google Gemini `streamGenerateContent` driver, used as the direct backup provider.
//! Key differences from the OpenAI shape:
//! - Uses `contents` with `parts` instead of `messages`.
//! - `generationConfig` wraps temperature.
//! - Streaming with `alt=sse`; every frame is a full response chunk whose text lives in
//!   `candidates[0].content.parts[*].text`.
//! - API key travels in the `x-goog-api-key` header.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::openai_compat::in_stream_error;
use super::{ProviderClient, TextStream};
use crate::client::GenerationRequest;
use crate::pipeline::{text_stream, FrameMapper};
use crate::transport::http::TransportOptions;
use crate::transport::HttpTransport;
use crate::Result;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiClient {
    transport: HttpTransport,
    api_key: String,
}

impl GeminiClient {
    pub fn new(base_url: &str, api_key: impl Into<String>, options: &TransportOptions) -> Result<Self> {
        Ok(Self {
            transport: HttpTransport::new("gemini", base_url, options)?,
            api_key: api_key.into(),
        })
    }

    pub fn build_body(request: &GenerationRequest) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": request.prompt }],
            }],
            "generationConfig": {
                "temperature": request.temperature,
            },
        })
    }

    pub fn stream_path(model: &str) -> String {
        format!("/models/{}:streamGenerateContent?alt=sse", model)
    }
}

#[async_trait]
impl ProviderClient for GeminiClient {
    fn name(&self) -> &str {
        self.transport.provider()
    }

    async fn stream_text(&self, request: &GenerationRequest) -> Result<TextStream> {
        let body = Self::build_body(request);
        let headers = [("x-goog-api-key", self.api_key.clone())];
        let bytes = self
            .transport
            .post_stream(
                &Self::stream_path(&request.candidate.id),
                &body,
                &headers,
                request.max_retries,
            )
            .await?;

        Ok(text_stream(
            bytes,
            GeminiChunkMapper {
                provider: self.transport.provider().to_string(),
            },
        ))
    }
}

struct GeminiChunkMapper {
    provider: String,
}

impl FrameMapper for GeminiChunkMapper {
    fn map_frame(&self, frame: &Value) -> Result<Option<String>> {
        if let Some(err) = frame.get("error") {
            return Err(in_stream_error(&self.provider, err));
        }
        let parts = frame
            .get("candidates")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.as_array());

        Ok(parts.map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect::<String>()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{ModelCandidate, ModelTier, DIRECT_BACKUP_MODEL};
    use crate::Error;

    #[test]
    fn test_request_shape() {
        let req = GenerationRequest::new(
            "prompt",
            ModelCandidate::new(DIRECT_BACKUP_MODEL, 3, ModelTier::DirectBackup),
        );
        let body = GeminiClient::build_body(&req);
        assert_eq!(body["contents"][0]["parts"][0]["text"], "prompt");
        assert!(body["generationConfig"]["temperature"].is_number());
        assert_eq!(
            GeminiClient::stream_path(DIRECT_BACKUP_MODEL),
            "/models/gemini-2.0-flash:streamGenerateContent?alt=sse"
        );
    }

    #[test]
    fn test_mapper_joins_parts() {
        let mapper = GeminiChunkMapper {
            provider: "gemini".to_string(),
        };
        let frame = json!({
            "candidates": [{"content": {"parts": [{"text": "Madrid, "}, {"text": "5 december"}]}}]
        });
        assert_eq!(
            mapper.map_frame(&frame).unwrap().as_deref(),
            Some("Madrid, 5 december")
        );

        let exhausted = json!({"error": {"code": 429, "status": "RESOURCE_EXHAUSTED", "message": "Quota exceeded"}});
        assert!(matches!(
            mapper.map_frame(&exhausted),
            Err(Error::Remote { status: 429, .. })
        ));
    }
}

//! Provider 驱动抽象层 — 通过 trait 统一不同上游的流式生成调用
//!
//! Provider client abstraction. Each upstream API style has a concrete implementation;
//! the orchestrator only sees `Arc<dyn ProviderClient>`.
//!
//! | Driver | Upstream |
//! |--------|----------|
//! | [`OpenAiCompatClient`] | OpenAI-compatible `/chat/completions` (OpenRouter aggregator) |
//! | [`GeminiClient`] | Google Gemini `streamGenerateContent` (direct backup) |

pub mod gemini;
pub mod openai_compat;

use async_trait::async_trait;

use crate::client::GenerationRequest;
use crate::{BoxStream, Result};

pub use gemini::GeminiClient;
pub use openai_compat::OpenAiCompatClient;

/// Stream of non-empty text deltas.
pub type TextStream = BoxStream<'static, String>;

/// Core trait for a streaming text-generation upstream.
///
/// Implementations perform at most `1 + request.max_retries` connection attempts and
/// never switch models on their own: retry and fallback decisions belong to the caller.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Stable provider name used in logs and errors.
    fn name(&self) -> &str;

    /// Open a streaming generation call for `request.candidate`.
    ///
    /// Errors returned here happened before any output. Errors yielded by the stream
    /// may surface on the first poll (some upstreams only report throttling then).
    async fn stream_text(&self, request: &GenerationRequest) -> Result<TextStream>;
}

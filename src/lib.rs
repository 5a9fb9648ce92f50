//! # verse-gateway
//!
//! 个性化诗歌生成网关：多模型回退链、流式转发与多窗口限流。
//!
//! Streaming gateway that turns a poem request into a prompt, sends it to a chain
//! of large-language-model candidates, and relays the first working stream back
//! to the caller.
//!
//! ## Overview
//!
//! - **Provider selection**: [`routing::ProviderSelector`] turns the configured model
//!   into an ordered [`routing::CandidatePlan`]. Free models get a fallback chain,
//!   paid models are tried exactly once.
//! - **Fallback streaming**: [`client::FallbackOrchestrator`] opens one candidate at a
//!   time, waits for the first text chunk, and either commits to that stream or moves
//!   on according to [`client::FailureKind`].
//! - **Admission control**: [`resilience::RateLimiter`] counts requests per client in
//!   minute/hour/day buckets on a shared [`resilience::CounterStore`] and fails open
//!   when the store is unavailable.
//! - **HTTP surface**: [`server`] exposes `POST /api/generate-poem` with axum.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use verse_gateway::config::GatewayConfig;
//!
//! #[tokio::main]
//! async fn main() -> verse_gateway::Result<()> {
//!     let config = GatewayConfig::from_env()?;
//!     let state = verse_gateway::server::AppState::from_config(&config).await?;
//!     let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
//!     verse_gateway::server::serve(listener, state).await
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`routing`] | Model catalog, tier classification, candidate plans |
//! | [`client`] | Fallback orchestrator and failure classification |
//! | [`drivers`] | Upstream provider clients (OpenAI-compatible, Gemini) |
//! | [`pipeline`] | SSE decoding into text deltas |
//! | [`transport`] | Shared HTTP transport |
//! | [`resilience`] | Windowed rate limiter and counter stores |
//! | [`prompt`] | Poem request to prompt text |
//! | [`server`] | axum router and handlers |
//! | [`config`] | Environment configuration |

pub mod client;
pub mod config;
pub mod drivers;
pub mod pipeline;
pub mod prompt;
pub mod resilience;
pub mod routing;
pub mod server;
pub mod transport;

// Re-export main types for convenience
pub use client::{FailureKind, FallbackOrchestrator, Generation, GenerationRequest};
pub use drivers::ProviderClient;
pub use resilience::{RateLimitDecision, RateLimiter};
pub use routing::{CandidatePlan, ModelCandidate, ModelTier, ProviderSelector};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream that emits `Result<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};

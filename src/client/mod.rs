//! 回退编排层：按顺序尝试候选模型并转发首个可用的流。
//!
//! Fallback streaming orchestration.
//!
//! Streaming semantics:
//! - fallback may happen only before any chunk is handed to the caller
//! - once a chunk is emitted, the request is committed to that model

pub mod error_classification;
pub mod orchestrator;
pub mod types;

pub use error_classification::{classify_error, FailureKind};
pub use orchestrator::FallbackOrchestrator;
pub use types::{Generation, GenerationOutcome, GenerationRequest};

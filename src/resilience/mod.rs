//! 弹性模式模块：基于共享计数存储的多窗口限流。
//!
//! # Admission Control
//!
//! Requests are counted per client identity in three nested fixed windows (minute, hour,
//! day). Counters live in an external [`CounterStore`] so that every gateway instance sees
//! the same numbers; all mutation goes through the store's atomic increment.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`rate_limiter`] | Window bucketing, admission decision, fail-open policy |
//! | [`store`] | Counter store trait with Redis, KV REST and in-memory backends |
//!
//! ```rust
//! use std::sync::Arc;
//! use verse_gateway::resilience::{MemoryCounterStore, RateLimitConfig, RateLimiter};
//!
//! # async fn demo() {
//! let limiter = RateLimiter::new(Arc::new(MemoryCounterStore::new()));
//! let decision = limiter.check("203.0.113.7", &RateLimitConfig::default()).await;
//! assert!(decision.allowed);
//! # }
//! ```

pub mod rate_limiter;
pub mod store;

pub use rate_limiter::{
    Granularity, QuotaSnapshot, RateLimitConfig, RateLimitDecision, RateLimiter, RateWindow,
};
pub use store::{CounterStore, KvRestCounterStore, MemoryCounterStore, RedisCounterStore};

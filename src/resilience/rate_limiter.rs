use crate::resilience::store::CounterStore;
use crate::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Fixed window sizes a client is counted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Minute,
    Hour,
    Day,
}

impl Granularity {
    pub const ALL: [Granularity; 3] = [Granularity::Minute, Granularity::Hour, Granularity::Day];

    pub fn length_secs(self) -> u64 {
        match self {
            Granularity::Minute => 60,
            Granularity::Hour => 3_600,
            Granularity::Day => 86_400,
        }
    }

    /// Label used inside counter keys.
    pub fn key_label(self) -> &'static str {
        match self {
            Granularity::Minute => "min",
            Granularity::Hour => "hour",
            Granularity::Day => "day",
        }
    }

    pub fn bucket(self, now_secs: u64) -> u64 {
        now_secs / self.length_secs()
    }

    pub fn window_start(self, now_secs: u64) -> u64 {
        self.bucket(now_secs) * self.length_secs()
    }

    /// Seconds until the current bucket ends; a full length at an exact boundary.
    pub fn reset_in(self, now_secs: u64) -> u64 {
        self.length_secs() - now_secs % self.length_secs()
    }

    /// Key expiry: twice the bucket length so boundary skew never evicts a live window.
    pub fn ttl(self) -> Duration {
        Duration::from_secs(self.length_secs() * 2)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub per_minute: u64,
    pub per_hour: u64,
    pub per_day: u64,
}

impl RateLimitConfig {
    pub fn new() -> Self {
        Self {
            per_minute: 5,
            per_hour: 30,
            per_day: 100,
        }
    }

    pub fn with_per_minute(mut self, n: u64) -> Self {
        self.per_minute = n;
        self
    }

    pub fn with_per_hour(mut self, n: u64) -> Self {
        self.per_hour = n;
        self
    }

    pub fn with_per_day(mut self, n: u64) -> Self {
        self.per_day = n;
        self
    }

    pub fn limit(&self, granularity: Granularity) -> u64 {
        match granularity {
            Granularity::Minute => self.per_minute,
            Granularity::Hour => self.per_hour,
            Granularity::Day => self.per_day,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// One number per granularity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QuotaSnapshot {
    pub minute: u64,
    pub hour: u64,
    pub day: u64,
}

impl QuotaSnapshot {
    pub fn from_fn(mut f: impl FnMut(Granularity) -> u64) -> Self {
        Self {
            minute: f(Granularity::Minute),
            hour: f(Granularity::Hour),
            day: f(Granularity::Day),
        }
    }

    pub fn get(&self, granularity: Granularity) -> u64 {
        match granularity {
            Granularity::Minute => self.minute,
            Granularity::Hour => self.hour,
            Granularity::Day => self.day,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: QuotaSnapshot,
    pub reset_in: QuotaSnapshot,
}

impl RateLimitDecision {
    /// The smallest window with no quota left, if any.
    pub fn exhausted_window(&self) -> Option<Granularity> {
        Granularity::ALL
            .into_iter()
            .find(|g| self.remaining.get(*g) == 0)
    }

    /// Seconds a denied client should wait before retrying.
    pub fn retry_after_secs(&self) -> u64 {
        let g = self.exhausted_window().unwrap_or(Granularity::Minute);
        self.reset_in.get(g)
    }
}

/// One counter: identity, granularity, current count and where its window begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateWindow {
    pub key: String,
    pub granularity: Granularity,
    pub count: u64,
    /// Unix seconds at which the window started.
    pub window_start: u64,
}

/// Minute/hour/day admission control over a shared [`CounterStore`].
///
/// - Fail-open: without a store, or when the store errors, every request is admitted
///   with full quota. Availability wins over strict enforcement.
/// - Denied requests are not counted.
pub struct RateLimiter {
    store: Option<Arc<dyn CounterStore>>,
    key_prefix: String,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store: Some(store),
            key_prefix: "rate:poem".to_string(),
        }
    }

    /// A limiter with no backing store: admits everything.
    pub fn disabled() -> Self {
        Self {
            store: None,
            key_prefix: "rate:poem".to_string(),
        }
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn store_name(&self) -> Option<&'static str> {
        self.store.as_ref().map(|s| s.name())
    }

    /// Counter windows for `identity` at `now_secs` (counts not loaded).
    pub fn windows(&self, identity: &str, now_secs: u64) -> [RateWindow; 3] {
        Granularity::ALL.map(|g| RateWindow {
            key: format!(
                "{}:{}:{}:{}",
                self.key_prefix,
                identity,
                g.key_label(),
                g.bucket(now_secs)
            ),
            granularity: g,
            count: 0,
            window_start: g.window_start(now_secs),
        })
    }

    pub async fn check(&self, identity: &str, limits: &RateLimitConfig) -> RateLimitDecision {
        self.check_at(identity, limits, SystemTime::now()).await
    }

    pub async fn check_at(
        &self,
        identity: &str,
        limits: &RateLimitConfig,
        now: SystemTime,
    ) -> RateLimitDecision {
        let now_secs = now
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let reset_in = QuotaSnapshot::from_fn(|g| g.reset_in(now_secs));

        let Some(store) = &self.store else {
            debug!(identity, "rate limiting disabled, no counter store configured");
            return Self::fail_open(limits, reset_in);
        };

        match self
            .try_check(store.as_ref(), identity, limits, now_secs, reset_in)
            .await
        {
            Ok(decision) => decision,
            Err(e) => {
                warn!(
                    identity,
                    store = store.name(),
                    error = %e,
                    "rate limiter store failed, admitting request"
                );
                Self::fail_open(limits, reset_in)
            }
        }
    }

    async fn try_check(
        &self,
        store: &dyn CounterStore,
        identity: &str,
        limits: &RateLimitConfig,
        now_secs: u64,
        reset_in: QuotaSnapshot,
    ) -> Result<RateLimitDecision> {
        let [mut minute, mut hour, mut day] = self.windows(identity, now_secs);

        let (m, h, d) = futures::try_join!(
            store.get(&minute.key),
            store.get(&hour.key),
            store.get(&day.key)
        )?;
        minute.count = m.unwrap_or(0);
        hour.count = h.unwrap_or(0);
        day.count = d.unwrap_or(0);

        let windows = [&minute, &hour, &day];
        if let Some(hit) = windows
            .iter()
            .find(|w| w.count >= limits.limit(w.granularity))
        {
            info!(
                identity,
                window = hit.granularity.key_label(),
                count = hit.count,
                "rate limit exceeded"
            );
            return Ok(RateLimitDecision {
                allowed: false,
                remaining: QuotaSnapshot::from_fn(|g| {
                    limits.limit(g).saturating_sub(windows[g as usize].count)
                }),
                reset_in,
            });
        }

        let (m, h, d) = futures::try_join!(
            store.incr_with_expiry(&minute.key, Granularity::Minute.ttl()),
            store.incr_with_expiry(&hour.key, Granularity::Hour.ttl()),
            store.incr_with_expiry(&day.key, Granularity::Day.ttl())
        )?;
        let after = QuotaSnapshot {
            minute: m,
            hour: h,
            day: d,
        };

        Ok(RateLimitDecision {
            allowed: true,
            remaining: QuotaSnapshot::from_fn(|g| limits.limit(g).saturating_sub(after.get(g))),
            reset_in,
        })
    }

    fn fail_open(limits: &RateLimitConfig, reset_in: QuotaSnapshot) -> RateLimitDecision {
        RateLimitDecision {
            allowed: true,
            remaining: QuotaSnapshot::from_fn(|g| limits.limit(g)),
            reset_in,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_and_reset() {
        // 2024-01-01T00:00:00Z
        let t0 = 1_704_067_200u64;
        assert_eq!(Granularity::Minute.reset_in(t0), 60);
        assert_eq!(Granularity::Hour.reset_in(t0), 3_600);
        assert_eq!(Granularity::Day.reset_in(t0), 86_400);

        assert_eq!(Granularity::Minute.reset_in(t0 + 17), 43);
        assert_eq!(Granularity::Minute.bucket(t0 + 59), Granularity::Minute.bucket(t0));
        assert_eq!(Granularity::Minute.bucket(t0 + 60), Granularity::Minute.bucket(t0) + 1);
        assert_eq!(Granularity::Hour.window_start(t0 + 4_000), t0 + 3_600);
    }

    #[test]
    fn test_ttl_is_twice_window() {
        for g in Granularity::ALL {
            assert_eq!(g.ttl().as_secs(), g.length_secs() * 2);
        }
    }

    #[test]
    fn test_window_keys() {
        let limiter = RateLimiter::disabled();
        let [m, h, d] = limiter.windows("10.0.0.1", 120);
        assert_eq!(m.key, "rate:poem:10.0.0.1:min:2");
        assert_eq!(h.key, "rate:poem:10.0.0.1:hour:0");
        assert_eq!(d.key, "rate:poem:10.0.0.1:day:0");
        assert_eq!(m.window_start, 120);
    }

    #[test]
    fn test_exhausted_window_order() {
        let decision = RateLimitDecision {
            allowed: false,
            remaining: QuotaSnapshot {
                minute: 2,
                hour: 0,
                day: 0,
            },
            reset_in: QuotaSnapshot {
                minute: 10,
                hour: 600,
                day: 7_200,
            },
        };
        assert_eq!(decision.exhausted_window(), Some(Granularity::Hour));
        assert_eq!(decision.retry_after_secs(), 600);
    }

    #[tokio::test]
    async fn test_disabled_limiter_fails_open() {
        let limiter = RateLimiter::disabled();
        let limits = RateLimitConfig::default();
        for _ in 0..10 {
            let d = limiter.check("1.2.3.4", &limits).await;
            assert!(d.allowed);
            assert_eq!(d.remaining.minute, 5);
            assert_eq!(d.remaining.day, 100);
        }
    }
}

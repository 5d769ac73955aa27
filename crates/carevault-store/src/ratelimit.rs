//! Fixed-window per-key operation limiter.
//!
//! Windows are persisted in the medium under `"_rate_limit_" + key` so that
//! every store sharing a medium sees the same counts. Bookkeeping failures
//! fail open: availability of the governed data wins over strict throttling.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StoreResult;
use crate::medium::Medium;

/// Prefix of rate-window bookkeeping keys.
pub const RATE_LIMIT_PREFIX: &str = "_rate_limit_";

/// Returns the bookkeeping key for `key`.
pub fn rate_key(key: &str) -> String {
    format!("{}{}", RATE_LIMIT_PREFIX, key)
}

/// Configuration for the fixed-window limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Window length in milliseconds.
    pub window_ms: u64,
    /// Operations allowed per window. Zero disables limiting.
    pub max_operations: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: 60_000,
            max_operations: 30,
        }
    }
}

impl RateLimitConfig {
    /// Creates a config with the given window and maximum.
    pub fn new(window_ms: u64, max_operations: u32) -> Self {
        Self {
            window_ms,
            max_operations,
        }
    }

    /// A config that never denies.
    pub fn unlimited() -> Self {
        Self {
            max_operations: 0,
            ..Self::default()
        }
    }
}

/// Persisted per-key counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateWindow {
    /// Start of the current window, ms since epoch.
    pub window_start: i64,
    /// Operations attempted in the current window.
    pub operation_count: u32,
}

/// Outcome of a limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// The operation may proceed.
    Allow {
        /// Count after this operation.
        count: u32,
    },
    /// The window is exhausted.
    Deny {
        /// Count after this operation.
        count: u32,
    },
}

impl RateDecision {
    /// True if the operation may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allow { .. })
    }
}

/// Fixed-window counter, one window per key.
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Creates a limiter with the given config.
    pub fn new(config: RateLimitConfig) -> Self {
        Self { config }
    }

    /// Returns the limiter configuration.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Counts one attempted operation on `key` and decides whether it may
    /// proceed. Every call increments the count, including denied ones.
    pub async fn check_and_increment<M: Medium>(
        &self,
        medium: &M,
        key: &str,
        now_ms: i64,
    ) -> RateDecision {
        if self.config.max_operations == 0 {
            return RateDecision::Allow { count: 0 };
        }

        let bookkeeping = rate_key(key);
        let current = match self.read_window(medium, &bookkeeping).await {
            Ok(window) => window,
            Err(reason) => {
                warn!(key = %key, reason = %reason, "rate window unreadable, allowing operation");
                return RateDecision::Allow { count: 0 };
            }
        };

        let window = match current {
            Some(w) if now_ms.saturating_sub(w.window_start) <= self.config.window_ms as i64 => {
                RateWindow {
                    window_start: w.window_start,
                    operation_count: w.operation_count.saturating_add(1),
                }
            }
            _ => RateWindow {
                window_start: now_ms,
                operation_count: 1,
            },
        };

        match serde_json::to_string(&window) {
            Ok(raw) => {
                if let Err(e) = medium.put(&bookkeeping, raw).await {
                    warn!(key = %key, error = %e, "failed to persist rate window, allowing operation");
                    return RateDecision::Allow {
                        count: window.operation_count,
                    };
                }
            }
            Err(e) => {
                warn!(key = %key, error = %e, "failed to encode rate window, allowing operation");
                return RateDecision::Allow {
                    count: window.operation_count,
                };
            }
        }

        if window.operation_count > self.config.max_operations {
            debug!(
                key = %key,
                count = window.operation_count,
                max = self.config.max_operations,
                "rate limit exceeded"
            );
            RateDecision::Deny {
                count: window.operation_count,
            }
        } else {
            RateDecision::Allow {
                count: window.operation_count,
            }
        }
    }

    /// Deletes the window for `key` once it has elapsed, so it can no longer
    /// affect a later operation. A live window is kept: removing the governed
    /// entry does not reset its count. Returns true if the window was deleted.
    pub async fn release<M: Medium>(
        &self,
        medium: &M,
        key: &str,
        now_ms: i64,
    ) -> StoreResult<bool> {
        let bookkeeping = rate_key(key);
        let expired = match self.read_window(medium, &bookkeeping).await {
            Ok(None) => return Ok(false),
            Ok(Some(w)) => {
                self.config.max_operations == 0
                    || now_ms.saturating_sub(w.window_start) > self.config.window_ms as i64
            }
            // Unreadable windows already fail open.
            Err(_) => true,
        };
        if expired {
            medium.delete(&bookkeeping).await?;
            debug!(key = %key, "released expired rate window");
        }
        Ok(expired)
    }

    /// Reads the current window for `key`, if any.
    pub async fn window<M: Medium>(&self, medium: &M, key: &str) -> Option<RateWindow> {
        self.read_window(medium, &rate_key(key)).await.ok().flatten()
    }

    async fn read_window<M: Medium>(
        &self,
        medium: &M,
        bookkeeping: &str,
    ) -> Result<Option<RateWindow>, String> {
        let raw = medium.get(bookkeeping).await.map_err(|e| e.to_string())?;
        match raw {
            None => Ok(None),
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| format!("corrupt rate window: {}", e)),
        }
    }
}

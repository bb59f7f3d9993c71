//! Engine configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// History engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default)]
    pub shard: ShardConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub transfer: TransferQueueConfig,

    #[serde(default)]
    pub timer: TimerQueueConfig,

    #[serde(default)]
    pub retry: RetryPolicy,
}

/// Shard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardConfig {
    /// Width of the task-id range claimed per range id: ids in
    /// `[range_id << bits, (range_id + 1) << bits)` belong to one lease.
    #[serde(default = "default_range_size_bits")]
    pub range_size_bits: u32,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            range_size_bits: default_range_size_bits(),
        }
    }
}

/// Execution cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of resident executions
    #[serde(default = "default_cache_max_size")]
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: default_cache_max_size(),
        }
    }
}

/// Transfer queue processor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferQueueConfig {
    /// Tasks read per poll
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Poll interval when nothing signals new tasks
    #[serde(default = "default_transfer_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Tasks of one page dispatched concurrently
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
}

impl TransferQueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for TransferQueueConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            poll_interval_ms: default_transfer_poll_interval_ms(),
            worker_count: default_worker_count(),
        }
    }
}

/// Timer queue processor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerQueueConfig {
    /// Timers read per poll
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Longest sleep when no timer is known
    #[serde(default = "default_timer_max_poll_interval_ms")]
    pub max_poll_interval_ms: u64,
}

impl TimerQueueConfig {
    pub fn max_poll_interval(&self) -> Duration {
        Duration::from_millis(self.max_poll_interval_ms)
    }
}

impl Default for TimerQueueConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_poll_interval_ms: default_timer_max_poll_interval_ms(),
        }
    }
}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), with up to 20% jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let base = self
            .initial_backoff_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_backoff_ms);
        let jitter = if base >= 5 {
            rand::random::<u64>() % (base / 5)
        } else {
            0
        };
        Duration::from_millis(base.saturating_sub(jitter))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_range_size_bits() -> u32 {
    20
}

fn default_cache_max_size() -> usize {
    512
}

fn default_batch_size() -> usize {
    100
}

fn default_transfer_poll_interval_ms() -> u64 {
    10_000
}

fn default_worker_count() -> usize {
    10
}

fn default_timer_max_poll_interval_ms() -> u64 {
    60_000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    50
}

fn default_max_backoff_ms() -> u64 {
    2_000
}

//! History engine core.
//!
//! One [`HistoryEngine`] serves one owned shard:
//! - [`ShardContext`] holds the lease and hands out task ids
//! - [`MutableState`] projects a workflow's history into pending work
//! - [`ExecutionCache`] serializes access to each execution
//! - [`TransferQueueProcessor`] and [`TimerQueueProcessor`] drain the shard's queues
//!
//! Execution writes are conditional on the execution's `next_event_id` and the
//! shard's `range_id`. Losing the range closes the shard and stops everything
//! built on it.

pub mod ack;
pub mod api;
pub mod cache;
pub mod clients;
pub mod config;
pub mod engine;
pub mod error;
pub mod mutable_state;
pub mod shard;
pub mod time;
pub mod timer;
pub mod timer_gate;
pub mod transfer;

pub use ack::AckManager;
pub use cache::{ExecutionCache, ExecutionHandle};
pub use clients::{AddActivityTaskRequest, AddDecisionTaskRequest, HistoryClient, MatchingClient};
pub use config::{
    CacheConfig, HistoryConfig, RetryPolicy, ShardConfig, TimerQueueConfig, TransferQueueConfig,
};
pub use engine::HistoryEngine;
pub use error::{HistoryError, Result};
pub use mutable_state::{DecisionInfo, MutableState, PendingSnapshot};
pub use shard::{ShardContext, ShardStores};
pub use time::{ManualTimeSource, SystemTimeSource, TimeSource};
pub use timer::TimerQueueProcessor;
pub use timer_gate::TimerGate;
pub use transfer::TransferQueueProcessor;

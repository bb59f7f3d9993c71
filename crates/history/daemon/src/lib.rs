//! historyd: a single-shard workflow history node.
//!
//! Loads [`DaemonConfig`], acquires the configured shard over the in-memory
//! store, and runs the transfer and timer queue processors until shutdown.

pub mod clients;
pub mod config;
pub mod node;

pub use clients::{DispatchedTask, LoggingMatchingClient, LoopbackHistoryClient};
pub use config::{DaemonConfig, LoggingConfig};
pub use node::{shutdown_signal, HistoryNode};

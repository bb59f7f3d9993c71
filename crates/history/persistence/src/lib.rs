//! Persistence contracts for the history service.
//!
//! Three managers cover the row model: [`ShardManager`] for the shard lease,
//! [`ExecutionManager`] for one shard's executions and task queues, and
//! [`HistoryManager`] for the append-only event log. Every write performed on
//! behalf of a shard carries the range id the writer observed; the store
//! rejects it with [`PersistenceError::ShardOwnershipLost`] once the lease has
//! moved on.
//!
//! [`InMemoryStore`] implements all three with the conditional semantics a
//! production driver must provide.

pub mod error;
pub mod memory;
pub mod metered;
pub mod requests;
pub mod traits;

pub use error::{PersistenceError, Result};
pub use memory::{InMemoryExecutionManager, InMemoryStore};
pub use metered::{MeteredExecutionManager, MeteredHistoryManager, MeteredShardManager};
pub use requests::*;
pub use traits::{ExecutionManager, HistoryManager, ShardManager};

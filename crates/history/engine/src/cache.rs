//! Execution cache
//!
//! Keeps recently used mutable states resident and serializes access to each
//! execution: a caller holds an [`ExecutionHandle`] for the whole
//! load-mutate-commit sequence, and every other caller for the same
//! execution waits for it.
//!
//! A failed commit leaves the cached copy in an unknown relation to the
//! store, so the handle drops it and the next holder reloads.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use history_metrics::{Counter, Scope};
use history_types::ExecutionKey;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::config::RetryPolicy;
use crate::error::{HistoryError, Result};
use crate::mutable_state::MutableState;
use crate::shard::ShardContext;

struct CacheEntry {
    slot: Arc<Mutex<Option<MutableState>>>,
    holders: AtomicUsize,
    last_access: AtomicU64,
}

/// Decrements the holder count when dropped, including on a cancelled acquire.
struct Holder(Arc<CacheEntry>);

impl Drop for Holder {
    fn drop(&mut self) {
        self.0.holders.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct ExecutionCache {
    shard: Arc<ShardContext>,
    max_size: usize,
    retry: RetryPolicy,
    entries: DashMap<ExecutionKey, Arc<CacheEntry>>,
    clock: AtomicU64,
}

impl ExecutionCache {
    pub fn new(shard: Arc<ShardContext>, max_size: usize, retry: RetryPolicy) -> Self {
        Self {
            shard,
            max_size: max_size.max(1),
            retry,
            entries: DashMap::new(),
            clock: AtomicU64::new(0),
        }
    }

    pub fn shard(&self) -> &Arc<ShardContext> {
        &self.shard
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exclusive access to one execution. Waits while another caller holds it.
    pub async fn get_or_create(&self, key: &ExecutionKey) -> Result<ExecutionHandle> {
        if self.shard.is_closed() {
            return Err(HistoryError::ShardClosed(self.shard.shard_id()));
        }

        let holder = {
            let entry = self.entries.entry(key.clone()).or_insert_with(|| {
                Arc::new(CacheEntry {
                    slot: Arc::new(Mutex::new(None)),
                    holders: AtomicUsize::new(0),
                    last_access: AtomicU64::new(0),
                })
            });
            entry.holders.fetch_add(1, Ordering::SeqCst);
            entry
                .last_access
                .store(self.clock.fetch_add(1, Ordering::Relaxed), Ordering::Relaxed);
            Holder(entry.clone())
        };
        self.evict_idle();

        let guard = holder.0.slot.clone().lock_owned().await;
        Ok(ExecutionHandle {
            key: key.clone(),
            guard,
            shard: self.shard.clone(),
            _holder: holder,
        })
    }

    /// Load, mutate and commit one execution, retrying on conflicts.
    ///
    /// `action` runs against fresh state on every attempt. An error it returns
    /// discards whatever it buffered.
    pub async fn update_with_retry<T, F>(&self, key: &ExecutionKey, mut action: F) -> Result<T>
    where
        F: FnMut(&mut MutableState) -> Result<T>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut handle = self.get_or_create(key).await?;

            let applied = match handle.load().await {
                Ok(state) => action(state),
                Err(e) => Err(e),
            };
            let outcome = match applied {
                Ok(value) => handle.commit().await.map(|()| value),
                Err(e) => {
                    handle.clear();
                    Err(e)
                }
            };
            drop(handle);

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            self.shard
                .metrics()
                .inc_counter(Scope::ExecutionCache, Counter::ConcurrencyUpdateFailure);
            if attempt >= max_attempts {
                warn!(execution = %key, attempts = attempt, error = %err, "Giving up on update");
                return Err(HistoryError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }
            debug!(execution = %key, attempt, error = %err, "Retrying update");
            tokio::time::sleep(self.retry.backoff(attempt)).await;
        }
    }

    /// Drop idle entries, least recently used first, until within bounds.
    ///
    /// Entries someone holds are never evicted, so the cache can run over its
    /// size while every entry is busy.
    fn evict_idle(&self) {
        let excess = self.entries.len().saturating_sub(self.max_size);
        if excess == 0 {
            return;
        }

        let mut idle: Vec<(u64, ExecutionKey)> = self
            .entries
            .iter()
            .filter(|e| e.holders.load(Ordering::SeqCst) == 0)
            .map(|e| (e.last_access.load(Ordering::Relaxed), e.key().clone()))
            .collect();
        idle.sort_unstable_by_key(|(access, _)| *access);

        let mut evicted = 0;
        for (_, key) in idle {
            if evicted == excess {
                break;
            }
            if self
                .entries
                .remove_if(&key, |_, e| e.holders.load(Ordering::SeqCst) == 0)
                .is_some()
            {
                evicted += 1;
            }
        }
    }
}

/// Exclusive lease on one cached execution.
pub struct ExecutionHandle {
    key: ExecutionKey,
    guard: OwnedMutexGuard<Option<MutableState>>,
    shard: Arc<ShardContext>,
    _holder: Holder,
}

impl ExecutionHandle {
    pub fn key(&self) -> &ExecutionKey {
        &self.key
    }

    /// The resident state, loading it from the store if absent.
    pub async fn load(&mut self) -> Result<&mut MutableState> {
        if self.guard.is_none() {
            let persisted = self
                .shard
                .execution_manager()
                .get_workflow_execution(&self.key)
                .await?;
            *self.guard = Some(MutableState::from_persisted(
                persisted,
                self.shard.time_source().clone(),
            ));
        }
        self.guard
            .as_mut()
            .ok_or_else(|| HistoryError::not_exists(self.key.to_string()))
    }

    /// Like [`Self::load`], but reloads once if the resident state has not yet
    /// seen `event_id`. Another host or a failed commit can leave it behind.
    pub async fn load_fresh(&mut self, event_id: i64) -> Result<&mut MutableState> {
        let stale = self
            .load()
            .await
            .map(|state| event_id >= state.next_event_id())?;
        if stale {
            self.shard
                .metrics()
                .inc_counter(Scope::ExecutionCache, Counter::StaleMutableState);
            debug!(execution = %self.key, event_id, "Reloading stale mutable state");
            self.clear();
        }
        self.load().await
    }

    /// Install the state of a run that has never been persisted and write it.
    pub async fn create(&mut self, request_id: String, mut state: MutableState) -> Result<()> {
        let commit = state.prepare_commit();
        let result = async {
            self.shard
                .append_history_events(&self.key, commit.first_event_id, commit.events)
                .await?;
            self.shard
                .create_workflow_execution(
                    request_id,
                    state.to_persisted(),
                    commit.transfer_tasks,
                    commit.timer_tasks,
                )
                .await
        }
        .await;

        match result {
            Ok(timers) => {
                state.committed(&timers);
                *self.guard = Some(state);
                Ok(())
            }
            Err(e) => {
                self.clear();
                Err(e)
            }
        }
    }

    /// Persist everything buffered since the last commit: the history batch
    /// first, then the conditional execution update carrying the new tasks.
    pub async fn commit(&mut self) -> Result<()> {
        let Some(state) = self.guard.as_mut() else {
            return Ok(());
        };
        if !state.has_pending_changes() {
            return Ok(());
        }
        let commit = state.prepare_commit();

        let result = async {
            if !commit.events.is_empty() {
                self.shard
                    .append_history_events(&self.key, commit.first_event_id, commit.events)
                    .await?;
            }
            self.shard
                .update_workflow_execution(commit.request, commit.transfer_tasks, commit.timer_tasks)
                .await
        }
        .await;

        match result {
            Ok(timers) => {
                if let Some(state) = self.guard.as_mut() {
                    state.committed(&timers);
                }
                Ok(())
            }
            Err(e) => {
                self.clear();
                Err(e)
            }
        }
    }

    /// Forget the resident state; the next holder reloads it.
    pub fn clear(&mut self) {
        *self.guard = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HistoryConfig;
    use crate::mutable_state::StartWorkflowParams;
    use crate::shard::ShardStores;
    use crate::time::SystemTimeSource;
    use history_metrics::MetricsClient;
    use history_persistence::{ExecutionManager, InMemoryStore};
    use history_types::{new_run_id, ShardId};
    use std::time::Duration;

    const SHARD: ShardId = ShardId(3);

    async fn shard(store: &InMemoryStore) -> Arc<ShardContext> {
        ShardContext::acquire(
            SHARD,
            "host-a",
            &HistoryConfig::default(),
            ShardStores {
                shards: Arc::new(store.clone()),
                executions: Arc::new(store.execution_manager(SHARD)),
                history: Arc::new(store.clone()),
            },
            MetricsClient::detached(),
            Arc::new(SystemTimeSource),
        )
        .await
        .unwrap()
    }

    async fn start(cache: &ExecutionCache, workflow_id: &str) -> ExecutionKey {
        let key = ExecutionKey::new("domain", workflow_id, new_run_id());
        let mut state = MutableState::new(&key, cache.shard().time_source().clone());
        state
            .add_workflow_execution_started_event(StartWorkflowParams {
                workflow_type: "wf".into(),
                task_list: "tl".into(),
                input: vec![],
                execution_start_to_close_timeout_secs: 0,
                task_start_to_close_timeout_secs: 10,
                identity: "test".into(),
                request_id: "req".into(),
                parent: None,
            })
            .unwrap();
        let mut handle = cache.get_or_create(&key).await.unwrap();
        handle.create("req".into(), state).await.unwrap();
        key
    }

    #[tokio::test]
    async fn concurrent_updates_are_serialized() {
        let store = InMemoryStore::new();
        let cache = Arc::new(ExecutionCache::new(
            shard(&store).await,
            16,
            RetryPolicy::default(),
        ));
        let key = start(&cache, "wf-1").await;

        let mut tasks = Vec::new();
        for i in 0..10 {
            let cache = cache.clone();
            let key = key.clone();
            tasks.push(tokio::spawn(async move {
                let mut handle = cache.get_or_create(&key).await.unwrap();
                let state = handle.load().await.unwrap();
                state
                    .add_workflow_execution_signaled(format!("s{i}"), vec![], "test")
                    .unwrap();
                tokio::time::sleep(Duration::from_millis(1)).await;
                handle.commit().await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let stored = store
            .execution_manager(SHARD)
            .get_workflow_execution(&key)
            .await
            .unwrap();
        assert_eq!(stored.execution_info.next_event_id, 12);
        assert_eq!(store.history_batch_count(&key), 11);
    }

    #[tokio::test]
    async fn failed_action_discards_buffered_events() {
        let store = InMemoryStore::new();
        let cache = ExecutionCache::new(shard(&store).await, 16, RetryPolicy::default());
        let key = start(&cache, "wf-1").await;

        let err = cache
            .update_with_retry(&key, |state| {
                state.add_workflow_execution_signaled("s", vec![], "test")?;
                Err::<(), _>(HistoryError::bad_request("rejected"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, HistoryError::BadRequest(_)));

        let next = cache
            .update_with_retry(&key, |state| Ok(state.next_event_id()))
            .await
            .unwrap();
        assert_eq!(next, 2);
    }

    #[tokio::test]
    async fn missing_execution_is_reported() {
        let store = InMemoryStore::new();
        let cache = ExecutionCache::new(shard(&store).await, 16, RetryPolicy::default());
        let key = ExecutionKey::new("domain", "nope", "run");
        let err = cache
            .update_with_retry(&key, |state| Ok(state.next_event_id()))
            .await
            .unwrap_err();
        assert!(matches!(err, HistoryError::EntityNotExists(_)));
    }

    #[tokio::test]
    async fn eviction_skips_held_entries() {
        let store = InMemoryStore::new();
        let cache = ExecutionCache::new(shard(&store).await, 2, RetryPolicy::default());

        let a = cache
            .get_or_create(&ExecutionKey::new("d", "a", "r"))
            .await
            .unwrap();
        let b = cache
            .get_or_create(&ExecutionKey::new("d", "b", "r"))
            .await
            .unwrap();
        let c = cache
            .get_or_create(&ExecutionKey::new("d", "c", "r"))
            .await
            .unwrap();
        assert_eq!(cache.len(), 3);

        drop(a);
        drop(b);
        drop(c);
        let _d = cache
            .get_or_create(&ExecutionKey::new("d", "d", "r"))
            .await
            .unwrap();
        assert_eq!(cache.len(), 2);
        assert!(cache.entries.contains_key(&ExecutionKey::new("d", "d", "r")));
        assert!(cache.entries.contains_key(&ExecutionKey::new("d", "c", "r")));
    }

    #[tokio::test]
    async fn stale_state_is_reloaded() {
        let store = InMemoryStore::new();
        let cache = ExecutionCache::new(shard(&store).await, 16, RetryPolicy::default());
        let key = start(&cache, "wf-1").await;

        let mut handle = cache.get_or_create(&key).await.unwrap();
        let state = handle.load_fresh(5).await.unwrap();
        assert_eq!(state.next_event_id(), 2);
        assert_eq!(
            cache
                .shard()
                .metrics()
                .counter_value(Scope::ExecutionCache, Counter::StaleMutableState),
            1
        );
    }
}

//! Deduplicated, reference-counted multi-endpoint message queue
//!
//! Bodies live once in the shared `messages` partition, keyed by message id
//! and carrying a refcount. Each endpoint owns an append-only log of
//! lightweight [`MessageRef`]s in partition `endpoint.<id>`. A body is
//! deleted when the last log holding a ref to it trims that ref.

use crate::{
    checkpoint::CheckpointStore,
    cleanup::{CleanupProcessor, CleanupSettings, CleanupStats, EndpointCleanup},
    entity_store::EntityStore,
    message::{Message, StoredMessage},
    sequential_store::SequentialStore,
    store_provider::StoreProvider,
};
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use ferry_core::{observe, FerryError, MessageStoreConfig, Offset, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// Partition holding the shared message bodies
pub const MESSAGES_PARTITION: &str = "messages";

/// Prefix of the per-endpoint log partitions
pub const ENDPOINT_PARTITION_PREFIX: &str = "endpoint.";

pub(crate) fn endpoint_partition(endpoint_id: &str) -> String {
    format!("{ENDPOINT_PARTITION_PREFIX}{endpoint_id}")
}

/// Stored body of a message with the number of endpoint logs referencing it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageWrapper {
    pub message: Message,
    pub created_at: DateTime<Utc>,
    pub ref_count: u64,
}

impl MessageWrapper {
    pub fn new(message: Message, created_at: DateTime<Utc>) -> Self {
        Self {
            message,
            created_at,
            ref_count: 1,
        }
    }
}

/// Entry of an endpoint log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
}

impl MessageRef {
    pub fn new(message_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            message_id: message_id.into(),
            timestamp,
        }
    }
}

/// Progress summary of one endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointInfo {
    pub endpoint_id: String,

    /// Lowest offset still in the log
    pub first_offset: Option<Offset>,

    /// Offset the next `add` will be assigned
    pub next_offset: Offset,

    /// Last checkpointed offset
    pub checkpoint_offset: Offset,

    /// Offsets assigned but not yet checkpointed
    pub lag: u64,
}

type EndpointLog = SequentialStore<MessageRef>;

/// Whether a ref stamped at `timestamp` has outlived `ttl`
fn is_expired(timestamp: DateTime<Utc>, ttl: Duration) -> bool {
    if ttl.is_zero() {
        return true;
    }
    // a timestamp in the future (clock moved back) never counts as expired
    (Utc::now() - timestamp)
        .to_std()
        .map(|age| age >= ttl)
        .unwrap_or(false)
}

/// State shared between the public store handle and the cleanup tasks
pub(crate) struct StoreState {
    store_provider: Arc<StoreProvider>,
    messages: EntityStore<String, MessageWrapper>,
    checkpoint_store: Arc<CheckpointStore>,
    endpoints: DashMap<String, Arc<EndpointLog>>,
    // shared by `add`, exclusive while an endpoint is registered or removed
    lifecycle: RwLock<()>,
    time_to_live: RwLock<Duration>,
}

impl StoreState {
    fn endpoint(&self, endpoint_id: &str) -> Result<Arc<EndpointLog>> {
        self.endpoints
            .get(endpoint_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| FerryError::NotFound(format!("endpoint {endpoint_id}")))
    }

    pub(crate) fn time_to_live(&self) -> Duration {
        *self.time_to_live.read()
    }

    /// Registered endpoints in id order
    pub(crate) fn endpoint_snapshot(&self) -> Vec<(String, Arc<EndpointLog>)> {
        let mut snapshot: Vec<_> = self
            .endpoints
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        snapshot.sort_by(|a, b| a.0.cmp(&b.0));
        snapshot
    }

    /// Drop one reference to a body, deleting the body at zero.
    ///
    /// Returns whether the body was deleted. The delete re-checks the count
    /// under the key lock, so an `add` racing in between keeps the body.
    fn release_message(&self, message_id: &str) -> Result<bool> {
        let key = message_id.to_string();
        let released = self.messages.update(&key, |mut wrapper| {
            wrapper.ref_count = wrapper.ref_count.saturating_sub(1);
            wrapper
        })?;

        match released {
            Some(wrapper) if wrapper.ref_count == 0 => {
                self.messages.remove_if(&key, |w| w.ref_count == 0)
            }
            Some(_) => Ok(false),
            None => {
                tracing::debug!(message_id, "Released a ref whose body is already gone");
                Ok(false)
            }
        }
    }

    /// Trim the head of one endpoint log while its refs are checkpointed or
    /// expired
    pub(crate) fn cleanup_endpoint(
        &self,
        endpoint_id: &str,
        log: &EndpointLog,
        cancel: Option<&CancellationToken>,
    ) -> Result<EndpointCleanup> {
        let result = self.trim_endpoint(endpoint_id, log, cancel);
        match &result {
            Ok(outcome) => {
                observe::record_endpoint_cleanup(outcome.refs_removed, outcome.bodies_deleted, true);
                if outcome.refs_removed > 0 {
                    tracing::debug!(
                        endpoint = %endpoint_id,
                        refs_removed = outcome.refs_removed,
                        bodies_deleted = outcome.bodies_deleted,
                        "Trimmed endpoint log"
                    );
                }
            }
            Err(_) => observe::record_endpoint_cleanup(0, 0, false),
        }
        result
    }

    fn trim_endpoint(
        &self,
        endpoint_id: &str,
        log: &EndpointLog,
        cancel: Option<&CancellationToken>,
    ) -> Result<EndpointCleanup> {
        let checkpoint = self.checkpoint_store.get_checkpoint_data(endpoint_id)?;
        let ttl = self.time_to_live();
        let mut outcome = EndpointCleanup::default();

        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                break;
            }

            let mut trimmed = None;
            log.remove_first(|offset, message_ref| {
                if checkpoint.offset < offset && !is_expired(message_ref.timestamp, ttl) {
                    return Ok(false);
                }
                trimmed = Some(message_ref.message_id.clone());
                Ok(true)
            })?;

            // released only once the ref is gone, so a failed delete never
            // drops the same ref twice
            let Some(message_id) = trimmed else {
                break;
            };
            outcome.refs_removed += 1;
            if self.release_message(&message_id)? {
                outcome.bodies_deleted += 1;
            }
        }

        Ok(outcome)
    }

    /// One pass over every registered endpoint, without pauses
    fn cleanup_all(&self) -> CleanupStats {
        let started = std::time::Instant::now();
        let mut stats = CleanupStats::default();

        for (endpoint_id, log) in self.endpoint_snapshot() {
            match self.cleanup_endpoint(&endpoint_id, &log, None) {
                Ok(outcome) => stats.record(outcome),
                Err(e) => {
                    stats.record_failure();
                    tracing::error!(endpoint = %endpoint_id, error = %e, "Endpoint cleanup failed");
                }
            }
        }

        observe::record_cleanup_pass(started.elapsed());
        stats
    }

    /// Remove every ref of `log`, releasing the bodies they point at
    fn drain_endpoint(&self, log: &EndpointLog) -> Result<u64> {
        let mut drained = 0;
        loop {
            let mut removed = None;
            log.remove_first(|_, message_ref| {
                removed = Some(message_ref.message_id.clone());
                Ok(true)
            })?;
            let Some(message_id) = removed else {
                return Ok(drained);
            };
            drained += 1;
            self.release_message(&message_id)?;
        }
    }
}

/// Durable message buffer shared by many endpoints
///
/// Must be created inside a Tokio runtime, which hosts the background
/// cleanup. All other operations are synchronous and may block on storage.
///
/// # Example
///
/// ```no_run
/// use ferry::prelude::*;
/// use std::sync::Arc;
///
/// # async fn run() -> ferry::Result<()> {
/// let provider = Arc::new(StoreProvider::open_lmdb(DbStoreConfig::new("./data"))?);
/// let checkpoints = Arc::new(CheckpointStore::create(&provider)?);
/// let store = MessageStore::create(provider, checkpoints.clone(), MessageStoreConfig::default())?;
///
/// store.add_endpoint("upstream")?;
/// store.add("upstream", Message::new("hello").with_message_id("m1"))?;
///
/// let mut iter = store.get_message_iterator("upstream", 0)?;
/// for stored in iter.get_next(32)? {
///     checkpoints.set_checkpoint_data("upstream", &CheckpointData::new(stored.offset))?;
/// }
/// store.close().await;
/// # Ok(())
/// # }
/// ```
pub struct MessageStore {
    state: Arc<StoreState>,
    cleanup: CleanupProcessor,
}

impl MessageStore {
    pub fn create(
        store_provider: Arc<StoreProvider>,
        checkpoint_store: Arc<CheckpointStore>,
        config: MessageStoreConfig,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| {
            FerryError::InvalidState("MessageStore must be created inside a Tokio runtime".into())
        })?;

        let messages = store_provider.entity_store(MESSAGES_PARTITION)?;
        let state = Arc::new(StoreState {
            store_provider,
            messages,
            checkpoint_store,
            endpoints: DashMap::new(),
            lifecycle: RwLock::new(()),
            time_to_live: RwLock::new(config.time_to_live()),
        });

        let settings = CleanupSettings::from_config(&config);
        let cleanup = CleanupProcessor::start(state.clone(), settings, &runtime);

        tracing::info!(
            ttl_ms = config.time_to_live_ms,
            cleanup_interval = ?settings.interval,
            "Message store started"
        );

        Ok(Self { state, cleanup })
    }

    /// Register an endpoint, resuming its log after the stored checkpoint.
    /// Registering an id twice keeps the first registration.
    pub fn add_endpoint(&self, endpoint_id: &str) -> Result<()> {
        let _lifecycle = self.state.lifecycle.write();
        if self.state.endpoints.contains_key(endpoint_id) {
            return Ok(());
        }

        let checkpoint = self.state.checkpoint_store.get_checkpoint_data(endpoint_id)?;
        let log = self
            .state
            .store_provider
            .sequential_store_with_default_head(&endpoint_partition(endpoint_id), checkpoint.offset + 1)?;

        match self.state.endpoints.entry(endpoint_id.to_string()) {
            Entry::Occupied(_) => {}
            Entry::Vacant(vacant) => {
                let next_offset = log.next_offset();
                vacant.insert(Arc::new(log));
                tracing::info!(
                    endpoint = %endpoint_id,
                    checkpoint = checkpoint.offset,
                    next_offset,
                    "Endpoint added"
                );
            }
        }
        observe::set_endpoint_count(self.state.endpoints.len());
        Ok(())
    }

    /// Unregister an endpoint and delete its log, releasing every body it
    /// still referenced. The checkpoint record is kept. Unknown ids are
    /// ignored.
    ///
    /// Adds and registrations wait until the log partition is gone, so a
    /// re-registered endpoint always starts from an empty log.
    pub fn remove_endpoint(&self, endpoint_id: &str) -> Result<()> {
        let _lifecycle = self.state.lifecycle.write();
        let Some((id, log)) = self.state.endpoints.remove(endpoint_id) else {
            return Ok(());
        };

        let drained = match self.state.drain_endpoint(&log) {
            Ok(drained) => drained,
            Err(e) => {
                self.state.endpoints.insert(id, log);
                return Err(e);
            }
        };
        self.state.store_provider.remove_store(log.entity_name())?;

        observe::set_endpoint_count(self.state.endpoints.len());
        tracing::info!(endpoint = %endpoint_id, refs_released = drained, "Endpoint removed");
        Ok(())
    }

    /// Store `message` for `endpoint_id` and return it with its offset.
    ///
    /// The body is written (or its refcount bumped) before the ref is
    /// appended, so a reader never sees a ref ahead of its body.
    pub fn add(&self, endpoint_id: &str, message: Message) -> Result<StoredMessage> {
        let _lifecycle = self.state.lifecycle.read();
        let log = self.state.endpoint(endpoint_id)?;
        let message_id = message
            .message_id()
            .ok_or_else(|| {
                FerryError::InvalidArgument("message has no edgeMsgId system property".into())
            })?
            .to_string();

        let now = Utc::now();
        let mut deduplicated = false;
        self.state.messages.put_or_update(
            &message_id,
            MessageWrapper::new(message.clone(), now),
            |mut existing| {
                deduplicated = true;
                existing.ref_count += 1;
                existing
            },
        )?;

        let offset = match log.append(&MessageRef::new(message_id.clone(), now)) {
            Ok(offset) => offset,
            Err(e) => {
                if let Err(compensation) = self.state.release_message(&message_id) {
                    tracing::warn!(
                        endpoint = %endpoint_id,
                        message_id = %message_id,
                        error = %compensation,
                        "Failed to release body after append failure"
                    );
                }
                return Err(e);
            }
        };

        observe::record_message_added(deduplicated);
        tracing::trace!(endpoint = %endpoint_id, message_id = %message_id, offset, "Message added");
        Ok(StoredMessage::new(offset, message))
    }

    /// Iterator over the endpoint's messages from `start` (clamped to 0)
    pub fn get_message_iterator(&self, endpoint_id: &str, start: Offset) -> Result<MessageIterator> {
        let log = self.state.endpoint(endpoint_id)?;
        Ok(MessageIterator {
            state: self.state.clone(),
            endpoint_id: endpoint_id.to_string(),
            log,
            next_offset: start.max(0),
        })
    }

    /// Applies from the next cleanup pass on
    pub fn set_time_to_live(&self, ttl: Duration) {
        *self.state.time_to_live.write() = ttl;
        tracing::info!(ttl = ?ttl, "Time to live updated");
    }

    pub fn time_to_live(&self) -> Duration {
        self.state.time_to_live()
    }

    /// Registered endpoint ids, sorted
    pub fn endpoints(&self) -> Vec<String> {
        self.state
            .endpoint_snapshot()
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }

    pub fn endpoint_info(&self, endpoint_id: &str) -> Result<EndpointInfo> {
        let log = self.state.endpoint(endpoint_id)?;
        let checkpoint = self.state.checkpoint_store.get_checkpoint_data(endpoint_id)?;
        let next_offset = log.next_offset();

        Ok(EndpointInfo {
            endpoint_id: endpoint_id.to_string(),
            first_offset: log.first_offset()?,
            next_offset,
            checkpoint_offset: checkpoint.offset,
            lag: (next_offset - 1 - checkpoint.offset).max(0) as u64,
        })
    }

    /// Run one cleanup pass now, on the calling thread
    pub fn cleanup_once(&self) -> CleanupStats {
        self.state.cleanup_all()
    }

    /// Number of stored message bodies
    pub fn message_count(&self) -> Result<usize> {
        self.state.messages.len()
    }

    /// Refcount of a stored body, `None` if no body is stored under the id
    pub fn message_ref_count(&self, message_id: &str) -> Result<Option<u64>> {
        Ok(self
            .state
            .messages
            .get(&message_id.to_string())?
            .map(|wrapper| wrapper.ref_count))
    }

    /// Stop background cleanup, waiting up to the configured grace period
    pub async fn close(self) {
        self.cleanup.stop().await;
        tracing::info!("Message store closed");
    }
}

/// Restartable cursor over one endpoint log
///
/// Not a snapshot. Each call reads whatever the log holds from the cursor
/// on, so refs appended later show up on later calls.
pub struct MessageIterator {
    state: Arc<StoreState>,
    endpoint_id: String,
    log: Arc<EndpointLog>,
    next_offset: Offset,
}

impl MessageIterator {
    /// Up to `batch_size` messages in offset order.
    ///
    /// Refs whose body is gone or cannot be decoded are skipped, and the
    /// cursor still moves past them. A storage error stops the batch at the
    /// failing ref: messages read before it are returned and the cursor
    /// stays on it, so the next call retries that ref. With nothing read yet
    /// the error itself is returned.
    pub fn get_next(&mut self, batch_size: usize) -> Result<Vec<StoredMessage>> {
        if batch_size == 0 {
            return Err(FerryError::InvalidArgument(
                "batch size must be at least 1".into(),
            ));
        }

        let refs = self.log.get_batch(self.next_offset, batch_size)?;
        let mut messages = Vec::with_capacity(refs.len());

        for (offset, message_ref) in refs {
            match self.state.messages.get(&message_ref.message_id) {
                Ok(Some(wrapper)) => messages.push(StoredMessage::new(offset, wrapper.message)),
                Ok(None) => {
                    observe::record_missing_body();
                    tracing::warn!(
                        endpoint = %self.endpoint_id,
                        offset,
                        message_id = %message_ref.message_id,
                        "Message body missing; skipping ref"
                    );
                }
                Err(FerryError::Serialization(e)) => {
                    tracing::warn!(
                        endpoint = %self.endpoint_id,
                        offset,
                        message_id = %message_ref.message_id,
                        error = %e,
                        "Message body unreadable; skipping ref"
                    );
                }
                Err(e) => {
                    self.next_offset = offset;
                    if messages.is_empty() {
                        return Err(e);
                    }
                    tracing::warn!(
                        endpoint = %self.endpoint_id,
                        offset,
                        error = %e,
                        "Body read failed; returning partial batch"
                    );
                    return Ok(messages);
                }
            }
            self.next_offset = offset + 1;
        }

        Ok(messages)
    }

    /// Offset the next call starts reading from
    pub fn position(&self) -> Offset {
        self.next_offset
    }

    pub fn endpoint_id(&self) -> &str {
        &self.endpoint_id
    }
}

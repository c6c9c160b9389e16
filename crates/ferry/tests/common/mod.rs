//! Shared fixtures for message store integration tests

#![allow(dead_code)]

use ferry::prelude::*;
use ferry::{DbStore, DbStoreProvider, InMemoryDbStoreProvider, KvEntry};
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

/// Config whose background passes stay out of the way of explicit
/// `cleanup_once` calls
pub fn quiet_config() -> MessageStoreConfig {
    MessageStoreConfig::default()
        .with_endpoint_pause(Duration::ZERO)
        .with_min_pass_interval(Duration::from_millis(10))
}

pub struct Fixture {
    pub provider: Arc<StoreProvider>,
    pub checkpoints: Arc<CheckpointStore>,
    pub store: MessageStore,
}

pub fn in_memory(config: MessageStoreConfig) -> Fixture {
    with_provider(Arc::new(StoreProvider::in_memory()), config)
}

pub fn with_provider(provider: Arc<StoreProvider>, config: MessageStoreConfig) -> Fixture {
    let checkpoints = Arc::new(CheckpointStore::create(&provider).unwrap());
    let store = MessageStore::create(provider.clone(), checkpoints.clone(), config).unwrap();
    Fixture {
        provider,
        checkpoints,
        store,
    }
}

pub fn msg(id: &str) -> Message {
    Message::new(format!("payload {id}")).with_message_id(id)
}

pub fn log_offsets(provider: &StoreProvider, endpoint_id: &str) -> Vec<Offset> {
    let log: SequentialStore<ferry::MessageRef> = provider
        .sequential_store(&format!("endpoint.{endpoint_id}"))
        .unwrap();
    log.get_batch(0, 1000)
        .unwrap()
        .into_iter()
        .map(|(offset, _)| offset)
        .collect()
}

/// Faults injected into a [`FailingProvider`], switchable mid-test
#[derive(Default)]
pub struct Faults {
    endpoint_writes: AtomicBool,
    reads_of: Mutex<Option<Vec<u8>>>,
    removes_in: Mutex<Option<String>>,
    remove_delay: Mutex<Duration>,
    removes_started: AtomicUsize,
}

impl Faults {
    /// Reject every put into an endpoint log partition
    pub fn fail_endpoint_writes(&self, on: bool) {
        self.endpoint_writes.store(on, Ordering::SeqCst);
    }

    /// Reject reads of `key` in every partition
    pub fn fail_reads_of(&self, key: &[u8]) {
        *self.reads_of.lock() = Some(key.to_vec());
    }

    pub fn heal_reads(&self) {
        *self.reads_of.lock() = None;
    }

    /// Reject deletes in `partition` only
    pub fn fail_removes_in(&self, partition: &str) {
        *self.removes_in.lock() = Some(partition.to_string());
    }

    pub fn heal_removes(&self) {
        *self.removes_in.lock() = None;
    }

    /// Block every endpoint log delete for `delay`
    pub fn delay_removes(&self, delay: Duration) {
        *self.remove_delay.lock() = delay;
    }

    /// Endpoint log deletes attempted so far
    pub fn removes_started(&self) -> usize {
        self.removes_started.load(Ordering::SeqCst)
    }
}

/// In-memory raw provider whose partitions misbehave on demand
pub struct FailingProvider {
    inner: InMemoryDbStoreProvider,
    faults: Arc<Faults>,
}

impl FailingProvider {
    pub fn new() -> (Self, Arc<Faults>) {
        let faults = Arc::new(Faults::default());
        let provider = Self {
            inner: InMemoryDbStoreProvider::new(),
            faults: faults.clone(),
        };
        (provider, faults)
    }
}

struct FailingStore {
    inner: Arc<dyn DbStore>,
    faults: Arc<Faults>,
}

impl FailingStore {
    fn is_endpoint_log(&self) -> bool {
        self.inner.name().starts_with("endpoint.")
    }
}

impl DbStore for FailingStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if self.faults.reads_of.lock().as_deref() == Some(key) {
            return Err(FerryError::Storage("injected read failure".into()));
        }
        self.inner.get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if self.is_endpoint_log() && self.faults.endpoint_writes.load(Ordering::SeqCst) {
            return Err(FerryError::Storage("injected write failure".into()));
        }
        self.inner.put(key, value)
    }

    fn remove(&self, key: &[u8]) -> Result<()> {
        if self.faults.removes_in.lock().as_deref() == Some(self.inner.name()) {
            return Err(FerryError::Storage("injected remove failure".into()));
        }
        if self.is_endpoint_log() {
            self.faults.removes_started.fetch_add(1, Ordering::SeqCst);
            let delay = *self.faults.remove_delay.lock();
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
        }
        self.inner.remove(key)
    }

    fn first_entry(&self) -> Result<Option<KvEntry>> {
        self.inner.first_entry()
    }

    fn last_entry(&self) -> Result<Option<KvEntry>> {
        self.inner.last_entry()
    }

    fn scan_batch(&self, start: Option<&[u8]>, batch_size: usize) -> Result<Vec<KvEntry>> {
        self.inner.scan_batch(start, batch_size)
    }
}

impl DbStoreProvider for FailingProvider {
    fn db_store(&self, partition: &str) -> Result<Arc<dyn DbStore>> {
        Ok(Arc::new(FailingStore {
            inner: self.inner.db_store(partition)?,
            faults: self.faults.clone(),
        }))
    }

    fn default_db_store(&self) -> Result<Arc<dyn DbStore>> {
        self.db_store("$default")
    }

    fn remove_db_store(&self, partition: &str) -> Result<()> {
        self.inner.remove_db_store(partition)
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }
}

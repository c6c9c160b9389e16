//! Ferry: a durable, deduplicated message buffer for edge brokers
//!
//! Ferry provides the persistence core of a broker that fans messages out to
//! many independent endpoints:
//! - **Entity store**: typed keyed store with per-key read-modify-write
//! - **Sequential store**: append-only log with gapless offsets
//! - **Checkpoint store**: per-endpoint consumption progress
//! - **Message store**: one reference-counted body per message, one ref log
//!   per endpoint, and background cleanup of delivered or expired refs
//!
//! # Quick Start
//!
//! ```no_run
//! use ferry::prelude::*;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let provider = Arc::new(StoreProvider::open_lmdb(DbStoreConfig::new("./data"))?);
//! let checkpoints = Arc::new(CheckpointStore::create(&provider)?);
//! let store = MessageStore::create(provider, checkpoints, MessageStoreConfig::default())?;
//!
//! store.add_endpoint("telemetry")?;
//! let stored = store.add("telemetry", Message::new("21.5").with_message_id("m-1"))?;
//! assert_eq!(stored.offset, 0);
//!
//! store.close().await;
//! # Ok(())
//! # }
//! ```

pub mod checkpoint;
pub mod checkpointer;
pub mod cleanup;
pub mod entity_store;
pub mod keys;
pub mod message;
pub mod message_store;
pub mod prelude;
pub mod sequential_store;
pub mod store_provider;

// Re-export core types
pub use ferry_core::{
    config::{DbStoreConfig, MessageStoreConfig, SyncMode},
    error::{FerryError, Result},
    traits::{DbStore, DbStoreProvider, KvEntry},
    types::{Offset, INVALID_OFFSET},
    InMemoryDbStoreProvider, LockManager,
};

// Re-export implementations
pub use ferry_lmdb::LmdbDbStoreProvider;

// Re-export main types from this crate
pub use checkpoint::{CheckpointData, CheckpointStore};
pub use checkpointer::Checkpointer;
pub use cleanup::CleanupStats;
pub use entity_store::EntityStore;
pub use keys::StoreKey;
pub use message::{system_properties, Message, StoredMessage};
pub use message_store::{EndpointInfo, MessageIterator, MessageRef, MessageStore, MessageWrapper};
pub use sequential_store::SequentialStore;
pub use store_provider::StoreProvider;

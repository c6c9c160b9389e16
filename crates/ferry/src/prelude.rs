//! Ferry Prelude
//!
//! Import this to get all commonly used types and traits:
//!
//! ```
//! use ferry::prelude::*;
//! ```

// Core types
pub use crate::{FerryError, Offset, Result, INVALID_OFFSET};

// Configs
pub use crate::{DbStoreConfig, MessageStoreConfig, SyncMode};

// Stores
pub use crate::{CheckpointData, CheckpointStore, Checkpointer, StoreProvider};
pub use crate::{EntityStore, SequentialStore, StoreKey};

// Messages
pub use crate::{CleanupStats, EndpointInfo, Message, MessageIterator, MessageStore, StoredMessage};

pub mod db_store;
pub mod message_store;

pub use db_store::{DbStoreConfig, SyncMode};
pub use message_store::MessageStoreConfig;

//! Per-endpoint consumption progress

use crate::{entity_store::EntityStore, store_provider::StoreProvider};
use chrono::{DateTime, Utc};
use ferry_core::{Offset, Result, INVALID_OFFSET};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Partition holding one checkpoint record per endpoint
pub const CHECKPOINTS_PARTITION: &str = "checkpoints";

const SCAN_PAGE_SIZE: usize = 256;

/// Last safely processed offset of one endpoint plus its health timestamps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointData {
    pub offset: Offset,
    #[serde(default)]
    pub last_failed_revival_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unhealthy_since: Option<DateTime<Utc>>,
}

impl CheckpointData {
    pub fn new(offset: Offset) -> Self {
        Self {
            offset,
            last_failed_revival_time: None,
            unhealthy_since: None,
        }
    }

    pub fn with_last_failed_revival_time(mut self, time: Option<DateTime<Utc>>) -> Self {
        self.last_failed_revival_time = time;
        self
    }

    pub fn with_unhealthy_since(mut self, time: Option<DateTime<Utc>>) -> Self {
        self.unhealthy_since = time;
        self
    }

    /// Whether anything has been checkpointed yet
    pub fn is_valid(&self) -> bool {
        self.offset > INVALID_OFFSET
    }
}

impl Default for CheckpointData {
    fn default() -> Self {
        Self::new(INVALID_OFFSET)
    }
}

/// Durable checkpoint records keyed by endpoint id; last write wins
pub struct CheckpointStore {
    entity_store: EntityStore<String, CheckpointData>,
}

impl CheckpointStore {
    pub fn new(entity_store: EntityStore<String, CheckpointData>) -> Self {
        Self { entity_store }
    }

    pub fn create(store_provider: &StoreProvider) -> Result<Self> {
        Ok(Self::new(store_provider.entity_store(CHECKPOINTS_PARTITION)?))
    }

    /// Stored record, or one at [`INVALID_OFFSET`] when none exists
    pub fn get_checkpoint_data(&self, endpoint_id: &str) -> Result<CheckpointData> {
        Ok(self
            .entity_store
            .get(&endpoint_id.to_string())?
            .unwrap_or_default())
    }

    pub fn get_all_checkpoint_data(&self) -> Result<HashMap<String, CheckpointData>> {
        let mut all = HashMap::new();
        self.entity_store.for_each(SCAN_PAGE_SIZE, |id, data| {
            all.insert(id, data);
            Ok(())
        })?;
        Ok(all)
    }

    pub fn set_checkpoint_data(&self, endpoint_id: &str, data: &CheckpointData) -> Result<()> {
        self.entity_store.put(&endpoint_id.to_string(), data)?;
        tracing::debug!(endpoint = %endpoint_id, offset = data.offset, "Checkpoint saved");
        Ok(())
    }

    pub fn remove_checkpoint_data(&self, endpoint_id: &str) -> Result<()> {
        self.entity_store.remove(&endpoint_id.to_string())
    }
}

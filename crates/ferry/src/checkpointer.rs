//! Consumer-side progress tracking for one endpoint

use crate::{
    checkpoint::{CheckpointData, CheckpointStore},
    message::StoredMessage,
};
use chrono::{DateTime, Utc};
use ferry_core::{FerryError, Offset, Result, INVALID_OFFSET};
use parking_lot::Mutex;
use std::sync::Arc;

struct CheckpointerState {
    offset: Offset,
    proposed: Offset,
    last_failed_revival_time: Option<DateTime<Utc>>,
    unhealthy_since: Option<DateTime<Utc>>,
    closed: bool,
}

/// Tracks what a consumer has been handed and what it has finished
///
/// The committed offset only moves forward, and only past offsets whose
/// every predecessor has completed.
pub struct Checkpointer {
    id: String,
    store: Arc<CheckpointStore>,
    state: Mutex<CheckpointerState>,
}

impl Checkpointer {
    /// Load the stored progress of `id`
    pub fn create(id: impl Into<String>, store: Arc<CheckpointStore>) -> Result<Self> {
        let id = id.into();
        let data = store.get_checkpoint_data(&id)?;

        tracing::debug!(endpoint = %id, offset = data.offset, "Checkpointer created");

        Ok(Self {
            id,
            store,
            state: Mutex::new(CheckpointerState {
                offset: data.offset,
                proposed: data.offset,
                last_failed_revival_time: data.last_failed_revival_time,
                unhealthy_since: data.unhealthy_since,
                closed: false,
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Last committed offset
    pub fn offset(&self) -> Offset {
        self.state.lock().offset
    }

    /// Highest offset handed out so far
    pub fn proposed(&self) -> Offset {
        self.state.lock().proposed
    }

    pub fn last_failed_revival_time(&self) -> Option<DateTime<Utc>> {
        self.state.lock().last_failed_revival_time
    }

    pub fn unhealthy_since(&self) -> Option<DateTime<Utc>> {
        self.state.lock().unhealthy_since
    }

    /// Whether a message at `offset` still needs processing
    pub fn admit(&self, offset: Offset) -> bool {
        let state = self.state.lock();
        !state.closed && offset > state.offset
    }

    pub fn propose(&self, message: &StoredMessage) {
        let mut state = self.state.lock();
        if message.offset > state.proposed {
            state.proposed = message.offset;
        }
    }

    /// Advance past completed work and record health timestamps.
    ///
    /// The new offset is the highest of `successful` that lies below every
    /// offset in `remaining`. Returns whether anything was persisted.
    pub fn commit(
        &self,
        successful: &[Offset],
        remaining: &[Offset],
        last_failed_revival_time: Option<DateTime<Utc>>,
        unhealthy_since: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(FerryError::InvalidState(format!(
                "checkpointer for {} is closed",
                self.id
            )));
        }

        let min_remaining = remaining.iter().copied().min();
        let candidate = successful
            .iter()
            .copied()
            .filter(|offset| min_remaining.map_or(true, |min| *offset < min))
            .max()
            .unwrap_or(INVALID_OFFSET);
        let new_offset = candidate.max(state.offset);

        let changed = new_offset != state.offset
            || last_failed_revival_time != state.last_failed_revival_time
            || unhealthy_since != state.unhealthy_since;
        if !changed {
            return Ok(false);
        }

        let data = CheckpointData::new(new_offset)
            .with_last_failed_revival_time(last_failed_revival_time)
            .with_unhealthy_since(unhealthy_since);
        self.store.set_checkpoint_data(&self.id, &data)?;

        state.offset = new_offset;
        state.proposed = state.proposed.max(new_offset);
        state.last_failed_revival_time = last_failed_revival_time;
        state.unhealthy_since = unhealthy_since;
        Ok(true)
    }

    pub fn close(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            tracing::debug!(endpoint = %self.id, offset = state.offset, "Checkpointer closed");
        }
    }
}

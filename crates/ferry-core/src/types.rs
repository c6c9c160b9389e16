/// Position of an item in one endpoint's sequential log.
///
/// Real offsets are always `>= 0`.
pub type Offset = i64;

/// Sentinel below every real offset, used for "nothing checkpointed yet".
pub const INVALID_OFFSET: Offset = -1;

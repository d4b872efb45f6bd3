use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// Event fingerprint assigned by the upstream producer.
///
/// Identifies one occurrence across the snapshot and live sources; the
/// subscription engine deduplicates on it across the snapshot/live boundary.
#[derive(
    Copy, Clone, Debug, Default, Display, From, Into, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EventId(u64);

impl EventId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

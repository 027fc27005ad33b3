//! Segment identity and the host-side payloads attached to it.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity and size of a remote log segment, as provided by the host.
///
/// Segments are immutable once uploaded; everything here is fixed for the
/// lifetime of the segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentMetadata {
    pub topic: String,
    pub partition: u32,
    pub base_offset: u64,
    pub segment_id: Uuid,
    /// Plaintext segment size in bytes.
    pub size: u64,
}

/// Index files the host ships alongside a segment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexType {
    Offset,
    Timestamp,
    ProducerSnapshot,
    Transaction,
    LeaderEpoch,
}

/// The raw files handed over by the host on copy-in.
///
/// The transaction index is optional; segments without aborted
/// transactions simply do not have one.
#[derive(Debug, Clone)]
pub struct SegmentData {
    pub log: Bytes,
    pub offset_index: Bytes,
    pub time_index: Bytes,
    pub producer_snapshot: Bytes,
    pub transaction_index: Option<Bytes>,
    pub leader_epoch_index: Bytes,
}

impl SegmentData {
    /// The index files present on this segment, in upload order.
    pub fn indexes(&self) -> Vec<(IndexType, &Bytes)> {
        let mut indexes = vec![
            (IndexType::Offset, &self.offset_index),
            (IndexType::Timestamp, &self.time_index),
            (IndexType::ProducerSnapshot, &self.producer_snapshot),
        ];
        if let Some(transaction_index) = &self.transaction_index {
            indexes.push((IndexType::Transaction, transaction_index));
        }
        indexes.push((IndexType::LeaderEpoch, &self.leader_epoch_index));
        indexes
    }
}

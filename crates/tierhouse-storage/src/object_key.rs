//! Object key layout for everything this plug-in persists.
//!
//! Each segment owns seven objects, one per suffix:
//! `{prefix}/{topic}-{partition}/{base_offset}-{uuid}.{suffix}` with the
//! base offset zero-padded to 20 digits, matching the host's segment
//! file naming.

use tierhouse_core::{IndexType, SegmentMetadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKeySuffix {
    Log,
    OffsetIndex,
    TimeIndex,
    ProducerSnapshot,
    TransactionIndex,
    LeaderEpochCheckpoint,
    Manifest,
}

impl ObjectKeySuffix {
    pub const ALL: [ObjectKeySuffix; 7] = [
        ObjectKeySuffix::Log,
        ObjectKeySuffix::OffsetIndex,
        ObjectKeySuffix::TimeIndex,
        ObjectKeySuffix::ProducerSnapshot,
        ObjectKeySuffix::TransactionIndex,
        ObjectKeySuffix::LeaderEpochCheckpoint,
        ObjectKeySuffix::Manifest,
    ];

    pub fn value(self) -> &'static str {
        match self {
            ObjectKeySuffix::Log => "log",
            ObjectKeySuffix::OffsetIndex => "index",
            ObjectKeySuffix::TimeIndex => "timeindex",
            ObjectKeySuffix::ProducerSnapshot => "snapshot",
            ObjectKeySuffix::TransactionIndex => "txnindex",
            ObjectKeySuffix::LeaderEpochCheckpoint => "leader-epoch-checkpoint",
            ObjectKeySuffix::Manifest => "rsm-manifest",
        }
    }

    pub fn from_index_type(index_type: IndexType) -> Self {
        match index_type {
            IndexType::Offset => ObjectKeySuffix::OffsetIndex,
            IndexType::Timestamp => ObjectKeySuffix::TimeIndex,
            IndexType::ProducerSnapshot => ObjectKeySuffix::ProducerSnapshot,
            IndexType::Transaction => ObjectKeySuffix::TransactionIndex,
            IndexType::LeaderEpoch => ObjectKeySuffix::LeaderEpochCheckpoint,
        }
    }
}

/// Builds object keys under a configured prefix.
#[derive(Debug, Clone)]
pub struct ObjectKeyFactory {
    prefix: String,
}

impl ObjectKeyFactory {
    pub fn new(prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        while prefix.ends_with('/') {
            prefix.pop();
        }
        Self { prefix }
    }

    pub fn key(&self, meta: &SegmentMetadata, suffix: ObjectKeySuffix) -> String {
        let directory = format!("{}-{}", meta.topic, meta.partition);
        let file = format!(
            "{:020}-{}.{}",
            meta.base_offset,
            meta.segment_id,
            suffix.value()
        );
        if self.prefix.is_empty() {
            format!("{directory}/{file}")
        } else {
            format!("{}/{directory}/{file}", self.prefix)
        }
    }
}

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::DEFAULT_SEQUENCE_ID;

// Twincode identity of one side of a conversation (outbound twincode UUID)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TwincodeId(pub Uuid);

impl TwincodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for TwincodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TwincodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

static NEXT_LOCAL_KEY: AtomicU64 = AtomicU64::new(1);

/// Composite key of a descriptor: sender twincode plus per-sender sequence.
///
/// Assigned ids compare by value. An id still carrying
/// [`DEFAULT_SEQUENCE_ID`] has not been acknowledged by the backend yet and
/// compares by identity: each call to [`DescriptorId::pending`] yields an id
/// equal only to its own copies.
///
/// A pending id read from the wire without its local key gets a fresh one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "WireDescriptorId")]
pub struct DescriptorId {
    pub twincode_outbound_id: TwincodeId,
    pub sequence_id: i64,
    local_key: u64,
}

#[derive(Deserialize)]
struct WireDescriptorId {
    twincode_outbound_id: TwincodeId,
    sequence_id: i64,
    #[serde(default)]
    local_key: u64,
}

impl From<WireDescriptorId> for DescriptorId {
    fn from(wire: WireDescriptorId) -> Self {
        if wire.sequence_id != DEFAULT_SEQUENCE_ID {
            return Self::new(wire.twincode_outbound_id, wire.sequence_id);
        }
        match wire.local_key {
            0 => Self::pending(wire.twincode_outbound_id),
            local_key => Self {
                twincode_outbound_id: wire.twincode_outbound_id,
                sequence_id: DEFAULT_SEQUENCE_ID,
                local_key,
            },
        }
    }
}

impl DescriptorId {
    pub fn new(twincode_outbound_id: TwincodeId, sequence_id: i64) -> Self {
        if sequence_id == DEFAULT_SEQUENCE_ID {
            return Self::pending(twincode_outbound_id);
        }
        Self {
            twincode_outbound_id,
            sequence_id,
            local_key: 0,
        }
    }

    /// A locally created id that the backend has not sequenced yet.
    pub fn pending(twincode_outbound_id: TwincodeId) -> Self {
        Self {
            twincode_outbound_id,
            sequence_id: DEFAULT_SEQUENCE_ID,
            local_key: NEXT_LOCAL_KEY.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.sequence_id == DEFAULT_SEQUENCE_ID
    }

    /// Per-sender position used by the timeline order. Pending ids sort after
    /// every sequenced id of the same sender.
    pub fn sequence_rank(&self) -> (i64, u64) {
        if self.is_pending() {
            (i64::MAX, self.local_key)
        } else {
            (self.sequence_id, 0)
        }
    }
}

impl std::fmt::Display for DescriptorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_pending() {
            write!(f, "{}:pending#{}", self.twincode_outbound_id.short(), self.local_key)
        } else {
            write!(f, "{}:{}", self.twincode_outbound_id.short(), self.sequence_id)
        }
    }
}

use serde::{Deserialize, Serialize};

use crate::descriptor::Descriptor;
use crate::types::DescriptorId;

/// What part of a descriptor an update touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// The content body was edited.
    Content,
    /// Read / delete / sent timestamps moved.
    Timestamps,
    /// Reactions or other annotations changed.
    Annotations,
}

/// All events the descriptor source delivers for one conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SourceEvent {
    /// A page of history (initial hydration or backfill)
    Batch {
        descriptors: Vec<Descriptor>,
        #[serde(default)]
        initial: bool,
    },

    /// New item at the tail
    Pushed { descriptor: Descriptor },

    /// Older item fetched during backfill
    Backfilled { descriptor: Descriptor },

    /// An existing descriptor changed
    Updated {
        descriptor: Descriptor,
        change: ChangeKind,
    },

    /// Descriptors deleted from the conversation
    Deleted { ids: Vec<DescriptorId> },

    /// History older than `before` was cleared
    Cleared { before: i64 },
}

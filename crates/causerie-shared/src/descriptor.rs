//! Descriptor model: the immutable conversation events delivered by the
//! messaging backend.
//!
//! Every struct derives `Serialize` and `Deserialize` so descriptors can be
//! replayed from logs and handed across task boundaries unchanged.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::DescriptorId;

// ---------------------------------------------------------------------------
// Content
// ---------------------------------------------------------------------------

/// Direction of a transient typing signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypingAction {
    Start,
    Stop,
}

/// Content type tag of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Message,
    Link,
    Image,
    Video,
    Audio,
    File,
    Call,
    Invitation,
    ClearedHistory,
    /// Transient typing signal. Never becomes a timeline item.
    Typing(TypingAction),
}

impl ContentKind {
    pub fn is_transient(&self) -> bool {
        matches!(self, ContentKind::Typing(_))
    }
}

/// Content of a descriptor.  The body is opaque to the timeline: it is only
/// compared by reference and revision to decide whether an update changed it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    /// Type tag.
    pub kind: ContentKind,
    /// Bumped by the backend every time the body is edited.
    #[serde(default)]
    pub revision: u64,
    /// Backend payload (text, media metadata, call info...).
    #[serde(default)]
    pub body: Arc<serde_json::Value>,
}

impl Content {
    pub fn new(kind: ContentKind) -> Self {
        Self {
            kind,
            revision: 0,
            body: Arc::new(serde_json::Value::Null),
        }
    }

    pub fn with_body(kind: ContentKind, body: serde_json::Value) -> Self {
        Self {
            kind,
            revision: 0,
            body: Arc::new(body),
        }
    }

    /// `true` when `other` carries the very same body object at the same revision.
    pub fn same_object(&self, other: &Content) -> bool {
        self.kind == other.kind
            && self.revision == other.revision
            && Arc::ptr_eq(&self.body, &other.body)
    }
}

// ---------------------------------------------------------------------------
// Deletion
// ---------------------------------------------------------------------------

/// Delete timestamps reported by each side (ms since epoch).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deletion {
    #[serde(default)]
    pub local: Option<i64>,
    #[serde(default)]
    pub peer: Option<i64>,
}

/// Lifecycle state derived from [`Deletion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeleteState {
    Normal,
    DeletedLocal,
    DeletedPeer,
    DeletedBoth,
}

impl Deletion {
    pub fn state(&self) -> DeleteState {
        match (is_valid_timestamp(self.local), is_valid_timestamp(self.peer)) {
            (false, false) => DeleteState::Normal,
            (true, false) => DeleteState::DeletedLocal,
            (false, true) => DeleteState::DeletedPeer,
            (true, true) => DeleteState::DeletedBoth,
        }
    }
}

/// Backend timestamps use `0` or negative values for "unset".
pub fn is_valid_timestamp(ts: Option<i64>) -> bool {
    matches!(ts, Some(t) if t > 0)
}

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// One conversation event as delivered by the messaging backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    pub id: DescriptorId,
    /// Creation time on the sender's side (ms since epoch).
    pub created_at: i64,
    #[serde(default)]
    pub sent_at: Option<i64>,
    /// When the peer read it (own items) or when we read it (peer items).
    #[serde(default)]
    pub read_at: Option<i64>,
    #[serde(default)]
    pub deleted: Deletion,
    pub content: Content,
    #[serde(default)]
    pub reply_to: Option<DescriptorId>,
}

impl Descriptor {
    pub fn new(id: DescriptorId, kind: ContentKind, created_at: i64) -> Self {
        Self {
            id,
            created_at,
            sent_at: None,
            read_at: None,
            deleted: Deletion::default(),
            content: Content::new(kind),
            reply_to: None,
        }
    }

    pub fn with_sent_at(mut self, sent_at: i64) -> Self {
        self.sent_at = Some(sent_at);
        self
    }

    pub fn with_read_at(mut self, read_at: i64) -> Self {
        self.read_at = Some(read_at);
        self
    }

    pub fn with_deleted(mut self, deleted: Deletion) -> Self {
        self.deleted = deleted;
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.content.body = Arc::new(body);
        self
    }
}

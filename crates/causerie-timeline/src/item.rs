//! Render-ready timeline items.
//!
//! A [`TimelineItem`] is built from one descriptor, or synthesized by the
//! store (TIME / NAME separators and the virtual typing item). Its fields are
//! only mutated by the store; the rendering side reads them through accessors.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use causerie_shared::{
    is_valid_timestamp, Content, ContentKind, DeleteState, Deletion, Descriptor, DescriptorId,
    TwincodeId,
};

use crate::grouping::Decoration;
use crate::roster::Sender;

bitflags! {
    /// Bubble rounding and vertical spacing of an item.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Corners: u8 {
        const TOP_LEFT            = 1 << 0;
        const TOP_RIGHT           = 1 << 1;
        const BOTTOM_LEFT         = 1 << 2;
        const BOTTOM_RIGHT        = 1 << 3;
        /// Extra spacing above the bubble ("paragraph break").
        const TOP_LARGE_MARGIN    = 1 << 4;
        /// Extra spacing below the bubble.
        const BOTTOM_LARGE_MARGIN = 1 << 5;
    }
}

/// Kind of a timeline item: the descriptor content tags plus the synthetic ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Message,
    Link,
    Image,
    Video,
    Audio,
    File,
    Call,
    Invitation,
    ClearedHistory,
    /// Date/time separator.
    Time,
    /// Sender-name separator (group conversations).
    Name,
    /// Virtual trailing "someone is typing" item.
    Typing,
}

impl ItemKind {
    /// `None` for transient descriptors that never reach the timeline.
    pub fn from_content(kind: ContentKind) -> Option<Self> {
        let kind = match kind {
            ContentKind::Message => ItemKind::Message,
            ContentKind::Link => ItemKind::Link,
            ContentKind::Image => ItemKind::Image,
            ContentKind::Video => ItemKind::Video,
            ContentKind::Audio => ItemKind::Audio,
            ContentKind::File => ItemKind::File,
            ContentKind::Call => ItemKind::Call,
            ContentKind::Invitation => ItemKind::Invitation,
            ContentKind::ClearedHistory => ItemKind::ClearedHistory,
            ContentKind::Typing(_) => return None,
        };
        Some(kind)
    }

    pub fn is_separator(&self) -> bool {
        matches!(self, ItemKind::Time | ItemKind::Name)
    }
}

/// Position of a real item in the timeline's total order.
///
/// Timestamp first, then sender twincode, then the sender's own sequence
/// (pending ids last).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderKey {
    timestamp: i64,
    twincode: TwincodeId,
    rank: (i64, u64),
}

impl OrderKey {
    pub fn new(timestamp: i64, id: &DescriptorId) -> Self {
        Self {
            timestamp,
            twincode: id.twincode_outbound_id,
            rank: id.sequence_rank(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineItem {
    #[serde(skip)]
    pub(crate) entry: u64,
    pub(crate) kind: ItemKind,
    pub(crate) descriptor_id: Option<DescriptorId>,
    pub(crate) sender: Option<TwincodeId>,
    pub(crate) is_peer_item: bool,
    pub(crate) timestamp: i64,
    pub(crate) corners: Corners,
    pub(crate) avatar_visible: bool,
    pub(crate) selected: bool,
    pub(crate) state: DeleteState,
    pub(crate) deletion: Deletion,
    pub(crate) sent_at: Option<i64>,
    pub(crate) read_at: Option<i64>,
    pub(crate) read_marker: bool,
    pub(crate) display_name: Option<String>,
    pub(crate) typists: Vec<TwincodeId>,
    pub(crate) content: Option<Content>,
    pub(crate) reply_to: Option<DescriptorId>,
}

impl TimelineItem {
    fn blank(entry: u64, kind: ItemKind, timestamp: i64) -> Self {
        Self {
            entry,
            kind,
            descriptor_id: None,
            sender: None,
            is_peer_item: false,
            timestamp,
            corners: Corners::empty(),
            avatar_visible: false,
            selected: false,
            state: DeleteState::Normal,
            deletion: Deletion::default(),
            sent_at: None,
            read_at: None,
            read_marker: false,
            display_name: None,
            typists: Vec::new(),
            content: None,
            reply_to: None,
        }
    }

    /// Project a descriptor into an item. `None` for transient descriptors.
    pub(crate) fn from_descriptor(entry: u64, descriptor: &Descriptor, sender: Sender) -> Option<Self> {
        let kind = ItemKind::from_content(descriptor.content.kind)?;
        let mut item = Self::blank(entry, kind, descriptor.created_at);
        item.descriptor_id = Some(descriptor.id);
        item.sender = Some(sender.twincode());
        item.is_peer_item = sender.is_peer();
        item.content = Some(descriptor.content.clone());
        item.reply_to = descriptor.reply_to;
        item.sent_at = descriptor.sent_at;
        item.read_at = descriptor.read_at;
        item.set_deletion(descriptor.deleted);
        Some(item)
    }

    pub(crate) fn time(entry: u64, timestamp: i64) -> Self {
        Self::blank(entry, ItemKind::Time, timestamp)
    }

    pub(crate) fn name(entry: u64, peer: TwincodeId, display_name: Option<String>, timestamp: i64) -> Self {
        let mut item = Self::blank(entry, ItemKind::Name, timestamp);
        item.sender = Some(peer);
        item.is_peer_item = true;
        item.display_name = display_name;
        item
    }

    pub(crate) fn typing(entry: u64, typists: Vec<TwincodeId>, timestamp: i64) -> Self {
        let mut item = Self::blank(entry, ItemKind::Typing, timestamp);
        item.typists = typists;
        item.is_peer_item = true;
        item
    }

    pub(crate) fn set_deletion(&mut self, deletion: Deletion) {
        self.deletion = deletion;
        self.state = deletion.state();
    }

    pub(crate) fn order_key(&self) -> Option<OrderKey> {
        self.descriptor_id
            .as_ref()
            .map(|id| OrderKey::new(self.timestamp, id))
    }

    /// Whether deletion made the item permanently invisible: deleted by both
    /// sides, an own item deleted locally before it was ever sent, or a peer
    /// item deleted locally.
    pub(crate) fn is_expired(&self) -> bool {
        match self.state {
            DeleteState::DeletedBoth => true,
            DeleteState::DeletedLocal => self.is_peer_item || !is_valid_timestamp(self.sent_at),
            DeleteState::Normal | DeleteState::DeletedPeer => false,
        }
    }

    /// Own item the peer has read.
    pub(crate) fn has_valid_read(&self) -> bool {
        self.is_real() && !self.is_peer_item && is_valid_timestamp(self.read_at)
    }

    pub(crate) fn decoration(&self) -> Decoration {
        Decoration {
            corners: self.corners,
            avatar_visible: self.avatar_visible,
        }
    }

    pub(crate) fn set_decoration(&mut self, decoration: Decoration) {
        self.corners = decoration.corners;
        self.avatar_visible = decoration.avatar_visible;
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn descriptor_id(&self) -> Option<&DescriptorId> {
        self.descriptor_id.as_ref()
    }

    /// Author twincode; for NAME items the peer being named.
    pub fn sender(&self) -> Option<&TwincodeId> {
        self.sender.as_ref()
    }

    pub fn is_real(&self) -> bool {
        self.descriptor_id.is_some()
    }

    pub fn is_separator(&self) -> bool {
        self.kind.is_separator()
    }

    pub fn is_peer_item(&self) -> bool {
        self.is_peer_item
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn corners(&self) -> Corners {
        self.corners
    }

    pub fn avatar_visible(&self) -> bool {
        self.avatar_visible
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn state(&self) -> DeleteState {
        self.state
    }

    pub fn sent_at(&self) -> Option<i64> {
        self.sent_at
    }

    pub fn read_at(&self) -> Option<i64> {
        self.read_at
    }

    /// Whether this item carries the "seen by peer" decoration.
    pub fn is_read_marker(&self) -> bool {
        self.read_marker
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Peers shown by the virtual typing item.
    pub fn typists(&self) -> &[TwincodeId] {
        &self.typists
    }

    pub fn content(&self) -> Option<&Content> {
        self.content.as_ref()
    }

    pub fn reply_to(&self) -> Option<&DescriptorId> {
        self.reply_to.as_ref()
    }
}

//! Read-state tracker.
//!
//! Remembers which own item is the "seen by peer" marker: the most recent
//! own item with a valid read timestamp. Only that item carries the
//! decoration; every older read item is shown as plain sent.

use tracing::debug;

use causerie_shared::DescriptorId;

use crate::item::{OrderKey, TimelineItem};
use crate::store::TimelineStore;

/// Outcome of observing a read timestamp on an own item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadDecision {
    /// The item is the new marker; `previous` lost the decoration.
    Marker { previous: Option<DescriptorId> },
    /// A newer item already holds the marker.
    Superseded,
}

#[derive(Debug, Clone, Default)]
pub struct ReadStateTracker {
    marker: Option<(DescriptorId, OrderKey)>,
}

impl ReadStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn marker(&self) -> Option<&DescriptorId> {
        self.marker.as_ref().map(|(id, _)| id)
    }

    /// An own item at `key` now has a valid read timestamp.
    pub fn observe(&mut self, id: DescriptorId, key: OrderKey) -> ReadDecision {
        match self.marker {
            Some((current, _)) if current == id => ReadDecision::Marker { previous: None },
            Some((_, current_key)) if key < current_key => ReadDecision::Superseded,
            previous => {
                self.marker = Some((id, key));
                ReadDecision::Marker {
                    previous: previous.map(|(prev, _)| prev),
                }
            }
        }
    }

    /// Drop the marker if it is `id`. Returns whether it was.
    pub fn forget(&mut self, id: &DescriptorId) -> bool {
        if self.marker.is_some_and(|(current, _)| current == *id) {
            self.marker = None;
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        self.marker = None;
    }
}

impl TimelineStore {
    /// Apply a valid read timestamp on the own item at `index`.
    pub(crate) fn apply_read(&mut self, index: usize) {
        let Some(key) = self.items[index].order_key() else {
            return;
        };
        let Some(id) = self.items[index].descriptor_id else {
            return;
        };

        match self.read_state.observe(id, key) {
            ReadDecision::Marker { previous } => {
                self.set_read_marker(index, true);
                if let Some(previous) = previous {
                    if let Some(prev_index) = self.position_of(&previous) {
                        self.set_read_marker(prev_index, false);
                    }
                    debug!(marker = %id, previous = %previous, "Read marker moved");
                }
            }
            ReadDecision::Superseded => {
                self.set_read_marker(index, false);
            }
        }
    }

    /// The item at `index` lost its read timestamp or is going away.
    pub(crate) fn revoke_read(&mut self, id: &DescriptorId, index: Option<usize>) {
        if let Some(index) = index {
            self.set_read_marker(index, false);
        }
        if self.read_state.forget(id) {
            self.revalidate_read_marker();
        }
    }

    /// Elect the most recent own read item as the marker.
    pub(crate) fn revalidate_read_marker(&mut self) {
        self.read_state.clear();
        let best = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.has_valid_read())
            .filter_map(|(index, item)| item.order_key().map(|key| (key, index)))
            .max();
        if let Some((_, index)) = best {
            self.apply_read(index);
        }
    }

    fn set_read_marker(&mut self, index: usize, value: bool) {
        if self.items[index].read_marker != value {
            self.items[index].read_marker = value;
            self.mark_changed(index);
        }
    }
}

/// Marker a fresh scan elects for `items`.
pub fn expected_marker(items: &[TimelineItem]) -> Option<DescriptorId> {
    items
        .iter()
        .filter(|item| item.has_valid_read())
        .filter_map(|item| item.order_key().zip(item.descriptor_id))
        .max_by_key(|(key, _)| *key)
        .map(|(_, id)| id)
}

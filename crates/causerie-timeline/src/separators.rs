//! Separator injector: TIME and NAME items.
//!
//! Every real item owns the run of separators immediately in front of it,
//! always laid out as `[TIME] [NAME] item`.
//!
//! * A TIME item precedes the first real item, and any real item whose
//!   timestamp is more than `time_separator_gap_ms` after the nearest
//!   preceding TIME item (the anchor).
//! * In group conversations a NAME item precedes a peer item that starts a
//!   new run: first item, different author than the previous real item, or
//!   the run is cut by a TIME item.
//!
//! After a mutation the store re-derives separators from the mutated item
//! forward until the TIME chain is back in sync, so the layout is always the
//! one a fresh build would produce. A separator never ends the timeline.

use tracing::trace;

use crate::item::{ItemKind, TimelineItem};
use crate::store::TimelineStore;

/// Whether an item at `timestamp` needs a TIME item given the nearest
/// preceding TIME item's timestamp.
pub fn needs_time(anchor: Option<i64>, timestamp: i64, gap_ms: i64) -> bool {
    match anchor {
        None => true,
        Some(anchor) => timestamp - anchor > gap_ms,
    }
}

/// Whether `item` needs a NAME item.
pub fn needs_name(
    is_group: bool,
    prev: Option<&TimelineItem>,
    item: &TimelineItem,
    has_time: bool,
) -> bool {
    if !is_group || !item.is_real() || !item.is_peer_item() {
        return false;
    }
    match prev {
        None => true,
        Some(prev) => has_time || !prev.is_peer_item() || prev.sender() != item.sender(),
    }
}

/// Separator layout a fresh build produces for `items` (real items only are
/// read). Entry `k` describes the separators of the `k`-th real item as
/// `(has_time, has_name)`.
pub fn expected_layout(items: &[TimelineItem], is_group: bool, gap_ms: i64) -> Vec<(bool, bool)> {
    let mut anchor = None;
    let mut prev: Option<&TimelineItem> = None;
    let mut layout = Vec::new();
    for item in items.iter().filter(|i| i.is_real()) {
        let time = needs_time(anchor, item.timestamp(), gap_ms);
        if time {
            anchor = Some(item.timestamp());
        }
        layout.push((time, needs_name(is_group, prev, item, time)));
        prev = Some(item);
    }
    layout
}

impl TimelineStore {
    /// First index of the separator run owned by the real item at `index`.
    pub(crate) fn span_start(&self, index: usize) -> usize {
        let mut start = index;
        while start > 0 && self.items[start - 1].is_separator() {
            start -= 1;
        }
        start
    }

    /// Timestamp of the nearest TIME item before `index`.
    fn time_anchor(&self, index: usize) -> Option<i64> {
        self.items[..index]
            .iter()
            .rev()
            .find(|i| i.kind() == ItemKind::Time)
            .map(|i| i.timestamp())
    }

    /// Bring the separator run of the real item at `*index` in line with the
    /// rules, reusing existing separators where possible. `*index` follows
    /// the item. Returns whether anything changed.
    pub(crate) fn reconcile_span(&mut self, index: &mut usize) -> bool {
        let start = self.span_start(*index);
        let timestamp = self.items[*index].timestamp();
        let sender = self.items[*index].sender;
        let anchor = self.time_anchor(start);
        let wants_time = needs_time(anchor, timestamp, self.config.time_separator_gap_ms);
        let prev = self.prev_real(start);
        let wants_name = needs_name(
            self.roster.is_group(),
            prev.map(|p| &self.items[p]),
            &self.items[*index],
            wants_time,
        );

        let mut changed = false;
        let mut has_time = false;
        let mut has_name = false;
        let mut cursor = start;
        while cursor < *index {
            let keep = match self.items[cursor].kind() {
                ItemKind::Time if wants_time && !has_time => {
                    has_time = true;
                    if self.items[cursor].timestamp != timestamp {
                        self.items[cursor].timestamp = timestamp;
                        self.mark_changed(cursor);
                        changed = true;
                    }
                    true
                }
                ItemKind::Name if wants_name && !has_name && has_time == wants_time => {
                    has_name = true;
                    let display_name = sender
                        .as_ref()
                        .and_then(|s| self.roster.display_name(s))
                        .map(str::to_string);
                    let separator = &mut self.items[cursor];
                    separator.timestamp = timestamp;
                    if separator.sender != sender || separator.display_name != display_name {
                        separator.sender = sender;
                        separator.display_name = display_name;
                        self.mark_changed(cursor);
                        changed = true;
                    }
                    true
                }
                _ => false,
            };
            if keep {
                cursor += 1;
            } else {
                self.remove_entry(cursor);
                *index -= 1;
                changed = true;
            }
        }

        if wants_time && !has_time {
            let entry = self.next_entry();
            self.insert_entry(start, TimelineItem::time(entry, timestamp));
            *index += 1;
            changed = true;
        }

        if wants_name && !has_name {
            if let Some(peer) = sender {
                let entry = self.next_entry();
                let display_name = self.roster.display_name(&peer).map(str::to_string);
                self.insert_entry(*index, TimelineItem::name(entry, peer, display_name, timestamp));
                *index += 1;
                changed = true;
            }
        }

        changed
    }

    /// Re-derive separators starting at the real item at `index` and moving
    /// forward until the TIME chain resynchronises. Returns the item's
    /// position afterwards.
    pub(crate) fn reflow_separators(&mut self, index: usize) -> usize {
        let mut current = index;
        self.reconcile_span(&mut current);
        let position = current;

        let mut visited = 1usize;
        while let Some(mut next) = self.next_real(current + 1) {
            let changed = self.reconcile_span(&mut next);
            visited += 1;
            current = next;
            if !changed && self.has_time_before(current) {
                break;
            }
        }

        trace!(start = position, visited, "Separators reflowed");
        position
    }

    fn has_time_before(&self, index: usize) -> bool {
        let start = self.span_start(index);
        self.items[start..index]
            .iter()
            .any(|i| i.kind() == ItemKind::Time)
    }

    /// Drop separators left at the end of the timeline.
    pub(crate) fn prune_trailing_separators(&mut self) {
        while self.items.last().is_some_and(|i| i.is_separator()) {
            let last = self.items.len() - 1;
            self.remove_entry(last);
        }
    }
}

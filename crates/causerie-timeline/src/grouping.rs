//! Grouping engine: bubble corners and avatar visibility.
//!
//! Decoration is a pure function of an item and its nearest real neighbours;
//! separators are looked through and never decorated. Consecutive items of
//! one sender inside the grouping window merge: own items on their right
//! side, peer items on their left side, and only the last item of a peer run
//! shows the avatar.

use crate::item::{Corners, TimelineItem};
use crate::store::TimelineStore;

/// Layout decoration derived from an item's neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoration {
    pub corners: Corners,
    pub avatar_visible: bool,
}

impl Decoration {
    pub const NONE: Decoration = Decoration {
        corners: Corners::empty(),
        avatar_visible: false,
    };
}

/// Whether `later` continues the bubble group of `earlier`.
pub fn merges(earlier: &TimelineItem, later: &TimelineItem, window_ms: i64) -> bool {
    if !earlier.is_real() || !later.is_real() {
        return false;
    }
    if earlier.is_peer_item() != later.is_peer_item() || earlier.sender() != later.sender() {
        return false;
    }
    let gap = later.timestamp() - earlier.timestamp();
    (0..=window_ms).contains(&gap)
}

/// Decoration of `item` given its previous and next real neighbours.
pub fn decorate(
    prev: Option<&TimelineItem>,
    item: &TimelineItem,
    next: Option<&TimelineItem>,
    window_ms: i64,
) -> Decoration {
    if !item.is_real() {
        return Decoration::NONE;
    }

    let joined_above = prev.is_some_and(|p| merges(p, item, window_ms));
    let joined_below = next.is_some_and(|n| merges(item, n, window_ms));

    let (outer, top, bottom) = if item.is_peer_item() {
        (
            Corners::TOP_RIGHT | Corners::BOTTOM_RIGHT,
            Corners::TOP_LEFT | Corners::TOP_LARGE_MARGIN,
            Corners::BOTTOM_LEFT | Corners::BOTTOM_LARGE_MARGIN,
        )
    } else {
        (
            Corners::TOP_LEFT | Corners::BOTTOM_LEFT,
            Corners::TOP_RIGHT | Corners::TOP_LARGE_MARGIN,
            Corners::BOTTOM_RIGHT | Corners::BOTTOM_LARGE_MARGIN,
        )
    };

    let mut corners = outer;
    if !joined_above {
        corners |= top;
    }
    if !joined_below {
        corners |= bottom;
    }

    Decoration {
        corners,
        avatar_visible: item.is_peer_item() && !joined_below,
    }
}

/// Decorate a whole sequence from scratch.
pub fn decorate_all(items: &[TimelineItem], window_ms: i64) -> Vec<Decoration> {
    let real: Vec<usize> = (0..items.len()).filter(|&i| items[i].is_real()).collect();
    let mut decorations = vec![Decoration::NONE; items.len()];
    for (k, &index) in real.iter().enumerate() {
        let prev = k.checked_sub(1).map(|p| &items[real[p]]);
        let next = real.get(k + 1).map(|&n| &items[n]);
        decorations[index] = decorate(prev, &items[index], next, window_ms);
    }
    decorations
}

impl TimelineStore {
    /// Recompute the decoration of the item at `index`; marks it changed when
    /// the result differs.
    pub(crate) fn regroup(&mut self, index: usize) {
        let prev = self.prev_real(index);
        let next = self.next_real(index + 1);
        let decoration = decorate(
            prev.map(|p| &self.items[p]),
            &self.items[index],
            next.map(|n| &self.items[n]),
            self.config.grouping_window_ms,
        );
        if self.items[index].decoration() != decoration {
            self.items[index].set_decoration(decoration);
            self.mark_changed(index);
        }
    }

    /// Regroup a real item and both of its real neighbours.
    pub(crate) fn regroup_around(&mut self, index: usize) {
        if let Some(prev) = self.prev_real(index) {
            self.regroup(prev);
        }
        self.regroup(index);
        if let Some(next) = self.next_real(index + 1) {
            self.regroup(next);
        }
    }
}

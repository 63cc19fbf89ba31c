//! The timeline store.
//!
//! Holds the ordered sequence of timeline items for one conversation. Real
//! items stay sorted by [`OrderKey`]; TIME / NAME separators sit right in
//! front of the item they annotate and the virtual typing item, when present,
//! trails everything.
//!
//! Every public mutation runs inside a transaction. Neighbour fix-up touches
//! only the mutated item, its real neighbours and the separators the TIME
//! chain forces to move; the resulting [`Change`] list is derived by diffing
//! the entry sequence when the transaction commits.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use causerie_shared::{ChangeKind, Deletion, Descriptor, DescriptorId, TwincodeId};

use crate::change::{Change, ChangeNotifier, Transaction};
use crate::config::TimelineConfig;
use crate::diagnostics::{Diagnostics, Fault, TracingDiagnostics};
use crate::item::{ItemKind, OrderKey, TimelineItem};
use crate::read_state::ReadStateTracker;
use crate::roster::{Roster, Sender};

/// Result of inserting one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The item now sits at `position`.
    Inserted { position: usize },
    /// A real item with the same id already exists; nothing changed.
    Duplicate,
    /// The sender is not part of the conversation; reported and dropped.
    Rejected,
    /// Deletion already made the descriptor invisible.
    Expired,
    /// Transient signal (typing); never a timeline item.
    Transient,
}

/// Result of an update or timestamp change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Content replaced; the item was rebuilt at `position`.
    Rebuilt { position: usize },
    /// Same content; timestamps and flags refreshed at `position`.
    Refreshed { position: usize },
    /// Deletion made the item invisible; it was removed from `position`.
    Removed { position: usize },
    /// No item with that id.
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub inserted: usize,
    pub skipped: usize,
}

pub struct TimelineStore {
    pub(crate) config: TimelineConfig,
    pub(crate) roster: Roster,
    pub(crate) items: Vec<TimelineItem>,
    pub(crate) read_state: ReadStateTracker,
    ids: HashSet<DescriptorId>,
    typing: Option<TimelineItem>,
    next_entry: u64,
    hydrated: bool,
    txn: Option<Transaction>,
    notifier: Box<dyn ChangeNotifier>,
    diagnostics: Arc<dyn Diagnostics>,
}

impl TimelineStore {
    pub fn new(config: TimelineConfig, roster: Roster, notifier: impl ChangeNotifier + 'static) -> Self {
        Self {
            config,
            roster,
            items: Vec::new(),
            read_state: ReadStateTracker::new(),
            ids: HashSet::new(),
            typing: None,
            next_entry: 1,
            hydrated: false,
            txn: None,
            notifier: Box::new(notifier),
            diagnostics: Arc::new(TracingDiagnostics),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Number of items, including separators and the virtual typing item.
    pub fn item_count(&self) -> usize {
        self.items.len() + usize::from(self.typing.is_some())
    }

    pub fn item_at(&self, position: usize) -> Option<&TimelineItem> {
        match self.items.get(position) {
            Some(item) => Some(item),
            None if position == self.items.len() => self.typing.as_ref(),
            None => None,
        }
    }

    pub fn position_of(&self, id: &DescriptorId) -> Option<usize> {
        if !self.ids.contains(id) {
            return None;
        }
        self.items
            .iter()
            .rposition(|item| item.descriptor_id.as_ref() == Some(id))
    }

    pub fn items(&self) -> impl Iterator<Item = &TimelineItem> {
        self.items.iter().chain(self.typing.iter())
    }

    /// Number of real (descriptor-backed) items.
    pub fn real_count(&self) -> usize {
        self.ids.len()
    }

    /// The own item currently shown as "seen by peer".
    pub fn read_marker(&self) -> Option<&DescriptorId> {
        self.read_state.marker()
    }

    /// Peers shown by the virtual typing item.
    pub fn typists(&self) -> &[TwincodeId] {
        self.typing.as_ref().map(|t| t.typists()).unwrap_or(&[])
    }

    /// Oldest loaded real item, used as the backfill cursor.
    pub fn oldest(&self) -> Option<&TimelineItem> {
        self.items.iter().find(|item| item.is_real())
    }

    pub fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    pub fn insert(&mut self, descriptor: &Descriptor) -> InsertOutcome {
        let owned = self.begin(false);
        let outcome = self.insert_descriptor(descriptor);
        self.commit(owned);
        outcome
    }

    /// Insert a page of descriptors with a single coalesced notification.
    pub fn batch_load(&mut self, descriptors: &[Descriptor], is_initial: bool) -> BatchOutcome {
        let owned = self.begin(true);
        let mut outcome = BatchOutcome::default();
        for descriptor in descriptors {
            match self.insert_descriptor(descriptor) {
                InsertOutcome::Inserted { .. } => outcome.inserted += 1,
                _ => outcome.skipped += 1,
            }
        }
        if is_initial {
            self.hydrated = true;
        }
        self.commit(owned);

        info!(
            inserted = outcome.inserted,
            skipped = outcome.skipped,
            initial = is_initial,
            items = self.items.len(),
            "Batch loaded"
        );
        outcome
    }

    /// Dispatch a source-side update.
    pub fn update(&mut self, descriptor: &Descriptor, change: ChangeKind) -> UpdateOutcome {
        match change {
            ChangeKind::Content => self.update_in_place(descriptor),
            ChangeKind::Timestamps => self.refresh_timestamps(
                &descriptor.id,
                descriptor.sent_at,
                descriptor.read_at,
                descriptor.deleted,
            ),
            ChangeKind::Annotations => self.refresh_annotations(descriptor),
        }
    }

    /// Replace an item's content, keeping its position. When the content
    /// object is unchanged only the timestamps are refreshed.
    pub fn update_in_place(&mut self, descriptor: &Descriptor) -> UpdateOutcome {
        let Some(index) = self.position_of(&descriptor.id) else {
            debug!(descriptor = %descriptor.id, "Update for unknown descriptor ignored");
            return UpdateOutcome::Unknown;
        };

        let owned = self.begin(false);
        let unchanged = self.items[index]
            .content
            .as_ref()
            .is_some_and(|c| c.same_object(&descriptor.content));
        let outcome = if unchanged {
            self.items[index].sent_at = descriptor.sent_at;
            self.apply_timestamps(index, descriptor.read_at, descriptor.deleted)
        } else {
            self.rebuild(index, descriptor)
        };
        self.commit(owned);
        outcome
    }

    /// Update read / delete timestamps of an item.
    pub fn update_timestamps(
        &mut self,
        id: &DescriptorId,
        read_at: Option<i64>,
        deleted: Deletion,
    ) -> UpdateOutcome {
        self.refresh_timestamps(id, None, read_at, deleted)
    }

    /// A known sent timestamp is never cleared, only replaced.
    fn refresh_timestamps(
        &mut self,
        id: &DescriptorId,
        sent_at: Option<i64>,
        read_at: Option<i64>,
        deleted: Deletion,
    ) -> UpdateOutcome {
        let Some(index) = self.position_of(id) else {
            debug!(descriptor = %id, "Timestamp update for unknown descriptor ignored");
            return UpdateOutcome::Unknown;
        };
        let owned = self.begin(false);
        if sent_at.is_some() {
            self.items[index].sent_at = sent_at;
        }
        let outcome = self.apply_timestamps(index, read_at, deleted);
        self.commit(owned);
        outcome
    }

    /// Remove an item. Returns the position it had.
    pub fn remove(&mut self, id: &DescriptorId) -> Option<usize> {
        let index = self.position_of(id)?;
        let owned = self.begin(false);
        self.remove_at(index);
        self.commit(owned);
        debug!(descriptor = %id, position = index, "Removed timeline item");
        Some(index)
    }

    /// Remove every real item older than `before`. Returns how many went.
    pub fn clear_before(&mut self, before: i64) -> usize {
        let cut = self
            .items
            .iter()
            .position(|item| item.is_real() && item.timestamp >= before)
            .unwrap_or(self.items.len());
        let keep_from = if cut < self.items.len() {
            self.span_start(cut)
        } else {
            self.items.len()
        };
        if keep_from == 0 {
            return 0;
        }

        let owned = self.begin(false);
        let dropped: Vec<TimelineItem> = self.items.drain(..keep_from).collect();
        let mut removed = 0;
        let mut lost_marker = false;
        for id in dropped.iter().filter_map(|item| item.descriptor_id) {
            self.ids.remove(&id);
            lost_marker |= self.read_state.marker() == Some(&id);
            removed += 1;
        }

        match self.next_real(0) {
            Some(first) => {
                let first = self.reflow_separators(first);
                self.regroup(first);
            }
            None => self.prune_trailing_separators(),
        }
        if lost_marker {
            self.revalidate_read_marker();
        }
        self.commit(owned);

        info!(before, removed, "Cleared timeline history");
        removed
    }

    pub fn set_selected(&mut self, id: &DescriptorId, selected: bool) -> bool {
        let Some(index) = self.position_of(id) else {
            return false;
        };
        if self.items[index].selected == selected {
            return true;
        }
        let owned = self.begin(false);
        self.items[index].selected = selected;
        self.mark_changed(index);
        self.commit(owned);
        true
    }

    pub fn clear_selection(&mut self) {
        let owned = self.begin(false);
        for index in 0..self.items.len() {
            if self.items[index].selected {
                self.items[index].selected = false;
                self.mark_changed(index);
            }
        }
        self.commit(owned);
    }

    /// Admit a new participant (group conversations).
    pub fn add_peer(&mut self, peer: TwincodeId, display_name: impl Into<String>) {
        self.roster.add_peer(peer, display_name);
    }

    /// Rename a peer and refresh its NAME items.
    pub fn rename_peer(&mut self, peer: &TwincodeId, display_name: &str) -> bool {
        if !self.roster.rename_peer(peer, display_name) {
            return false;
        }
        let owned = self.begin(false);
        for index in 0..self.items.len() {
            let item = &mut self.items[index];
            if item.kind == ItemKind::Name
                && item.sender.as_ref() == Some(peer)
                && item.display_name.as_deref() != Some(display_name)
            {
                item.display_name = Some(display_name.to_string());
                self.mark_changed(index);
            }
        }
        self.commit(owned);
        true
    }

    /// Show, update or hide the virtual typing item.
    pub fn set_typists(&mut self, typists: Vec<TwincodeId>) {
        let position = self.items.len();
        if typists.is_empty() {
            if self.typing.take().is_some() {
                self.notifier.notify(Change::Removed { position });
            }
            return;
        }

        match self.typing.as_mut() {
            Some(item) if item.typists == typists => {}
            Some(item) => {
                item.typists = typists;
                self.notifier.notify(Change::Changed { position });
            }
            None => {
                let entry = self.next_entry();
                let timestamp = self.items.last().map(|i| i.timestamp).unwrap_or_default();
                self.typing = Some(TimelineItem::typing(entry, typists, timestamp));
                self.notifier.notify(Change::Inserted { position });
            }
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn insert_descriptor(&mut self, descriptor: &Descriptor) -> InsertOutcome {
        if descriptor.content.kind.is_transient() {
            return InsertOutcome::Transient;
        }

        let twincode = descriptor.id.twincode_outbound_id;
        let Some(sender) = self.roster.classify(&twincode) else {
            warn!(descriptor = %descriptor.id, sender = %twincode, "Dropping descriptor from unknown sender");
            self.diagnostics.report(&Fault::UnknownSender {
                descriptor: descriptor.id,
                sender: twincode,
            });
            return InsertOutcome::Rejected;
        };

        if self.ids.contains(&descriptor.id) {
            debug!(descriptor = %descriptor.id, "Duplicate descriptor ignored");
            return InsertOutcome::Duplicate;
        }

        let entry = self.next_entry();
        let Some(item) = TimelineItem::from_descriptor(entry, descriptor, sender) else {
            return InsertOutcome::Transient;
        };
        if item.is_expired() {
            debug!(descriptor = %descriptor.id, state = ?item.state, "Deleted descriptor not inserted");
            return InsertOutcome::Expired;
        }

        let key = OrderKey::new(item.timestamp, &descriptor.id);
        let index = self.insertion_index(&key);
        self.insert_entry(index, item);
        self.ids.insert(descriptor.id);

        let position = self.reflow_separators(index);
        self.regroup_around(position);
        if self.items[position].has_valid_read() {
            self.apply_read(position);
        }

        debug!(descriptor = %descriptor.id, position, "Inserted timeline item");
        InsertOutcome::Inserted { position }
    }

    /// Slot right after the last real item that sorts before `key`.
    fn insertion_index(&self, key: &OrderKey) -> usize {
        for index in (0..self.items.len()).rev() {
            if let Some(existing) = self.items[index].order_key() {
                if existing < *key {
                    return index + 1;
                }
            }
        }
        0
    }

    fn rebuild(&mut self, index: usize, descriptor: &Descriptor) -> UpdateOutcome {
        let old = &self.items[index];
        let sender = match old.sender {
            Some(id) if old.is_peer_item => Sender::Peer(id),
            Some(id) => Sender::Local(id),
            None => return UpdateOutcome::Unknown,
        };
        let Some(mut item) = TimelineItem::from_descriptor(old.entry, descriptor, sender) else {
            return UpdateOutcome::Unknown;
        };
        if item.timestamp != old.timestamp {
            debug!(
                descriptor = %descriptor.id,
                old = old.timestamp,
                new = item.timestamp,
                "Keeping original timestamp of rebuilt item"
            );
            item.timestamp = old.timestamp;
        }
        item.selected = old.selected;
        item.read_marker = old.read_marker;
        item.set_decoration(old.decoration());

        let read_at = item.read_at;
        let deleted = item.deletion;
        // Timestamps are re-applied below so read / expiry rules see the change.
        item.read_at = old.read_at;
        item.set_deletion(old.deletion);
        self.items[index] = item;
        self.mark_changed(index);

        match self.apply_timestamps(index, read_at, deleted) {
            UpdateOutcome::Refreshed { position } => UpdateOutcome::Rebuilt { position },
            other => other,
        }
    }

    fn refresh_annotations(&mut self, descriptor: &Descriptor) -> UpdateOutcome {
        let Some(index) = self.position_of(&descriptor.id) else {
            return UpdateOutcome::Unknown;
        };
        let owned = self.begin(false);
        self.items[index].content = Some(descriptor.content.clone());
        self.mark_changed(index);
        self.commit(owned);
        UpdateOutcome::Refreshed { position: index }
    }

    fn apply_timestamps(&mut self, index: usize, read_at: Option<i64>, deleted: Deletion) -> UpdateOutcome {
        let item = &mut self.items[index];
        let was_read = item.has_valid_read();
        let old_read_at = item.read_at;
        let old_state = item.state;
        item.read_at = read_at;
        item.set_deletion(deleted);

        if item.is_expired() {
            self.remove_at(index);
            return UpdateOutcome::Removed { position: index };
        }

        if item.state != old_state || (item.read_marker && old_read_at != read_at) {
            self.mark_changed(index);
        }

        let Some(id) = self.items[index].descriptor_id else {
            return UpdateOutcome::Unknown;
        };
        if self.items[index].has_valid_read() {
            self.apply_read(index);
        } else if was_read {
            self.revoke_read(&id, Some(index));
        }
        UpdateOutcome::Refreshed { position: index }
    }

    fn remove_at(&mut self, index: usize) {
        let item = self.remove_entry(index);
        let Some(id) = item.descriptor_id else {
            return;
        };
        self.ids.remove(&id);

        // The successor adopts the separators the removed item leaves behind.
        let next = self.next_real(index).map(|next| self.reflow_separators(next));
        if next.is_none() {
            self.prune_trailing_separators();
        }
        if let Some(prev) = self.prev_real(next.unwrap_or(self.items.len())) {
            self.regroup(prev);
        }
        if let Some(next) = next {
            self.regroup(next);
        }

        if self.read_state.marker() == Some(&id) {
            self.revoke_read(&id, None);
        }
    }

    pub(crate) fn prev_real(&self, before: usize) -> Option<usize> {
        (0..before.min(self.items.len()))
            .rev()
            .find(|&i| self.items[i].is_real())
    }

    pub(crate) fn next_real(&self, from: usize) -> Option<usize> {
        (from..self.items.len()).find(|&i| self.items[i].is_real())
    }

    pub(crate) fn next_entry(&mut self) -> u64 {
        let entry = self.next_entry;
        self.next_entry += 1;
        entry
    }

    pub(crate) fn insert_entry(&mut self, index: usize, item: TimelineItem) {
        self.items.insert(index, item);
    }

    pub(crate) fn remove_entry(&mut self, index: usize) -> TimelineItem {
        self.items.remove(index)
    }

    pub(crate) fn mark_changed(&mut self, index: usize) {
        if let Some(txn) = self.txn.as_mut() {
            txn.touch(self.items[index].entry);
        }
    }

    fn begin(&mut self, coalesce: bool) -> bool {
        if self.txn.is_some() {
            return false;
        }
        self.txn = Some(Transaction::begin(&self.items, self.next_entry, coalesce));
        true
    }

    fn commit(&mut self, owned: bool) {
        if !owned {
            return;
        }
        if let Some(txn) = self.txn.take() {
            for change in txn.finish(&self.items) {
                self.notifier.notify(change);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::tests::ListModel;
    use crate::grouping::decorate_all;
    use crate::item::Corners;
    use crate::read_state::expected_marker;
    use crate::separators::expected_layout;
    use crate::diagnostics::CollectingDiagnostics;
    use causerie_shared::{ContentKind, DeleteState};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use tokio::sync::mpsc;

    const GAP: i64 = 3_600_000;

    struct Fixture {
        store: TimelineStore,
        rx: mpsc::UnboundedReceiver<Change>,
        me: TwincodeId,
        peers: Vec<TwincodeId>,
    }

    impl Fixture {
        fn direct() -> Self {
            let me = TwincodeId::new();
            let peer = TwincodeId::new();
            Self::with_roster(Roster::direct(me, peer, "Alice"), me, vec![peer])
        }

        fn group(peer_count: usize) -> Self {
            let me = TwincodeId::new();
            let mut roster = Roster::group(me);
            let peers: Vec<TwincodeId> = (0..peer_count).map(|_| TwincodeId::new()).collect();
            for (k, peer) in peers.iter().enumerate() {
                roster.add_peer(*peer, format!("Peer {k}"));
            }
            Self::with_roster(roster, me, peers)
        }

        fn with_roster(roster: Roster, me: TwincodeId, peers: Vec<TwincodeId>) -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            let store = TimelineStore::new(TimelineConfig::default(), roster, tx);
            Self { store, rx, me, peers }
        }

        fn drain(&mut self) -> Vec<Change> {
            let mut changes = Vec::new();
            while let Ok(change) = self.rx.try_recv() {
                changes.push(change);
            }
            changes
        }

        fn kinds(&self) -> Vec<ItemKind> {
            self.store.items().map(|i| i.kind()).collect()
        }

        fn item(&self, id: &DescriptorId) -> &TimelineItem {
            let position = self.store.position_of(id).expect("item present");
            self.store.item_at(position).unwrap()
        }
    }

    fn message(sender: TwincodeId, seq: i64, ts: i64) -> Descriptor {
        Descriptor::new(DescriptorId::new(sender, seq), ContentKind::Message, ts)
    }

    fn assert_invariants(store: &TimelineStore) {
        let items = &store.items;

        let keys: Vec<OrderKey> = items.iter().filter_map(|i| i.order_key()).collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]), "real items out of order");

        let ids: HashSet<DescriptorId> = items.iter().filter_map(|i| i.descriptor_id).collect();
        assert_eq!(ids.len(), keys.len(), "duplicate ids");
        assert_eq!(ids, store.ids);

        assert!(
            items.last().map_or(true, |i| !i.is_separator()),
            "timeline ends in a separator"
        );

        let mut actual = Vec::new();
        let mut pending: Vec<&TimelineItem> = Vec::new();
        for item in items {
            if item.is_separator() {
                pending.push(item);
                continue;
            }
            let kinds: Vec<ItemKind> = pending.iter().map(|s| s.kind()).collect();
            let has_time = kinds.first() == Some(&ItemKind::Time);
            let has_name = kinds.last() == Some(&ItemKind::Name);
            assert_eq!(kinds.len(), usize::from(has_time) + usize::from(has_name), "bad span {kinds:?}");
            for separator in &pending {
                assert_eq!(separator.timestamp(), item.timestamp());
                if separator.kind() == ItemKind::Name {
                    assert_eq!(separator.sender(), item.sender());
                }
            }
            actual.push((has_time, has_name));
            pending.clear();
        }
        assert_eq!(
            actual,
            expected_layout(items, store.roster.is_group(), store.config.time_separator_gap_ms)
        );

        let decorations = decorate_all(items, store.config.grouping_window_ms);
        for (item, decoration) in items.iter().zip(decorations) {
            assert_eq!(item.decoration(), decoration, "stale decoration on {:?}", item.descriptor_id);
        }

        let marker = expected_marker(items);
        assert_eq!(store.read_marker().copied(), marker);
        let flagged: Vec<DescriptorId> = items
            .iter()
            .filter(|i| i.is_read_marker())
            .filter_map(|i| i.descriptor_id)
            .collect();
        assert_eq!(flagged, marker.into_iter().collect::<Vec<_>>());
    }

    #[test]
    fn test_two_local_items_merge() {
        let mut fx = Fixture::direct();
        let a = message(fx.me, 1, 0);
        let b = message(fx.me, 2, 1_000);

        assert_eq!(fx.store.insert(&a), InsertOutcome::Inserted { position: 1 });
        assert_eq!(
            fx.drain(),
            vec![Change::Inserted { position: 0 }, Change::Inserted { position: 1 }]
        );
        assert_eq!(fx.store.insert(&b), InsertOutcome::Inserted { position: 2 });
        assert_eq!(
            fx.drain(),
            vec![Change::Inserted { position: 2 }, Change::Changed { position: 1 }]
        );

        assert_eq!(fx.store.item_count(), 3);
        assert_eq!(fx.kinds(), vec![ItemKind::Time, ItemKind::Message, ItemKind::Message]);
        assert!(!fx.item(&a.id).corners().contains(Corners::BOTTOM_RIGHT));
        assert!(!fx.item(&b.id).corners().contains(Corners::TOP_RIGHT));
        assert_invariants(&fx.store);
    }

    #[test]
    fn test_removing_later_item_restores_rounding() {
        let mut fx = Fixture::direct();
        let a = message(fx.me, 1, 0);
        let b = message(fx.me, 2, 1_000);
        fx.store.insert(&a);
        fx.store.insert(&b);
        fx.drain();

        assert_eq!(fx.store.remove(&b.id), Some(2));
        assert_eq!(
            fx.drain(),
            vec![Change::Removed { position: 2 }, Change::Changed { position: 1 }]
        );
        let corners = fx.item(&a.id).corners();
        assert!(corners.contains(Corners::BOTTOM_RIGHT | Corners::BOTTOM_LARGE_MARGIN));
        assert_eq!(corners, Corners::all());
        assert_eq!(fx.store.item_count(), 2);
        assert_invariants(&fx.store);
    }

    #[test]
    fn test_peer_then_local_direct() {
        let mut fx = Fixture::direct();
        let peer = fx.peers[0];
        let p1 = message(peer, 1, 0);
        let l = message(fx.me, 1, 1_000);
        fx.store.insert(&p1);
        fx.store.insert(&l);

        assert_eq!(fx.store.item_count(), 3);
        let p1_item = fx.item(&p1.id);
        assert!(p1_item.avatar_visible());
        assert!(p1_item.corners().contains(Corners::TOP_LEFT | Corners::BOTTOM_LEFT));
        let l_item = fx.item(&l.id);
        assert!(l_item.corners().contains(Corners::TOP_RIGHT | Corners::BOTTOM_RIGHT));
        assert_invariants(&fx.store);
    }

    #[test]
    fn test_peer_then_local_group_adds_name() {
        let mut fx = Fixture::group(2);
        let peer = fx.peers[0];
        fx.store.insert(&message(peer, 1, 0));
        fx.store.insert(&message(fx.me, 1, 1_000));

        assert_eq!(fx.store.item_count(), 4);
        assert_eq!(
            fx.kinds(),
            vec![ItemKind::Time, ItemKind::Name, ItemKind::Message, ItemKind::Message]
        );
        assert_eq!(fx.store.item_at(1).unwrap().display_name(), Some("Peer 0"));
        assert_invariants(&fx.store);
    }

    #[test]
    fn test_time_separator_threshold() {
        let mut fx = Fixture::direct();
        fx.store.insert(&message(fx.me, 1, 0));
        fx.store.insert(&message(fx.me, 2, GAP));
        assert_eq!(fx.store.item_count(), 3);

        let mut fx = Fixture::direct();
        fx.store.insert(&message(fx.me, 1, 0));
        fx.store.insert(&message(fx.me, 2, GAP + 1));
        assert_eq!(fx.store.item_count(), 4);
        assert_eq!(
            fx.kinds(),
            vec![ItemKind::Time, ItemKind::Message, ItemKind::Time, ItemKind::Message]
        );
        assert_invariants(&fx.store);
    }

    #[test]
    fn test_duplicate_insert_is_noop() {
        let mut fx = Fixture::direct();
        let a = message(fx.me, 1, 0);
        fx.store.insert(&a);
        fx.drain();

        let again = message(fx.me, 1, 50_000);
        assert_eq!(fx.store.insert(&again), InsertOutcome::Duplicate);
        assert_eq!(fx.store.item_count(), 2);
        assert_eq!(fx.store.position_of(&a.id), Some(1));
        assert!(fx.drain().is_empty());
    }

    #[test]
    fn test_pending_ids_are_distinct_items() {
        let mut fx = Fixture::direct();
        let first = Descriptor::new(DescriptorId::pending(fx.me), ContentKind::Message, 10);
        let second = Descriptor::new(DescriptorId::pending(fx.me), ContentKind::Message, 10);
        fx.store.insert(&first);
        assert!(matches!(fx.store.insert(&second), InsertOutcome::Inserted { .. }));
        assert_eq!(fx.store.insert(&first), InsertOutcome::Duplicate);
        assert_eq!(fx.store.real_count(), 2);
        assert_invariants(&fx.store);
    }

    #[test]
    fn test_unknown_sender_is_reported_and_dropped() {
        let me = TwincodeId::new();
        let diagnostics = CollectingDiagnostics::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut store = TimelineStore::new(
            TimelineConfig::default(),
            Roster::direct(me, TwincodeId::new(), "Alice"),
            tx,
        )
        .with_diagnostics(Arc::new(diagnostics.clone()));

        let stranger = TwincodeId::new();
        let descriptor = message(stranger, 1, 0);
        assert_eq!(store.insert(&descriptor), InsertOutcome::Rejected);
        assert_eq!(store.item_count(), 0);
        assert!(rx.try_recv().is_err());
        assert_eq!(
            diagnostics.faults(),
            vec![Fault::UnknownSender {
                descriptor: descriptor.id,
                sender: stranger
            }]
        );
    }

    #[test]
    fn test_unknown_ids_are_noops() {
        let mut fx = Fixture::direct();
        fx.store.insert(&message(fx.me, 1, 0));
        fx.drain();

        let ghost = message(fx.me, 99, 5);
        assert_eq!(fx.store.remove(&ghost.id), None);
        assert_eq!(fx.store.update_in_place(&ghost), UpdateOutcome::Unknown);
        assert_eq!(
            fx.store.update_timestamps(&ghost.id, Some(10), Deletion::default()),
            UpdateOutcome::Unknown
        );
        assert!(fx.drain().is_empty());
    }

    #[test]
    fn test_backfill_inserts_near_head() {
        let mut fx = Fixture::direct();
        fx.store.insert(&message(fx.me, 10, 10 * GAP));
        fx.store.insert(&message(fx.me, 11, 10 * GAP + 500));
        fx.drain();

        let old = message(fx.peers[0], 3, GAP);
        assert_eq!(fx.store.insert(&old), InsertOutcome::Inserted { position: 1 });
        assert_eq!(
            fx.kinds(),
            vec![
                ItemKind::Time,
                ItemKind::Message,
                ItemKind::Time,
                ItemKind::Message,
                ItemKind::Message
            ]
        );
        let mut model = ListModel { len: 3, changed: Vec::new() };
        for change in fx.drain() {
            model.apply(change);
        }
        assert_eq!(model.len, fx.store.item_count());
        assert_invariants(&fx.store);
    }

    #[test]
    fn test_insert_between_collapses_later_time() {
        let mut fx = Fixture::direct();
        // 0 and 70 minutes: two TIME items.
        fx.store.insert(&message(fx.me, 1, 0));
        fx.store.insert(&message(fx.me, 2, 70 * 60_000));
        assert_eq!(fx.store.item_count(), 4);

        // An item at 65 minutes opens a group that absorbs the 70 minute one.
        fx.store.insert(&message(fx.peers[0], 1, 65 * 60_000));
        assert_eq!(
            fx.kinds(),
            vec![
                ItemKind::Time,
                ItemKind::Message,
                ItemKind::Time,
                ItemKind::Message,
                ItemKind::Message
            ]
        );
        assert_eq!(fx.store.item_at(2).unwrap().timestamp(), 65 * 60_000);
        assert_invariants(&fx.store);
    }

    #[test]
    fn test_removal_merges_time_groups() {
        let mut fx = Fixture::direct();
        let a = message(fx.me, 1, 0);
        let b = message(fx.me, 2, 50 * 60_000);
        let c = message(fx.me, 3, 100 * 60_000);
        let d = message(fx.me, 4, 130 * 60_000);
        for descriptor in [&a, &b, &c, &d] {
            fx.store.insert(descriptor);
        }
        // TIME a b TIME c d
        assert_eq!(fx.store.item_count(), 6);
        fx.drain();

        // Without c, d is 130 minutes after the anchor: d opens the group.
        fx.store.remove(&c.id);
        assert_eq!(
            fx.kinds(),
            vec![ItemKind::Time, ItemKind::Message, ItemKind::Message, ItemKind::Time, ItemKind::Message]
        );
        assert_eq!(fx.store.item_at(3).unwrap().timestamp(), d.created_at);
        let mut model = ListModel { len: 6, changed: Vec::new() };
        for change in fx.drain() {
            model.apply(change);
        }
        assert_eq!(model.len, 5);
        assert_invariants(&fx.store);

        // Removing a leaves b as first item, which now needs its own TIME.
        fx.store.remove(&a.id);
        assert_eq!(
            fx.kinds(),
            vec![ItemKind::Time, ItemKind::Message, ItemKind::Time, ItemKind::Message]
        );
        assert_invariants(&fx.store);
    }

    #[test]
    fn test_removing_last_item_prunes_separators() {
        let mut fx = Fixture::group(1);
        let p = message(fx.peers[0], 1, 0);
        fx.store.insert(&p);
        assert_eq!(fx.kinds(), vec![ItemKind::Time, ItemKind::Name, ItemKind::Message]);
        fx.drain();

        fx.store.remove(&p.id);
        assert_eq!(fx.store.item_count(), 0);
        assert_eq!(
            fx.drain(),
            vec![
                Change::Removed { position: 2 },
                Change::Removed { position: 1 },
                Change::Removed { position: 0 }
            ]
        );
    }

    #[test]
    fn test_name_items_follow_author_runs() {
        let mut fx = Fixture::group(2);
        let (x, y) = (fx.peers[0], fx.peers[1]);
        let x1 = message(x, 1, 0);
        let y1 = message(y, 1, 1_000);
        let x2 = message(x, 2, 2_000);
        for descriptor in [&x1, &y1, &x2] {
            fx.store.insert(descriptor);
        }
        assert_eq!(
            fx.kinds(),
            vec![
                ItemKind::Time,
                ItemKind::Name,
                ItemKind::Message,
                ItemKind::Name,
                ItemKind::Message,
                ItemKind::Name,
                ItemKind::Message
            ]
        );

        // Without y1, x2 joins x1's run and its NAME goes away.
        fx.store.remove(&y1.id);
        assert_eq!(
            fx.kinds(),
            vec![ItemKind::Time, ItemKind::Name, ItemKind::Message, ItemKind::Message]
        );
        assert_invariants(&fx.store);

        // Without x1, x2 leads the timeline and adopts the separators.
        fx.store.remove(&x1.id);
        assert_eq!(fx.kinds(), vec![ItemKind::Time, ItemKind::Name, ItemKind::Message]);
        assert_invariants(&fx.store);
    }

    #[test]
    fn test_rename_peer_updates_name_items() {
        let mut fx = Fixture::group(1);
        let peer = fx.peers[0];
        fx.store.insert(&message(peer, 1, 0));
        fx.drain();

        assert!(fx.store.rename_peer(&peer, "Zoé"));
        assert_eq!(fx.store.item_at(1).unwrap().display_name(), Some("Zoé"));
        assert_eq!(fx.drain(), vec![Change::Changed { position: 1 }]);
    }

    #[test]
    fn test_read_marker_moves_forward_only() {
        let mut fx = Fixture::direct();
        let a = message(fx.me, 1, 0).with_sent_at(1);
        let b = message(fx.me, 2, 1_000).with_sent_at(1_001);
        fx.store.insert(&a);
        fx.store.insert(&b);

        fx.store.update_timestamps(&b.id, Some(5_000), Deletion::default());
        assert_eq!(fx.store.read_marker(), Some(&b.id));
        assert!(fx.item(&b.id).is_read_marker());

        // An older item read later never takes the marker.
        fx.store.update_timestamps(&a.id, Some(6_000), Deletion::default());
        assert_eq!(fx.store.read_marker(), Some(&b.id));
        assert!(!fx.item(&a.id).is_read_marker());
        assert_invariants(&fx.store);

        // A newer item read moves it and clears the old one.
        let c = message(fx.me, 3, 2_000).with_sent_at(2_001).with_read_at(7_000);
        fx.store.insert(&c);
        assert_eq!(fx.store.read_marker(), Some(&c.id));
        assert!(!fx.item(&b.id).is_read_marker());
        assert_invariants(&fx.store);

        // Removing the marker elects the next most recent read item.
        fx.store.remove(&c.id);
        assert_eq!(fx.store.read_marker(), Some(&b.id));
        assert!(fx.item(&b.id).is_read_marker());
        assert_invariants(&fx.store);
    }

    #[test]
    fn test_deletion_lifecycle() {
        let mut fx = Fixture::direct();
        let own = message(fx.me, 1, 0).with_sent_at(5);
        let theirs = message(fx.peers[0], 1, 10);
        fx.store.insert(&own);
        fx.store.insert(&theirs);

        let local_only = Deletion { local: Some(100), peer: None };
        assert_eq!(
            fx.store.update_timestamps(&own.id, None, local_only),
            UpdateOutcome::Refreshed { position: 1 }
        );
        assert_eq!(fx.item(&own.id).state(), DeleteState::DeletedLocal);

        let retracted = Deletion { local: None, peer: Some(100) };
        fx.store.update_timestamps(&theirs.id, None, retracted);
        assert_eq!(fx.item(&theirs.id).state(), DeleteState::DeletedPeer);

        let both = Deletion { local: Some(100), peer: Some(120) };
        assert_eq!(
            fx.store.update_timestamps(&own.id, None, both),
            UpdateOutcome::Removed { position: 1 }
        );
        assert_eq!(fx.store.update_timestamps(&theirs.id, None, local_only), UpdateOutcome::Removed { position: 1 });
        assert_eq!(fx.store.item_count(), 0);

        let unsent = message(fx.me, 2, 20).with_deleted(local_only);
        assert_eq!(fx.store.insert(&unsent), InsertOutcome::Expired);
    }

    #[test]
    fn test_sent_confirmation_keeps_local_delete_visible() {
        let mut fx = Fixture::direct();
        let own = message(fx.me, 1, 0);
        fx.store.insert(&own);

        let sent = own.clone().with_sent_at(20);
        assert_eq!(
            fx.store.update(&sent, ChangeKind::Timestamps),
            UpdateOutcome::Refreshed { position: 1 }
        );
        assert_eq!(fx.item(&own.id).sent_at(), Some(20));

        // A later timestamp update without a sent time keeps the known one.
        fx.store.update_timestamps(&own.id, Some(30), Deletion::default());
        assert_eq!(fx.item(&own.id).sent_at(), Some(20));

        let local_only = Deletion { local: Some(40), peer: None };
        let deleted = sent.with_deleted(local_only);
        assert_eq!(
            fx.store.update(&deleted, ChangeKind::Timestamps),
            UpdateOutcome::Refreshed { position: 1 }
        );
        assert_eq!(fx.item(&own.id).state(), DeleteState::DeletedLocal);
        assert_invariants(&fx.store);
    }

    #[test]
    fn test_pending_descriptors_from_json_are_distinct() {
        let mut fx = Fixture::direct();
        let pending = Descriptor::new(DescriptorId::pending(fx.me), ContentKind::Message, 10);
        let mut wire = serde_json::to_value(&pending).unwrap();
        wire["id"].as_object_mut().unwrap().remove("local_key");

        let a: Descriptor = serde_json::from_value(wire.clone()).unwrap();
        wire["created_at"] = serde_json::json!(20);
        let b: Descriptor = serde_json::from_value(wire).unwrap();

        assert!(matches!(fx.store.insert(&a), InsertOutcome::Inserted { .. }));
        assert!(matches!(fx.store.insert(&b), InsertOutcome::Inserted { .. }));
        assert_eq!(fx.store.real_count(), 2);
        assert_invariants(&fx.store);
    }

    #[test]
    fn test_update_in_place() {
        let mut fx = Fixture::direct();
        let original = message(fx.me, 1, 0).with_body(serde_json::json!({"text": "helo"}));
        fx.store.insert(&original);
        fx.store.set_selected(&original.id, true);
        fx.drain();

        // Same content object: timestamps only, no re-render.
        let same = original.clone().with_sent_at(3);
        assert_eq!(
            fx.store.update_in_place(&same),
            UpdateOutcome::Refreshed { position: 1 }
        );
        assert_eq!(fx.item(&original.id).sent_at(), Some(3));
        assert!(fx.drain().is_empty());

        let mut edited = original.clone().with_body(serde_json::json!({"text": "hello"}));
        edited.content.revision = 1;
        edited.created_at = 99;
        assert_eq!(
            fx.store.update_in_place(&edited),
            UpdateOutcome::Rebuilt { position: 1 }
        );
        assert_eq!(fx.drain(), vec![Change::Changed { position: 1 }]);
        let item = fx.item(&original.id);
        assert_eq!(item.timestamp(), 0);
        assert!(item.is_selected());
        assert_eq!(item.content().unwrap().body["text"], "hello");
        assert_invariants(&fx.store);
    }

    #[test]
    fn test_annotations_always_notify() {
        let mut fx = Fixture::direct();
        let original = message(fx.me, 1, 0);
        fx.store.insert(&original);
        fx.drain();

        let outcome = fx.store.update(&original, ChangeKind::Annotations);
        assert_eq!(outcome, UpdateOutcome::Refreshed { position: 1 });
        assert_eq!(fx.drain(), vec![Change::Changed { position: 1 }]);
    }

    #[test]
    fn test_initial_batch_emits_single_range() {
        let mut fx = Fixture::group(2);
        let (x, y) = (fx.peers[0], fx.peers[1]);
        let batch = vec![
            message(y, 1, 2_000),
            message(fx.me, 1, 0),
            message(x, 1, 1_000),
            message(x, 2, GAP * 3),
            Descriptor::new(
                DescriptorId::new(x, 3),
                ContentKind::Typing(causerie_shared::TypingAction::Start),
                GAP * 3,
            ),
        ];
        let outcome = fx.store.batch_load(&batch, true);
        assert_eq!(outcome, BatchOutcome { inserted: 4, skipped: 1 });
        assert!(fx.store.is_hydrated());
        assert_eq!(
            fx.drain(),
            vec![Change::RangeInserted { first: 0, count: fx.store.item_count() }]
        );
        assert_invariants(&fx.store);
    }

    #[test]
    fn test_clear_before() {
        let mut fx = Fixture::direct();
        let read = message(fx.me, 1, 0).with_sent_at(1).with_read_at(10);
        fx.store.insert(&read);
        fx.store.insert(&message(fx.me, 2, 1_000));
        fx.store.insert(&message(fx.peers[0], 1, GAP + 2_000));
        fx.store.insert(&message(fx.peers[0], 2, GAP + 3_000));
        assert_eq!(fx.store.read_marker(), Some(&read.id));
        fx.drain();

        assert_eq!(fx.store.clear_before(GAP + 2_500), 3);
        assert_eq!(fx.kinds(), vec![ItemKind::Time, ItemKind::Message]);
        assert_eq!(fx.store.read_marker(), None);
        let mut model = ListModel { len: 6, changed: Vec::new() };
        for change in fx.drain() {
            model.apply(change);
        }
        assert_eq!(model.len, 2);
        assert_invariants(&fx.store);

        assert_eq!(fx.store.clear_before(i64::MAX), 1);
        assert_eq!(fx.store.item_count(), 0);
    }

    #[test]
    fn test_typing_item_trails_timeline() {
        let mut fx = Fixture::direct();
        let peer = fx.peers[0];
        fx.store.insert(&message(peer, 1, 0));
        fx.drain();

        fx.store.set_typists(vec![peer]);
        assert_eq!(fx.drain(), vec![Change::Inserted { position: 2 }]);
        assert_eq!(fx.store.item_count(), 3);
        assert_eq!(fx.store.item_at(2).unwrap().kind(), ItemKind::Typing);

        fx.store.insert(&message(fx.me, 1, 500));
        assert_eq!(fx.store.item_at(3).unwrap().kind(), ItemKind::Typing);
        fx.drain();

        fx.store.set_typists(vec![peer]);
        assert!(fx.drain().is_empty());
        fx.store.set_typists(Vec::new());
        assert_eq!(fx.drain(), vec![Change::Removed { position: 3 }]);
        assert!(fx.store.typists().is_empty());
    }

    #[test]
    fn test_selection() {
        let mut fx = Fixture::direct();
        let a = message(fx.me, 1, 0);
        fx.store.insert(&a);
        fx.drain();

        assert!(fx.store.set_selected(&a.id, true));
        assert!(fx.item(&a.id).is_selected());
        fx.store.clear_selection();
        assert!(!fx.item(&a.id).is_selected());
        assert_eq!(
            fx.drain(),
            vec![Change::Changed { position: 1 }, Change::Changed { position: 1 }]
        );
        assert!(!fx.store.set_selected(&message(fx.me, 5, 0).id, true));
    }

    #[test]
    fn test_random_operations_keep_invariants() {
        for seed in 0..24u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut fx = if seed % 2 == 0 { Fixture::group(3) } else { Fixture::direct() };
            let mut model = ListModel::default();
            let mut next_seq = 1i64;
            let mut known: Vec<Descriptor> = Vec::new();
            let senders: Vec<TwincodeId> =
                std::iter::once(fx.me).chain(fx.peers.iter().copied()).collect();

            for _ in 0..150 {
                let mut random_descriptor = |rng: &mut StdRng| {
                    let sender = senders[rng.gen_range(0..senders.len())];
                    let base = rng.gen_range(0..8) * 40 * 60_000;
                    let ts = base + rng.gen_range(0..200_000);
                    next_seq += 1;
                    let mut d = message(sender, next_seq, ts).with_sent_at(ts + 1);
                    if sender == fx.me && rng.gen_bool(0.3) {
                        d = d.with_read_at(ts + rng.gen_range(1..10_000));
                    }
                    d
                };

                match rng.gen_range(0..10) {
                    0..=3 => {
                        let d = random_descriptor(&mut rng);
                        fx.store.insert(&d);
                        known.push(d);
                    }
                    4 => {
                        let batch: Vec<Descriptor> =
                            (0..rng.gen_range(1..6)).map(|_| random_descriptor(&mut rng)).collect();
                        fx.store.batch_load(&batch, false);
                        known.extend(batch);
                    }
                    5 | 6 if !known.is_empty() => {
                        let victim = &known[rng.gen_range(0..known.len())];
                        fx.store.remove(&victim.id);
                    }
                    7 if !known.is_empty() => {
                        let target = &known[rng.gen_range(0..known.len())];
                        let read_at = rng.gen_bool(0.7).then(|| rng.gen_range(1..1_000_000));
                        let deleted = if rng.gen_bool(0.1) {
                            Deletion { local: Some(5), peer: None }
                        } else {
                            Deletion::default()
                        };
                        fx.store.update_timestamps(&target.id, read_at, deleted);
                    }
                    8 if !known.is_empty() => {
                        let target = known[rng.gen_range(0..known.len())].clone();
                        if fx.store.position_of(&target.id).is_some() {
                            let before = fx.store.item_count();
                            assert_eq!(fx.store.insert(&target), InsertOutcome::Duplicate);
                            assert_eq!(fx.store.item_count(), before);
                        }
                        let mut edited = target.with_body(serde_json::json!({"edit": true}));
                        edited.content.revision += 1;
                        fx.store.update_in_place(&edited);
                    }
                    9 if rng.gen_bool(0.1) => {
                        fx.store.clear_before(rng.gen_range(0..4) * 40 * 60_000);
                    }
                    _ => {}
                }

                while let Ok(change) = fx.rx.try_recv() {
                    model.apply(change);
                }
                assert_eq!(model.len, fx.store.item_count(), "seed {seed}");
                assert_invariants(&fx.store);
            }
        }
    }
}

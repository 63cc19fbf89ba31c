//! Change notifications sent to the rendering side.
//!
//! Positions follow the classic list-diff contract: each change is valid
//! against the list as it stands after every previous change was applied.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::item::TimelineItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum Change {
    Inserted { position: usize },
    RangeInserted { first: usize, count: usize },
    Changed { position: usize },
    Removed { position: usize },
}

/// Receives the changes of a timeline.
pub trait ChangeNotifier: Send {
    fn notify(&mut self, change: Change);
}

impl ChangeNotifier for mpsc::UnboundedSender<Change> {
    fn notify(&mut self, change: Change) {
        if self.send(change).is_err() {
            tracing::debug!(?change, "Change receiver dropped");
        }
    }
}

/// Notifier that drops everything, for headless timelines.
#[derive(Debug, Default, Clone, Copy)]
pub struct Discard;

impl ChangeNotifier for Discard {
    fn notify(&mut self, _change: Change) {}
}

/// Bookkeeping for one store operation.
///
/// The entry sequence is captured when the operation starts; on commit the
/// final sequence is diffed against it: removals first (descending old
/// positions), then insertions (ascending final positions), then in-place
/// changes of surviving entries.
#[derive(Debug)]
pub(crate) struct Transaction {
    baseline: Vec<u64>,
    first_new_entry: u64,
    dirty: HashSet<u64>,
    coalesce: bool,
}

impl Transaction {
    pub(crate) fn begin(items: &[TimelineItem], next_entry: u64, coalesce: bool) -> Self {
        Self {
            baseline: items.iter().map(|i| i.entry).collect(),
            first_new_entry: next_entry,
            dirty: HashSet::new(),
            coalesce,
        }
    }

    pub(crate) fn touch(&mut self, entry: u64) {
        if entry < self.first_new_entry {
            self.dirty.insert(entry);
        }
    }

    pub(crate) fn finish(self, items: &[TimelineItem]) -> Vec<Change> {
        let survivors: HashSet<u64> = items.iter().map(|i| i.entry).collect();
        let mut changes = Vec::new();

        for (position, entry) in self.baseline.iter().enumerate().rev() {
            if !survivors.contains(entry) {
                changes.push(Change::Removed { position });
            }
        }

        let inserted: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.entry >= self.first_new_entry)
            .map(|(position, _)| position)
            .collect();

        if self.coalesce {
            let mut runs = inserted.iter().copied().peekable();
            while let Some(first) = runs.next() {
                let mut count = 1;
                while runs.peek() == Some(&(first + count)) {
                    runs.next();
                    count += 1;
                }
                changes.push(Change::RangeInserted { first, count });
            }
        } else {
            changes.extend(inserted.into_iter().map(|position| Change::Inserted { position }));
        }

        for (position, item) in items.iter().enumerate() {
            if self.dirty.contains(&item.entry) {
                changes.push(Change::Changed { position });
            }
        }

        changes
    }
}

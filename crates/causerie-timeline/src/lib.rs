//! # causerie-timeline
//!
//! Turns the unordered descriptor stream of one conversation into an ordered,
//! render-ready timeline: bubble grouping, TIME / NAME separators, the read
//! marker and the typing indicator, with list-diff change notifications.
//!
//! All mutation goes through a single writer ([`TimelineState`]); nothing in
//! this crate locks.

pub mod change;
pub mod config;
pub mod diagnostics;
pub mod grouping;
pub mod item;
pub mod read_state;
pub mod roster;
pub mod scheduler;
pub mod separators;
pub mod state;
pub mod store;
pub mod typing;

pub use change::{Change, ChangeNotifier, Discard};
pub use config::TimelineConfig;
pub use diagnostics::{CollectingDiagnostics, Diagnostics, Fault, TracingDiagnostics};
pub use grouping::Decoration;
pub use item::{Corners, ItemKind, OrderKey, TimelineItem};
pub use roster::{PeerProfile, Roster, Sender};
pub use scheduler::{Scheduler, TimerFired, TimerKey, TimerKind, TokioScheduler};
pub use state::TimelineState;
pub use store::{BatchOutcome, InsertOutcome, TimelineStore, UpdateOutcome};
pub use typing::{OutgoingTyping, TypingTracker};

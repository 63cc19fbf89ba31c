//! Per-conversation timeline state.
//!
//! Owns the store and both typing state machines so the single writer has
//! one entry point per stimulus: a source event, a timer, or local input.
//! The rendering side only reads derived state through accessors.

use std::sync::Arc;

use tracing::{debug, info};

use causerie_shared::{
    ContentKind, ConversationId, Descriptor, DescriptorId, SourceEvent, TwincodeId, TypingAction,
};

use crate::change::ChangeNotifier;
use crate::config::TimelineConfig;
use crate::diagnostics::{Diagnostics, Fault, TracingDiagnostics};
use crate::roster::{Roster, Sender};
use crate::scheduler::{Scheduler, TimerKind};
use crate::store::TimelineStore;
use crate::typing::{OutgoingTyping, TypingTracker};

pub struct TimelineState {
    conversation: ConversationId,
    store: TimelineStore,
    peers_typing: TypingTracker,
    outgoing: OutgoingTyping,
    diagnostics: Arc<dyn Diagnostics>,
}

impl TimelineState {
    pub fn new(
        conversation: ConversationId,
        config: TimelineConfig,
        roster: Roster,
        notifier: impl ChangeNotifier + 'static,
    ) -> Self {
        let peers_typing = TypingTracker::new(conversation, config.typing_peer_timeout);
        let outgoing = OutgoingTyping::new(conversation, config.typing_resend_delay, config.typing_stop_delay);
        Self {
            conversation,
            store: TimelineStore::new(config, roster, notifier),
            peers_typing,
            outgoing,
            diagnostics: Arc::new(TracingDiagnostics),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.store = self.store.with_diagnostics(diagnostics.clone());
        self.diagnostics = diagnostics;
        self
    }

    pub fn conversation(&self) -> ConversationId {
        self.conversation
    }

    pub fn store(&self) -> &TimelineStore {
        &self.store
    }

    pub fn typists(&self) -> Vec<TwincodeId> {
        self.peers_typing.typists()
    }

    pub fn is_typing_locally(&self) -> bool {
        self.outgoing.is_typing()
    }

    /// Apply one event from the descriptor source.
    pub fn apply_source_event(&mut self, event: &SourceEvent, scheduler: &mut dyn Scheduler) {
        match event {
            SourceEvent::Batch { descriptors, initial } => {
                self.store.batch_load(descriptors, *initial);
            }
            SourceEvent::Pushed { descriptor } => self.receive(descriptor, scheduler),
            // History only: old typing signals say nothing about now.
            SourceEvent::Backfilled { descriptor } => {
                self.store.insert(descriptor);
            }
            SourceEvent::Updated { descriptor, change } => {
                self.store.update(descriptor, *change);
            }
            SourceEvent::Deleted { ids } => {
                for id in ids {
                    self.store.remove(id);
                }
            }
            SourceEvent::Cleared { before } => {
                self.store.clear_before(*before);
            }
        }
    }

    fn receive(&mut self, descriptor: &Descriptor, scheduler: &mut dyn Scheduler) {
        let ContentKind::Typing(action) = descriptor.content.kind else {
            self.store.insert(descriptor);
            return;
        };

        let twincode = descriptor.id.twincode_outbound_id;
        match self.store.roster().classify(&twincode) {
            Some(Sender::Peer(peer)) => {
                if self.peers_typing.on_signal(peer, action, scheduler) {
                    debug!(conversation = %self.conversation, peer = %peer, ?action, "Peer typing changed");
                    self.store.set_typists(self.peers_typing.typists());
                }
            }
            Some(Sender::Local(_)) => {}
            None => self.diagnostics.report(&Fault::UnknownTypist(twincode)),
        }
    }

    /// A timer armed by this conversation fired. Returns the typing signal
    /// to publish, if any.
    pub fn on_timer(&mut self, kind: TimerKind, scheduler: &mut dyn Scheduler) -> Option<TypingAction> {
        match kind {
            TimerKind::PeerTyping(peer) => {
                if self.peers_typing.on_timeout(&peer) {
                    self.store.set_typists(self.peers_typing.typists());
                }
                None
            }
            TimerKind::TypingResend => self.outgoing.on_resend(scheduler),
            TimerKind::TypingStop => self.outgoing.on_inactivity(scheduler),
        }
    }

    /// The local user edited the draft.
    pub fn on_local_input(&mut self, scheduler: &mut dyn Scheduler) -> Option<TypingAction> {
        self.outgoing.on_input(scheduler)
    }

    /// The local user sent or cleared the draft.
    pub fn on_local_typing_stopped(&mut self, scheduler: &mut dyn Scheduler) -> Option<TypingAction> {
        self.outgoing.stop(scheduler)
    }

    pub fn set_selected(&mut self, id: &DescriptorId, selected: bool) -> bool {
        self.store.set_selected(id, selected)
    }

    pub fn clear_selection(&mut self) {
        self.store.clear_selection();
    }

    pub fn add_peer(&mut self, peer: TwincodeId, display_name: impl Into<String>) {
        self.store.add_peer(peer, display_name);
    }

    pub fn rename_peer(&mut self, peer: &TwincodeId, display_name: &str) -> bool {
        self.store.rename_peer(peer, display_name)
    }

    /// Drop all transient state, e.g. when the conversation is closed.
    pub fn reset_typing(&mut self, scheduler: &mut dyn Scheduler) -> Option<TypingAction> {
        if self.peers_typing.clear(scheduler) {
            self.store.set_typists(Vec::new());
        }
        let action = self.outgoing.stop(scheduler);
        info!(conversation = %self.conversation, "Typing state reset");
        action
    }
}

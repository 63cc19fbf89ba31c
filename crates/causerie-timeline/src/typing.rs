//! Typing indicator state machines.
//!
//! [`TypingTracker`] follows the remote parties: each is IDLE or TYPING, a
//! START (re)arms its inactivity timer, a STOP or the timer's expiry returns
//! it to IDLE. [`OutgoingTyping`] drives our own announcements: START on the
//! first keystroke, re-announced every resend period while typing, STOP after
//! a period without input.

use std::collections::BTreeSet;
use std::time::Duration;

use tracing::debug;

use causerie_shared::{ConversationId, TwincodeId, TypingAction};

use crate::scheduler::{Scheduler, TimerKey, TimerKind};

#[derive(Debug, Clone)]
pub struct TypingTracker {
    conversation: ConversationId,
    timeout: Duration,
    typing: BTreeSet<TwincodeId>,
}

impl TypingTracker {
    pub fn new(conversation: ConversationId, timeout: Duration) -> Self {
        Self {
            conversation,
            timeout,
            typing: BTreeSet::new(),
        }
    }

    /// Apply a signal from `peer`. Returns whether the set of typing peers
    /// changed.
    pub fn on_signal(&mut self, peer: TwincodeId, action: TypingAction, scheduler: &mut dyn Scheduler) -> bool {
        let key = TimerKey::new(self.conversation, TimerKind::PeerTyping(peer));
        match action {
            TypingAction::Start => {
                scheduler.schedule(key, self.timeout);
                self.typing.insert(peer)
            }
            TypingAction::Stop => {
                scheduler.cancel(&key);
                self.typing.remove(&peer)
            }
        }
    }

    /// The inactivity timer of `peer` expired.
    pub fn on_timeout(&mut self, peer: &TwincodeId) -> bool {
        let changed = self.typing.remove(peer);
        if changed {
            debug!(peer = %peer, "Peer typing timed out");
        }
        changed
    }

    pub fn is_typing(&self, peer: &TwincodeId) -> bool {
        self.typing.contains(peer)
    }

    pub fn typists(&self) -> Vec<TwincodeId> {
        self.typing.iter().copied().collect()
    }

    /// Forget every typing peer and disarm their timers.
    pub fn clear(&mut self, scheduler: &mut dyn Scheduler) -> bool {
        for peer in &self.typing {
            scheduler.cancel(&TimerKey::new(self.conversation, TimerKind::PeerTyping(*peer)));
        }
        let changed = !self.typing.is_empty();
        self.typing.clear();
        changed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outgoing {
    Idle,
    Typing,
}

/// Our own typing state.
#[derive(Debug, Clone)]
pub struct OutgoingTyping {
    conversation: ConversationId,
    resend_delay: Duration,
    stop_delay: Duration,
    state: Outgoing,
}

impl OutgoingTyping {
    pub fn new(conversation: ConversationId, resend_delay: Duration, stop_delay: Duration) -> Self {
        Self {
            conversation,
            resend_delay,
            stop_delay,
            state: Outgoing::Idle,
        }
    }

    pub fn is_typing(&self) -> bool {
        self.state == Outgoing::Typing
    }

    /// The user edited the draft.
    pub fn on_input(&mut self, scheduler: &mut dyn Scheduler) -> Option<TypingAction> {
        scheduler.schedule(self.key(TimerKind::TypingStop), self.stop_delay);
        match self.state {
            Outgoing::Typing => None,
            Outgoing::Idle => {
                self.state = Outgoing::Typing;
                scheduler.schedule(self.key(TimerKind::TypingResend), self.resend_delay);
                Some(TypingAction::Start)
            }
        }
    }

    /// The resend timer fired.
    pub fn on_resend(&mut self, scheduler: &mut dyn Scheduler) -> Option<TypingAction> {
        match self.state {
            Outgoing::Idle => None,
            Outgoing::Typing => {
                scheduler.schedule(self.key(TimerKind::TypingResend), self.resend_delay);
                Some(TypingAction::Start)
            }
        }
    }

    /// The inactivity timer fired.
    pub fn on_inactivity(&mut self, scheduler: &mut dyn Scheduler) -> Option<TypingAction> {
        self.stop(scheduler)
    }

    /// Stop announcing, e.g. because the draft was sent or cleared.
    pub fn stop(&mut self, scheduler: &mut dyn Scheduler) -> Option<TypingAction> {
        scheduler.cancel(&self.key(TimerKind::TypingResend));
        scheduler.cancel(&self.key(TimerKind::TypingStop));
        match self.state {
            Outgoing::Idle => None,
            Outgoing::Typing => {
                self.state = Outgoing::Idle;
                Some(TypingAction::Stop)
            }
        }
    }

    fn key(&self, kind: TimerKind) -> TimerKey {
        TimerKey::new(self.conversation, kind)
    }
}

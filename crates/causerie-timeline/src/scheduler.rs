//! Cancellable single-shot timers keyed by (conversation, timer kind).
//!
//! Each scheduled timer gets a generation number. A fire is delivered over a
//! channel to the single-writer task, which asks [`TokioScheduler::accept`]
//! before acting: a timer that was cancelled or rescheduled after its sleep
//! finished carries a stale generation and is ignored.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use causerie_shared::{ConversationId, TwincodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Inactivity of one typing peer.
    PeerTyping(TwincodeId),
    /// Re-announce our own START.
    TypingResend,
    /// Our own typing went idle.
    TypingStop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerKey {
    pub conversation: ConversationId,
    pub kind: TimerKind,
}

impl TimerKey {
    pub fn new(conversation: ConversationId, kind: TimerKind) -> Self {
        Self { conversation, kind }
    }
}

/// A timer that reached its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub key: TimerKey,
    generation: u64,
}

pub trait Scheduler: Send {
    /// Arm `key` to fire after `after`, replacing any pending timer for it.
    fn schedule(&mut self, key: TimerKey, after: Duration);

    /// Disarm `key`. No-op when nothing is pending.
    fn cancel(&mut self, key: &TimerKey);
}

/// Scheduler backed by `tokio::time::sleep` tasks.
pub struct TokioScheduler {
    tx: mpsc::UnboundedSender<TimerFired>,
    timers: HashMap<TimerKey, (u64, JoinHandle<()>)>,
    generation: u64,
}

impl TokioScheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerFired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            tx,
            timers: HashMap::new(),
            generation: 0,
        };
        (scheduler, rx)
    }

    /// Whether `fired` is the live timer for its key. A live timer is
    /// consumed, so it is accepted at most once.
    pub fn accept(&mut self, fired: &TimerFired) -> bool {
        match self.timers.get(&fired.key) {
            Some((generation, _)) if *generation == fired.generation => {
                self.timers.remove(&fired.key);
                true
            }
            _ => {
                trace!(key = ?fired.key, "Stale timer ignored");
                false
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.timers.len()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, key: TimerKey, after: Duration) {
        self.generation += 1;
        let fired = TimerFired {
            key,
            generation: self.generation,
        };
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(fired);
        });

        if let Some((_, previous)) = self.timers.insert(key, (self.generation, handle)) {
            previous.abort();
        }
    }

    fn cancel(&mut self, key: &TimerKey) {
        if let Some((_, handle)) = self.timers.remove(key) {
            handle.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, (_, handle)) in self.timers.drain() {
            handle.abort();
        }
    }
}

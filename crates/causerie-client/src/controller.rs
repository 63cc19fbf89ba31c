//! Conversation controller.
//!
//! Each open conversation runs in its own tokio task that owns the
//! [`TimelineState`]. Everything that mutates the timeline (source events,
//! timer fires, local typing, history pages) is marshalled onto that task, so
//! the store has exactly one writer. Readers get cloned snapshots through the
//! same command channel.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use causerie_shared::{
    CauserieError, ConversationId, Descriptor, DescriptorId, Result, SourceError, SourceEvent,
    TwincodeId, TypingAction,
};
use causerie_timeline::{
    Change, Diagnostics, Roster, TimelineConfig, TimelineItem, TimelineState, TimerFired,
    TokioScheduler, TracingDiagnostics,
};

use crate::source::{DescriptorFilter, DescriptorSource};

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Command {
    Apply(SourceEvent),
    LocalInput,
    LocalTypingStopped,
    LoadOlder(oneshot::Sender<bool>),
    Select { id: DescriptorId, selected: bool },
    ClearSelection,
    AddPeer { peer: TwincodeId, display_name: String },
    RenamePeer { peer: TwincodeId, display_name: String },
    Snapshot(oneshot::Sender<TimelineSnapshot>),
    Shutdown,
}

/// Read-only copy of a conversation timeline.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineSnapshot {
    pub conversation: ConversationId,
    /// Every item, the virtual typing item included.
    pub items: Vec<TimelineItem>,
    pub read_marker: Option<DescriptorId>,
    pub typists: Vec<TwincodeId>,
    pub hydrated: bool,
    pub loading_older: bool,
}

impl TimelineSnapshot {
    pub fn real_items(&self) -> impl Iterator<Item = &TimelineItem> {
        self.items.iter().filter(|item| item.is_real())
    }
}

/// Handle to a running conversation task. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ConversationHandle {
    conversation: ConversationId,
    tx: mpsc::Sender<Command>,
}

impl ConversationHandle {
    pub fn conversation(&self) -> ConversationId {
        self.conversation
    }

    /// Forward a source event to the timeline.
    pub async fn push(&self, event: SourceEvent) -> Result<()> {
        self.send(Command::Apply(event)).await
    }

    /// The local user edited the draft.
    pub async fn local_input(&self) -> Result<()> {
        self.send(Command::LocalInput).await
    }

    /// The local user sent or cleared the draft.
    pub async fn local_typing_stopped(&self) -> Result<()> {
        self.send(Command::LocalTypingStopped).await
    }

    /// Request the page before the oldest loaded item. Returns `false` when
    /// a request is already in flight or history is exhausted.
    pub async fn load_older(&self) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::LoadOlder(reply)).await?;
        rx.await.map_err(|_| CauserieError::Closed)
    }

    pub async fn set_selected(&self, id: DescriptorId, selected: bool) -> Result<()> {
        self.send(Command::Select { id, selected }).await
    }

    pub async fn clear_selection(&self) -> Result<()> {
        self.send(Command::ClearSelection).await
    }

    pub async fn add_peer(&self, peer: TwincodeId, display_name: impl Into<String>) -> Result<()> {
        let display_name = display_name.into();
        self.send(Command::AddPeer { peer, display_name }).await
    }

    pub async fn rename_peer(&self, peer: TwincodeId, display_name: impl Into<String>) -> Result<()> {
        let display_name = display_name.into();
        self.send(Command::RenamePeer { peer, display_name }).await
    }

    pub async fn snapshot(&self) -> Result<TimelineSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot(reply)).await?;
        rx.await.map_err(|_| CauserieError::Closed)
    }

    /// Stop the conversation task. Pending commands are processed first.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown).await
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.tx.send(command).await.map_err(|_| CauserieError::Closed)
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// Outcome of a history fetch, delivered back to the conversation task.
struct Page {
    initial: bool,
    result: std::result::Result<Vec<Descriptor>, SourceError>,
}

struct Controller<S> {
    state: TimelineState,
    scheduler: TokioScheduler,
    source: Arc<S>,
    page_size: usize,
    page_tx: mpsc::Sender<Page>,
    typing_tx: mpsc::UnboundedSender<TypingAction>,
    fetching: bool,
    exhausted: bool,
}

/// Open a conversation: spawn its task and start the initial fetch.
///
/// Returns the command handle, the change stream for the rendering side and
/// the task's join handle.
pub fn spawn_conversation<S: DescriptorSource>(
    conversation: ConversationId,
    config: TimelineConfig,
    roster: Roster,
    source: Arc<S>,
) -> (ConversationHandle, mpsc::UnboundedReceiver<Change>, JoinHandle<()>) {
    spawn_with_diagnostics(conversation, config, roster, source, Arc::new(TracingDiagnostics))
}

pub fn spawn_with_diagnostics<S: DescriptorSource>(
    conversation: ConversationId,
    config: TimelineConfig,
    roster: Roster,
    source: Arc<S>,
    diagnostics: Arc<dyn Diagnostics>,
) -> (ConversationHandle, mpsc::UnboundedReceiver<Change>, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::channel::<Command>(256);
    let (change_tx, change_rx) = mpsc::unbounded_channel::<Change>();
    let (page_tx, page_rx) = mpsc::channel::<Page>(4);

    let page_size = config.page_size;
    let state = TimelineState::new(conversation, config, roster, change_tx).with_diagnostics(diagnostics);

    let task = tokio::spawn(async move {
        let (scheduler, timer_rx) = TokioScheduler::new();
        let (typing_tx, publisher) = spawn_typing_publisher(conversation, source.clone());
        let mut controller = Controller {
            state,
            scheduler,
            source,
            page_size,
            page_tx,
            typing_tx,
            fetching: false,
            exhausted: false,
        };
        controller.request_page();
        controller.run(cmd_rx, timer_rx, page_rx).await;

        // Closing the queue lets the publisher flush the final STOP and exit.
        drop(controller);
        if let Err(e) = publisher.await {
            warn!(conversation = %conversation, error = %e, "Typing publisher panicked");
        }
    });

    let handle = ConversationHandle {
        conversation,
        tx: cmd_tx,
    };
    (handle, change_rx, task)
}

/// One publisher per conversation so START and STOP reach the source in the
/// order they were decided.
fn spawn_typing_publisher<S: DescriptorSource>(
    conversation: ConversationId,
    source: Arc<S>,
) -> (mpsc::UnboundedSender<TypingAction>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<TypingAction>();
    let task = tokio::spawn(async move {
        while let Some(action) = rx.recv().await {
            if let Err(e) = source.publish_typing(conversation, action).await {
                warn!(conversation = %conversation, ?action, error = %e, "Failed to publish typing");
            }
        }
    });
    (tx, task)
}

impl<S: DescriptorSource> Controller<S> {
    async fn run(
        &mut self,
        mut cmd_rx: mpsc::Receiver<Command>,
        mut timer_rx: mpsc::UnboundedReceiver<TimerFired>,
        mut page_rx: mpsc::Receiver<Page>,
    ) {
        let conversation = self.state.conversation();
        info!(conversation = %conversation, "Conversation task started");

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(Command::Shutdown) | None => break,
                        Some(command) => self.handle(command),
                    }
                }

                Some(fired) = timer_rx.recv() => {
                    if self.scheduler.accept(&fired) {
                        if let Some(action) = self.state.on_timer(fired.key.kind, &mut self.scheduler) {
                            self.publish_typing(action);
                        }
                    }
                }

                Some(page) = page_rx.recv() => self.apply_page(page),
            }
        }

        if let Some(action) = self.state.reset_typing(&mut self.scheduler) {
            self.publish_typing(action);
        }
        info!(conversation = %conversation, "Conversation task stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Apply(event) => {
                self.state.apply_source_event(&event, &mut self.scheduler);
            }
            Command::LocalInput => {
                if let Some(action) = self.state.on_local_input(&mut self.scheduler) {
                    self.publish_typing(action);
                }
            }
            Command::LocalTypingStopped => {
                if let Some(action) = self.state.on_local_typing_stopped(&mut self.scheduler) {
                    self.publish_typing(action);
                }
            }
            Command::LoadOlder(reply) => {
                let started = self.request_page();
                let _ = reply.send(started);
            }
            Command::Select { id, selected } => {
                self.state.set_selected(&id, selected);
            }
            Command::ClearSelection => self.state.clear_selection(),
            Command::AddPeer { peer, display_name } => self.state.add_peer(peer, display_name),
            Command::RenamePeer { peer, display_name } => {
                if !self.state.rename_peer(&peer, &display_name) {
                    warn!(peer = %peer, "Rename of unknown peer ignored");
                }
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown => {}
        }
    }

    /// Start a history fetch: the initial page until the timeline is
    /// hydrated, then the page before the oldest item.
    fn request_page(&mut self) -> bool {
        if self.fetching || self.exhausted {
            return false;
        }

        let store = self.state.store();
        let initial = !store.is_hydrated();
        let filter = if initial {
            DescriptorFilter::latest(self.page_size)
        } else {
            match store.oldest().and_then(|item| item.descriptor_id().map(|id| (item.timestamp(), *id))) {
                Some((timestamp, id)) => DescriptorFilter::older_than(timestamp, id, self.page_size),
                None => DescriptorFilter::latest(self.page_size),
            }
        };

        self.fetching = true;
        let conversation = self.state.conversation();
        let source = self.source.clone();
        let page_tx = self.page_tx.clone();
        debug!(conversation = %conversation, initial, ?filter, "Requesting history page");

        tokio::spawn(async move {
            let result = if initial {
                source.fetch_initial(conversation, filter.limit).await
            } else {
                source.fetch_older(conversation, filter).await
            };
            let _ = page_tx.send(Page { initial, result }).await;
        });
        true
    }

    fn apply_page(&mut self, page: Page) {
        self.fetching = false;
        let conversation = self.state.conversation();
        match page.result {
            Ok(descriptors) => {
                if !page.initial && descriptors.is_empty() {
                    info!(conversation = %conversation, "History exhausted");
                    self.exhausted = true;
                }
                let event = SourceEvent::Batch {
                    descriptors,
                    initial: page.initial,
                };
                self.state.apply_source_event(&event, &mut self.scheduler);
            }
            Err(e) => {
                warn!(conversation = %conversation, initial = page.initial, error = %e, "History fetch failed");
            }
        }
    }

    fn publish_typing(&self, action: TypingAction) {
        if self.typing_tx.send(action).is_err() {
            warn!(conversation = %self.state.conversation(), ?action, "Typing publisher is gone");
        }
    }

    fn snapshot(&self) -> TimelineSnapshot {
        let store = self.state.store();
        TimelineSnapshot {
            conversation: self.state.conversation(),
            items: store.items().cloned().collect(),
            read_marker: store.read_marker().copied(),
            typists: self.state.typists(),
            hydrated: store.is_hydrated(),
            loading_older: self.fetching,
        }
    }
}

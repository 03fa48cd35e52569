//! Playback dispatcher
//!
//! A single task owns the announcement queue and the playback slot. Every
//! operation reaches it as a command on one channel, so all decisions are
//! serialized. Commands already waiting in the channel are applied together
//! before the next announcement is selected, which lets a burst of enqueues
//! compete on priority.
//!
//! Each utterance and each post-utterance cooldown carries the generation token
//! it was issued under. Callbacks whose token no longer matches the live slot
//! are ignored, so an utterance that finishes after `stop`/`disable` cannot
//! restart the pipeline.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::announcement::{Announcement, AnnouncementId, AnnouncementRequest, Priority};
use crate::controller::LanguagePreference;
use crate::language::Language;
use crate::queue::AnnouncementQueue;
use crate::sink::{SpeechSink, Utterance};
use crate::voice::{self, MatchTier};
use crate::{BusVoiceError, Result};

#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    /// Pause after an utterance ends before the next one may start
    pub cooldown: Duration,
    pub command_capacity: usize,
    pub event_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_millis(1000),
            command_capacity: 256,
            event_capacity: 256,
        }
    }
}

/// Coarse playback state. `Speaking` also covers the cooldown after an
/// utterance, when the snapshot has no `current_text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlaybackState {
    Idle,
    Speaking,
}

/// Observable dispatcher state for UI display
#[derive(Debug, Clone, PartialEq)]
pub struct DispatcherSnapshot {
    pub enabled: bool,
    pub state: PlaybackState,
    pub current_id: Option<AnnouncementId>,
    pub current_text: Option<String>,
    pub queued: usize,
}

/// Notifications broadcast to observers
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    Enqueued {
        id: AnnouncementId,
        priority: Priority,
        language: Language,
    },
    Rejected {
        reason: String,
    },
    Started {
        id: AnnouncementId,
        text: String,
        language: Language,
        voice: Option<String>,
        tier: Option<MatchTier>,
    },
    Completed {
        id: AnnouncementId,
    },
    Failed {
        id: AnnouncementId,
        reason: String,
    },
    Cancelled {
        id: AnnouncementId,
    },
    QueueCleared {
        dropped: usize,
    },
    StaleCallbackIgnored {
        generation: u64,
    },
    StateChanged {
        old: PlaybackState,
        new: PlaybackState,
    },
    EnabledChanged {
        enabled: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Generation(u64);

impl Generation {
    fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

/// The single playback slot
#[derive(Debug)]
enum Slot {
    Idle,
    Speaking {
        current: Announcement,
        generation: Generation,
    },
    /// Utterance ended; the slot stays taken until the cooldown elapses
    CoolingDown { generation: Generation },
}

impl Slot {
    fn state(&self) -> PlaybackState {
        match self {
            Slot::Idle => PlaybackState::Idle,
            Slot::Speaking { .. } | Slot::CoolingDown { .. } => PlaybackState::Speaking,
        }
    }
}

enum Command {
    Enqueue {
        request: AnnouncementRequest,
        reply: oneshot::Sender<Result<Option<AnnouncementId>>>,
    },
    SetEnabled {
        enabled: bool,
        /// Receives the previous value
        reply: oneshot::Sender<bool>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
    UtteranceFinished {
        generation: Generation,
        outcome: Result<()>,
    },
    CooldownElapsed {
        generation: Generation,
    },
}

/// What the run loop does once a batch of commands is applied
#[derive(Default)]
struct Step {
    drain: bool,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Step {
    fn drain_if(drain: bool) -> Self {
        Self {
            drain,
            shutdown: None,
        }
    }

    fn merge(mut self, other: Step) -> Self {
        self.drain |= other.drain;
        self.shutdown = self.shutdown.or(other.shutdown);
        self
    }
}

/// Cloneable access to a running dispatcher
#[derive(Clone)]
pub struct DispatcherHandle {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<DispatcherSnapshot>,
    events: broadcast::Sender<DispatchEvent>,
}

impl DispatcherHandle {
    /// Queue a request. `Ok(None)` means it was dropped because the dispatcher
    /// is disabled.
    pub async fn enqueue(&self, request: AnnouncementRequest) -> Result<Option<AnnouncementId>> {
        self.request(|reply| Command::Enqueue { request, reply })
            .await?
    }

    /// Returns whether the dispatcher was enabled before this call
    pub async fn set_enabled(&self, enabled: bool) -> Result<bool> {
        self.request(|reply| Command::SetEnabled { enabled, reply })
            .await
    }

    /// Abort the current utterance and drop everything pending
    pub async fn stop(&self) -> Result<()> {
        self.request(|reply| Command::Stop { reply }).await
    }

    /// Stop playback and end the dispatcher task
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    pub fn snapshot(&self) -> DispatcherSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<DispatcherSnapshot> {
        self.snapshot.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.events.subscribe()
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| BusVoiceError::DispatcherClosed)?;
        rx.await.map_err(|_| BusVoiceError::DispatcherClosed)
    }
}

/// Start a dispatcher task on the current runtime
pub fn spawn(
    sink: Arc<dyn SpeechSink>,
    preference: Arc<RwLock<LanguagePreference>>,
    config: DispatcherConfig,
    enabled: bool,
) -> (DispatcherHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(config.command_capacity.max(1));
    let (events, _) = broadcast::channel(config.event_capacity.max(1));
    let initial = DispatcherSnapshot {
        enabled,
        state: PlaybackState::Idle,
        current_id: None,
        current_text: None,
        queued: 0,
    };
    let (snapshot_tx, snapshot_rx) = watch::channel(initial);

    let dispatcher = Dispatcher {
        sink,
        preference,
        cooldown: config.cooldown,
        queue: AnnouncementQueue::new(),
        slot: Slot::Idle,
        enabled,
        generation: Generation::default(),
        live: watch::channel(Generation::default()).0,
        sequence: 0,
        commands: tx.downgrade(),
        events: events.clone(),
        snapshot: snapshot_tx,
    };
    let task = tokio::spawn(dispatcher.run(rx));

    let handle = DispatcherHandle {
        commands: tx,
        snapshot: snapshot_rx,
        events,
    };
    (handle, task)
}

struct Dispatcher {
    sink: Arc<dyn SpeechSink>,
    preference: Arc<RwLock<LanguagePreference>>,
    cooldown: Duration,
    queue: AnnouncementQueue,
    slot: Slot,
    enabled: bool,
    generation: Generation,
    /// Mirrors `generation` for in-flight utterance tasks
    live: watch::Sender<Generation>,
    sequence: u64,
    // Weak so the task ends once every handle is gone
    commands: mpsc::WeakSender<Command>,
    events: broadcast::Sender<DispatchEvent>,
    snapshot: watch::Sender<DispatcherSnapshot>,
}

impl Dispatcher {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        info!(target: "dispatcher", sink = %self.sink.name(), enabled = self.enabled, "Dispatcher started");

        let mut shutdown_reply = None;
        while let Some(cmd) = rx.recv().await {
            let mut step = self.apply(cmd).await;
            while step.shutdown.is_none() {
                match rx.try_recv() {
                    Ok(cmd) => step = step.merge(self.apply(cmd).await),
                    Err(_) => break,
                }
            }
            if step.shutdown.is_some() {
                shutdown_reply = step.shutdown;
                break;
            }
            if step.drain {
                self.drain().await;
            }
        }

        self.cancel_current().await;
        self.clear_queue();
        self.publish_snapshot();
        info!(target: "dispatcher", "Dispatcher stopped");
        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
    }

    async fn apply(&mut self, cmd: Command) -> Step {
        match cmd {
            Command::Enqueue { request, reply } => {
                let result = self.accept(request);
                let queued = matches!(result, Ok(Some(_)));
                let _ = reply.send(result);
                Step::drain_if(queued)
            }
            Command::SetEnabled { enabled, reply } => {
                let previous = self.enabled;
                let step = if enabled {
                    self.set_enabled(true);
                    Step::drain_if(true)
                } else {
                    self.set_enabled(false);
                    self.cancel_current().await;
                    self.clear_queue();
                    Step::default()
                };
                self.publish_snapshot();
                let _ = reply.send(previous);
                step
            }
            Command::Stop { reply } => {
                self.cancel_current().await;
                self.clear_queue();
                self.publish_snapshot();
                let _ = reply.send(());
                Step::default()
            }
            Command::Shutdown { reply } => Step {
                drain: false,
                shutdown: Some(reply),
            },
            Command::UtteranceFinished {
                generation,
                outcome,
            } => {
                self.on_utterance_finished(generation, outcome);
                Step::default()
            }
            Command::CooldownElapsed { generation } => {
                let live = matches!(self.slot, Slot::CoolingDown { generation: g } if g == generation);
                if live {
                    self.transition(Slot::Idle);
                } else {
                    self.ignore_stale(generation);
                }
                Step::drain_if(live)
            }
        }
    }

    fn accept(&mut self, request: AnnouncementRequest) -> Result<Option<AnnouncementId>> {
        if !self.enabled {
            debug!(target: "dispatcher", "Assistant disabled; dropping announcement");
            return Ok(None);
        }
        self.sequence += 1;
        let id = AnnouncementId(self.sequence);
        let priority = request.priority;
        let language = request.language;
        let announcement = Announcement::new(id, request, self.sequence);

        match self.queue.enqueue(announcement) {
            Ok(()) => {
                debug!(target: "dispatcher", %id, priority = priority.as_str(), %language, queued = self.queue.len(), "Announcement queued");
                self.emit(DispatchEvent::Enqueued {
                    id,
                    priority,
                    language,
                });
                self.publish_snapshot();
                Ok(Some(id))
            }
            Err(err) => {
                self.emit(DispatchEvent::Rejected {
                    reason: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn drain(&mut self) {
        if !self.enabled || !matches!(self.slot, Slot::Idle) || self.queue.is_empty() {
            return;
        }
        let Some(commands) = self.commands.upgrade() else {
            debug!(target: "dispatcher", "No handles left; not starting new utterances");
            return;
        };
        let Some(next) = self.queue.dequeue_highest_priority() else {
            return;
        };

        let voices = self.sink.list_voices().await;
        let matched = voice::resolve(next.language().tag(), &voices);
        let chosen = matched.map(|m| m.voice.clone());
        let tier = matched.map(|m| m.tier);
        let volume = self.preference.read().volume;

        let generation = self.advance_generation();
        let utterance = Utterance {
            text: next.text().to_string(),
            language: next.language(),
            voice: chosen.clone(),
            volume,
            rate: next.language().speech_rate(),
        };

        info!(
            target: "dispatcher",
            id = %next.id(),
            priority = next.priority().as_str(),
            language = %next.language(),
            voice = chosen.as_ref().map(|v| v.display_name.as_str()).unwrap_or("<sink default>"),
            remaining = self.queue.len(),
            "Speaking announcement"
        );
        self.emit(DispatchEvent::Started {
            id: next.id(),
            text: next.text().to_string(),
            language: next.language(),
            voice: chosen.map(|v| v.display_name),
            tier,
        });

        let sink = Arc::clone(&self.sink);
        let live = self.live.subscribe();
        tokio::spawn(async move {
            // A superseded utterance is dropped here even if the sink missed `stop`
            let outcome = tokio::select! {
                biased;
                _ = superseded(live, generation) => Ok(()),
                outcome = sink.speak(utterance) => outcome,
            };
            let _ = commands
                .send(Command::UtteranceFinished {
                    generation,
                    outcome,
                })
                .await;
        });

        self.transition(Slot::Speaking {
            current: next,
            generation,
        });
    }

    fn on_utterance_finished(&mut self, generation: Generation, outcome: Result<()>) {
        let id = match &self.slot {
            Slot::Speaking {
                current,
                generation: live,
            } if *live == generation => current.id(),
            _ => {
                self.ignore_stale(generation);
                return;
            }
        };

        match outcome {
            Ok(()) => {
                debug!(target: "dispatcher", %id, "Announcement completed");
                self.emit(DispatchEvent::Completed { id });
            }
            Err(err) => {
                // Not retried; the item is discarded either way
                warn!(target: "dispatcher", %id, error = %err, "Synthesis failed; moving on");
                self.emit(DispatchEvent::Failed {
                    id,
                    reason: err.to_string(),
                });
            }
        }

        // Drops the finished announcement; the slot stays taken until cooldown ends
        self.transition(Slot::CoolingDown { generation });

        if let Some(commands) = self.commands.upgrade() {
            let cooldown = self.cooldown;
            tokio::spawn(async move {
                tokio::time::sleep(cooldown).await;
                let _ = commands.send(Command::CooldownElapsed { generation }).await;
            });
        }
    }

    /// Abort whatever holds the slot and invalidate its generation
    async fn cancel_current(&mut self) {
        match &self.slot {
            Slot::Idle => return,
            Slot::Speaking { current, .. } => {
                let id = current.id();
                info!(target: "dispatcher", %id, "Cancelling current announcement");
                self.sink.stop().await;
                self.emit(DispatchEvent::Cancelled { id });
            }
            Slot::CoolingDown { .. } => {}
        }
        self.advance_generation();
        self.transition(Slot::Idle);
    }

    fn advance_generation(&mut self) -> Generation {
        self.generation = self.generation.next();
        self.live.send_replace(self.generation);
        self.generation
    }

    fn clear_queue(&mut self) {
        let dropped = self.queue.clear();
        if dropped > 0 {
            info!(target: "dispatcher", dropped, "Cleared pending announcements");
        }
        self.emit(DispatchEvent::QueueCleared { dropped });
    }

    fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            self.enabled = enabled;
            info!(target: "dispatcher", enabled, "Dispatcher enabled state changed");
            self.emit(DispatchEvent::EnabledChanged { enabled });
        }
    }

    fn ignore_stale(&self, generation: Generation) {
        debug!(target: "dispatcher", generation = generation.0, live = self.generation.0, "Ignoring stale callback");
        self.emit(DispatchEvent::StaleCallbackIgnored {
            generation: generation.0,
        });
    }

    fn transition(&mut self, slot: Slot) {
        let old = self.slot.state();
        self.slot = slot;
        let new = self.slot.state();
        if old != new {
            self.emit(DispatchEvent::StateChanged { old, new });
        }
        self.publish_snapshot();
    }

    fn emit(&self, event: DispatchEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn publish_snapshot(&self) {
        let (current_id, current_text) = match &self.slot {
            Slot::Speaking { current, .. } => (Some(current.id()), Some(current.text().to_string())),
            _ => (None, None),
        };
        self.snapshot.send_replace(DispatcherSnapshot {
            enabled: self.enabled,
            state: self.slot.state(),
            current_id,
            current_text,
            queued: self.queue.len(),
        });
    }
}

/// Resolves once `generation` is no longer the live one
async fn superseded(mut live: watch::Receiver<Generation>, generation: Generation) {
    loop {
        let current = *live.borrow_and_update();
        if current != generation || live.changed().await.is_err() {
            return;
        }
    }
}

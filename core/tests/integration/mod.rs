//! Integration Test Module
//!
//! End-to-end tests for busvoice-core driven through the public controller:
//!
//! - `e2e_ordering`: priority selection across bursts, at-most-one utterance
//! - `e2e_cancellation`: disable/stop while speaking, stale completions
//! - `e2e_lifecycle`: settings persistence, inert controller, lifecycle prompts

use async_trait::async_trait;
use busvoice_core::{
    AssistantConfig, Audience, BusVoiceError, DispatchEvent, DispatcherConfig, Language,
    LifecycleController, LifecyclePrompts, MemorySettingsStore, Result, Settings, SpeechSink,
    Utterance, VoiceProfile,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{timeout, Duration};

mod e2e_cancellation;
mod e2e_lifecycle;

// =============================================================================
// Shared Test Sinks
// =============================================================================

/// Speaks instantly (after an optional delay) and records every utterance.
/// Texts starting with "fail" are reported as synthesis errors.
#[derive(Default)]
pub struct RecordingSink {
    pub spoken: Mutex<Vec<Utterance>>,
    pub delay: Duration,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub stops: AtomicUsize,
}

impl RecordingSink {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn texts(&self) -> Vec<String> {
        self.spoken
            .lock()
            .unwrap()
            .iter()
            .map(|u| u.text.clone())
            .collect()
    }
}

#[async_trait]
impl SpeechSink for RecordingSink {
    fn name(&self) -> String {
        "recording".to_string()
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn list_voices(&self) -> Vec<VoiceProfile> {
        vec![
            VoiceProfile::new("en-IN", "Rishi").as_default(),
            VoiceProfile::new("hi-IN", "Lekha"),
        ]
    }

    async fn speak(&self, utterance: Utterance) -> Result<()> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let fail = utterance.text.starts_with("fail");
        self.spoken.lock().unwrap().push(utterance);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        if fail {
            Err(BusVoiceError::Synthesis("engine crashed".into()))
        } else {
            Ok(())
        }
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hands each utterance to the test, which decides when (and how) it ends.
/// `stop()` is recorded but does not resolve the pending utterance, so the
/// test can deliver a late completion afterwards. The dispatcher still drops
/// a superseded call on its own.
pub struct GatedSink {
    started: mpsc::UnboundedSender<(Utterance, oneshot::Sender<Result<()>>)>,
    pub stops: AtomicUsize,
}

pub type Gate = mpsc::UnboundedReceiver<(Utterance, oneshot::Sender<Result<()>>)>;

impl GatedSink {
    pub fn new() -> (Self, Gate) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                started: tx,
                stops: AtomicUsize::new(0),
            },
            rx,
        )
    }
}

#[async_trait]
impl SpeechSink for GatedSink {
    fn name(&self) -> String {
        "gated".to_string()
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn list_voices(&self) -> Vec<VoiceProfile> {
        Vec::new()
    }

    async fn speak(&self, utterance: Utterance) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        if self.started.send((utterance, done_tx)).is_err() {
            return Err(BusVoiceError::Synthesis("test gate dropped".into()));
        }
        done_rx
            .await
            .unwrap_or_else(|_| Err(BusVoiceError::Synthesis("test dropped responder".into())))
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// No synthesis capability on this host
pub struct MissingSink;

#[async_trait]
impl SpeechSink for MissingSink {
    fn name(&self) -> String {
        "missing".to_string()
    }

    fn is_available(&self) -> bool {
        false
    }

    async fn list_voices(&self) -> Vec<VoiceProfile> {
        Vec::new()
    }

    async fn speak(&self, _utterance: Utterance) -> Result<()> {
        Err(BusVoiceError::SynthesisUnavailable("missing".into()))
    }

    async fn stop(&self) {}
}

// =============================================================================
// Helpers
// =============================================================================

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub fn test_config() -> AssistantConfig {
    AssistantConfig {
        dispatcher: DispatcherConfig {
            cooldown: Duration::from_millis(10),
            ..DispatcherConfig::default()
        },
        languages: vec![Language::English, Language::Hindi, Language::Tamil],
        initial: Settings::default(),
        audience: Audience::Passenger,
        lifecycle_prompts: false,
        prompts: LifecyclePrompts::builtin(),
    }
}

pub fn start(sink: Arc<dyn SpeechSink>) -> LifecycleController {
    init_tracing();
    LifecycleController::start(sink, Arc::new(MemorySettingsStore::new()), test_config())
        .expect("controller starts")
}

/// Wait for the next event satisfying `pred`, skipping others
pub async fn wait_for(
    rx: &mut broadcast::Receiver<DispatchEvent>,
    pred: impl Fn(&DispatchEvent) -> bool,
) -> DispatchEvent {
    timeout(Duration::from_secs(2), async {
        loop {
            match rx.recv().await {
                Ok(ev) if pred(&ev) => return ev,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event stream closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Next utterance handed to a gated sink, with its responder
pub async fn next_utterance(gate: &mut Gate) -> (Utterance, oneshot::Sender<Result<()>>) {
    timeout(Duration::from_secs(2), gate.recv())
        .await
        .expect("timed out waiting for utterance")
        .expect("gate open")
}

/// Events already delivered, without waiting
pub fn drain_events(rx: &mut broadcast::Receiver<DispatchEvent>) -> Vec<DispatchEvent> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

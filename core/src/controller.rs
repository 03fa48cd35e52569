//! Lifecycle controller
//!
//! User-facing façade over the dispatcher: enable/disable, stop, language and
//! volume changes, settings persistence and optional spoken lifecycle prompts.
//! Every playback decision is delegated to the dispatcher task.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::announcement::{AnnouncementId, AnnouncementRequest, Priority};
use crate::config::AssistantConfig;
use crate::dispatcher::{self, DispatchEvent, DispatcherHandle, DispatcherSnapshot, PlaybackState};
use crate::language::Language;
use crate::settings::{clamp_volume, Settings, SettingsStore};
use crate::sink::SpeechSink;
use crate::{BusVoiceError, Result};

/// Language and volume applied to announcements when they start speaking
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LanguagePreference {
    pub language: Language,
    pub volume: f32,
}

pub struct LifecycleController {
    config: AssistantConfig,
    store: Arc<dyn SettingsStore>,
    preference: Arc<RwLock<LanguagePreference>>,
    available: bool,
    sink_name: String,
    dispatcher: DispatcherHandle,
    task: Mutex<Option<JoinHandle<()>>>,
    /// Serializes read-then-save so the last write reflects the latest state
    persisting: Mutex<()>,
}

impl LifecycleController {
    /// Validate `config`, restore stored settings and start the dispatcher on
    /// the current Tokio runtime.
    ///
    /// A sink without speech capability yields an inert controller: it stays
    /// disabled and drops every announcement.
    pub fn start(
        sink: Arc<dyn SpeechSink>,
        store: Arc<dyn SettingsStore>,
        config: AssistantConfig,
    ) -> Result<Self> {
        config.validate()?;

        let stored = match store.load() {
            Ok(Some(settings)) => settings.sanitized(),
            Ok(None) => config.initial.clone(),
            Err(e) => {
                warn!(target: "controller", error = %e, "Failed to load settings; using defaults");
                config.initial.clone()
            }
        };
        let language = if config.offers(stored.language) {
            stored.language
        } else {
            warn!(target: "controller", language = %stored.language, "Stored language not offered; using default");
            config.initial.language
        };

        let sink_name = sink.name();
        let available = sink.is_available();
        if !available {
            warn!(target: "controller", sink = %sink_name, "Speech synthesis unavailable; voice assistant stays off");
        }
        let enabled = stored.enabled && available;

        let preference = Arc::new(RwLock::new(LanguagePreference {
            language,
            volume: stored.volume,
        }));
        let (handle, task) = dispatcher::spawn(
            sink,
            Arc::clone(&preference),
            config.dispatcher.clone(),
            enabled,
        );

        info!(
            target: "controller",
            sink = %sink_name,
            enabled,
            language = %language,
            volume = stored.volume,
            "Voice assistant started"
        );

        Ok(Self {
            config,
            store,
            preference,
            available,
            sink_name,
            dispatcher: handle,
            task: Mutex::new(Some(task)),
            persisting: Mutex::new(()),
        })
    }

    pub async fn enable(&self) -> Result<()> {
        if !self.available {
            return Err(BusVoiceError::SynthesisUnavailable(self.sink_name.clone()));
        }
        let was_enabled = self.dispatcher.set_enabled(true).await?;
        if !was_enabled {
            info!(target: "controller", "Voice assistant enabled");
            self.persist();
            if self.config.lifecycle_prompts {
                let language = self.current_language();
                if let Some(prompts) = self.config.prompts.get(language) {
                    let text = prompts.welcome(self.config.audience).to_string();
                    self.enqueue(text, Priority::Medium, language).await?;
                }
            }
        }
        Ok(())
    }

    /// Abort current speech, drop everything pending and stop accepting
    /// announcements
    pub async fn disable(&self) -> Result<()> {
        if self.dispatcher.set_enabled(false).await? {
            info!(target: "controller", "Voice assistant disabled");
            self.persist();
        }
        Ok(())
    }

    /// Abort current speech and drop everything pending; stays enabled
    pub async fn stop(&self) -> Result<()> {
        debug!(target: "controller", "Stop requested");
        self.dispatcher.stop().await
    }

    /// Switch the language for future announcements. Already queued items keep
    /// the language they were queued with.
    pub async fn set_language(&self, language: Language) -> Result<()> {
        if !self.config.offers(language) {
            return Err(BusVoiceError::UnsupportedLanguage(language.tag().to_string()));
        }
        let previous = {
            let mut pref = self.preference.write();
            std::mem::replace(&mut pref.language, language)
        };
        if previous == language {
            return Ok(());
        }
        info!(target: "controller", from = %previous, to = %language, "Language changed");
        self.persist();

        if self.is_enabled() && self.config.lifecycle_prompts {
            if let Some(prompts) = self.config.prompts.get(language) {
                let text = prompts.language_switched.clone();
                self.enqueue(text, Priority::Medium, language).await?;
            }
        }
        Ok(())
    }

    pub async fn set_language_tag(&self, tag: &str) -> Result<()> {
        let language: Language = tag.parse()?;
        self.set_language(language).await
    }

    /// Set the volume for future announcements, clamped into 0.0..=1.0
    pub fn set_volume(&self, volume: f32) {
        let volume = clamp_volume(volume);
        self.preference.write().volume = volume;
        debug!(target: "controller", volume, "Volume changed");
        self.persist();
    }

    /// Queue an announcement. `Ok(None)` when it was dropped because the
    /// assistant is off.
    pub async fn enqueue(
        &self,
        text: impl Into<String>,
        priority: Priority,
        language: Language,
    ) -> Result<Option<AnnouncementId>> {
        let request = AnnouncementRequest::new(text, priority, language);
        self.dispatcher.enqueue(request).await
    }

    /// Queue an announcement in the current language
    pub async fn announce(
        &self,
        text: impl Into<String>,
        priority: Priority,
    ) -> Result<Option<AnnouncementId>> {
        let language = self.current_language();
        self.enqueue(text, priority, language).await
    }

    pub fn is_enabled(&self) -> bool {
        self.dispatcher.snapshot().enabled
    }

    pub fn synthesis_available(&self) -> bool {
        self.available
    }

    pub fn current_language(&self) -> Language {
        self.preference.read().language
    }

    pub fn current_language_tag(&self) -> &'static str {
        self.current_language().tag()
    }

    pub fn volume(&self) -> f32 {
        self.preference.read().volume
    }

    /// Text being spoken right now; empty when idle
    pub fn current_announcement_text(&self) -> String {
        self.dispatcher.snapshot().current_text.unwrap_or_default()
    }

    pub fn state(&self) -> PlaybackState {
        self.dispatcher.snapshot().state
    }

    pub fn snapshot(&self) -> DispatcherSnapshot {
        self.dispatcher.snapshot()
    }

    pub fn watch(&self) -> watch::Receiver<DispatcherSnapshot> {
        self.dispatcher.watch()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.dispatcher.subscribe()
    }

    pub fn settings(&self) -> Settings {
        let pref = *self.preference.read();
        Settings {
            enabled: self.is_enabled(),
            language: pref.language,
            volume: pref.volume,
        }
    }

    /// Stop playback and end the dispatcher task. Later calls that need the
    /// dispatcher report `DispatcherClosed`.
    pub async fn shutdown(&self) -> Result<()> {
        match self.dispatcher.shutdown().await {
            Ok(()) | Err(BusVoiceError::DispatcherClosed) => {}
            Err(e) => return Err(e),
        }
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(target: "controller", error = %e, "Dispatcher task ended abnormally");
            }
        }
        info!(target: "controller", "Voice assistant shut down");
        Ok(())
    }

    fn persist(&self) {
        let _guard = self.persisting.lock();
        let settings = self.settings();
        if let Err(e) = self.store.save(&settings) {
            warn!(target: "controller", error = %e, "Failed to persist settings");
        }
    }
}

//! Speech sink without audio
//!
//! Logs each announcement and completes after roughly the time it would take
//! to say it. Used when no TTS engine is installed and in demos.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use busvoice_core::{Language, Result, SpeechSink, Utterance, VoiceProfile};
use tokio::sync::watch;
use tracing::{debug, info};

pub struct LogSink {
    per_char: Duration,
    max: Duration,
    /// Bumped by `stop`
    interrupt: watch::Sender<u64>,
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new(Duration::from_millis(60), Duration::from_secs(8))
    }
}

impl LogSink {
    pub fn new(per_char: Duration, max: Duration) -> Self {
        Self {
            per_char,
            max,
            interrupt: watch::channel(0).0,
        }
    }

    /// Simulated speaking time; slower rates take longer
    pub fn duration_for(&self, utterance: &Utterance) -> Duration {
        let chars = utterance.text.chars().count() as u32;
        let base = self.per_char.saturating_mul(chars);
        base.div_f32(utterance.rate.max(0.1)).min(self.max)
    }
}

#[async_trait]
impl SpeechSink for LogSink {
    fn name(&self) -> String {
        "log".to_string()
    }

    fn is_available(&self) -> bool {
        true
    }

    /// One pseudo voice per catalog language; English is the default
    async fn list_voices(&self) -> Vec<VoiceProfile> {
        Language::ALL
            .into_iter()
            .map(|lang| {
                let voice = VoiceProfile::new(lang.tag(), format!("log {}", lang.name()));
                if lang == Language::English {
                    voice.as_default()
                } else {
                    voice
                }
            })
            .collect()
    }

    // Not `async fn`: the interrupt subscription is taken when `speak` is
    // called, so a `stop` issued before the first poll still applies.
    fn speak<'life0, 'async_trait>(
        &'life0 self,
        utterance: Utterance,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'async_trait>>
    where
        'life0: 'async_trait,
        Self: 'async_trait,
    {
        let mut interrupted = self.interrupt.subscribe();
        Box::pin(async move {
            let duration = self.duration_for(&utterance);
            info!(
                target: "tts",
                language = %utterance.language,
                voice = utterance.voice.as_ref().map(|v| v.display_name.as_str()).unwrap_or("-"),
                volume = utterance.volume,
                rate = utterance.rate,
                text = %utterance.text,
                "Announcement"
            );
            tokio::select! {
                _ = tokio::time::sleep(duration) => {}
                _ = interrupted.changed() => {
                    debug!(target: "tts", "Announcement interrupted");
                }
            }
            Ok(())
        })
    }

    async fn stop(&self) {
        self.interrupt.send_modify(|n| *n = n.wrapping_add(1));
    }
}

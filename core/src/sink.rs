//! Notification sink seam
//!
//! The sink is the single audio output. Only the dispatcher calls it.

use async_trait::async_trait;

use crate::language::Language;
use crate::voice::VoiceProfile;
use crate::Result;

/// Everything a sink needs to render one announcement
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub language: Language,
    /// `None` lets the sink use its own default voice
    pub voice: Option<VoiceProfile>,
    /// 0.0..=1.0
    pub volume: f32,
    /// Relative speaking rate, 1.0 is the engine's normal pace
    pub rate: f32,
}

/// Trait implemented by concrete speech outputs (CLI engines, log-only, test doubles)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechSink: Send + Sync {
    /// Short engine name for logs
    fn name(&self) -> String;

    /// Whether speech output exists at all on this host
    fn is_available(&self) -> bool;

    /// Voices currently offered, in a stable order
    async fn list_voices(&self) -> Vec<VoiceProfile>;

    /// Render one utterance. Resolving `Ok` means it completed, `Err` that it
    /// failed; either way exactly once per call.
    async fn speak(&self, utterance: Utterance) -> Result<()>;

    /// Best-effort abort of every `speak` call made before this one, including
    /// calls whose future has not been polled yet
    async fn stop(&self);
}

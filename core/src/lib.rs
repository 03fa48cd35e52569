// BusVoice Core Library
// Multilingual announcement dispatcher runtime

pub mod announcement;
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod language;
pub mod queue;
pub mod settings;
pub mod sink;
pub mod voice;

// Export core types
pub use announcement::{Announcement, AnnouncementId, AnnouncementRequest, Priority};
pub use config::{AssistantConfig, Audience, LifecyclePrompts};
pub use controller::LifecycleController;
pub use dispatcher::{DispatchEvent, DispatcherConfig, DispatcherSnapshot, PlaybackState};
pub use language::{Language, LanguageTable};
pub use queue::AnnouncementQueue;
pub use settings::{FileSettingsStore, MemorySettingsStore, Settings, SettingsStore};
pub use sink::{SpeechSink, Utterance};
pub use voice::{resolve, MatchTier, VoiceMatch, VoiceProfile};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BusVoiceError {
    #[error("Invalid announcement: {0}")]
    InvalidAnnouncement(String),

    #[error("Speech synthesis unavailable: {0}")]
    SynthesisUnavailable(String),

    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Missing entry for language {0}")]
    MissingLanguageEntry(String),

    #[error("Dispatcher closed")]
    DispatcherClosed,

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML decode error: {0}")]
    TomlDecode(#[from] toml::de::Error),

    #[error("TOML encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),
}
pub type Result<T> = std::result::Result<T, BusVoiceError>;

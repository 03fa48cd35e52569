use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use busvoice_audio::{CommandSinkConfig, Engine};
use busvoice_core::config::env_flag;
use busvoice_core::{AssistantConfig, Audience, Language, LifecyclePrompts};

/// High-level configuration for the announcer demo
#[derive(Clone, Debug)]
pub struct AnnouncerConfig {
    pub assistant: AssistantConfig,
    pub tts: CommandSinkConfig,
    /// Where enabled/language/volume are persisted
    pub settings_path: PathBuf,
    /// Skip engine detection and only log announcements
    pub log_only: bool,
}

impl Default for AnnouncerConfig {
    fn default() -> Self {
        Self {
            assistant: AssistantConfig::default(),
            tts: CommandSinkConfig::default(),
            settings_path: std::env::var("ANNOUNCER_SETTINGS")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("announcer_settings.toml")),
            log_only: std::env::var("ANNOUNCER_LOG_ONLY")
                .map(|s| env_flag(&s))
                .unwrap_or(false),
        }
    }
}

impl AnnouncerConfig {
    /// Load configuration from a TOML file (path via ANNOUNCER_CONFIG or ./announcer.toml),
    /// overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let default = Self::default();
        let path = std::env::var("ANNOUNCER_CONFIG").unwrap_or_else(|_| "announcer.toml".into());
        let p = Path::new(&path);
        if !p.exists() {
            tracing::info!(target: "announcer", path = %path, "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(p) {
            Ok(s) => match toml::from_str::<AnnouncerToml>(&s) {
                Ok(t) => t.overlay(default),
                Err(e) => {
                    tracing::warn!(target: "announcer", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target: "announcer", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }
}

fn parse_tag(tag: &str) -> Option<Language> {
    match tag.parse::<Language>() {
        Ok(lang) => Some(lang),
        Err(e) => {
            tracing::warn!(target: "announcer", error = %e, "Ignoring language in config");
            None
        }
    }
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct AnnouncerToml {
    pub cooldown_ms: Option<u64>,
    pub languages: Option<Vec<String>>,
    pub lifecycle_prompts: Option<bool>,
    pub audience: Option<Audience>,
    pub settings_path: Option<PathBuf>,
    pub log_only: Option<bool>,
    pub defaults: Option<DefaultsToml>,
    /// Keyed by language tag
    pub prompts: Option<HashMap<String, LifecyclePrompts>>,
    pub tts: Option<TtsToml>,
}

impl AnnouncerToml {
    fn overlay(self, mut base: AnnouncerConfig) -> AnnouncerConfig {
        let a = &mut base.assistant;
        if let Some(x) = self.cooldown_ms {
            a.dispatcher.cooldown = Duration::from_millis(x);
        }
        if let Some(x) = self.languages {
            let langs: Vec<Language> = x.iter().filter_map(|t| parse_tag(t)).collect();
            if !langs.is_empty() {
                a.languages = langs;
            }
        }
        if let Some(x) = self.lifecycle_prompts {
            a.lifecycle_prompts = x;
        }
        if let Some(x) = self.audience {
            a.audience = x;
        }
        if let Some(d) = self.defaults {
            d.apply(a);
        }
        if let Some(prompts) = self.prompts {
            for (tag, p) in prompts {
                if let Some(lang) = parse_tag(&tag) {
                    a.prompts.insert(lang, p);
                }
            }
        }
        if let Some(x) = self.settings_path {
            base.settings_path = x;
        }
        if let Some(x) = self.log_only {
            base.log_only = x;
        }
        if let Some(t) = self.tts {
            t.apply(&mut base.tts);
        }
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct DefaultsToml {
    pub enabled: Option<bool>,
    pub language: Option<String>,
    pub volume: Option<f32>,
}
impl DefaultsToml {
    fn apply(self, a: &mut AssistantConfig) {
        if let Some(x) = self.enabled {
            a.initial.enabled = x;
        }
        if let Some(lang) = self.language.as_deref().and_then(parse_tag) {
            a.initial.language = lang;
        }
        if let Some(x) = self.volume {
            a.initial.volume = x;
            a.initial = a.initial.clone().sanitized();
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct TtsToml {
    pub engine: Option<Engine>,
    pub piper_bin: Option<PathBuf>,
    pub piper_voice: Option<PathBuf>,
    pub piper_voice_dir: Option<PathBuf>,
    pub espeak_bin: Option<PathBuf>,
    pub player: Option<String>,
    pub timeout_ms: Option<u64>,
    pub sample_rate: Option<u32>,
    pub temp_dir: Option<PathBuf>,
}
impl TtsToml {
    fn apply(self, t: &mut CommandSinkConfig) {
        if let Some(x) = self.engine {
            t.prefer = Some(x);
        }
        if let Some(x) = self.piper_bin {
            t.piper_bin = Some(x);
        }
        if let Some(x) = self.piper_voice {
            t.piper_voice = Some(x);
        }
        if let Some(x) = self.piper_voice_dir {
            t.piper_voice_dir = Some(x);
        }
        if let Some(x) = self.espeak_bin {
            t.espeak_bin = Some(x);
        }
        if let Some(x) = self.player {
            t.player = Some(x);
        }
        if let Some(x) = self.timeout_ms {
            t.timeout_ms = x;
        }
        if let Some(x) = self.sample_rate {
            t.sample_rate = x;
        }
        if let Some(x) = self.temp_dir {
            t.temp_dir = x;
        }
    }
}

//! Assistant configuration
//!
//! Defaults come from environment variables:
//! - BUSVOICE_COOLDOWN_MS (default 1000)
//! - BUSVOICE_LANGUAGES   comma-separated tags offered to users (default: whole catalog)
//! - BUSVOICE_LANGUAGE    startup language when nothing is stored (default: from LANG, else en-IN)
//! - BUSVOICE_VOLUME      startup volume when nothing is stored (default 0.8)
//! - BUSVOICE_ENABLED     startup enabled flag when nothing is stored (default false)
//! - BUSVOICE_AUDIENCE    passenger | driver (default passenger)
//! - BUSVOICE_LIFECYCLE_PROMPTS  speak welcome / language-switch prompts (default false)

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::dispatcher::DispatcherConfig;
use crate::language::{Language, LanguageTable};
use crate::settings::{clamp_volume, Settings, DEFAULT_VOLUME};
use crate::{BusVoiceError, Result};

/// Who the assistant is talking to; selects the welcome prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    #[default]
    Passenger,
    Driver,
}

impl FromStr for Audience {
    type Err = BusVoiceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "passenger" => Ok(Audience::Passenger),
            "driver" => Ok(Audience::Driver),
            other => Err(BusVoiceError::Config(format!("unknown audience '{}'", other))),
        }
    }
}

/// Spoken prompts for assistant lifecycle changes, in one language
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecyclePrompts {
    pub welcome_passenger: String,
    pub welcome_driver: String,
    pub language_switched: String,
}

impl LifecyclePrompts {
    pub fn welcome(&self, audience: Audience) -> &str {
        match audience {
            Audience::Passenger => &self.welcome_passenger,
            Audience::Driver => &self.welcome_driver,
        }
    }

    /// Prompts bundled with the assistant (English, Hindi, Tamil)
    pub fn builtin() -> LanguageTable<LifecyclePrompts> {
        LanguageTable::from_entries([
            (
                Language::English,
                LifecyclePrompts {
                    welcome_passenger: "Voice assistant activated. You'll receive updates about bus arrivals and stops.".into(),
                    welcome_driver: "Voice assistant activated. You'll receive navigation updates and alerts.".into(),
                    language_switched: "Language switched to English. Voice assistant is ready.".into(),
                },
            ),
            (
                Language::Hindi,
                LifecyclePrompts {
                    welcome_passenger: "वॉयस असिस्टेंट सक्रिय। आपको बस आगमन और स्टॉप के बारे में अपडेट मिलेंगे।".into(),
                    welcome_driver: "वॉयस असिस्टेंट सक्रिय। आपको नेवीगेशन अपडेट और अलर्ट मिलेंगे।".into(),
                    language_switched: "भाषा हिंदी में बदल दी गई। वॉयस असिस्टेंट तैयार है।".into(),
                },
            ),
            (
                Language::Tamil,
                LifecyclePrompts {
                    welcome_passenger: "குரல் உதவியாளர் செயல்படுத்தப்பட்டது. பேருந்து வருகை மற்றும் நிறுத்தங்கள் பற்றிய அப்டேட்களைப் பெறுவீர்கள்.".into(),
                    welcome_driver: "குரல் உதவியாளர் செயல்படுத்தப்பட்டது. வழிசெலுத்தல் அப்டேட்கள் மற்றும் எச்சரிக்கைகளைப் பெறுவீர்கள்.".into(),
                    language_switched: "மொழி தமிழுக்கு மாற்றப்பட்டது. குரல் உதவியாளர் தயார்.".into(),
                },
            ),
        ])
    }
}

#[derive(Clone, Debug)]
pub struct AssistantConfig {
    pub dispatcher: DispatcherConfig,
    /// Languages users may switch to
    pub languages: Vec<Language>,
    /// Used when the settings store has nothing saved
    pub initial: Settings,
    pub audience: Audience,
    pub lifecycle_prompts: bool,
    pub prompts: LanguageTable<LifecyclePrompts>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        let cooldown_ms = std::env::var("BUSVOICE_COOLDOWN_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(1000);
        let languages = std::env::var("BUSVOICE_LANGUAGES")
            .ok()
            .map(|s| parse_language_list(&s))
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| Language::ALL.to_vec());
        let language = std::env::var("BUSVOICE_LANGUAGE")
            .ok()
            .and_then(|s| s.parse::<Language>().ok())
            .or_else(|| {
                std::env::var("LANG")
                    .ok()
                    .and_then(|l| Language::detect(&l))
            })
            .unwrap_or(Language::English);
        let language = if languages.contains(&language) {
            language
        } else {
            languages.first().copied().unwrap_or(Language::English)
        };
        let volume = std::env::var("BUSVOICE_VOLUME")
            .ok()
            .and_then(|s| s.parse::<f32>().ok())
            .map(clamp_volume)
            .unwrap_or(DEFAULT_VOLUME);
        let enabled = std::env::var("BUSVOICE_ENABLED")
            .ok()
            .map(|s| env_flag(&s))
            .unwrap_or(false);
        let audience = std::env::var("BUSVOICE_AUDIENCE")
            .ok()
            .and_then(|s| s.parse::<Audience>().ok())
            .unwrap_or_default();
        let lifecycle_prompts = std::env::var("BUSVOICE_LIFECYCLE_PROMPTS")
            .ok()
            .map(|s| env_flag(&s))
            .unwrap_or(false);

        Self {
            dispatcher: DispatcherConfig {
                cooldown: Duration::from_millis(cooldown_ms),
                ..DispatcherConfig::default()
            },
            languages,
            initial: Settings {
                enabled,
                language,
                volume,
            },
            audience,
            lifecycle_prompts,
            prompts: LifecyclePrompts::builtin(),
        }
    }
}

impl AssistantConfig {
    /// Startup check: rejects configurations that would otherwise need a
    /// silent fallback later.
    pub fn validate(&self) -> Result<()> {
        if self.languages.is_empty() {
            return Err(BusVoiceError::Config(
                "at least one language must be offered".into(),
            ));
        }
        if !self.offers(self.initial.language) {
            return Err(BusVoiceError::UnsupportedLanguage(format!(
                "startup language {} is not among the offered languages",
                self.initial.language
            )));
        }
        if self.lifecycle_prompts {
            self.prompts.ensure_covers(&self.languages)?;
        }
        Ok(())
    }

    pub fn offers(&self, language: Language) -> bool {
        self.languages.contains(&language)
    }
}

/// Truthy env value: 1, true, yes or on, in any case
pub fn env_flag(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Comma-separated tags; unknown entries are logged and skipped
pub fn parse_language_list(s: &str) -> Vec<Language> {
    let mut out = Vec::new();
    for tag in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        match tag.parse::<Language>() {
            Ok(lang) if !out.contains(&lang) => out.push(lang),
            Ok(_) => {}
            Err(e) => warn!(target: "config", error = %e, "Ignoring language entry"),
        }
    }
    out
}

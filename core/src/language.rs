//! Language catalog
//!
//! Closed set of languages the assistant can announce in, with display metadata,
//! plus [`LanguageTable`], a per-language mapping that is checked for coverage
//! once at startup instead of falling back to a default at lookup time.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{BusVoiceError, Result};

/// Supported announcement languages (Indian locales)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "en-IN")]
    English,
    #[serde(rename = "hi-IN")]
    Hindi,
    #[serde(rename = "bn-IN")]
    Bengali,
    #[serde(rename = "ta-IN")]
    Tamil,
    #[serde(rename = "te-IN")]
    Telugu,
    #[serde(rename = "mr-IN")]
    Marathi,
    #[serde(rename = "gu-IN")]
    Gujarati,
    #[serde(rename = "kn-IN")]
    Kannada,
    #[serde(rename = "pa-IN")]
    Punjabi,
}

impl Language {
    pub const COUNT: usize = 9;

    /// Catalog order; also the order languages are offered to users.
    pub const ALL: [Language; Language::COUNT] = [
        Language::English,
        Language::Hindi,
        Language::Bengali,
        Language::Tamil,
        Language::Telugu,
        Language::Marathi,
        Language::Gujarati,
        Language::Kannada,
        Language::Punjabi,
    ];

    /// BCP-47 style locale tag, also used as the synthesis language tag
    pub fn tag(self) -> &'static str {
        match self {
            Language::English => "en-IN",
            Language::Hindi => "hi-IN",
            Language::Bengali => "bn-IN",
            Language::Tamil => "ta-IN",
            Language::Telugu => "te-IN",
            Language::Marathi => "mr-IN",
            Language::Gujarati => "gu-IN",
            Language::Kannada => "kn-IN",
            Language::Punjabi => "pa-IN",
        }
    }

    /// English display name
    pub fn name(self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Hindi => "Hindi",
            Language::Bengali => "Bengali",
            Language::Tamil => "Tamil",
            Language::Telugu => "Telugu",
            Language::Marathi => "Marathi",
            Language::Gujarati => "Gujarati",
            Language::Kannada => "Kannada",
            Language::Punjabi => "Punjabi",
        }
    }

    /// Name of the language in its own script
    pub fn native_name(self) -> &'static str {
        match self {
            Language::English => "English (India)",
            Language::Hindi => "हिन्दी",
            Language::Bengali => "বাংলা",
            Language::Tamil => "தமிழ்",
            Language::Telugu => "తెలుగు",
            Language::Marathi => "मराठी",
            Language::Gujarati => "ગુજરાતી",
            Language::Kannada => "ಕನ್ನಡ",
            Language::Punjabi => "ਪੰਜਾਬੀ",
        }
    }

    /// Base language subtag ("hi" for "hi-IN")
    pub fn base(self) -> &'static str {
        let tag = self.tag();
        &tag[..2]
    }

    /// Relative speaking rate handed to the sink. Non-English speech is slowed
    /// slightly for clarity.
    pub fn speech_rate(self) -> f32 {
        match self {
            Language::English => 0.9,
            _ => 0.8,
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    /// Pick a catalog language for a system locale such as `hi_IN.UTF-8` or
    /// `en-US`, matching on the base language only.
    pub fn detect(locale: &str) -> Option<Language> {
        let locale = locale
            .split(['.', '@'])
            .next()
            .unwrap_or_default()
            .trim();
        let base = locale.split(['-', '_']).next().unwrap_or_default();
        if base.is_empty() {
            return None;
        }
        Language::ALL
            .into_iter()
            .find(|l| l.base().eq_ignore_ascii_case(base))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Language {
    type Err = BusVoiceError;

    /// Parses a full tag, case-insensitive, `_` accepted as separator.
    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().replace('_', "-");
        Language::ALL
            .into_iter()
            .find(|l| l.tag().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| BusVoiceError::UnsupportedLanguage(s.to_string()))
    }
}

/// Per-language values, one slot per catalog language.
#[derive(Debug, Clone)]
pub struct LanguageTable<T> {
    slots: [Option<T>; Language::COUNT],
}

impl<T> Default for LanguageTable<T> {
    fn default() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }
}

impl<T> LanguageTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table; later entries for the same language replace earlier ones.
    pub fn from_entries(entries: impl IntoIterator<Item = (Language, T)>) -> Self {
        let mut table = Self::new();
        for (lang, value) in entries {
            table.insert(lang, value);
        }
        table
    }

    pub fn insert(&mut self, lang: Language, value: T) -> Option<T> {
        self.slots[lang.index()].replace(value)
    }

    pub fn get(&self, lang: Language) -> Option<&T> {
        self.slots[lang.index()].as_ref()
    }

    pub fn contains(&self, lang: Language) -> bool {
        self.slots[lang.index()].is_some()
    }

    /// Languages with an entry, in catalog order
    pub fn languages(&self) -> impl Iterator<Item = Language> + '_ {
        Language::ALL.into_iter().filter(|l| self.contains(*l))
    }

    /// Fails with [`BusVoiceError::MissingLanguageEntry`] naming every required
    /// language that has no entry.
    pub fn ensure_covers(&self, required: &[Language]) -> Result<()> {
        let missing: Vec<&str> = required
            .iter()
            .filter(|l| !self.contains(**l))
            .map(|l| l.tag())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(BusVoiceError::MissingLanguageEntry(missing.join(", ")))
        }
    }
}

//! Voice resolution
//!
//! Picks a synthesis voice for a language tag from the voices a sink reports,
//! through tiered fallback (first match wins):
//! 1. exact tag
//! 2. same base language ("hi" for "hi-IN")
//! 3. same region ("-IN"), or a voice whose name names the region's people
//! 4. the platform's default voice
//!
//! Within a tier the earliest voice in the input order is chosen, so the result
//! depends only on the arguments.

use serde::{Deserialize, Serialize};

/// A synthesis voice as reported by a sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub language_tag: String,
    pub display_name: String,
    /// Set on the platform's designated default voice
    #[serde(default)]
    pub is_fallback_default: bool,
}

impl VoiceProfile {
    pub fn new(language_tag: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            language_tag: language_tag.into(),
            display_name: display_name.into(),
            is_fallback_default: false,
        }
    }

    pub fn as_default(mut self) -> Self {
        self.is_fallback_default = true;
        self
    }
}

/// Which fallback tier produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    Exact,
    BaseLanguage,
    Region,
    PlatformDefault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceMatch<'a> {
    pub voice: &'a VoiceProfile,
    pub tier: MatchTier,
}

/// Normalized view of a locale tag: lowercase, `_` read as `-`.
#[derive(Debug)]
struct TagParts {
    full: String,
    base: String,
    region: Option<String>,
}

impl TagParts {
    fn parse(tag: &str) -> Self {
        let full = tag.trim().replace('_', "-").to_ascii_lowercase();
        let mut subtags = full.split('-');
        let base = subtags.next().unwrap_or_default().to_string();
        // Skip script subtags ("Deva"); a region is 2 letters or 3 digits
        let region = subtags
            .find(|s| {
                (s.len() == 2 && s.chars().all(|c| c.is_ascii_alphabetic()))
                    || (s.len() == 3 && s.chars().all(|c| c.is_ascii_digit()))
            })
            .map(str::to_string);
        Self { full, base, region }
    }
}

fn region_demonym(region: &str) -> Option<&'static str> {
    match region {
        "in" => Some("indian"),
        _ => None,
    }
}

/// Resolve the best voice for `language_tag`; `None` when `voices` is empty or
/// nothing (not even a default) qualifies.
pub fn resolve<'a>(language_tag: &str, voices: &'a [VoiceProfile]) -> Option<VoiceMatch<'a>> {
    if voices.is_empty() {
        return None;
    }
    let wanted = TagParts::parse(language_tag);
    let candidates: Vec<(TagParts, &VoiceProfile)> = voices
        .iter()
        .map(|v| (TagParts::parse(&v.language_tag), v))
        .collect();

    let hit = |tier: MatchTier, pred: &dyn Fn(&TagParts, &VoiceProfile) -> bool| {
        candidates
            .iter()
            .find(|(parts, voice)| pred(parts, voice))
            .map(|(_, voice)| VoiceMatch {
                voice: *voice,
                tier,
            })
    };

    hit(MatchTier::Exact, &|parts, _| {
        !wanted.full.is_empty() && parts.full == wanted.full
    })
    .or_else(|| {
        hit(MatchTier::BaseLanguage, &|parts, _| {
            !wanted.base.is_empty() && parts.base == wanted.base
        })
    })
    .or_else(|| {
        let region = wanted.region.as_deref()?;
        hit(MatchTier::Region, &|parts, voice| {
            parts.region.as_deref() == Some(region)
                || region_demonym(region).is_some_and(|d| {
                    voice.display_name.to_ascii_lowercase().contains(d)
                })
        })
    })
    .or_else(|| hit(MatchTier::PlatformDefault, &|_, voice| voice.is_fallback_default))
}

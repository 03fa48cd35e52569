//! Announcement values
//!
//! An [`Announcement`] is created once, when a request reaches the dispatcher,
//! and never mutated afterwards.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::language::Language;

/// Priority tier for selecting the next announcement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    /// Numeric rank used by queue selection (High=3, Medium=2, Low=1)
    pub fn rank(self) -> u8 {
        match self {
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl std::str::FromStr for Priority {
    type Err = crate::BusVoiceError;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" | "normal" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(crate::BusVoiceError::InvalidAnnouncement(format!(
                "unknown priority '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnnouncementId(pub u64);

impl fmt::Display for AnnouncementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What an announcement source submits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnouncementRequest {
    pub text: String,
    #[serde(default)]
    pub priority: Priority,
    pub language: Language,
}

impl AnnouncementRequest {
    pub fn new(text: impl Into<String>, priority: Priority, language: Language) -> Self {
        Self {
            text: text.into(),
            priority,
            language,
        }
    }
}

/// One unit of spoken content
#[derive(Debug, Clone, PartialEq)]
pub struct Announcement {
    id: AnnouncementId,
    text: String,
    priority: Priority,
    language: Language,
    created_at: u64,
}

impl Announcement {
    /// `created_at` is a logical clock reading, used only for tie-breaking.
    pub fn new(id: AnnouncementId, request: AnnouncementRequest, created_at: u64) -> Self {
        Self {
            id,
            text: request.text,
            priority: request.priority,
            language: request.language,
            created_at,
        }
    }

    pub fn id(&self) -> AnnouncementId {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }
}

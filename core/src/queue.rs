//! Pending announcement buffer with priority selection

use std::collections::HashSet;

use tracing::warn;

use crate::announcement::{Announcement, AnnouncementId};
use crate::{BusVoiceError, Result};

/// Ordered multiset of pending announcements.
///
/// Entries keep insertion order; the only reordering is the selection made by
/// [`AnnouncementQueue::dequeue_highest_priority`].
#[derive(Debug, Default)]
pub struct AnnouncementQueue {
    entries: Vec<Announcement>,
    ids: HashSet<AnnouncementId>,
}

impl AnnouncementQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an announcement. Blank text and duplicate ids are rejected and
    /// never reach the buffer.
    pub fn enqueue(&mut self, announcement: Announcement) -> Result<()> {
        if announcement.text().trim().is_empty() {
            warn!(target: "queue", id = %announcement.id(), "Dropping announcement with empty text");
            return Err(BusVoiceError::InvalidAnnouncement(
                "text is empty".to_string(),
            ));
        }
        if !self.ids.insert(announcement.id()) {
            warn!(target: "queue", id = %announcement.id(), "Dropping announcement with duplicate id");
            return Err(BusVoiceError::InvalidAnnouncement(format!(
                "duplicate id {}",
                announcement.id()
            )));
        }
        self.entries.push(announcement);
        Ok(())
    }

    /// Remove and return the highest-priority entry; earliest `created_at` wins
    /// within a tier.
    pub fn dequeue_highest_priority(&mut self) -> Option<Announcement> {
        let idx = self
            .entries
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                a.priority()
                    .rank()
                    .cmp(&b.priority().rank())
                    .then_with(|| b.created_at().cmp(&a.created_at()))
            })
            .map(|(i, _)| i)?;
        let next = self.entries.remove(idx);
        self.ids.remove(&next.id());
        Some(next)
    }

    /// Drop every pending entry; returns how many were dropped
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        self.ids.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pending entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Announcement> {
        self.entries.iter()
    }
}

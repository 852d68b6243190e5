use serde::{Deserialize, Serialize};
use tracing::debug;

pub mod prompts;

/// Which input source the client is currently working with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Welcome,
    StaticImage,
    RealtimeVideo,
}

impl Mode {
    /// True when an image source (static or live) is loaded
    pub fn has_source(self) -> bool {
        !matches!(self, Mode::Welcome)
    }
}

/// Independent visibility flags for the presentation layer.
///
/// The selector flag and the overlay flag are kept apart: the overlay can
/// be visible (streamed annotations) while the selector is disabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewFlags {
    pub selector_enabled: bool,
    pub overlay_visible: bool,
    pub chat_visible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Assistant,
}

/// Stable identity of a transcript entry. Async completions find their
/// entry through this, never through its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(pub u64);

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    pub id: EntryId,
    pub sender: Sender,
    pub text: String,
    pub placeholder: bool,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TranscriptError {
    #[error("transcript entry {0} does not exist")]
    UnknownEntry(EntryId),

    #[error("transcript entry {0} is not a pending placeholder")]
    AlreadyResolved(EntryId),
}

/// Chat transcript: append-only, with in-place resolution of placeholders
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
    next_id: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a user entry followed immediately by its assistant placeholder.
    ///
    /// Both entries are pushed under the same `&mut` borrow, so nothing can
    /// land between them.
    pub fn begin_exchange(
        &mut self,
        instruction: &str,
        placeholder_text: &str,
    ) -> (TranscriptEntry, TranscriptEntry) {
        let user = self.push(Sender::User, instruction.to_string(), false);
        let pending = self.push(Sender::Assistant, placeholder_text.to_string(), true);
        debug!(user = %user.id, placeholder = %pending.id, "Transcript exchange opened");
        (user, pending)
    }

    /// Replace a placeholder's text and mark it final. A placeholder can be
    /// resolved exactly once.
    pub fn resolve(&mut self, id: EntryId, text: &str) -> Result<TranscriptEntry, TranscriptError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(TranscriptError::UnknownEntry(id))?;

        if !entry.placeholder {
            return Err(TranscriptError::AlreadyResolved(id));
        }

        entry.text = text.to_string();
        entry.placeholder = false;
        Ok(entry.clone())
    }

    pub fn get(&self, id: EntryId) -> Option<&TranscriptEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of placeholders still waiting for a result
    pub fn unresolved(&self) -> usize {
        self.entries.iter().filter(|e| e.placeholder).count()
    }

    fn push(&mut self, sender: Sender, text: String, placeholder: bool) -> TranscriptEntry {
        let entry = TranscriptEntry {
            id: EntryId(self.next_id),
            sender,
            text,
            placeholder,
        };
        self.next_id += 1;
        self.entries.push(entry.clone());
        entry
    }
}

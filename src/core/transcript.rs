//! Append-only chat transcript in channel arrival order.

use workspace_protocol::UserRef;

/// Position of an entry in the transcript; equal to its index.
pub type EntrySeq = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryAuthor {
    /// The user of this workspace session (local echo).
    Local(UserRef),
    /// Another human member of the channel.
    Peer(UserRef),
    Assistant,
}

impl EntryAuthor {
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Local(user) | Self::Peer(user) => &user.email,
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryBody {
    Text(String),
    /// Decoded assistant message and the paths its patch touched.
    Assistant {
        text: String,
        changed_paths: Vec<String>,
    },
    /// Assistant body that could not be decoded, shown verbatim.
    Opaque { raw: String, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub seq: EntrySeq,
    pub author: EntryAuthor,
    pub body: EntryBody,
}

impl TranscriptEntry {
    #[must_use]
    pub fn display_text(&self) -> &str {
        match &self.body {
            EntryBody::Text(text) | EntryBody::Assistant { text, .. } => text,
            EntryBody::Opaque { raw, .. } => raw,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptLog {
    entries: Vec<TranscriptEntry>,
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, author: EntryAuthor, body: EntryBody) -> EntrySeq {
        let seq = self.entries.len();
        self.entries.push(TranscriptEntry { seq, author, body });
        seq
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, seq: EntrySeq) -> Option<&TranscriptEntry> {
        self.entries.get(seq)
    }

    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &TranscriptEntry> + '_ {
        self.entries.iter()
    }

    /// Entries appended at or after `seq`, for incremental rendering.
    pub fn since(&self, seq: EntrySeq) -> impl Iterator<Item = &TranscriptEntry> + '_ {
        self.entries.iter().skip(seq)
    }

    /// At most `limit` entries ending at the newest one.
    pub fn tail(&self, limit: usize) -> &[TranscriptEntry] {
        let start = self.entries.len().saturating_sub(limit);
        &self.entries[start..]
    }
}

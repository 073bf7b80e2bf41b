//! Topic and message data model.
//!
//! DESIGN
//! ======
//! One `Message` type serves three places: the remote wire format, the
//! local cache, and the in-memory view. Inbound field names accept both the
//! camelCase names the API documents and the legacy backend names
//! (`user_id`, `username`, `file_path`, `reply_to`, `chat_id`), so an older
//! server or an older cache entry still decodes.
//!
//! Topic ids are slugs derived from the display name at creation and never
//! change afterwards. The `general` topic always exists.

use std::fmt;

use rand::seq::IndexedRandom;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Id of the topic that always exists and cannot be deleted.
pub const GENERAL_TOPIC_ID: &str = "general";

/// Display name of the bootstrap topic.
pub const GENERAL_TOPIC_NAME: &str = "General";

/// Gradient tokens a new topic picks its color from.
pub const COLOR_PALETTE: [&str; 8] = [
    "linear-gradient(135deg, #1e3c72, #c9a9dd)",
    "linear-gradient(135deg, #2c5aa0, #b19cd9)",
    "linear-gradient(135deg, #1a237e, #d1c4e9)",
    "linear-gradient(135deg, #283593, #ce93d8)",
    "linear-gradient(135deg, #303f9f, #ba68c8)",
    "linear-gradient(135deg, #3949ab, #ab47bc)",
    "linear-gradient(135deg, #3f51b5, #9c27b0)",
    "linear-gradient(135deg, #1565c0, #e1bee7)",
];

/// Pick a random color token from [`COLOR_PALETTE`].
#[must_use]
pub fn random_color_token() -> &'static str {
    COLOR_PALETTE
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(COLOR_PALETTE[0])
}

/// Derive a topic id from a display name: lowercased, whitespace runs
/// collapsed to a single hyphen.
#[must_use]
pub fn slugify(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

// =============================================================================
// TOPIC
// =============================================================================

/// A chat topic (room). `pinned`, `has_unread` and `last_read_at` are local
/// UI state; the remote store never carries them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    pub name: String,
    #[serde(alias = "color")]
    pub color_token: String,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub has_unread: bool,
    /// Milliseconds since epoch of the last time the user viewed the topic.
    #[serde(default, alias = "lastRead")]
    pub last_read_at: i64,
}

impl Topic {
    /// The `general` topic in its bootstrap state.
    #[must_use]
    pub fn general(now_ms: i64) -> Self {
        Self {
            id: GENERAL_TOPIC_ID.to_owned(),
            name: GENERAL_TOPIC_NAME.to_owned(),
            color_token: COLOR_PALETTE[0].to_owned(),
            pinned: false,
            has_unread: false,
            last_read_at: now_ms,
        }
    }

    /// Adopt a topic the remote store knows about but this session has
    /// never seen. It has never been read.
    #[must_use]
    pub fn from_remote(remote: RemoteTopic) -> Self {
        Self {
            id: remote.id,
            name: remote.name,
            color_token: remote.color_token,
            pinned: false,
            has_unread: false,
            last_read_at: 0,
        }
    }

    #[must_use]
    pub fn is_general(&self) -> bool {
        self.id == GENERAL_TOPIC_ID
    }

    /// Wire form sent to `POST /topics`.
    #[must_use]
    pub fn to_remote(&self) -> RemoteTopic {
        RemoteTopic { id: self.id.clone(), name: self.name.clone(), color_token: self.color_token.clone() }
    }
}

/// Topic as the remote store lists it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTopic {
    pub id: String,
    pub name: String,
    #[serde(default, alias = "color")]
    pub color_token: String,
}

// =============================================================================
// MESSAGE ID
// =============================================================================

/// Server-issued integer ids, or client-issued time-ordered (v7) UUIDs for
/// optimistic entries that never reached the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Remote(i64),
    Local(Uuid),
}

impl MessageId {
    /// Fresh client-side id.
    #[must_use]
    pub fn new_local() -> Self {
        Self::Local(Uuid::now_v7())
    }

    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    #[must_use]
    pub fn as_remote(&self) -> Option<i64> {
        match self {
            Self::Remote(id) => Some(*id),
            Self::Local(_) => None,
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(id) => write!(f, "{id}"),
            Self::Local(id) => write!(f, "local:{id}"),
        }
    }
}

// =============================================================================
// MESSAGE
// =============================================================================

/// A chat message. A message with `reply_to_id` is a thread reply and stays
/// out of the main timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    #[serde(default, alias = "chat_id", alias = "topic_id")]
    pub topic_id: String,
    #[serde(default, alias = "user_id", deserialize_with = "string_or_number")]
    pub author_id: String,
    #[serde(default, alias = "username")]
    pub author_name: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, alias = "file_path")]
    pub attachment_ref: Option<String>,
    #[serde(with = "crate::clock::timestamp")]
    pub timestamp: i64,
    #[serde(default, alias = "reply_to", skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<MessageId>,
}

impl Message {
    #[must_use]
    pub fn is_reply(&self) -> bool {
        self.reply_to_id.is_some()
    }

    /// `true` for optimistic entries the server has not confirmed.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.id.is_local()
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
        Null(()),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
        Raw::Null(()) => String::new(),
    })
}

// =============================================================================
// AUTHOR / DRAFT
// =============================================================================

/// Sender identity, supplied by the enclosing page's auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub id: String,
    pub name: String,
}

impl Author {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into() }
    }
}

/// A file picked for upload alongside a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self { file_name: file_name.into(), bytes: bytes.into() }
    }

    /// Reference used for an attachment that only exists locally.
    #[must_use]
    pub fn local_ref(&self) -> String {
        format!("uploads/{}", self.file_name)
    }
}

/// What the user is about to send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub content: Option<String>,
    pub attachment: Option<Attachment>,
    pub reply_to: Option<MessageId>,
}

impl Draft {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: Some(content.into()), ..Self::default() }
    }

    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    #[must_use]
    pub fn reply_to(mut self, parent: MessageId) -> Self {
        self.reply_to = Some(parent);
        self
    }

    /// Text with surrounding whitespace removed, `None` when nothing is left.
    #[must_use]
    pub fn trimmed_content(&self) -> Option<&str> {
        self.content
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// A draft must carry text, an attachment, or both.
    #[must_use]
    pub fn is_sendable(&self) -> bool {
        self.trimmed_content().is_some() || self.attachment.is_some()
    }
}

#[cfg(test)]
#[path = "model_test.rs"]
mod tests;

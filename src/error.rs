//! Error types for the chat synchronization engine.
//!
//! ERROR HANDLING
//! ==============
//! `ChatError` is the only error a UI action can return, and only for user
//! mistakes (blank names, duplicates, empty sends). Remote and cache
//! failures have their own enums but are caught where they happen and
//! downgraded to a local fallback, so they rarely cross the public API.

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code and retryable flag, shared by every error enum here.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

// =============================================================================
// CHAT ERROR
// =============================================================================

/// User-facing rejections. None of these mutate state.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("topic name must not be blank")]
    BlankTopicName,

    #[error("a topic named '{0}' already exists")]
    DuplicateTopicName(String),

    /// Validation failure: a message needs text, an attachment, or both.
    #[error("message has no text and no attachment")]
    EmptyMessage,

    #[error("topic not found: {0}")]
    TopicNotFound(String),

    #[error("topic '{0}' cannot be deleted")]
    ProtectedTopic(String),

    #[error("reply parent not found in topic {topic_id}: {parent_id}")]
    ParentNotFound { topic_id: String, parent_id: String },

    /// Only raised while wiring a session, never from a UI action.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl ErrorCode for ChatError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::BlankTopicName => "E_BLANK_TOPIC_NAME",
            Self::DuplicateTopicName(_) => "E_DUPLICATE_TOPIC_NAME",
            Self::EmptyMessage => "E_VALIDATION",
            Self::TopicNotFound(_) => "E_TOPIC_NOT_FOUND",
            Self::ProtectedTopic(_) => "E_PROTECTED_TOPIC",
            Self::ParentNotFound { .. } => "E_PARENT_NOT_FOUND",
            Self::Remote(e) => e.error_code(),
        }
    }
}

// =============================================================================
// REMOTE ERROR
// =============================================================================

/// Failures talking to the remote store.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// Network-level failure: connect refused, timeout, reset.
    #[error("remote request failed: {0}")]
    Request(String),

    /// The remote answered with a non-success status.
    #[error("remote returned status {status}")]
    Status { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("remote response parse failed: {0}")]
    Parse(String),

    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl ErrorCode for RemoteError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Request(_) => "E_NETWORK_UNAVAILABLE",
            Self::Status { .. } => "E_REMOTE_STATUS",
            Self::Parse(_) => "E_REMOTE_PARSE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Status { status: 429 | 500..=599, .. })
    }
}

// =============================================================================
// CACHE ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache io failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache (de)serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ErrorCode for CacheError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Io(_) => "E_CACHE_IO",
            Self::Serialize(_) => "E_CACHE_SERIALIZE",
        }
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;

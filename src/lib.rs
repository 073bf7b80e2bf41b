//! # topicsync
//!
//! Topic-based chat synchronization. Keeps an in-memory view, a durable
//! local cache, and a remote authoritative store consistent over an
//! unreliable network by periodic polling rather than push.
//!
//! The enclosing page builds a [`ChatSession`] (directly, or from
//! [`SyncConfig::from_env`]) and hands it to a [`SyncScheduler`], which
//! keeps the active topic reconciled until it is stopped or dropped.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod messages;
pub mod model;
pub mod remote;
pub mod session;
pub mod sync;
pub mod topics;
pub mod unread;

pub use cache::{FileStore, KeyValueStore, MemoryStore, Persistence};
pub use config::SyncConfig;
pub use error::{CacheError, ChatError, ErrorCode, RemoteError};
pub use model::{Attachment, Author, Draft, Message, MessageId, Topic};
pub use remote::{HttpRemote, RemoteStore};
pub use session::{ChatSession, DeleteOutcome, SendOutcome, TickOutcome};
pub use sync::{SyncScheduler, SyncState};

//! Chat session: the service object the enclosing page holds.
//!
//! DESIGN
//! ======
//! `ChatSession` owns the in-memory view (`TopicStore`, `MessageStore`, the
//! active topic) behind one `RwLock`, the remote store seam, and the local
//! cache. It is cheap to clone; every clone shares the same view.
//!
//! UI actions mutate the view immediately and mirror the result into the
//! cache. Remote calls happen after the lock is released: collect under the
//! lock, do I/O lock-free. Each apply step takes the write lock once, so a
//! reader never sees a half-replaced list.
//!
//! ERROR HANDLING
//! ==============
//! Only user mistakes surface as `ChatError`. Remote failures are logged and
//! downgraded: pulls leave the view untouched, writes fall back to a
//! local-only mutation.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::{FileStore, Persistence};
use crate::clock::now_ms;
use crate::config::{DEFAULT_INLINE_REPLIES, SyncConfig};
use crate::error::ChatError;
use crate::messages::MessageStore;
use crate::model::{Author, Draft, GENERAL_TOPIC_ID, Message, MessageId, RemoteTopic, Topic};
use crate::remote::{HttpRemote, OutgoingMessage, RemoteStore};
use crate::topics::TopicStore;
use crate::unread;

// =============================================================================
// OUTCOMES
// =============================================================================

/// Result of one reconciliation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Both pulls succeeded and were applied. Carries the active topic after
    /// the apply, which differs from the polled one if it was removed.
    Reconciled { active_topic: String },
    /// A pull failed; nothing changed.
    Degraded,
    /// The polled topic is no longer active; the results were discarded.
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The remote accepted the message.
    Delivered,
    /// The remote was unreachable; the message is shown as an optimistic
    /// local entry until the next reconciliation replaces the list.
    Pending(Message),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// `true` when the deleted topic was active and `general` took over.
    pub active_reset: bool,
}

// =============================================================================
// VIEW
// =============================================================================

#[derive(Debug)]
struct ChatView {
    topics: TopicStore,
    messages: MessageStore,
    active_topic: String,
    reconciled_once: bool,
}

impl ChatView {
    fn new(now: i64) -> Self {
        Self {
            topics: TopicStore::bootstrap(now),
            messages: MessageStore::new(),
            active_topic: GENERAL_TOPIC_ID.to_owned(),
            reconciled_once: false,
        }
    }

    /// Replace the topic list, dropping messages of topics that vanished.
    /// Returns the removed ids.
    fn apply_topics(&mut self, snapshot: Vec<RemoteTopic>, now: i64) -> Vec<String> {
        let removed = self.topics.reconcile(snapshot, now);
        for id in &removed {
            self.messages.remove_topic(id);
        }
        if removed.contains(&self.active_topic) {
            self.reset_active(now);
        }
        removed
    }

    fn reset_active(&mut self, now: i64) {
        GENERAL_TOPIC_ID.clone_into(&mut self.active_topic);
        if let Some(general) = self.topics.get_mut(GENERAL_TOPIC_ID) {
            general.has_unread = false;
            general.last_read_at = now;
        }
    }

    fn recompute_unread(&mut self) {
        let changed = unread::recompute(&mut self.topics, &self.messages, &self.active_topic);
        if !changed.is_empty() {
            debug!(?changed, "sync: unread flags changed");
        }
    }

    fn messages_of(&self, topic_id: &str) -> (String, Vec<Message>) {
        (topic_id.to_owned(), self.messages.all(topic_id).to_vec())
    }
}

/// View state copied out under the lock, written to the cache after it is
/// released.
#[derive(Debug, Default)]
struct CacheWrite {
    topics: Option<Vec<Topic>>,
    messages: Vec<(String, Vec<Message>)>,
    cleared: Vec<String>,
}

impl CacheWrite {
    fn topics(view: &ChatView) -> Self {
        Self { topics: Some(view.topics.all().to_vec()), ..Self::default() }
    }

    fn apply(self, cache: &Persistence) {
        if let Some(topics) = &self.topics {
            cache.save_topics(topics);
        }
        for (topic_id, messages) in &self.messages {
            cache.save_messages(topic_id, messages);
        }
        for topic_id in &self.cleared {
            cache.clear_messages(topic_id);
        }
    }
}

// =============================================================================
// SESSION
// =============================================================================

#[derive(Clone)]
pub struct ChatSession {
    view: Arc<RwLock<ChatView>>,
    remote: Arc<dyn RemoteStore>,
    cache: Persistence,
    author: Author,
    inline_replies: usize,
}

impl ChatSession {
    pub fn new(remote: Arc<dyn RemoteStore>, cache: Persistence, author: Author) -> Self {
        Self {
            view: Arc::new(RwLock::new(ChatView::new(now_ms()))),
            remote,
            cache,
            author,
            inline_replies: DEFAULT_INLINE_REPLIES,
        }
    }

    /// Wire an HTTP-backed session from config. A cache directory that
    /// cannot be opened falls back to an in-memory cache.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Remote` if the HTTP client cannot be built.
    pub fn from_config(config: &SyncConfig, author: Author) -> Result<Self, ChatError> {
        let remote = HttpRemote::new(config)?;
        let cache = match &config.cache_dir {
            Some(dir) => match FileStore::open(dir) {
                Ok(store) => Persistence::new(Arc::new(store)),
                Err(e) => {
                    warn!(error = %e, dir = %dir.display(), "cache dir unavailable; using memory cache");
                    Persistence::in_memory()
                }
            },
            None => Persistence::in_memory(),
        };
        Ok(Self::new(Arc::new(remote), cache, author).with_inline_replies(config.inline_replies))
    }

    #[must_use]
    pub fn with_inline_replies(mut self, n: usize) -> Self {
        self.inline_replies = n;
        self
    }

    #[must_use]
    pub fn author(&self) -> &Author {
        &self.author
    }

    // =========================================================================
    // RECONCILIATION
    // =========================================================================

    /// Initial load: one remote pull, falling back to the cache on failure.
    pub async fn mount(&self) -> TickOutcome {
        let topic_id = self.active_topic().await;
        let outcome = match self.tick(&topic_id).await {
            TickOutcome::Degraded => {
                self.seed_from_cache().await;
                TickOutcome::Degraded
            }
            outcome => outcome,
        };
        info!(topic_id = %topic_id, ?outcome, "session mounted");
        outcome
    }

    /// One reconciliation pass for `topic_id`: pull topics and that topic's
    /// messages, then replace both wholesale. Applied only if both pulls
    /// succeed and `topic_id` is still the active topic.
    pub async fn tick(&self, topic_id: &str) -> TickOutcome {
        let (topics, messages) = tokio::join!(self.remote.list_topics(), self.remote.list_messages(topic_id));
        let (topics, messages) = match (topics, messages) {
            (Ok(topics), Ok(messages)) => (topics, messages),
            (Err(e), _) | (_, Err(e)) => {
                debug!(topic_id, error = %e, "sync: pull failed; keeping last good state");
                return TickOutcome::Degraded;
            }
        };

        let now = now_ms();
        let (outcome, write) = {
            let mut view = self.view.write().await;
            if view.active_topic != topic_id {
                debug!(topic_id, active = %view.active_topic, "sync: stale pull discarded");
                return TickOutcome::Stale;
            }

            let removed = view.apply_topics(topics, now);
            if view.topics.contains(topic_id) {
                view.messages.replace_from_remote(topic_id, messages);
            }
            view.recompute_unread();
            view.reconciled_once = true;

            let mut write = CacheWrite::topics(&view);
            if view.messages.is_loaded(topic_id) {
                write.messages.push(view.messages_of(topic_id));
            }
            if !removed.is_empty() {
                info!(?removed, "sync: topics removed remotely");
            }
            write.cleared = removed;
            (TickOutcome::Reconciled { active_topic: view.active_topic.clone() }, write)
        };
        write.apply(&self.cache);
        outcome
    }

    /// Pull the topic list alone and reconcile it.
    ///
    /// Returns `false` if the pull failed.
    pub async fn refresh_topics(&self) -> bool {
        let topics = match self.remote.list_topics().await {
            Ok(topics) => topics,
            Err(e) => {
                debug!(error = %e, "sync: topics pull failed");
                return false;
            }
        };
        let write = {
            let mut view = self.view.write().await;
            let removed = view.apply_topics(topics, now_ms());
            view.recompute_unread();
            view.reconciled_once = true;
            let mut write = CacheWrite::topics(&view);
            write.cleared = removed;
            write
        };
        write.apply(&self.cache);
        true
    }

    /// Pull message lists for every non-active topic so their unread flags
    /// can be derived. Each topic is applied on its own; failures are
    /// skipped. Returns how many topics were refreshed.
    pub async fn refresh_background(&self) -> usize {
        let targets: Vec<String> = {
            let view = self.view.read().await;
            view.topics
                .all()
                .iter()
                .filter(|t| t.id != view.active_topic)
                .map(|t| t.id.clone())
                .collect()
        };

        let mut refreshed = 0;
        for topic_id in targets {
            let messages = match self.remote.list_messages(&topic_id).await {
                Ok(messages) => messages,
                Err(e) => {
                    debug!(topic_id = %topic_id, error = %e, "sync: background pull failed");
                    continue;
                }
            };
            let write = {
                let mut view = self.view.write().await;
                // The user may have switched to it or deleted it meanwhile.
                if !view.topics.contains(&topic_id) || view.active_topic == topic_id {
                    continue;
                }
                view.messages.replace_from_remote(&topic_id, messages);
                view.recompute_unread();
                let mut write = CacheWrite::topics(&view);
                write.messages.push(view.messages_of(&topic_id));
                write
            };
            write.apply(&self.cache);
            refreshed += 1;
        }
        refreshed
    }

    async fn seed_from_cache(&self) {
        let cached_topics = self.cache.load_topics();
        let active = self.active_topic().await;
        let cached_messages = self.cache.load_messages(&active);

        let mut view = self.view.write().await;
        if view.reconciled_once {
            return;
        }
        let now = now_ms();
        if let Some(topics) = cached_topics {
            info!(count = topics.len(), "sync: topics seeded from cache");
            view.topics = TopicStore::from_cached(topics, now);
        }
        if !view.topics.contains(&view.active_topic) {
            view.reset_active(now);
        }
        if let Some(messages) = cached_messages {
            if view.active_topic == active && !view.messages.is_loaded(&active) {
                view.messages.seed(&active, messages);
            }
        }
        view.recompute_unread();
    }

    // =========================================================================
    // TOPIC ACTIONS
    // =========================================================================

    /// Make `topic_id` the active topic and mark it read. Messages not yet
    /// loaded are seeded from the cache until the next pull.
    ///
    /// # Errors
    ///
    /// `TopicNotFound` for an unknown id.
    pub async fn activate(&self, topic_id: &str) -> Result<(), ChatError> {
        let needs_seed = !self.view.read().await.messages.is_loaded(topic_id);
        let cached = if needs_seed { self.cache.load_messages(topic_id) } else { None };

        let write = {
            let mut view = self.view.write().await;
            if !view.topics.contains(topic_id) {
                return Err(ChatError::TopicNotFound(topic_id.to_owned()));
            }
            topic_id.clone_into(&mut view.active_topic);
            view.topics.mark_read(topic_id, now_ms())?;
            if let Some(messages) = cached {
                if !view.messages.is_loaded(topic_id) {
                    view.messages.seed(topic_id, messages);
                }
            }
            view.recompute_unread();
            CacheWrite::topics(&view)
        };
        write.apply(&self.cache);
        debug!(topic_id, "topic activated");
        Ok(())
    }

    /// Create a topic locally, then try to create it remotely. A failed
    /// remote create leaves the local topic in place until the next
    /// reconciliation.
    ///
    /// # Errors
    ///
    /// `BlankTopicName` or `DuplicateTopicName`; the view is unchanged.
    pub async fn create_topic(&self, name: &str) -> Result<Topic, ChatError> {
        let (topic, write) = {
            let mut view = self.view.write().await;
            let topic = view.topics.create(name, now_ms())?;
            (topic, CacheWrite::topics(&view))
        };
        write.apply(&self.cache);
        info!(topic_id = %topic.id, name = %topic.name, "topic created");

        match self.remote.create_topic(&topic.to_remote()).await {
            Ok(()) => {
                self.refresh_topics().await;
            }
            Err(e) => warn!(topic_id = %topic.id, error = %e, "remote topic create failed; kept locally"),
        }
        Ok(topic)
    }

    /// Delete a topic and its messages locally, then try remotely. If it was
    /// active, `general` becomes active.
    ///
    /// # Errors
    ///
    /// `ProtectedTopic` for `general`, `TopicNotFound` for an unknown id.
    pub async fn delete_topic(&self, topic_id: &str) -> Result<DeleteOutcome, ChatError> {
        let (active_reset, write) = {
            let mut view = self.view.write().await;
            view.topics.remove(topic_id)?;
            view.messages.remove_topic(topic_id);
            let active_reset = view.active_topic == topic_id;
            if active_reset {
                view.reset_active(now_ms());
            }
            view.recompute_unread();
            let mut write = CacheWrite::topics(&view);
            write.cleared.push(topic_id.to_owned());
            (active_reset, write)
        };
        write.apply(&self.cache);
        info!(topic_id, active_reset, "topic deleted");

        if let Err(e) = self.remote.delete_topic(topic_id).await {
            warn!(topic_id, error = %e, "remote topic delete failed; removed locally");
        }
        Ok(DeleteOutcome { active_reset })
    }

    /// Delete whichever topic is active.
    ///
    /// # Errors
    ///
    /// `ProtectedTopic` when `general` is active.
    pub async fn delete_active_topic(&self) -> Result<DeleteOutcome, ChatError> {
        let active = self.active_topic().await;
        self.delete_topic(&active).await
    }

    /// Flip a topic's pin flag. Local only.
    ///
    /// # Errors
    ///
    /// `TopicNotFound` for an unknown id.
    pub async fn toggle_pin(&self, topic_id: &str) -> Result<bool, ChatError> {
        let (pinned, write) = {
            let mut view = self.view.write().await;
            let pinned = view.topics.toggle_pin(topic_id)?;
            (pinned, CacheWrite::topics(&view))
        };
        write.apply(&self.cache);
        Ok(pinned)
    }

    /// # Errors
    ///
    /// `TopicNotFound` for an unknown id.
    pub async fn mark_read(&self, topic_id: &str) -> Result<(), ChatError> {
        let write = {
            let mut view = self.view.write().await;
            view.topics.mark_read(topic_id, now_ms())?;
            CacheWrite::topics(&view)
        };
        write.apply(&self.cache);
        Ok(())
    }

    // =========================================================================
    // SEND
    // =========================================================================

    /// Send a message. On success the topic's list is pulled again so the
    /// server copy replaces the view. On remote failure an optimistic entry
    /// with a local id is appended instead.
    ///
    /// A reply aimed at another reply joins that reply's thread. A reply to
    /// an optimistic entry is kept local, since the server cannot resolve
    /// its parent.
    ///
    /// # Errors
    ///
    /// `EmptyMessage` without text and attachment, `TopicNotFound`, or
    /// `ParentNotFound`. The view is unchanged on error.
    pub async fn send(&self, topic_id: &str, draft: Draft) -> Result<SendOutcome, ChatError> {
        if !draft.is_sendable() {
            return Err(ChatError::EmptyMessage);
        }
        let reply_to = {
            let view = self.view.read().await;
            if !view.topics.contains(topic_id) {
                return Err(ChatError::TopicNotFound(topic_id.to_owned()));
            }
            draft
                .reply_to
                .as_ref()
                .map(|target| view.messages.thread_root(topic_id, target))
                .transpose()?
        };

        let outgoing = OutgoingMessage {
            author_id: self.author.id.clone(),
            author_name: self.author.name.clone(),
            content: draft.trimmed_content().map(str::to_owned),
            reply_to_id: reply_to.as_ref().and_then(MessageId::as_remote),
            topic_id: topic_id.to_owned(),
        };

        let local_parent = reply_to.is_some_and(|id| id.is_local());
        let delivered = if local_parent {
            debug!(topic_id, "reply to pending message kept local");
            false
        } else {
            let result = match &draft.attachment {
                Some(attachment) => self.remote.upload(&outgoing, attachment).await,
                None => self.remote.post_message(&outgoing).await,
            };
            match result {
                Ok(()) => true,
                Err(e) => {
                    warn!(topic_id, error = %e, "send failed; storing optimistic entry");
                    false
                }
            }
        };

        if delivered {
            self.pull_messages(topic_id).await;
            return Ok(SendOutcome::Delivered);
        }

        let message = Message {
            id: MessageId::new_local(),
            topic_id: topic_id.to_owned(),
            author_id: outgoing.author_id,
            author_name: outgoing.author_name,
            content: outgoing.content,
            attachment_ref: draft.attachment.as_ref().map(|a| a.local_ref()),
            timestamp: now_ms(),
            reply_to_id: reply_to,
        };
        let write = {
            let mut view = self.view.write().await;
            // EDGE: the topic may have been deleted while the send was in flight.
            if !view.topics.contains(topic_id) {
                return Ok(SendOutcome::Pending(message));
            }
            view.messages.append_local(message.clone());
            view.recompute_unread();
            CacheWrite { messages: vec![view.messages_of(topic_id)], ..CacheWrite::default() }
        };
        write.apply(&self.cache);
        Ok(SendOutcome::Pending(message))
    }

    async fn pull_messages(&self, topic_id: &str) {
        let messages = match self.remote.list_messages(topic_id).await {
            Ok(messages) => messages,
            Err(e) => {
                debug!(topic_id, error = %e, "post-send pull failed");
                return;
            }
        };
        let write = {
            let mut view = self.view.write().await;
            if !view.topics.contains(topic_id) {
                return;
            }
            view.messages.replace_from_remote(topic_id, messages);
            view.recompute_unread();
            CacheWrite { messages: vec![view.messages_of(topic_id)], ..CacheWrite::default() }
        };
        write.apply(&self.cache);
    }

    // =========================================================================
    // READS
    // =========================================================================

    pub async fn active_topic(&self) -> String {
        self.view.read().await.active_topic.clone()
    }

    pub async fn topic(&self, topic_id: &str) -> Option<Topic> {
        self.view.read().await.topics.get(topic_id).cloned()
    }

    /// Topics in display order: pinned, then unread, then the rest.
    pub async fn sorted_topics(&self) -> Vec<Topic> {
        let view = self.view.read().await;
        view.topics.sorted_view().into_iter().cloned().collect()
    }

    pub async fn unread_topics(&self) -> Vec<String> {
        let view = self.view.read().await;
        unread::unread_topics(&view.topics)
            .into_iter()
            .map(str::to_owned)
            .collect()
    }

    /// Main timeline of a topic, oldest first.
    pub async fn main_messages(&self, topic_id: &str) -> Vec<Message> {
        let view = self.view.read().await;
        view.messages.list_main(topic_id).into_iter().cloned().collect()
    }

    pub async fn replies(&self, topic_id: &str, parent_id: &MessageId) -> Vec<Message> {
        let view = self.view.read().await;
        view.messages
            .list_replies(topic_id, parent_id)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Replies shown inline under a main message.
    pub async fn inline_replies(&self, topic_id: &str, parent_id: &MessageId) -> Vec<Message> {
        let view = self.view.read().await;
        view.messages
            .inline_replies(topic_id, parent_id, self.inline_replies)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Count for the "see N more replies" affordance.
    pub async fn reply_count_beyond(&self, topic_id: &str, parent_id: &MessageId) -> usize {
        let view = self.view.read().await;
        view.messages
            .reply_count_beyond(topic_id, parent_id, self.inline_replies)
    }

    pub async fn pending(&self, topic_id: &str) -> Vec<Message> {
        let view = self.view.read().await;
        view.messages.pending(topic_id).into_iter().cloned().collect()
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

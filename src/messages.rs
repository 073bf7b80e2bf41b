//! Message store: per-topic message lists, threads, and optimistic entries.
//!
//! DESIGN
//! ======
//! Each topic's list is kept oldest-first. The remote store lists newest
//! first, so `replace_from_remote` reverses exactly once per fetch.
//! Optimistic (local-id) entries are appended at the end and survive only
//! until the next successful replacement of that topic's list.
//!
//! Threads are one level deep. A reply aimed at another reply is stored
//! against that reply's root (see `thread_root`).

use std::collections::HashMap;

use crate::error::ChatError;
use crate::model::{Message, MessageId};

#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    by_topic: HashMap<String, Vec<Message>>,
}

impl MessageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` once a list (possibly empty) has been loaded for the topic.
    #[must_use]
    pub fn is_loaded(&self, topic_id: &str) -> bool {
        self.by_topic.contains_key(topic_id)
    }

    /// Every message in the topic, oldest first.
    #[must_use]
    pub fn all(&self, topic_id: &str) -> &[Message] {
        self.by_topic.get(topic_id).map(Vec::as_slice).unwrap_or_default()
    }

    #[must_use]
    pub fn find(&self, topic_id: &str, id: &MessageId) -> Option<&Message> {
        self.all(topic_id).iter().find(|m| &m.id == id)
    }

    /// Main timeline: messages without a parent, oldest first.
    #[must_use]
    pub fn list_main(&self, topic_id: &str) -> Vec<&Message> {
        self.all(topic_id).iter().filter(|m| !m.is_reply()).collect()
    }

    /// Replies whose parent is `parent_id`, oldest first.
    #[must_use]
    pub fn list_replies(&self, topic_id: &str, parent_id: &MessageId) -> Vec<&Message> {
        self.all(topic_id)
            .iter()
            .filter(|m| m.reply_to_id.as_ref() == Some(parent_id))
            .collect()
    }

    /// The first `n` replies, shown inline under the parent.
    #[must_use]
    pub fn inline_replies(&self, topic_id: &str, parent_id: &MessageId, n: usize) -> Vec<&Message> {
        let mut replies = self.list_replies(topic_id, parent_id);
        replies.truncate(n);
        replies
    }

    /// Replies not shown inline: total replies minus the first `n`.
    #[must_use]
    pub fn reply_count_beyond(&self, topic_id: &str, parent_id: &MessageId, n: usize) -> usize {
        self.list_replies(topic_id, parent_id).len().saturating_sub(n)
    }

    /// Optimistic entries the server has not confirmed.
    #[must_use]
    pub fn pending(&self, topic_id: &str) -> Vec<&Message> {
        self.all(topic_id).iter().filter(|m| m.is_pending()).collect()
    }

    /// Latest timestamp among main messages, if any.
    #[must_use]
    pub fn latest_main_timestamp(&self, topic_id: &str) -> Option<i64> {
        self.all(topic_id)
            .iter()
            .filter(|m| !m.is_reply())
            .map(|m| m.timestamp)
            .max()
    }

    /// Resolve the parent a new reply should be stored against.
    ///
    /// Replies to a reply are flattened onto that reply's own parent.
    ///
    /// # Errors
    ///
    /// `ParentNotFound` if the target is not a message of this topic.
    pub fn thread_root(&self, topic_id: &str, target: &MessageId) -> Result<MessageId, ChatError> {
        let parent = self
            .find(topic_id, target)
            .ok_or_else(|| ChatError::ParentNotFound { topic_id: topic_id.to_owned(), parent_id: target.to_string() })?;
        Ok(parent.reply_to_id.unwrap_or(parent.id))
    }

    // =========================================================================
    // MUTATION
    // =========================================================================

    /// Replace a topic's list with a remote snapshot given newest first.
    pub fn replace_from_remote(&mut self, topic_id: &str, newest_first: Vec<Message>) {
        let mut list = newest_first;
        list.reverse();
        for msg in &mut list {
            if msg.topic_id.is_empty() {
                msg.topic_id = topic_id.to_owned();
            }
        }
        // EDGE: every read filters by topic; drop rows the server filed elsewhere.
        list.retain(|m| m.topic_id == topic_id);
        self.by_topic.insert(topic_id.to_owned(), list);
    }

    /// Seed a topic's list from an oldest-first cached copy.
    pub fn seed(&mut self, topic_id: &str, oldest_first: Vec<Message>) {
        let list = oldest_first
            .into_iter()
            .filter(|m| m.topic_id.is_empty() || m.topic_id == topic_id)
            .map(|mut m| {
                m.topic_id = topic_id.to_owned();
                m
            })
            .collect();
        self.by_topic.insert(topic_id.to_owned(), list);
    }

    /// Append an optimistic entry at the end of its topic's list.
    pub fn append_local(&mut self, message: Message) {
        self.by_topic
            .entry(message.topic_id.clone())
            .or_default()
            .push(message);
    }

    pub fn remove_topic(&mut self, topic_id: &str) -> Option<Vec<Message>> {
        self.by_topic.remove(topic_id)
    }
}

#[cfg(test)]
#[path = "messages_test.rs"]
mod tests;

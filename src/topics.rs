//! Topic store: the set of chat topics and their local UI flags.
//!
//! DESIGN
//! ======
//! Topics live in a `Vec` in insertion (or server) order; that order is the
//! tie-breaker for `sorted_view`. The `general` topic is re-inserted at the
//! front whenever a load or reconciliation would drop it.
//!
//! Reconciliation replaces the list wholesale with the server's. Pin,
//! unread and last-read state are local only and are carried over by id.

use std::collections::HashMap;

use crate::error::ChatError;
use crate::model::{GENERAL_TOPIC_ID, RemoteTopic, Topic, random_color_token, slugify};

#[derive(Debug, Clone)]
pub struct TopicStore {
    topics: Vec<Topic>,
}

impl TopicStore {
    /// Fresh store holding only `general`.
    #[must_use]
    pub fn bootstrap(now_ms: i64) -> Self {
        Self { topics: vec![Topic::general(now_ms)] }
    }

    /// Store seeded from a cached list. Duplicate ids keep their first
    /// occurrence.
    #[must_use]
    pub fn from_cached(cached: Vec<Topic>, now_ms: i64) -> Self {
        let mut topics: Vec<Topic> = Vec::with_capacity(cached.len() + 1);
        for topic in cached {
            if !topics.iter().any(|t| t.id == topic.id) {
                topics.push(topic);
            }
        }
        let mut store = Self { topics };
        store.ensure_general(now_ms);
        store
    }

    #[must_use]
    pub fn all(&self) -> &[Topic] {
        &self.topics
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Topic> {
        self.topics.iter().find(|t| t.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Topic> {
        self.topics.iter_mut().find(|t| t.id == id)
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Topic> {
        self.topics.iter_mut()
    }

    // =========================================================================
    // USER ACTIONS
    // =========================================================================

    /// Create a topic with a random palette color.
    ///
    /// # Errors
    ///
    /// `BlankTopicName` for an empty or whitespace name, `DuplicateTopicName`
    /// when the name matches an existing topic case-insensitively or slugs to
    /// an id already in use. The store is unchanged on error.
    pub fn create(&mut self, name: &str, now_ms: i64) -> Result<Topic, ChatError> {
        self.create_with_color(name, random_color_token(), now_ms)
    }

    pub(crate) fn create_with_color(&mut self, name: &str, color_token: &str, now_ms: i64) -> Result<Topic, ChatError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ChatError::BlankTopicName);
        }

        let id = slugify(name);
        let lowered = name.to_lowercase();
        if self
            .topics
            .iter()
            .any(|t| t.name.to_lowercase() == lowered || t.id == id)
        {
            return Err(ChatError::DuplicateTopicName(name.to_owned()));
        }

        let topic = Topic {
            id,
            name: name.to_owned(),
            color_token: color_token.to_owned(),
            pinned: false,
            has_unread: false,
            last_read_at: now_ms,
        };
        self.topics.push(topic.clone());
        Ok(topic)
    }

    /// Remove a topic.
    ///
    /// # Errors
    ///
    /// `ProtectedTopic` for `general`, `TopicNotFound` for an unknown id.
    pub fn remove(&mut self, id: &str) -> Result<Topic, ChatError> {
        if id == GENERAL_TOPIC_ID {
            return Err(ChatError::ProtectedTopic(id.to_owned()));
        }
        let idx = self
            .topics
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| ChatError::TopicNotFound(id.to_owned()))?;
        Ok(self.topics.remove(idx))
    }

    /// Flip the pin flag, returning the new value.
    ///
    /// # Errors
    ///
    /// `TopicNotFound` for an unknown id.
    pub fn toggle_pin(&mut self, id: &str) -> Result<bool, ChatError> {
        let topic = self
            .get_mut(id)
            .ok_or_else(|| ChatError::TopicNotFound(id.to_owned()))?;
        topic.pinned = !topic.pinned;
        Ok(topic.pinned)
    }

    /// Clear the unread flag and stamp the last-read time.
    ///
    /// # Errors
    ///
    /// `TopicNotFound` for an unknown id.
    pub fn mark_read(&mut self, id: &str, now_ms: i64) -> Result<(), ChatError> {
        let topic = self
            .get_mut(id)
            .ok_or_else(|| ChatError::TopicNotFound(id.to_owned()))?;
        topic.has_unread = false;
        topic.last_read_at = now_ms;
        Ok(())
    }

    /// Topics for display: pinned first, then unread, then the rest.
    /// Order inside each class is the store order.
    #[must_use]
    pub fn sorted_view(&self) -> Vec<&Topic> {
        let mut view: Vec<&Topic> = self.topics.iter().collect();
        // sort_by_key is stable.
        view.sort_by_key(|t| display_class(t));
        view
    }

    // =========================================================================
    // RECONCILIATION
    // =========================================================================

    /// Replace the list with the server snapshot, carrying local flags over
    /// by id. Returns the ids that were present before and are now gone.
    pub fn reconcile(&mut self, snapshot: Vec<RemoteTopic>, now_ms: i64) -> Vec<String> {
        let mut previous: HashMap<String, Topic> = self
            .topics
            .drain(..)
            .map(|t| (t.id.clone(), t))
            .collect();

        let mut next: Vec<Topic> = Vec::with_capacity(snapshot.len() + 1);
        for remote in snapshot {
            if next.iter().any(|t| t.id == remote.id) {
                continue;
            }
            let topic = match previous.remove(&remote.id) {
                Some(local) => Topic {
                    color_token: if remote.color_token.is_empty() { local.color_token } else { remote.color_token },
                    id: remote.id,
                    name: remote.name,
                    pinned: local.pinned,
                    has_unread: local.has_unread,
                    last_read_at: local.last_read_at,
                },
                None => Topic::from_remote(remote),
            };
            next.push(topic);
        }

        // EDGE: a snapshot without `general` keeps the local one.
        if !next.iter().any(Topic::is_general) {
            if let Some(general) = previous.remove(GENERAL_TOPIC_ID) {
                next.insert(0, general);
            }
        }

        self.topics = next;
        self.ensure_general(now_ms);

        let mut removed: Vec<String> = previous.into_keys().collect();
        removed.sort();
        removed
    }

    fn ensure_general(&mut self, now_ms: i64) {
        if !self.topics.iter().any(Topic::is_general) {
            self.topics.insert(0, Topic::general(now_ms));
        }
    }
}

fn display_class(topic: &Topic) -> u8 {
    match (topic.pinned, topic.has_unread) {
        (true, _) => 0,
        (false, true) => 1,
        (false, false) => 2,
    }
}

#[cfg(test)]
#[path = "topics_test.rs"]
mod tests;

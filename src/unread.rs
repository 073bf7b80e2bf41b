//! Unread tracking: derives each topic's unread flag from its messages.
//!
//! A topic is unread when its newest main message is strictly newer than
//! the topic's last-read mark. The active topic is never unread: the user is
//! looking at it. Topics with no loaded main messages keep their flag.

use crate::messages::MessageStore;
use crate::topics::TopicStore;

/// Recompute unread flags for every topic. Returns the ids whose flag
/// changed, in store order.
pub fn recompute(topics: &mut TopicStore, messages: &MessageStore, active_topic: &str) -> Vec<String> {
    let mut changed = Vec::new();
    for topic in topics.iter_mut() {
        let next = if topic.id == active_topic {
            false
        } else {
            match messages.latest_main_timestamp(&topic.id) {
                Some(latest) => latest > topic.last_read_at,
                None => continue,
            }
        };
        if topic.has_unread != next {
            topic.has_unread = next;
            changed.push(topic.id.clone());
        }
    }
    changed
}

/// Ids of topics currently flagged unread, in store order.
#[must_use]
pub fn unread_topics(topics: &TopicStore) -> Vec<&str> {
    topics
        .all()
        .iter()
        .filter(|t| t.has_unread)
        .map(|t| t.id.as_str())
        .collect()
}

#[cfg(test)]
#[path = "unread_test.rs"]
mod tests;

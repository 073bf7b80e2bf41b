use super::test_helpers::{MockRemote, ann, session_with, session_with_cache};
use super::*;
use crate::model::Attachment;

fn ids(topics: &[Topic]) -> Vec<&str> {
    topics.iter().map(|t| t.id.as_str()).collect()
}

fn mock_with_random() -> Arc<MockRemote> {
    let remote = Arc::new(MockRemote::new());
    remote.add_topic("random", "Random");
    remote
}

/// Mounted session with `random` active and reconciled once.
async fn in_random(remote: &Arc<MockRemote>) -> ChatSession {
    let session = session_with(remote.clone());
    session.mount().await;
    session.activate("random").await.unwrap();
    session.tick("random").await;
    session
}

// =============================================================================
// construction
// =============================================================================

#[tokio::test]
async fn from_config_wires_http_remote_and_file_cache() {
    let dir = tempfile::tempdir().unwrap();
    let cache_dir = dir.path().join("cache");
    let config = SyncConfig { cache_dir: Some(cache_dir.clone()), inline_replies: 3, ..SyncConfig::default() };

    let session = ChatSession::from_config(&config, ann()).unwrap();
    session.toggle_pin("general").await.unwrap();

    assert_eq!(session.author(), &ann());
    assert_eq!(session.inline_replies, 3);
    assert!(cache_dir.join("chatrooms.json").exists());
}

// =============================================================================
// mount / tick
// =============================================================================

#[tokio::test]
async fn mount_reconciles_from_remote() {
    let remote = mock_with_random();
    let cache = Persistence::in_memory();
    let session = session_with_cache(remote.clone(), cache.clone());

    let outcome = session.mount().await;

    assert_eq!(outcome, TickOutcome::Reconciled { active_topic: "general".into() });
    assert_eq!(ids(&session.sorted_topics().await), ["general", "random"]);
    assert_eq!(cache.load_topics().map(|t| t.len()), Some(2));
}

#[tokio::test]
async fn mount_falls_back_to_cache_when_unreachable() {
    let remote = Arc::new(MockRemote::new());
    remote.set_reachable(false);
    let cache = Persistence::in_memory();
    cache.save_topics(&[Topic::general(0), Topic::from_remote(RemoteTopic {
        id: "ops".into(),
        name: "Ops".into(),
        color_token: "red".into(),
    })]);
    let cached = Message {
        id: MessageId::Remote(1),
        topic_id: "general".into(),
        author_id: "u2".into(),
        author_name: "Bob".into(),
        content: Some("from last time".into()),
        attachment_ref: None,
        timestamp: 100,
        reply_to_id: None,
    };
    cache.save_messages("general", &[cached.clone()]);
    let session = session_with_cache(remote, cache);

    assert_eq!(session.mount().await, TickOutcome::Degraded);
    assert_eq!(ids(&session.sorted_topics().await), ["general", "ops"]);
    assert_eq!(session.main_messages("general").await, [cached]);
}

#[tokio::test]
async fn mount_with_empty_cache_keeps_general() {
    let remote = Arc::new(MockRemote::new());
    remote.set_reachable(false);
    let session = session_with(remote);

    assert_eq!(session.mount().await, TickOutcome::Degraded);
    assert_eq!(ids(&session.sorted_topics().await), ["general"]);
    assert_eq!(session.active_topic().await, "general");
}

#[tokio::test]
async fn reconciliation_is_idempotent() {
    let remote = mock_with_random();
    remote.push_message("random", "one", 100, None);
    remote.push_message("random", "two", 200, None);
    let session = in_random(&remote).await;

    let topics_before = session.sorted_topics().await;
    let messages_before = session.main_messages("random").await;
    session.tick("random").await;

    assert_eq!(session.sorted_topics().await, topics_before);
    assert_eq!(session.main_messages("random").await, messages_before);
    assert_eq!(messages_before.len(), 2);
}

#[tokio::test]
async fn tick_orders_messages_oldest_first() {
    let remote = mock_with_random();
    remote.push_message("random", "one", 100, None);
    remote.push_message("random", "two", 200, None);
    let session = in_random(&remote).await;

    let contents: Vec<_> = session
        .main_messages("random")
        .await
        .into_iter()
        .filter_map(|m| m.content)
        .collect();
    assert_eq!(contents, ["one", "two"]);
}

#[tokio::test]
async fn degraded_tick_does_not_mutate() {
    let remote = mock_with_random();
    remote.push_message("random", "one", 100, None);
    let session = in_random(&remote).await;
    let topics_before = session.sorted_topics().await;
    let messages_before = session.main_messages("random").await;

    remote.push_message("random", "two", 200, None);
    remote.add_topic("ops", "Ops");
    remote.set_topics_reachable(false);

    assert_eq!(session.tick("random").await, TickOutcome::Degraded);
    assert_eq!(session.sorted_topics().await, topics_before);
    assert_eq!(session.main_messages("random").await, messages_before);
}

#[tokio::test]
async fn stale_tick_is_discarded() {
    let remote = mock_with_random();
    remote.push_message("random", "one", 100, None);
    let session = session_with(remote.clone());
    session.mount().await;

    assert_eq!(session.tick("random").await, TickOutcome::Stale);
    assert!(session.main_messages("random").await.is_empty());
}

#[tokio::test]
async fn remote_removal_of_active_topic_resets_to_general() {
    let remote = mock_with_random();
    let cache = Persistence::in_memory();
    let session = session_with_cache(remote.clone(), cache.clone());
    session.mount().await;
    session.activate("random").await.unwrap();

    remote.remove_topic("random");

    assert_eq!(session.tick("random").await, TickOutcome::Reconciled { active_topic: "general".into() });
    assert_eq!(session.active_topic().await, "general");
    assert!(session.topic("random").await.is_none());
    assert!(cache.load_messages("random").is_none());
}

#[tokio::test]
async fn active_reset_marks_general_read() {
    let remote = mock_with_random();
    let session = in_random(&remote).await;
    remote.push_message("general", "missed", now_ms() + 60_000, None);
    session.refresh_background().await;
    assert_eq!(session.unread_topics().await, ["general"]);

    let before = now_ms();
    remote.remove_topic("random");
    session.tick("random").await;

    let general = session.topic("general").await.unwrap();
    assert!(!general.has_unread);
    assert!(general.last_read_at >= before);
}

#[tokio::test]
async fn local_flags_survive_reconciliation() {
    let remote = mock_with_random();
    let session = in_random(&remote).await;
    session.activate("general").await.unwrap();

    assert!(session.toggle_pin("random").await.unwrap());
    session.tick("general").await;

    assert!(session.topic("random").await.unwrap().pinned);
    assert_eq!(ids(&session.sorted_topics().await), ["random", "general"]);
}

#[tokio::test]
async fn background_refresh_derives_unread_for_inactive_topics() {
    let remote = mock_with_random();
    remote.add_topic("ops", "Ops");
    let session = session_with(remote.clone());
    session.mount().await;
    remote.push_message("random", "ping", 100, None);

    assert_eq!(session.refresh_background().await, 2);

    assert_eq!(session.unread_topics().await, ["random"]);
    assert_eq!(ids(&session.sorted_topics().await), ["random", "general", "ops"]);
}

#[tokio::test]
async fn background_refresh_skips_failures() {
    let remote = mock_with_random();
    let session = session_with(remote.clone());
    session.mount().await;
    remote.set_reachable(false);

    assert_eq!(session.refresh_background().await, 0);
}

// =============================================================================
// topic actions
// =============================================================================

#[tokio::test]
async fn activate_marks_read_and_rejects_unknown() {
    let remote = mock_with_random();
    let session = session_with(remote.clone());
    session.mount().await;
    remote.push_message("random", "ping", 100, None);
    session.refresh_background().await;
    assert!(session.topic("random").await.unwrap().has_unread);

    session.activate("random").await.unwrap();

    let random = session.topic("random").await.unwrap();
    assert!(!random.has_unread);
    assert!(random.last_read_at > 100);
    assert!(matches!(session.activate("nope").await, Err(ChatError::TopicNotFound(_))));
    assert_eq!(session.active_topic().await, "random");
}

#[tokio::test]
async fn activate_seeds_unloaded_topic_from_cache() {
    let remote = mock_with_random();
    let cache = Persistence::in_memory();
    let cached = Message {
        id: MessageId::Remote(9),
        topic_id: "random".into(),
        author_id: "u2".into(),
        author_name: "Bob".into(),
        content: Some("cached".into()),
        attachment_ref: None,
        timestamp: 100,
        reply_to_id: None,
    };
    cache.save_messages("random", &[cached.clone()]);
    let session = session_with_cache(remote, cache);
    session.mount().await;

    session.activate("random").await.unwrap();

    assert_eq!(session.main_messages("random").await, [cached]);
}

#[tokio::test]
async fn create_topic_reaches_remote() {
    let remote = Arc::new(MockRemote::new());
    let session = session_with(remote.clone());
    session.mount().await;

    let topic = session.create_topic("  Team Sync ").await.unwrap();

    assert_eq!(topic.id, "team-sync");
    assert_eq!(topic.name, "Team Sync");
    assert!(remote.topic_ids().contains(&"team-sync".to_owned()));
    assert!(session.topic("team-sync").await.is_some());
}

#[tokio::test]
async fn create_topic_rejects_blank_and_duplicate() {
    let remote = Arc::new(MockRemote::new());
    let session = session_with(remote.clone());
    session.mount().await;
    session.create_topic("Team Sync").await.unwrap();

    assert!(matches!(session.create_topic("   ").await, Err(ChatError::BlankTopicName)));
    assert!(matches!(session.create_topic("team sync").await, Err(ChatError::DuplicateTopicName(_))));
    assert!(matches!(session.create_topic("GENERAL").await, Err(ChatError::DuplicateTopicName(_))));
    assert_eq!(session.sorted_topics().await.len(), 2);
}

#[tokio::test]
async fn offline_create_stays_local_until_reconciliation() {
    let remote = Arc::new(MockRemote::new());
    let session = session_with(remote.clone());
    session.mount().await;
    remote.set_reachable(false);

    session.create_topic("Ops").await.unwrap();
    assert!(session.topic("ops").await.is_some());

    remote.set_reachable(true);
    session.tick("general").await;
    assert!(session.topic("ops").await.is_none());
}

#[tokio::test]
async fn deleting_active_topic_resets_to_general_and_clears_both_stores() {
    let remote = mock_with_random();
    remote.push_message("random", "one", 100, None);
    let cache = Persistence::in_memory();
    let session = session_with_cache(remote.clone(), cache.clone());
    session.mount().await;
    session.activate("random").await.unwrap();
    session.tick("random").await;
    assert!(cache.load_messages("random").is_some());

    let outcome = session.delete_topic("random").await.unwrap();

    assert!(outcome.active_reset);
    assert_eq!(session.active_topic().await, "general");
    assert!(session.topic("random").await.is_none());
    assert!(session.main_messages("random").await.is_empty());
    assert!(cache.load_messages("random").is_none());
    assert_eq!(remote.deleted(), ["random"]);
}

#[tokio::test]
async fn offline_delete_still_removes_locally() {
    let remote = mock_with_random();
    let session = in_random(&remote).await;
    remote.set_reachable(false);

    let outcome = session.delete_active_topic().await.unwrap();

    assert!(outcome.active_reset);
    assert!(session.topic("random").await.is_none());
    assert!(remote.deleted().is_empty());
}

#[tokio::test]
async fn general_cannot_be_deleted() {
    let remote = Arc::new(MockRemote::new());
    let session = session_with(remote);
    session.mount().await;

    assert!(matches!(session.delete_topic("general").await, Err(ChatError::ProtectedTopic(_))));
    assert!(matches!(session.delete_active_topic().await, Err(ChatError::ProtectedTopic(_))));
    assert!(session.topic("general").await.is_some());
}

// =============================================================================
// send
// =============================================================================

#[tokio::test]
async fn reachable_send_is_replaced_by_server_copy() {
    let remote = mock_with_random();
    let session = in_random(&remote).await;

    let outcome = session.send("random", Draft::text("M1")).await.unwrap();

    assert_eq!(outcome, SendOutcome::Delivered);
    let main = session.main_messages("random").await;
    assert_eq!(main.len(), 1);
    assert!(matches!(main[0].id, MessageId::Remote(_)));
    assert_eq!(main[0].content.as_deref(), Some("M1"));
    assert!(session.pending("random").await.is_empty());

    session.activate("general").await.unwrap();
    session.activate("random").await.unwrap();
    assert!(!session.topic("random").await.unwrap().has_unread);
}

#[tokio::test]
async fn unreachable_send_is_optimistic_and_lost_on_reconnect() {
    let remote = mock_with_random();
    let cache = Persistence::in_memory();
    let session = session_with_cache(remote.clone(), cache.clone());
    session.mount().await;
    session.activate("random").await.unwrap();
    remote.set_reachable(false);

    let SendOutcome::Pending(pending) = session.send("random", Draft::text("M2")).await.unwrap() else {
        panic!("expected an optimistic entry");
    };

    assert!(pending.id.is_local());
    assert_eq!(session.main_messages("random").await, [pending.clone()]);
    assert_eq!(session.pending("random").await, [pending.clone()]);
    assert_eq!(cache.load_messages("random").unwrap(), [pending]);

    remote.set_reachable(true);
    session.tick("random").await;
    assert!(session.main_messages("random").await.is_empty());
}

#[tokio::test]
async fn empty_send_is_rejected() {
    let remote = mock_with_random();
    let session = in_random(&remote).await;

    assert!(matches!(session.send("random", Draft::default()).await, Err(ChatError::EmptyMessage)));
    assert!(matches!(session.send("random", Draft::text("   ")).await, Err(ChatError::EmptyMessage)));
    assert!(remote.posted().is_empty());
}

#[tokio::test]
async fn send_to_unknown_topic_is_rejected() {
    let remote = Arc::new(MockRemote::new());
    let session = session_with(remote.clone());
    assert!(matches!(session.send("nope", Draft::text("x")).await, Err(ChatError::TopicNotFound(_))));
    assert!(remote.posted().is_empty());
}

#[tokio::test]
async fn send_trims_text() {
    let remote = mock_with_random();
    let session = in_random(&remote).await;
    session.send("random", Draft::text("  hi  ")).await.unwrap();
    assert_eq!(remote.posted()[0].content.as_deref(), Some("hi"));
}

#[tokio::test]
async fn attachment_send_uses_upload() {
    let remote = mock_with_random();
    let session = in_random(&remote).await;
    let draft = Draft::default().with_attachment(Attachment::new("plan.pdf", b"pdf".to_vec()));

    assert_eq!(session.send("random", draft).await.unwrap(), SendOutcome::Delivered);

    assert_eq!(remote.uploaded(), ["plan.pdf"]);
    let main = session.main_messages("random").await;
    assert_eq!(main[0].attachment_ref.as_deref(), Some("uploads/plan.pdf"));
    assert_eq!(main[0].content, None);
}

#[tokio::test]
async fn offline_attachment_keeps_local_reference() {
    let remote = mock_with_random();
    let session = in_random(&remote).await;
    remote.set_reachable(false);
    let draft = Draft::text("see file").with_attachment(Attachment::new("plan.pdf", b"pdf".to_vec()));

    let SendOutcome::Pending(pending) = session.send("random", draft).await.unwrap() else {
        panic!("expected an optimistic entry");
    };
    assert_eq!(pending.attachment_ref.as_deref(), Some("uploads/plan.pdf"));
    assert_eq!(pending.content.as_deref(), Some("see file"));
}

// =============================================================================
// threads
// =============================================================================

#[tokio::test]
async fn reply_appears_in_thread_not_main_timeline() {
    let remote = mock_with_random();
    let root = remote.push_message("random", "root", 100, None);
    let session = in_random(&remote).await;

    session
        .send("random", Draft::text("R1").reply_to(MessageId::Remote(root)))
        .await
        .unwrap();

    let replies = session.replies("random", &MessageId::Remote(root)).await;
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].content.as_deref(), Some("R1"));
    let main = session.main_messages("random").await;
    assert_eq!(main.len(), 1);
    assert_eq!(main[0].id, MessageId::Remote(root));
    assert_eq!(remote.posted()[0].reply_to_id, Some(root));
}

#[tokio::test]
async fn reply_to_reply_joins_root_thread() {
    let remote = mock_with_random();
    let root = remote.push_message("random", "root", 100, None);
    let reply = remote.push_message("random", "reply", 200, Some(root));
    let session = in_random(&remote).await;

    session
        .send("random", Draft::text("nested").reply_to(MessageId::Remote(reply)))
        .await
        .unwrap();

    assert_eq!(remote.posted()[0].reply_to_id, Some(root));
    assert_eq!(session.replies("random", &MessageId::Remote(root)).await.len(), 2);
    assert!(session.replies("random", &MessageId::Remote(reply)).await.is_empty());
}

#[tokio::test]
async fn reply_to_unknown_parent_is_rejected() {
    let remote = mock_with_random();
    let session = in_random(&remote).await;

    let result = session
        .send("random", Draft::text("orphan").reply_to(MessageId::Remote(42)))
        .await;

    assert!(matches!(result, Err(ChatError::ParentNotFound { .. })));
    assert!(remote.posted().is_empty());
}

#[tokio::test]
async fn reply_to_pending_parent_stays_local() {
    let remote = mock_with_random();
    let session = in_random(&remote).await;
    remote.set_reachable(false);
    let SendOutcome::Pending(parent) = session.send("random", Draft::text("offline")).await.unwrap() else {
        panic!("expected an optimistic entry");
    };
    remote.set_reachable(true);

    let outcome = session
        .send("random", Draft::text("reply").reply_to(parent.id))
        .await
        .unwrap();

    assert!(matches!(outcome, SendOutcome::Pending(ref m) if m.reply_to_id == Some(parent.id)));
    assert!(remote.posted().is_empty());
    assert_eq!(session.replies("random", &parent.id).await.len(), 1);
}

#[tokio::test]
async fn inline_replies_and_overflow_count() {
    let remote = mock_with_random();
    let root = remote.push_message("random", "root", 100, None);
    for ts in [200, 300, 400] {
        remote.push_message("random", "r", ts, Some(root));
    }
    let session = in_random(&remote).await.with_inline_replies(2);
    let parent = MessageId::Remote(root);

    let inline: Vec<i64> = session
        .inline_replies("random", &parent)
        .await
        .iter()
        .map(|m| m.timestamp)
        .collect();
    assert_eq!(inline, [200, 300]);
    assert_eq!(session.reply_count_beyond("random", &parent).await, 1);
}

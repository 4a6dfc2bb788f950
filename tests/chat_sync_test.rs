//! Chat roster and messaging integration tests

mod helpers;

use std::time::Duration;
use futures::StreamExt;
use helpers::*;
use StudyGroupFinder::database::StoreOperation;
use StudyGroupFinder::StudyGroupError;

#[tokio::test]
async fn test_event_chat_follows_membership() {
    let ctx = TestContext::new();
    let event_id = ctx.create_event("host", 4).await;

    ctx.join_as(&event_id, "u1").await.unwrap();
    ctx.join_as(&event_id, "u2").await.unwrap();
    ctx.settle().await;

    let chat = ctx.services.chat_service.get_chat_by_event_id(&event_id).await.unwrap();
    assert_eq!(chat.admin_id, "host");
    assert_eq!(chat.participants, vec!["host", "u1", "u2"]);

    ctx.sign_in("u1");
    ctx.services.membership_service.leave(&event_id, "u1").await.unwrap();
    ctx.settle().await;

    let chat = ctx.services.chat_service.get_chat_by_event_id(&event_id).await.unwrap();
    assert_eq!(chat.participants, vec!["host", "u2"]);
}

#[tokio::test]
async fn test_event_without_chat_still_accepts_members() {
    let ctx = TestContext::new();
    ctx.store.fail(StoreOperation::InsertChat);
    let event_id = ctx.create_event("host", 4).await;
    ctx.store.heal(StoreOperation::InsertChat);

    ctx.join_as(&event_id, "u1").await.unwrap();
    ctx.settle().await;

    assert!(ctx.services.chat_service.get_chat_by_event_id(&event_id).await.is_none());
    assert_eq!(ctx.services.background_queue.stats().failed(), 0);
}

#[tokio::test]
async fn test_user_chats_ordered_by_latest_activity() {
    let ctx = TestContext::new();
    let first = ctx.create_event("host", 4).await;
    let second = ctx.create_event("host", 4).await;

    let first_chat = ctx.services.chat_service.get_chat_by_event_id(&first).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    ctx.services.chat_service.send_message(&first_chat.id, "anyone here?", None).await.unwrap();

    let chats = ctx.services.chat_service.get_user_chats().await.unwrap();
    let event_ids: Vec<&str> = chats.iter().map(|c| c.event_id.as_str()).collect();
    assert_eq!(event_ids, vec![first.as_str(), second.as_str()]);
}

#[tokio::test]
async fn test_unread_counts_per_member() {
    let ctx = TestContext::new();
    let event_id = ctx.create_event("host", 4).await;
    ctx.join_as(&event_id, "u1").await.unwrap();
    ctx.settle().await;
    let chat_id = ctx.services.chat_service.get_chat_by_event_id(&event_id).await.unwrap().id;

    ctx.sign_in("host");
    ctx.services.chat_service.send_message(&chat_id, "Agenda attached", Some("https://files.example.com/a.png")).await.unwrap();
    ctx.services.chat_service.send_message(&chat_id, "See you at 6", None).await.unwrap();

    assert_eq!(ctx.services.chat_service.unread_count(&chat_id, "u1").await, 2);
    assert_eq!(ctx.services.chat_service.unread_count(&chat_id, "host").await, 0);

    ctx.sign_in("u1");
    ctx.services.chat_service.mark_read(&chat_id).await.unwrap();
    assert_eq!(ctx.services.chat_service.unread_count(&chat_id, "u1").await, 0);

    let participants = ctx.services.chat_service.get_chat_participants(&chat_id).await;
    assert!(participants.is_empty(), "no profiles were created");

    let details = ctx.services.chat_service.get_chat_with_event_details(&chat_id).await.unwrap();
    assert_eq!(details.event.id, event_id);
}

#[tokio::test]
async fn test_chat_reads_degrade_to_empty() {
    let ctx = TestContext::new();
    let event_id = ctx.create_event("host", 4).await;
    let chat_id = ctx.services.chat_service.get_chat_by_event_id(&event_id).await.unwrap().id;

    ctx.store.fail(StoreOperation::FindChat);
    assert!(ctx.services.chat_service.get_chat_by_event_id(&event_id).await.is_none());
    assert!(ctx.services.chat_service.get_user_chats().await.unwrap().is_empty());
    assert_eq!(ctx.services.chat_service.unread_count(&chat_id, "host").await, 0);
    assert!(ctx.services.chat_service.get_chat_with_event_details(&chat_id).await.is_none());
}

#[tokio::test]
async fn test_message_subscription_sees_every_change() {
    let ctx = TestContext::new();
    let event_id = ctx.create_event("host", 4).await;
    let chat_id = ctx.services.chat_service.get_chat_by_event_id(&event_id).await.unwrap().id;

    let mut messages = ctx.services.chat_service.subscribe_messages(&chat_id).unwrap();
    assert!(messages.next().await.unwrap().is_empty());

    ctx.services.chat_service.send_message(&chat_id, "one", None).await.unwrap();
    ctx.services.chat_service.send_message(&chat_id, "two", None).await.unwrap();

    assert_eq!(messages.next().await.unwrap().len(), 2);
    assert_eq!(messages.next().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_chat_list_subscription_tracks_membership() {
    let ctx = TestContext::new();
    let event_id = ctx.create_event("host", 4).await;

    ctx.sign_in("u1");
    let mut chats = ctx.services.chat_service.subscribe_chats().unwrap();
    assert!(chats.next().await.unwrap().is_empty());

    ctx.services.membership_service.join(&event_id, "u1").await.unwrap();
    let delivered = tokio::time::timeout(Duration::from_secs(2), chats.next())
        .await
        .expect("no delivery after join")
        .unwrap();
    assert_eq!(delivered.len(), 1);
}

#[tokio::test]
async fn test_subscription_limit_is_per_user() {
    let ctx = TestContext::new();
    ctx.sign_in("u1");

    let held: Vec<_> = (0..ctx.settings.chat.max_subscriptions_per_client)
        .map(|_| ctx.services.chat_service.subscribe_messages("chat").unwrap())
        .collect();
    assert!(matches!(
        ctx.services.chat_service.subscribe_chats(),
        Err(StudyGroupError::SubscriptionLimit { .. })
    ));

    ctx.sign_in("u2");
    assert!(ctx.services.chat_service.subscribe_chats().is_ok());

    drop(held);
    ctx.sign_in("u1");
    assert_eq!(ctx.services.chat_service.active_subscriptions("u1"), 0);
    assert!(ctx.services.chat_service.subscribe_chats().is_ok());
}

#[tokio::test]
async fn test_subscriptions_require_sign_in() {
    let ctx = TestContext::new();
    assert!(matches!(ctx.services.chat_service.subscribe_chats(), Err(StudyGroupError::Unauthenticated)));
    assert!(matches!(
        ctx.services.chat_service.subscribe_messages("chat"),
        Err(StudyGroupError::Unauthenticated)
    ));
}

//! Per-message guarantees: anti-echo, sender lock, token budget and failures

use std::sync::Arc;

use assert_matches::assert_matches;
use tokio::sync::Notify;

use Billy::handlers::HandleOutcome;
use Billy::services::KeyValueStore;

use crate::helpers::*;
use crate::integration::{init_test_logging, setup_integration_test};

#[tokio::test]
async fn test_own_messages_are_ignored() {
    let ctx = setup_integration_test();

    let outcome = ctx.send("+55 11 90000-0000", "echo").await;

    assert_eq!(outcome, HandleOutcome::Ignored);
    assert!(ctx.transport.published().is_empty());
    assert!(ctx.state_of(BOT_NUMBER).await.is_empty());
}

#[tokio::test]
async fn test_locked_sender_is_dropped_without_side_effects() {
    let ctx = setup_integration_test();
    ctx.register("Ana", REGISTERED_SENDER);
    let token = ctx.states().acquire_lock(REGISTERED_SENDER).await.unwrap().unwrap();

    ctx.interpreter.push_json(5, intent("Usage"));
    let outcome = ctx.send(REGISTERED_SENDER, "what can you do?").await;

    assert_eq!(outcome, HandleOutcome::Locked);
    assert!(ctx.transport.published().is_empty());
    assert!(ctx.interpreter.requests().is_empty());
    assert!(ctx.state_of(REGISTERED_SENDER).await.is_empty());

    // The holder releases and the next message goes through
    ctx.states().release_lock(REGISTERED_SENDER, &token).await.unwrap();
    let outcome = ctx.send(REGISTERED_SENDER, "what can you do?").await;
    assert_eq!(outcome, HandleOutcome::Completed { tokens_used: 5, replies: 1 });
}

#[tokio::test]
async fn test_lock_is_released_after_every_message() {
    let ctx = setup_integration_test();

    ctx.send(NEW_SENDER, "hi").await;
    ctx.interpreter.push_failure("unavailable");
    ctx.send(NEW_SENDER, "Maria").await;
    ctx.send(NEW_SENDER, "yes").await;

    assert!(ctx.states().acquire_lock(NEW_SENDER).await.unwrap().is_some());
}

#[tokio::test]
async fn test_concurrent_messages_from_one_sender_run_once() {
    init_test_logging();
    let entered = Arc::new(Notify::new());
    let gate = Arc::new(Notify::new());
    let ctx = TestContext::gated(entered.clone(), gate.clone());
    ctx.register("Ana", REGISTERED_SENDER);
    ctx.interpreter
        .push_json(5, intent("ChangeName"))
        .push_json(5, intent("ChangeName"));

    // The second message arrives while the first waits on the interpreter
    let first = ctx.send(REGISTERED_SENDER, "change my name");
    let second = async {
        entered.notified().await;
        let outcome = ctx.send(REGISTERED_SENDER, "change my name").await;
        gate.notify_one();
        outcome
    };
    let (first, second) = tokio::join!(first, second);

    let outcomes = [first, second];
    let completed = outcomes
        .iter()
        .filter(|o| matches!(o, HandleOutcome::Completed { .. }))
        .count();
    let locked = outcomes.iter().filter(|o| **o == HandleOutcome::Locked).count();
    assert_eq!((completed, locked), (1, 1));

    assert_eq!(ctx.interpreter.remaining(), 1);
    assert_eq!(ctx.replies_to(REGISTERED_SENDER), vec!["What should I call you from now on?"]);
    assert_eq!(
        ctx.state_of(REGISTERED_SENDER).await.next_step(),
        Some("UpdateUserName")
    );
    assert_eq!(ctx.store.scan("user:*:token_usage:*").await.unwrap().len(), 1);
    assert_eq!(ctx.rate_limiter().usage(REGISTERED_SENDER).await.unwrap(), 5);
    assert!(ctx.states().acquire_lock(REGISTERED_SENDER).await.unwrap().is_some());
}

#[tokio::test]
async fn test_exhausted_budget_blocks_before_interpretation() {
    let ctx = setup_integration_test();
    let user = ctx.register("Ana", REGISTERED_SENDER);
    ctx.rate_limiter()
        .record(REGISTERED_SENDER, "tx-earlier", user.token_budget())
        .await
        .unwrap();

    ctx.interpreter.push_json(5, intent("Usage"));
    let outcome = ctx.send(REGISTERED_SENDER, "what can you do?").await;

    assert_matches!(
        outcome,
        HandleOutcome::RateLimited { wait_seconds } if wait_seconds > 0 && wait_seconds <= 3600
    );
    assert!(ctx.interpreter.requests().is_empty());
    assert!(ctx
        .last_reply_to(REGISTERED_SENDER)
        .unwrap()
        .starts_with("You've reached the hourly token limit. Please wait at least"));
    assert_eq!(
        ctx.rate_limiter().usage(REGISTERED_SENDER).await.unwrap(),
        user.token_budget()
    );
    assert!(ctx.state_of(REGISTERED_SENDER).await.is_empty());
}

#[tokio::test]
async fn test_unregistered_senders_use_the_default_budget() {
    let ctx = setup_integration_test();
    ctx.rate_limiter()
        .record(NEW_SENDER, "tx-earlier", ctx.settings.rate_limit.default_tokens_per_window)
        .await
        .unwrap();

    let outcome = ctx.send(NEW_SENDER, "hi").await;

    assert_matches!(outcome, HandleOutcome::RateLimited { .. });
    assert!(ctx.state_of(NEW_SENDER).await.is_empty());
}

#[tokio::test]
async fn test_failure_keeps_state_and_sends_failure_reply() {
    let ctx = setup_integration_test();

    ctx.send(NEW_SENDER, "hi").await;
    ctx.send(NEW_SENDER, "Maria").await;
    let before = ctx.state_of(NEW_SENDER).await;
    let published = ctx.transport.published().len();

    ctx.interpreter.push_failure("model overloaded");
    let outcome = ctx.send(NEW_SENDER, "yes").await;

    assert_eq!(outcome, HandleOutcome::Failed);
    assert_eq!(ctx.state_of(NEW_SENDER).await, before);
    let replies = ctx.transport.published();
    assert_eq!(replies.len(), published + 1);
    assert_eq!(
        replies[published].1.message_body,
        ctx.settings.bot.failure_message
    );
    assert_eq!(ctx.rate_limiter().usage(NEW_SENDER).await.unwrap(), 0);
}

#[tokio::test]
async fn test_publish_failure_after_commit_reports_failure() {
    let ctx = setup_integration_test();
    let user = ctx.register("Ana", REGISTERED_SENDER);

    // The bill is written, then the reply cannot be delivered
    ctx.interpreter
        .push_json(5, intent("RegisterBill"))
        .push_json(20, bill(12.0, "2024-05-01"));
    ctx.transport.set_failing(true);
    let outcome = ctx.send(REGISTERED_SENDER, "12 on parking").await;

    assert_eq!(outcome, HandleOutcome::Failed);
    assert!(ctx.states().acquire_lock(REGISTERED_SENDER).await.unwrap().is_some());
    // Commit happens before replies are published
    assert_eq!(ctx.domain.bills(user.tenant_id).len(), 1);
}

#[tokio::test]
async fn test_interpretation_failure_commits_nothing() {
    let ctx = setup_integration_test();
    let user = ctx.register("Ana", REGISTERED_SENDER);

    ctx.interpreter
        .push_json(5, intent("RegisterBill"))
        .push_failure("timeout");
    let outcome = ctx.send(REGISTERED_SENDER, "12 on parking").await;

    assert_eq!(outcome, HandleOutcome::Failed);
    assert!(ctx.domain.bills(user.tenant_id).is_empty());
    assert_eq!(ctx.rate_limiter().usage(REGISTERED_SENDER).await.unwrap(), 0);
}

#[tokio::test]
async fn test_unknown_persisted_step_is_handled_by_fallback() {
    let ctx = setup_integration_test();
    ctx.register("Ana", REGISTERED_SENDER);
    ctx.store
        .set(
            &format!("user:{}:state", REGISTERED_SENDER),
            r#"{"next_step":"RenamedLongAgo","draft":1}"#,
            None,
        )
        .await
        .unwrap();

    let outcome = ctx.send(REGISTERED_SENDER, "hello?").await;

    assert_eq!(outcome, HandleOutcome::Completed { tokens_used: 0, replies: 1 });
    assert!(ctx
        .last_reply_to(REGISTERED_SENDER)
        .unwrap()
        .starts_with("Sorry, I didn't understand"));
    assert!(ctx.interpreter.requests().is_empty());
}

#[tokio::test]
async fn test_queue_payloads_are_decoded() {
    let ctx = setup_integration_test();
    let payload = serde_json::to_vec(&inbound(NEW_SENDER, "hi", "msg-raw")).unwrap();

    let outcome = ctx.orchestrator.handle_bytes(&payload).await;

    assert_eq!(outcome, Some(HandleOutcome::Completed { tokens_used: 0, replies: 2 }));
    assert_eq!(ctx.orchestrator.handle_bytes(b"garbage").await, None);
}

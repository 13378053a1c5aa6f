//! A first-time sender registering through the question flow

use assert_matches::assert_matches;

use Billy::handlers::HandleOutcome;
use Billy::models::BASIC_CATEGORIES;

use crate::helpers::*;
use crate::integration::setup_integration_test;

#[tokio::test]
async fn test_complete_registration_journey() {
    let ctx = setup_integration_test();

    // Greeting and the first question come out in one go
    let outcome = ctx.send(NEW_SENDER, "hi").await;
    assert_eq!(outcome, HandleOutcome::Completed { tokens_used: 0, replies: 2 });
    let replies = ctx.replies_to(NEW_SENDER);
    assert!(replies[0].starts_with("Hi, I'm Billy"));
    assert_eq!(replies[1], "What's your name?");
    assert_eq!(ctx.state_of(NEW_SENDER).await.next_step(), Some("ProcessUserName"));

    ctx.send(NEW_SENDER, "Maria").await;
    let state = ctx.state_of(NEW_SENDER).await;
    assert_eq!(state.next_step(), Some("ProcessUserDefaultCategories"));
    assert_eq!(state.get_string("name").as_deref(), Some("Maria"));

    ctx.interpreter.push_json(10, yes());
    ctx.send(NEW_SENDER, "yes please").await;
    assert_eq!(
        ctx.state_of(NEW_SENDER).await.next_step(),
        Some("ProcessUserRegisterFakeBills")
    );

    ctx.interpreter.push_json(12, no());
    let outcome = ctx.send(NEW_SENDER, "no thanks").await;
    assert_eq!(outcome, HandleOutcome::Completed { tokens_used: 12, replies: 1 });

    let users = ctx.domain.users();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].name, "Maria");
    assert_eq!(users[0].phone_number, NEW_SENDER);
    assert_eq!(
        ctx.domain.categories(users[0].tenant_id).len(),
        BASIC_CATEGORIES.len() + 1
    );
    assert!(ctx.domain.bills(users[0].tenant_id).is_empty());

    let summary = ctx.last_reply_to(NEW_SENDER).expect("registration summary");
    assert!(summary.contains("Registration complete"));
    assert!(summary.contains("+55 (11) 98888-7777"));

    // Terminal step wiped the dialogue, tokens of every message were charged
    assert!(ctx.state_of(NEW_SENDER).await.is_empty());
    assert_eq!(ctx.rate_limiter().usage(NEW_SENDER).await.unwrap(), 22);
    assert_eq!(ctx.interpreter.remaining(), 0);
}

#[tokio::test]
async fn test_registration_with_sample_bills() {
    let ctx = setup_integration_test();

    ctx.send(NEW_SENDER, "hello").await;
    ctx.send(NEW_SENDER, "Carlos").await;
    ctx.interpreter.push_json(1, no());
    ctx.send(NEW_SENDER, "no").await;
    ctx.interpreter.push_json(1, yes());
    ctx.send(NEW_SENDER, "sure").await;

    let user = ctx.domain.users().pop().expect("registered user");
    let bills = ctx.domain.bills(user.tenant_id);
    assert!(!bills.is_empty());
    assert!(bills.iter().all(|bill| bill.fake));
    assert_eq!(ctx.domain.categories(user.tenant_id).len(), 1);
    assert!(ctx.domain.tenants()[0].generated_fake_bills);
}

#[tokio::test]
async fn test_blank_name_is_asked_again() {
    let ctx = setup_integration_test();

    ctx.send(NEW_SENDER, "hi").await;
    let outcome = ctx.send(NEW_SENDER, "   ").await;

    assert_matches!(outcome, HandleOutcome::Completed { replies: 1, .. });
    assert_eq!(
        ctx.last_reply_to(NEW_SENDER).as_deref(),
        Some("I didn't catch that. What's your name?")
    );
    assert_eq!(ctx.state_of(NEW_SENDER).await.next_step(), Some("ProcessUserName"));
    assert!(ctx.domain.users().is_empty());
}

//! Registered users talking about their expenses

use assert_matches::assert_matches;

use Billy::handlers::HandleOutcome;

use crate::helpers::*;
use crate::integration::setup_integration_test;

#[tokio::test]
async fn test_register_bill_quotes_the_message() {
    let ctx = setup_integration_test();
    let user = ctx.register("Ana", REGISTERED_SENDER);

    ctx.interpreter
        .push_json(5, intent("RegisterBill"))
        .push_json(20, bill(35.9, "2024-05-01"));
    let outcome = ctx.send(REGISTERED_SENDER, "I spent 35.90 on groceries today").await;

    assert_eq!(outcome, HandleOutcome::Completed { tokens_used: 25, replies: 1 });
    let bills = ctx.domain.bills(user.tenant_id);
    assert_eq!(bills.len(), 1);
    assert!((bills[0].value - 35.9).abs() < f64::EPSILON);
    assert_eq!(bills[0].message_id, "msg-1");
    // Unknown category lands in the default one
    let other = ctx.domain.categories(user.tenant_id)[0].id;
    assert_eq!(bills[0].category_id, Some(other));

    let (_, reply) = ctx.transport.published().pop().expect("reply published");
    assert_eq!(reply.quoted_message_id.as_deref(), Some("msg-1"));
    assert!(reply.message_body.contains("Bill registered"));
    assert!(ctx.state_of(REGISTERED_SENDER).await.is_empty());
}

#[tokio::test]
async fn test_unroutable_intent_falls_back_to_unknown() {
    let ctx = setup_integration_test();
    ctx.register("Ana", REGISTERED_SENDER);

    // Registration steps exist but are not offered as intents
    ctx.interpreter.push_json(4, intent("BeginRegistration"));
    let outcome = ctx.send(REGISTERED_SENDER, "what's the weather like?").await;

    assert_eq!(outcome, HandleOutcome::Completed { tokens_used: 4, replies: 1 });
    assert!(ctx
        .last_reply_to(REGISTERED_SENDER)
        .unwrap()
        .starts_with("Sorry, I didn't understand"));
    assert!(ctx.state_of(REGISTERED_SENDER).await.is_empty());
}

#[tokio::test]
async fn test_change_name_waits_for_the_answer() {
    let ctx = setup_integration_test();
    ctx.register("Ana", REGISTERED_SENDER);

    ctx.interpreter.push_json(3, intent("ChangeName"));
    ctx.send(REGISTERED_SENDER, "I want to change my name").await;

    assert_eq!(
        ctx.last_reply_to(REGISTERED_SENDER).as_deref(),
        Some("What should I call you from now on?")
    );
    assert_eq!(ctx.state_of(REGISTERED_SENDER).await.next_step(), Some("UpdateUserName"));

    // The answer goes straight to the waiting step, no interpretation
    let outcome = ctx.send(REGISTERED_SENDER, "Ana Paula").await;
    assert_eq!(outcome, HandleOutcome::Completed { tokens_used: 0, replies: 1 });
    assert_eq!(ctx.domain.users()[0].name, "Ana Paula");
    assert!(ctx.state_of(REGISTERED_SENDER).await.is_empty());
    assert_eq!(ctx.interpreter.requests().len(), 1);
}

#[tokio::test]
async fn test_sum_and_delete_bills() {
    let ctx = setup_integration_test();
    let user = ctx.register("Ana", REGISTERED_SENDER);

    ctx.interpreter
        .push_json(1, intent("RegisterBill"))
        .push_json(1, bill(10.0, "2024-05-01"))
        .push_json(1, intent("RegisterBill"))
        .push_json(1, bill(15.5, "2024-05-03"));
    ctx.send(REGISTERED_SENDER, "10 on coffee").await;
    ctx.send(REGISTERED_SENDER, "15.50 on lunch").await;

    ctx.interpreter
        .push_json(1, intent("SumBills"))
        .push_json(1, bills_range("2024-05-01", "2024-05-31"));
    ctx.send(REGISTERED_SENDER, "how much did I spend in May?").await;
    let sum = ctx.last_reply_to(REGISTERED_SENDER).unwrap();
    assert!(sum.starts_with("Sum of the bills between"));

    // Deleting needs the quoted message that created the bill
    ctx.interpreter.push_json(1, intent("DeleteBill"));
    let mut delete = inbound(REGISTERED_SENDER, "delete this", "msg-delete");
    delete.quoted_message_id = Some("msg-1".to_string());
    let outcome = ctx.orchestrator.handle(delete).await;

    assert_matches!(outcome, HandleOutcome::Completed { .. });
    let remaining = ctx.domain.bills(user.tenant_id);
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].message_id, "msg-2");
}

#[tokio::test]
async fn test_account_information_reports_usage() {
    let ctx = setup_integration_test();
    ctx.register("Ana", REGISTERED_SENDER);
    ctx.rate_limiter()
        .record(REGISTERED_SENDER, "tx-earlier", 120)
        .await
        .unwrap();

    ctx.interpreter.push_json(7, intent("AskUserInfo"));
    ctx.send(REGISTERED_SENDER, "show my account").await;

    let info = ctx.last_reply_to(REGISTERED_SENDER).unwrap();
    assert!(info.contains("Ana"));
    assert!(info.contains("120"));
    assert!(info.contains("5000"));
    assert_eq!(ctx.rate_limiter().usage(REGISTERED_SENDER).await.unwrap(), 127);
}

//! Choosing Billy's mood and hearing replies in it

use serde_json::json;

use Billy::handlers::HandleOutcome;
use Billy::models::BillyMood;

use crate::helpers::*;
use crate::integration::setup_integration_test;

#[tokio::test]
async fn test_chosen_mood_rewrites_every_later_reply() {
    let ctx = setup_integration_test();
    ctx.register("Ana", REGISTERED_SENDER);

    ctx.interpreter.push_json(5, intent("UpdateBillyMood"));
    let outcome = ctx.send(REGISTERED_SENDER, "change your mood").await;
    assert_eq!(outcome, HandleOutcome::Completed { tokens_used: 5, replies: 1 });
    assert!(ctx
        .last_reply_to(REGISTERED_SENDER)
        .unwrap()
        .starts_with("Which mood should I answer you in?"));
    assert_eq!(
        ctx.state_of(REGISTERED_SENDER).await.next_step(),
        Some("ProcessUpdateBillyMood")
    );

    // The confirmation already comes in the new mood
    ctx.interpreter
        .push_json(4, json!({ "mood": "GRUMPY" }))
        .push_text(6, "Fine. Grumpy it is.");
    let outcome = ctx.send(REGISTERED_SENDER, "be grumpy").await;
    assert_eq!(outcome, HandleOutcome::Completed { tokens_used: 10, replies: 1 });
    assert_eq!(ctx.last_reply_to(REGISTERED_SENDER).as_deref(), Some("Fine. Grumpy it is."));
    assert_eq!(ctx.domain.users()[0].billy_mood, BillyMood::Grumpy);
    assert!(ctx.state_of(REGISTERED_SENDER).await.is_empty());

    ctx.interpreter
        .push_json(5, intent("Usage"))
        .push_text(7, "What now? Bills, categories, whatever.");
    let outcome = ctx.send(REGISTERED_SENDER, "what can you do?").await;
    assert_eq!(outcome, HandleOutcome::Completed { tokens_used: 12, replies: 1 });
    assert_eq!(
        ctx.last_reply_to(REGISTERED_SENDER).as_deref(),
        Some("What now? Bills, categories, whatever.")
    );
    let rewrite = ctx.interpreter.requests().pop().expect("rewrite request");
    assert!(rewrite.prompt_parts[0].contains("grumpy"));
    assert!(rewrite.prompt_parts[1].starts_with("Here's what I can do for you"));
    assert_eq!(ctx.rate_limiter().usage(REGISTERED_SENDER).await.unwrap(), 27);
}

#[tokio::test]
async fn test_failed_rewrite_sends_plain_failure_reply() {
    let ctx = setup_integration_test();
    ctx.register("Ana", REGISTERED_SENDER);

    ctx.interpreter.push_json(5, intent("UpdateBillyMood"));
    ctx.send(REGISTERED_SENDER, "change your mood").await;
    ctx.interpreter
        .push_json(4, json!({ "mood": "SAD" }))
        .push_text(6, "Mood updated... sigh.");
    ctx.send(REGISTERED_SENDER, "sad").await;

    ctx.interpreter
        .push_json(5, intent("Usage"))
        .push_failure("overloaded");
    let outcome = ctx.send(REGISTERED_SENDER, "help").await;

    assert_eq!(outcome, HandleOutcome::Failed);
    assert_eq!(
        ctx.last_reply_to(REGISTERED_SENDER).as_deref(),
        Some(ctx.settings.bot.failure_message.as_str())
    );
    assert_eq!(ctx.domain.users()[0].billy_mood, BillyMood::Sad);
}

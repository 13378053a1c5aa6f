//! Inviting someone into a tenant and their registration

use Billy::handlers::HandleOutcome;

use crate::helpers::*;
use crate::integration::setup_integration_test;

#[tokio::test]
async fn test_invitation_is_delivered_and_accepted() {
    let ctx = setup_integration_test();
    let inviter = ctx.register("Ana", REGISTERED_SENDER);

    ctx.interpreter.push_json(5, intent("InviteTenantMember"));
    ctx.send(REGISTERED_SENDER, "I want to invite my husband").await;
    assert_eq!(
        ctx.state_of(REGISTERED_SENDER).await.next_step(),
        Some("SaveTenantMemberNumber")
    );

    ctx.send(REGISTERED_SENDER, "+55 (11) 98888-1111").await;
    assert_eq!(
        ctx.last_reply_to(REGISTERED_SENDER).as_deref(),
        Some("Should I send the invitation to +55 (11) 98888-1111?")
    );

    ctx.interpreter.push_json(3, yes());
    let outcome = ctx.send(REGISTERED_SENDER, "yes").await;
    assert_eq!(outcome, HandleOutcome::Completed { tokens_used: 3, replies: 1 });
    assert!(ctx.state_of(REGISTERED_SENDER).await.is_empty());

    // Delivered by the background manager, not by the dialogue
    let invitation = ctx.wait_for_reply_to(INVITEE).await;
    assert!(invitation.starts_with("Hi! Ana invited you"));
    let seeded = ctx.state_of(INVITEE).await;
    assert_eq!(seeded.next_step(), Some("HandleTenantInvitation"));
    assert_eq!(seeded.get_i64("tenant_id"), Some(inviter.tenant_id));

    ctx.interpreter.push_json(2, yes());
    ctx.send(INVITEE, "sure!").await;
    let replies = ctx.replies_to(INVITEE);
    assert!(replies[1].starts_with("Great, welcome aboard!"));
    assert_eq!(replies[2], "What's your name?");

    // Invited users skip the category and sample bill questions
    ctx.send(INVITEE, "Bruno").await;
    let users = ctx.domain.users();
    let bruno = users.iter().find(|u| u.name == "Bruno").expect("invitee registered");
    assert_eq!(bruno.tenant_id, inviter.tenant_id);
    assert_eq!(ctx.domain.tenants().len(), 1);
    assert!(ctx.domain.bills(inviter.tenant_id).is_empty());
    assert!(ctx.state_of(INVITEE).await.is_empty());
}

#[tokio::test]
async fn test_invalid_number_is_asked_again() {
    let ctx = setup_integration_test();
    ctx.register("Ana", REGISTERED_SENDER);

    ctx.interpreter.push_json(5, intent("InviteTenantMember"));
    ctx.send(REGISTERED_SENDER, "invite someone").await;
    ctx.send(REGISTERED_SENDER, "12345").await;

    assert!(ctx
        .last_reply_to(REGISTERED_SENDER)
        .unwrap()
        .starts_with("That doesn't look like a valid phone number"));
    assert_eq!(
        ctx.state_of(REGISTERED_SENDER).await.next_step(),
        Some("SaveTenantMemberNumber")
    );
}

#[tokio::test]
async fn test_registered_numbers_cannot_be_invited() {
    let ctx = setup_integration_test();
    ctx.register("Ana", REGISTERED_SENDER);
    ctx.register("Bruno", INVITEE);

    ctx.interpreter.push_json(5, intent("InviteTenantMember"));
    ctx.send(REGISTERED_SENDER, "invite someone").await;
    ctx.send(REGISTERED_SENDER, INVITEE).await;

    assert!(ctx
        .last_reply_to(REGISTERED_SENDER)
        .unwrap()
        .ends_with("is already using Billy, so I can't invite them."));
    assert!(ctx.state_of(REGISTERED_SENDER).await.is_empty());
}

#[tokio::test]
async fn test_declined_invitation_says_goodbye() {
    let ctx = setup_integration_test();
    let inviter = ctx.register("Ana", REGISTERED_SENDER);

    let mut seeded = Billy::state::ConversationState::new();
    seeded.set_data("tenant_id", inviter.tenant_id).unwrap();
    seeded.set_next_step(Billy::state::StepId::HandleTenantInvitation);
    ctx.states().save_state(INVITEE, &seeded).await.unwrap();

    ctx.interpreter.push_json(2, no());
    ctx.send(INVITEE, "no thanks").await;

    assert_eq!(
        ctx.last_reply_to(INVITEE).as_deref(),
        Some("Alright! If you change your mind, just send me a message.")
    );
    assert!(ctx.state_of(INVITEE).await.is_empty());
    assert_eq!(ctx.domain.users().len(), 1);
}

#[tokio::test]
async fn test_invitation_is_not_sent_when_commit_fails() {
    let ctx = setup_integration_test();
    ctx.register("Ana", REGISTERED_SENDER);

    ctx.interpreter.push_json(5, intent("InviteTenantMember"));
    ctx.send(REGISTERED_SENDER, "I want to invite my husband").await;
    ctx.send(REGISTERED_SENDER, "+55 (11) 98888-1111").await;

    ctx.domain.set_failing_commits(true);
    ctx.interpreter.push_json(3, yes());
    let outcome = ctx.send(REGISTERED_SENDER, "yes").await;

    assert_eq!(outcome, HandleOutcome::Failed);
    assert_eq!(
        ctx.last_reply_to(REGISTERED_SENDER).as_deref(),
        Some(ctx.settings.bot.failure_message.as_str())
    );
    assert_eq!(
        ctx.state_of(REGISTERED_SENDER).await.next_step(),
        Some("ProcessInviteTenantMember")
    );

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(ctx.background.pending_count(), 0);
    assert!(ctx.replies_to(INVITEE).is_empty());
    assert!(ctx.state_of(INVITEE).await.is_empty());
}

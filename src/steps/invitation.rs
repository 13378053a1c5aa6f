//! Tenant invitations
//!
//! ```text
//! InviteTenantMember -> SaveTenantMemberNumber -> CheckTenantMemberNumber
//!   -> ProcessInviteTenantMember
//! ```
//!
//! Confirmed invitations are delivered by a background task, started once
//! the inviter's message is committed. It seeds the invitee's conversation
//! state so their first reply lands in `HandleTenantInvitation`.

use async_trait::async_trait;
use tracing::{info, warn};

use super::registration::TENANT_KEY;
use crate::models::{InboundMessage, OutboundMessage};
use crate::services::ai::prompts;
use crate::state::{
    ConversationState, Question, Step, StepContext, StepFailure, StepId, StepRegistryBuilder, StepResult,
    StepServices, Terminal, Waiting,
};
use crate::utils::errors::Result;
use crate::utils::helpers::{format_phone_number, is_valid_phone_number, normalize_phone_number};

const MEMBER_NUMBER_KEY: &str = "member_number";
const INVITED_BY_KEY: &str = "invited_by";

pub fn register(builder: &mut StepRegistryBuilder) -> Result<()> {
    builder
        .register(StepId::InviteTenantMember, Waiting(InviteTenantMember))?
        .register(StepId::SaveTenantMemberNumber, SaveTenantMemberNumber)?
        .register(StepId::CheckTenantMemberNumber, Waiting(CheckTenantMemberNumber))?
        .register(StepId::ProcessInviteTenantMember, Terminal(ProcessInviteTenantMember))?
        .register(StepId::HandleTenantInvitation, HandleTenantInvitation)?;
    Ok(())
}

/// An invitation waiting to be delivered
#[derive(Debug, Clone)]
pub struct Invitation {
    pub transaction_id: String,
    pub tenant_id: i64,
    pub inviter_name: String,
    pub member_number: String,
}

/// Seed the invitee's state, then tell them about the invitation
pub async fn send_invitation(services: StepServices, invitation: Invitation) -> anyhow::Result<()> {
    let mut state = ConversationState::new();
    state.set_data(TENANT_KEY, invitation.tenant_id)?;
    state.set_data(INVITED_BY_KEY, &invitation.inviter_name)?;
    state.set_next_step(StepId::HandleTenantInvitation);
    services.states.save_state(&invitation.member_number, &state).await?;

    let text = format!(
        "Hi! {} invited you to share expenses with them on Billy, a financial assistant. \
         Would you like to join?",
        invitation.inviter_name
    );
    let message = OutboundMessage::text(&invitation.transaction_id, &invitation.member_number, text);
    services.transport.publish(&message, &services.send_queue).await?;

    info!(
        tenant_id = invitation.tenant_id,
        member = %invitation.member_number,
        "Invitation delivered"
    );
    Ok(())
}

pub struct InviteTenantMember;

impl Question for InviteTenantMember {
    fn question(&self, _ctx: &StepContext<'_>) -> std::result::Result<String, StepFailure> {
        Ok("What's the phone number of the person you want to invite?".to_string())
    }

    fn answer_step(&self) -> StepId {
        StepId::SaveTenantMemberNumber
    }

    fn intent_description(&self) -> Option<&'static str> {
        Some("Wants to invite someone, like a family member, to share their expenses")
    }
}

/// Validates the number; invalid numbers are asked for again
pub struct SaveTenantMemberNumber;

#[async_trait]
impl Step for SaveTenantMemberNumber {
    async fn execute(
        &self,
        ctx: &mut StepContext<'_>,
        message: &InboundMessage,
    ) -> std::result::Result<StepResult, StepFailure> {
        let digits = normalize_phone_number(&message.message_body);

        if !is_valid_phone_number(&digits) {
            return Ok(StepResult::wait_for(StepId::SaveTenantMemberNumber).with_reply(
                "That doesn't look like a valid phone number. Please send it again, including the area code.",
            ));
        }
        if digits == normalize_phone_number(&message.sender_number) {
            return Ok(StepResult::wait_for(StepId::SaveTenantMemberNumber)
                .with_reply("You can't invite yourself! Whose number should I use?"));
        }

        if ctx.uow.find_user_by_phone(&digits).await?.is_some() {
            ctx.state.clear();
            return Ok(StepResult::reply(format!(
                "{} is already using Billy, so I can't invite them.",
                format_phone_number(&digits)
            )));
        }

        ctx.state.set_data(MEMBER_NUMBER_KEY, &digits)?;
        Ok(StepResult::continue_to(StepId::CheckTenantMemberNumber))
    }
}

pub struct CheckTenantMemberNumber;

impl Question for CheckTenantMemberNumber {
    fn question(&self, ctx: &StepContext<'_>) -> std::result::Result<String, StepFailure> {
        let number = ctx
            .state
            .get_string(MEMBER_NUMBER_KEY)
            .ok_or_else(|| StepFailure::missing(MEMBER_NUMBER_KEY))?;
        Ok(format!(
            "Should I send the invitation to {}?",
            format_phone_number(&number)
        ))
    }

    fn answer_step(&self) -> StepId {
        StepId::ProcessInviteTenantMember
    }
}

pub struct ProcessInviteTenantMember;

#[async_trait]
impl Step for ProcessInviteTenantMember {
    async fn execute(
        &self,
        ctx: &mut StepContext<'_>,
        message: &InboundMessage,
    ) -> std::result::Result<StepResult, StepFailure> {
        let user = ctx.require_user()?.clone();
        let member_number = ctx
            .state
            .get_string(MEMBER_NUMBER_KEY)
            .ok_or_else(|| StepFailure::missing(MEMBER_NUMBER_KEY))?;
        let services = ctx.services.clone();

        let (tokens, confirmed) = prompts::yes_or_no(services.interpreter.as_ref(), &message.message_body).await?;
        if !confirmed {
            return Ok(StepResult::reply("Okay, I won't send the invitation.").with_tokens(tokens));
        }

        let invitation = Invitation {
            transaction_id: ctx.transaction_id.clone(),
            tenant_id: user.tenant_id,
            inviter_name: user.name,
            member_number: member_number.clone(),
        };
        ctx.defer("invite_tenant_member", send_invitation(services, invitation));

        Ok(StepResult::reply(format!(
            "I'll send the invitation to {} right away!",
            format_phone_number(&member_number)
        ))
        .with_tokens(tokens))
    }
}

/// First reply of an invited sender
pub struct HandleTenantInvitation;

#[async_trait]
impl Step for HandleTenantInvitation {
    async fn execute(
        &self,
        ctx: &mut StepContext<'_>,
        message: &InboundMessage,
    ) -> std::result::Result<StepResult, StepFailure> {
        if ctx.user.is_some() {
            warn!("Invitation answered by an already registered user");
            ctx.state.clear();
            return Ok(StepResult::reply("You're already registered, so there's nothing to accept."));
        }
        if !ctx.state.contains(TENANT_KEY) {
            return Err(StepFailure::missing(TENANT_KEY));
        }

        let interpreter = ctx.services.interpreter.clone();
        let (tokens, accepted) = prompts::yes_or_no(interpreter.as_ref(), &message.message_body).await?;
        ctx.state.remove_data(INVITED_BY_KEY);

        let next = if accepted {
            StepId::BeginRegistration
        } else {
            ctx.state.clear();
            StepId::SayGoodbye
        };
        Ok(StepResult::continue_to(next).with_tokens(tokens))
    }
}

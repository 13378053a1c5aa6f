//! Account steps: usage help, profile, name, mood and notification preferences

use async_trait::async_trait;
use tracing::info;

use crate::models::InboundMessage;
use crate::services::ai::prompts;
use crate::state::{
    Question, Step, StepContext, StepFailure, StepId, StepRegistryBuilder, StepResult, Terminal, Waiting,
};
use crate::utils::errors::Result;
use crate::utils::helpers::{create_aligned_text, format_phone_number};

const USAGE: &str = "Here's what I can do for you:\n\
\n\
*Register a bill*: \"I spent 35.90 on groceries today\"\n\
*Delete a bill*: reply to the message that created it with \"delete this\"\n\
*Sum bills*: \"How much did I spend last week?\"\n\
*Analyze expenses*: \"How were my expenses this month?\"\n\
*Create a category*: \"Create a category for pets\"\n\
*List categories*: \"Which categories do I have?\"\n\
*Sample bills*: \"Generate sample bills\" or \"Delete the sample bills\"\n\
*Invite someone*: \"I want to invite my partner\"\n\
*Change Billy's mood*: \"Be sarcastic from now on\"\n\
*Your information*: \"Show my account\"";

pub fn register(builder: &mut StepRegistryBuilder) -> Result<()> {
    builder
        .register(StepId::Usage, Terminal(Usage))?
        .register(StepId::AskUserInfo, Terminal(AskUserInfo))?
        .register(StepId::ChangeName, Waiting(ChangeName))?
        .register(StepId::UpdateUserName, Terminal(UpdateUserName))?
        .register(StepId::UpdateBillyMood, Waiting(UpdateBillyMood))?
        .register(StepId::ProcessUpdateBillyMood, Terminal(ProcessUpdateBillyMood))?
        .register(StepId::StopReceivingNotifications, Terminal(StopReceivingNotifications))?
        .register(StepId::ActivateNotifications, Terminal(ActivateNotifications))?
        .register(StepId::Courtesy, Terminal(Courtesy))?;
    Ok(())
}

pub struct Usage;

#[async_trait]
impl Step for Usage {
    fn intent_description(&self) -> Option<&'static str> {
        Some("Asks what Billy can do or how to use it")
    }

    async fn execute(
        &self,
        _ctx: &mut StepContext<'_>,
        _message: &InboundMessage,
    ) -> std::result::Result<StepResult, StepFailure> {
        Ok(StepResult::reply(USAGE))
    }
}

/// Profile plus the tokens spent within the rolling window
pub struct AskUserInfo;

#[async_trait]
impl Step for AskUserInfo {
    fn intent_description(&self) -> Option<&'static str> {
        Some("Asks for their own account information")
    }

    async fn execute(
        &self,
        ctx: &mut StepContext<'_>,
        message: &InboundMessage,
    ) -> std::result::Result<StepResult, StepFailure> {
        let user = ctx.require_user()?.clone();
        let used = ctx.services.rate_limiter.usage(&message.sender_number).await?;

        let text = create_aligned_text(
            "Your information",
            &[vec![
                ("Name", user.name.clone()),
                ("Phone number", format_phone_number(&user.phone_number)),
                ("Tokens per hour", user.tokens_per_hour.to_string()),
                ("Tokens used in the last hour", used.to_string()),
                ("Billy's mood", user.billy_mood.label().to_string()),
                (
                    "Notifications",
                    if user.send_notification { "On" } else { "Off" }.to_string(),
                ),
            ]],
        );
        Ok(StepResult::reply(text))
    }
}

pub struct ChangeName;

impl Question for ChangeName {
    fn question(&self, _ctx: &StepContext<'_>) -> std::result::Result<String, StepFailure> {
        Ok("What should I call you from now on?".to_string())
    }

    fn answer_step(&self) -> StepId {
        StepId::UpdateUserName
    }

    fn intent_description(&self) -> Option<&'static str> {
        Some("Request to change their name")
    }
}

pub struct UpdateUserName;

#[async_trait]
impl Step for UpdateUserName {
    async fn execute(
        &self,
        ctx: &mut StepContext<'_>,
        message: &InboundMessage,
    ) -> std::result::Result<StepResult, StepFailure> {
        let user_id = ctx.require_user()?.id;
        let name = message.message_body.trim();
        if name.is_empty() {
            return Ok(StepResult::reply(
                "Your name can't be empty, so I kept the one I had.",
            ));
        }

        let user = ctx.uow.update_user_name(user_id, name).await?;
        info!(user_id = user.id, "User name updated");
        ctx.user = Some(user);

        Ok(StepResult::reply(format!("Done! From now on I'll call you {}.", name)))
    }
}

pub struct UpdateBillyMood;

impl Question for UpdateBillyMood {
    fn question(&self, _ctx: &StepContext<'_>) -> std::result::Result<String, StepFailure> {
        Ok("Which mood should I answer you in?\nNeutral, sarcastic, grumpy, happy or sad?".to_string())
    }

    fn answer_step(&self) -> StepId {
        StepId::ProcessUpdateBillyMood
    }

    fn intent_description(&self) -> Option<&'static str> {
        Some("Wants to change the mood or tone Billy answers in")
    }
}

/// Stores the chosen mood; the confirmation already comes in the new mood
pub struct ProcessUpdateBillyMood;

#[async_trait]
impl Step for ProcessUpdateBillyMood {
    async fn execute(
        &self,
        ctx: &mut StepContext<'_>,
        message: &InboundMessage,
    ) -> std::result::Result<StepResult, StepFailure> {
        let user_id = ctx.require_user()?.id;
        let interpreter = ctx.services.interpreter.clone();
        let (tokens, mood) = prompts::chosen_mood(interpreter.as_ref(), &message.message_body).await?;

        let user = ctx.uow.update_billy_mood(user_id, mood).await?;
        info!(user_id = user.id, mood = mood.as_str(), "Billy mood updated");
        ctx.user = Some(user);

        Ok(StepResult::reply(format!("Mood updated! From now on I'll be {}.", mood.label())).with_tokens(tokens))
    }
}

pub struct StopReceivingNotifications;

#[async_trait]
impl Step for StopReceivingNotifications {
    fn intent_description(&self) -> Option<&'static str> {
        Some("Asks to stop receiving notifications")
    }

    async fn execute(
        &self,
        ctx: &mut StepContext<'_>,
        _message: &InboundMessage,
    ) -> std::result::Result<StepResult, StepFailure> {
        let user_id = ctx.require_user()?.id;
        ctx.uow.set_send_notification(user_id, false).await?;

        Ok(StepResult::reply(
            "Okay, I won't send you notifications anymore. Just ask if you want them back.",
        ))
    }
}

pub struct ActivateNotifications;

#[async_trait]
impl Step for ActivateNotifications {
    fn intent_description(&self) -> Option<&'static str> {
        Some("Asks to receive notifications again")
    }

    async fn execute(
        &self,
        ctx: &mut StepContext<'_>,
        _message: &InboundMessage,
    ) -> std::result::Result<StepResult, StepFailure> {
        let user_id = ctx.require_user()?.id;
        ctx.uow.set_send_notification(user_id, true).await?;

        Ok(StepResult::reply("Notifications are on again."))
    }
}

pub struct Courtesy;

#[async_trait]
impl Step for Courtesy {
    fn intent_description(&self) -> Option<&'static str> {
        Some("The user is only greeting, thanking or saying goodbye")
    }

    async fn execute(
        &self,
        ctx: &mut StepContext<'_>,
        message: &InboundMessage,
    ) -> std::result::Result<StepResult, StepFailure> {
        let interpreter = ctx.services.interpreter.clone();
        let (tokens, answer) = prompts::courtesy_answer(interpreter.as_ref(), &message.message_body).await?;

        Ok(StepResult::reply(answer).with_tokens(tokens))
    }
}

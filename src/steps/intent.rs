//! Intent routing for registered users

use async_trait::async_trait;
use tracing::{info, warn};

use crate::models::InboundMessage;
use crate::services::ai::prompts;
use crate::state::{Step, StepContext, StepFailure, StepId, StepRegistryBuilder, StepResult, Terminal};
use crate::utils::errors::Result;

pub fn register(builder: &mut StepRegistryBuilder) -> Result<()> {
    builder
        .register(StepId::HandleUserIntent, HandleUserIntent)?
        .register(StepId::Unknown, Terminal(Unknown))?;
    Ok(())
}

/// Asks the interpreter which routable step the message is meant for
pub struct HandleUserIntent;

#[async_trait]
impl Step for HandleUserIntent {
    async fn execute(
        &self,
        ctx: &mut StepContext<'_>,
        message: &InboundMessage,
    ) -> std::result::Result<StepResult, StepFailure> {
        let registry = ctx.registry;
        let interpreter = ctx.services.interpreter.clone();
        let intents = registry.intent_descriptions();
        let system_prompt = prompts::intent_system_prompt(intents.iter().copied());

        let (tokens, answer) =
            prompts::user_intent(interpreter.as_ref(), system_prompt, &message.message_body).await?;

        // Only steps offered in the prompt are valid targets
        let routed = answer
            .trim()
            .parse::<StepId>()
            .ok()
            .filter(|id| intents.iter().any(|(name, _)| *name == id.as_str()));

        let next = match routed {
            Some(id) => id,
            None => {
                warn!(answer = %answer, "Interpreter answered with an unroutable intent");
                registry.fallback()
            }
        };
        info!(intent = %next, "User intent resolved");

        Ok(StepResult::continue_to(next).with_tokens(tokens))
    }
}

/// Catch-all for requests nothing else handles
pub struct Unknown;

#[async_trait]
impl Step for Unknown {
    fn intent_description(&self) -> Option<&'static str> {
        Some("The request does not fit any other option")
    }

    async fn execute(
        &self,
        _ctx: &mut StepContext<'_>,
        _message: &InboundMessage,
    ) -> std::result::Result<StepResult, StepFailure> {
        Ok(StepResult::reply(
            "Sorry, I didn't understand what you said. Ask me what I can do to see some examples.",
        ))
    }
}

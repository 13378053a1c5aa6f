//! Step engine
//!
//! Drives the steps for one inbound message. It starts at the step named by
//! `next_step` in the conversation state (or the registry's initial step),
//! then follows transitions until a step stops or waits for an answer.
//! Waiting persists the answering step as the new `next_step`.
//!
//! Replies to users who picked a mood other than neutral are rewritten in
//! that mood, and the rewrite's tokens are charged with the step's.

use std::sync::Arc;

use tracing::{debug, error, info_span, Instrument};

use super::context::ConversationState;
use super::registry::{StepId, StepRegistry};
use super::step::{Reply, Step, StepContext, StepFailure, Transition};
use crate::models::{BillyMood, InboundMessage};
use crate::services::ai::{prompts, Interpreter};
use crate::utils::logging::log_step_execution;

/// Ceiling on step executions per message; a longer chain is a dialogue cycle
pub const MAX_STEPS_PER_MESSAGE: usize = 32;

/// What one engine run produced. The final state stays in the context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOutcome {
    pub tokens_used: u64,
    /// Replies in the order the steps produced them
    pub replies: Vec<Reply>,
    pub steps_executed: usize,
}

#[derive(Clone)]
pub struct StepEngine {
    registry: Arc<StepRegistry>,
}

impl StepEngine {
    pub fn new(registry: Arc<StepRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// Resolve the step the next message starts at. Never fails: unknown
    /// names are logged and handled by the fallback step.
    pub fn determine_starting_step(&self, state: &ConversationState) -> (StepId, Arc<dyn Step>) {
        let registry = &self.registry;
        let name = match state.next_step() {
            None => return registry.initial_step(),
            Some(name) => name,
        };

        match name.parse::<StepId>() {
            Ok(id) => match registry.get(id) {
                Some(step) => (id, step),
                None => {
                    error!(next_step = %id, "Persisted step is not registered, using fallback");
                    registry.fallback_step()
                }
            },
            Err(_) => {
                error!(next_step = name, "Persisted step name is unknown, using fallback");
                registry.fallback_step()
            }
        }
    }

    /// Execute steps for `message` until one stops or waits.
    ///
    /// Step failures are returned untouched; the caller decides what the
    /// sender sees. A transition to an unregistered step ends the run early.
    pub async fn run(
        &self,
        ctx: &mut StepContext<'_>,
        message: &InboundMessage,
    ) -> Result<EngineOutcome, StepFailure> {
        let (mut current, mut step) = self.determine_starting_step(&ctx.state);
        let mut outcome = EngineOutcome::default();

        loop {
            if outcome.steps_executed >= MAX_STEPS_PER_MESSAGE {
                error!(
                    step = %current,
                    limit = MAX_STEPS_PER_MESSAGE,
                    "Too many steps for one message, stopping"
                );
                break;
            }

            log_step_execution(&ctx.transaction_id, current.as_str(), step.kind().as_str());
            let span = info_span!(parent: &ctx.span, "step", step = current.as_str());
            let mut result = step.execute(ctx, message).instrument(span).await?;

            let mood = ctx.user.as_ref().map_or(BillyMood::Neutral, |user| user.billy_mood);
            if let Some(reply) = result.reply.as_mut() {
                let interpreter = ctx.services.interpreter.clone();
                result.tokens_used += speak_in_mood(interpreter.as_ref(), mood, reply).await?;
            }

            outcome.steps_executed += 1;
            outcome.tokens_used += result.tokens_used;
            if let Some(reply) = result.reply {
                outcome.replies.push(reply);
            }

            match result.transition {
                Transition::Stop => break,
                Transition::WaitFor(next) => {
                    debug!(step = %current, next_step = %next, "Waiting for the sender");
                    ctx.state.set_next_step(next);
                    break;
                }
                Transition::Continue(next) => match self.registry.get(next) {
                    Some(next_step) => {
                        current = next;
                        step = next_step;
                    }
                    None => {
                        error!(step = %current, next_step = %next, "Transition to unregistered step");
                        break;
                    }
                },
            }
        }

        Ok(outcome)
    }
}

/// Rewrite `reply` in `mood`, returning the tokens spent
async fn speak_in_mood(interpreter: &dyn Interpreter, mood: BillyMood, reply: &mut Reply) -> Result<u64, StepFailure> {
    if mood == BillyMood::Neutral {
        return Ok(0);
    }

    let (tokens, text) = prompts::reply_in_mood(interpreter, &reply.text, mood).await?;
    debug!(mood = mood.as_str(), tokens = tokens, "Reply rewritten in mood");
    reply.text = text;
    Ok(tokens)
}

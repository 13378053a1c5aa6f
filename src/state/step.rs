//! Dialogue steps
//!
//! A [`Step`] is one unit of dialogue logic. It runs against a
//! [`StepContext`] holding everything the current message is processed with
//! and answers with a [`StepResult`] saying what to reply and where the
//! dialogue goes next.
//!
//! Two adapters cover the recurring shapes:
//!
//! - [`Waiting`] turns a [`Question`] into a step that asks and pauses the
//!   dialogue until the sender answers
//! - [`Terminal`] wraps a step and wipes the conversation state once it ran,
//!   so the next message starts a new dialogue

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::Span;

use super::context::ConversationState;
use super::registry::{StepId, StepRegistry};
use super::storage::StateStorage;
use crate::database::UnitOfWork;
use crate::middleware::rate_limit::TokenRateLimiter;
use crate::models::{InboundMessage, User};
use crate::services::ai::Interpreter;
use crate::services::background::{BackgroundTaskManager, TaskFuture};
use crate::services::transport::MessageTransport;
use crate::utils::errors::BillyError;

/// How the engine should treat a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Plain,
    Waiting,
    Terminal,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Plain => "plain",
            StepKind::Waiting => "waiting",
            StepKind::Terminal => "terminal",
        }
    }
}

/// Text sent back to the sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    /// Quote the message that triggered this reply
    pub quote_message: bool,
}

/// Where the dialogue goes after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// End this message's processing
    Stop,
    /// Run another step for the same message
    Continue(StepId),
    /// Pause until the sender answers; the answer is handled by the given step
    WaitFor(StepId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    pub tokens_used: u64,
    pub reply: Option<Reply>,
    pub transition: Transition,
}

impl StepResult {
    pub fn stop() -> Self {
        Self {
            tokens_used: 0,
            reply: None,
            transition: Transition::Stop,
        }
    }

    pub fn continue_to(step: StepId) -> Self {
        Self {
            transition: Transition::Continue(step),
            ..Self::stop()
        }
    }

    pub fn wait_for(step: StepId) -> Self {
        Self {
            transition: Transition::WaitFor(step),
            ..Self::stop()
        }
    }

    /// Reply and stop
    pub fn reply(text: impl Into<String>) -> Self {
        Self::stop().with_reply(text)
    }

    pub fn with_reply(mut self, text: impl Into<String>) -> Self {
        self.reply = Some(Reply {
            text: text.into(),
            quote_message: false,
        });
        self
    }

    /// Quote the triggering message in the reply, if there is one
    pub fn quoting(mut self) -> Self {
        if let Some(reply) = self.reply.as_mut() {
            reply.quote_message = true;
        }
        self
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens_used += tokens;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepFailureKind {
    /// A field the step relies on is missing from state or context
    MissingState,
    /// The interpretation service failed or answered nonsense
    Interpretation,
    /// A store or transport operation failed
    Storage,
    InvalidInput,
    Internal,
}

/// Structured reason a step could not finish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub kind: StepFailureKind,
    pub detail: String,
}

impl StepFailure {
    pub fn new(kind: StepFailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn missing(field: &str) -> Self {
        Self::new(StepFailureKind::MissingState, field)
    }
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.detail)
    }
}

impl std::error::Error for StepFailure {}

impl From<BillyError> for StepFailure {
    fn from(err: BillyError) -> Self {
        let kind = match &err {
            BillyError::Step(failure) => return failure.clone(),
            BillyError::Interpretation(_)
            | BillyError::Http(_)
            | BillyError::ServiceUnavailable(_) => StepFailureKind::Interpretation,
            BillyError::Database(_)
            | BillyError::Migration(_)
            | BillyError::Redis(_)
            | BillyError::Io(_)
            | BillyError::Transport(_) => StepFailureKind::Storage,
            BillyError::InvalidInput(_) => StepFailureKind::InvalidInput,
            _ => StepFailureKind::Internal,
        };
        Self::new(kind, err.to_string())
    }
}

/// Long-lived handles steps may use
#[derive(Clone)]
pub struct StepServices {
    pub interpreter: Arc<dyn Interpreter>,
    pub rate_limiter: TokenRateLimiter,
    pub states: StateStorage,
    pub transport: Arc<dyn MessageTransport>,
    pub background: BackgroundTaskManager,
    /// Queue replies and invitations are published to
    pub send_queue: String,
}

/// Background work held back until the message's unit of work commits
pub struct DeferredTask {
    pub name: &'static str,
    pub future: TaskFuture,
}

impl fmt::Debug for DeferredTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredTask").field("name", &self.name).finish()
    }
}

/// Everything one message is processed with, passed explicitly from the
/// orchestrator through the engine into every step
pub struct StepContext<'a> {
    pub transaction_id: String,
    pub uow: Box<dyn UnitOfWork>,
    /// The registered sender, if any
    pub user: Option<User>,
    pub state: ConversationState,
    pub services: &'a StepServices,
    pub registry: &'a StepRegistry,
    pub span: Span,
    /// Submitted to the background manager after commit, dropped on rollback
    pub deferred: Vec<DeferredTask>,
}

impl<'a> StepContext<'a> {
    pub fn new(
        transaction_id: impl Into<String>,
        uow: Box<dyn UnitOfWork>,
        user: Option<User>,
        state: ConversationState,
        services: &'a StepServices,
        registry: &'a StepRegistry,
        span: Span,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            uow,
            user,
            state,
            services,
            registry,
            span,
            deferred: Vec::new(),
        }
    }

    pub fn require_user(&self) -> Result<&User, StepFailure> {
        self.user.as_ref().ok_or_else(|| StepFailure::missing("user"))
    }

    /// Run `future` in the background once this message's writes are committed
    pub fn defer<F>(&mut self, name: &'static str, future: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.deferred.push(DeferredTask {
            name,
            future: Box::pin(future),
        });
    }

    /// Give back the unit of work, the final state and the deferred tasks
    pub fn into_parts(self) -> (Box<dyn UnitOfWork>, ConversationState, Vec<DeferredTask>) {
        (self.uow, self.state, self.deferred)
    }
}

#[async_trait]
pub trait Step: Send + Sync {
    fn kind(&self) -> StepKind {
        StepKind::Plain
    }

    /// When present, the intent router may send messages straight to this step
    fn intent_description(&self) -> Option<&'static str> {
        None
    }

    async fn execute(
        &self,
        ctx: &mut StepContext<'_>,
        message: &InboundMessage,
    ) -> Result<StepResult, StepFailure>;
}

/// A question that pauses the dialogue
pub trait Question: Send + Sync {
    fn question(&self, ctx: &StepContext<'_>) -> Result<String, StepFailure>;

    /// Step that handles the answer
    fn answer_step(&self) -> StepId;

    fn intent_description(&self) -> Option<&'static str> {
        None
    }
}

/// Asks its question and always waits for the answer
pub struct Waiting<Q>(pub Q);

#[async_trait]
impl<Q: Question + 'static> Step for Waiting<Q> {
    fn kind(&self) -> StepKind {
        StepKind::Waiting
    }

    fn intent_description(&self) -> Option<&'static str> {
        self.0.intent_description()
    }

    async fn execute(
        &self,
        ctx: &mut StepContext<'_>,
        _message: &InboundMessage,
    ) -> Result<StepResult, StepFailure> {
        let question = self.0.question(ctx)?;
        Ok(StepResult::wait_for(self.0.answer_step()).with_reply(question))
    }
}

/// Runs the inner step, then empties the conversation state whatever the step wrote
pub struct Terminal<S>(pub S);

#[async_trait]
impl<S: Step + 'static> Step for Terminal<S> {
    fn kind(&self) -> StepKind {
        StepKind::Terminal
    }

    fn intent_description(&self) -> Option<&'static str> {
        self.0.intent_description()
    }

    async fn execute(
        &self,
        ctx: &mut StepContext<'_>,
        message: &InboundMessage,
    ) -> Result<StepResult, StepFailure> {
        let result = self.0.execute(ctx, message).await;
        ctx.state.clear();
        result
    }
}

//! Message orchestrator
//!
//! Every inbound message goes through the same sequence:
//!
//! ```text
//! anti-echo -> sender lock -> unit of work -> user + state -> token budget
//!   -> step engine -> commit -> save state -> charge tokens -> replies
//! ```
//!
//! The sender lock is released whatever happens, but only while this message
//! still holds it. When anything after the lock fails, the unit of work is
//! rolled back, the stored state is left as it was, deferred background
//! tasks are dropped and the sender gets the configured failure message
//! instead of the dialogue's replies.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::config::Settings;
use crate::database::{DomainStore, UnitOfWork};
use crate::models::{InboundMessage, OutboundMessage, User};
use crate::services::transport::MessageHandler;
use crate::state::{ConversationState, Reply, StepContext, StepEngine, StepFailure, StepRegistry, StepServices};
use crate::utils::helpers::normalize_phone_number;
use crate::utils::logging::log_message_processed;

/// How one inbound message ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Sent by the assistant itself
    Ignored,
    /// Another message from the same sender is still being processed
    Locked,
    RateLimited { wait_seconds: u64 },
    Completed { tokens_used: u64, replies: usize },
    Failed,
}

impl HandleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandleOutcome::Ignored => "ignored",
            HandleOutcome::Locked => "locked",
            HandleOutcome::RateLimited { .. } => "rate_limited",
            HandleOutcome::Completed { .. } => "completed",
            HandleOutcome::Failed => "failed",
        }
    }

    fn tokens_used(&self) -> u64 {
        match self {
            HandleOutcome::Completed { tokens_used, .. } => *tokens_used,
            _ => 0,
        }
    }
}

/// Sender, user and state loaded for a message that passed the budget check
struct Prepared {
    user: Option<User>,
    state: ConversationState,
}

enum Admission {
    Admitted(Prepared),
    Limited(u64),
}

pub struct MessageOrchestrator {
    bot_number: String,
    failure_message: String,
    domain: Arc<dyn DomainStore>,
    engine: StepEngine,
    services: StepServices,
}

impl MessageOrchestrator {
    pub fn new(
        settings: &Settings,
        domain: Arc<dyn DomainStore>,
        registry: Arc<StepRegistry>,
        services: StepServices,
    ) -> Self {
        Self {
            bot_number: normalize_phone_number(&settings.bot.phone_number),
            failure_message: settings.bot.failure_message.clone(),
            domain,
            engine: StepEngine::new(registry),
            services,
        }
    }

    pub fn services(&self) -> &StepServices {
        &self.services
    }

    /// Decode a queue payload and handle it. Undecodable payloads are dropped.
    pub async fn handle_bytes(&self, payload: &[u8]) -> Option<HandleOutcome> {
        match serde_json::from_slice::<InboundMessage>(payload) {
            Ok(message) => Some(self.handle(message).await),
            Err(e) => {
                warn!(error = %e, size = payload.len(), "Dropping undecodable message payload");
                None
            }
        }
    }

    /// Process one inbound message end to end
    pub async fn handle(&self, message: InboundMessage) -> HandleOutcome {
        let started = Instant::now();
        let outcome = self.handle_inner(&message).await;

        log_message_processed(
            &message.transaction_id,
            outcome.as_str(),
            outcome.tokens_used(),
            started.elapsed().as_millis() as u64,
        );
        outcome
    }

    async fn handle_inner(&self, message: &InboundMessage) -> HandleOutcome {
        if self.is_echo(message) {
            debug!(transaction_id = %message.transaction_id, "Ignoring message sent by the assistant");
            return HandleOutcome::Ignored;
        }

        let sender = message.sender_number.as_str();
        let lock_token = match self.services.states.acquire_lock(sender).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                info!(
                    transaction_id = %message.transaction_id,
                    sender = sender,
                    "Sender already has a message in progress, dropping"
                );
                return HandleOutcome::Locked;
            }
            Err(e) => {
                error!(transaction_id = %message.transaction_id, error = %e, "Failed to acquire sender lock");
                self.send_failure(message).await;
                return HandleOutcome::Failed;
            }
        };

        let span = info_span!(
            "message",
            transaction_id = %message.transaction_id,
            sender = sender
        );
        let guarded = AssertUnwindSafe(self.process(message, span.clone()))
            .catch_unwind()
            .instrument(span.clone())
            .await;

        let outcome = match guarded {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(failure)) => {
                span.in_scope(|| error!(kind = ?failure.kind, error = %failure, "Message processing failed"));
                self.send_failure(message).await;
                HandleOutcome::Failed
            }
            Err(_) => {
                span.in_scope(|| error!("Message processing panicked"));
                self.send_failure(message).await;
                HandleOutcome::Failed
            }
        };

        if let Err(e) = self.services.states.release_lock(sender, &lock_token).await {
            error!(transaction_id = %message.transaction_id, error = %e, "Failed to release sender lock");
        }
        outcome
    }

    fn is_echo(&self, message: &InboundMessage) -> bool {
        !self.bot_number.is_empty() && normalize_phone_number(&message.sender_number) == self.bot_number
    }

    /// Everything between taking and releasing the sender lock
    async fn process(&self, message: &InboundMessage, span: Span) -> Result<HandleOutcome, StepFailure> {
        let sender = message.sender_number.as_str();
        let mut uow = self.domain.begin().await?;

        let prepared = match self.admit(uow.as_mut(), message).await {
            Ok(Admission::Admitted(prepared)) => prepared,
            Ok(Admission::Limited(wait_seconds)) => {
                rollback(uow).await;
                self.publish(OutboundMessage::text(
                    &message.transaction_id,
                    sender,
                    format!(
                        "You've reached the hourly token limit. Please wait at least {} seconds.",
                        wait_seconds
                    ),
                ))
                .await?;
                return Ok(HandleOutcome::RateLimited { wait_seconds });
            }
            Err(failure) => {
                rollback(uow).await;
                return Err(failure);
            }
        };

        let mut ctx = StepContext::new(
            message.transaction_id.clone(),
            uow,
            prepared.user,
            prepared.state,
            &self.services,
            self.engine.registry(),
            span,
        );

        let result = self.engine.run(&mut ctx, message).await;
        let (uow, state, deferred) = ctx.into_parts();
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(failure) => {
                rollback(uow).await;
                return Err(failure);
            }
        };

        uow.commit().await?;
        for task in deferred {
            self.services.background.submit(task.name, task.future);
        }
        self.services.states.save_state(sender, &state).await?;

        if let Err(e) = self
            .services
            .rate_limiter
            .record(sender, &message.transaction_id, outcome.tokens_used)
            .await
        {
            warn!(error = %e, tokens = outcome.tokens_used, "Failed to record token usage");
        }

        let replies = outcome.replies.len();
        for reply in outcome.replies {
            self.publish(self.outbound(message, reply)).await?;
        }

        debug!(
            steps = outcome.steps_executed,
            next_step = state.next_step().unwrap_or("-"),
            "Dialogue finished"
        );
        Ok(HandleOutcome::Completed {
            tokens_used: outcome.tokens_used,
            replies,
        })
    }

    /// Load user and state, then check the sender's token budget
    async fn admit(&self, uow: &mut dyn UnitOfWork, message: &InboundMessage) -> Result<Admission, StepFailure> {
        let sender = message.sender_number.as_str();
        let user = uow.find_user_by_phone(sender).await?;
        let state = self.services.states.load_state(sender).await?;

        let budget = self.services.rate_limiter.budget_for(user.as_ref());
        let wait_seconds = self.services.rate_limiter.check(sender, budget).await?;
        if wait_seconds > 0 {
            return Ok(Admission::Limited(wait_seconds));
        }

        Ok(Admission::Admitted(Prepared { user, state }))
    }

    fn outbound(&self, message: &InboundMessage, reply: Reply) -> OutboundMessage {
        let outbound = OutboundMessage::text(&message.transaction_id, &message.sender_number, reply.text);
        if reply.quote_message {
            outbound.quoting(&message.message_id)
        } else {
            outbound
        }
    }

    async fn publish(&self, message: OutboundMessage) -> Result<(), StepFailure> {
        self.services
            .transport
            .publish(&message, &self.services.send_queue)
            .await?;
        Ok(())
    }

    /// Best effort; a failing transport is only logged
    async fn send_failure(&self, message: &InboundMessage) {
        let reply = OutboundMessage::text(&message.transaction_id, &message.sender_number, &self.failure_message);
        if let Err(e) = self.services.transport.publish(&reply, &self.services.send_queue).await {
            error!(transaction_id = %message.transaction_id, error = %e, "Failed to send failure reply");
        }
    }
}

async fn rollback(uow: Box<dyn UnitOfWork>) {
    if let Err(e) = uow.rollback().await {
        error!(error = %e, "Failed to roll back unit of work");
    }
}

#[async_trait]
impl MessageHandler for MessageOrchestrator {
    async fn handle_payload(&self, payload: Vec<u8>) {
        self.handle_bytes(&payload).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryDomainStore;
    use crate::middleware::rate_limit::TokenRateLimiter;
    use crate::services::ai::ScriptedInterpreter;
    use crate::services::background::BackgroundTaskManager;
    use crate::services::store::MemoryStore;
    use crate::services::transport::MemoryTransport;
    use crate::state::StateStorage;
    use std::time::Duration;

    fn orchestrator(transport: Arc<MemoryTransport>) -> MessageOrchestrator {
        let mut settings = Settings::default();
        settings.bot.phone_number = "+55 11 90000-0000".to_string();

        let store = Arc::new(MemoryStore::new());
        let services = StepServices {
            interpreter: Arc::new(ScriptedInterpreter::new()),
            rate_limiter: TokenRateLimiter::new(store.clone(), Duration::from_secs(3600), 5000),
            states: StateStorage::new(store, Duration::from_secs(3600), Duration::from_secs(30)),
            transport,
            background: BackgroundTaskManager::with_limits(1, Duration::from_millis(10)),
            send_queue: "q.message.send".to_string(),
        };
        let registry = Arc::new(StepRegistry::catalog().expect("catalog builds"));
        MessageOrchestrator::new(&settings, Arc::new(MemoryDomainStore::new()), registry, services)
    }

    fn message(sender: &str) -> InboundMessage {
        InboundMessage {
            transaction_id: "tx-1".to_string(),
            message_type: "text".to_string(),
            message_body: "hello".to_string(),
            sender_number: sender.to_string(),
            message_id: "msg-1".to_string(),
            quoted_message_id: None,
        }
    }

    #[tokio::test]
    async fn own_messages_are_ignored_in_any_format() {
        let transport = Arc::new(MemoryTransport::new());
        let orchestrator = orchestrator(transport.clone());

        let outcome = orchestrator.handle(message("5511900000000")).await;

        assert_eq!(outcome, HandleOutcome::Ignored);
        assert!(transport.published().is_empty());
    }

    #[tokio::test]
    async fn undecodable_payloads_are_dropped() {
        let transport = Arc::new(MemoryTransport::new());
        let orchestrator = orchestrator(transport.clone());

        assert_eq!(orchestrator.handle_bytes(b"{not json").await, None);
        assert!(transport.published().is_empty());
    }

    #[test]
    fn replies_quote_the_inbound_message_on_request() {
        let orchestrator = orchestrator(Arc::new(MemoryTransport::new()));
        let inbound = message("5511988887777");

        let quoted = orchestrator.outbound(
            &inbound,
            Reply {
                text: "ok".to_string(),
                quote_message: true,
            },
        );
        let plain = orchestrator.outbound(
            &inbound,
            Reply {
                text: "ok".to_string(),
                quote_message: false,
            },
        );

        assert_eq!(quoted.quoted_message_id.as_deref(), Some("msg-1"));
        assert_eq!(plain.quoted_message_id, None);
        assert_eq!(plain.recipient_number, "5511988887777");
    }
}

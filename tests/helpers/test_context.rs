//! Test context wiring the orchestrator to in-process bindings
//!
//! Everything runs in memory: the domain store, the key-value store, the
//! transport and a scripted interpreter. The background manager loop is
//! spawned on the test runtime.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use Billy::config::Settings;
use Billy::database::MemoryDomainStore;
use Billy::handlers::{HandleOutcome, MessageOrchestrator};
use Billy::middleware::TokenRateLimiter;
use Billy::models::User;
use Billy::services::ai::{Inference, InferenceRequest};
use Billy::services::{BackgroundTaskManager, Interpreter, MemoryStore, MemoryTransport, ScriptedInterpreter};
use Billy::state::{ConversationState, StateStorage, StepRegistry, StepServices};
use Billy::utils::errors::Result;

use super::test_data::{inbound, BOT_NUMBER};

pub struct TestContext {
    pub settings: Settings,
    pub domain: Arc<MemoryDomainStore>,
    pub store: Arc<MemoryStore>,
    pub interpreter: Arc<ScriptedInterpreter>,
    pub transport: Arc<MemoryTransport>,
    pub background: BackgroundTaskManager,
    pub orchestrator: MessageOrchestrator,
    message_ids: AtomicU64,
}

impl TestContext {
    pub fn new() -> Self {
        let mut settings = Settings::default();
        settings.bot.phone_number = BOT_NUMBER.to_string();
        Self::with_settings(settings)
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self::build(settings, |scripted| scripted)
    }

    /// Every interpretation call announces itself on `entered`, then waits for `gate`
    pub fn gated(entered: Arc<Notify>, gate: Arc<Notify>) -> Self {
        let mut settings = Settings::default();
        settings.bot.phone_number = BOT_NUMBER.to_string();
        Self::build(settings, move |scripted| {
            Arc::new(GatedInterpreter {
                inner: scripted,
                entered,
                gate,
            })
        })
    }

    fn build(
        settings: Settings,
        wrap: impl FnOnce(Arc<ScriptedInterpreter>) -> Arc<dyn Interpreter>,
    ) -> Self {
        let domain = Arc::new(MemoryDomainStore::new());
        let store = Arc::new(MemoryStore::new());
        let interpreter = Arc::new(ScriptedInterpreter::new());
        let transport = Arc::new(MemoryTransport::new());
        let background = BackgroundTaskManager::with_limits(2, Duration::from_millis(100));

        let runner = background.clone();
        tokio::spawn(async move { runner.run().await });

        let services = StepServices {
            interpreter: wrap(interpreter.clone()),
            rate_limiter: TokenRateLimiter::from_settings(store.clone(), &settings.rate_limit),
            states: StateStorage::new(store.clone(), settings.redis.state_ttl(), settings.bot.lock_ttl()),
            transport: transport.clone(),
            background: background.clone(),
            send_queue: settings.transport.send_queue.clone(),
        };
        let registry = Arc::new(StepRegistry::catalog().expect("Failed to build step catalog"));
        let orchestrator = MessageOrchestrator::new(&settings, domain.clone(), registry, services);

        Self {
            settings,
            domain,
            store,
            interpreter,
            transport,
            background,
            orchestrator,
            message_ids: AtomicU64::new(0),
        }
    }

    pub fn states(&self) -> &StateStorage {
        &self.orchestrator.services().states
    }

    pub fn rate_limiter(&self) -> &TokenRateLimiter {
        &self.orchestrator.services().rate_limiter
    }

    pub fn register(&self, name: &str, phone_number: &str) -> User {
        self.domain.seed_user(name, phone_number)
    }

    /// Send a text message with a fresh message id
    pub async fn send(&self, sender: &str, body: &str) -> HandleOutcome {
        let id = self.message_ids.fetch_add(1, Ordering::SeqCst) + 1;
        self.orchestrator
            .handle(inbound(sender, body, &format!("msg-{}", id)))
            .await
    }

    pub async fn state_of(&self, sender: &str) -> ConversationState {
        self.states()
            .load_state(sender)
            .await
            .expect("Failed to load conversation state")
    }

    /// Reply bodies sent to `number`, in order
    pub fn replies_to(&self, number: &str) -> Vec<String> {
        self.transport.bodies_for(number)
    }

    pub fn last_reply_to(&self, number: &str) -> Option<String> {
        self.replies_to(number).pop()
    }

    /// Wait for something published by a background task
    pub async fn wait_for_reply_to(&self, number: &str) -> String {
        for _ in 0..200 {
            if let Some(reply) = self.last_reply_to(number) {
                return reply;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("No reply was sent to {}", number);
    }
}

/// Holds every interpretation call until the test opens the gate
struct GatedInterpreter {
    inner: Arc<ScriptedInterpreter>,
    entered: Arc<Notify>,
    gate: Arc<Notify>,
}

#[async_trait]
impl Interpreter for GatedInterpreter {
    async fn infer(&self, request: InferenceRequest) -> Result<Inference> {
        self.entered.notify_one();
        self.gate.notified().await;
        self.inner.infer(request).await
    }
}

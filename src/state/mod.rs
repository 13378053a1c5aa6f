//! State management module
//!
//! This module handles conversation state, the step registry and the engine
//! that walks a sender through multi-turn dialogues.

pub mod context;
pub mod engine;
pub mod registry;
pub mod step;
pub mod storage;

// Re-export commonly used state components
pub use context::ConversationState;
pub use engine::{EngineOutcome, StepEngine, MAX_STEPS_PER_MESSAGE};
pub use registry::{StepId, StepRegistry, StepRegistryBuilder};
pub use step::{
    DeferredTask, Question, Reply, Step, StepContext, StepFailure, StepFailureKind, StepKind,
    StepResult, StepServices, Terminal, Transition, Waiting,
};
pub use storage::StateStorage;

//! Step registry
//!
//! Every dialogue step has a [`StepId`]. The registry maps ids to step
//! handlers and is assembled once at startup; registering the same id twice
//! is a startup error. Persisted state refers to steps by the id's name, so
//! names must stay stable once released.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::info;

use super::step::{Step, StepKind};
use crate::utils::errors::{BillyError, Result};

macro_rules! step_ids {
    ($($id:ident),+ $(,)?) => {
        /// Identifier of a dialogue step
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum StepId {
            $($id),+
        }

        impl StepId {
            pub const ALL: &'static [StepId] = &[$(StepId::$id),+];

            /// Name stored in conversation state
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(StepId::$id => stringify!($id)),+
                }
            }
        }

        impl FromStr for StepId {
            type Err = BillyError;

            fn from_str(name: &str) -> Result<Self> {
                match name {
                    $(stringify!($id) => Ok(StepId::$id),)+
                    other => Err(BillyError::InvalidInput(format!("Unknown step name: {}", other))),
                }
            }
        }
    };
}

step_ids! {
    InitialHandler,
    BeginRegistration,
    AskUserName,
    ProcessUserName,
    AskUserDefaultCategories,
    ProcessUserDefaultCategories,
    AskUserRegisterFakeBills,
    ProcessUserRegisterFakeBills,
    RegisterUser,
    SayGoodbye,
    HandleUserIntent,
    RegisterBill,
    RegisterCategory,
    DeleteBill,
    SumBills,
    ListCategories,
    RegisterFakeBills,
    DeleteFakeBills,
    AnalyzeExpenses,
    Usage,
    AskUserInfo,
    ChangeName,
    UpdateUserName,
    UpdateBillyMood,
    ProcessUpdateBillyMood,
    StopReceivingNotifications,
    ActivateNotifications,
    Courtesy,
    InviteTenantMember,
    SaveTenantMemberNumber,
    CheckTenantMemberNumber,
    ProcessInviteTenantMember,
    HandleTenantInvitation,
    Unknown,
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collects steps before the registry is frozen
pub struct StepRegistryBuilder {
    initial: StepId,
    fallback: StepId,
    steps: HashMap<StepId, Arc<dyn Step>>,
    order: Vec<StepId>,
}

impl StepRegistryBuilder {
    /// `initial` handles fresh dialogues, `fallback` handles unknown step names
    pub fn new(initial: StepId, fallback: StepId) -> Self {
        Self {
            initial,
            fallback,
            steps: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn register(&mut self, id: StepId, step: impl Step + 'static) -> Result<&mut Self> {
        self.register_arc(id, Arc::new(step))
    }

    pub fn register_arc(&mut self, id: StepId, step: Arc<dyn Step>) -> Result<&mut Self> {
        if self.steps.contains_key(&id) {
            return Err(BillyError::DuplicateStep(id.to_string()));
        }
        self.steps.insert(id, step);
        self.order.push(id);
        Ok(self)
    }

    pub fn build(self) -> Result<StepRegistry> {
        let required = |id: StepId| {
            self.steps.get(&id).cloned().ok_or_else(|| {
                BillyError::Config(format!("Step {} is required but was never registered", id))
            })
        };
        let initial = (self.initial, required(self.initial)?);
        let fallback = (self.fallback, required(self.fallback)?);

        Ok(StepRegistry {
            initial,
            fallback,
            steps: self.steps,
            order: self.order,
        })
    }
}

/// Frozen table of step handlers
pub struct StepRegistry {
    initial: (StepId, Arc<dyn Step>),
    fallback: (StepId, Arc<dyn Step>),
    steps: HashMap<StepId, Arc<dyn Step>>,
    order: Vec<StepId>,
}

impl StepRegistry {
    pub fn builder(initial: StepId, fallback: StepId) -> StepRegistryBuilder {
        StepRegistryBuilder::new(initial, fallback)
    }

    /// The full dialogue catalog
    pub fn catalog() -> Result<Self> {
        let mut builder = Self::builder(StepId::InitialHandler, StepId::Unknown);
        crate::steps::register_all(&mut builder)?;
        let registry = builder.build()?;

        info!(
            steps = registry.len(),
            intents = registry.intent_descriptions().len(),
            "Step registry built"
        );
        Ok(registry)
    }

    pub fn initial(&self) -> StepId {
        self.initial.0
    }

    pub fn fallback(&self) -> StepId {
        self.fallback.0
    }

    /// Step every fresh dialogue starts at
    pub fn initial_step(&self) -> (StepId, Arc<dyn Step>) {
        (self.initial.0, Arc::clone(&self.initial.1))
    }

    /// Step that handles names nothing is registered under
    pub fn fallback_step(&self) -> (StepId, Arc<dyn Step>) {
        (self.fallback.0, Arc::clone(&self.fallback.1))
    }

    pub fn get(&self, id: StepId) -> Option<Arc<dyn Step>> {
        self.steps.get(&id).cloned()
    }

    pub fn contains(&self, id: StepId) -> bool {
        self.steps.contains_key(&id)
    }

    pub fn kind(&self, id: StepId) -> Option<StepKind> {
        self.steps.get(&id).map(|step| step.kind())
    }

    /// `(step name, description)` of every routable step, in registration order
    pub fn intent_descriptions(&self) -> Vec<(&'static str, &'static str)> {
        self.order
            .iter()
            .filter_map(|id| {
                self.steps
                    .get(id)
                    .and_then(|step| step.intent_description())
                    .map(|description| (id.as_str(), description))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

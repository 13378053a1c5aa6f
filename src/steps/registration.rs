//! Registration dialogue
//!
//! ```text
//! InitialHandler -> BeginRegistration -> AskUserName -> ProcessUserName
//!   -> AskUserDefaultCategories -> ProcessUserDefaultCategories
//!   -> AskUserRegisterFakeBills -> ProcessUserRegisterFakeBills -> RegisterUser
//! ```
//!
//! Invited senders already carry a `tenant_id` in their state and skip the
//! questions about categories and sample bills.

use async_trait::async_trait;
use tracing::info;

use super::expenses::generate_fake_bills;
use super::today;
use crate::models::{CreateCategoryRequest, CreateUserRequest, InboundMessage, BASIC_CATEGORIES, DEFAULT_CATEGORY};
use crate::services::ai::prompts;
use crate::state::{
    Question, Step, StepContext, StepFailure, StepId, StepRegistryBuilder, StepResult, Terminal, Waiting,
};
use crate::utils::errors::Result;
use crate::utils::helpers::{create_aligned_text, format_phone_number};

const GREETING: &str = "Hi, I'm Billy, your financial assistant!\n\
I see this is your first message.\n\
To continue, I need to register you.";

const INVITED_GREETING: &str = "Great, welcome aboard! I just need a few details to register you.";

pub(crate) const NAME_KEY: &str = "name";
pub(crate) const TENANT_KEY: &str = "tenant_id";
const DEFAULT_CATEGORIES_KEY: &str = "register_default_categories";
const FAKE_BILLS_KEY: &str = "register_fake_bills";

pub fn register(builder: &mut StepRegistryBuilder) -> Result<()> {
    builder
        .register(StepId::InitialHandler, InitialHandler)?
        .register(StepId::BeginRegistration, BeginRegistration)?
        .register(StepId::AskUserName, Waiting(AskUserName))?
        .register(StepId::ProcessUserName, ProcessUserName)?
        .register(StepId::AskUserDefaultCategories, Waiting(AskUserDefaultCategories))?
        .register(StepId::ProcessUserDefaultCategories, ProcessUserDefaultCategories)?
        .register(StepId::AskUserRegisterFakeBills, Waiting(AskUserRegisterFakeBills))?
        .register(StepId::ProcessUserRegisterFakeBills, ProcessUserRegisterFakeBills)?
        .register(StepId::RegisterUser, Terminal(RegisterUser))?
        .register(StepId::SayGoodbye, Terminal(SayGoodbye))?;
    Ok(())
}

/// Where every fresh dialogue starts
pub struct InitialHandler;

#[async_trait]
impl Step for InitialHandler {
    async fn execute(
        &self,
        ctx: &mut StepContext<'_>,
        _message: &InboundMessage,
    ) -> std::result::Result<StepResult, StepFailure> {
        match ctx.user {
            None => Ok(StepResult::continue_to(StepId::BeginRegistration)),
            Some(_) => Ok(StepResult::continue_to(StepId::HandleUserIntent)),
        }
    }
}

pub struct BeginRegistration;

#[async_trait]
impl Step for BeginRegistration {
    async fn execute(
        &self,
        ctx: &mut StepContext<'_>,
        _message: &InboundMessage,
    ) -> std::result::Result<StepResult, StepFailure> {
        let greeting = if ctx.state.contains(TENANT_KEY) {
            INVITED_GREETING
        } else {
            GREETING
        };
        Ok(StepResult::continue_to(StepId::AskUserName).with_reply(greeting))
    }
}

pub struct AskUserName;

impl Question for AskUserName {
    fn question(&self, _ctx: &StepContext<'_>) -> std::result::Result<String, StepFailure> {
        Ok("What's your name?".to_string())
    }

    fn answer_step(&self) -> StepId {
        StepId::ProcessUserName
    }
}

pub struct ProcessUserName;

#[async_trait]
impl Step for ProcessUserName {
    async fn execute(
        &self,
        ctx: &mut StepContext<'_>,
        message: &InboundMessage,
    ) -> std::result::Result<StepResult, StepFailure> {
        let name = message.message_body.trim();
        if name.is_empty() {
            return Ok(StepResult::wait_for(StepId::ProcessUserName)
                .with_reply("I didn't catch that. What's your name?"));
        }

        ctx.state.set_data(NAME_KEY, name)?;

        if ctx.state.contains(TENANT_KEY) {
            Ok(StepResult::continue_to(StepId::RegisterUser))
        } else {
            Ok(StepResult::continue_to(StepId::AskUserDefaultCategories))
        }
    }
}

pub struct AskUserDefaultCategories;

impl Question for AskUserDefaultCategories {
    fn question(&self, _ctx: &StepContext<'_>) -> std::result::Result<String, StepFailure> {
        let names: Vec<&str> = BASIC_CATEGORIES.iter().map(|(name, _)| *name).collect();
        Ok(format!(
            "Would you like me to add the recommended categories? They are: {}",
            names.join(", ")
        ))
    }

    fn answer_step(&self) -> StepId {
        StepId::ProcessUserDefaultCategories
    }
}

pub struct ProcessUserDefaultCategories;

#[async_trait]
impl Step for ProcessUserDefaultCategories {
    async fn execute(
        &self,
        ctx: &mut StepContext<'_>,
        message: &InboundMessage,
    ) -> std::result::Result<StepResult, StepFailure> {
        let interpreter = ctx.services.interpreter.clone();
        let (tokens, register) = prompts::yes_or_no(interpreter.as_ref(), &message.message_body).await?;

        ctx.state.set_data(DEFAULT_CATEGORIES_KEY, register)?;
        Ok(StepResult::continue_to(StepId::AskUserRegisterFakeBills).with_tokens(tokens))
    }
}

pub struct AskUserRegisterFakeBills;

impl Question for AskUserRegisterFakeBills {
    fn question(&self, _ctx: &StepContext<'_>) -> std::result::Result<String, StepFailure> {
        Ok("Would you like me to generate sample bills so you can try things out? \
            You can delete them whenever you want."
            .to_string())
    }

    fn answer_step(&self) -> StepId {
        StepId::ProcessUserRegisterFakeBills
    }
}

pub struct ProcessUserRegisterFakeBills;

#[async_trait]
impl Step for ProcessUserRegisterFakeBills {
    async fn execute(
        &self,
        ctx: &mut StepContext<'_>,
        message: &InboundMessage,
    ) -> std::result::Result<StepResult, StepFailure> {
        let interpreter = ctx.services.interpreter.clone();
        let (tokens, register) = prompts::yes_or_no(interpreter.as_ref(), &message.message_body).await?;

        ctx.state.set_data(FAKE_BILLS_KEY, register)?;
        Ok(StepResult::continue_to(StepId::RegisterUser).with_tokens(tokens))
    }
}

/// Creates the user, and a tenant unless the user was invited into one
pub struct RegisterUser;

#[async_trait]
impl Step for RegisterUser {
    async fn execute(
        &self,
        ctx: &mut StepContext<'_>,
        message: &InboundMessage,
    ) -> std::result::Result<StepResult, StepFailure> {
        let name = ctx.state.get_string(NAME_KEY).ok_or_else(|| StepFailure::missing(NAME_KEY))?;
        let invited_to = ctx.state.get_i64(TENANT_KEY);
        let default_categories = ctx.state.get_bool(DEFAULT_CATEGORIES_KEY).unwrap_or(false);
        let fake_bills = ctx.state.get_bool(FAKE_BILLS_KEY).unwrap_or(false);

        let tenant_id = match invited_to {
            Some(tenant_id) => {
                ctx.uow
                    .find_tenant(tenant_id)
                    .await?
                    .ok_or_else(|| StepFailure::missing("invited tenant"))?
                    .id
            }
            None => {
                let tenant = ctx.uow.create_tenant().await?;
                let (category, description) = DEFAULT_CATEGORY;
                ctx.uow
                    .create_category(CreateCategoryRequest::new(tenant.id, category, description))
                    .await?;
                if default_categories {
                    for (category, description) in BASIC_CATEGORIES {
                        ctx.uow
                            .create_category(CreateCategoryRequest::new(tenant.id, category, description))
                            .await?;
                    }
                }
                tenant.id
            }
        };

        let user = ctx
            .uow
            .create_user(CreateUserRequest {
                name,
                phone_number: message.sender_number.clone(),
                tenant_id,
                tokens_per_hour: None,
            })
            .await?;
        info!(user_id = user.id, tenant_id = tenant_id, invited = invited_to.is_some(), "User registered");

        // Invited users share the tenant's bills
        let seed_bills = fake_bills && invited_to.is_none();
        let mut title = "*Registration complete!*".to_string();
        if seed_bills {
            let categories = ctx.uow.list_categories(tenant_id).await?;
            let bills = generate_fake_bills(&categories, tenant_id, &message.message_id, today());
            let total = ctx.uow.create_bills(bills).await?;
            ctx.uow.mark_fake_bills_generated(tenant_id).await?;
            title.push_str(&format!(
                "\nI also created {} sample bills. Just ask if you want them deleted!",
                total
            ));
        }

        let text = create_aligned_text(
            &title,
            &[vec![
                ("Name", user.name.clone()),
                ("Phone number", format_phone_number(&user.phone_number)),
                ("Tokens per hour", user.tokens_per_hour.to_string()),
                ("Sample bills?", if seed_bills { "Yes" } else { "No" }.to_string()),
            ]],
        );
        Ok(StepResult::reply(text))
    }
}

pub struct SayGoodbye;

#[async_trait]
impl Step for SayGoodbye {
    async fn execute(
        &self,
        _ctx: &mut StepContext<'_>,
        _message: &InboundMessage,
    ) -> std::result::Result<StepResult, StepFailure> {
        Ok(StepResult::reply(
            "Alright! If you change your mind, just send me a message.",
        ))
    }
}

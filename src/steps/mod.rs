//! Dialogue step catalog
//!
//! Registration walks new senders through a short questionnaire, the intent
//! router sends registered users' messages to the step that handles them,
//! and invitations let a user bring someone into their tenant.

pub mod account;
pub mod expenses;
pub mod intent;
pub mod invitation;
pub mod registration;

use chrono::{Local, NaiveDate};

use crate::state::{StepContext, StepFailure, StepRegistryBuilder};
use crate::utils::errors::Result;

/// Register every step. Routable steps are offered to the intent router in
/// this order, so the catch-all goes last.
pub fn register_all(builder: &mut StepRegistryBuilder) -> Result<()> {
    registration::register(builder)?;
    expenses::register(builder)?;
    account::register(builder)?;
    invitation::register(builder)?;
    intent::register(builder)?;
    Ok(())
}

pub(crate) fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub(crate) fn tenant_id(ctx: &StepContext<'_>) -> std::result::Result<i64, StepFailure> {
    Ok(ctx.require_user()?.tenant_id)
}

//! Expense steps: bills, categories, sums and analysis
//!
//! All of them are terminal; each answers one request and the dialogue
//! starts over afterwards.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info};

use super::{tenant_id, today};
use crate::models::{Category, InboundMessage, NewBill, DEFAULT_CATEGORY};
use crate::services::ai::prompts;
use crate::state::{Step, StepContext, StepFailure, StepId, StepRegistryBuilder, StepResult, Terminal};
use crate::utils::errors::Result;
use crate::utils::helpers::{create_aligned_text, formatted_date, formatted_money};

/// Days of sample history generated for a tenant
const FAKE_BILL_DAYS: i64 = 365;

pub fn register(builder: &mut StepRegistryBuilder) -> Result<()> {
    builder
        .register(StepId::RegisterBill, Terminal(RegisterBill))?
        .register(StepId::RegisterCategory, Terminal(RegisterCategory))?
        .register(StepId::DeleteBill, Terminal(DeleteBill))?
        .register(StepId::SumBills, Terminal(SumBills))?
        .register(StepId::ListCategories, Terminal(ListCategories))?
        .register(StepId::RegisterFakeBills, Terminal(RegisterFakeBills))?
        .register(StepId::DeleteFakeBills, Terminal(DeleteFakeBills))?
        .register(StepId::AnalyzeExpenses, Terminal(AnalyzeExpenses))?;
    Ok(())
}

/// One to three bills a day over the last year, with random values and categories
pub(crate) fn generate_fake_bills(
    categories: &[Category],
    tenant_id: i64,
    message_id: &str,
    today: NaiveDate,
) -> Vec<NewBill> {
    let mut rng = rand::thread_rng();
    let mut bills = Vec::new();

    for day in 0..FAKE_BILL_DAYS {
        let date = today - Duration::days(day);
        for _ in 0..rng.gen_range(1..=3) {
            bills.push(NewBill {
                value: f64::from(rng.gen_range(1..=1000u32)),
                date,
                original_prompt: None,
                category_id: categories.choose(&mut rng).map(|c| c.id),
                tenant_id,
                message_id: message_id.to_string(),
                fake: true,
            });
        }
    }

    bills
}

fn category_name(categories: &[Category], id: Option<i64>) -> String {
    id.and_then(|id| categories.iter().find(|c| c.id == id))
        .map(|c| c.name.clone())
        .unwrap_or_else(|| "-".to_string())
}

pub struct RegisterBill;

#[async_trait]
impl Step for RegisterBill {
    fn intent_description(&self) -> Option<&'static str> {
        Some("Information about a purchase or an expense to register")
    }

    async fn execute(
        &self,
        ctx: &mut StepContext<'_>,
        message: &InboundMessage,
    ) -> std::result::Result<StepResult, StepFailure> {
        let tenant_id = tenant_id(ctx)?;
        let interpreter = ctx.services.interpreter.clone();
        let categories = ctx.uow.list_categories(tenant_id).await?;

        let (tokens, draft) =
            prompts::bill_to_register(interpreter.as_ref(), &message.message_body, &categories, today()).await?;

        if !draft.value.is_finite() || draft.value <= 0.0 {
            return Ok(StepResult::reply("I couldn't find the value of the expense in your message.")
                .quoting()
                .with_tokens(tokens));
        }

        // Answers naming a category of another tenant land in the default one
        let category_id = draft
            .category_id
            .filter(|id| categories.iter().any(|c| c.id == *id))
            .or_else(|| {
                categories
                    .iter()
                    .find(|c| c.name == DEFAULT_CATEGORY.0)
                    .map(|c| c.id)
            });

        let bill = ctx
            .uow
            .create_bill(NewBill {
                value: draft.value,
                date: draft.date,
                original_prompt: Some(message.message_body.clone()),
                category_id,
                tenant_id,
                message_id: message.message_id.clone(),
                fake: false,
            })
            .await?;
        info!(bill_id = bill.id, tenant_id = tenant_id, "Bill registered");

        let text = create_aligned_text(
            "Bill registered",
            &[vec![
                ("Value", formatted_money(bill.value)),
                ("Category", category_name(&categories, bill.category_id)),
                ("Date", formatted_date(bill.date)),
            ]],
        );
        Ok(StepResult::reply(text).quoting().with_tokens(tokens))
    }
}

pub struct RegisterCategory;

#[async_trait]
impl Step for RegisterCategory {
    fn intent_description(&self) -> Option<&'static str> {
        Some("Request to create an expense category")
    }

    async fn execute(
        &self,
        ctx: &mut StepContext<'_>,
        message: &InboundMessage,
    ) -> std::result::Result<StepResult, StepFailure> {
        let tenant_id = tenant_id(ctx)?;
        let interpreter = ctx.services.interpreter.clone();
        let (tokens, draft) = prompts::category_to_register(interpreter.as_ref(), &message.message_body).await?;

        let name = draft.name.trim();
        if name.is_empty() {
            return Ok(StepResult::reply("I couldn't tell what the new category should be called.")
                .with_tokens(tokens));
        }

        let category = ctx
            .uow
            .create_category(crate::models::CreateCategoryRequest {
                name: name.to_string(),
                description: draft.description.filter(|d| !d.trim().is_empty()),
                tenant_id,
            })
            .await?;

        let text = create_aligned_text(
            "Category registered",
            &[vec![
                ("Name", category.name.clone()),
                ("Description", category.description.clone().unwrap_or_else(|| "-".to_string())),
            ]],
        );
        Ok(StepResult::reply(text).with_tokens(tokens))
    }
}

/// Deletes the bill created by the message the sender quotes
pub struct DeleteBill;

#[async_trait]
impl Step for DeleteBill {
    fn intent_description(&self) -> Option<&'static str> {
        Some("Request to delete a bill")
    }

    async fn execute(
        &self,
        ctx: &mut StepContext<'_>,
        message: &InboundMessage,
    ) -> std::result::Result<StepResult, StepFailure> {
        let tenant_id = tenant_id(ctx)?;

        let Some(quoted) = message.quoted_message_id.as_deref() else {
            return Ok(StepResult::reply(
                "To know which bill you want to delete, please reply to the message \
                 you sent that created it.",
            ));
        };

        let Some(bill) = ctx.uow.find_bill_by_message_id(tenant_id, quoted).await? else {
            return Ok(StepResult::reply(
                "I couldn't find the bill to delete. Either it was already deleted \
                 or you replied to the wrong message.",
            ));
        };

        let categories = ctx.uow.list_categories(tenant_id).await?;
        ctx.uow.delete_bill(bill.id).await?;
        info!(bill_id = bill.id, tenant_id = tenant_id, "Bill deleted");

        let text = create_aligned_text(
            "Bill deleted",
            &[vec![
                ("Value", formatted_money(bill.value)),
                ("Category", category_name(&categories, bill.category_id)),
                ("Date", formatted_date(bill.date)),
            ]],
        );
        Ok(StepResult::reply(text))
    }
}

pub struct SumBills;

#[async_trait]
impl Step for SumBills {
    fn intent_description(&self) -> Option<&'static str> {
        Some("Asks how much was spent in a period or on a specific day")
    }

    async fn execute(
        &self,
        ctx: &mut StepContext<'_>,
        message: &InboundMessage,
    ) -> std::result::Result<StepResult, StepFailure> {
        let tenant_id = tenant_id(ctx)?;
        let interpreter = ctx.services.interpreter.clone();
        let categories = ctx.uow.list_categories(tenant_id).await?;

        let (tokens, draft) =
            prompts::bills_query(interpreter.as_ref(), &message.message_body, &categories, today()).await?;
        let query = draft.into_query(tenant_id)?;
        let total = ctx.uow.sum_bills(&query).await?;
        debug!(from = %query.from, to = %query.to, total = total, "Bills summed");

        let mut text = if query.from == query.to {
            format!("Sum of the bills on {}", formatted_date(query.from))
        } else {
            format!(
                "Sum of the bills between {} and {}",
                formatted_date(query.from),
                formatted_date(query.to)
            )
        };
        if let Some(category) = query
            .category_id
            .and_then(|id| categories.iter().find(|c| c.id == id))
        {
            text.push_str(&format!(" in the {} category", category.name));
        }
        text.push_str(&format!(":\n*{}*", formatted_money(total)));

        Ok(StepResult::reply(text).with_tokens(tokens))
    }
}

pub struct ListCategories;

#[async_trait]
impl Step for ListCategories {
    fn intent_description(&self) -> Option<&'static str> {
        Some("Request to list the categories")
    }

    async fn execute(
        &self,
        ctx: &mut StepContext<'_>,
        _message: &InboundMessage,
    ) -> std::result::Result<StepResult, StepFailure> {
        let tenant_id = tenant_id(ctx)?;
        let categories = ctx.uow.list_categories(tenant_id).await?;

        let groups: Vec<Vec<(&str, String)>> = categories
            .iter()
            .map(|c| {
                vec![
                    ("Name", c.name.clone()),
                    ("Description", c.description.clone().unwrap_or_else(|| "-".to_string())),
                ]
            })
            .collect();

        Ok(StepResult::reply(create_aligned_text("Categories", &groups)))
    }
}

/// Sample bills can be generated once per tenant
pub struct RegisterFakeBills;

#[async_trait]
impl Step for RegisterFakeBills {
    fn intent_description(&self) -> Option<&'static str> {
        Some("Request to generate fake or sample bills")
    }

    async fn execute(
        &self,
        ctx: &mut StepContext<'_>,
        message: &InboundMessage,
    ) -> std::result::Result<StepResult, StepFailure> {
        let tenant_id = tenant_id(ctx)?;
        let tenant = ctx
            .uow
            .find_tenant(tenant_id)
            .await?
            .ok_or_else(|| StepFailure::missing("tenant"))?;

        if tenant.generated_fake_bills {
            return Ok(StepResult::reply(
                "You have already generated sample bills. Unfortunately I can't do it again.",
            ));
        }

        let categories = ctx.uow.list_categories(tenant_id).await?;
        let bills = generate_fake_bills(&categories, tenant_id, &message.message_id, today());
        let total = ctx.uow.create_bills(bills).await?;
        ctx.uow.mark_fake_bills_generated(tenant_id).await?;
        info!(tenant_id = tenant_id, total = total, "Sample bills generated");

        Ok(StepResult::reply(format!("I created a total of {} sample bills!", total)))
    }
}

pub struct DeleteFakeBills;

#[async_trait]
impl Step for DeleteFakeBills {
    fn intent_description(&self) -> Option<&'static str> {
        Some("Request to delete the fake or sample bills")
    }

    async fn execute(
        &self,
        ctx: &mut StepContext<'_>,
        _message: &InboundMessage,
    ) -> std::result::Result<StepResult, StepFailure> {
        let tenant_id = tenant_id(ctx)?;
        let count = ctx.uow.delete_fake_bills(tenant_id).await?;

        Ok(StepResult::reply(format!(
            "I removed all your sample bills.\nRemoved a total of *{}* bills.",
            count
        )))
    }
}

pub struct AnalyzeExpenses;

#[async_trait]
impl Step for AnalyzeExpenses {
    fn intent_description(&self) -> Option<&'static str> {
        Some("Request to analyze spending")
    }

    async fn execute(
        &self,
        ctx: &mut StepContext<'_>,
        message: &InboundMessage,
    ) -> std::result::Result<StepResult, StepFailure> {
        let tenant_id = tenant_id(ctx)?;
        let interpreter = ctx.services.interpreter.clone();
        let categories = ctx.uow.list_categories(tenant_id).await?;

        let (query_tokens, draft) =
            prompts::bills_query(interpreter.as_ref(), &message.message_body, &categories, today()).await?;
        let query = draft.into_query(tenant_id)?;
        let bills = ctx.uow.list_bills(&query).await?;

        if bills.is_empty() {
            return Ok(StepResult::reply("I couldn't find any bills in that period to analyze.")
                .with_tokens(query_tokens));
        }

        let (analysis_tokens, analysis) =
            prompts::expenses_analysis(interpreter.as_ref(), &categories, &bills).await?;

        Ok(StepResult::reply(analysis)
            .with_tokens(query_tokens)
            .with_tokens(analysis_tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(id: i64, name: &str) -> Category {
        Category {
            id,
            name: name.to_string(),
            description: None,
            tenant_id: 1,
        }
    }

    #[test]
    fn fake_bills_cover_a_year() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let categories = vec![category(1, "Other"), category(2, "Food")];

        let bills = generate_fake_bills(&categories, 1, "msg-1", today);

        assert!(bills.len() >= 365 && bills.len() <= 3 * 365);
        assert!(bills.iter().all(|b| b.fake && b.tenant_id == 1));
        assert!(bills.iter().all(|b| (1.0..=1000.0).contains(&b.value)));
        assert!(bills.iter().all(|b| matches!(b.category_id, Some(1) | Some(2))));
        assert_eq!(bills.iter().map(|b| b.date).max(), Some(today));
        assert_eq!(
            bills.iter().map(|b| b.date).min(),
            Some(today - Duration::days(364))
        );
    }

    #[test]
    fn unknown_category_names_render_as_dash() {
        let categories = vec![category(1, "Other")];
        assert_eq!(category_name(&categories, Some(1)), "Other");
        assert_eq!(category_name(&categories, Some(9)), "-");
        assert_eq!(category_name(&categories, None), "-");
    }
}

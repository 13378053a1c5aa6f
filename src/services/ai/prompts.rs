//! Prompts, answer schemas and typed interpretation calls

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{InferenceRequest, Interpreter};
use crate::models::{Bill, BillQuery, BillyMood, Category};
use crate::utils::errors::{BillyError, Result};

pub const INTENT_PROMPT: &str = "You are an assistant that finds out the intent of a message. \
These are the possible contents of the message and what must be returned";

const YES_OR_NO_PROMPT: &str = "Decide whether the user's message is an affirmative (true) \
or a negative (false) answer to a yes/no question.";

const REGISTER_CATEGORY_PROMPT: &str = "Extract the name of the expense category the user \
wants to create and, when given, a short description of what belongs to it.";

const CHOSEN_MOOD_PROMPT: &str = "The user is choosing the mood a chat assistant answers in. \
Pick the option that matches their message: NEUTRAL, SARCASTIC, GRUMPY, HAPPY or SAD.";

const COURTESY_PROMPT: &str = "You are Billy, a friendly financial assistant on a chat app. \
Answer the user's greeting, thanks or farewell briefly and politely.";

/// A bill extracted from a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillDraft {
    pub value: f64,
    pub date: NaiveDate,
    pub category_id: Option<i64>,
}

/// A date range, and optionally a category, extracted from a question about bills
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillsQueryDraft {
    pub range: Vec<NaiveDate>,
    pub category_id: Option<i64>,
}

impl BillsQueryDraft {
    /// One date means that day; two dates are an inclusive range in either order
    pub fn into_query(self, tenant_id: i64) -> Result<BillQuery> {
        let (from, to) = match self.range.as_slice() {
            [day] => (*day, *day),
            [a, b] if a <= b => (*a, *b),
            [a, b] => (*b, *a),
            other => {
                return Err(BillyError::Interpretation(format!(
                    "Expected one or two dates, got {}",
                    other.len()
                )))
            }
        };

        Ok(BillQuery {
            tenant_id,
            from,
            to,
            category_id: self.category_id,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDraft {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Deserialize)]
struct IntentAnswer {
    intent: String,
}

#[derive(Deserialize)]
struct YesOrNoAnswer {
    value: bool,
}

#[derive(Deserialize)]
struct MoodAnswer {
    mood: BillyMood,
}

#[derive(Serialize)]
struct CategorySummary<'a> {
    id: i64,
    name: &'a str,
    description: Option<&'a str>,
}

fn categories_json(categories: &[Category]) -> Result<String> {
    let summaries: Vec<CategorySummary<'_>> = categories
        .iter()
        .map(|c| CategorySummary {
            id: c.id,
            name: &c.name,
            description: c.description.as_deref(),
        })
        .collect();
    Ok(serde_json::to_string(&summaries)?)
}

fn intent_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": { "intent": { "type": "STRING" } },
        "required": ["intent"]
    })
}

fn yes_or_no_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": { "value": { "type": "BOOLEAN" } },
        "required": ["value"]
    })
}

fn mood_schema() -> Value {
    let moods: Vec<&str> = BillyMood::ALL.iter().map(BillyMood::as_str).collect();
    json!({
        "type": "OBJECT",
        "properties": { "mood": { "type": "STRING", "enum": moods } },
        "required": ["mood"]
    })
}

fn bill_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "value": { "type": "NUMBER" },
            "date": { "type": "STRING", "description": "YYYY-MM-DD" },
            "category_id": { "type": "INTEGER", "nullable": true }
        },
        "required": ["value", "date"]
    })
}

fn bills_query_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "range": {
                "type": "ARRAY",
                "items": { "type": "STRING", "description": "YYYY-MM-DD" },
                "minItems": 1,
                "maxItems": 2
            },
            "category_id": { "type": "INTEGER", "nullable": true }
        },
        "required": ["range"]
    })
}

fn category_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "name": { "type": "STRING" },
            "description": { "type": "STRING", "nullable": true }
        },
        "required": ["name"]
    })
}

async fn structured<T: DeserializeOwned>(
    interpreter: &dyn Interpreter,
    request: InferenceRequest,
) -> Result<(u64, T)> {
    let inference = interpreter.infer(request).await?;
    let answer = serde_json::from_value(inference.content).map_err(|e| {
        BillyError::Interpretation(format!("Answer does not match schema: {}", e))
    })?;
    Ok((inference.tokens, answer))
}

async fn text(interpreter: &dyn Interpreter, request: InferenceRequest) -> Result<(u64, String)> {
    let inference = interpreter.infer(request).await?;
    match inference.content {
        Value::String(answer) => Ok((inference.tokens, answer)),
        other => Ok((inference.tokens, other.to_string())),
    }
}

/// Append one routing line per intent to the intent prompt
pub fn intent_system_prompt<'a>(intents: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut prompt = INTENT_PROMPT.to_string();
    for (step_name, description) in intents {
        prompt.push_str(&format!("\n{}: '{}'", description, step_name));
    }
    prompt
}

/// Name of the step the message should be routed to
pub async fn user_intent(
    interpreter: &dyn Interpreter,
    system_prompt: String,
    message: &str,
) -> Result<(u64, String)> {
    let request = InferenceRequest::new(vec![system_prompt, message.to_string()])
        .with_schema(intent_schema());
    let (tokens, answer): (u64, IntentAnswer) = structured(interpreter, request).await?;
    Ok((tokens, answer.intent))
}

pub async fn yes_or_no(interpreter: &dyn Interpreter, message: &str) -> Result<(u64, bool)> {
    let request = InferenceRequest::new(vec![YES_OR_NO_PROMPT.to_string(), message.to_string()])
        .with_schema(yes_or_no_schema());
    let (tokens, answer): (u64, YesOrNoAnswer) = structured(interpreter, request).await?;
    Ok((tokens, answer.value))
}

pub async fn bill_to_register(
    interpreter: &dyn Interpreter,
    message: &str,
    categories: &[Category],
    today: NaiveDate,
) -> Result<(u64, BillDraft)> {
    let prompt = format!(
        "Extract the expense the user wants to register: its value, its date (today is {}) \
         and the id of the best matching category from this list: {}",
        today.format("%Y-%m-%d"),
        categories_json(categories)?
    );
    let request =
        InferenceRequest::new(vec![prompt, message.to_string()]).with_schema(bill_schema());
    structured(interpreter, request).await
}

pub async fn bills_query(
    interpreter: &dyn Interpreter,
    message: &str,
    categories: &[Category],
    today: NaiveDate,
) -> Result<(u64, BillsQueryDraft)> {
    let prompt = format!(
        "The user is asking about expenses in a day or period (today is {}). Return the day, or \
         the first and last day of the period, and the id of the category when one is mentioned. \
         Categories: {}",
        today.format("%Y-%m-%d"),
        categories_json(categories)?
    );
    let request =
        InferenceRequest::new(vec![prompt, message.to_string()]).with_schema(bills_query_schema());
    structured(interpreter, request).await
}

pub async fn category_to_register(
    interpreter: &dyn Interpreter,
    message: &str,
) -> Result<(u64, CategoryDraft)> {
    let request = InferenceRequest::new(vec![
        REGISTER_CATEGORY_PROMPT.to_string(),
        message.to_string(),
    ])
    .with_schema(category_schema());
    structured(interpreter, request).await
}

pub async fn expenses_analysis(
    interpreter: &dyn Interpreter,
    categories: &[Category],
    bills: &[Bill],
) -> Result<(u64, String)> {
    let bills_json = serde_json::to_string(bills)?;
    let prompt = format!(
        "You are a financial assistant. Write a short analysis of the user's spending trends, \
         pointing out the categories that weigh the most and anything unusual. \
         Categories: {} Bills: {}",
        categories_json(categories)?,
        bills_json
    );
    let request = InferenceRequest::new(vec![prompt])
        .with_max_tokens(300)
        .with_temperature(0.7);
    text(interpreter, request).await
}

pub async fn chosen_mood(interpreter: &dyn Interpreter, message: &str) -> Result<(u64, BillyMood)> {
    let request = InferenceRequest::new(vec![CHOSEN_MOOD_PROMPT.to_string(), message.to_string()])
        .with_schema(mood_schema());
    let (tokens, answer): (u64, MoodAnswer) = structured(interpreter, request).await?;
    Ok((tokens, answer.mood))
}

/// Rewrite an assistant reply in `mood`, keeping its content and formatting
pub async fn reply_in_mood(interpreter: &dyn Interpreter, reply: &str, mood: BillyMood) -> Result<(u64, String)> {
    let prompt = format!(
        "Rewrite the following message from Billy, a financial assistant, with a {} mood. \
         Keep every value, date, name and the *bold* and ```monospaced``` markup exactly as they are. \
         Answer with the rewritten message only.",
        mood.label()
    );
    let request = InferenceRequest::new(vec![prompt, reply.to_string()])
        .with_max_tokens(500)
        .with_temperature(0.7);
    text(interpreter, request).await
}

pub async fn courtesy_answer(interpreter: &dyn Interpreter, message: &str) -> Result<(u64, String)> {
    let request = InferenceRequest::new(vec![COURTESY_PROMPT.to_string(), message.to_string()])
        .with_temperature(0.7);
    text(interpreter, request).await
}

//! Expense models: categories and bills

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Category every tenant gets on registration
pub const DEFAULT_CATEGORY: (&str, &str) = ("Other", "Anything that does not fit another category");

/// Categories offered during registration
pub const BASIC_CATEGORIES: &[(&str, &str)] = &[
    ("Food", "Groceries, restaurants and delivery"),
    ("Transport", "Fuel, public transport, ride sharing and parking"),
    ("Housing", "Rent, utilities, maintenance and furniture"),
    ("Health", "Pharmacy, appointments, exams and health insurance"),
    ("Leisure", "Trips, bars, streaming, games and hobbies"),
    ("Education", "Courses, books and school fees"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub tenant_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub description: Option<String>,
    pub tenant_id: i64,
}

impl CreateCategoryRequest {
    pub fn new(tenant_id: i64, name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: Some(description.to_string()),
            tenant_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Bill {
    pub id: i64,
    pub value: f64,
    pub date: NaiveDate,
    pub original_prompt: Option<String>,
    pub category_id: Option<i64>,
    pub tenant_id: i64,
    pub message_id: String,
    pub fake: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBill {
    pub value: f64,
    pub date: NaiveDate,
    pub original_prompt: Option<String>,
    pub category_id: Option<i64>,
    pub tenant_id: i64,
    pub message_id: String,
    pub fake: bool,
}

/// Filter for summing or listing a tenant's bills over an inclusive date range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillQuery {
    pub tenant_id: i64,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub category_id: Option<i64>,
}

impl BillQuery {
    pub fn matches(&self, bill: &Bill) -> bool {
        bill.tenant_id == self.tenant_id
            && bill.date >= self.from
            && bill.date <= self.to
            && self.category_id.map_or(true, |id| bill.category_id == Some(id))
    }
}

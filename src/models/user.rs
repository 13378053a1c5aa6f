//! User and tenant models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Token budget granted to newly registered users
pub const DEFAULT_TOKENS_PER_HOUR: i64 = 5000;

/// Tone the assistant answers a user in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "billymood", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum BillyMood {
    #[default]
    Neutral,
    Sarcastic,
    Grumpy,
    Happy,
    Sad,
}

impl BillyMood {
    pub const ALL: [BillyMood; 5] = [
        BillyMood::Neutral,
        BillyMood::Sarcastic,
        BillyMood::Grumpy,
        BillyMood::Happy,
        BillyMood::Sad,
    ];

    /// Name stored in the database and used in answer schemas
    pub fn as_str(&self) -> &'static str {
        match self {
            BillyMood::Neutral => "NEUTRAL",
            BillyMood::Sarcastic => "SARCASTIC",
            BillyMood::Grumpy => "GRUMPY",
            BillyMood::Happy => "HAPPY",
            BillyMood::Sad => "SAD",
        }
    }

    /// Name shown to users
    pub fn label(&self) -> &'static str {
        match self {
            BillyMood::Neutral => "neutral",
            BillyMood::Sarcastic => "sarcastic",
            BillyMood::Grumpy => "grumpy",
            BillyMood::Happy => "happy",
            BillyMood::Sad => "sad",
        }
    }
}

/// A group of users sharing categories and bills
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub id: i64,
    pub generated_fake_bills: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub phone_number: String,
    pub tenant_id: i64,
    pub tokens_per_hour: i64,
    pub send_notification: bool,
    pub billy_mood: BillyMood,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Rolling token budget for the rate limiter; negative values count as zero
    pub fn token_budget(&self) -> u64 {
        u64::try_from(self.tokens_per_hour).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub phone_number: String,
    pub tenant_id: i64,
    pub tokens_per_hour: Option<i64>,
}

//! Rate limiting middleware
//!
//! Caps how many interpretation tokens a sender may spend within a rolling
//! window. Every processed message leaves one usage record
//! (`user:{sender}:token_usage:{transaction_id}`) that expires on its own
//! after the window, so the budget slides continuously instead of resetting
//! on bucket boundaries. When the budget is spent, the wait is the time
//! until the oldest record expires.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::RateLimitSettings;
use crate::models::User;
use crate::services::store::{escape_glob, KeyValueStore};
use crate::utils::errors::Result;
use crate::utils::logging::log_rate_limit_exceeded;

/// Rate limit status for a sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Tokens spent within the window
    pub used: u64,
    pub budget: u64,
    pub remaining: u64,
    /// Seconds until processing may resume; 0 when under budget
    pub wait_seconds: u64,
}

impl RateLimitStatus {
    pub fn is_limited(&self) -> bool {
        self.wait_seconds > 0
    }
}

/// Store-backed sliding token budget
#[derive(Clone)]
pub struct TokenRateLimiter {
    store: Arc<dyn KeyValueStore>,
    window: Duration,
    default_budget: u64,
}

impl TokenRateLimiter {
    pub fn new(store: Arc<dyn KeyValueStore>, window: Duration, default_budget: u64) -> Self {
        Self {
            store,
            window,
            default_budget,
        }
    }

    pub fn from_settings(store: Arc<dyn KeyValueStore>, settings: &RateLimitSettings) -> Self {
        Self::new(store, settings.window(), settings.default_tokens_per_window)
    }

    /// Budget for senders that are not registered yet
    pub fn default_budget(&self) -> u64 {
        self.default_budget
    }

    pub fn budget_for(&self, user: Option<&User>) -> u64 {
        user.map_or(self.default_budget, User::token_budget)
    }

    fn usage_key(sender: &str, transaction_id: &str) -> String {
        format!("user:{}:token_usage:{}", sender, transaction_id)
    }

    fn usage_pattern(sender: &str) -> String {
        format!("user:{}:token_usage:*", escape_glob(sender))
    }

    /// Live usage records of a sender as `(key, tokens)`
    async fn records(&self, sender: &str) -> Result<Vec<(String, u64)>> {
        let keys = self.store.scan(&Self::usage_pattern(sender)).await?;
        let mut records = Vec::with_capacity(keys.len());

        for key in keys {
            // Records may expire between scan and read
            let Some(raw) = self.store.get(&key).await? else {
                continue;
            };
            match raw.trim().parse::<u64>() {
                Ok(tokens) => records.push((key, tokens)),
                Err(_) => warn!(key = %key, value = %raw, "Ignoring unreadable token usage record"),
            }
        }

        Ok(records)
    }

    /// Tokens spent by the sender within the window
    pub async fn usage(&self, sender: &str) -> Result<u64> {
        Ok(self.records(sender).await?.iter().map(|(_, tokens)| tokens).sum())
    }

    pub async fn status(&self, sender: &str, budget: u64) -> Result<RateLimitStatus> {
        let records = self.records(sender).await?;
        let used: u64 = records.iter().map(|(_, tokens)| tokens).sum();

        let wait_seconds = if used < budget {
            0
        } else {
            let mut soonest: Option<u64> = None;
            for (key, _) in &records {
                // A record with less than half a second left reports 0
                let ttl = self.store.ttl(key).await?;
                if ttl >= 0 {
                    let ttl = ttl as u64;
                    soonest = Some(soonest.map_or(ttl, |current| current.min(ttl)));
                }
            }
            // Nothing left that will expire: the whole window has to pass
            soonest
                .unwrap_or_else(|| self.window.as_secs())
                .max(1)
        };

        Ok(RateLimitStatus {
            used,
            budget,
            remaining: budget.saturating_sub(used),
            wait_seconds,
        })
    }

    /// Seconds the sender must wait before spending more tokens; 0 means go ahead
    pub async fn check(&self, sender: &str, budget: u64) -> Result<u64> {
        let status = self.status(sender, budget).await?;
        if status.is_limited() {
            log_rate_limit_exceeded(sender, status.used, budget, status.wait_seconds);
        } else {
            debug!(sender = sender, used = status.used, budget = budget, "Token budget available");
        }
        Ok(status.wait_seconds)
    }

    /// Charge a transaction's tokens. Call once per transaction.
    pub async fn record(&self, sender: &str, transaction_id: &str, tokens: u64) -> Result<()> {
        if tokens == 0 {
            return Ok(());
        }

        self.store
            .set(
                &Self::usage_key(sender, transaction_id),
                &tokens.to_string(),
                Some(self.window),
            )
            .await?;
        debug!(sender = sender, transaction_id = transaction_id, tokens = tokens, "Token usage recorded");
        Ok(())
    }
}

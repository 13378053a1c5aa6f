//! State storage implementation
//!
//! Persists conversation state and the per-sender processing lock in the
//! key-value store:
//!
//! - `user:{sender}:state`: the sender's [`ConversationState`], refreshed
//!   with the state TTL on every save
//! - `user:{sender}:lock`: present while a message from the sender is being
//!   processed; holds the holder's token and expires on its own if the
//!   holder dies

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};
use uuid::Uuid;

use super::context::ConversationState;
use crate::services::store::{KeyValueStore, KeyValueStoreExt};
use crate::utils::errors::Result;

/// Store-backed state and lock manager
#[derive(Clone)]
pub struct StateStorage {
    store: Arc<dyn KeyValueStore>,
    state_ttl: Duration,
    lock_ttl: Duration,
}

impl StateStorage {
    pub fn new(store: Arc<dyn KeyValueStore>, state_ttl: Duration, lock_ttl: Duration) -> Self {
        Self {
            store,
            state_ttl,
            lock_ttl,
        }
    }

    fn state_key(sender: &str) -> String {
        format!("user:{}:state", sender)
    }

    fn lock_key(sender: &str) -> String {
        format!("user:{}:lock", sender)
    }

    /// Load a sender's state; missing or unreadable state starts a fresh dialogue
    pub async fn load_state(&self, sender: &str) -> Result<ConversationState> {
        let key = Self::state_key(sender);
        match self.store.get_json::<ConversationState>(&key).await {
            Ok(Some(state)) => {
                debug!(sender = sender, next_step = ?state.next_step(), "State loaded");
                Ok(state)
            }
            Ok(None) => {
                debug!(sender = sender, "No state found, starting fresh");
                Ok(ConversationState::new())
            }
            Err(crate::utils::errors::BillyError::Serialization(e)) => {
                error!(sender = sender, error = %e, "Stored state is unreadable, starting fresh");
                Ok(ConversationState::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Save a sender's state; an empty state removes the key
    pub async fn save_state(&self, sender: &str, state: &ConversationState) -> Result<()> {
        let key = Self::state_key(sender);
        if state.is_empty() {
            self.store.delete(&[key]).await?;
            debug!(sender = sender, "State cleared");
            return Ok(());
        }

        self.store.set_json(&key, state, Some(self.state_ttl)).await?;
        debug!(sender = sender, next_step = ?state.next_step(), "State saved");
        Ok(())
    }

    /// Try to become the only processor of the sender's messages.
    ///
    /// Returns the token the lock must be released with, or `None` when
    /// another holder has it.
    pub async fn acquire_lock(&self, sender: &str) -> Result<Option<String>> {
        let token = Uuid::new_v4().simple().to_string();
        let acquired = self
            .store
            .set_if_absent(&Self::lock_key(sender), &token, self.lock_ttl)
            .await?;
        debug!(sender = sender, acquired = acquired, "Sender lock requested");
        Ok(acquired.then_some(token))
    }

    /// Release the lock if `token` still holds it. An expired lock that was
    /// taken over by another holder is left alone.
    pub async fn release_lock(&self, sender: &str, token: &str) -> Result<()> {
        let released = self.store.delete_if_equals(&Self::lock_key(sender), token).await?;
        if !released {
            warn!(sender = sender, "Sender lock expired before release");
        }
        Ok(())
    }
}

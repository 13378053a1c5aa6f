//! Conversation state
//!
//! Per-sender dialogue state persisted between messages: an optional
//! `next_step` naming the step that consumes the next message, plus
//! whatever fields the dialogue collected so far. Stored as one flat JSON
//! object, e.g. `{"next_step": "ProcessUserName", "tenant_id": 4}`.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::registry::StepId;
use crate::utils::errors::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    next_step: Option<String>,
    /// Dialogue fields collected so far
    #[serde(flatten)]
    data: HashMap<String, Value>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw name of the step awaiting the next message
    pub fn next_step(&self) -> Option<&str> {
        self.next_step.as_deref()
    }

    pub fn set_next_step(&mut self, step: StepId) {
        self.next_step = Some(step.as_str().to_string());
    }

    pub fn clear_next_step(&mut self) {
        self.next_step = None;
    }

    /// Set data for the current dialogue
    pub fn set_data<T: Serialize>(&mut self, key: &str, value: T) -> Result<()> {
        let json_value = serde_json::to_value(value)?;
        self.data.insert(key.to_string(), json_value);
        Ok(())
    }

    /// Get data from the current dialogue
    pub fn get_data<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.data.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Get string data (convenience method)
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.data.get(key).and_then(Value::as_str).map(str::to_string)
    }

    /// Get boolean data (convenience method)
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.data.get(key).and_then(Value::as_bool)
    }

    /// Get integer data (convenience method)
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.data.get(key).and_then(Value::as_i64)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn remove_data(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// Forget everything, including `next_step`
    pub fn clear(&mut self) {
        self.next_step = None;
        self.data.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.next_step.is_none() && self.data.is_empty()
    }
}

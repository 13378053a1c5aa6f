//! Queue payloads exchanged with the messaging gateway

use serde::{Deserialize, Deserializer, Serialize};

pub const TEXT_MESSAGE_TYPE: &str = "text";

/// A chat message received from the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub transaction_id: String,
    pub message_type: String,
    pub message_body: String,
    pub sender_number: String,
    pub message_id: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub quoted_message_id: Option<String>,
}

/// A reply handed back to the gateway for delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub transaction_id: String,
    pub message_type: String,
    pub message_body: String,
    pub recipient_number: String,
    pub quoted_message_id: Option<String>,
}

impl OutboundMessage {
    pub fn text(transaction_id: &str, recipient_number: &str, body: impl Into<String>) -> Self {
        Self {
            transaction_id: transaction_id.to_string(),
            message_type: TEXT_MESSAGE_TYPE.to_string(),
            message_body: body.into(),
            recipient_number: recipient_number.to_string(),
            quoted_message_id: None,
        }
    }

    pub fn quoting(mut self, message_id: &str) -> Self {
        self.quoted_message_id = Some(message_id.to_string());
        self
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|id| !id.trim().is_empty()))
}

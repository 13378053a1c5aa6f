//! Test data: phone numbers, inbound messages and scripted answers

use serde_json::{json, Value};

use Billy::models::{InboundMessage, TEXT_MESSAGE_TYPE};

pub const BOT_NUMBER: &str = "5511900000000";
pub const NEW_SENDER: &str = "5511988887777";
pub const REGISTERED_SENDER: &str = "5511977776666";
pub const INVITEE: &str = "5511988881111";

pub fn inbound(sender: &str, body: &str, message_id: &str) -> InboundMessage {
    InboundMessage {
        transaction_id: format!("tx-{}", message_id),
        message_type: TEXT_MESSAGE_TYPE.to_string(),
        message_body: body.to_string(),
        sender_number: sender.to_string(),
        message_id: message_id.to_string(),
        quoted_message_id: None,
    }
}

/// Interpreter answer routing a message to a step
pub fn intent(step: &str) -> Value {
    json!({ "intent": step })
}

pub fn yes() -> Value {
    json!({ "value": true })
}

pub fn no() -> Value {
    json!({ "value": false })
}

pub fn bill(value: f64, date: &str) -> Value {
    json!({ "value": value, "date": date, "category_id": null })
}

pub fn bills_range(from: &str, to: &str) -> Value {
    json!({ "range": [from, to], "category_id": null })
}

//! Helper functions and utilities
//!
//! This module contains common helper functions used throughout the application,
//! mostly for formatting chat replies.

use chrono::NaiveDate;

/// Country code prepended to numbers typed without one
pub const DEFAULT_COUNTRY_CODE: &str = "55";

/// Format a date for user display
pub fn formatted_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Format a monetary value for user display
pub fn formatted_money(value: f64) -> String {
    format!("$ {:.2}", value)
}

/// Render a titled block of `header`/`value` pairs for a chat reply.
///
/// Headers are bold and values are monospaced so columns line up on
/// phones. Each group of rows is separated by a blank line.
pub fn create_aligned_text(title: &str, groups: &[Vec<(&str, String)>]) -> String {
    let mut text = String::new();

    if !title.is_empty() {
        text.push_str(title);
        text.push('\n');
    }

    for (index, rows) in groups.iter().enumerate() {
        if index > 0 {
            text.push('\n');
        }
        for (header, value) in rows {
            text.push_str(&format!("\n*{}*\n```{}```", header, value));
        }
    }

    text
}

/// Strip everything but digits and add the default country code to short numbers
pub fn normalize_phone_number(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();

    if digits.len() < 10 {
        format!("{}{}", DEFAULT_COUNTRY_CODE, digits)
    } else {
        digits
    }
}

/// A normalized number needs country code, area code and at least 8 digits
pub fn is_valid_phone_number(digits: &str) -> bool {
    digits.len() >= 12 && digits.chars().all(|c| c.is_ascii_digit())
}

/// Format a normalized number as `+CC (AA) XXXX-XXXX` or `+CC (AA) XXXXX-XXXX`
pub fn format_phone_number(digits: &str) -> String {
    if !is_valid_phone_number(digits) {
        return digits.to_string();
    }

    let split = if digits.len() == 12 { 8 } else { 9 };
    let end = digits.len().min(split + 4);
    format!(
        "+{} ({}) {}-{}",
        &digits[0..2],
        &digits[2..4],
        &digits[4..split],
        &digits[split..end]
    )
}

/// Truncate text to a maximum number of characters with ellipsis
pub fn truncate_text(text: &str, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max_length.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

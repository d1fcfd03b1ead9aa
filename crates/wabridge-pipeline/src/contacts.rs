// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sender string parsing.
//!
//! WhatsApp Web shows senders either as a saved name, a bare number, or
//! `Name (+49 151 2345678)`.

use std::sync::LazyLock;

use regex::Regex;

static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+(\d{1,3}[\s-]?\d{4,14})").expect("phone pattern is valid"));

/// Display name shown for records without a sender.
pub const UNKNOWN_SENDER: &str = "Unknown";

/// A sender split into display name and phone digits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub display_name: String,
    pub phone: Option<String>,
}

/// Splits a scraped sender string into display name and phone.
///
/// The phone keeps digits only. The display name is the sender with the
/// `(+…)` group removed, or the whole sender if nothing else is left.
pub fn parse_sender(sender: &str) -> Contact {
    let sender = sender.trim();
    if sender.is_empty() {
        return Contact {
            display_name: UNKNOWN_SENDER.to_string(),
            phone: None,
        };
    }

    let Some(captures) = PHONE_PATTERN.captures(sender) else {
        return Contact {
            display_name: sender.to_string(),
            phone: None,
        };
    };

    let whole = captures.get(0).map_or("", |m| m.as_str());
    let digits = captures.get(1).map_or("", |m| m.as_str());
    let phone: String = digits.chars().filter(char::is_ascii_digit).collect();

    let display_name = sender.replace(&format!("({whole})"), "");
    let display_name = display_name.trim();
    let display_name = if display_name.is_empty() {
        sender
    } else {
        display_name
    };

    Contact {
        display_name: display_name.to_string(),
        phone: Some(phone),
    }
}

/// Reduces an explicit phone field to its digits, `None` if there are none.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() { None } else { Some(digits) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_with_phone_in_parentheses() {
        let c = parse_sender("Alice (+49 151 2345678)");
        assert_eq!(c.display_name, "Alice");
        assert_eq!(c.phone.as_deref(), Some("491512345678"));
    }

    #[test]
    fn bare_number_keeps_number_as_name() {
        let c = parse_sender("+1-5551234567");
        assert_eq!(c.display_name, "+1-5551234567");
        assert_eq!(c.phone.as_deref(), Some("15551234567"));
    }

    #[test]
    fn saved_contact_has_no_phone() {
        let c = parse_sender("  Mom  ");
        assert_eq!(c.display_name, "Mom");
        assert_eq!(c.phone, None);
    }

    #[test]
    fn empty_sender_is_unknown() {
        assert_eq!(parse_sender("").display_name, UNKNOWN_SENDER);
    }

    #[test]
    fn explicit_phone_is_reduced_to_digits() {
        assert_eq!(normalize_phone("+49 (151) 234-5678").as_deref(), Some("491512345678"));
        assert_eq!(normalize_phone("n/a"), None);
    }
}

// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound message rendering.

use wabridge_core::types::{DeliveryRequest, Direction, MediaOutcome, MediaPayload, Message};

/// Renders the label used for a sender: `Alice (491512345678)`.
pub fn sender_label(message: &Message) -> String {
    format!(
        "{} ({})",
        message.sender_name,
        message.sender_phone.as_deref().unwrap_or("unknown")
    )
}

fn header(message: &Message) -> String {
    let arrow = match message.direction {
        Direction::Incoming => "📥 Received",
        Direction::Outgoing => "📤 Sent",
    };
    let kind = if message.has_media() {
        "WhatsApp Media"
    } else {
        "WhatsApp Message"
    };
    format!("{arrow} {kind}")
}

fn time_line(message: &Message) -> String {
    let time = message
        .timestamp
        .map_or_else(|| "unknown".to_string(), |ts| ts.to_rfc3339());
    format!("🕒 Time: {time}")
}

/// Renders the full body for a message and its media outcome.
pub fn format_body(message: &Message, media: &MediaOutcome) -> String {
    let mut lines = vec![
        header(message),
        format!("👤 Contact: {}", sender_label(message)),
        format!("💬 Chat: {}", message.chat_id),
    ];
    if !message.body.is_empty() {
        lines.push(format!("📝 Message: {}", message.body));
    }
    lines.push(time_line(message));

    match media {
        MediaOutcome::Failed { reason } => lines.push(format!("⚠️ Media unavailable: {reason}")),
        MediaOutcome::Deferred => lines.push("📎 Media follows".to_string()),
        MediaOutcome::None | MediaOutcome::Ready(_) => {}
    }
    lines.join("\n")
}

/// Builds the delivery request for a resolved message.
pub fn build_request(message: &Message, media: &MediaOutcome) -> DeliveryRequest {
    let payload = match media {
        MediaOutcome::Ready(payload) => Some(payload.clone()),
        _ => None,
    };
    DeliveryRequest {
        chat_label: message.chat_id.clone(),
        sender_label: sender_label(message),
        body: format_body(message, media),
        media: payload,
    }
}

/// Builds the follow-up request that carries media delivered after its text.
pub fn build_follow_up(message: &Message, payload: MediaPayload) -> DeliveryRequest {
    let caption = [
        header(message),
        format!("👤 Contact: {}", sender_label(message)),
        format!("💬 Chat: {}", message.chat_id),
        time_line(message),
    ]
    .join("\n");
    DeliveryRequest {
        chat_label: message.chat_id.clone(),
        sender_label: sender_label(message),
        body: caption,
        media: Some(payload),
    }
}

/// Builds the text-only notice sent when deferred media finally failed.
pub fn build_media_failure_notice(message: &Message, reason: &str) -> DeliveryRequest {
    DeliveryRequest {
        chat_label: message.chat_id.clone(),
        sender_label: sender_label(message),
        body: format!(
            "⚠️ Media unavailable: {reason}\n👤 Contact: {}\n💬 Chat: {}",
            sender_label(message),
            message.chat_id
        ),
        media: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use wabridge_core::types::MessageIdentity;

    fn message() -> Message {
        Message {
            identity: MessageIdentity("id".into()),
            chat_id: "Family".into(),
            sender_name: "Alice".into(),
            sender_phone: Some("491512345678".into()),
            direction: Direction::Incoming,
            timestamp: Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 15, 0).unwrap()),
            body: "hi there".into(),
            media_ref: None,
            scan_sequence: 1,
        }
    }

    #[test]
    fn text_message_layout() {
        let body = format_body(&message(), &MediaOutcome::None);
        assert_eq!(
            body,
            "📥 Received WhatsApp Message\n\
             👤 Contact: Alice (491512345678)\n\
             💬 Chat: Family\n\
             📝 Message: hi there\n\
             🕒 Time: 2024-05-01T10:15:00+00:00"
        );
    }

    #[test]
    fn outgoing_without_phone_or_time() {
        let mut m = message();
        m.direction = Direction::Outgoing;
        m.sender_phone = None;
        m.timestamp = None;
        let body = format_body(&m, &MediaOutcome::None);
        assert!(body.starts_with("📤 Sent WhatsApp Message"));
        assert!(body.contains("👤 Contact: Alice (unknown)"));
        assert!(body.ends_with("🕒 Time: unknown"));
    }

    #[test]
    fn failed_media_gets_placeholder() {
        let mut m = message();
        m.media_ref = Some("blob:1".into());
        let request = build_request(
            &m,
            &MediaOutcome::Failed {
                reason: "HTTP 404".into(),
            },
        );
        assert!(request.body.starts_with("📥 Received WhatsApp Media"));
        assert!(request.body.ends_with("⚠️ Media unavailable: HTTP 404"));
        assert!(request.media.is_none());
    }

    #[test]
    fn deferred_media_is_announced_and_follow_up_has_no_text_line() {
        let mut m = message();
        m.media_ref = Some("blob:1".into());
        assert!(format_body(&m, &MediaOutcome::Deferred).ends_with("📎 Media follows"));

        let payload = MediaPayload {
            data: vec![1, 2, 3],
            mime_type: "image/png".into(),
            file_name: "a.png".into(),
        };
        let follow_up = build_follow_up(&m, payload.clone());
        assert!(!follow_up.body.contains("📝 Message"));
        assert_eq!(follow_up.media, Some(payload));
    }
}

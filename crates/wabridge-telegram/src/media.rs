// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Media upload for the Telegram sink.
//!
//! Picks the Bot API method from the payload's MIME type and uploads the
//! bytes from memory.

use teloxide::prelude::*;
use teloxide::types::{ChatId, InputFile};

use wabridge_core::types::MediaPayload;

/// Bot API method used to upload a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Animation,
    Video,
    Voice,
    Audio,
    Document,
}

impl MediaKind {
    /// Classifies a MIME type.
    ///
    /// Voice notes from WhatsApp are Opus in OGG, which Telegram plays as a
    /// voice message; other audio goes through `sendAudio`.
    pub fn from_mime(mime_type: &str) -> Self {
        let mime = mime_type.to_ascii_lowercase();
        match mime.as_str() {
            "image/gif" => MediaKind::Animation,
            "image/jpeg" | "image/png" | "image/webp" => MediaKind::Photo,
            "audio/ogg" | "audio/opus" => MediaKind::Voice,
            m if m.starts_with("video/") => MediaKind::Video,
            m if m.starts_with("audio/") => MediaKind::Audio,
            _ => MediaKind::Document,
        }
    }
}

/// Uploads `payload` with `caption` and returns the sent message.
pub async fn send_media(
    bot: &Bot,
    chat_id: ChatId,
    payload: &MediaPayload,
    caption: String,
) -> Result<Message, teloxide::RequestError> {
    let input = InputFile::memory(payload.data.clone()).file_name(payload.file_name.clone());
    match MediaKind::from_mime(&payload.mime_type) {
        MediaKind::Photo => bot.send_photo(chat_id, input).caption(caption).await,
        MediaKind::Animation => bot.send_animation(chat_id, input).caption(caption).await,
        MediaKind::Video => bot.send_video(chat_id, input).caption(caption).await,
        MediaKind::Voice => bot.send_voice(chat_id, input).caption(caption).await,
        MediaKind::Audio => bot.send_audio(chat_id, input).caption(caption).await,
        MediaKind::Document => bot.send_document(chat_id, input).caption(caption).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_common_whatsapp_media() {
        assert_eq!(MediaKind::from_mime("image/jpeg"), MediaKind::Photo);
        assert_eq!(MediaKind::from_mime("IMAGE/PNG"), MediaKind::Photo);
        assert_eq!(MediaKind::from_mime("image/gif"), MediaKind::Animation);
        assert_eq!(MediaKind::from_mime("video/mp4"), MediaKind::Video);
        assert_eq!(MediaKind::from_mime("audio/ogg"), MediaKind::Voice);
        assert_eq!(MediaKind::from_mime("audio/mpeg"), MediaKind::Audio);
        assert_eq!(MediaKind::from_mime("application/pdf"), MediaKind::Document);
        assert_eq!(MediaKind::from_mime("image/heic"), MediaKind::Document);
    }
}

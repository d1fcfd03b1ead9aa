// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram delivery sink for wabridge.
//!
//! Implements [`DeliverySink`] for the Telegram Bot API via teloxide. Every
//! forwarded message goes to one configured chat as plain text (split at
//! paragraph boundaries when too long) or as a media upload with the body
//! as caption.

pub mod media;
pub mod split;

use std::time::Duration;

use async_trait::async_trait;
use teloxide::RequestError;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use tracing::{debug, warn};

use wabridge_config::model::TelegramConfig;
use wabridge_core::types::{AdapterType, DeliveryRequest, HealthStatus, SinkMessageId};
use wabridge_core::{DeliverySink, PluginAdapter, WabridgeError};

/// Telegram sink implementing [`DeliverySink`].
pub struct TelegramSink {
    bot: Bot,
    chat_id: ChatId,
    max_message_length: usize,
}

impl TelegramSink {
    /// Creates a new Telegram sink.
    ///
    /// Requires `config.bot_token` and `config.chat_id` to be set.
    pub fn new(config: &TelegramConfig) -> Result<Self, WabridgeError> {
        let token = config.bot_token.as_deref().ok_or_else(|| {
            WabridgeError::Config("telegram.bot_token is required for the Telegram sink".into())
        })?;

        if token.is_empty() {
            return Err(WabridgeError::Config(
                "telegram.bot_token cannot be empty".into(),
            ));
        }

        let chat_id = config.chat_id.ok_or_else(|| {
            WabridgeError::Config("telegram.chat_id is required for the Telegram sink".into())
        })?;

        Ok(Self {
            bot: Bot::new(token),
            chat_id: ChatId(chat_id),
            max_message_length: config.max_message_length.max(1),
        })
    }

    /// Returns a reference to the underlying teloxide Bot.
    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    async fn send_text(&self, text: &str) -> Result<Option<SinkMessageId>, WabridgeError> {
        let mut first = None;
        for piece in split::split_message(text, self.max_message_length) {
            let sent = self
                .bot
                .send_message(self.chat_id, piece)
                .await
                .map_err(map_request_error)?;
            if first.is_none() {
                first = Some(message_id(&sent));
            }
        }
        Ok(first)
    }
}

fn message_id(message: &Message) -> SinkMessageId {
    SinkMessageId(message.id.0.to_string())
}

fn retry_after_duration(error: &RequestError) -> Option<Duration> {
    match error {
        RequestError::RetryAfter(wait) => Some(wait.duration()),
        _ => None,
    }
}

/// Maps a Bot API failure onto the sink error taxonomy.
///
/// Throttling and transport failures are transient; anything Telegram
/// answered with an API error is permanent.
pub fn map_request_error(error: RequestError) -> WabridgeError {
    let retry_after = retry_after_duration(&error);
    let transient = matches!(
        error,
        RequestError::RetryAfter(_)
            | RequestError::Network(_)
            | RequestError::Io(_)
            | RequestError::InvalidJson { .. }
    );
    let message = format!("telegram request failed: {error}");
    if transient {
        WabridgeError::SinkTransient {
            message,
            retry_after,
            source: Some(Box::new(error)),
        }
    } else {
        WabridgeError::SinkPermanent {
            message,
            source: Some(Box::new(error)),
        }
    }
}

#[async_trait]
impl PluginAdapter for TelegramSink {
    fn name(&self) -> &str {
        "telegram"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Sink
    }

    async fn health_check(&self) -> Result<HealthStatus, WabridgeError> {
        // Check if the bot token is valid by calling getMe.
        match self.bot.get_me().await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(format!(
                "Telegram bot unreachable: {e}"
            ))),
        }
    }

    async fn shutdown(&self) -> Result<(), WabridgeError> {
        debug!("Telegram sink shutting down");
        Ok(())
    }
}

#[async_trait]
impl DeliverySink for TelegramSink {
    async fn deliver(&self, request: &DeliveryRequest) -> Result<SinkMessageId, WabridgeError> {
        let Some(payload) = &request.media else {
            return self.send_text(&request.body).await?.ok_or_else(|| {
                WabridgeError::SinkPermanent {
                    message: "nothing to send".into(),
                    source: None,
                }
            });
        };

        let (caption, overflow) = split::split_caption(&request.body, self.max_message_length);
        let sent = media::send_media(&self.bot, self.chat_id, payload, caption)
            .await
            .map_err(map_request_error)?;
        debug!(
            chat = %request.chat_label,
            mime = %payload.mime_type,
            message_id = sent.id.0,
            "media uploaded"
        );

        // The upload already succeeded; overflow failures are only logged.
        for piece in overflow {
            if let Err(e) = self.bot.send_message(self.chat_id, piece).await {
                warn!(error = %e, "failed to send caption overflow");
                break;
            }
        }
        Ok(message_id(&sent))
    }
}

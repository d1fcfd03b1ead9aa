// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rate-limited delivery to the sink.
//!
//! A message counts as processed only after its delivery record is durable.
//! A sink call that was sent but whose confirmation was never recorded is
//! sent again after a restart, so the sink boundary is at-least-once.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use wabridge_config::WabridgeConfig;
use wabridge_core::types::{DeliveryRecord, DeliveryRequest, Message, ResolvedMessage, SinkMessageId};
use wabridge_core::{DeliverySink, StorageAdapter, WabridgeError};

use crate::backoff::{Backoff, RateLimiter, sleep_or_cancel};
use crate::format;

/// Retry and spacing limits for sink calls.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub min_interval: Duration,
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl DispatchSettings {
    pub fn from_config(config: &WabridgeConfig) -> Self {
        let delivery = &config.delivery;
        Self {
            min_interval: delivery.min_interval(),
            max_attempts: delivery.max_attempts.max(1),
            backoff: Backoff::new(
                Duration::from_millis(delivery.backoff_base_ms),
                Duration::from_millis(delivery.backoff_max_ms),
            ),
        }
    }
}

/// Sends resolved messages to the sink and records confirmed deliveries.
pub struct DeliveryDispatcher {
    sink: Arc<dyn DeliverySink>,
    storage: Arc<dyn StorageAdapter>,
    limiter: RateLimiter,
    settings: DispatchSettings,
}

impl DeliveryDispatcher {
    pub fn new(
        sink: Arc<dyn DeliverySink>,
        storage: Arc<dyn StorageAdapter>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            sink,
            storage,
            limiter: RateLimiter::new(settings.min_interval),
            settings,
        }
    }

    /// Delivers `resolved` and records the confirmed delivery.
    ///
    /// On a permanent sink error or an exhausted retry budget the message is
    /// marked `failed` in storage, an alert is logged, and the sink error is
    /// returned.
    pub async fn deliver(
        &self,
        resolved: &ResolvedMessage,
        cancel: &CancellationToken,
    ) -> Result<DeliveryRecord, WabridgeError> {
        let message = &resolved.message;
        let request = format::build_request(message, &resolved.media);

        let sink_id = match self.send_with_retry(&request, message, cancel).await {
            Ok(id) => id,
            Err(e) if e.is_fatal() || matches!(e, WabridgeError::Cancelled) => return Err(e),
            Err(e) => {
                self.storage
                    .mark_failed(&message.identity, &e.to_string())
                    .await?;
                error!(
                    chat_id = %message.chat_id,
                    identity = %message.identity,
                    error = %e,
                    "delivery failed permanently, message marked failed"
                );
                return Err(e);
            }
        };

        let record = DeliveryRecord::for_message(message, sink_id, Utc::now());
        self.storage
            .record_delivery(&record, message.scan_sequence)
            .await?;
        info!(
            chat_id = %message.chat_id,
            identity = %message.identity,
            sink_message_id = %record.sink_message_id,
            "message delivered"
        );
        Ok(record)
    }

    /// Sends an extra request tied to an already delivered message, such as
    /// deferred media. Nothing is recorded.
    pub async fn send_follow_up(
        &self,
        message: &Message,
        request: &DeliveryRequest,
        cancel: &CancellationToken,
    ) -> Result<SinkMessageId, WabridgeError> {
        let id = self.send_with_retry(request, message, cancel).await?;
        info!(
            chat_id = %message.chat_id,
            identity = %message.identity,
            "follow-up delivered"
        );
        Ok(id)
    }

    async fn send_with_retry(
        &self,
        request: &DeliveryRequest,
        message: &Message,
        cancel: &CancellationToken,
    ) -> Result<SinkMessageId, WabridgeError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.limiter.acquire(cancel).await?;

            // The sink call itself is not cancelled: an answer that arrives
            // during shutdown is still recorded.
            match self.sink.deliver(request).await {
                Ok(id) => return Ok(id),
                Err(e) if e.is_retryable() && attempt < self.settings.max_attempts => {
                    let delay = self.settings.backoff.delay_with_hint(attempt, e.retry_after());
                    warn!(
                        chat_id = %message.chat_id,
                        identity = %message.identity,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient sink error, retrying"
                    );
                    sleep_or_cancel(delay, cancel).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

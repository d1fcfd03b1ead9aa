// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery sink trait for the outbound bot API.

use async_trait::async_trait;

use crate::error::WabridgeError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{DeliveryRequest, SinkMessageId};

/// The external delivery target.
///
/// Implementations classify failures as [`WabridgeError::SinkTransient`]
/// (network, rate limiting) or [`WabridgeError::SinkPermanent`].
#[async_trait]
pub trait DeliverySink: PluginAdapter {
    /// Sends one delivery request and returns the sink's correlation ID.
    async fn deliver(&self, request: &DeliveryRequest) -> Result<SinkMessageId, WabridgeError>;
}

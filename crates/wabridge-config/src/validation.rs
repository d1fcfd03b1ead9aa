// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints serde attributes cannot express, such as
//! non-empty paths, positive intervals, and parseable size strings.

use crate::diagnostic::ConfigError;
use crate::model::{WabridgeConfig, parse_size};

/// Longest text message the Telegram Bot API accepts.
pub const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure instead of stopping at the first one.
pub fn validate_config(config: &WabridgeConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.forwarder.log_level.as_str()) {
        errors.push(ConfigError::validation(format!(
            "forwarder.log_level must be one of {}, got `{}`",
            LOG_LEVELS.join(", "),
            config.forwarder.log_level
        )));
    }

    let max_len = config.telegram.max_message_length;
    if max_len == 0 || max_len > TELEGRAM_MAX_MESSAGE_LENGTH {
        errors.push(ConfigError::validation(format!(
            "telegram.max_message_length must be within 1..={TELEGRAM_MAX_MESSAGE_LENGTH}, got {max_len}"
        )));
    }

    if let Some(token) = &config.telegram.bot_token
        && token.trim().is_empty()
    {
        errors.push(ConfigError::validation(
            "telegram.bot_token must not be empty when set",
        ));
    }

    require_non_empty(&mut errors, "source.snapshot_path", &config.source.snapshot_path);
    require_non_empty(&mut errors, "storage.database_path", &config.storage.database_path);

    require_positive(&mut errors, "source.scan_interval_ms", config.source.scan_interval_ms);
    require_positive(&mut errors, "dedup.retention_hours", config.dedup.retention_hours);
    require_positive(
        &mut errors,
        "dedup.eviction_interval_secs",
        config.dedup.eviction_interval_secs,
    );
    require_positive(
        &mut errors,
        "ordering.max_pending_per_chat",
        config.ordering.max_pending_per_chat as u64,
    );
    require_positive(
        &mut errors,
        "ordering.timestamp_granularity_secs",
        config.ordering.timestamp_granularity_secs,
    );

    match parse_size(&config.media.max_media_size) {
        Ok(0) => errors.push(ConfigError::validation(
            "media.max_media_size must be greater than zero",
        )),
        Ok(_) => {}
        Err(e) => errors.push(ConfigError::validation(format!("media.max_media_size: {e}"))),
    }

    require_positive(&mut errors, "media.max_attempts", config.media.max_attempts as u64);
    require_positive(&mut errors, "media.max_concurrent", config.media.max_concurrent as u64);
    require_positive(
        &mut errors,
        "media.max_concurrent_per_chat",
        config.media.max_concurrent_per_chat as u64,
    );
    require_positive(&mut errors, "media.fetch_timeout_secs", config.media.fetch_timeout_secs);
    require_positive(&mut errors, "delivery.max_attempts", config.delivery.max_attempts as u64);

    if config.media.backoff_base_ms > config.media.backoff_max_ms {
        errors.push(ConfigError::validation(format!(
            "media.backoff_base_ms ({}) must not exceed media.backoff_max_ms ({})",
            config.media.backoff_base_ms, config.media.backoff_max_ms
        )));
    }

    if config.delivery.backoff_base_ms > config.delivery.backoff_max_ms {
        errors.push(ConfigError::validation(format!(
            "delivery.backoff_base_ms ({}) must not exceed delivery.backoff_max_ms ({})",
            config.delivery.backoff_base_ms, config.delivery.backoff_max_ms
        )));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Checks the settings `serve` needs beyond what every command needs.
pub fn validate_for_serve(config: &WabridgeConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    if config.telegram.bot_token.is_none() {
        errors.push(ConfigError::MissingKey {
            key: "telegram.bot_token".to_string(),
        });
    }
    if config.telegram.chat_id.is_none() {
        errors.push(ConfigError::MissingKey {
            key: "telegram.chat_id".to_string(),
        });
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn require_non_empty(errors: &mut Vec<ConfigError>, key: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(ConfigError::validation(format!("{key} must not be empty")));
    }
}

fn require_positive(errors: &mut Vec<ConfigError>, key: &str, value: u64) {
    if value == 0 {
        errors.push(ConfigError::validation(format!(
            "{key} must be greater than zero"
        )));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&WabridgeConfig::default()).is_ok());
    }

    #[test]
    fn collects_all_errors() {
        let mut config = WabridgeConfig::default();
        config.storage.database_path = "  ".to_string();
        config.media.max_attempts = 0;
        config.telegram.max_message_length = 5000;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn bad_size_string_is_reported() {
        let mut config = WabridgeConfig::default();
        config.media.max_media_size = "lots".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert!(errors[0].to_string().contains("media.max_media_size"));
    }

    #[test]
    fn serve_requires_token_and_chat() {
        let errors = validate_for_serve(&WabridgeConfig::default()).unwrap_err();
        assert_eq!(errors.len(), 2);

        let mut config = WabridgeConfig::default();
        config.telegram.bot_token = Some("123:abc".to_string());
        config.telegram.chat_id = Some(-100123);
        assert!(validate_for_serve(&config).is_ok());
    }
}

// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the wabridge forwarder.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level wabridge configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WabridgeConfig {
    /// Process-wide settings.
    #[serde(default)]
    pub forwarder: ForwarderConfig,

    /// Telegram bot delivery settings.
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Raw event source settings.
    #[serde(default)]
    pub source: SourceConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Deduplication retention settings.
    #[serde(default)]
    pub dedup: DedupConfig,

    /// Per-chat ordering buffer settings.
    #[serde(default)]
    pub ordering: OrderingConfig,

    /// Media resolution settings.
    #[serde(default)]
    pub media: MediaConfig,

    /// Delivery dispatcher settings.
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

/// Process-wide configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ForwarderConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Telegram bot delivery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    /// Telegram Bot API token. Required by `serve`.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Target chat that receives forwarded messages. Required by `serve`.
    #[serde(default)]
    pub chat_id: Option<i64>,

    /// Longest text message the bot may send before splitting.
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            max_message_length: default_max_message_length(),
        }
    }
}

fn default_max_message_length() -> usize {
    4096
}

/// Raw event source configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Snapshot file written by the external WhatsApp Web scraper.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,

    /// Delay between two scans, in milliseconds.
    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
            scan_interval_ms: default_scan_interval_ms(),
        }
    }
}

impl SourceConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }
}

fn default_snapshot_path() -> String {
    dirs::data_dir()
        .map(|d| d.join("wabridge").join("snapshot.json"))
        .unwrap_or_else(|| std::path::PathBuf::from("snapshot.json"))
        .to_string_lossy()
        .to_string()
}

fn default_scan_interval_ms() -> u64 {
    1000
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|d| d.join("wabridge").join("wabridge.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("wabridge.db"))
        .to_string_lossy()
        .to_string()
}

fn default_wal_mode() -> bool {
    true
}

/// Deduplication retention configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DedupConfig {
    /// How long an identity stays in the dedup index after it was last seen.
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,

    /// Interval between eviction sweeps, in seconds.
    #[serde(default = "default_eviction_interval_secs")]
    pub eviction_interval_secs: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            retention_hours: default_retention_hours(),
            eviction_interval_secs: default_eviction_interval_secs(),
        }
    }
}

impl DedupConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours * 3600)
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs)
    }
}

fn default_retention_hours() -> u64 {
    168
}

fn default_eviction_interval_secs() -> u64 {
    3600
}

/// Per-chat ordering buffer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OrderingConfig {
    /// How long a message waits for earlier messages before it may drain.
    #[serde(default = "default_quiescence_ms")]
    pub quiescence_ms: u64,

    /// Per-chat buffer size above which the oldest entries drain eagerly.
    #[serde(default = "default_max_pending_per_chat")]
    pub max_pending_per_chat: usize,

    /// Smallest timestamp step the source can show; identities bucket on it.
    #[serde(default = "default_timestamp_granularity_secs")]
    pub timestamp_granularity_secs: u64,
}

impl Default for OrderingConfig {
    fn default() -> Self {
        Self {
            quiescence_ms: default_quiescence_ms(),
            max_pending_per_chat: default_max_pending_per_chat(),
            timestamp_granularity_secs: default_timestamp_granularity_secs(),
        }
    }
}

impl OrderingConfig {
    pub fn quiescence(&self) -> Duration {
        Duration::from_millis(self.quiescence_ms)
    }
}

fn default_quiescence_ms() -> u64 {
    3000
}

fn default_max_pending_per_chat() -> usize {
    200
}

fn default_timestamp_granularity_secs() -> u64 {
    60
}

/// What to do with a message whose media is still resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaPolicy {
    /// Hold the message up to `hold_timeout_secs`, then send text and follow up with media.
    Hold,
    /// Send text immediately and follow up with media once resolved.
    TextFirst,
}

/// Media resolution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MediaConfig {
    /// Largest accepted payload: `"20MB"`, `"512KB"`, `"1GB"` or plain bytes.
    #[serde(default = "default_max_media_size")]
    pub max_media_size: String,

    /// Download attempts before a job is marked failed.
    #[serde(default = "default_media_max_attempts")]
    pub max_attempts: u32,

    /// First retry delay, in milliseconds.
    #[serde(default = "default_media_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Retry delay cap, in milliseconds.
    #[serde(default = "default_media_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Concurrent downloads across all chats.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Concurrent downloads within one chat.
    #[serde(default = "default_max_concurrent_per_chat")]
    pub max_concurrent_per_chat: usize,

    /// Timeout of one download attempt, in seconds.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    #[serde(default = "default_media_policy")]
    pub policy: MediaPolicy,

    /// Longest wait under the `hold` policy, in seconds.
    #[serde(default = "default_hold_timeout_secs")]
    pub hold_timeout_secs: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            max_media_size: default_max_media_size(),
            max_attempts: default_media_max_attempts(),
            backoff_base_ms: default_media_backoff_base_ms(),
            backoff_max_ms: default_media_backoff_max_ms(),
            max_concurrent: default_max_concurrent(),
            max_concurrent_per_chat: default_max_concurrent_per_chat(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            policy: default_media_policy(),
            hold_timeout_secs: default_hold_timeout_secs(),
        }
    }
}

impl MediaConfig {
    /// Parsed `max_media_size` in bytes.
    pub fn max_media_bytes(&self) -> Result<u64, String> {
        parse_size(&self.max_media_size)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn hold_timeout(&self) -> Duration {
        Duration::from_secs(self.hold_timeout_secs)
    }
}

fn default_max_media_size() -> String {
    "20MB".to_string()
}

fn default_media_max_attempts() -> u32 {
    3
}

fn default_media_backoff_base_ms() -> u64 {
    500
}

fn default_media_backoff_max_ms() -> u64 {
    30_000
}

fn default_max_concurrent() -> usize {
    4
}

fn default_max_concurrent_per_chat() -> usize {
    1
}

fn default_fetch_timeout_secs() -> u64 {
    60
}

fn default_media_policy() -> MediaPolicy {
    MediaPolicy::Hold
}

fn default_hold_timeout_secs() -> u64 {
    30
}

/// Delivery dispatcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DeliveryConfig {
    /// Minimum spacing between two sink calls, in milliseconds.
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,

    /// Delivery attempts before a message is marked failed.
    #[serde(default = "default_delivery_max_attempts")]
    pub max_attempts: u32,

    /// First retry delay, in milliseconds.
    #[serde(default = "default_delivery_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Retry delay cap, in milliseconds.
    #[serde(default = "default_delivery_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
            max_attempts: default_delivery_max_attempts(),
            backoff_base_ms: default_delivery_backoff_base_ms(),
            backoff_max_ms: default_delivery_backoff_max_ms(),
        }
    }
}

impl DeliveryConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

fn default_min_interval_ms() -> u64 {
    1000
}

fn default_delivery_max_attempts() -> u32 {
    5
}

fn default_delivery_backoff_base_ms() -> u64 {
    1000
}

fn default_delivery_backoff_max_ms() -> u64 {
    60_000
}

/// Parses a human size string into bytes.
///
/// Accepts a plain byte count or a number suffixed with `B`, `KB`, `MB` or
/// `GB` (case-insensitive, binary multiples, optional whitespace).
pub fn parse_size(input: &str) -> Result<u64, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("size must not be empty".to_string());
    }

    let upper = trimmed.to_ascii_uppercase();
    let (number, multiplier) = if let Some(n) = upper.strip_suffix("GB") {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = upper.strip_suffix("MB") {
        (n, 1024 * 1024)
    } else if let Some(n) = upper.strip_suffix("KB") {
        (n, 1024)
    } else if let Some(n) = upper.strip_suffix('B') {
        (n, 1)
    } else {
        (upper.as_str(), 1)
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid size `{input}`, expected e.g. \"20MB\" or a byte count"))?;

    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("size `{input}` overflows"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_size_units() {
        assert_eq!(parse_size("20MB").unwrap(), 20 * 1024 * 1024);
        assert_eq!(parse_size("512kb").unwrap(), 512 * 1024);
        assert_eq!(parse_size("1GB").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(parse_size("100 B").unwrap(), 100);
        assert_eq!(parse_size("4096").unwrap(), 4096);
    }

    #[test]
    fn parse_size_rejects_garbage() {
        assert!(parse_size("").is_err());
        assert!(parse_size("MB").is_err());
        assert!(parse_size("twenty MB").is_err());
        assert!(parse_size("-5MB").is_err());
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = WabridgeConfig::default();
        assert_eq!(config.forwarder.log_level, "info");
        assert_eq!(config.telegram.max_message_length, 4096);
        assert_eq!(config.source.scan_interval_ms, 1000);
        assert!(config.storage.wal_mode);
        assert_eq!(config.dedup.retention_hours, 168);
        assert_eq!(config.ordering.quiescence(), Duration::from_secs(3));
        assert_eq!(config.ordering.max_pending_per_chat, 200);
        assert_eq!(config.ordering.timestamp_granularity_secs, 60);
        assert_eq!(config.media.max_media_bytes().unwrap(), 20 * 1024 * 1024);
        assert_eq!(config.media.max_attempts, 3);
        assert_eq!(config.media.policy, MediaPolicy::Hold);
        assert_eq!(config.delivery.min_interval(), Duration::from_secs(1));
        assert_eq!(config.delivery.max_attempts, 5);
    }
}

// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./wabridge.toml` > `~/.config/wabridge/wabridge.toml` > `/etc/wabridge/wabridge.toml`
//! with environment variable overrides via `WABRIDGE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::WabridgeConfig;

/// System-wide config file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/wabridge/wabridge.toml";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "wabridge.toml";

/// Sections recognised by the env var mapping, in `replacen` order.
const ENV_SECTIONS: &[&str] = &[
    "forwarder",
    "telegram",
    "source",
    "storage",
    "dedup",
    "ordering",
    "media",
    "delivery",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/wabridge/wabridge.toml` (system-wide)
/// 3. `~/.config/wabridge/wabridge.toml` (user XDG config)
/// 4. `./wabridge.toml` (local directory)
/// 5. `WABRIDGE_*` environment variables
pub fn load_config() -> Result<WabridgeConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<WabridgeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(WabridgeConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<WabridgeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(WabridgeConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(WabridgeConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_FILE))
        .merge(env_provider())
}

/// Path of the per-user config file, if the platform has a config dir.
pub fn user_config_path() -> Option<std::path::PathBuf> {
    dirs::config_dir().map(|d| d.join("wabridge").join(LOCAL_CONFIG_FILE))
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `WABRIDGE_TELEGRAM_BOT_TOKEN` must map to `telegram.bot_token`,
/// not `telegram.bot.token`.
fn env_provider() -> Env {
    Env::prefixed("WABRIDGE_").map(|key| map_env_key(key.as_str()).into())
}

/// Maps a lowercased, prefix-stripped env var name to a dotted config key.
fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_map_to_sections() {
        assert_eq!(map_env_key("telegram_bot_token"), "telegram.bot_token");
        assert_eq!(map_env_key("media_max_media_size"), "media.max_media_size");
        assert_eq!(
            map_env_key("ordering_quiescence_ms"),
            "ordering.quiescence_ms"
        );
        assert_eq!(map_env_key("forwarder_log_level"), "forwarder.log_level");
    }

    #[test]
    fn unknown_section_passes_through() {
        assert_eq!(map_env_key("bogus_key"), "bogus_key");
    }

    #[test]
    fn env_overrides_file_values() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "wabridge.toml",
                r#"
                [telegram]
                chat_id = 42

                [ordering]
                quiescence_ms = 1500
                "#,
            )?;
            jail.set_env("WABRIDGE_TELEGRAM_CHAT_ID", "-1001");
            jail.set_env("WABRIDGE_TELEGRAM_BOT_TOKEN", "123:abc");

            let config = load_config_from_path(Path::new("wabridge.toml"))?;
            assert_eq!(config.telegram.chat_id, Some(-1001));
            assert_eq!(config.telegram.bot_token.as_deref(), Some("123:abc"));
            assert_eq!(config.ordering.quiescence_ms, 1500);
            Ok(())
        });
    }
}

// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! wabridge - forwards WhatsApp Web messages to a Telegram chat.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod commands;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use wabridge_config::WabridgeConfig;
use wabridge_core::WabridgeError;

/// wabridge - forwards WhatsApp Web messages to a Telegram chat.
#[derive(Parser, Debug)]
#[command(name = "wabridge", version, about, long_about = None)]
struct Cli {
    /// Load configuration from this file instead of the standard locations.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the forwarding pipeline until interrupted.
    Serve,
    /// Show forwarded messages for a contact, a chat or a time range.
    History {
        /// Sender name or phone fragment.
        #[arg(long, conflicts_with = "chat")]
        contact: Option<String>,
        /// Exact chat name.
        #[arg(long)]
        chat: Option<String>,
        /// Start of the range (RFC 3339), used with --until.
        #[arg(long, requires = "until", conflicts_with_all = ["contact", "chat"])]
        since: Option<String>,
        /// End of the range (RFC 3339, exclusive).
        #[arg(long, requires = "since")]
        until: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// List chats by most recent delivery.
    Chats {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// List forwarded contacts, optionally filtered.
    Contacts {
        /// Name or phone fragment.
        search: Option<String>,
    },
    /// Show forwarding statistics.
    Stats {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// List messages whose delivery was abandoned.
    Failed {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Queue a failed message for re-delivery on the next `serve`.
    Retry {
        /// Message identity as printed by `failed`.
        identity: String,
    },
    /// Remove dedup entries older than the retention window.
    Evict,
}

fn load_config(path: Option<&PathBuf>) -> WabridgeConfig {
    let loaded = match path {
        Some(path) => wabridge_config::load_and_validate_path(path),
        None => wabridge_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            wabridge_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("wabridge={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(command: Commands, config: WabridgeConfig) -> Result<(), WabridgeError> {
    match command {
        Commands::Serve => {
            if let Err(errors) = wabridge_config::validate_for_serve(&config) {
                wabridge_config::render_errors(&errors);
                std::process::exit(1);
            }
            serve::run_serve(config).await
        }
        Commands::History {
            contact,
            chat,
            since,
            until,
            limit,
        } => {
            let query = commands::HistoryQuery::from_args(contact, chat, since, until, limit)?;
            commands::run_history(&config, query).await
        }
        Commands::Chats { limit } => commands::run_chats(&config, limit).await,
        Commands::Contacts { search } => commands::run_contacts(&config, search.as_deref()).await,
        Commands::Stats { json } => commands::run_stats(&config, json).await,
        Commands::Failed { limit } => commands::run_failed(&config, limit).await,
        Commands::Retry { identity } => commands::run_retry(&config, &identity).await,
        Commands::Evict => commands::run_evict(&config).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());

    let Some(command) = cli.command else {
        println!("wabridge: use --help for available commands");
        return;
    };

    init_tracing(&config.forwarder.log_level);

    if let Err(e) = run(command, config).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        // Verify jemalloc is the global allocator by advancing the epoch.
        // Only jemalloc supports this -- the system allocator would fail.
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn history_range_requires_both_ends() {
        assert!(Cli::try_parse_from(["wabridge", "history", "--since", "2024-05-01T00:00:00Z"]).is_err());
        let cli = Cli::try_parse_from([
            "wabridge",
            "--config",
            "/tmp/w.toml",
            "history",
            "--since",
            "2024-05-01T00:00:00Z",
            "--until",
            "2024-05-02T00:00:00Z",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/w.toml")));
        assert!(matches!(cli.command, Some(Commands::History { limit: 20, .. })));
    }

    #[test]
    fn contact_and_chat_filters_conflict() {
        assert!(
            Cli::try_parse_from(["wabridge", "history", "--contact", "al", "--chat", "Family"])
                .is_err()
        );
    }
}

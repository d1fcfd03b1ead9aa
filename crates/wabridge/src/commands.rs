// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-only query commands plus the `retry` and `evict` maintenance commands.
//!
//! Each command opens the configured database, runs one query and prints
//! plain text (or JSON for `stats --json`). None of them touch the sink.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use wabridge_config::WabridgeConfig;
use wabridge_core::types::{ChatSummary, ContactSummary, DeliveryRecord, FailedMessage, ForwardStats};
use wabridge_core::{MessageIdentity, StorageAdapter, WabridgeError};
use wabridge_pipeline::{DedupStore, HistoryReader};
use wabridge_storage::SqliteStorage;

/// What `wabridge history` should look up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryQuery {
    Contact { term: String, limit: u32 },
    Chat { chat_id: String, limit: u32 },
    Range { from: DateTime<Utc>, to: DateTime<Utc> },
}

impl HistoryQuery {
    pub fn from_args(
        contact: Option<String>,
        chat: Option<String>,
        since: Option<String>,
        until: Option<String>,
        limit: u32,
    ) -> Result<Self, WabridgeError> {
        match (contact, chat, since, until) {
            (Some(term), None, None, None) => Ok(Self::Contact { term, limit }),
            (None, Some(chat_id), None, None) => Ok(Self::Chat { chat_id, limit }),
            (None, None, Some(since), Some(until)) => Ok(Self::Range {
                from: parse_timestamp("--since", &since)?,
                to: parse_timestamp("--until", &until)?,
            }),
            _ => Err(WabridgeError::Config(
                "history needs exactly one of --contact, --chat or --since/--until".into(),
            )),
        }
    }
}

fn parse_timestamp(flag: &str, value: &str) -> Result<DateTime<Utc>, WabridgeError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| WabridgeError::Config(format!("{flag}: invalid RFC 3339 timestamp: {e}")))
}

/// Opens the configured database for a one-shot command.
async fn open_storage(config: &WabridgeConfig) -> Result<Arc<SqliteStorage>, WabridgeError> {
    let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
    storage.initialize().await?;
    Ok(storage)
}

async fn open_reader(config: &WabridgeConfig) -> Result<HistoryReader, WabridgeError> {
    let storage = open_storage(config).await?;
    Ok(HistoryReader::new(storage as Arc<dyn StorageAdapter>))
}

fn print_lines(lines: Vec<String>, empty: &str) {
    if lines.is_empty() {
        println!("{empty}");
    }
    for line in lines {
        println!("{line}");
    }
}

pub async fn run_history(config: &WabridgeConfig, query: HistoryQuery) -> Result<(), WabridgeError> {
    let reader = open_reader(config).await?;
    let records = match &query {
        HistoryQuery::Contact { term, limit } => reader.history_for_contact(term, *limit).await?,
        HistoryQuery::Chat { chat_id, limit } => reader.history_for_chat(chat_id, *limit).await?,
        HistoryQuery::Range { from, to } => reader.deliveries_between(*from, *to).await?,
    };
    print_lines(records.iter().map(format_delivery).collect(), "No forwarded messages found.");
    Ok(())
}

pub async fn run_chats(config: &WabridgeConfig, limit: u32) -> Result<(), WabridgeError> {
    let chats = open_reader(config).await?.recent_chats(limit).await?;
    print_lines(chats.iter().map(format_chat).collect(), "No chats forwarded yet.");
    Ok(())
}

pub async fn run_contacts(config: &WabridgeConfig, search: Option<&str>) -> Result<(), WabridgeError> {
    let reader = open_reader(config).await?;
    let contacts = match search {
        Some(term) => reader.search_contacts(term).await?,
        None => reader.contacts().await?,
    };
    print_lines(contacts.iter().map(format_contact).collect(), "No contacts found.");
    Ok(())
}

/// Structured stats output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub active_chats: u64,
    pub contacts: u64,
    pub delivered: u64,
    pub pending: u64,
    pub failed: u64,
    pub media_failed: u64,
}

impl From<&ForwardStats> for StatsResponse {
    fn from(stats: &ForwardStats) -> Self {
        Self {
            active_chats: stats.active_chats,
            contacts: stats.contacts,
            delivered: stats.delivered,
            pending: stats.pending,
            failed: stats.failed,
            media_failed: stats.media_failed,
        }
    }
}

pub async fn run_stats(config: &WabridgeConfig, json: bool) -> Result<(), WabridgeError> {
    let stats = open_reader(config).await?.stats().await?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&StatsResponse::from(&stats))
                .unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        print!("{}", format_stats(&stats));
    }
    Ok(())
}

pub async fn run_failed(config: &WabridgeConfig, limit: u32) -> Result<(), WabridgeError> {
    let failed = open_reader(config).await?.failed_messages(limit).await?;
    print_lines(failed.iter().map(format_failed).collect(), "No failed messages.");
    Ok(())
}

pub async fn run_retry(config: &WabridgeConfig, identity: &str) -> Result<(), WabridgeError> {
    let storage = open_storage(config).await?;
    let dedup = DedupStore::new(storage.clone(), config.dedup.retention());
    let requeued = dedup
        .retry_failed(&MessageIdentity(identity.trim().to_string()))
        .await?;
    storage.close().await?;
    if requeued {
        println!("Queued {identity} for re-delivery on the next `wabridge serve`.");
        Ok(())
    } else {
        Err(WabridgeError::Config(format!(
            "{identity} is not a failed message"
        )))
    }
}

pub async fn run_evict(config: &WabridgeConfig) -> Result<(), WabridgeError> {
    let storage = open_storage(config).await?;
    let dedup = DedupStore::new(storage.clone(), config.dedup.retention());
    let evicted = dedup.evict_expired(Utc::now()).await?;
    storage.close().await?;
    println!(
        "Evicted {evicted} entries older than {}h.",
        config.dedup.retention_hours
    );
    Ok(())
}

fn format_time(t: &DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M").to_string()
}

fn sender_label(name: &str, phone: Option<&str>) -> String {
    match phone {
        Some(phone) if !phone.is_empty() && phone != name => format!("{name} ({phone})"),
        _ => name.to_string(),
    }
}

fn format_delivery(record: &DeliveryRecord) -> String {
    let media = if record.had_media { " [media]" } else { "" };
    let body = record.body.replace('\n', " ");
    format!(
        "{} [{}] {} ({}){media}: {body}",
        format_time(&record.delivered_at),
        record.chat_id,
        sender_label(&record.sender_name, record.sender_phone.as_deref()),
        record.direction,
    )
}

fn format_chat(chat: &ChatSummary) -> String {
    format!(
        "{}  {} messages, last {}",
        chat.chat_id,
        chat.message_count,
        format_time(&chat.last_delivered_at)
    )
}

fn format_contact(contact: &ContactSummary) -> String {
    format!(
        "{}  {} messages, last {}",
        sender_label(&contact.sender_name, contact.sender_phone.as_deref()),
        contact.message_count,
        format_time(&contact.last_delivered_at)
    )
}

fn format_failed(failed: &FailedMessage) -> String {
    format!(
        "{}  [{}] {}: {}",
        failed.message.identity.as_str(),
        failed.message.chat_id,
        failed.message.sender_name,
        failed.reason.as_deref().unwrap_or("unknown reason")
    )
}

fn format_stats(stats: &ForwardStats) -> String {
    format!(
        "Active chats:  {}\nContacts:      {}\nDelivered:     {}\nPending:       {}\nFailed:        {}\nMedia failed:  {}\n",
        stats.active_chats,
        stats.contacts,
        stats.delivered,
        stats.pending,
        stats.failed,
        stats.media_failed
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wabridge_core::types::Direction;

    fn record(had_media: bool) -> DeliveryRecord {
        DeliveryRecord {
            message_identity: MessageIdentity("abc".into()),
            chat_id: "Family".into(),
            sender_name: "Alice".into(),
            sender_phone: Some("+49 151 2345678".into()),
            direction: Direction::Incoming,
            body: "hello\nthere".into(),
            message_timestamp: None,
            had_media,
            sink_message_id: "17".into(),
            delivered_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap(),
        }
    }

    #[test]
    fn history_query_picks_exactly_one_filter() {
        let q = HistoryQuery::from_args(Some("ali".into()), None, None, None, 5).unwrap();
        assert_eq!(q, HistoryQuery::Contact { term: "ali".into(), limit: 5 });

        let q = HistoryQuery::from_args(
            None,
            None,
            Some("2024-05-01T00:00:00+02:00".into()),
            Some("2024-05-02T00:00:00Z".into()),
            5,
        )
        .unwrap();
        assert_eq!(
            q,
            HistoryQuery::Range {
                from: Utc.with_ymd_and_hms(2024, 4, 30, 22, 0, 0).unwrap(),
                to: Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap(),
            }
        );

        assert!(HistoryQuery::from_args(None, None, None, None, 5).is_err());
        let err = HistoryQuery::from_args(None, None, Some("yesterday".into()), Some("now".into()), 5)
            .unwrap_err();
        assert!(err.to_string().contains("--since"));
    }

    #[test]
    fn delivery_line_is_single_line_with_sender_phone() {
        let line = format_delivery(&record(true));
        assert_eq!(
            line,
            "2024-05-01 09:30 [Family] Alice (+49 151 2345678) (incoming) [media]: hello there"
        );
        assert!(!format_delivery(&record(false)).contains("[media]"));
    }

    #[test]
    fn sender_label_skips_phone_equal_to_name() {
        assert_eq!(sender_label("+4915", Some("+4915")), "+4915");
        assert_eq!(sender_label("Bob", None), "Bob");
    }

    #[test]
    fn stats_json_has_every_counter() {
        let stats = ForwardStats {
            active_chats: 2,
            contacts: 3,
            delivered: 10,
            pending: 1,
            failed: 1,
            media_failed: 0,
        };
        let json = serde_json::to_value(StatsResponse::from(&stats)).unwrap();
        assert_eq!(json["delivered"], 10);
        assert_eq!(json["media_failed"], 0);
        assert!(format_stats(&stats).contains("Delivered:     10"));
    }
}

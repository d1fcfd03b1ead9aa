// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Column encoding shared by the query modules.
//!
//! Timestamps are stored as fixed-width UTC text (`%Y-%m-%dT%H:%M:%S%.3fZ`)
//! so lexical order in SQL matches chronological order.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use wabridge_core::types::{DeliveryRecord, Direction, Message, MessageIdentity};

/// Formats a timestamp for storage.
pub fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

pub fn fmt_opt_ts(ts: Option<&DateTime<Utc>>) -> Option<String> {
    ts.map(fmt_ts)
}

fn conversion_err(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

/// Reads a stored timestamp column.
pub fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

/// Reads a nullable stored timestamp column.
pub fn get_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_err(idx, e))
    })
    .transpose()
}

/// Reads a column holding a strum-encoded enum.
pub fn get_enum<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = strum::ParseError>,
{
    let raw: String = row.get(idx)?;
    T::from_str(&raw).map_err(|e| conversion_err(idx, e))
}

/// Reads a column holding a JSON-serialized [`Message`].
pub fn get_message(row: &Row<'_>, idx: usize) -> rusqlite::Result<Message> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_err(idx, e))
}

/// Serializes a message for the `message_json` column.
pub fn message_json(message: &Message) -> rusqlite::Result<String> {
    serde_json::to_string(message).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

/// Reads a non-negative integer column as `u64`.
pub fn get_u64(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let raw: i64 = row.get(idx)?;
    u64::try_from(raw).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, raw))
}

/// Columns selected by [`delivery_from_row`], in order.
pub const DELIVERY_COLUMNS: &str = "message_identity, chat_id, sender_name, sender_phone, \
     direction, body, message_timestamp, had_media, sink_message_id, delivered_at";

/// Maps a row selected with [`DELIVERY_COLUMNS`].
pub fn delivery_from_row(row: &Row<'_>) -> rusqlite::Result<DeliveryRecord> {
    Ok(DeliveryRecord {
        message_identity: MessageIdentity(row.get(0)?),
        chat_id: row.get(1)?,
        sender_name: row.get(2)?,
        sender_phone: row.get(3)?,
        direction: get_enum::<Direction>(row, 4)?,
        body: row.get(5)?,
        message_timestamp: get_opt_ts(row, 6)?,
        had_media: row.get(7)?,
        sink_message_id: row.get(8)?,
        delivered_at: get_ts(row, 9)?,
    })
}

// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-chat cursor operations.

use rusqlite::params;
use wabridge_core::WabridgeError;
use wabridge_core::types::ChatCursor;

use crate::database::{Database, map_tr_err};
use crate::rows::{get_opt_ts, get_u64};

fn cursor_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatCursor> {
    Ok(ChatCursor {
        chat_id: row.get(0)?,
        last_delivered_scan_sequence: get_u64(row, 1)?,
        pending_count: get_u64(row, 2)?,
        last_delivered_at: get_opt_ts(row, 3)?,
    })
}

/// Upserts the number of messages waiting in a chat's ordering buffer.
pub async fn save_pending_count(
    db: &Database,
    chat_id: &str,
    pending: u64,
) -> Result<(), WabridgeError> {
    let chat_id = chat_id.to_string();
    let pending = pending as i64;
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO chat_cursors (chat_id, pending_count) VALUES (?1, ?2)
                 ON CONFLICT(chat_id) DO UPDATE SET pending_count = excluded.pending_count",
                params![chat_id, pending],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Returns the cursor of one chat.
pub async fn get_cursor(db: &Database, chat_id: &str) -> Result<Option<ChatCursor>, WabridgeError> {
    let chat_id = chat_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT chat_id, last_delivered_scan_sequence, pending_count, last_delivered_at
                 FROM chat_cursors WHERE chat_id = ?1",
            )?;
            let mut rows = stmt.query(params![chat_id])?;
            match rows.next()? {
                Some(row) => Ok(Some(cursor_from_row(row)?)),
                None => Ok(None),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Returns every cursor, ordered by chat.
pub async fn list_cursors(db: &Database) -> Result<Vec<ChatCursor>, WabridgeError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT chat_id, last_delivered_scan_sequence, pending_count, last_delivered_at
                 FROM chat_cursors ORDER BY chat_id ASC",
            )?;
            let rows = stmt.query_map([], cursor_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use wabridge_config::model::StorageConfig;
use wabridge_core::types::{
    ChatCursor, ChatSummary, ContactSummary, DedupEntry, DeliveryRecord, FailedMessage,
    ForwardStats, MediaJob, Message, MessageIdentity,
};
use wabridge_core::{AdapterType, HealthStatus, PluginAdapter, StorageAdapter, WabridgeError};

use crate::database::Database;
use crate::queries;

/// SQLite-backed storage adapter.
///
/// Wraps a [`Database`] handle and delegates to the typed query modules.
/// The database is opened on the first call to [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the given configuration.
    ///
    /// The database connection is not opened until [`StorageAdapter::initialize`] is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Returns the underlying Database, or an error if not initialized.
    fn db(&self) -> Result<&Database, WabridgeError> {
        self.db.get().ok_or_else(|| WabridgeError::PersistenceUnavailable {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, WabridgeError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| {
                conn.query_row("SELECT 1", [], |_| Ok(()))?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), WabridgeError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), WabridgeError> {
        let db = Database::open_with_options(&self.config.database_path, self.config.wal_mode)
            .await?;
        self.db
            .set(db)
            .map_err(|_| WabridgeError::Internal("storage already initialized".into()))?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), WabridgeError> {
        self.db()?.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    // --- Dedup index ---

    async fn load_dedup_index(&self) -> Result<Vec<DedupEntry>, WabridgeError> {
        queries::dedup::load_index(self.db()?).await
    }

    async fn insert_seen(
        &self,
        message: &Message,
        seen_at: DateTime<Utc>,
    ) -> Result<bool, WabridgeError> {
        queries::dedup::insert_seen(self.db()?, message, seen_at).await
    }

    async fn touch_seen(
        &self,
        touches: &[(MessageIdentity, DateTime<Utc>)],
    ) -> Result<(), WabridgeError> {
        queries::dedup::touch_seen(self.db()?, touches).await
    }

    async fn pending_messages(&self) -> Result<Vec<Message>, WabridgeError> {
        queries::dedup::pending_messages(self.db()?).await
    }

    async fn max_scan_sequence(&self) -> Result<Option<u64>, WabridgeError> {
        queries::dedup::max_scan_sequence(self.db()?).await
    }

    async fn mark_failed(
        &self,
        identity: &MessageIdentity,
        reason: &str,
    ) -> Result<(), WabridgeError> {
        queries::dedup::mark_failed(self.db()?, identity, reason).await
    }

    async fn retry_failed(&self, identity: &MessageIdentity) -> Result<bool, WabridgeError> {
        queries::dedup::retry_failed(self.db()?, identity).await
    }

    async fn evict_seen_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<MessageIdentity>, WabridgeError> {
        queries::dedup::evict_seen_before(self.db()?, cutoff).await
    }

    // --- Delivery log ---

    async fn record_delivery(
        &self,
        record: &DeliveryRecord,
        scan_sequence: u64,
    ) -> Result<(), WabridgeError> {
        queries::dedup::record_delivery(self.db()?, record, scan_sequence).await
    }

    async fn get_delivery(
        &self,
        identity: &MessageIdentity,
    ) -> Result<Option<DeliveryRecord>, WabridgeError> {
        queries::deliveries::get(self.db()?, identity).await
    }

    // --- Chat cursors ---

    async fn save_pending_count(&self, chat_id: &str, pending: u64) -> Result<(), WabridgeError> {
        queries::cursors::save_pending_count(self.db()?, chat_id, pending).await
    }

    async fn get_cursor(&self, chat_id: &str) -> Result<Option<ChatCursor>, WabridgeError> {
        queries::cursors::get_cursor(self.db()?, chat_id).await
    }

    async fn list_cursors(&self) -> Result<Vec<ChatCursor>, WabridgeError> {
        queries::cursors::list_cursors(self.db()?).await
    }

    // --- Media jobs ---

    async fn upsert_media_job(&self, job: &MediaJob) -> Result<(), WabridgeError> {
        queries::media_jobs::upsert(self.db()?, job).await
    }

    async fn get_media_job(
        &self,
        identity: &MessageIdentity,
    ) -> Result<Option<MediaJob>, WabridgeError> {
        queries::media_jobs::get(self.db()?, identity).await
    }

    async fn delete_media_job(&self, identity: &MessageIdentity) -> Result<(), WabridgeError> {
        queries::media_jobs::delete(self.db()?, identity).await
    }

    async fn reset_downloading_media_jobs(&self) -> Result<u64, WabridgeError> {
        queries::media_jobs::reset_downloading(self.db()?).await
    }

    async fn messages_awaiting_media(&self) -> Result<Vec<Message>, WabridgeError> {
        queries::media_jobs::awaiting_follow_up(self.db()?).await
    }

    // --- Read-only queries ---

    async fn deliveries_for_contact(
        &self,
        term: &str,
        limit: u32,
    ) -> Result<Vec<DeliveryRecord>, WabridgeError> {
        queries::deliveries::for_contact(self.db()?, term, limit).await
    }

    async fn deliveries_for_chat(
        &self,
        chat_id: &str,
        limit: u32,
    ) -> Result<Vec<DeliveryRecord>, WabridgeError> {
        queries::deliveries::for_chat(self.db()?, chat_id, limit).await
    }

    async fn deliveries_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DeliveryRecord>, WabridgeError> {
        queries::deliveries::between(self.db()?, from, to).await
    }

    async fn recent_chats(&self, limit: u32) -> Result<Vec<ChatSummary>, WabridgeError> {
        queries::deliveries::recent_chats(self.db()?, limit).await
    }

    async fn contacts(&self, term: Option<&str>) -> Result<Vec<ContactSummary>, WabridgeError> {
        queries::deliveries::contacts(self.db()?, term).await
    }

    async fn failed_messages(&self, limit: u32) -> Result<Vec<FailedMessage>, WabridgeError> {
        queries::dedup::failed_messages(self.db()?, limit).await
    }

    async fn stats(&self) -> Result<ForwardStats, WabridgeError> {
        queries::deliveries::stats(self.db()?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        }
    }

    #[tokio::test]
    async fn sqlite_storage_implements_plugin_adapter() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        assert_eq!(storage.name(), "sqlite");
        assert_eq!(storage.version(), semver::Version::new(0, 1, 0));
        assert_eq!(storage.adapter_type(), AdapterType::Storage);
    }

    #[tokio::test]
    async fn initialize_twice_returns_error() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("double_init.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        storage.initialize().await.unwrap();
        assert!(db_path.exists(), "database file should be created");
        assert!(storage.initialize().await.is_err());
    }

    #[tokio::test]
    async fn uninitialized_storage_is_unavailable() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("no_init.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        let err = storage.health_check().await.unwrap_err();
        assert!(err.is_fatal());
        assert!(storage.pending_messages().await.unwrap_err().is_fatal());
    }

    #[tokio::test]
    async fn health_check_and_shutdown_after_initialize() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("health.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        storage.initialize().await.unwrap();
        assert_eq!(storage.health_check().await.unwrap(), HealthStatus::Healthy);
        storage.shutdown().await.unwrap();
    }
}

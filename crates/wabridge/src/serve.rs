// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `wabridge serve` command implementation.
//!
//! Wires the snapshot source, HTTP media fetcher, Telegram sink and SQLite
//! storage into the forwarding pipeline and runs it until a shutdown signal.

use std::sync::Arc;

use tracing::{error, info, warn};
use wabridge_config::WabridgeConfig;
use wabridge_core::types::HealthStatus;
use wabridge_core::{
    DeliverySink, MediaFetcher, PluginAdapter, RawEventSource, StorageAdapter, WabridgeError,
};
use wabridge_pipeline::{Pipeline, shutdown};
use wabridge_storage::SqliteStorage;
use wabridge_telegram::TelegramSink;
use wabridge_whatsapp::{HttpMediaFetcher, SnapshotFileSource};

/// Runs the `wabridge serve` command.
pub async fn run_serve(config: WabridgeConfig) -> Result<(), WabridgeError> {
    info!(
        snapshot = %config.source.snapshot_path,
        database = %config.storage.database_path,
        "starting wabridge"
    );

    let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
    storage.initialize().await?;

    let source = Arc::new(SnapshotFileSource::from_config(&config.source));
    let fetcher = Arc::new(HttpMediaFetcher::new()?);
    let sink = Arc::new(TelegramSink::new(&config.telegram)?);

    // An unreachable bot is not fatal; deliveries retry until it comes back.
    match sink.health_check().await {
        Ok(HealthStatus::Healthy) => info!("telegram sink reachable"),
        Ok(status) => warn!(?status, "telegram sink not healthy at startup"),
        Err(e) => warn!(error = %e, "telegram health check failed"),
    }
    if let Ok(HealthStatus::Degraded(reason)) = source.health_check().await {
        warn!(%reason, "snapshot source degraded");
    }

    let adapters: Vec<Arc<dyn PluginAdapter>> = vec![
        Arc::clone(&source) as Arc<dyn PluginAdapter>,
        Arc::clone(&fetcher) as Arc<dyn PluginAdapter>,
        Arc::clone(&sink) as Arc<dyn PluginAdapter>,
    ];

    let pipeline = Pipeline::new(
        &config,
        source as Arc<dyn RawEventSource>,
        fetcher as Arc<dyn MediaFetcher>,
        sink as Arc<dyn DeliverySink>,
        Arc::clone(&storage) as Arc<dyn StorageAdapter>,
    )?;

    let cancel = shutdown::install_signal_handler();
    let result = pipeline.run(cancel).await;

    for adapter in &adapters {
        if let Err(e) = adapter.shutdown().await {
            warn!(adapter = adapter.name(), error = %e, "adapter shutdown failed");
        }
    }
    if let Err(e) = storage.close().await {
        error!(error = %e, "failed to close storage");
    }

    info!("wabridge stopped");
    result
}

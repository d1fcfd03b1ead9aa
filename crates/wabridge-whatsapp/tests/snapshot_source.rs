// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use wabridge_core::{PluginAdapter, RawEventSource, WabridgeError};
use wabridge_core::types::HealthStatus;
use wabridge_whatsapp::SnapshotFileSource;

#[tokio::test]
async fn missing_file_scans_empty_until_scraper_writes_it() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("snapshot.json");
    let source = SnapshotFileSource::new(&path);

    assert!(source.scan().await.unwrap().is_empty());
    assert!(matches!(
        source.health_check().await.unwrap(),
        HealthStatus::Degraded(_)
    ));

    std::fs::write(
        &path,
        r#"[{"chat_id": "Family", "sender": "Bob", "body": "first"}]"#,
    )
    .unwrap();
    let records = source.scan().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(source.health_check().await.unwrap(), HealthStatus::Healthy);

    // The scraper rewrites the file as the view scrolls.
    std::fs::write(
        &path,
        "{\"chat_id\":\"Family\",\"body\":\"first\"}\n{\"chat_id\":\"Family\",\"body\":\"second\"}\n",
    )
    .unwrap();
    let records = source.scan().await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].body.as_deref(), Some("second"));
}

#[tokio::test]
async fn corrupt_array_fails_only_that_scan() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("snapshot.json");
    let source = SnapshotFileSource::new(&path);

    std::fs::write(&path, "[{\"chat_id\": ").unwrap();
    let err = source.scan().await.unwrap_err();
    assert!(matches!(err, WabridgeError::Source { .. }));
    assert!(!err.is_fatal());

    std::fs::write(&path, "[]").unwrap();
    assert!(source.scan().await.unwrap().is_empty());
}

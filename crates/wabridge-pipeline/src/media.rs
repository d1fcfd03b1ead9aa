// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Media resolution.
//!
//! Each media-bearing message gets a persisted [`MediaJob`] that moves
//! `pending -> downloading -> ready | failed`. Downloads are bounded by a
//! global semaphore and a per-chat semaphore, retried with exponential
//! backoff, and abandoned back to `pending` on shutdown.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use wabridge_config::WabridgeConfig;
use wabridge_core::types::{MediaJob, MediaOutcome, MediaPayload, MediaStatus, Message, MessageIdentity};
use wabridge_core::{MediaFetcher, StorageAdapter, WabridgeError};

use crate::backoff::{Backoff, sleep_or_cancel};

/// Limits applied to media downloads.
#[derive(Debug, Clone)]
pub struct MediaSettings {
    pub max_bytes: u64,
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub fetch_timeout: Duration,
    pub max_concurrent: usize,
    pub max_concurrent_per_chat: usize,
}

impl MediaSettings {
    pub fn from_config(config: &WabridgeConfig) -> Result<Self, WabridgeError> {
        let media = &config.media;
        Ok(Self {
            max_bytes: media.max_media_bytes().map_err(WabridgeError::Config)?,
            max_attempts: media.max_attempts.max(1),
            backoff: Backoff::new(
                Duration::from_millis(media.backoff_base_ms),
                Duration::from_millis(media.backoff_max_ms),
            ),
            fetch_timeout: media.fetch_timeout(),
            max_concurrent: media.max_concurrent.max(1),
            max_concurrent_per_chat: media.max_concurrent_per_chat.max(1),
        })
    }
}

/// Downloads media payloads and tracks their jobs.
pub struct MediaResolver {
    fetcher: Arc<dyn MediaFetcher>,
    storage: Arc<dyn StorageAdapter>,
    settings: MediaSettings,
    global: Arc<Semaphore>,
    per_chat: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl MediaResolver {
    pub fn new(
        fetcher: Arc<dyn MediaFetcher>,
        storage: Arc<dyn StorageAdapter>,
        settings: MediaSettings,
    ) -> Self {
        Self {
            global: Arc::new(Semaphore::new(settings.max_concurrent)),
            fetcher,
            storage,
            settings,
            per_chat: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves the media of `message`.
    ///
    /// Media problems never surface as errors: they end the job as `failed`
    /// and come back as [`MediaOutcome::Failed`]. Errors are reserved for
    /// persistence failures and for cancellation, which leaves the job
    /// `pending` for the next run.
    pub async fn resolve(
        &self,
        message: &Message,
        cancel: &CancellationToken,
    ) -> Result<MediaOutcome, WabridgeError> {
        let Some(media_ref) = message.media_ref.as_deref() else {
            return Ok(MediaOutcome::None);
        };

        let mut job = match self.storage.get_media_job(&message.identity).await? {
            Some(job) if job.status == MediaStatus::Failed => {
                let reason = job
                    .last_error
                    .unwrap_or_else(|| "media download failed".to_string());
                return Ok(MediaOutcome::Failed { reason });
            }
            Some(mut job) => {
                // A `ready` job from an earlier run lost its bytes with the process.
                if job.status == MediaStatus::Ready {
                    job.attempt_count = 0;
                    job.last_error = None;
                }
                job.status = MediaStatus::Pending;
                job
            }
            None => MediaJob::new(
                message.identity.clone(),
                message.chat_id.clone(),
                media_ref.to_string(),
            ),
        };

        loop {
            if job.attempt_count >= self.settings.max_attempts {
                let reason = job
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "retry budget exhausted".to_string());
                return self.fail(&mut job, reason).await;
            }

            let permits = tokio::select! {
                _ = cancel.cancelled() => return self.abandon(&mut job).await,
                permits = self.acquire(&message.chat_id) => permits?,
            };

            job.status = MediaStatus::Downloading;
            job.attempt_count += 1;
            job.last_attempt_at = Some(Utc::now());
            self.storage.upsert_media_job(&job).await?;
            debug!(
                identity = %job.message_identity,
                attempt = job.attempt_count,
                "downloading media"
            );

            let fetched = tokio::select! {
                _ = cancel.cancelled() => {
                    drop(permits);
                    return self.abandon(&mut job).await;
                }
                fetched = self.fetch(&job.media_ref) => fetched,
            };
            drop(permits);

            match fetched {
                Ok(payload) => {
                    job.status = MediaStatus::Ready;
                    job.last_error = None;
                    self.storage.upsert_media_job(&job).await?;
                    info!(
                        identity = %job.message_identity,
                        bytes = payload.data.len(),
                        mime = %payload.mime_type,
                        "media ready"
                    );
                    return Ok(MediaOutcome::Ready(payload));
                }
                Err(e @ WabridgeError::MediaTooLarge { .. }) => {
                    return self.fail(&mut job, e.to_string()).await;
                }
                Err(e) if e.is_retryable() || matches!(e, WabridgeError::Timeout { .. }) => {
                    warn!(
                        identity = %job.message_identity,
                        attempt = job.attempt_count,
                        error = %e,
                        "media download failed"
                    );
                    job.last_error = Some(e.to_string());
                    if job.attempt_count < self.settings.max_attempts {
                        job.status = MediaStatus::Pending;
                        self.storage.upsert_media_job(&job).await?;
                        let delay = self.settings.backoff.delay(job.attempt_count);
                        if sleep_or_cancel(delay, cancel).await.is_err() {
                            return self.abandon(&mut job).await;
                        }
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => return self.fail(&mut job, e.to_string()).await,
            }
        }
    }

    /// Persists a `pending` job for `message` unless one exists, so a text
    /// delivered ahead of its media can find the job again after a restart.
    pub async fn register(&self, message: &Message) -> Result<(), WabridgeError> {
        let Some(media_ref) = message.media_ref.as_deref() else {
            return Ok(());
        };
        if self.storage.get_media_job(&message.identity).await?.is_none() {
            let job = MediaJob::new(
                message.identity.clone(),
                message.chat_id.clone(),
                media_ref.to_string(),
            );
            self.storage.upsert_media_job(&job).await?;
        }
        Ok(())
    }

    /// Drops the job of a message whose media was delivered.
    pub async fn complete(&self, identity: &MessageIdentity) -> Result<(), WabridgeError> {
        self.storage.delete_media_job(identity).await
    }

    async fn fetch(&self, media_ref: &str) -> Result<MediaPayload, WabridgeError> {
        let max_bytes = self.settings.max_bytes;
        let payload = tokio::time::timeout(
            self.settings.fetch_timeout,
            self.fetcher.fetch(media_ref, max_bytes),
        )
        .await
        .map_err(|_| WabridgeError::Timeout {
            duration: self.settings.fetch_timeout,
        })??;

        let size = payload.data.len() as u64;
        if size > max_bytes {
            return Err(WabridgeError::MediaTooLarge {
                size,
                limit: max_bytes,
            });
        }
        Ok(payload)
    }

    async fn acquire(
        &self,
        chat_id: &str,
    ) -> Result<(OwnedSemaphorePermit, OwnedSemaphorePermit), WabridgeError> {
        let chat = self.chat_semaphore(chat_id)?;
        let chat_permit = chat
            .acquire_owned()
            .await
            .map_err(|e| WabridgeError::Internal(format!("media semaphore closed: {e}")))?;
        let global_permit = Arc::clone(&self.global)
            .acquire_owned()
            .await
            .map_err(|e| WabridgeError::Internal(format!("media semaphore closed: {e}")))?;
        Ok((chat_permit, global_permit))
    }

    fn chat_semaphore(&self, chat_id: &str) -> Result<Arc<Semaphore>, WabridgeError> {
        let mut per_chat = self
            .per_chat
            .lock()
            .map_err(|e| WabridgeError::Internal(format!("media semaphore map poisoned: {e}")))?;
        Ok(Arc::clone(per_chat.entry(chat_id.to_string()).or_insert_with(|| {
            Arc::new(Semaphore::new(self.settings.max_concurrent_per_chat))
        })))
    }

    async fn fail(
        &self,
        job: &mut MediaJob,
        reason: String,
    ) -> Result<MediaOutcome, WabridgeError> {
        job.status = MediaStatus::Failed;
        job.last_error = Some(reason.clone());
        self.storage.upsert_media_job(job).await?;
        warn!(
            identity = %job.message_identity,
            attempts = job.attempt_count,
            reason = %reason,
            "media unavailable, delivering text only"
        );
        Ok(MediaOutcome::Failed { reason })
    }

    /// Parks the job as `pending`. A download cut off mid-flight does not
    /// count against the retry budget.
    async fn abandon(&self, job: &mut MediaJob) -> Result<MediaOutcome, WabridgeError> {
        if job.status == MediaStatus::Downloading {
            job.attempt_count = job.attempt_count.saturating_sub(1);
        }
        job.status = MediaStatus::Pending;
        self.storage.upsert_media_job(job).await?;
        debug!(identity = %job.message_identity, "media download abandoned");
        Err(WabridgeError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wabridge_core::types::Direction;
    use wabridge_test_utils::{MockMediaFetcher, TestHarness};

    fn settings(max_attempts: u32) -> MediaSettings {
        MediaSettings {
            max_bytes: 1024,
            max_attempts,
            backoff: Backoff::new(Duration::from_millis(500), Duration::from_secs(5)),
            fetch_timeout: Duration::from_secs(10),
            max_concurrent: 2,
            max_concurrent_per_chat: 1,
        }
    }

    fn media_message(id: &str) -> Message {
        Message {
            identity: MessageIdentity(id.into()),
            chat_id: "Family".into(),
            sender_name: "Alice".into(),
            sender_phone: None,
            direction: Direction::Incoming,
            timestamp: None,
            body: "look".into(),
            media_ref: Some(format!("blob:{id}")),
            scan_sequence: 1,
        }
    }

    fn payload(len: usize) -> MediaPayload {
        MediaPayload {
            data: vec![0u8; len],
            mime_type: "image/jpeg".into(),
            file_name: "photo.jpg".into(),
        }
    }

    fn fetch_failed() -> WabridgeError {
        WabridgeError::MediaFetchFailed {
            message: "HTTP 502".into(),
            source: None,
        }
    }

    #[tokio::test]
    async fn message_without_media_resolves_to_none() {
        let harness = TestHarness::builder().build().await.unwrap();
        let resolver = MediaResolver::new(harness.fetcher(), harness.storage(), settings(3));
        let mut m = media_message("a");
        m.media_ref = None;
        let outcome = resolver.resolve(&m, &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, MediaOutcome::None);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_is_retried_then_ready() {
        let fetcher = MockMediaFetcher::new();
        fetcher.push_outcome(Err(fetch_failed()));
        fetcher.push_outcome(Ok(payload(10)));
        let harness = TestHarness::builder().fetcher(fetcher.clone()).build().await.unwrap();
        let resolver = MediaResolver::new(harness.fetcher(), harness.storage(), settings(3));
        let m = media_message("a");

        let outcome = resolver.resolve(&m, &CancellationToken::new()).await.unwrap();
        assert!(matches!(outcome, MediaOutcome::Ready(ref p) if p.data.len() == 10));
        assert_eq!(fetcher.call_count(), 2);

        let job = harness.storage().get_media_job(&m.identity).await.unwrap().unwrap();
        assert_eq!(job.status, MediaStatus::Ready);
        assert_eq!(job.attempt_count, 2);

        resolver.complete(&m.identity).await.unwrap();
        assert!(harness.storage().get_media_job(&m.identity).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_end_failed() {
        let fetcher = MockMediaFetcher::new();
        for _ in 0..3 {
            fetcher.push_outcome(Err(fetch_failed()));
        }
        let harness = TestHarness::builder().fetcher(fetcher.clone()).build().await.unwrap();
        let resolver = MediaResolver::new(harness.fetcher(), harness.storage(), settings(3));
        let m = media_message("a");

        let outcome = resolver.resolve(&m, &CancellationToken::new()).await.unwrap();
        assert!(matches!(outcome, MediaOutcome::Failed { ref reason } if reason.contains("502")));
        assert_eq!(fetcher.call_count(), 3);

        let job = harness.storage().get_media_job(&m.identity).await.unwrap().unwrap();
        assert_eq!(job.status, MediaStatus::Failed);
        assert_eq!(job.attempt_count, 3);

        // A failed job is not downloaded again.
        let again = resolver.resolve(&m, &CancellationToken::new()).await.unwrap();
        assert!(matches!(again, MediaOutcome::Failed { .. }));
        assert_eq!(fetcher.call_count(), 3);
    }

    #[tokio::test]
    async fn oversized_payload_fails_fast() {
        let fetcher = MockMediaFetcher::new();
        fetcher.push_outcome(Ok(payload(4096)));
        let harness = TestHarness::builder().fetcher(fetcher.clone()).build().await.unwrap();
        let resolver = MediaResolver::new(harness.fetcher(), harness.storage(), settings(3));

        let outcome = resolver
            .resolve(&media_message("big"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(outcome, MediaOutcome::Failed { ref reason } if reason.contains("too large")));
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn cancellation_reverts_job_to_pending() {
        let fetcher = MockMediaFetcher::new();
        fetcher.set_delay(Duration::from_secs(30));
        fetcher.push_outcome(Ok(payload(10)));
        let harness = TestHarness::builder().fetcher(fetcher.clone()).build().await.unwrap();
        let resolver = Arc::new(MediaResolver::new(
            harness.fetcher(),
            harness.storage(),
            settings(3),
        ));
        let m = media_message("slow");
        let cancel = CancellationToken::new();

        let task = {
            let resolver = Arc::clone(&resolver);
            let cancel = cancel.clone();
            let m = m.clone();
            tokio::spawn(async move { resolver.resolve(&m, &cancel).await })
        };
        while fetcher.call_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, WabridgeError::Cancelled));
        let job = harness.storage().get_media_job(&m.identity).await.unwrap().unwrap();
        assert_eq!(job.status, MediaStatus::Pending);
        assert_eq!(job.attempt_count, 0);

        // The cut-off fetch never consumed its scripted outcome.
        fetcher.set_delay(Duration::ZERO);
        let outcome = resolver.resolve(&m, &CancellationToken::new()).await.unwrap();
        assert!(matches!(outcome, MediaOutcome::Ready(_)));
    }

    #[tokio::test]
    async fn ready_job_from_earlier_run_is_downloaded_again() {
        let fetcher = MockMediaFetcher::new();
        fetcher.push_outcome(Ok(payload(10)));
        let harness = TestHarness::builder().fetcher(fetcher.clone()).build().await.unwrap();
        let resolver = MediaResolver::new(harness.fetcher(), harness.storage(), settings(3));
        let m = media_message("kept");

        // Succeeded on its last allowed attempt, then the process exited.
        let mut job = MediaJob::new(m.identity.clone(), m.chat_id.clone(), "blob:kept".into());
        job.status = MediaStatus::Ready;
        job.attempt_count = 3;
        harness.storage().upsert_media_job(&job).await.unwrap();

        let outcome = resolver.resolve(&m, &CancellationToken::new()).await.unwrap();
        assert!(matches!(outcome, MediaOutcome::Ready(ref p) if p.data.len() == 10));
        assert_eq!(fetcher.call_count(), 1);
        let job = harness.storage().get_media_job(&m.identity).await.unwrap().unwrap();
        assert_eq!(job.status, MediaStatus::Ready);
        assert_eq!(job.attempt_count, 1);
    }
}

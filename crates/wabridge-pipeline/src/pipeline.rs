// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The concurrent forwarding pipeline.
//!
//! Three loops run under one cancellation token:
//!
//! - **ingest**: scan the source, normalize, pass the dedup gate, enqueue
//!   into the ordering buffer;
//! - **drain**: hand each chat's ready prefix to that chat's worker task;
//! - **eviction**: periodically expire old dedup entries.
//!
//! Each chat has exactly one worker, so a chat's messages are resolved and
//! delivered strictly in order while different chats proceed concurrently.
//! Media resolution runs in its own task so a slow download is bounded by the
//! media policy rather than by the fetcher.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace, warn};

use wabridge_config::{MediaPolicy, WabridgeConfig};
use wabridge_core::types::{MediaOutcome, Message, ResolvedMessage};
use wabridge_core::{DeliverySink, MediaFetcher, RawEventSource, StorageAdapter, WabridgeError};

use crate::dedup::DedupStore;
use crate::dispatcher::{DeliveryDispatcher, DispatchSettings};
use crate::format;
use crate::media::{MediaResolver, MediaSettings};
use crate::normalizer::Normalizer;
use crate::ordering::OrderingBuffer;
use crate::query::HistoryReader;
use crate::shutdown;

/// How long shutdown waits for chat workers and follow-ups.
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Timing and policy knobs for a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub scan_interval: Duration,
    pub eviction_interval: Duration,
    pub retention: Duration,
    pub quiescence: Duration,
    pub max_pending_per_chat: usize,
    pub timestamp_granularity: Duration,
    pub media_policy: MediaPolicy,
    pub hold_timeout: Duration,
    pub media: MediaSettings,
    pub dispatch: DispatchSettings,
}

impl PipelineSettings {
    pub fn from_config(config: &WabridgeConfig) -> Result<Self, WabridgeError> {
        Ok(Self {
            scan_interval: config.source.scan_interval(),
            eviction_interval: config.dedup.eviction_interval(),
            retention: config.dedup.retention(),
            quiescence: config.ordering.quiescence(),
            max_pending_per_chat: config.ordering.max_pending_per_chat,
            timestamp_granularity: Duration::from_secs(config.ordering.timestamp_granularity_secs),
            media_policy: config.media.policy,
            hold_timeout: config.media.hold_timeout(),
            media: MediaSettings::from_config(config)?,
            dispatch: DispatchSettings::from_config(config),
        })
    }
}

/// Counters for one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub records: usize,
    pub accepted: usize,
    pub duplicates: usize,
    pub malformed: usize,
}

/// What restart recovery found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Accepted but unconfirmed messages put back into the ordering buffer.
    pub requeued: usize,
    /// Media jobs reverted from `downloading` to `pending`.
    pub media_reset: u64,
    /// Identities loaded into the dedup gate.
    pub known_identities: usize,
    /// Largest scan sequence persisted by an earlier run.
    pub resumed_after: Option<u64>,
    /// Delivered messages whose media follow-up is sent again by `run`.
    pub media_follow_ups: usize,
}

/// Per-run handles shared by the loops and the chat workers.
#[derive(Clone)]
struct RunContext {
    cancel: CancellationToken,
    fatal: mpsc::UnboundedSender<WabridgeError>,
}

impl RunContext {
    fn report(&self, chat_id: &str, error: WabridgeError) {
        error!(chat_id, error = %error, "persistence unavailable, stopping pipeline");
        let _ = self.fatal.send(error);
    }
}

struct Shared {
    source: Arc<dyn RawEventSource>,
    storage: Arc<dyn StorageAdapter>,
    normalizer: Normalizer,
    dedup: DedupStore,
    buffer: Mutex<OrderingBuffer>,
    resolver: MediaResolver,
    dispatcher: DeliveryDispatcher,
    settings: PipelineSettings,
    wake_drain: Notify,
    tasks: TaskTracker,
    awaiting_media: Mutex<Vec<Message>>,
}

/// The forwarding pipeline. Cheap to clone.
#[derive(Clone)]
pub struct Pipeline {
    shared: Arc<Shared>,
}

impl Pipeline {
    /// Builds a pipeline from configuration and the four edge adapters.
    ///
    /// `storage` must already be initialized.
    pub fn new(
        config: &WabridgeConfig,
        source: Arc<dyn RawEventSource>,
        fetcher: Arc<dyn MediaFetcher>,
        sink: Arc<dyn DeliverySink>,
        storage: Arc<dyn StorageAdapter>,
    ) -> Result<Self, WabridgeError> {
        let settings = PipelineSettings::from_config(config)?;
        Ok(Self::with_settings(settings, source, fetcher, sink, storage))
    }

    pub fn with_settings(
        settings: PipelineSettings,
        source: Arc<dyn RawEventSource>,
        fetcher: Arc<dyn MediaFetcher>,
        sink: Arc<dyn DeliverySink>,
        storage: Arc<dyn StorageAdapter>,
    ) -> Self {
        let shared = Shared {
            normalizer: Normalizer::new(settings.timestamp_granularity),
            dedup: DedupStore::new(Arc::clone(&storage), settings.retention),
            buffer: Mutex::new(OrderingBuffer::new(
                settings.quiescence,
                settings.max_pending_per_chat,
            )),
            resolver: MediaResolver::new(fetcher, Arc::clone(&storage), settings.media.clone()),
            dispatcher: DeliveryDispatcher::new(
                sink,
                Arc::clone(&storage),
                settings.dispatch.clone(),
            ),
            source,
            storage,
            settings,
            wake_drain: Notify::new(),
            tasks: TaskTracker::new(),
            awaiting_media: Mutex::new(Vec::new()),
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    /// The dedup gate, for retry and eviction commands.
    pub fn dedup(&self) -> &DedupStore {
        &self.shared.dedup
    }

    /// Read-only history over the same storage.
    pub fn history(&self) -> HistoryReader {
        HistoryReader::new(Arc::clone(&self.shared.storage))
    }

    /// Number of messages waiting in the ordering buffer.
    pub async fn buffered(&self) -> usize {
        self.shared.buffer.lock().await.len()
    }

    /// Restores in-memory state from storage after a restart.
    pub async fn recover(&self) -> Result<RecoveryReport, WabridgeError> {
        self.shared.recover().await
    }

    /// Takes one snapshot from the source and feeds it through the dedup gate
    /// into the ordering buffer.
    pub async fn scan_once(&self) -> Result<ScanReport, WabridgeError> {
        self.shared.scan_once().await
    }

    /// Runs until `cancel` fires or persistence becomes unavailable.
    ///
    /// Recovery runs first. On shutdown, chat workers get a bounded time to
    /// finish; anything not confirmed stays `pending` for the next run.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), WabridgeError> {
        let shared = &self.shared;
        let report = shared.recover().await?;
        info!(
            requeued = report.requeued,
            media_reset = report.media_reset,
            media_follow_ups = report.media_follow_ups,
            known = report.known_identities,
            "pipeline recovered"
        );

        let stop = cancel.child_token();
        let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel();
        let ctx = RunContext {
            cancel: stop.clone(),
            fatal: fatal_tx,
        };
        shared.tasks.reopen();
        shared.resume_media_follow_ups(&ctx).await;

        info!("pipeline started");
        let result = tokio::select! {
            r = shared.ingest_loop(&stop) => r,
            r = Arc::clone(shared).drain_loop(ctx.clone()) => r,
            r = shared.eviction_loop(&stop) => r,
            Some(e) = fatal_rx.recv() => Err(e),
        };

        stop.cancel();
        shutdown::drain_tasks(&shared.tasks, SHUTDOWN_DRAIN_TIMEOUT).await;
        if let Err(e) = shared.flush_state().await {
            warn!(error = %e, "failed to flush pipeline state on shutdown");
        }

        match &result {
            Ok(()) => info!("pipeline stopped"),
            Err(e) => error!(error = %e, "pipeline halted"),
        }
        result
    }
}

impl Shared {
    async fn recover(&self) -> Result<RecoveryReport, WabridgeError> {
        let media_reset = self.storage.reset_downloading_media_jobs().await?;
        let resumed_after = self.storage.max_scan_sequence().await?;
        if let Some(last) = resumed_after {
            self.normalizer.resume_after(last);
        }
        let known_identities = self.dedup.load().await?;

        let pending = self.storage.pending_messages().await?;
        let requeued = pending.len();
        let chats: BTreeSet<String> = pending.iter().map(|m| m.chat_id.clone()).collect();
        {
            let now = Instant::now();
            let mut buffer = self.buffer.lock().await;
            for message in pending {
                // Already in the buffer from an earlier recovery in this process.
                if buffer.contains(&message) {
                    continue;
                }
                buffer.enqueue(message, now);
            }
        }
        for chat_id in &chats {
            self.save_pending_count(chat_id).await?;
        }
        if requeued > 0 {
            self.wake_drain.notify_one();
        }

        let awaiting = self.storage.messages_awaiting_media().await?;
        let media_follow_ups = awaiting.len();
        *self.awaiting_media.lock().await = awaiting;

        Ok(RecoveryReport {
            requeued,
            media_reset,
            known_identities,
            resumed_after,
            media_follow_ups,
        })
    }

    /// Sends the media of texts an earlier run delivered ahead of it.
    async fn resume_media_follow_ups(self: &Arc<Self>, ctx: &RunContext) {
        let messages = std::mem::take(&mut *self.awaiting_media.lock().await);
        for message in messages {
            debug!(
                chat_id = %message.chat_id,
                identity = %message.identity,
                "resuming media follow-up"
            );
            let handle = self.spawn_resolve(&message, &ctx.cancel);
            self.spawn_follow_up(message, handle, ctx.clone());
        }
    }

    async fn scan_once(&self) -> Result<ScanReport, WabridgeError> {
        let records = match self.source.scan().await {
            Ok(records) => records,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(error = %e, "scan failed, retrying next tick");
                return Ok(ScanReport::default());
            }
        };

        let mut report = ScanReport {
            records: records.len(),
            ..ScanReport::default()
        };
        let mut chats = BTreeSet::new();

        for raw in &records {
            let message = match self.normalizer.normalize(raw) {
                Ok(message) => message,
                Err(e) => {
                    report.malformed += 1;
                    warn!(
                        chat_id = raw.chat_id.as_deref().unwrap_or("-"),
                        error = %e,
                        "dropping malformed record"
                    );
                    continue;
                }
            };

            match self.dedup.check_and_mark(&message).await {
                Ok(()) => {}
                Err(WabridgeError::DuplicateMessage { identity }) => {
                    report.duplicates += 1;
                    trace!(identity = %identity, "duplicate filtered");
                    continue;
                }
                Err(e) => return Err(e),
            }

            debug!(
                chat_id = %message.chat_id,
                identity = %message.identity,
                scan_sequence = message.scan_sequence,
                "message accepted"
            );
            chats.insert(message.chat_id.clone());
            self.buffer.lock().await.enqueue(message, Instant::now());
            report.accepted += 1;
        }

        for chat_id in &chats {
            self.save_pending_count(chat_id).await?;
        }
        if report.accepted > 0 {
            self.wake_drain.notify_one();
        }
        Ok(report)
    }

    async fn ingest_loop(&self, cancel: &CancellationToken) -> Result<(), WabridgeError> {
        let mut interval = tokio::time::interval(self.settings.scan_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("ingest loop shutting down");
                    return Ok(());
                }
                _ = interval.tick() => {
                    let report = self.scan_once().await?;
                    if report.accepted > 0 || report.malformed > 0 {
                        debug!(
                            records = report.records,
                            accepted = report.accepted,
                            duplicates = report.duplicates,
                            malformed = report.malformed,
                            "scan processed"
                        );
                    }
                }
            }
        }
    }

    async fn drain_loop(self: Arc<Self>, ctx: RunContext) -> Result<(), WabridgeError> {
        let mut workers: HashMap<String, mpsc::UnboundedSender<Message>> = HashMap::new();

        loop {
            let deadline = self.buffer.lock().await.next_deadline();
            let until_deadline = async move {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = ctx.cancel.cancelled() => {
                    debug!("drain loop shutting down");
                    return Ok(());
                }
                _ = self.wake_drain.notified() => {}
                _ = until_deadline => {}
            }

            let batches = self.buffer.lock().await.drain_all_ready(Instant::now());
            for (chat_id, messages) in batches {
                self.save_pending_count(&chat_id).await?;
                let worker = workers.entry(chat_id.clone()).or_insert_with(|| {
                    let (tx, rx) = mpsc::unbounded_channel();
                    self.tasks.spawn(Arc::clone(&self).chat_worker(
                        chat_id.clone(),
                        rx,
                        ctx.clone(),
                    ));
                    tx
                });
                for message in messages {
                    if worker.send(message).is_err() {
                        // The worker only exits on shutdown or a fatal error.
                        debug!(chat_id = %chat_id, "chat worker gone, message stays pending");
                    }
                }
            }
        }
    }

    async fn eviction_loop(&self, cancel: &CancellationToken) -> Result<(), WabridgeError> {
        let mut interval = tokio::time::interval(self.settings.eviction_interval);
        // Skip the first immediate tick.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = interval.tick() => {
                    match self.dedup.evict_expired(Utc::now()).await {
                        Ok(evicted) => debug!(evicted, "eviction pass complete"),
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => warn!(error = %e, "eviction pass failed (non-fatal)"),
                    }
                }
            }
        }
    }

    async fn chat_worker(
        self: Arc<Self>,
        chat_id: String,
        mut inbox: mpsc::UnboundedReceiver<Message>,
        ctx: RunContext,
    ) {
        debug!(chat_id = %chat_id, "chat worker started");
        loop {
            let message = tokio::select! {
                _ = ctx.cancel.cancelled() => break,
                message = inbox.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            match self.process(message, &ctx).await {
                Ok(()) => {}
                Err(WabridgeError::Cancelled) => break,
                Err(e) if e.is_fatal() => {
                    ctx.report(&chat_id, e);
                    break;
                }
                Err(e) => warn!(chat_id = %chat_id, error = %e, "message processing failed"),
            }
        }
        debug!(chat_id = %chat_id, "chat worker stopped");
    }

    /// Resolves and delivers one message. Sink failures are handled by the
    /// dispatcher; only fatal errors and cancellation propagate.
    async fn process(self: &Arc<Self>, message: Message, ctx: &RunContext) -> Result<(), WabridgeError> {
        let (media, deferred) = self.resolve_media(&message, ctx).await?;
        let identity = message.identity.clone();
        let resolved = ResolvedMessage { message, media };

        match self.dispatcher.deliver(&resolved, &ctx.cancel).await {
            Ok(_) => {
                self.dedup.note_delivered(&identity).await;
                if matches!(resolved.media, MediaOutcome::Ready(_)) {
                    self.resolver.complete(&identity).await?;
                }
                if let Some(handle) = deferred {
                    self.spawn_follow_up(resolved.message, handle, ctx.clone());
                }
                Ok(())
            }
            Err(e) if e.is_fatal() || matches!(e, WabridgeError::Cancelled) => Err(e),
            Err(_) => {
                self.dedup.note_failed(&identity).await;
                Ok(())
            }
        }
    }

    /// Starts media resolution and waits for it according to the media policy.
    ///
    /// Returns the outcome to deliver with the text and, when the media is
    /// still resolving, the handle its follow-up will wait on.
    async fn resolve_media(
        self: &Arc<Self>,
        message: &Message,
        ctx: &RunContext,
    ) -> Result<(MediaOutcome, Option<MediaHandle>), WabridgeError> {
        if !message.has_media() {
            return Ok((MediaOutcome::None, None));
        }

        self.resolver.register(message).await?;
        let mut handle = self.spawn_resolve(message, &ctx.cancel);

        let wait = match self.settings.media_policy {
            MediaPolicy::Hold => self.settings.hold_timeout,
            MediaPolicy::TextFirst => return Ok((MediaOutcome::Deferred, Some(handle))),
        };

        tokio::select! {
            joined = &mut handle => Ok((media_outcome(joined)?, None)),
            _ = tokio::time::sleep(wait) => {
                debug!(
                    identity = %message.identity,
                    "media still resolving after hold timeout, sending text first"
                );
                Ok((MediaOutcome::Deferred, Some(handle)))
            }
            _ = ctx.cancel.cancelled() => Err(WabridgeError::Cancelled),
        }
    }

    fn spawn_resolve(self: &Arc<Self>, message: &Message, cancel: &CancellationToken) -> MediaHandle {
        let shared = Arc::clone(self);
        let message = message.clone();
        let cancel = cancel.clone();
        self.tasks
            .spawn(async move { shared.resolver.resolve(&message, &cancel).await })
    }

    fn spawn_follow_up(self: &Arc<Self>, message: Message, handle: MediaHandle, ctx: RunContext) {
        let shared = Arc::clone(self);
        self.tasks.spawn(async move {
            let result = shared.follow_up(&message, handle, &ctx.cancel).await;
            match result {
                Ok(()) | Err(WabridgeError::Cancelled) => {}
                Err(e) if e.is_fatal() => ctx.report(&message.chat_id, e),
                Err(e) => warn!(
                    chat_id = %message.chat_id,
                    identity = %message.identity,
                    error = %e,
                    "media follow-up failed"
                ),
            }
        });
    }

    async fn follow_up(
        &self,
        message: &Message,
        handle: MediaHandle,
        cancel: &CancellationToken,
    ) -> Result<(), WabridgeError> {
        let request = match media_outcome(handle.await)? {
            MediaOutcome::Ready(payload) => format::build_follow_up(message, payload),
            MediaOutcome::Failed { reason } => format::build_media_failure_notice(message, &reason),
            MediaOutcome::None | MediaOutcome::Deferred => return Ok(()),
        };
        let carries_media = request.media.is_some();
        self.dispatcher.send_follow_up(message, &request, cancel).await?;
        if carries_media {
            self.resolver.complete(&message.identity).await?;
        }
        Ok(())
    }

    async fn save_pending_count(&self, chat_id: &str) -> Result<(), WabridgeError> {
        let pending = self.buffer.lock().await.pending_count(chat_id) as u64;
        self.storage.save_pending_count(chat_id, pending).await
    }

    async fn flush_state(&self) -> Result<(), WabridgeError> {
        self.dedup.flush_touches().await?;
        let chats: Vec<String> = self
            .buffer
            .lock()
            .await
            .chat_ids()
            .map(str::to_string)
            .collect();
        for chat_id in &chats {
            self.save_pending_count(chat_id).await?;
        }
        Ok(())
    }
}

type MediaHandle = JoinHandle<Result<MediaOutcome, WabridgeError>>;

/// A panicked resolution task degrades to a failed media outcome.
fn media_outcome(
    joined: Result<Result<MediaOutcome, WabridgeError>, JoinError>,
) -> Result<MediaOutcome, WabridgeError> {
    match joined {
        Ok(result) => result,
        Err(e) => Ok(MediaOutcome::Failed {
            reason: format!("media task aborted: {e}"),
        }),
    }
}

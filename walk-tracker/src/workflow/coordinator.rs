//! Pipeline coordinator
//!
//! Subscribes to the checkpoint store while running and launches stage work
//! for every checkpoint that becomes eligible. All decisions happen on one
//! actor task; the public handle only sends it commands.

use chrono::Utc;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use walk_common::events::{EventBus, PhotoStage, WalkEvent};

use super::{PhotoDownloadStage, PhotoSearchStage, StageOutcome};
use crate::error::StageError;
use crate::models::CheckpointFilter;
use crate::services::{CheckpointStore, PhotoFetcher, PhotoSearchClient, PhotoStorage, StoreChange};

/// Snapshot of pipeline activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStatus {
    pub running: bool,
    pub search_enabled: bool,
    pub searches_in_flight: usize,
    pub downloads_in_flight: usize,
}

enum Command {
    Rescan {
        reply: oneshot::Sender<usize>,
    },
    PurgePhotos {
        reply: oneshot::Sender<Result<usize, StageError>>,
    },
    Status {
        reply: oneshot::Sender<PipelineStatus>,
    },
}

struct RunningPipeline {
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct PipelineCoordinator {
    store: CheckpointStore,
    event_bus: EventBus,
    search_client: Result<Arc<dyn PhotoSearchClient>, StageError>,
    fetcher: Arc<dyn PhotoFetcher>,
    storage: Arc<dyn PhotoStorage>,
    running: Mutex<Option<RunningPipeline>>,
}

impl PipelineCoordinator {
    /// `search_client` is an error when search cannot run (e.g. no API key).
    /// The download stage still works in that case.
    pub fn new(
        store: CheckpointStore,
        event_bus: EventBus,
        search_client: Result<Arc<dyn PhotoSearchClient>, StageError>,
        fetcher: Arc<dyn PhotoFetcher>,
        storage: Arc<dyn PhotoStorage>,
    ) -> Self {
        Self {
            store,
            event_bus,
            search_client,
            fetcher,
            storage,
            running: Mutex::new(None),
        }
    }

    pub fn search_enabled(&self) -> bool {
        self.search_client.is_ok()
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Start reacting to store changes and scan for existing work
    ///
    /// Returns false (and does nothing) if already running.
    pub async fn start(&self) -> bool {
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!("Photo pipeline already running");
            return false;
        }

        let search = match &self.search_client {
            Ok(client) => Some(PhotoSearchStage::new(Arc::clone(client))),
            Err(e) => {
                debug!("Photo search disabled: {}", e);
                self.event_bus.emit_lossy(WalkEvent::StageDisabled {
                    stage: PhotoStage::Search,
                    reason: e.to_string(),
                    timestamp: Utc::now(),
                });
                None
            }
        };

        // Subscribe before the initial scan so no change falls in between
        let changes = self.store.subscribe();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let actor = PipelineActor {
            store: self.store.clone(),
            event_bus: self.event_bus.clone(),
            search,
            download: PhotoDownloadStage::new(Arc::clone(&self.fetcher), Arc::clone(&self.storage)),
            queue: WorkQueue::default(),
            outcomes_tx,
        };
        let task = tokio::spawn(actor.run(changes, commands_rx, outcomes_rx, cancel.clone()));

        *running = Some(RunningPipeline {
            commands: commands_tx,
            cancel,
            task,
        });

        info!(search_enabled = self.search_enabled(), "Photo pipeline started");
        true
    }

    /// Stop reacting to changes and cancel all in-flight work
    ///
    /// Results of cancelled tasks never reach the store. Returns false if the
    /// pipeline was not running.
    pub async fn stop(&self) -> bool {
        let mut running = self.running.lock().await;
        let Some(pipeline) = running.take() else {
            debug!("Photo pipeline not running");
            return false;
        };

        pipeline.cancel.cancel();
        if let Err(e) = pipeline.task.await {
            warn!("Photo pipeline task ended abnormally: {}", e);
        }

        info!("Photo pipeline stopped");
        true
    }

    /// Re-launch work for every eligible checkpoint not already in flight
    ///
    /// Returns the number of tasks launched; 0 when stopped.
    pub async fn retry_on_resume(&self) -> usize {
        let (reply, response) = oneshot::channel();
        if !self.send(Command::Rescan { reply }).await {
            debug!("Resume ignored, photo pipeline not running");
            return 0;
        }
        response.await.unwrap_or(0)
    }

    /// Cancel outstanding downloads and delete every stored photo
    pub async fn delete_all_photos(&self) -> Result<usize, StageError> {
        let running = self.running.lock().await;
        let Some(pipeline) = running.as_ref() else {
            return self.storage.delete_all().await;
        };

        let (reply, response) = oneshot::channel();
        pipeline
            .commands
            .send(Command::PurgePhotos { reply })
            .map_err(|_| StageError::Storage("photo pipeline is shutting down".to_string()))?;
        response
            .await
            .map_err(|_| StageError::Storage("photo pipeline stopped during purge".to_string()))?
    }

    pub async fn status(&self) -> PipelineStatus {
        let (reply, response) = oneshot::channel();
        if !self.send(Command::Status { reply }).await {
            return PipelineStatus {
                search_enabled: self.search_enabled(),
                ..PipelineStatus::default()
            };
        }
        response.await.unwrap_or_default()
    }

    async fn send(&self, command: Command) -> bool {
        let running = self.running.lock().await;
        match running.as_ref() {
            Some(pipeline) => pipeline.commands.send(command).is_ok(),
            None => false,
        }
    }
}

/// Ids waiting for an eligibility check, each queued at most once
#[derive(Debug, Default)]
struct WorkQueue {
    order: VecDeque<Uuid>,
    queued: HashSet<Uuid>,
}

impl WorkQueue {
    fn push(&mut self, id: Uuid) {
        if self.queued.insert(id) {
            self.order.push_back(id);
        }
    }

    fn pop(&mut self) -> Option<Uuid> {
        let id = self.order.pop_front()?;
        self.queued.remove(&id);
        Some(id)
    }

    fn clear(&mut self) {
        self.order.clear();
        self.queued.clear();
    }
}

struct PipelineActor {
    store: CheckpointStore,
    event_bus: EventBus,
    search: Option<PhotoSearchStage>,
    download: PhotoDownloadStage,
    queue: WorkQueue,
    outcomes_tx: mpsc::UnboundedSender<StageOutcome>,
}

impl PipelineActor {
    async fn run(
        mut self,
        mut changes: broadcast::Receiver<StoreChange>,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut outcomes: mpsc::UnboundedReceiver<StageOutcome>,
        cancel: CancellationToken,
    ) {
        let launched = self.rescan().await;
        debug!(launched, "Initial pipeline scan complete");

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                Some(outcome) = outcomes.recv() => self.apply(outcome).await,

                change = changes.recv() => match change {
                    Ok(change) => {
                        self.note_change(change);
                        // Coalesce whatever else is already waiting
                        loop {
                            match changes.try_recv() {
                                Ok(more) => self.note_change(more),
                                Err(TryRecvError::Lagged(skipped)) => {
                                    self.recover_from_lag(skipped).await;
                                }
                                Err(_) => break,
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => self.recover_from_lag(skipped).await,
                    Err(RecvError::Closed) => break,
                },

                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
            }

            self.drain_queue().await;
        }

        let search_cancelled = self.search.as_mut().map_or(0, PhotoSearchStage::cancel_all);
        let download_cancelled = self.download.cancel_all();
        debug!(search_cancelled, download_cancelled, "Pipeline actor exiting");
    }

    fn note_change(&mut self, change: StoreChange) {
        match change {
            StoreChange::Created(id) | StoreChange::Updated(id) => self.queue.push(id),
            StoreChange::Cleared => {
                self.queue.clear();
                if let Some(search) = self.search.as_mut() {
                    search.cancel_all();
                }
                self.download.cancel_all();
            }
        }
    }

    async fn recover_from_lag(&mut self, skipped: u64) {
        warn!(skipped, "Missed checkpoint notifications, rescanning");
        self.enqueue_eligible().await;
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Rescan { reply } => {
                let launched = self.rescan().await;
                info!(launched, "Pipeline resumed");
                let _ = reply.send(launched);
            }
            Command::PurgePhotos { reply } => {
                let _ = reply.send(self.download.purge().await);
            }
            Command::Status { reply } => {
                let _ = reply.send(PipelineStatus {
                    running: true,
                    search_enabled: self.search.is_some(),
                    searches_in_flight: self
                        .search
                        .as_ref()
                        .map_or(0, PhotoSearchStage::in_flight_count),
                    downloads_in_flight: self.download.in_flight_count(),
                });
            }
        }
    }

    async fn apply(&mut self, outcome: StageOutcome) {
        match outcome {
            StageOutcome::Search {
                checkpoint_id,
                ticket,
                result,
            } => {
                if let Some(search) = self.search.as_mut() {
                    search
                        .apply(&self.store, &self.event_bus, checkpoint_id, ticket, result)
                        .await;
                }
            }
            StageOutcome::Download {
                checkpoint_id,
                ticket,
                result,
            } => {
                self.download
                    .apply(&self.store, &self.event_bus, checkpoint_id, ticket, result)
                    .await;
            }
        }
    }

    /// Queue every currently eligible checkpoint
    async fn enqueue_eligible(&mut self) {
        let mut filters = vec![CheckpointFilter::DownloadEligible];
        if self.search.is_some() {
            filters.insert(0, CheckpointFilter::SearchEligible);
        }

        for filter in filters {
            match self.store.query(filter).await {
                Ok(checkpoints) => {
                    for checkpoint in checkpoints {
                        self.queue.push(checkpoint.id);
                    }
                }
                Err(e) => error!("Pipeline scan failed: {}", e),
            }
        }
    }

    async fn rescan(&mut self) -> usize {
        self.enqueue_eligible().await;
        self.drain_queue().await
    }

    /// Check each queued checkpoint and launch whatever stage it needs
    async fn drain_queue(&mut self) -> usize {
        let mut launched = 0;

        while let Some(id) = self.queue.pop() {
            let checkpoint = match self.store.get(id).await {
                Ok(Some(checkpoint)) => checkpoint,
                Ok(None) => continue,
                Err(e) => {
                    warn!(checkpoint_id = %id, "Could not load checkpoint: {}", e);
                    continue;
                }
            };

            if let Some(search) = self.search.as_mut() {
                if search.launch(&checkpoint, &self.outcomes_tx) {
                    launched += 1;
                }
            }
            if self.download.launch(&checkpoint, &self.outcomes_tx) {
                launched += 1;
            }
        }

        launched
    }
}

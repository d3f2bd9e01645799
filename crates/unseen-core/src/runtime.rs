//! Mount-scoped driver.
//!
//! [`EngineRuntime::mount`] spawns one task that exclusively owns a fresh
//! [`NotificationEngine`], the event subscription, the refresh interval and
//! at most one in-flight snapshot fetch. All mutation and reconciliation
//! happen on that task; the outside world talks to it through an
//! [`EngineHandle`] and reads [`NotificationView`]s from a watch channel.
//! Unmounting stops the task and thereby drops the subscription, the timer
//! and any fetch still in flight.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::future::OptionFuture;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::EngineConfig;
use crate::constants::COMMAND_CHANNEL_CAPACITY;
use crate::engine::NotificationEngine;
use crate::models::{ConversationSummary, NotificationView, SnapshotBatch};
use crate::snapshot::SnapshotLoader;
use crate::source::EventSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    Dismiss { conversation_id: String },
    DismissAll,
    Open { conversation_id: String },
    /// Fetch a snapshot now unless one is already in flight
    Refresh,
}

#[derive(Clone)]
pub struct EngineHandle {
    command_tx: mpsc::Sender<EngineCommand>,
    view_rx: watch::Receiver<NotificationView>,
}

impl EngineHandle {
    pub async fn send(&self, command: EngineCommand) -> Result<(), mpsc::error::SendError<EngineCommand>> {
        self.command_tx.send(command).await
    }

    pub async fn dismiss(&self, conversation_id: impl Into<String>) -> Result<(), mpsc::error::SendError<EngineCommand>> {
        self.send(EngineCommand::Dismiss {
            conversation_id: conversation_id.into(),
        })
        .await
    }

    pub async fn dismiss_all(&self) -> Result<(), mpsc::error::SendError<EngineCommand>> {
        self.send(EngineCommand::DismissAll).await
    }

    pub async fn open(&self, conversation_id: impl Into<String>) -> Result<(), mpsc::error::SendError<EngineCommand>> {
        self.send(EngineCommand::Open {
            conversation_id: conversation_id.into(),
        })
        .await
    }

    pub async fn refresh(&self) -> Result<(), mpsc::error::SendError<EngineCommand>> {
        self.send(EngineCommand::Refresh).await
    }

    /// Latest published view
    pub fn view(&self) -> NotificationView {
        self.view_rx.borrow().clone()
    }

    pub fn subscribe_view(&self) -> watch::Receiver<NotificationView> {
        self.view_rx.clone()
    }
}

/// One mount. Call [`MountHandle::unmount`] to release everything it holds;
/// dropping it without unmounting aborts the driver task.
pub struct MountHandle {
    handle: EngineHandle,
    cancel_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl MountHandle {
    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    pub fn view(&self) -> NotificationView {
        self.handle.view()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    pub async fn unmount(mut self) {
        let _ = self.cancel_tx.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "driver task ended abnormally");
            }
        }
    }
}

impl Drop for MountHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

pub struct EngineRuntime<S, L> {
    config: EngineConfig,
    source: Arc<S>,
    loader: Arc<L>,
}

impl<S: EventSource, L: SnapshotLoader> EngineRuntime<S, L> {
    pub fn new(config: EngineConfig, source: S, loader: L) -> Result<Self> {
        config.validate().context("Invalid engine config")?;
        Ok(Self {
            config,
            source: Arc::new(source),
            loader: Arc::new(loader),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start a mount. Must be called from within a tokio runtime.
    pub fn mount(&self) -> Result<MountHandle> {
        let runtime = tokio::runtime::Handle::try_current()
            .context("Mounting the notification engine requires a tokio runtime")?;

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (view_tx, view_rx) = watch::channel(NotificationView::default());
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let driver = Driver {
            engine: NotificationEngine::new(self.config.clone()),
            source: Arc::clone(&self.source),
            loader: Arc::clone(&self.loader),
            command_rx,
            cancel_rx,
            view_tx,
        };
        let task = runtime.spawn(driver.run());

        tracing::info!(
            staff_id = %self.config.staff_id,
            tenant_id = self.config.tenant_id.as_deref().unwrap_or("-"),
            "notification engine mounted"
        );
        Ok(MountHandle {
            handle: EngineHandle {
                command_tx,
                view_rx,
            },
            cancel_tx,
            task: Some(task),
        })
    }
}

type FetchResult = (DateTime<Utc>, Result<Vec<ConversationSummary>>);
type InflightFetch = Pin<Box<dyn Future<Output = FetchResult> + Send>>;

struct Driver<S, L> {
    engine: NotificationEngine,
    source: Arc<S>,
    loader: Arc<L>,
    command_rx: mpsc::Receiver<EngineCommand>,
    cancel_rx: watch::Receiver<bool>,
    view_tx: watch::Sender<NotificationView>,
}

impl<S: EventSource, L: SnapshotLoader> Driver<S, L> {
    async fn run(mut self) {
        let coalesce_window = self.engine.config().coalesce_window();
        let resubscribe_delay = self.engine.config().resubscribe_delay();

        let mut refresh = tokio::time::interval(self.engine.config().snapshot_interval());
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut events = self.subscribe();
        let mut resubscribe_at = if events.is_none() {
            Some(Instant::now() + resubscribe_delay)
        } else {
            None
        };
        let mut inflight: Option<InflightFetch> = None;
        // mount tick
        let mut tick_at: Option<Instant> = Some(Instant::now());

        loop {
            let tick_deadline = tick_at.unwrap_or_else(Instant::now);
            let resubscribe_deadline = resubscribe_at.unwrap_or_else(Instant::now);

            tokio::select! {
                biased;

                changed = self.cancel_rx.changed() => {
                    if changed.is_err() || *self.cancel_rx.borrow() {
                        break;
                    }
                }

                Some(command) = self.command_rx.recv() => {
                    self.handle_command(command, &mut inflight);
                    tick_at = Some(Instant::now());
                }

                event = next_event(&mut events) => match event {
                    Some(raw) => {
                        if self.engine.handle_raw_event(&raw) && tick_at.is_none() {
                            tick_at = Some(Instant::now() + coalesce_window);
                        }
                    }
                    None => {
                        tracing::warn!("event channel closed; reconciling against last known state");
                        events = None;
                        resubscribe_at = Some(Instant::now() + resubscribe_delay);
                    }
                },

                Some((requested_at, result)) = OptionFuture::from(inflight.as_mut()), if inflight.is_some() => {
                    inflight = None;
                    match result {
                        Ok(conversations) => {
                            self.engine.apply_snapshot(SnapshotBatch::new(requested_at, conversations));
                            if tick_at.is_none() {
                                tick_at = Some(Instant::now() + coalesce_window);
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "snapshot fetch failed; retrying on next refresh");
                        }
                    }
                }

                _ = tokio::time::sleep_until(tick_deadline), if tick_at.is_some() => {
                    tick_at = None;
                    self.tick();
                }

                _ = tokio::time::sleep_until(resubscribe_deadline), if resubscribe_at.is_some() => {
                    events = self.subscribe();
                    resubscribe_at = if events.is_none() {
                        Some(Instant::now() + resubscribe_delay)
                    } else {
                        None
                    };
                }

                _ = refresh.tick() => {
                    if inflight.is_none() {
                        inflight = Some(self.start_fetch());
                    } else {
                        tracing::debug!("snapshot fetch still in flight; skipping refresh");
                    }
                }
            }
        }

        tracing::info!("notification engine unmounted");
    }

    fn subscribe(&self) -> Option<mpsc::Receiver<Value>> {
        match self.source.subscribe() {
            Ok(rx) => Some(rx),
            Err(e) => {
                tracing::warn!(error = %e, "event subscription failed");
                None
            }
        }
    }

    fn start_fetch(&self) -> InflightFetch {
        let loader = Arc::clone(&self.loader);
        let requested_at = Utc::now();
        tracing::debug!(%requested_at, "snapshot fetch started");
        Box::pin(async move { (requested_at, loader.fetch().await) })
    }

    fn handle_command(&mut self, command: EngineCommand, inflight: &mut Option<InflightFetch>) {
        match command {
            EngineCommand::Dismiss { conversation_id } => {
                self.engine.dismiss(&conversation_id);
            }
            EngineCommand::DismissAll => {
                self.engine.dismiss_all();
            }
            EngineCommand::Open { conversation_id } => {
                self.engine.open(&conversation_id, Utc::now());
            }
            EngineCommand::Refresh => {
                if inflight.is_none() {
                    *inflight = Some(self.start_fetch());
                }
            }
        }
    }

    fn tick(&mut self) {
        self.engine.tick(Utc::now());
        let view = self.engine.view();
        self.view_tx.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
    }
}

async fn next_event(events: &mut Option<mpsc::Receiver<Value>>) -> Option<Value> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

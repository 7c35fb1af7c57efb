//! Confirmation tracking over push and pull channels.
//!
//! Each [`ConfirmationTracker::track`] call spawns a push listener and a
//! poller feeding one resolution loop. The first terminal report wins; both
//! tasks are aborted as soon as the call returns, however it returns.
//!
//! A success below the caller's minimum block height is treated as still
//! pending. When the initial pull is already terminal, the loop holds it for
//! a short corroboration window so the push channel can confirm it first.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::AbortHandle;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::error::{SubmissionError, TrackError};
use crate::status::{PushEvent, StatusReport, TxStatus};

const PUSH_BUFFER: usize = 256;

/// Pull side of tracking.
#[async_trait]
pub trait StatusSource: Send + Sync + 'static {
    async fn status(&self, group: &str, tx_id: &str) -> Result<StatusReport, SubmissionError>;
}

/// What to track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRequest {
    pub tx_id: String,
    /// Group used for status queries; `retail` for aggregate submissions.
    pub group: String,
    /// Successes below this height count as pending.
    pub min_height: u64,
}

/// Channel a report arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Push,
    Pull,
}

/// Terminal state of a tracked transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Success { block_height: u64, verified: bool },
    Failed { reason: String },
}

/// Result of a tracking call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackOutcome {
    pub tx_id: String,
    pub resolution: Resolution,
    /// Channel whose report won.
    pub via: Channel,
    /// Whether a terminal first pull was confirmed over push.
    pub corroborated: bool,
}

#[derive(Debug)]
struct Report {
    channel: Channel,
    initial: bool,
    status: TxStatus,
    verified: bool,
    block_height: u64,
    error_reason: Option<String>,
}

impl Report {
    fn pulled(report: StatusReport, initial: bool) -> Self {
        Self {
            channel: Channel::Pull,
            initial,
            status: report.status,
            verified: report.verified,
            block_height: report.block_height,
            error_reason: report.error_reason,
        }
    }

    fn pushed(event: PushEvent) -> Self {
        Self {
            channel: Channel::Push,
            initial: false,
            status: event.status,
            verified: event.status == TxStatus::Success,
            block_height: event.block_height,
            error_reason: event.error_reason,
        }
    }

    fn resolution(&self, min_height: u64) -> Option<Resolution> {
        match self.status {
            TxStatus::Success if self.block_height >= min_height => Some(Resolution::Success {
                block_height: self.block_height,
                verified: self.verified,
            }),
            TxStatus::Success => {
                debug!(
                    height = self.block_height,
                    min_height, "success below minimum height, still pending"
                );
                None
            }
            TxStatus::Failed => Some(Resolution::Failed {
                reason: self.error_reason.clone().unwrap_or_default(),
            }),
            TxStatus::Pending | TxStatus::NotFound => None,
        }
    }
}

/// Aborts the spawned channel tasks when a tracking call ends.
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Confirmation tracking service.
///
/// Starts stopped; call [`start`](Self::start) before tracking.
/// [`stop`](Self::stop) ends every in-flight [`track`](Self::track) call
/// with [`TrackError::Stopped`].
pub struct ConfirmationTracker {
    config: TrackerConfig,
    source: Arc<dyn StatusSource>,
    push: broadcast::Sender<PushEvent>,
    push_live: AtomicBool,
    running: watch::Sender<bool>,
}

impl ConfirmationTracker {
    pub fn new(config: TrackerConfig, source: Arc<dyn StatusSource>) -> Self {
        let (push, _) = broadcast::channel(PUSH_BUFFER);
        let (running, _) = watch::channel(false);
        Self {
            config,
            source,
            push,
            push_live: AtomicBool::new(false),
            running,
        }
    }

    pub fn start(&self) {
        self.running.send_replace(true);
        info!("confirmation tracker started");
    }

    pub fn stop(&self) {
        self.running.send_replace(false);
        info!("confirmation tracker stopped");
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    /// Whether the push channel is believed connected.
    pub fn set_push_live(&self, live: bool) {
        self.push_live.store(live, Ordering::Relaxed);
    }

    /// Deliver a push event. Returns how many tracking calls received it.
    pub fn push_event(&self, event: PushEvent) -> usize {
        self.push.send(event).unwrap_or(0)
    }

    /// Wait for a terminal report on a transaction.
    pub async fn track(&self, request: TrackRequest) -> Result<TrackOutcome, TrackError> {
        let mut running = self.running.subscribe();
        if !*running.borrow_and_update() {
            return Err(TrackError::Stopped);
        }

        let (tx, mut rx) = mpsc::channel::<Report>(16);
        let push_task = self.spawn_push_listener(&request, tx.clone());
        let poll_task = self.spawn_poller(&request, tx);
        let _guard = AbortOnDrop(vec![push_task, poll_task]);

        let deadline = sleep(self.config.timeout);
        tokio::pin!(deadline);
        let mut held: Option<(Resolution, Instant)> = None;

        loop {
            let hold_until = held.as_ref().map(|(_, at)| *at).unwrap_or_else(Instant::now);
            tokio::select! {
                _ = &mut deadline => {
                    warn!(tx_id = %request.tx_id, "confirmation timed out");
                    return Err(TrackError::Timeout {
                        tx_id: request.tx_id,
                        after: self.config.timeout,
                    });
                }
                changed = running.changed() => {
                    if changed.is_err() || !*running.borrow_and_update() {
                        return Err(TrackError::Stopped);
                    }
                }
                _ = sleep_until(hold_until), if held.is_some() => {
                    if let Some((resolution, _)) = held.take() {
                        return Ok(self.finish(request, resolution, Channel::Pull, false));
                    }
                }
                report = rx.recv() => {
                    let Some(report) = report else {
                        return Err(TrackError::ChannelsClosed);
                    };
                    let Some(resolution) = report.resolution(request.min_height) else {
                        continue;
                    };
                    match report.channel {
                        Channel::Push => {
                            let corroborated = held.is_some();
                            return Ok(self.finish(request, resolution, Channel::Push, corroborated));
                        }
                        Channel::Pull if held.is_some() => continue,
                        Channel::Pull if report.initial && !self.config.corroboration_grace.is_zero() => {
                            debug!(tx_id = %request.tx_id, "initial pull terminal, awaiting push corroboration");
                            let until = Instant::now()
                                .checked_add(self.config.corroboration_grace)
                                .unwrap_or_else(|| deadline.deadline());
                            held = Some((resolution, until));
                        }
                        Channel::Pull => {
                            return Ok(self.finish(request, resolution, Channel::Pull, false));
                        }
                    }
                }
            }
        }
    }

    fn finish(
        &self,
        request: TrackRequest,
        resolution: Resolution,
        via: Channel,
        corroborated: bool,
    ) -> TrackOutcome {
        info!(tx_id = %request.tx_id, ?resolution, ?via, corroborated, "transaction resolved");
        TrackOutcome {
            tx_id: request.tx_id,
            resolution,
            via,
            corroborated,
        }
    }

    fn spawn_push_listener(&self, request: &TrackRequest, tx: mpsc::Sender<Report>) -> AbortHandle {
        let mut events = self.push.subscribe();
        let tx_id = request.tx_id.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) if event.transaction_id == tx_id => {
                        if tx.send(Report::pushed(event)).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "push listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
        .abort_handle()
    }

    fn spawn_poller(&self, request: &TrackRequest, tx: mpsc::Sender<Report>) -> AbortHandle {
        let source = Arc::clone(&self.source);
        let group = request.group.clone();
        let tx_id = request.tx_id.clone();
        let interval = self.config.poll_interval;
        let first_wait = first_poll_delay(&self.config, self.push_live.load(Ordering::Relaxed));
        tokio::spawn(async move {
            let mut initial = true;
            let mut wait = first_wait;
            loop {
                match source.status(&group, &tx_id).await {
                    Ok(report) => {
                        if tx.send(Report::pulled(report, initial)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(%tx_id, error = %e, "status pull failed"),
                }
                initial = false;
                sleep(wait).await;
                wait = interval;
            }
        })
        .abort_handle()
    }
}

impl std::fmt::Debug for ConfirmationTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationTracker")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .field("push_live", &self.push_live.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Delay between the one-shot initial pull and regular polling.
pub fn first_poll_delay(config: &TrackerConfig, push_live: bool) -> Duration {
    if push_live {
        config.push_grace
    } else {
        config.poll_interval
    }
}

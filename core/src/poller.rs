//! Per-kind polling of a single tracked job.
//!
//! ```text
//!   Idle ──start(id)──► Polling ──terminal status──► Idle
//!                        │   ▲
//!                        └───┘ tick: fetch, replace snapshot
//! ```
//!
//! The timer runs in its own task and only *fetches*; every answer comes
//! back through a channel and is applied by the owner, so the snapshot has
//! a single writer. Each answer carries the job generation (bumped on every
//! `start`) and the tick sequence it was issued at; anything from an older
//! generation, or older than the freshest applied answer, is dropped.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::api::Backend;
use crate::error::ApiError;
use crate::job::{Job, JobId, JobKind};

struct Tick {
    generation: u64,
    seq: u64,
    result: Result<Option<Job>, ApiError>,
}

/// Owned handle to a running poll timer.
///
/// Cancelling (or dropping) it stops the timer and aborts fetches still in flight.
pub struct PollHandle(JoinHandle<()>);

impl PollHandle {
    /// Stop the timer now.
    pub fn cancel(&self) { self.0.abort(); }
}

impl Drop for PollHandle {
    fn drop(&mut self) { self.0.abort(); }
}

/// The job a controller is currently tracking.
pub struct JobRef {
    id: JobId,
    kind: JobKind,
    last: Option<Job>,
    generation: u64,
    fresh_after: Option<u64>,
    handle: Option<PollHandle>,
}

impl JobRef {
    /// Tracked job id.
    pub fn id(&self) -> &JobId { &self.id }
    /// Tracked job kind.
    pub fn kind(&self) -> JobKind { self.kind }
    /// Last good snapshot, if any fetch has succeeded yet.
    pub fn snapshot(&self) -> Option<&Job> { self.last.as_ref() }
}

/// What applying one poll answer did.
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    /// Fresh non-terminal snapshot; re-render.
    Updated(Job),
    /// Terminal snapshot; polling stopped and the reference was cleared.
    Finished(Job),
    /// Fetch failed or job not found; previous snapshot kept.
    Skipped,
    /// Answer for an abandoned job or older than what is shown; dropped.
    Stale,
}

/// Polls at most one job of one kind.
pub struct PollingController<B> {
    kind: JobKind,
    backend: B,
    every: Duration,
    generation: u64,
    current: Option<JobRef>,
    tx: mpsc::UnboundedSender<Tick>,
    rx: mpsc::UnboundedReceiver<Tick>,
}

impl<B: Backend> PollingController<B> {
    /// Idle controller for `kind` that fetches every `every` once started.
    pub fn new(kind: JobKind, backend: B, every: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { kind, backend, every, generation: 0, current: None, tx, rx }
    }

    /// Kind this controller tracks.
    pub fn kind(&self) -> JobKind { self.kind }

    /// The tracked job, if any.
    pub fn current(&self) -> Option<&JobRef> { self.current.as_ref() }

    /// `true` while a timer is live.
    pub fn is_polling(&self) -> bool {
        self.current.as_ref().is_some_and(|c| c.handle.is_some())
    }

    /// Stop tracking; the timer is cancelled before this returns.
    pub fn stop(&mut self) {
        if let Some(cur) = self.current.take() {
            if let Some(h) = &cur.handle {
                h.cancel();
            }
            debug!(kind = %self.kind, job = %cur.id, "polling cancelled");
        }
    }

    /// Start tracking `id`, abandoning any job tracked before.
    ///
    /// Fetches once right away; the timer is only scheduled if that first
    /// snapshot is not already terminal.
    pub async fn start(&mut self, id: JobId) -> PollEvent {
        self.stop();
        self.generation += 1;
        let generation = self.generation;
        self.current = Some(JobRef {
            id: id.clone(),
            kind: self.kind,
            last: None,
            generation,
            fresh_after: None,
            handle: None,
        });
        info!(kind = %self.kind, job = %id, every_ms = self.every.as_millis() as u64, "polling started");

        let result = self.backend.fetch_job(self.kind, &id).await;
        let event = self.apply(Tick { generation, seq: 0, result });
        if let Some(cur) = self.current.as_mut() {
            cur.handle = Some(spawn_ticker(self.backend.clone(), self.kind, id, generation, self.every, self.tx.clone()));
        }
        event
    }

    /// Wait for the next poll answer that is not stale and apply it.
    ///
    /// Cancel-safe; pends forever while idle.
    pub async fn next(&mut self) -> PollEvent {
        loop {
            let Some(tick) = self.rx.recv().await else {
                return std::future::pending().await;
            };
            match self.apply(tick) {
                PollEvent::Stale => continue,
                event => return event,
            }
        }
    }

    fn apply(&mut self, tick: Tick) -> PollEvent {
        let kind = self.kind;
        let Some(cur) = self.current.as_mut() else {
            return PollEvent::Stale;
        };
        if tick.generation != cur.generation || cur.fresh_after.is_some_and(|s| tick.seq <= s) {
            debug!(%kind, job = %cur.id, seq = tick.seq, "stale poll answer dropped");
            return PollEvent::Stale;
        }
        match tick.result {
            Err(e) => {
                debug!(%kind, job = %cur.id, seq = tick.seq, err = %e, "poll fetch failed, keeping snapshot");
                PollEvent::Skipped
            }
            Ok(None) => {
                debug!(%kind, job = %cur.id, seq = tick.seq, "job not found, keeping snapshot");
                PollEvent::Skipped
            }
            Ok(Some(job)) => {
                cur.fresh_after = Some(tick.seq);
                cur.last = Some(job.clone());
                if job.is_terminal() {
                    info!(%kind, job = %job.id, status = %job.status, "job finished, polling stopped");
                    self.stop();
                    PollEvent::Finished(job)
                } else {
                    debug!(%kind, job = %job.id, status = %job.status, progress = job.progress(), "poll tick");
                    PollEvent::Updated(job)
                }
            }
        }
    }
}

fn spawn_ticker<B: Backend>(
    backend: B,
    kind: JobKind,
    id: JobId,
    generation: u64,
    every: Duration,
    tx: mpsc::UnboundedSender<Tick>,
) -> PollHandle {
    PollHandle(tokio::spawn(async move {
        let mut tick = interval_at(Instant::now() + every, every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // a slow fetch must not hold back the next tick
        let mut inflight = JoinSet::new();
        let mut seq = 0u64;
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    seq += 1;
                    let (backend, id, tx) = (backend.clone(), id.clone(), tx.clone());
                    inflight.spawn(async move {
                        let result = backend.fetch_job(kind, &id).await;
                        let _ = tx.send(Tick { generation, seq, result });
                    });
                }
                Some(_) = inflight.join_next(), if !inflight.is_empty() => {}
            }
        }
    }))
}

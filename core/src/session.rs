//! Root controller: owns the client state and drives polling and sync.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::{Backend, CampaignStats, ClientConfig, Post, PostDetails};
use crate::cfg::Config;
use crate::error::{ApiError, SubmitError, ValidationError};
use crate::gateway::SubmissionGateway;
use crate::job::{JobId, JobKind, PostId};
use crate::poller::{PollEvent, PollingController};
use crate::selection::Selection;
use crate::settings::ServerSettings;
use crate::sync::{Listing, TaskListSynchronizer};
use crate::view::{Notice, View};

/// When [`Session::drive`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Until {
    /// Only when the shutdown signal fires.
    Shutdown,
    /// As soon as polling of this kind is idle (or on shutdown).
    Settled(JobKind),
}

/// One operator session against a backend.
pub struct Session<B: Backend, V: View> {
    backend: B,
    view: V,
    config: ClientConfig,
    posts: Vec<Post>,
    selection: Selection,
    gateway: SubmissionGateway<B>,
    broadcasts: PollingController<B>,
    watches: PollingController<B>,
    tasks: TaskListSynchronizer<B>,
    watchers: TaskListSynchronizer<B>,
    posts_limit: u32,
    sync_every: Duration,
}

impl<B: Backend, V: View> Session<B, V> {
    /// Fresh session with empty state; timings come from `cfg`.
    pub fn new(backend: B, view: V, cfg: &Config) -> Self {
        Self {
            gateway: SubmissionGateway::new(backend.clone()),
            broadcasts: PollingController::new(JobKind::Broadcast, backend.clone(), cfg.poll_interval()),
            watches: PollingController::new(JobKind::Watcher, backend.clone(), cfg.poll_interval()),
            tasks: TaskListSynchronizer::new(JobKind::Broadcast, backend.clone()),
            watchers: TaskListSynchronizer::new(JobKind::Watcher, backend.clone()),
            backend,
            view,
            config: ClientConfig::default(),
            posts: Vec::new(),
            selection: Selection::default(),
            posts_limit: cfg.posts_limit,
            sync_every: cfg.sync_interval(),
        }
    }

    /// Seed the selection, e.g. from the local store.
    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    /// Backend configuration as last seen.
    pub fn config(&self) -> &ClientConfig { &self.config }
    /// Currently selected posts.
    pub fn selection(&self) -> &Selection { &self.selection }
    /// Posts from the last good feed load.
    pub fn posts(&self) -> &[Post] { &self.posts }
    /// The view.
    pub fn view(&self) -> &V { &self.view }
    /// Aggregate list of `kind`.
    pub fn listing(&self, kind: JobKind) -> &Listing {
        match kind {
            JobKind::Broadcast => self.tasks.listing(),
            JobKind::Watcher => self.watchers.listing(),
        }
    }
    /// Poller of `kind`.
    pub fn poller(&self, kind: JobKind) -> &PollingController<B> {
        match kind {
            JobKind::Broadcast => &self.broadcasts,
            JobKind::Watcher => &self.watches,
        }
    }

    /// Fetch the backend configuration and show the community list.
    pub async fn load_config(&mut self) -> Result<(), ApiError> {
        match self.backend.client_config().await {
            Ok(cfg) => {
                self.config = cfg;
                Ok(())
            }
            Err(e) => {
                warn!(err = %e, "config load failed");
                self.view.notify(Notice::Error(format!("could not load settings: {}", e.detail())));
                Err(e)
            }
        }
    }

    /// Start-up rendering: selection, communities, both job lists, group.
    pub async fn init(&mut self) {
        self.view.selection(&self.selection);
        self.view.communities(&self.config);
        self.refresh(JobKind::Broadcast).await;
        self.refresh(JobKind::Watcher).await;
        self.load_group_info().await;
    }

    /// Reload the post feed. Returns `false` if it could not be loaded.
    pub async fn load_posts(&mut self) -> bool {
        match self.backend.list_posts(self.posts_limit).await {
            Ok(items) => {
                debug!(count = items.len(), "posts loaded");
                self.posts = items;
                self.view.posts(&self.posts, &self.selection, self.watchers.listing());
                if !self.posts.is_empty() {
                    self.view.notify(Notice::Info("posts updated".into()));
                }
                true
            }
            Err(e) => {
                warn!(err = %e, "posts load failed");
                self.view.posts_unavailable(&e.detail());
                self.view.notify(Notice::Error("could not load posts".into()));
                false
            }
        }
    }

    /// Load and show group metadata; failures stay quiet.
    pub async fn load_group_info(&mut self) -> bool {
        match self.backend.group_info().await {
            Ok(info) => {
                self.view.group_info(&info);
                true
            }
            Err(e) => {
                debug!(err = %e, "group info unavailable");
                false
            }
        }
    }

    /// Fetch and show one post.
    pub async fn post_details(&mut self, id: PostId) -> Result<PostDetails, ApiError> {
        match self.backend.post_details(id).await {
            Ok(details) => {
                self.view.post_details(&details);
                Ok(details)
            }
            Err(e) => {
                self.view.notify(Notice::Error(format!("could not load post {id}: {}", e.detail())));
                Err(e)
            }
        }
    }

    /// Select a post.
    pub fn select(&mut self, id: PostId) {
        self.selection.add(id);
        self.view.selection(&self.selection);
    }

    /// Deselect a post.
    pub fn deselect(&mut self, id: PostId) {
        self.selection.remove(id);
        self.view.selection(&self.selection);
    }

    /// Deselect everything.
    pub fn clear_selection(&mut self) {
        self.selection.clear();
        self.view.selection(&self.selection);
    }

    /// Render the selection as it is.
    pub fn show_selection(&mut self) {
        self.view.selection(&self.selection);
    }

    /// Broadcast `message` to the selected posts and start tracking the job.
    pub async fn start_broadcast(&mut self, message: &str) -> Result<JobId, SubmitError> {
        let targets = self.selection.members().to_vec();
        let id = match self.gateway.submit_broadcast(&targets, message).await {
            Ok(id) => id,
            Err(e) => {
                self.view.notify(Notice::Error(e.to_string()));
                return Err(e);
            }
        };
        self.view.notify(Notice::Info(format!("broadcast {id} started")));
        self.track(JobKind::Broadcast, id.clone()).await;
        self.refresh(JobKind::Broadcast).await;
        Ok(id)
    }

    /// Start an auto-reply with `message` on the first selected post.
    ///
    /// Watchers take exactly one post; other selected posts are ignored.
    pub async fn start_watch(&mut self, message: &str) -> Result<JobId, SubmitError> {
        let Some(target) = self.selection.first() else {
            let e = SubmitError::from(ValidationError::EmptySelection);
            self.view.notify(Notice::Error(e.to_string()));
            return Err(e);
        };
        let id = match self.gateway.submit_watcher(target, message).await {
            Ok(id) => id,
            Err(e) => {
                self.view.notify(Notice::Error(e.to_string()));
                return Err(e);
            }
        };
        if self.selection.len() > 1 {
            self.view.notify(Notice::Info(format!("auto-reply takes one post; using #{target}")));
        }
        self.view.notify(Notice::Info(format!("auto-reply {id} started on #{target}")));
        self.track(JobKind::Watcher, id.clone()).await;
        self.refresh(JobKind::Watcher).await;
        self.load_posts().await;
        Ok(id)
    }

    /// Follow an existing job, abandoning the one of the same kind tracked before.
    pub async fn track(&mut self, kind: JobKind, id: JobId) {
        let event = match kind {
            JobKind::Broadcast => self.broadcasts.start(id).await,
            JobKind::Watcher => self.watches.start(id).await,
        };
        self.on_poll(kind, event).await;
    }

    /// Fetch and show delivery counts of broadcast `id`.
    pub async fn campaign_stats(&mut self, id: &JobId) -> Result<CampaignStats, ApiError> {
        match self.backend.campaign_stats(id).await {
            Ok(stats) => {
                self.view.campaign_stats(id, &stats);
                Ok(stats)
            }
            Err(e) => {
                self.view.notify(Notice::Error(format!("could not load stats of {id}: {}", e.detail())));
                Err(e)
            }
        }
    }

    /// Refresh the aggregate list of `kind` and show it.
    pub async fn refresh(&mut self, kind: JobKind) {
        let sync = match kind {
            JobKind::Broadcast => &mut self.tasks,
            JobKind::Watcher => &mut self.watchers,
        };
        let listing = sync.refresh().await;
        self.view.job_list(kind, listing);
        if kind == JobKind::Watcher && !self.posts.is_empty() {
            // watcher highlight may have changed
            self.view.posts(&self.posts, &self.selection, self.watchers.listing());
        }
    }

    /// Make `group_id` the active community.
    ///
    /// Nothing local changes unless the backend accepts the switch; after
    /// that the selection is cleared and group info and posts are reloaded.
    pub async fn switch_context(&mut self, group_id: i64) -> Result<(), ApiError> {
        let cfg = match self.backend.set_active_group(group_id).await {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(group_id, err = %e, "community switch rejected");
                self.view.notify(Notice::Error(format!("could not switch community: {}", e.detail())));
                return Err(e);
            }
        };
        info!(group_id, "community switched");
        self.config = cfg;
        self.selection.clear();
        self.view.communities(&self.config);
        self.view.selection(&self.selection);
        self.load_group_info().await;
        // posts of the previous community are no longer valid
        self.posts.clear();
        if self.load_posts().await {
            self.view.notify(Notice::Info("community switched".into()));
        }
        Ok(())
    }

    /// Validate and store backend settings, then reload the configuration.
    pub async fn save_settings(&mut self, settings: ServerSettings) -> Result<(), SubmitError> {
        let settings = match settings.validate() {
            Ok(s) => s,
            Err(e) => {
                self.view.notify(Notice::Error(e.to_string()));
                return Err(e.into());
            }
        };
        if let Err(e) = self.backend.save_settings(&settings).await {
            self.view.notify(Notice::Error(format!("could not save settings: {}", e.detail())));
            return Err(SubmitError::Rejected(e));
        }
        info!(communities = settings.communities.len(), "settings saved");
        self.view.notify(Notice::Info("settings saved".into()));
        if self.load_config().await.is_ok() {
            self.view.communities(&self.config);
        }
        Ok(())
    }

    /// Run the event loop: poll answers, periodic list sync, shutdown.
    pub async fn drive(&mut self, shutdown: &mut watch::Receiver<bool>, until: Until) {
        if self.settled(until) || *shutdown.borrow() {
            return;
        }
        let mut sync = interval_at(Instant::now() + self.sync_every, self.sync_every);
        sync.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                event = self.broadcasts.next() => {
                    self.on_poll(JobKind::Broadcast, event).await;
                }
                event = self.watches.next() => {
                    self.on_poll(JobKind::Watcher, event).await;
                }
                _ = sync.tick() => {
                    self.refresh(JobKind::Broadcast).await;
                    self.refresh(JobKind::Watcher).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("session stopping");
                        break;
                    }
                }
            }
            if self.settled(until) {
                break;
            }
        }
        self.broadcasts.stop();
        self.watches.stop();
    }

    fn settled(&self, until: Until) -> bool {
        match until {
            Until::Shutdown => false,
            Until::Settled(kind) => !self.poller(kind).is_polling(),
        }
    }

    async fn on_poll(&mut self, kind: JobKind, event: PollEvent) {
        match event {
            PollEvent::Updated(job) => self.view.job(&job),
            PollEvent::Finished(job) => {
                self.view.job(&job);
                let note = match &job.error {
                    Some(err) => format!("{kind} {} {}: {err}", job.id, job.status),
                    None => format!("{kind} {} {}", job.id, job.status),
                };
                self.view.notify(Notice::Info(note));
                self.refresh(kind).await;
            }
            PollEvent::Skipped | PollEvent::Stale => {}
        }
    }
}

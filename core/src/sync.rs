use tracing::{debug, warn};

use crate::api::Backend;
use crate::job::{Job, JobKind, JobStatus, PostId};

/// Last known aggregate list of jobs of one kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
    items: Vec<Job>,
    error: Option<String>,
    loaded: bool,
}

impl Listing {
    /// Jobs from the last good refresh.
    pub fn items(&self) -> &[Job] { &self.items }

    /// Detail of the last refresh if it failed.
    pub fn error(&self) -> Option<&str> { self.error.as_deref() }

    /// `true` once any refresh succeeded.
    pub fn is_loaded(&self) -> bool { self.loaded }

    /// `true` if a running watcher targets `post`.
    pub fn is_watching(&self, post: PostId) -> bool {
        self.items
            .iter()
            .any(|j| j.status == JobStatus::Running && j.targets.contains(&post))
    }
}

/// Keeps the aggregate job list of one kind in step with the backend.
///
/// Best effort: a failed refresh keeps the previous items and records the
/// error for display.
pub struct TaskListSynchronizer<B> {
    kind: JobKind,
    backend: B,
    listing: Listing,
}

impl<B: Backend> TaskListSynchronizer<B> {
    /// Synchronizer for jobs of `kind`.
    pub fn new(kind: JobKind, backend: B) -> Self {
        Self { kind, backend, listing: Listing::default() }
    }

    /// Kind of jobs listed.
    pub fn kind(&self) -> JobKind { self.kind }

    /// Current listing without fetching.
    pub fn listing(&self) -> &Listing { &self.listing }

    /// Fetch the full list and replace the listing wholesale.
    pub async fn refresh(&mut self) -> &Listing {
        match self.backend.list_jobs(self.kind).await {
            Ok(items) => {
                debug!(kind = %self.kind, count = items.len(), "job list refreshed");
                self.listing = Listing { items, error: None, loaded: true };
            }
            Err(e) => {
                warn!(kind = %self.kind, err = %e, "job list refresh failed");
                self.listing.error = Some(e.detail());
            }
        }
        &self.listing
    }
}

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identifier of a post in the community feed.
pub type PostId = i64;

/// Opaque server-assigned job identifier.
///
/// The backend hands out hex strings, but numeric ids are accepted too.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(String);

impl JobId {
    /// Borrow the raw id.
    pub fn as_str(&self) -> &str { &self.0 }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self { Self(s.to_string()) }
}

impl From<String> for JobId {
    fn from(s: String) -> Self { Self(s) }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.pad(&self.0) }
}

impl Serialize for JobId {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> { s.serialize_str(&self.0) }
}

impl<'de> Deserialize<'de> for JobId {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw { Text(String), Int(i64) }
        Ok(match Raw::deserialize(d)? {
            Raw::Text(s) => JobId(s),
            Raw::Int(n) => JobId(n.to_string()),
        })
    }
}

/// The two kinds of server-side jobs the client tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Message broadcast to people engaged with a set of posts.
    Broadcast,
    /// Auto-reply to new comments on one post.
    Watcher,
}

impl JobKind {
    /// Stable lowercase name, used in logs and store keys.
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Broadcast => "broadcast",
            JobKind::Watcher => "watcher",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.pad(self.as_str()) }
}

/// Lifecycle status reported by the backend.
///
/// Broadcasts move through `pending`/`collecting`/`sending` to `completed` or
/// `failed`; watchers are `running` until `stopped` or `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, not started.
    Pending,
    /// Reading comments of the target posts.
    Collecting,
    /// Delivering messages.
    Sending,
    /// Watcher is active.
    Running,
    /// Broadcast finished.
    Completed,
    /// Job gave up.
    Failed,
    /// Watcher was stopped.
    Stopped,
    /// Anything this client does not know; never terminal.
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    /// Terminal statuses never transition further.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Stopped)
    }

    /// Lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Collecting => "collecting",
            JobStatus::Sending => "sending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Stopped => "stopped",
            JobStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.pad(self.as_str()) }
}

/// Kind-specific counters of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counters {
    /// Broadcast delivery counters; `sent + failed <= total`.
    Broadcast {
        /// Messages delivered.
        sent: u64,
        /// Messages that could not be delivered.
        failed: u64,
        /// Recipients found.
        total: u64,
    },
    /// Watcher counters, unbounded client-side.
    Watcher {
        /// Comments answered.
        replied: u64,
        /// Failed replies and read errors.
        errors: u64,
    },
}

/// Client-side snapshot of a server job, replaced wholesale on each good fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    /// Server-assigned id.
    pub id: JobId,
    /// Last reported status.
    pub status: JobStatus,
    /// Posts the job operates on, in server order.
    pub targets: Vec<PostId>,
    /// Progress counters.
    pub counters: Counters,
    /// Append-only log, as sent by the server.
    pub log: Vec<String>,
    /// Message text the job sends.
    pub message: Option<String>,
    /// Failure detail, if the server gave one.
    pub error: Option<String>,
    /// Creation timestamp as sent by the server.
    pub created_at: Option<String>,
}

impl Job {
    /// Which kind of job this snapshot describes.
    pub fn kind(&self) -> JobKind {
        match self.counters {
            Counters::Broadcast { .. } => JobKind::Broadcast,
            Counters::Watcher { .. } => JobKind::Watcher,
        }
    }

    /// Shortcut for `status.is_terminal()`.
    pub fn is_terminal(&self) -> bool { self.status.is_terminal() }

    /// Broadcast completion in percent; watchers have no bound and report 0.
    pub fn progress(&self) -> u8 {
        match self.counters {
            Counters::Broadcast { sent, failed, total } => progress_percent(sent, failed, total),
            Counters::Watcher { .. } => 0,
        }
    }

    /// The last `n` log lines, oldest first.
    pub fn log_tail(&self, n: usize) -> &[String] {
        let start = self.log.len().saturating_sub(n);
        &self.log[start..]
    }
}

/// `round(100 * (sent + failed) / total)` clamped to `[0, 100]`; 0 when `total == 0`.
pub fn progress_percent(sent: u64, failed: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let done = sent.saturating_add(failed) as u128;
    let total = total as u128;
    // half-up rounding in integers
    let pct = (done * 200 + total) / (total * 2);
    pct.min(100) as u8
}

/* --------------------- wire records --------------------- */

/// Broadcast snapshot as served by `/api/tasks`.
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastRecord {
    id: JobId,
    #[serde(default = "pending")]
    status: JobStatus,
    #[serde(default)]
    post_ids: Vec<PostId>,
    #[serde(default)]
    sent: u64,
    #[serde(default)]
    failed: u64,
    #[serde(default)]
    total: u64,
    #[serde(default)]
    log: Vec<String>,
    #[serde(default)]
    promo_message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

fn pending() -> JobStatus { JobStatus::Pending }
fn running() -> JobStatus { JobStatus::Running }

/// Watcher snapshot as served by `/api/watch`.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchRecord {
    id: JobId,
    post_id: PostId,
    #[serde(default = "running")]
    status: JobStatus,
    #[serde(default)]
    replied: u64,
    #[serde(default)]
    errors: u64,
    #[serde(default)]
    log: Vec<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

impl From<BroadcastRecord> for Job {
    fn from(r: BroadcastRecord) -> Self {
        Job {
            id: r.id,
            status: r.status,
            targets: r.post_ids,
            counters: Counters::Broadcast { sent: r.sent, failed: r.failed, total: r.total },
            log: r.log,
            message: r.promo_message,
            error: r.error,
            created_at: r.created_at,
        }
    }
}

impl From<WatchRecord> for Job {
    fn from(r: WatchRecord) -> Self {
        Job {
            id: r.id,
            status: r.status,
            targets: vec![r.post_id],
            counters: Counters::Watcher { replied: r.replied, errors: r.errors },
            log: r.log,
            message: r.message,
            error: None,
            created_at: r.created_at,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn broadcast(id: &str, status: JobStatus, sent: u64, failed: u64, total: u64) -> Job {
        Job {
            id: JobId::from(id),
            status,
            targets: vec![1, 2, 3],
            counters: Counters::Broadcast { sent, failed, total },
            log: Vec::new(),
            message: Some("hello".into()),
            error: None,
            created_at: None,
        }
    }

    pub fn watcher(id: &str, post_id: PostId, status: JobStatus) -> Job {
        Job {
            id: JobId::from(id),
            status,
            targets: vec![post_id],
            counters: Counters::Watcher { replied: 0, errors: 0 },
            log: Vec::new(),
            message: Some("thanks!".into()),
            error: None,
            created_at: None,
        }
    }
}

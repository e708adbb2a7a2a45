//! Wire types and the backend client.
//!
//! Every call maps a non-2xx answer to [`ApiError::Status`] carrying the
//! response body untouched.

use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::error::ApiError;
use crate::job::{BroadcastRecord, Job, JobId, JobKind, PostId, WatchRecord};
use crate::settings::ServerSettings;

/// A post from the community feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    /// Post id.
    pub id: PostId,
    /// Short text preview.
    #[serde(default)]
    pub preview: Option<String>,
    /// View count.
    #[serde(default)]
    pub views: u64,
    /// Comment count.
    #[serde(default)]
    pub comments: u64,
    /// Like count.
    #[serde(default)]
    pub likes: u64,
    /// Repost count.
    #[serde(default)]
    pub reposts: u64,
    /// Has at least one photo.
    #[serde(default)]
    pub has_photo: bool,
    /// Has at least one video.
    #[serde(default)]
    pub has_video: bool,
    /// Number of attachments of any type.
    #[serde(default)]
    pub attachments_count: u32,
    /// Publication time as sent by the server.
    #[serde(default)]
    pub date: Option<String>,
}

/// Single-post detail: the feed fields plus whatever else the server adds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PostDetails {
    /// Feed fields.
    #[serde(flatten)]
    pub post: Post,
    /// Extra fields, kept verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Metadata of the active group.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GroupInfo {
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Member count.
    #[serde(default)]
    pub members_count: u64,
}

/// One configured community.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Community {
    /// Operator label.
    #[serde(default)]
    pub name: Option<String>,
    /// Group id on the platform.
    pub group_id: i64,
    /// User access token.
    #[serde(default)]
    pub user_token: String,
    /// Group access token.
    #[serde(default)]
    pub group_token: String,
}

impl Community {
    /// Name to show, falling back to the group id.
    pub fn label(&self) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => format!("group {}", self.group_id),
        }
    }
}

/// Client-visible backend configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ClientConfig {
    /// Configured communities.
    #[serde(default)]
    pub communities: Vec<Community>,
    /// Group the backend currently operates on.
    #[serde(default)]
    pub active_group_id: Option<i64>,
    /// Delay between platform requests (s).
    #[serde(default)]
    pub request_delay: Option<f64>,
    /// Default broadcast text.
    #[serde(default)]
    pub promo_message: Option<String>,
    /// Fields this client does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Answer of a create-job call.
#[derive(Debug, Clone, Deserialize)]
pub struct Created {
    /// Id of the new job.
    #[serde(alias = "id")]
    pub task_id: JobId,
}

/// Delivery counts of one broadcast, taken from the backend's delivery history.
///
/// The history may be empty, in which case the server sends `null` counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct CampaignStats {
    /// Delivery attempts recorded.
    #[serde(default, deserialize_with = "null_as_zero")]
    pub total: u64,
    /// Attempts that went through.
    #[serde(default, deserialize_with = "null_as_zero")]
    pub sent: u64,
    /// Attempts that failed.
    #[serde(default, deserialize_with = "null_as_zero")]
    pub failed: u64,
}

fn null_as_zero<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    Ok(Option::<u64>::deserialize(d)?.unwrap_or(0))
}

#[derive(Deserialize)]
struct Items<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Serialize)]
struct SendBody<'a> {
    post_ids: &'a [PostId],
    message: &'a str,
}

#[derive(Serialize)]
struct WatchBody<'a> {
    post_id: PostId,
    message: &'a str,
}

#[derive(Serialize)]
struct ActiveBody {
    group_id: i64,
}

/// Everything the client asks of the job backend.
pub trait Backend: Clone + Send + Sync + 'static {
    /// `GET /api/posts?limit=N`
    fn list_posts(&self, limit: u32) -> impl Future<Output = Result<Vec<Post>, ApiError>> + Send;
    /// `GET /api/posts/{id}`
    fn post_details(&self, id: PostId) -> impl Future<Output = Result<PostDetails, ApiError>> + Send;
    /// `GET /api/group/info`
    fn group_info(&self) -> impl Future<Output = Result<GroupInfo, ApiError>> + Send;
    /// `GET /api/config`
    fn client_config(&self) -> impl Future<Output = Result<ClientConfig, ApiError>> + Send;
    /// `POST /api/config/active`
    fn set_active_group(&self, group_id: i64) -> impl Future<Output = Result<ClientConfig, ApiError>> + Send;
    /// `POST /api/config`
    fn save_settings(&self, settings: &ServerSettings) -> impl Future<Output = Result<(), ApiError>> + Send;
    /// `POST /api/send`
    fn start_broadcast(&self, post_ids: &[PostId], message: &str) -> impl Future<Output = Result<JobId, ApiError>> + Send;
    /// `POST /api/watch`
    fn start_watch(&self, post_id: PostId, message: &str) -> impl Future<Output = Result<JobId, ApiError>> + Send;
    /// Snapshot of one job; `Ok(None)` when the server does not know it.
    fn fetch_job(&self, kind: JobKind, id: &JobId) -> impl Future<Output = Result<Option<Job>, ApiError>> + Send;
    /// All jobs of `kind` the server reports.
    fn list_jobs(&self, kind: JobKind) -> impl Future<Output = Result<Vec<Job>, ApiError>> + Send;
    /// `GET /api/stats/campaign/{id}`
    fn campaign_stats(&self, id: &JobId) -> impl Future<Output = Result<CampaignStats, ApiError>> + Send;
}

/// [`Backend`] over HTTP/JSON.
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base: String,
}

impl HttpBackend {
    /// Client for the backend at `base_url`, with a per-request `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base: base_url.trim_end_matches('/').to_string() })
    }

    fn url(&self, path: &str) -> String { format!("{}{}", self.base, path) }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        debug!(path, "GET");
        let resp = self.client.get(self.url(path)).send().await?;
        decode(resp).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        debug!(path, "POST");
        let resp = self.client.post(self.url(path)).json(body).send().await?;
        decode(resp).await
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(ApiError::Status { status: status.as_u16(), body });
    }
    serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
}

impl Backend for HttpBackend {
    async fn list_posts(&self, limit: u32) -> Result<Vec<Post>, ApiError> {
        let page: Items<Post> = self.get_json(&format!("/api/posts?limit={limit}")).await?;
        Ok(page.items)
    }

    async fn post_details(&self, id: PostId) -> Result<PostDetails, ApiError> {
        self.get_json(&format!("/api/posts/{id}")).await
    }

    async fn group_info(&self) -> Result<GroupInfo, ApiError> {
        self.get_json("/api/group/info").await
    }

    async fn client_config(&self) -> Result<ClientConfig, ApiError> {
        self.get_json("/api/config").await
    }

    async fn set_active_group(&self, group_id: i64) -> Result<ClientConfig, ApiError> {
        self.post_json("/api/config/active", &ActiveBody { group_id }).await
    }

    async fn save_settings(&self, settings: &ServerSettings) -> Result<(), ApiError> {
        let _: serde_json::Value = self.post_json("/api/config", settings).await?;
        Ok(())
    }

    async fn start_broadcast(&self, post_ids: &[PostId], message: &str) -> Result<JobId, ApiError> {
        let created: Created = self.post_json("/api/send", &SendBody { post_ids, message }).await?;
        Ok(created.task_id)
    }

    async fn start_watch(&self, post_id: PostId, message: &str) -> Result<JobId, ApiError> {
        let created: Created = self.post_json("/api/watch", &WatchBody { post_id, message }).await?;
        Ok(created.task_id)
    }

    async fn fetch_job(&self, kind: JobKind, id: &JobId) -> Result<Option<Job>, ApiError> {
        match kind {
            JobKind::Broadcast => {
                match self.get_json::<BroadcastRecord>(&format!("/api/tasks/{id}")).await {
                    Ok(rec) => Ok(Some(rec.into())),
                    Err(e) if e.is_not_found() => Ok(None),
                    Err(e) => Err(e),
                }
            }
            // no per-id watcher endpoint; pick it out of the list
            JobKind::Watcher => {
                let all = self.list_jobs(JobKind::Watcher).await?;
                Ok(all.into_iter().find(|w| &w.id == id))
            }
        }
    }

    async fn list_jobs(&self, kind: JobKind) -> Result<Vec<Job>, ApiError> {
        match kind {
            JobKind::Broadcast => {
                let page: Items<BroadcastRecord> = self.get_json("/api/tasks").await?;
                Ok(page.items.into_iter().map(Job::from).collect())
            }
            JobKind::Watcher => {
                let page: Items<WatchRecord> = self.get_json("/api/watch").await?;
                Ok(page.items.into_iter().map(Job::from).collect())
            }
        }
    }

    async fn campaign_stats(&self, id: &JobId) -> Result<CampaignStats, ApiError> {
        self.get_json(&format!("/api/stats/campaign/{id}")).await
    }
}

//! Scripted in-memory [`Backend`] for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::api::{Backend, CampaignStats, ClientConfig, GroupInfo, Post, PostDetails};
use crate::error::ApiError;
use crate::job::{Job, JobId, JobKind, PostId};
use crate::selection::Selection;
use crate::settings::ServerSettings;
use crate::sync::Listing;
use crate::view::{Notice, View};

/// A request the fake saw, recorded when the call starts.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ListPosts(u32),
    PostDetails(PostId),
    GroupInfo,
    ClientConfig,
    SetActiveGroup(i64),
    SaveSettings,
    StartBroadcast(Vec<PostId>, String),
    StartWatch(PostId, String),
    FetchJob(JobKind, String),
    ListJobs(JobKind),
    CampaignStats(String),
}

#[derive(Debug, Clone)]
enum Outcome {
    Found(Job),
    NotFound,
    Fail(u16, String),
}

/// One scripted answer to `fetch_job`.
#[derive(Debug, Clone)]
pub struct Reply {
    delay: Option<Duration>,
    outcome: Outcome,
}

impl Reply {
    pub fn job(job: Job) -> Self { Self { delay: None, outcome: Outcome::Found(job) } }
    pub fn not_found() -> Self { Self { delay: None, outcome: Outcome::NotFound } }
    pub fn error(status: u16, body: &str) -> Self { Self { delay: None, outcome: Outcome::Fail(status, body.into()) } }
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

type Canned<T> = Result<T, (u16, String)>;

fn fail<T>(c: Canned<T>) -> Result<T, ApiError> {
    c.map_err(|(status, body)| ApiError::Status { status, body })
}

#[derive(Default)]
struct Inner {
    calls: Vec<Call>,
    jobs: HashMap<String, VecDeque<Reply>>,
    last_job: HashMap<String, Reply>,
    lists: HashMap<JobKind, VecDeque<Canned<Vec<Job>>>>,
    last_list: HashMap<JobKind, Canned<Vec<Job>>>,
    posts: Option<Canned<Vec<Post>>>,
    group: Option<Canned<GroupInfo>>,
    config: Option<Canned<ClientConfig>>,
    stats: Option<Canned<CampaignStats>>,
    next_id: Option<String>,
    reject: Option<(u16, String)>,
}

/// Cloneable handle; clones share the script and the call log.
#[derive(Clone, Default)]
pub struct FakeBackend {
    inner: Arc<Mutex<Inner>>,
}

impl FakeBackend {
    fn with<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut g = self.inner.lock().unwrap();
        f(&mut g)
    }

    pub fn calls(&self) -> Vec<Call> { self.with(|i| i.calls.clone()) }

    pub fn clear_calls(&self) { self.with(|i| i.calls.clear()) }

    pub fn fetch_count(&self, id: &str) -> usize {
        self.with(|i| {
            i.calls.iter().filter(|c| matches!(c, Call::FetchJob(_, j) if j == id)).count()
        })
    }

    pub fn list_count(&self, kind: JobKind) -> usize {
        self.with(|i| i.calls.iter().filter(|c| **c == Call::ListJobs(kind)).count())
    }

    /// Queue answers for `fetch_job(id)`; the last one repeats once the queue drains.
    pub fn script_job<I: IntoIterator<Item = Reply>>(&self, id: &str, replies: I) {
        self.with(|i| i.jobs.entry(id.to_string()).or_default().extend(replies));
    }

    pub fn script_list(&self, kind: JobKind, reply: Result<Vec<Job>, (u16, &str)>) {
        let reply = reply.map_err(|(s, b)| (s, b.to_string()));
        self.with(|i| i.lists.entry(kind).or_default().push_back(reply));
    }

    pub fn set_posts(&self, reply: Result<Vec<Post>, (u16, &str)>) {
        self.with(|i| i.posts = Some(reply.map_err(|(s, b)| (s, b.to_string()))));
    }

    pub fn set_group_info(&self, reply: Result<GroupInfo, (u16, &str)>) {
        self.with(|i| i.group = Some(reply.map_err(|(s, b)| (s, b.to_string()))));
    }

    pub fn set_config(&self, reply: Result<ClientConfig, (u16, &str)>) {
        self.with(|i| i.config = Some(reply.map_err(|(s, b)| (s, b.to_string()))));
    }

    pub fn set_stats(&self, reply: Result<CampaignStats, (u16, &str)>) {
        self.with(|i| i.stats = Some(reply.map_err(|(s, b)| (s, b.to_string()))));
    }

    pub fn next_job_id(&self, id: &str) { self.with(|i| i.next_id = Some(id.to_string())) }

    pub fn reject_submits(&self, status: u16, body: &str) {
        self.with(|i| i.reject = Some((status, body.to_string())))
    }

    fn submit(&self, call: Call) -> Result<JobId, ApiError> {
        self.with(|i| {
            i.calls.push(call);
            if let Some((status, body)) = i.reject.clone() {
                return Err(ApiError::Status { status, body });
            }
            Ok(JobId::from(i.next_id.clone().unwrap_or_else(|| "1".to_string())))
        })
    }
}

impl Backend for FakeBackend {
    async fn list_posts(&self, limit: u32) -> Result<Vec<Post>, ApiError> {
        fail(self.with(|i| {
            i.calls.push(Call::ListPosts(limit));
            i.posts.clone().unwrap_or(Ok(Vec::new()))
        }))
    }

    async fn post_details(&self, id: PostId) -> Result<PostDetails, ApiError> {
        let posts = self.with(|i| {
            i.calls.push(Call::PostDetails(id));
            i.posts.clone().unwrap_or(Ok(Vec::new()))
        });
        let post = fail(posts)?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| ApiError::Status { status: 404, body: "post not found".into() })?;
        Ok(PostDetails { post, extra: Default::default() })
    }

    async fn group_info(&self) -> Result<GroupInfo, ApiError> {
        fail(self.with(|i| {
            i.calls.push(Call::GroupInfo);
            i.group.clone().unwrap_or(Ok(GroupInfo::default()))
        }))
    }

    async fn client_config(&self) -> Result<ClientConfig, ApiError> {
        fail(self.with(|i| {
            i.calls.push(Call::ClientConfig);
            i.config.clone().unwrap_or(Ok(ClientConfig::default()))
        }))
    }

    async fn set_active_group(&self, group_id: i64) -> Result<ClientConfig, ApiError> {
        fail(self.with(|i| {
            i.calls.push(Call::SetActiveGroup(group_id));
            i.config.clone().unwrap_or(Ok(ClientConfig::default())).map(|mut cfg| {
                cfg.active_group_id = Some(group_id);
                cfg
            })
        }))
    }

    async fn save_settings(&self, _settings: &ServerSettings) -> Result<(), ApiError> {
        self.with(|i| i.calls.push(Call::SaveSettings));
        Ok(())
    }

    async fn start_broadcast(&self, post_ids: &[PostId], message: &str) -> Result<JobId, ApiError> {
        self.submit(Call::StartBroadcast(post_ids.to_vec(), message.to_string()))
    }

    async fn start_watch(&self, post_id: PostId, message: &str) -> Result<JobId, ApiError> {
        self.submit(Call::StartWatch(post_id, message.to_string()))
    }

    async fn fetch_job(&self, kind: JobKind, id: &JobId) -> Result<Option<Job>, ApiError> {
        let reply = self.with(|i| {
            i.calls.push(Call::FetchJob(kind, id.to_string()));
            let next = i.jobs.get_mut(id.as_str()).and_then(|q| q.pop_front());
            match next {
                Some(r) => {
                    i.last_job.insert(id.to_string(), r.clone());
                    r
                }
                None => i.last_job.get(id.as_str()).cloned().unwrap_or_else(Reply::not_found),
            }
        });
        if let Some(d) = reply.delay {
            tokio::time::sleep(d).await;
        }
        match reply.outcome {
            Outcome::Found(job) => Ok(Some(job)),
            Outcome::NotFound => Ok(None),
            Outcome::Fail(status, body) => Err(ApiError::Status { status, body }),
        }
    }

    async fn list_jobs(&self, kind: JobKind) -> Result<Vec<Job>, ApiError> {
        fail(self.with(|i| {
            i.calls.push(Call::ListJobs(kind));
            let next = i.lists.get_mut(&kind).and_then(|q| q.pop_front());
            match next {
                Some(r) => {
                    i.last_list.insert(kind, r.clone());
                    r
                }
                None => i.last_list.get(&kind).cloned().unwrap_or(Ok(Vec::new())),
            }
        }))
    }

    async fn campaign_stats(&self, id: &JobId) -> Result<CampaignStats, ApiError> {
        fail(self.with(|i| {
            i.calls.push(Call::CampaignStats(id.to_string()));
            i.stats.clone().unwrap_or(Ok(CampaignStats::default()))
        }))
    }
}

/// What a [`RecordingView`] was asked to show.
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    Job(Job),
    List(JobKind, Vec<JobId>, Option<String>),
    Posts(Vec<PostId>),
    PostsUnavailable(String),
    Details(PostId),
    Selection(Vec<PostId>),
    Communities(Option<i64>),
    Group(GroupInfo),
    Stats(JobId, CampaignStats),
    Notice(Notice),
}

/// [`View`] that records every callback.
#[derive(Default)]
pub struct RecordingView {
    pub shown: Vec<Rendered>,
}

impl RecordingView {
    pub fn jobs(&self) -> Vec<&Job> {
        self.shown.iter().filter_map(|r| match r { Rendered::Job(j) => Some(j), _ => None }).collect()
    }

    pub fn notices(&self) -> Vec<&Notice> {
        self.shown.iter().filter_map(|r| match r { Rendered::Notice(n) => Some(n), _ => None }).collect()
    }
}

impl View for RecordingView {
    fn job(&mut self, job: &Job) { self.shown.push(Rendered::Job(job.clone())) }

    fn job_list(&mut self, kind: JobKind, listing: &Listing) {
        let ids = listing.items().iter().map(|j| j.id.clone()).collect();
        self.shown.push(Rendered::List(kind, ids, listing.error().map(str::to_string)))
    }

    fn posts(&mut self, posts: &[Post], _selection: &Selection, _watchers: &Listing) {
        self.shown.push(Rendered::Posts(posts.iter().map(|p| p.id).collect()))
    }

    fn posts_unavailable(&mut self, detail: &str) { self.shown.push(Rendered::PostsUnavailable(detail.into())) }

    fn post_details(&mut self, details: &PostDetails) { self.shown.push(Rendered::Details(details.post.id)) }

    fn selection(&mut self, selection: &Selection) { self.shown.push(Rendered::Selection(selection.members().to_vec())) }

    fn communities(&mut self, config: &ClientConfig) { self.shown.push(Rendered::Communities(config.active_group_id)) }

    fn group_info(&mut self, info: &GroupInfo) { self.shown.push(Rendered::Group(info.clone())) }

    fn campaign_stats(&mut self, id: &JobId, stats: &CampaignStats) {
        self.shown.push(Rendered::Stats(id.clone(), *stats))
    }

    fn notify(&mut self, notice: Notice) { self.shown.push(Rendered::Notice(notice)) }
}

/// Plain feed post with the given id.
pub fn post(id: PostId) -> Post {
    Post {
        id,
        preview: Some(format!("post {id}")),
        views: 0,
        comments: 0,
        likes: 0,
        reposts: 0,
        has_photo: false,
        has_video: false,
        attachments_count: 0,
        date: None,
    }
}

//! Reconciliation callbacks and a plain-text renderer.
//!
//! Rendering is a pure function of its inputs: the same snapshot always
//! produces the same text.

use std::fmt::Write as _;
use std::io::Write;

use crate::api::{CampaignStats, ClientConfig, GroupInfo, Post, PostDetails};
use crate::job::{progress_percent, Counters, Job, JobId, JobKind};
use crate::selection::Selection;
use crate::sync::Listing;

/// Operator-facing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Something worked.
    Info(String),
    /// Something failed; the previous state is still shown.
    Error(String),
}

/// Sink for everything the session wants shown.
pub trait View {
    /// Snapshot of the tracked job changed.
    fn job(&mut self, job: &Job);
    /// Aggregate list of `kind` was refreshed.
    fn job_list(&mut self, kind: JobKind, listing: &Listing);
    /// Post feed, with selection marks and watcher highlight.
    fn posts(&mut self, posts: &[Post], selection: &Selection, watchers: &Listing);
    /// Post feed could not be loaded.
    fn posts_unavailable(&mut self, detail: &str);
    /// Detail view of one post.
    fn post_details(&mut self, details: &PostDetails);
    /// Selection changed.
    fn selection(&mut self, selection: &Selection);
    /// Community list or active community changed.
    fn communities(&mut self, config: &ClientConfig);
    /// Group metadata arrived.
    fn group_info(&mut self, info: &GroupInfo);
    /// Delivery counts of a broadcast arrived.
    fn campaign_stats(&mut self, id: &JobId, stats: &CampaignStats);
    /// Toast.
    fn notify(&mut self, notice: Notice);
}

/// Render a tracked job with its last `tail` log lines.
pub fn render_job(job: &Job, tail: usize) -> String {
    let mut s = String::new();
    match job.counters {
        Counters::Broadcast { sent, failed, total } => {
            let _ = writeln!(
                s,
                "[broadcast {}] {:<10} {:>3}%  {} / {}  (sent {}, failed {}, total {})",
                job.id, job.status, job.progress(), sent + failed, total, sent, failed, total
            );
        }
        Counters::Watcher { replied, errors } => {
            let _ = writeln!(
                s,
                "[watcher {}] {:<10} post {}  replied {}  errors {}",
                job.id, job.status, join_ids(&job.targets), replied, errors
            );
        }
    }
    if let Some(err) = &job.error {
        let _ = writeln!(s, "  error: {err}");
    }
    let lines = job.log_tail(tail);
    if lines.is_empty() {
        s.push_str("  log is empty\n");
    }
    for line in lines {
        let _ = writeln!(s, "  | {line}");
    }
    s
}

/// Render an aggregate job list.
pub fn render_listing(kind: JobKind, listing: &Listing) -> String {
    let mut s = match kind {
        JobKind::Broadcast => "broadcasts:\n".to_string(),
        JobKind::Watcher => format!("auto-replies ({}):\n", listing.items().len()),
    };
    if let Some(err) = listing.error() {
        let _ = writeln!(s, "  could not load: {err}");
    }
    if listing.items().is_empty() && listing.error().is_none() {
        s.push_str(match kind {
            JobKind::Broadcast => "  no jobs yet\n",
            JobKind::Watcher => "  no active auto-replies\n",
        });
    }
    for job in listing.items() {
        match job.counters {
            Counters::Broadcast { sent, total, .. } => {
                let posts = if job.targets.is_empty() { "-".to_string() } else { join_ids(&job.targets) };
                let _ = writeln!(s, "  #{:<10} posts: {:<16} {:<10} {}/{}", job.id, posts, job.status, sent, total);
            }
            Counters::Watcher { replied, errors } => {
                let _ = writeln!(
                    s,
                    "  post {:<10} {:<10} replied {}  errors {}",
                    join_ids(&job.targets), job.status, replied, errors
                );
            }
        }
    }
    s
}

/// Render one feed line.
pub fn render_post(post: &Post, selected: bool, watched: bool) -> String {
    let mut s = format!("[{}] #{}", if selected { 'x' } else { ' ' }, post.id);
    if post.has_photo {
        s.push_str(" photo");
    }
    if post.has_video {
        s.push_str(" video");
    }
    if post.attachments_count > 0 && !post.has_photo && !post.has_video {
        let _ = write!(s, " {} attachment(s)", post.attachments_count);
    }
    let preview = post.preview.as_deref().map(str::trim).filter(|p| !p.is_empty()).unwrap_or("(no text)");
    let _ = write!(
        s,
        "  {}  views {} comments {} likes {} reposts {}",
        preview, post.views, post.comments, post.likes, post.reposts
    );
    if let Some(date) = post.date.as_deref() {
        let _ = write!(s, "  {}", date.get(..10).unwrap_or(date));
    }
    if watched {
        s.push_str("  [auto-reply]");
    }
    s
}

/// Render delivery counts of one broadcast.
pub fn render_stats(id: &JobId, stats: &CampaignStats) -> String {
    format!(
        "campaign {id}: {}%  sent {}  failed {}  total {}\n",
        progress_percent(stats.sent, stats.failed, stats.total), stats.sent, stats.failed, stats.total
    )
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter().map(i64::to_string).collect::<Vec<_>>().join(", ")
}

/// [`View`] writing plain text to any [`Write`].
pub struct TextView<W: Write> {
    out: W,
    log_tail: usize,
}

impl<W: Write> TextView<W> {
    /// Renderer writing to `out`, showing `log_tail` log lines per job.
    pub fn new(out: W, log_tail: usize) -> Self { Self { out, log_tail } }

    /// Give the writer back.
    pub fn into_inner(self) -> W { self.out }

    fn put(&mut self, text: &str) {
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
    }
}

impl<W: Write> View for TextView<W> {
    fn job(&mut self, job: &Job) {
        let text = render_job(job, self.log_tail);
        self.put(&text);
    }

    fn job_list(&mut self, kind: JobKind, listing: &Listing) {
        self.put(&render_listing(kind, listing));
    }

    fn posts(&mut self, posts: &[Post], selection: &Selection, watchers: &Listing) {
        if posts.is_empty() {
            self.put("no posts in the feed, or the token is wrong\n");
            return;
        }
        let mut s = String::new();
        for p in posts {
            s.push_str(&render_post(p, selection.contains(p.id), watchers.is_watching(p.id)));
            s.push('\n');
        }
        self.put(&s);
    }

    fn posts_unavailable(&mut self, detail: &str) {
        self.put(&format!("could not load posts: {detail}\n"));
    }

    fn post_details(&mut self, details: &PostDetails) {
        let mut s = render_post(&details.post, false, false);
        s.push('\n');
        for (k, v) in &details.extra {
            let _ = writeln!(s, "  {k}: {v}");
        }
        self.put(&s);
    }

    fn selection(&mut self, selection: &Selection) {
        let text = if selection.is_empty() {
            "no posts selected\n".to_string()
        } else {
            format!("selected posts: {}\n", join_ids(selection.members()))
        };
        self.put(&text);
    }

    fn communities(&mut self, config: &ClientConfig) {
        if config.communities.is_empty() {
            self.put("no communities\n");
            return;
        }
        let mut s = String::new();
        for c in &config.communities {
            let mark = if config.active_group_id == Some(c.group_id) { '*' } else { ' ' };
            let _ = writeln!(s, "{mark} {} ({})", c.label(), c.group_id);
        }
        self.put(&s);
    }

    fn group_info(&mut self, info: &GroupInfo) {
        let name = info.name.as_deref().unwrap_or("not loaded");
        let members = if info.members_count > 0 { info.members_count.to_string() } else { "-".to_string() };
        self.put(&format!("group: {name}  members: {members}\n"));
    }

    fn campaign_stats(&mut self, id: &JobId, stats: &CampaignStats) {
        self.put(&render_stats(id, stats));
    }

    fn notify(&mut self, notice: Notice) {
        match notice {
            Notice::Info(m) => self.put(&format!("-- {m}\n")),
            Notice::Error(m) => self.put(&format!("!! {m}\n")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Community;
    use crate::job::fixtures::{broadcast, watcher};
    use crate::job::JobStatus;

    fn post(id: i64) -> Post {
        Post {
            id,
            preview: Some("Spring sale".into()),
            views: 10,
            comments: 2,
            likes: 3,
            reposts: 0,
            has_photo: true,
            has_video: false,
            attachments_count: 1,
            date: Some("2024-05-01T10:00:00".into()),
        }
    }

    #[test]
    fn job_text_shows_progress_and_tail() {
        let mut job = broadcast("42", JobStatus::Sending, 3, 1, 10);
        job.log = (1..=35).map(|i| format!("step {i}")).collect();
        let text = render_job(&job, 30);
        assert!(text.starts_with("[broadcast 42] sending"));
        assert!(text.contains(" 40%  4 / 10"));
        assert!(!text.contains("step 5\n"));
        assert!(text.contains("| step 6\n"));
        assert!(text.ends_with("| step 35\n"));
        assert_eq!(text, render_job(&job.clone(), 30));
    }

    #[test]
    fn empty_log_placeholder() {
        let text = render_job(&broadcast("1", JobStatus::Pending, 0, 0, 0), 30);
        assert!(text.contains("  0%  0 / 0"));
        assert!(text.ends_with("log is empty\n"));
        assert!(render_job(&watcher("w", 4, JobStatus::Running), 30).starts_with("[watcher w] running"));
    }

    #[test]
    fn listing_placeholders() {
        let empty = Listing::default();
        assert_eq!(render_listing(JobKind::Broadcast, &empty), "broadcasts:\n  no jobs yet\n");
        assert_eq!(render_listing(JobKind::Watcher, &empty), "auto-replies (0):\n  no active auto-replies\n");
    }

    #[test]
    fn post_line_marks_selection_and_watch() {
        let line = render_post(&post(12), true, true);
        assert_eq!(
            line,
            "[x] #12 photo  Spring sale  views 10 comments 2 likes 3 reposts 0  2024-05-01  [auto-reply]"
        );
        let mut bare = post(13);
        bare.has_photo = false;
        bare.preview = None;
        bare.date = None;
        assert_eq!(render_post(&bare, false, false), "[ ] #13 1 attachment(s)  (no text)  views 10 comments 2 likes 3 reposts 0");
    }

    #[test]
    fn stats_line() {
        let stats = CampaignStats { total: 8, sent: 5, failed: 1 };
        assert_eq!(render_stats(&JobId::from("ab"), &stats), "campaign ab: 75%  sent 5  failed 1  total 8\n");
        assert_eq!(
            render_stats(&JobId::from("ab"), &CampaignStats::default()),
            "campaign ab: 0%  sent 0  failed 0  total 0\n"
        );
    }

    #[test]
    fn text_view_writes_communities_and_notices() {
        let mut view = TextView::new(Vec::new(), 30);
        let config = ClientConfig {
            communities: vec![
                Community { name: Some("Shop".into()), group_id: 1, user_token: String::new(), group_token: String::new() },
                Community { name: None, group_id: 2, user_token: String::new(), group_token: String::new() },
            ],
            active_group_id: Some(2),
            ..Default::default()
        };
        view.communities(&config);
        view.selection(&Selection::from_members([4, 5]));
        view.notify(Notice::Error("could not switch community".into()));
        let out = String::from_utf8(view.into_inner()).unwrap();
        assert_eq!(out, "  Shop (1)\n* group 2 (2)\nselected posts: 4, 5\n!! could not switch community\n");
    }
}

use std::fs;
use std::io::{self, Stdout};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dispatch_core::cfg::{self, AppId, Config};
use dispatch_core::settings::ServerSettings;
use dispatch_core::store::{self, DefaultKv};
use dispatch_core::{logx, HttpBackend, JobId, JobKind, PostId, Session, TextView, Until};
use tokio::sync::watch;
use tracing::{debug, info, warn};

const APP: AppId = AppId {
    qualifier: "com",
    organization: "local",
    application: env!("CARGO_PKG_NAME"),
};

type Console = Session<HttpBackend, TextView<Stdout>>;

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"), version, about = "Broadcast and auto-reply client")]
struct Cli {
    /// Keep config and local state here instead of the per-user dirs.
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,
    /// Backend base URL (overrides config).
    #[arg(long, global = true)]
    backend: Option<String>,
    /// Log level if RUST_LOG is unset (overrides config).
    #[arg(long, global = true)]
    log: Option<String>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the post feed of the active community.
    Posts {
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Show one post.
    Post { id: PostId },
    /// Add posts to the selection.
    Select {
        #[arg(required = true)]
        ids: Vec<PostId>,
    },
    /// Remove posts from the selection.
    Deselect {
        #[arg(required = true)]
        ids: Vec<PostId>,
    },
    /// Empty the selection.
    Clear,
    /// Show the selection.
    Selected,
    /// Broadcast a message to the selected posts.
    Send {
        #[arg(short, long)]
        message: String,
        /// Return right after the job is created.
        #[arg(long)]
        detach: bool,
    },
    /// Auto-reply on the first selected post.
    Watch {
        #[arg(short, long)]
        message: String,
        #[arg(long)]
        detach: bool,
    },
    /// Follow a job until it ends (defaults to the last one started).
    Track {
        #[arg(long)]
        watcher: bool,
        id: Option<String>,
    },
    /// Delivery counts of a broadcast (defaults to the last one started).
    Stats { id: Option<String> },
    /// List broadcast jobs.
    Tasks,
    /// List auto-reply watchers.
    Watchers,
    /// Show the active group.
    Group,
    /// Make another community active.
    Switch { group_id: i64 },
    /// Validate and upload backend settings from a TOML file.
    SaveConfig { file: PathBuf },
    /// Show everything and keep it fresh until Ctrl-C.
    Monitor,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let (mut config, kv) = open_state(cli.state_dir.as_deref())?;
    if let Some(url) = cli.backend {
        config.backend_url = url;
    }
    if let Command::Posts { limit: Some(n) } = cli.cmd {
        config.posts_limit = n;
    }
    logx::init(cli.log.as_deref().unwrap_or(&config.log_level));
    debug!(backend = %config.backend_url, "starting");

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build runtime")?;
    rt.block_on(run(cli.cmd, config, kv))
}

fn open_state(dir: Option<&Path>) -> Result<(Config, DefaultKv)> {
    match dir {
        Some(dir) => {
            let config = cfg::load_or_init_in(dir)?;
            let kv = store::open_default(dir.join("state"))?;
            Ok((config, kv))
        }
        None => {
            let config = cfg::load_or_init(&APP)?;
            let kv = store::open_default(cfg::data_dir(&APP)?)?;
            Ok((config, kv))
        }
    }
}

fn new_session(config: &Config) -> Result<Console> {
    let backend = HttpBackend::new(&config.backend_url, config.request_timeout())?;
    Ok(Session::new(backend, TextView::new(io::stdout(), config.log_tail), config))
}

/// Session with the backend configuration loaded and the stored selection restored.
async fn connect(config: &Config, kv: &DefaultKv) -> Result<Console> {
    let mut session = new_session(config)?;
    session.load_config().await.context("backend settings unavailable")?;
    let selection = store::load_selection(kv, session.config().active_group_id)?;
    Ok(session.with_selection(selection))
}

fn persist_selection(session: &Console, kv: &DefaultKv) -> Result<()> {
    store::save_selection(kv, session.config().active_group_id, session.selection())
}

async fn run(cmd: Command, config: Config, kv: DefaultKv) -> Result<()> {
    match cmd {
        Command::Posts { .. } => {
            let mut session = connect(&config, &kv).await?;
            session.refresh(JobKind::Watcher).await;
            if !session.load_posts().await {
                bail!("posts unavailable");
            }
        }
        Command::Post { id } => {
            let mut session = new_session(&config)?;
            session.post_details(id).await?;
        }
        Command::Select { ids } => {
            let mut session = connect(&config, &kv).await?;
            for id in ids {
                session.select(id);
            }
            persist_selection(&session, &kv)?;
        }
        Command::Deselect { ids } => {
            let mut session = connect(&config, &kv).await?;
            for id in ids {
                session.deselect(id);
            }
            persist_selection(&session, &kv)?;
        }
        Command::Clear => {
            let mut session = connect(&config, &kv).await?;
            session.clear_selection();
            persist_selection(&session, &kv)?;
        }
        Command::Selected => {
            let mut session = connect(&config, &kv).await?;
            session.show_selection();
        }
        Command::Send { message, detach } => {
            let mut session = connect(&config, &kv).await?;
            let id = session.start_broadcast(&message).await?;
            store::set_last_tracked(&kv, JobKind::Broadcast, &id)?;
            if !detach {
                follow(&mut session, Until::Settled(JobKind::Broadcast)).await;
            }
        }
        Command::Watch { message, detach } => {
            let mut session = connect(&config, &kv).await?;
            let id = session.start_watch(&message).await?;
            store::set_last_tracked(&kv, JobKind::Watcher, &id)?;
            if !detach {
                follow(&mut session, Until::Settled(JobKind::Watcher)).await;
            }
        }
        Command::Track { watcher, id } => {
            let kind = if watcher { JobKind::Watcher } else { JobKind::Broadcast };
            let id = match id {
                Some(id) => JobId::from(id),
                None => match store::last_tracked(&kv, kind)? {
                    Some(id) => id,
                    None => bail!("no {kind} started from here yet; pass a job id"),
                },
            };
            let mut session = new_session(&config)?;
            session.track(kind, id.clone()).await;
            store::set_last_tracked(&kv, kind, &id)?;
            follow(&mut session, Until::Settled(kind)).await;
        }
        Command::Stats { id } => {
            let id = match id {
                Some(id) => JobId::from(id),
                None => match store::last_tracked(&kv, JobKind::Broadcast)? {
                    Some(id) => id,
                    None => bail!("no broadcast started from here yet; pass a job id"),
                },
            };
            let mut session = new_session(&config)?;
            session.campaign_stats(&id).await?;
        }
        Command::Tasks => list(&config, JobKind::Broadcast).await?,
        Command::Watchers => list(&config, JobKind::Watcher).await?,
        Command::Group => {
            let mut session = new_session(&config)?;
            if !session.load_group_info().await {
                bail!("group info unavailable");
            }
        }
        Command::Switch { group_id } => {
            let mut session = connect(&config, &kv).await?;
            session.switch_context(group_id).await?;
            persist_selection(&session, &kv)?;
        }
        Command::SaveConfig { file } => {
            let txt = fs::read_to_string(&file).with_context(|| format!("read {}", file.display()))?;
            let settings: ServerSettings =
                toml::from_str(&txt).with_context(|| format!("parse {}", file.display()))?;
            let mut session = new_session(&config)?;
            session.save_settings(settings).await?;
        }
        Command::Monitor => {
            let mut session = connect(&config, &kv).await?;
            session.init().await;
            session.load_posts().await;
            for kind in [JobKind::Broadcast, JobKind::Watcher] {
                if let Some(id) = store::last_tracked(&kv, kind)? {
                    info!(%kind, job = %id, "resuming");
                    session.track(kind, id).await;
                }
            }
            follow(&mut session, Until::Shutdown).await;
            persist_selection(&session, &kv)?;
        }
    }
    Ok(())
}

async fn list(config: &Config, kind: JobKind) -> Result<()> {
    let mut session = new_session(config)?;
    session.refresh(kind).await;
    if let Some(err) = session.listing(kind).error() {
        bail!("{kind} list unavailable: {err}");
    }
    Ok(())
}

/// Drive the session until `until` holds or Ctrl-C.
async fn follow(session: &mut Console, until: Until) {
    let (tx, mut rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = tx.send(true);
            }
            Err(e) => {
                warn!(err = %e, "ctrl-c handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    });
    session.drive(&mut rx, until).await;
}

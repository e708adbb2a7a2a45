#![deny(missing_docs)]
//! dispatch_core: client side of the broadcast/auto-reply backend
//! (submission, job polling, list sync, context switching).

/// REST wire types and the [`api::Backend`] seam.
pub mod api;
/// Configuration helpers (AppId, dirs, load_or_init, etc.)
pub mod cfg;
/// Error types for validation, transport and submission.
pub mod error;
/// Validates input and creates jobs.
pub mod gateway;
/// Job model shared by the poller, the lists and the renderer.
pub mod job;
/// Tracing/log initialization helpers.
pub mod logx;
/// Tracks one job until it ends.
pub mod poller;
/// Ordered set of selected posts.
pub mod selection;
/// Root controller tying everything together.
pub mod session;
/// Backend settings and their validation.
pub mod settings;
/// Simple file-backed KV store with serde helpers.
pub mod store;
/// Periodic refresh of aggregate job lists.
pub mod sync;
/// Rendering callbacks and the text renderer.
pub mod view;

#[cfg(test)]
mod testing;

pub use api::{Backend, HttpBackend};
pub use error::{ApiError, SubmitError, ValidationError};
pub use job::{Job, JobId, JobKind, JobStatus, PostId};
pub use selection::Selection;
pub use session::{Session, Until};
pub use view::{Notice, TextView, View};

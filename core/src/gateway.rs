use tracing::{info, warn};

use crate::api::Backend;
use crate::error::{SubmitError, ValidationError};
use crate::job::{JobId, PostId};

/// Creates jobs on the backend after checking local preconditions.
///
/// Submission is one-shot; the caller hands the returned id to a poller.
#[derive(Clone)]
pub struct SubmissionGateway<B> {
    backend: B,
}

impl<B: Backend> SubmissionGateway<B> {
    /// Gateway over `backend`.
    pub fn new(backend: B) -> Self { Self { backend } }

    /// Start a broadcast for `targets` with `message`.
    pub async fn submit_broadcast(&self, targets: &[PostId], message: &str) -> Result<JobId, SubmitError> {
        if targets.is_empty() {
            return Err(ValidationError::EmptySelection.into());
        }
        let message = checked_message(message)?;
        match self.backend.start_broadcast(targets, message).await {
            Ok(id) => {
                info!(job = %id, posts = targets.len(), "broadcast submitted");
                Ok(id)
            }
            Err(e) => {
                warn!(err = %e, "broadcast rejected");
                Err(SubmitError::Rejected(e))
            }
        }
    }

    /// Start a watcher on the single post `target`.
    pub async fn submit_watcher(&self, target: PostId, message: &str) -> Result<JobId, SubmitError> {
        let message = checked_message(message)?;
        match self.backend.start_watch(target, message).await {
            Ok(id) => {
                info!(job = %id, post = target, "watcher submitted");
                Ok(id)
            }
            Err(e) => {
                warn!(err = %e, "watcher rejected");
                Err(SubmitError::Rejected(e))
            }
        }
    }
}

fn checked_message(message: &str) -> Result<&str, ValidationError> {
    let trimmed = message.trim();
    if trimmed.is_empty() { Err(ValidationError::EmptyMessage) } else { Ok(trimmed) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::testing::{Call, FakeBackend};

    #[tokio::test]
    async fn empty_selection_never_reaches_network() {
        let fake = FakeBackend::default();
        let gw = SubmissionGateway::new(fake.clone());
        let err = gw.submit_broadcast(&[], "hello").await.unwrap_err();
        assert!(matches!(err, SubmitError::Validation(ValidationError::EmptySelection)));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn blank_message_never_reaches_network() {
        let fake = FakeBackend::default();
        let gw = SubmissionGateway::new(fake.clone());
        let err = gw.submit_broadcast(&[1], "  \n ").await.unwrap_err();
        assert!(matches!(err, SubmitError::Validation(ValidationError::EmptyMessage)));
        let err = gw.submit_watcher(1, "").await.unwrap_err();
        assert!(matches!(err, SubmitError::Validation(ValidationError::EmptyMessage)));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn trims_message_and_returns_id() {
        let fake = FakeBackend::default();
        fake.next_job_id("42");
        let gw = SubmissionGateway::new(fake.clone());
        let id = gw.submit_broadcast(&[1, 2, 3], "  hello ").await.unwrap();
        assert_eq!(id, JobId::from("42"));
        assert_eq!(fake.calls(), vec![Call::StartBroadcast(vec![1, 2, 3], "hello".into())]);
    }

    #[tokio::test]
    async fn server_rejection_carries_body() {
        let fake = FakeBackend::default();
        fake.reject_submits(400, "save tokens first");
        let gw = SubmissionGateway::new(fake.clone());
        match gw.submit_watcher(9, "thanks").await.unwrap_err() {
            SubmitError::Rejected(ApiError::Status { status, body }) => {
                assert_eq!(status, 400);
                assert_eq!(body, "save tokens first");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(fake.calls(), vec![Call::StartWatch(9, "thanks".into())]);
    }
}

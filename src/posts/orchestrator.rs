use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use crate::posts::domain::{LocalIdGenerator, PostDraft, PostRecord};
use crate::posts::fallback::LocalFallbackStore;
use crate::posts::remote::{RemoteError, RemoteWriteClient};

pub const MSG_FIELDS_REQUIRED: &str = "All fields are required";
pub const MSG_IN_PROGRESS: &str = "A post is already being submitted";
pub const MSG_QUEUED: &str = "Server unavailable - post saved locally and will need to be resent";
pub const MSG_CREATED: &str = "Post created";
pub const MSG_FAILED: &str = "Failed to create post";
pub const MSG_INTERRUPTED: &str = "Submission was interrupted before it finished";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubmissionState {
    #[default]
    Idle,
    Submitting,
    Succeeded,
    FallbackEnqueued,
    Rejected,
    Failed,
}

impl fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SubmissionState::Idle => "idle",
            SubmissionState::Submitting => "submitting",
            SubmissionState::Succeeded => "succeeded",
            SubmissionState::FallbackEnqueued => "fallback-enqueued",
            SubmissionState::Rejected => "rejected",
            SubmissionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Validation,
    AlreadyInProgress,
    Rejected,
    ConnectivityFallback,
    PersistenceError,
    Failed,
}

/// Structured `{kind, message}` handed to the caller. Never raised as a fault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{message}")]
pub struct SubmissionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl SubmissionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Result of one `submit` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The server confirmed the write.
    Created(PostRecord),
    /// The server was unreachable; the record sits in the local queue, unconfirmed.
    Queued {
        record: PostRecord,
        notice: SubmissionError,
    },
    Failed(SubmissionError),
}

impl Completion {
    pub fn record(&self) -> Option<&PostRecord> {
        match self {
            Completion::Created(record) | Completion::Queued { record, .. } => Some(record),
            Completion::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&SubmissionError> {
        match self {
            Completion::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// The one human-readable line for this outcome.
    pub fn message(&self) -> &str {
        match self {
            Completion::Created(_) => MSG_CREATED,
            Completion::Queued { notice, .. } => &notice.message,
            Completion::Failed(err) => &err.message,
        }
    }
}

pub type CompletionCallback = Box<dyn Fn(&Completion) + Send + Sync>;

#[derive(Debug, Default)]
struct FormState {
    state: SubmissionState,
    draft: PostDraft,
    feedback: Option<SubmissionError>,
}

/// Owns one form's submission state machine.
///
/// Tries the remote write first and, only when the server cannot be reached,
/// queues a locally-identified copy in the fallback store. Each call to
/// [`submit`](Self::submit) reaches exactly one terminal outcome and notifies
/// the completion callback exactly once.
pub struct SubmissionOrchestrator {
    remote: Arc<dyn RemoteWriteClient>,
    fallback: Arc<dyn LocalFallbackStore>,
    ids: LocalIdGenerator,
    form: Mutex<FormState>,
    on_complete: Option<CompletionCallback>,
}

impl SubmissionOrchestrator {
    pub fn new(remote: Arc<dyn RemoteWriteClient>, fallback: Arc<dyn LocalFallbackStore>) -> Self {
        Self {
            remote,
            fallback,
            ids: LocalIdGenerator::new(),
            form: Mutex::new(FormState::default()),
            on_complete: None,
        }
    }

    pub fn with_completion(mut self, callback: impl Fn(&Completion) + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub fn state(&self) -> SubmissionState {
        self.form().state
    }

    /// The draft currently bound to the form.
    pub fn draft(&self) -> PostDraft {
        self.form().draft.clone()
    }

    /// Edit the bound draft. Ignored while a submission is in flight.
    pub fn update_draft(&self, edit: impl FnOnce(&mut PostDraft)) {
        let mut form = self.form();
        if form.state != SubmissionState::Submitting {
            edit(&mut form.draft);
        }
    }

    /// Error or notice text from the last submission, if any.
    pub fn feedback(&self) -> Option<SubmissionError> {
        self.form().feedback.clone()
    }

    pub async fn submit(&self, draft: PostDraft) -> Completion {
        let completion = self.run(draft).await;
        if let Some(callback) = &self.on_complete {
            callback(&completion);
        }
        completion
    }

    async fn run(&self, draft: PostDraft) -> Completion {
        {
            let mut form = self.form();
            if form.state == SubmissionState::Submitting {
                tracing::debug!("Rejecting submit while another is in flight");
                return Completion::Failed(SubmissionError::new(
                    ErrorKind::AlreadyInProgress,
                    MSG_IN_PROGRESS,
                ));
            }

            if !draft.is_complete() {
                let err = SubmissionError::new(ErrorKind::Validation, MSG_FIELDS_REQUIRED);
                form.state = SubmissionState::Idle;
                form.draft = draft;
                form.feedback = Some(err.clone());
                return Completion::Failed(err);
            }

            form.state = SubmissionState::Submitting;
            form.draft = draft.clone();
            form.feedback = None;
        }
        let _in_flight = InFlight { form: &self.form };

        match self.remote.create(&draft).await {
            Ok(record) => {
                tracing::info!("Post {} created on server", record.id);
                self.finish(SubmissionState::Succeeded, true, None);
                Completion::Created(record)
            }
            Err(RemoteError::Connectivity { endpoint, reason }) => {
                tracing::warn!("{} unreachable ({}), queueing post locally", endpoint, reason);
                self.fall_back(&draft).await
            }
            Err(RemoteError::Rejected { status, message }) => {
                tracing::warn!("Server rejected post with status {}: {}", status, message);
                let err = SubmissionError::new(
                    ErrorKind::Rejected,
                    format!("{} ({}): {}", MSG_FAILED, status, message),
                );
                self.finish(SubmissionState::Rejected, false, Some(err.clone()));
                Completion::Failed(err)
            }
            Err(err) => {
                tracing::error!("Post submission failed: {}", err);
                let err = SubmissionError::new(ErrorKind::Failed, MSG_FAILED);
                self.finish(SubmissionState::Failed, false, Some(err.clone()));
                Completion::Failed(err)
            }
        }
    }

    async fn fall_back(&self, draft: &PostDraft) -> Completion {
        let record = PostRecord::local(draft, &self.ids);

        match self.fallback.enqueue(record.clone()).await {
            Ok(()) => {
                tracing::info!("Post {} queued locally", record.id);
                let notice = SubmissionError::new(ErrorKind::ConnectivityFallback, MSG_QUEUED);
                self.finish(
                    SubmissionState::FallbackEnqueued,
                    true,
                    Some(notice.clone()),
                );
                Completion::Queued { record, notice }
            }
            Err(e) => {
                tracing::error!("Could not queue post locally: {}", e);
                let err = SubmissionError::new(
                    ErrorKind::PersistenceError,
                    format!(
                        "Server unavailable and the post could not be saved locally: {}",
                        e
                    ),
                );
                self.finish(SubmissionState::Failed, false, Some(err.clone()));
                Completion::Failed(err)
            }
        }
    }

    fn finish(&self, state: SubmissionState, reset_draft: bool, feedback: Option<SubmissionError>) {
        let mut form = self.form();
        form.state = state;
        form.feedback = feedback;
        if reset_draft {
            form.draft = PostDraft::default();
        }
    }

    fn form(&self) -> MutexGuard<'_, FormState> {
        self.form.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Held while a submission is in flight. If the `submit` future is dropped
/// before a terminal state is recorded, moves the form to `Failed` so later
/// submits are not refused forever. The draft is kept.
struct InFlight<'a> {
    form: &'a Mutex<FormState>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut form = self.form.lock().unwrap_or_else(|e| e.into_inner());
        if form.state == SubmissionState::Submitting {
            tracing::warn!("Submission dropped before completing");
            form.state = SubmissionState::Failed;
            form.feedback = Some(SubmissionError::new(ErrorKind::Failed, MSG_INTERRUPTED));
        }
    }
}

use std::sync::Arc;

use crate::posts::domain::PostDraft;
use crate::posts::orchestrator::{Completion, SubmissionOrchestrator, SubmissionState};

pub const LABEL_IDLE: &str = "Create Post";
pub const LABEL_BUSY: &str = "Creating...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Content,
    Author,
}

/// Binding surface a post form renders against.
///
/// Field values live in the orchestrator so a completed write clears them and
/// a failed one leaves them in place.
#[derive(Clone)]
pub struct PostForm {
    orchestrator: Arc<SubmissionOrchestrator>,
}

impl PostForm {
    pub fn new(orchestrator: Arc<SubmissionOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub fn set_field(&self, field: Field, value: impl Into<String>) {
        let value = value.into();
        self.orchestrator.update_draft(|draft| match field {
            Field::Title => draft.title = value,
            Field::Content => draft.content = value,
            Field::Author => draft.author = value,
        });
    }

    pub fn fields(&self) -> PostDraft {
        self.orchestrator.draft()
    }

    pub fn is_disabled(&self) -> bool {
        self.orchestrator.state() == SubmissionState::Submitting
    }

    pub fn submit_label(&self) -> &'static str {
        if self.is_disabled() {
            LABEL_BUSY
        } else {
            LABEL_IDLE
        }
    }

    /// Error or offline notice to show above the form.
    pub fn error_text(&self) -> Option<String> {
        self.orchestrator.feedback().map(|f| f.message)
    }

    pub async fn submit(&self) -> Completion {
        let draft = self.orchestrator.draft();
        self.orchestrator.submit(draft).await
    }
}

// Domain types - pure data, no I/O
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Prefix reserved for ids synthesized on this machine. Server ids never use it.
pub const LOCAL_ID_PREFIX: &str = "temp_";

/// Unsubmitted user input for a new post.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostDraft {
    pub title: String,
    pub content: String,
    pub author: String,
}

impl PostDraft {
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            author: author.into(),
        }
    }

    /// All three fields must be non-empty once trimmed.
    pub fn is_complete(&self) -> bool {
        [&self.title, &self.content, &self.author]
            .iter()
            .all(|field| !field.trim().is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.content.is_empty() && self.author.is_empty()
    }
}

/// A fully formed post, either confirmed by the server or queued locally.
///
/// Serializes in the same shape the posts API returns, so a queued record
/// cannot be told apart from a server record except by its id prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub title: String,
    pub content: String,
    pub author: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub likes: i64,
}

impl PostRecord {
    /// Build a record for a draft that could not reach the server.
    pub fn local(draft: &PostDraft, ids: &LocalIdGenerator) -> Self {
        Self {
            id: ids.next_id(),
            title: draft.title.clone(),
            content: draft.content.clone(),
            author: draft.author.clone(),
            created_at: Utc::now(),
            likes: 0,
        }
    }

    pub fn is_local(&self) -> bool {
        self.id.starts_with(LOCAL_ID_PREFIX)
    }
}

static LAST_LOCAL_STAMP: AtomicU64 = AtomicU64::new(0);

/// Hands out `temp_<unix-nanos>` ids.
///
/// The stamp is shared by every generator in the process and never repeats:
/// two calls in the same nanosecond get consecutive values.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalIdGenerator;

impl LocalIdGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn next_id(&self) -> String {
        let now = Utc::now()
            .timestamp_nanos_opt()
            .map(|nanos| nanos.max(0) as u64)
            .unwrap_or(0);

        let previous = LAST_LOCAL_STAMP
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);

        format!("{}{}", LOCAL_ID_PREFIX, now.max(previous + 1))
    }
}

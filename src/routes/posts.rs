use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::posts::{PostDraft, PostRecord};
use crate::state::AppState;

/// Request body for `POST /api/posts`. Missing fields arrive as empty strings.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub author: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/posts", get(list_posts).post(create_post))
        .route("/api/posts/{id}", get(get_post))
}

fn row_to_post(row: &Row<'_>) -> rusqlite::Result<PostRecord> {
    Ok(PostRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        author: row.get(3)?,
        created_at: row.get(4)?,
        likes: row.get(5)?,
    })
}

/// POST /api/posts
async fn create_post(
    State(state): State<AppState>,
    Json(req): Json<NewPost>,
) -> AppResult<Response> {
    let draft = PostDraft::new(req.title, req.content, req.author);
    if !draft.is_complete() {
        return Err(AppError::BadRequest("All fields are required".into()));
    }

    let record = PostRecord {
        id: uuid::Uuid::now_v7().to_string(),
        title: draft.title,
        content: draft.content,
        author: draft.author,
        created_at: Utc::now(),
        likes: 0,
    };

    let conn = state.db.get()?;
    conn.execute(
        "INSERT INTO posts (id, title, content, author, created_at, likes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            record.id,
            record.title,
            record.content,
            record.author,
            record.created_at,
            record.likes
        ],
    )?;

    tracing::info!("Created post {} by {}", record.id, record.author);
    Ok((StatusCode::CREATED, Json(record)).into_response())
}

/// GET /api/posts - newest first
async fn list_posts(State(state): State<AppState>) -> AppResult<Json<Vec<PostRecord>>> {
    let conn = state.db.get()?;
    let mut stmt = conn.prepare(
        "SELECT id, title, content, author, created_at, likes
         FROM posts ORDER BY created_at DESC",
    )?;
    let posts = stmt
        .query_map([], row_to_post)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(posts))
}

/// GET /api/posts/{id}
async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<PostRecord>> {
    let conn = state.db.get()?;
    conn.query_row(
        "SELECT id, title, content, author, created_at, likes FROM posts WHERE id = ?1",
        params![id],
        row_to_post,
    )
    .optional()?
    .map(Json)
    .ok_or(AppError::NotFound)
}

pub mod posts;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(posts::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

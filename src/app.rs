use crate::cors::{cors_middleware, request_tracing_middleware};
use crate::handlers;
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/api/all-progress", get(handlers::get_all_progress))
        .route("/api/progress", post(handlers::save_progress))
        .route(
            "/api/progress/:tmdb_id",
            get(handlers::get_progress).delete(handlers::delete_progress),
        )
        .layer(middleware::from_fn_with_state(state.clone(), cors_middleware))
        .layer(middleware::from_fn(request_tracing_middleware))
        .with_state(state)
}

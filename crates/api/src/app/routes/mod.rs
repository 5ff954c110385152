use axum::Router;

pub mod jobs;
pub mod scenarios;
pub mod suggestions;
pub mod system;

/// Router for all authenticated (user-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/scenarios", scenarios::router())
        .nest("/jobs", jobs::router())
        .nest("/partner-suggestions", suggestions::router())
}

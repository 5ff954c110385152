use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use partnerlens_core::JobId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::UserContext;

pub fn router() -> Router {
    Router::new().route("/:job_id", get(get_job))
}

/// Poll a job. Safe to call repeatedly; never changes state.
pub async fn get_job(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    Path(job_id): Path<String>,
) -> axum::response::Response {
    let Ok(job_id) = job_id.parse::<JobId>() else {
        return errors::not_found("job");
    };

    match services.runner.status(job_id).await {
        Ok(Some(view)) if view.job.owner_id == user.user_id() => {
            (StatusCode::OK, Json(dto::job_view_to_json(view))).into_response()
        }
        Ok(_) => errors::not_found("job"),
        Err(e) => errors::job_store_error_to_response(e),
    }
}

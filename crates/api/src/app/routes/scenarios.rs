use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use partnerlens_core::{NewScenario, Scenario, ScenarioId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::UserContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_scenario).get(list_scenarios))
        .route("/:id", get(get_scenario))
        .route("/:id/analyze", post(analyze_scenario))
        .route("/:id/jobs", get(list_scenario_jobs))
}

pub async fn create_scenario(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    body: Result<Json<NewScenario>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };
    let scenario = match body.into_scenario(user.user_id(), Utc::now()) {
        Ok(s) => s,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.scenarios.insert(scenario).await {
        Ok(stored) => {
            tracing::info!(scenario_id = %stored.id, user_id = %user.user_id(), "scenario created");
            (StatusCode::CREATED, Json(dto::scenario_to_json(stored))).into_response()
        }
        Err(e) => errors::scenario_store_error_to_response(e),
    }
}

pub async fn list_scenarios(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
) -> axum::response::Response {
    match services.scenarios.list_by_owner(user.user_id()).await {
        Ok(scenarios) => {
            let items = scenarios
                .into_iter()
                .map(dto::scenario_to_json)
                .collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::scenario_store_error_to_response(e),
    }
}

pub async fn get_scenario(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match owned_scenario(&services, user, &id).await {
        Ok(scenario) => (StatusCode::OK, Json(dto::scenario_to_json(scenario))).into_response(),
        Err(resp) => resp,
    }
}

pub async fn analyze_scenario(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let scenario = match owned_scenario(&services, user, &id).await {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let submission = match services.runner.submit(&scenario).await {
        Ok(s) => s,
        Err(e) => return errors::submit_error_to_response(e),
    };

    let job = submission.job;
    if submission.already_in_progress {
        (
            StatusCode::OK,
            Json(serde_json::json!({
                "job_id": job.id.to_string(),
                "status": job.status.as_str(),
                "progress": job.progress,
                "already_in_progress": true,
                "message": "analysis already in progress",
            })),
        )
            .into_response()
    } else {
        (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "job_id": job.id.to_string(),
                "status": job.status.as_str(),
                "already_in_progress": false,
                "message": "analysis started; poll the job for progress",
            })),
        )
            .into_response()
    }
}

pub async fn list_scenario_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let scenario = match owned_scenario(&services, user, &id).await {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    match services.runner.jobs_for_scenario(scenario.id).await {
        Ok(views) => {
            let items = views
                .into_iter()
                .map(dto::job_view_to_json)
                .collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::job_store_error_to_response(e),
    }
}

/// Malformed ids, unknown scenarios and other users' scenarios all read as 404.
async fn owned_scenario(
    services: &AppServices,
    user: UserContext,
    raw_id: &str,
) -> Result<Scenario, axum::response::Response> {
    let Ok(id) = raw_id.parse::<ScenarioId>() else {
        return Err(errors::not_found("scenario"));
    };

    match services.scenarios.get(id).await {
        Ok(Some(s)) if s.is_owned_by(user.user_id()) => Ok(s),
        Ok(_) => Err(errors::not_found("scenario")),
        Err(e) => Err(errors::scenario_store_error_to_response(e)),
    }
}

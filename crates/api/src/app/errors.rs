use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use partnerlens_ai::AiError;
use partnerlens_core::DomainError;
use partnerlens_infra::jobs::{JobStoreError, SubmitError};
use partnerlens_infra::scenarios::ScenarioStoreError;

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn not_found(what: &str) -> axum::response::Response {
    json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
}

/// Storage failures: details go to the log, the caller gets a generic message.
fn internal(err: impl std::fmt::Display) -> axum::response::Response {
    tracing::error!(error = %err, "request failed on storage");
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "internal server error",
    )
}

/// Unreadable or mistyped request bodies.
pub fn json_rejection_to_response(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text())
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::MissingFields(fields) => (
            StatusCode::BAD_REQUEST,
            axum::Json(json!({
                "error": "validation_error",
                "message": format!("missing required fields: {}", fields.join(", ")),
                "missing_fields": fields,
            })),
        )
            .into_response(),
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::NotFound => not_found("resource"),
    }
}

pub fn scenario_store_error_to_response(err: ScenarioStoreError) -> axum::response::Response {
    match err {
        ScenarioStoreError::NotFound(_) => not_found("scenario"),
        other => internal(other),
    }
}

pub fn job_store_error_to_response(err: JobStoreError) -> axum::response::Response {
    match err {
        JobStoreError::NotFound(_) => not_found("job"),
        other => internal(other),
    }
}

pub fn submit_error_to_response(err: SubmitError) -> axum::response::Response {
    match err {
        SubmitError::Saturated => json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "job_queue_full",
            "too many analyses in progress; retry shortly",
        ),
        SubmitError::ShuttingDown => json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "shutting_down",
            "server is shutting down",
        ),
        SubmitError::Store(e) => job_store_error_to_response(e),
    }
}

pub fn ai_error_to_response(err: AiError) -> axum::response::Response {
    match err {
        AiError::InvalidInput(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        AiError::ExternalUnavailable(detail) => {
            tracing::warn!(error = %detail, "external model unavailable");
            json_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "external_unavailable",
                "the external analysis service is unavailable",
            )
        }
        AiError::Internal(msg) => internal(msg),
    }
}

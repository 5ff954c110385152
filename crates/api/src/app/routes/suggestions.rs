use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::UserContext;

pub fn router() -> Router {
    Router::new().route("/", post(suggest_partners))
}

/// Free-text partner ideas from the external model. There is no local fallback here.
pub async fn suggest_partners(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    body: Result<Json<dto::PartnerSuggestionsRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };
    let brand_name = body.brand_name.unwrap_or_default();

    match services
        .engine
        .suggest_partners(&brand_name, body.industry.as_deref())
        .await
    {
        Ok(s) => {
            tracing::info!(user_id = %user.user_id(), brand_name = %s.brand_name, "partner suggestions generated");
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "brand_name": s.brand_name,
                    "suggestions": s.suggestions,
                    "model": s.model,
                    "tokens_used": s.tokens_used,
                })),
            )
                .into_response()
        }
        Err(e) => errors::ai_error_to_response(e),
    }
}

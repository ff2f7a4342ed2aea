use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use procura_infra::EngineError;

pub fn engine_error_to_response(err: EngineError) -> axum::response::Response {
    match &err {
        // Not a failure from the caller's point of view: the order is settled.
        EngineError::PaymentAlreadyCompleted {
            order_id,
            payment_id,
        } => (
            StatusCode::OK,
            axum::Json(json!({
                "status": "already_paid",
                "order_id": order_id.to_string(),
                "payment_id": payment_id.to_string(),
            })),
        )
            .into_response(),
        EngineError::InvalidTransition { .. } => {
            json_error(StatusCode::CONFLICT, "invalid_transition", err.to_string())
        }
        EngineError::Conflict(_) => json_error(StatusCode::CONFLICT, "conflict", err.to_string()),
        EngineError::OverReceipt { .. } => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "over_receipt", err.to_string())
        }
        EngineError::Validation(_) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", err.to_string())
        }
        EngineError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", err.to_string()),
        EngineError::Gateway(_) => json_error(StatusCode::BAD_GATEWAY, "gateway_error", err.to_string()),
        EngineError::Repository(_) | EngineError::Ledger(_) | EngineError::Lock(_) => {
            tracing::error!(error = %err, "fatal engine error");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                err.to_string(),
            )
        }
    }
}

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

//! HTTP错误响应

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use telerad_core::TeleradError;
use tracing::{error, warn};

/// 处理器错误，统一转换为 JSON 提示
#[derive(Debug)]
pub struct ApiError(pub TeleradError);

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<TeleradError> for ApiError {
    fn from(err: TeleradError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            TeleradError::Validation(_) => StatusCode::BAD_REQUEST,
            TeleradError::AccessDenied(_) => StatusCode::FORBIDDEN,
            TeleradError::NotFound(_) => StatusCode::NOT_FOUND,
            TeleradError::Conflict(_) | TeleradError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else if status == StatusCode::FORBIDDEN {
            warn!("Request denied: {}", self.0);
        }

        let body = Json(json!({
            "error": true,
            "message": self.0.notice(),
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telerad_core::UniqueConstraint;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (TeleradError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (TeleradError::AccessDenied("x".into()), StatusCode::FORBIDDEN),
            (TeleradError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (TeleradError::Conflict(UniqueConstraint::UserEmail), StatusCode::CONFLICT),
            (
                TeleradError::InvalidStateTransition {
                    from: "ASSIGNED".into(),
                    event: "Printed".into(),
                },
                StatusCode::CONFLICT,
            ),
            (TeleradError::Database("disk I/O error".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError(err).status(), expected);
        }
    }

    #[test]
    fn test_server_errors_hide_details() {
        let response = ApiError(TeleradError::Database("no such table: exams".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

use crate::error::HubError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hub_protocol::HttpErrorEnvelope;

pub type HttpResponse = Response;
pub type HttpResult<T = ()> = Result<T, HttpResponse>;

pub(crate) fn json_error(
    status: StatusCode,
    code: impl Into<String>,
    message: impl Into<String>,
) -> HttpResponse {
    (
        status,
        Json(HttpErrorEnvelope {
            code: code.into(),
            message: message.into(),
            details: None,
        }),
    )
        .into_response()
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        if matches!(self, HubError::Database(_)) {
            tracing::error!(error = %self, "database error serving request");
        }
        json_error(self.status(), self.wire_code(), self.to_string())
    }
}

pub fn internal_error(err: impl std::fmt::Display) -> HttpResponse {
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        hub_protocol::error_codes::INTERNAL,
        err.to_string(),
    )
}

pub fn bad_request(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::BAD_REQUEST, "bad_request", message)
}

pub fn not_found(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::NOT_FOUND, "not_found", message)
}

pub fn conflict(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::CONFLICT, "conflict", message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn assert_error_response(
        response: Response,
        expected_status: StatusCode,
        expected_code: &str,
        expected_message: &str,
    ) {
        assert_eq!(response.status(), expected_status);

        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body should be readable");
        let parsed: HttpErrorEnvelope =
            serde_json::from_slice(&body).expect("response body should be valid error json");

        assert_eq!(parsed.code, expected_code);
        assert_eq!(parsed.message, expected_message);
        assert_eq!(parsed.details, None);
    }

    #[tokio::test]
    async fn json_error_sets_status_code_message_and_no_details() {
        let response = json_error(StatusCode::BAD_GATEWAY, "upstream_error", "upstream failure");

        assert_error_response(
            response,
            StatusCode::BAD_GATEWAY,
            "upstream_error",
            "upstream failure",
        )
        .await;
    }

    #[tokio::test]
    async fn internal_error_sets_internal_contract() {
        let response = internal_error("database unavailable");

        assert_error_response(
            response,
            StatusCode::INTERNAL_SERVER_ERROR,
            hub_protocol::error_codes::INTERNAL,
            "database unavailable",
        )
        .await;
    }

    #[tokio::test]
    async fn bad_request_sets_bad_request_contract() {
        let response = bad_request("invalid query");

        assert_error_response(response, StatusCode::BAD_REQUEST, "bad_request", "invalid query")
            .await;
    }

    #[tokio::test]
    async fn not_found_sets_not_found_contract() {
        let response = not_found("conversation missing");

        assert_error_response(
            response,
            StatusCode::NOT_FOUND,
            "not_found",
            "conversation missing",
        )
        .await;
    }

    #[tokio::test]
    async fn hub_error_into_response_uses_wire_code() {
        let response = HubError::TokenExpired.into_response();

        assert_error_response(
            response,
            StatusCode::GONE,
            hub_protocol::error_codes::TOKEN_EXPIRED,
            "call session token expired",
        )
        .await;
    }
}

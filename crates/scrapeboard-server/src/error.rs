use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use scrapeboard_core::ScrapeError;

// ---------------------------------------------------------------------------
// Internal sentinel for explicit 401 Unauthorized errors
// ---------------------------------------------------------------------------

/// Private sentinel error type used to carry an explicit HTTP 401 through
/// the `anyhow::Error` chain without touching the `ScrapeError` enum.
#[derive(Debug)]
struct UnauthorizedError(String);

impl std::fmt::Display for UnauthorizedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for UnauthorizedError {}

// ---------------------------------------------------------------------------
// AppError — unified error type for HTTP responses
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// Construct a 401 Unauthorized error.
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self(UnauthorizedError(msg.into()).into())
    }

    /// Construct a 400 Bad Request error with the given message.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(ScrapeError::InvalidParams(msg.into()).into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(u) = self.0.downcast_ref::<UnauthorizedError>() {
            let body = serde_json::json!({ "error": u.0.clone() });
            return (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response();
        }

        if let Some(e) = self.0.downcast_ref::<ScrapeError>() {
            // Cooldown carries a machine-readable Retry-After alongside the
            // human message; AlreadyRunning names the current runner.
            match e {
                ScrapeError::AlreadyRunning { kind, runner } => {
                    let body = serde_json::json!({
                        "error": self.0.to_string(),
                        "kind": kind.as_str(),
                        "triggered_by": runner,
                    });
                    return (StatusCode::CONFLICT, axum::Json(body)).into_response();
                }
                ScrapeError::Cooldown { retry_after } => {
                    let body = serde_json::json!({
                        "error": self.0.to_string(),
                        "retry_after_secs": retry_after.as_secs(),
                    });
                    return (
                        StatusCode::TOO_MANY_REQUESTS,
                        [("Retry-After", retry_after.as_secs().to_string())],
                        axum::Json(body),
                    )
                        .into_response();
                }
                _ => {}
            }

            let status = match e {
                ScrapeError::AlreadyRunning { .. } => StatusCode::CONFLICT,
                ScrapeError::Cooldown { .. } => StatusCode::TOO_MANY_REQUESTS,
                ScrapeError::InvalidParams(_) => StatusCode::BAD_REQUEST,
                ScrapeError::PasswordResetRequired => StatusCode::FORBIDDEN,
                ScrapeError::NotReady(_) | ScrapeError::UnknownKind(_) => StatusCode::NOT_FOUND,
                ScrapeError::Ledger(_) | ScrapeError::Io(_) | ScrapeError::Json(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            let body = serde_json::json!({ "error": self.0.to_string() });
            return (status, axum::Json(body)).into_response();
        }

        let body = serde_json::json!({ "error": self.0.to_string() });
        (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

//! Principal extraction.
//!
//! Authentication itself is the upstream gateway's job; by the time a
//! request reaches this service the gateway has verified the session and
//! injected the principal as headers. This extractor only consumes that
//! verdict:
//!
//! - `x-scrapeboard-user` — user id (required; 401 without it)
//! - `x-scrapeboard-admin` — `1`/`true` for admins
//! - `x-scrapeboard-password-reset` — `1`/`true` while a reset is pending;
//!   every operation is refused with 403 until it clears
//! - `x-scrapeboard-last-scrape` / `x-scrapeboard-last-mods-scrape` —
//!   optional RFC 3339 trigger timestamps recorded by the legacy system

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{DateTime, Utc};

use scrapeboard_core::{Principal, ScrapeError};

use crate::error::AppError;

pub const USER_HEADER: &str = "x-scrapeboard-user";
pub const ADMIN_HEADER: &str = "x-scrapeboard-admin";
pub const PASSWORD_RESET_HEADER: &str = "x-scrapeboard-password-reset";
pub const LAST_SCRAPE_HEADER: &str = "x-scrapeboard-last-scrape";
pub const LAST_MODS_SCRAPE_HEADER: &str = "x-scrapeboard-last-mods-scrape";

/// The authenticated principal, rebuilt from gateway headers.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Principal);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        let Some(user_id) = header(USER_HEADER).filter(|v| !v.is_empty()) else {
            return Err(AppError::unauthorized("missing authenticated user header"));
        };

        let principal = Principal {
            user_id,
            is_admin: flag(header(ADMIN_HEADER)),
            password_needs_reset: flag(header(PASSWORD_RESET_HEADER)),
            last_scrape_time: timestamp(header(LAST_SCRAPE_HEADER)),
            last_mods_scrape_time: timestamp(header(LAST_MODS_SCRAPE_HEADER)),
        };

        // A pending password reset gates every operation, not just starts.
        if principal.password_needs_reset {
            return Err(AppError(ScrapeError::PasswordResetRequired.into()));
        }

        Ok(AuthUser(principal))
    }
}

fn flag(value: Option<String>) -> bool {
    matches!(value.as_deref(), Some("1") | Some("true"))
}

fn timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .as_deref()
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::{body::Body, http::Request, routing::get, Router};
    use tower::ServiceExt;

    async fn whoami(user: AuthUser) -> String {
        format!(
            "{}:{}",
            user.0.user_id,
            if user.0.is_admin { "admin" } else { "user" }
        )
    }

    fn test_app() -> Router {
        Router::new().route("/", get(whoami))
    }

    #[tokio::test]
    async fn missing_user_header_is_401() {
        let resp = test_app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn user_header_builds_principal() {
        let resp = test_app()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(USER_HEADER, "alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn admin_flag_is_parsed() {
        let resp = test_app()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(USER_HEADER, "root")
                    .header(ADMIN_HEADER, "1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = http_body_util::BodyExt::collect(resp.into_body())
            .await
            .unwrap()
            .to_bytes();
        assert_eq!(&body[..], b"root:admin");
    }

    #[tokio::test]
    async fn pending_password_reset_is_403_everywhere() {
        let resp = test_app()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(USER_HEADER, "alice")
                    .header(PASSWORD_RESET_HEADER, "true")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn legacy_timestamps_parse_rfc3339() {
        let ts = timestamp(Some("2024-01-15T10:00:00Z".into())).unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-01-15T10:00:00+00:00");
        assert!(timestamp(Some("yesterday".into())).is_none());
        assert!(timestamp(None).is_none());
    }
}

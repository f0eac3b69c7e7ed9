//! Custom Axum extractors
//!
//! Authentication is done by a proxy in front of the service; these only read
//! the identity headers it sets.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::state::AppState;

/// Authenticated moderator making the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Moderator {
    pub name: String,
    pub is_admin: bool,
}

/// No identity: send the caller to the login entry point
#[derive(Debug)]
pub struct LoginRedirect {
    pub location: String,
}

impl IntoResponse for LoginRedirect {
    fn into_response(self) -> Response {
        (StatusCode::FOUND, [(header::LOCATION, self.location)]).into_response()
    }
}

impl FromRequestParts<Arc<AppState>> for Moderator {
    type Rejection = LoginRedirect;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let name = parts
            .headers
            .get(state.auth.user_header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        let Some(name) = name else {
            tracing::debug!(path = %parts.uri.path(), "Anonymous request, redirecting to login");
            return Err(LoginRedirect {
                location: state.auth.login_url.clone(),
            });
        };

        let is_admin = parts
            .headers
            .get(state.auth.admin_header.as_str())
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));

        Ok(Self {
            name: name.to_string(),
            is_admin,
        })
    }
}

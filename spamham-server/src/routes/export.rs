//! Labeled collection export

use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::error::ApiError;
use crate::state::AppState;
use spamham_core::Collection;

pub(crate) const JSON_UTF8: &str = "application/json; charset=utf-8";

async fn export(state: &AppState, collection: Collection) -> Result<Response, ApiError> {
    let ctx = state.context(None);
    let body = state.services.listing.export_json(&ctx, collection).await?;
    Ok(([(header::CONTENT_TYPE, JSON_UTF8)], body).into_response())
}

/// GET /spam
async fn export_spam(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    export(&state, Collection::Spam).await
}

/// GET /ham
async fn export_ham(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    export(&state, Collection::Ham).await
}

/// Export routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/spam", get(export_spam))
        .route("/ham", get(export_ham))
}

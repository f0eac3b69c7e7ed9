//! Moderation endpoints: peek, upload, categorize

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{Form, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::extractors::Moderator;
use crate::routes::export::JSON_UTF8;
use crate::state::AppState;
use spamham_core::{CategorizeOutcome, Collection};

/// Upload response
#[derive(Serialize)]
pub struct UploadResponse {
    pub key: String,
    /// Present when the item was stored but not counted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counter_error: Option<String>,
}

/// Categorize form fields; both optional so a partial form is a no-op
#[derive(Debug, Default, Deserialize)]
pub struct CategorizeForm {
    pub key: Option<String>,
    #[serde(rename = "type")]
    pub target: Option<String>,
}

impl CategorizeForm {
    /// Body fields win; the query string fills whatever the body left out
    fn merge(body: Self, query: Self) -> Self {
        Self {
            key: body.key.or(query.key),
            target: body.target.or(query.target),
        }
    }
}

/// GET /tweet - next pending item with the pending count; empty body when none
async fn next_tweet(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let ctx = state.context(None);
    let Some(peek) = state.services.listing.peek_one(&ctx, Collection::Pending).await? else {
        return Ok(().into_response());
    };

    let body = peek.to_json()?;
    Ok(([(header::CONTENT_TYPE, JSON_UTF8)], body).into_response())
}

/// POST /uploadTweet - raw body becomes a new pending item (admins only)
async fn upload_tweet(
    State(state): State<Arc<AppState>>,
    moderator: Moderator,
    body: Bytes,
) -> Result<Json<UploadResponse>, ApiError> {
    if !moderator.is_admin {
        tracing::warn!(moderator = %moderator.name, "Upload refused for non-admin");
        return Err(ApiError::forbidden("uploading items requires admin rights"));
    }

    let ctx = state.context(Some(&moderator.name));
    let receipt = state.services.queue.ingest(&ctx, body.to_vec()).await?;

    Ok(Json(UploadResponse {
        key: receipt.key.encode(),
        counter_error: receipt.counter_error.map(|e| e.to_string()),
    }))
}

/// POST /categorize - move a pending item into spam or ham
async fn categorize(
    State(state): State<Arc<AppState>>,
    moderator: Moderator,
    query: Result<Query<CategorizeForm>, QueryRejection>,
    body: Result<Form<CategorizeForm>, FormRejection>,
) -> Result<Response, ApiError> {
    // An unreadable query or body counts as missing fields
    let query = query.map(|Query(q)| q).unwrap_or_default();
    let body = body.map(|Form(b)| b).unwrap_or_default();
    let form = CategorizeForm::merge(body, query);

    let key = form.key.as_deref().map(str::trim).unwrap_or_default();
    let target = form.target.as_deref().map(str::trim).unwrap_or_default();
    if key.is_empty() || target.is_empty() {
        tracing::debug!(moderator = %moderator.name, ?form, "Categorize without key or type ignored");
        return Ok(().into_response());
    }

    let ctx = state.context(Some(&moderator.name));
    let outcome: CategorizeOutcome = state.services.queue.categorize_raw(&ctx, key, target).await?;
    Ok(Json(outcome).into_response())
}

/// Moderation routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tweet", get(next_tweet))
        .route("/uploadTweet", post(upload_tweet))
        .route("/categorize", post(categorize))
}

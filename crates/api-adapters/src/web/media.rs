use axum::extract::{Path, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use domains::AppError;

use super::extract::QueryParams;
use super::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct SignedQuery {
    expires: i64,
    signature: String,
}

/// Serves a locally stored object behind a signed, expiring link.
pub(super) async fn serve(
    State(state): State<AppState>,
    Path(key): Path<String>,
    QueryParams(query): QueryParams<SignedQuery>,
) -> ApiResult<Response> {
    let media = state.local_media.as_ref().ok_or_else(|| AppError::not_found("Media", &key))?;
    media.verify(&key, query.expires, &query.signature)?;
    let (data, content_type) = media.open(&key).await?;
    Ok(([(CONTENT_TYPE, content_type.to_string()), (CACHE_CONTROL, "private, max-age=300".to_owned())], data)
        .into_response())
}

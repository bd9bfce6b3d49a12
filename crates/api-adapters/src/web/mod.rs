//! axum router and shared request state.

mod comments;
pub mod error;
pub mod extract;
mod media;
mod posts;
mod users;

use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use domains::AppError;
use services::{AuthService, CommentService, PostService, VoteService};
use storage_adapters::media::LocalMediaStorage;

use crate::{Envelope, Metrics};
pub use error::{ApiError, ApiResult};

type Reply<T> = ApiResult<Json<Envelope<T>>>;

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub posts: Arc<PostService>,
    pub comments: Arc<CommentService>,
    pub votes: Arc<VoteService>,
    pub metrics: Arc<Metrics>,
    /// Set when media is stored on local disk and served by `/media/{key}`.
    pub local_media: Option<Arc<LocalMediaStorage>>,
}

impl AppState {
    pub fn new(
        auth: Arc<AuthService>,
        posts: Arc<PostService>,
        comments: Arc<CommentService>,
        votes: Arc<VoteService>,
    ) -> Self {
        Self { auth, posts, comments, votes, metrics: Arc::new(Metrics::new()), local_media: None }
    }

    pub fn with_local_media(mut self, media: Arc<LocalMediaStorage>) -> Self {
        self.local_media = Some(media);
        self
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/posts", post(posts::create).get(posts::list))
        .route("/posts/{id}", get(posts::get).put(posts::update).delete(posts::delete))
        .route("/posts/upvote/{id}", put(posts::upvote))
        .route("/posts/downvote/{id}", put(posts::downvote))
        .route("/comments", post(comments::create).get(comments::list))
        .route("/comments/{id}", get(comments::get).put(comments::update).delete(comments::delete))
        .route("/comments/upvote/{id}", put(comments::upvote))
        .route("/comments/downvote/{id}", put(comments::downvote))
        .route("/auth/register", post(users::register))
        .route("/auth/login", post(users::login))
        .route("/media/{key}", get(media::serve))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(middleware::from_fn_with_state(state.clone(), track_requests))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn track_requests(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let response = next.run(req).await;
    state.metrics.record_request(method.as_str(), response.status().as_u16());
    response
}

async fn health() -> Json<Envelope<Value>> {
    Json(Envelope::ok(json!({ "status": "ok" })))
}

async fn metrics(State(state): State<AppState>) -> ApiResult<Response> {
    let body = state.metrics.encode().map_err(AppError::upstream)?;
    Ok(([(CONTENT_TYPE, "application/openmetrics-text; version=1.0.0; charset=utf-8")], body).into_response())
}

async fn not_found(req: Request) -> ApiError {
    ApiError(AppError::NotFound("Route".into(), req.uri().path().to_owned()))
}

async fn method_not_allowed(req: Request) -> (StatusCode, Json<Envelope<()>>) {
    let message = format!("method {} is not allowed on {}", req.method(), req.uri().path());
    (StatusCode::METHOD_NOT_ALLOWED, Json(Envelope::failure(message)))
}

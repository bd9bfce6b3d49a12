use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use domains::{PostChanges, PostView, VoteDirection, VoteResult, VoteTarget};

use super::extract::{AuthUser, CreatePostForm, EntityId, JsonBody, QueryParams};
use super::{AppState, Reply};
use crate::Envelope;

#[derive(Debug, Deserialize)]
pub(super) struct ListQuery {
    query: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct UpdateBody {
    title: Option<String>,
    content: Option<String>,
}

pub(super) async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    CreatePostForm(input): CreatePostForm,
) -> Reply<PostView> {
    let view = state.posts.create(user.id, input).await?;
    Ok(Json(Envelope::ok(view)))
}

pub(super) async fn list(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    QueryParams(params): QueryParams<ListQuery>,
) -> Reply<Vec<PostView>> {
    let views = state.posts.list(user.id, params.query).await?;
    Ok(Json(Envelope::list(views)))
}

pub(super) async fn get(State(state): State<AppState>, AuthUser(user): AuthUser, EntityId(id): EntityId) -> Reply<PostView> {
    Ok(Json(Envelope::ok(state.posts.get(user.id, id).await?)))
}

pub(super) async fn update(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    EntityId(id): EntityId,
    JsonBody(body): JsonBody<UpdateBody>,
) -> Reply<PostView> {
    let changes = PostChanges { title: body.title, content: body.content };
    Ok(Json(Envelope::ok(state.posts.update(user.id, id, changes).await?)))
}

pub(super) async fn delete(State(state): State<AppState>, AuthUser(user): AuthUser, EntityId(id): EntityId) -> Reply<Value> {
    state.posts.delete(user.id, id).await?;
    Ok(Json(Envelope::ok(json!({}))))
}

pub(super) async fn upvote(state: State<AppState>, user: AuthUser, id: EntityId) -> Reply<VoteResult> {
    vote(state, user, id, VoteDirection::Up).await
}

pub(super) async fn downvote(state: State<AppState>, user: AuthUser, id: EntityId) -> Reply<VoteResult> {
    vote(state, user, id, VoteDirection::Down).await
}

async fn vote(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    EntityId(id): EntityId,
    direction: VoteDirection,
) -> Reply<VoteResult> {
    let target = VoteTarget::Post(id);
    let result = state.votes.apply_vote(target, user.id, direction).await?;
    state.metrics.record_vote(&target, direction);
    Ok(Json(Envelope::ok(result)))
}

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use domains::{AppError, CommentChanges, CommentFilter, CommentTree, VoteDirection, VoteResult, VoteTarget};
use services::CreateComment;

use super::extract::{AuthUser, EntityId, JsonBody, QueryParams};
use super::{AppState, Reply};
use crate::Envelope;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ListQuery {
    post_id: Option<Uuid>,
    parent_id: Option<Uuid>,
}

impl ListQuery {
    fn filter(&self) -> Result<CommentFilter, AppError> {
        match (self.post_id, self.parent_id) {
            (None, None) => Ok(CommentFilter::All),
            (Some(post_id), None) => Ok(CommentFilter::RootsOf(post_id)),
            (None, Some(parent_id)) => Ok(CommentFilter::ChildrenOf(parent_id)),
            (Some(_), Some(_)) => Err(AppError::validation("pass either postId or parentId, not both")),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CreateBody {
    #[serde(default)]
    body: String,
    post_id: Uuid,
    parent_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub(super) struct UpdateBody {
    body: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct Deleted {
    deleted: usize,
}

pub(super) async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(body): JsonBody<CreateBody>,
) -> Reply<CommentTree> {
    let input = CreateComment { body: body.body, post_id: body.post_id, parent_id: body.parent_id };
    Ok(Json(Envelope::ok(state.comments.create(user.id, input).await?)))
}

pub(super) async fn list(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    QueryParams(params): QueryParams<ListQuery>,
) -> Reply<Vec<CommentTree>> {
    let trees = state.comments.list(user.id, params.filter()?).await?;
    Ok(Json(Envelope::list(trees)))
}

pub(super) async fn get(State(state): State<AppState>, AuthUser(user): AuthUser, EntityId(id): EntityId) -> Reply<CommentTree> {
    Ok(Json(Envelope::ok(state.comments.get(user.id, id).await?)))
}

pub(super) async fn update(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    EntityId(id): EntityId,
    JsonBody(body): JsonBody<UpdateBody>,
) -> Reply<CommentTree> {
    let changes = CommentChanges { body: body.body };
    Ok(Json(Envelope::ok(state.comments.update(user.id, id, changes).await?)))
}

pub(super) async fn delete(State(state): State<AppState>, AuthUser(user): AuthUser, EntityId(id): EntityId) -> Reply<Deleted> {
    let deleted = state.comments.delete(user.id, id).await?;
    Ok(Json(Envelope::ok(Deleted { deleted })))
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
    let target = VoteTarget::Comment(id);
    let result = state.votes.apply_vote(target, user.id, direction).await?;
    state.metrics.record_vote(&target, direction);
    Ok(Json(Envelope::ok(result)))
}

//! Comment threads: creation under a post or a parent comment, two-level
//! read expansion, and deletion.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use domains::tree::{self, REPLY_EXPANSION_DEPTH};
use domains::{
    AppError, Comment, CommentChanges, CommentFilter, CommentRepository, CommentTree, NewComment, PostRepository,
    Result,
};

use crate::{optional, required};

#[derive(Debug, Clone)]
pub struct CreateComment {
    pub body: String,
    pub post_id: Uuid,
    pub parent_id: Option<Uuid>,
}

pub struct CommentService {
    comments: Arc<dyn CommentRepository>,
    posts: Arc<dyn PostRepository>,
}

impl CommentService {
    pub fn new(comments: Arc<dyn CommentRepository>, posts: Arc<dyn PostRepository>) -> Self {
        Self { comments, posts }
    }

    #[instrument(skip(self, input), fields(author = %author, post_id = %input.post_id))]
    pub async fn create(&self, author: Uuid, input: CreateComment) -> Result<CommentTree> {
        let body = required("body", &input.body)?;
        if self.posts.find_by_id(input.post_id).await?.is_none() {
            return Err(AppError::not_found("Post", input.post_id));
        }

        let comment = self
            .comments
            .create(NewComment {
                body,
                post_id: input.post_id,
                parent_id: input.parent_id,
                created_by: author,
            })
            .await?;
        info!(comment_id = %comment.id, parent_id = ?comment.parent_id, "comment created");
        self.expand_one(comment, author).await
    }

    pub async fn list(&self, viewer: Uuid, filter: CommentFilter) -> Result<Vec<CommentTree>> {
        let roots = self.comments.list(filter).await?;
        self.expand(roots, viewer).await
    }

    pub async fn get(&self, viewer: Uuid, id: Uuid) -> Result<CommentTree> {
        let comment = self.find(id).await?;
        self.expand_one(comment, viewer).await
    }

    #[instrument(skip(self, changes))]
    pub async fn update(&self, viewer: Uuid, id: Uuid, changes: CommentChanges) -> Result<CommentTree> {
        let changes = CommentChanges { body: optional("body", changes.body)? };
        if changes.body.is_none() {
            return Err(AppError::validation("nothing to update"));
        }

        let existing = self.find(id).await?;
        ensure_owner(&existing, viewer)?;

        let comment = self
            .comments
            .update(id, changes)
            .await?
            .ok_or_else(|| AppError::not_found("Comment", id))?;
        info!(comment_id = %id, "comment updated");
        self.expand_one(comment, viewer).await
    }

    /// Removes the comment, its replies, and its link from the parent.
    #[instrument(skip(self))]
    pub async fn delete(&self, viewer: Uuid, id: Uuid) -> Result<usize> {
        let existing = self.find(id).await?;
        ensure_owner(&existing, viewer)?;

        let removed = self.comments.delete(id).await?;
        if removed == 0 {
            return Err(AppError::not_found("Comment", id));
        }
        info!(comment_id = %id, removed, "comment deleted");
        Ok(removed)
    }

    /// Resolves `REPLY_EXPANSION_DEPTH` levels of replies below `roots`,
    /// one batched fetch per level.
    pub async fn expand(&self, roots: Vec<Comment>, viewer: Uuid) -> Result<Vec<CommentTree>> {
        let mut pool = HashMap::new();
        let mut frontier = tree::reply_ids(&roots);
        for _ in 0..REPLY_EXPANSION_DEPTH {
            if frontier.is_empty() {
                break;
            }
            let level = self.comments.find_many(&frontier).await?;
            frontier = tree::reply_ids(&level);
            pool.extend(level.into_iter().map(|c| (c.id, c)));
        }
        Ok(tree::expand(roots, &pool, viewer))
    }

    async fn expand_one(&self, comment: Comment, viewer: Uuid) -> Result<CommentTree> {
        let id = comment.id;
        self.expand(vec![comment], viewer)
            .await?
            .pop()
            .ok_or_else(|| AppError::not_found("Comment", id))
    }

    async fn find(&self, id: Uuid) -> Result<Comment> {
        self.comments
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("Comment", id))
    }
}

fn ensure_owner(comment: &Comment, viewer: Uuid) -> Result<()> {
    if comment.created_by != viewer {
        return Err(AppError::Forbidden(format!("comment {} belongs to another user", comment.id)));
    }
    Ok(())
}

//! Upvote / downvote on posts and comments.
//!
//! The stores apply the voter-set change atomically; this layer only routes
//! the target and derives the caller's summary from what was persisted.

use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use domains::{CommentRepository, PostRepository, Result, VoteDirection, VoteResult, VoteTarget, VotedEntity};

pub struct VoteService {
    posts: Arc<dyn PostRepository>,
    comments: Arc<dyn CommentRepository>,
}

impl VoteService {
    pub fn new(posts: Arc<dyn PostRepository>, comments: Arc<dyn CommentRepository>) -> Self {
        Self { posts, comments }
    }

    #[instrument(skip(self))]
    pub async fn apply_vote(&self, target: VoteTarget, voter: Uuid, direction: VoteDirection) -> Result<VoteResult> {
        let entity = match target {
            VoteTarget::Post(id) => VotedEntity::Post(self.posts.apply_vote(id, voter, direction).await?),
            VoteTarget::Comment(id) => VotedEntity::Comment(self.comments.apply_vote(id, voter, direction).await?),
        };
        debug!(kind = target.kind(), "vote recorded");
        Ok(VoteResult::new(entity, voter))
    }
}

//! Reply-tree expansion.
//!
//! Comments are stored flat and reference each other by id. A read resolves a
//! fixed number of reply levels below the matched comments; anything deeper
//! is left as bare ids in `replies` and must be fetched by its own id.

use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{Comment, CommentTree};

/// Number of reply levels resolved below a matched comment.
pub const REPLY_EXPANSION_DEPTH: usize = 2;

/// Ids of the direct replies of `level`, in order, for the next fetch round.
pub fn reply_ids<'a>(level: impl IntoIterator<Item = &'a Comment>) -> Vec<Uuid> {
    level
        .into_iter()
        .flat_map(|c| c.replies.iter().copied())
        .collect()
}

/// Builds the trees for `roots`, resolving replies from `pool`.
///
/// Reply ids missing from `pool` (deleted concurrently) are skipped.
pub fn expand(roots: Vec<Comment>, pool: &HashMap<Uuid, Comment>, viewer: Uuid) -> Vec<CommentTree> {
    roots
        .into_iter()
        .map(|root| build(root, pool, viewer, 0))
        .collect()
}

fn build(comment: Comment, pool: &HashMap<Uuid, Comment>, viewer: Uuid, depth: usize) -> CommentTree {
    let replies_detailed = (depth < REPLY_EXPANSION_DEPTH).then(|| {
        comment
            .replies
            .iter()
            .filter_map(|id| pool.get(id))
            .map(|reply| build(reply.clone(), pool, viewer, depth + 1))
            .collect()
    });
    CommentTree {
        votes: comment.votes.summary_for(viewer),
        comment,
        replies_detailed,
    }
}

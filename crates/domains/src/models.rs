//! # Domain Models
//!
//! These structs represent the core entities of Agora and the read shapes the
//! API hands back. Identifiers are UUID v4.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::errors::{AppError, Result};

/// A registered identity. Password material never leaves the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    /// Argon2 PHC string
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    #[serde(skip_serializing, default)]
    pub password_salt: String,
    /// Id of the only session whose bearer tokens are currently accepted
    #[serde(skip_serializing, default)]
    pub session_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub password_salt: String,
}

impl NewUser {
    pub fn into_user(self, id: Uuid) -> User {
        User {
            id,
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            password_salt: self.password_salt,
            session_token: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    pub fn opposite(self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

impl fmt::Display for VoteDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two voter sets carried by every votable entity.
///
/// A voter id appears in at most one of the two lists. Adapters that cannot
/// express the update as a single store-side statement apply it through
/// [`VoterSets::apply`] while holding the entity's lock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterSets {
    pub upvoters: Vec<Uuid>,
    pub downvoters: Vec<Uuid>,
}

impl VoterSets {
    /// Casts `voter`'s vote in `direction`, withdrawing any opposite vote.
    ///
    /// A repeated vote in the same direction is rejected with
    /// [`AppError::AlreadyVoted`] and leaves both sets untouched.
    pub fn apply(&mut self, voter: Uuid, direction: VoteDirection) -> Result<()> {
        let (target, opposite) = match direction {
            VoteDirection::Up => (&mut self.upvoters, &mut self.downvoters),
            VoteDirection::Down => (&mut self.downvoters, &mut self.upvoters),
        };
        if target.contains(&voter) {
            return Err(AppError::AlreadyVoted(format!(
                "user {voter} has already voted {direction}"
            )));
        }
        opposite.retain(|v| *v != voter);
        target.push(voter);
        Ok(())
    }

    pub fn summary_for(&self, viewer: Uuid) -> VoteSummary {
        VoteSummary {
            upvote_count: self.upvoters.len(),
            downvote_count: self.downvoters.len(),
            is_upvoted_by_user: self.upvoters.contains(&viewer),
            is_downvoted_by_user: self.downvoters.contains(&viewer),
        }
    }
}

/// Vote counts plus the viewer's own vote state, derived from [`VoterSets`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteSummary {
    pub upvote_count: usize,
    pub downvote_count: usize,
    pub is_upvoted_by_user: bool,
    pub is_downvoted_by_user: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteTarget {
    Post(Uuid),
    Comment(Uuid),
}

impl VoteTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Post(_) => "post",
            Self::Comment(_) => "comment",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    /// Opaque key handed out by `MediaStorage`
    pub media_key: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub votes: VoterSets,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub media_key: Option<String>,
    pub created_by: Uuid,
}

impl NewPost {
    pub fn into_post(self, id: Uuid) -> Post {
        Post {
            id,
            title: self.title,
            content: self.content,
            media_key: self.media_key,
            created_by: self.created_by,
            created_at: Utc::now(),
            votes: VoterSets::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostChanges {
    pub title: Option<String>,
    pub content: Option<String>,
}

impl PostChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none()
    }

    pub fn apply_to(self, post: &mut Post) {
        if let Some(title) = self.title {
            post.title = title;
        }
        if let Some(content) = self.content {
            post.content = content;
        }
    }
}

/// A post as returned to a particular viewer.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    /// Freshly signed, time-limited media URL; `null` without media
    pub signed_url: Option<String>,
    #[serde(flatten)]
    pub votes: VoteSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub body: String,
    pub post_id: Uuid,
    /// `None` for a root comment
    pub parent_id: Option<Uuid>,
    /// Direct replies, oldest first
    pub replies: Vec<Uuid>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub votes: VoterSets,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewComment {
    pub body: String,
    pub post_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub created_by: Uuid,
}

impl NewComment {
    pub fn into_comment(self, id: Uuid) -> Comment {
        Comment {
            id,
            body: self.body,
            post_id: self.post_id,
            parent_id: self.parent_id,
            replies: Vec::new(),
            created_by: self.created_by,
            created_at: Utc::now(),
            votes: VoterSets::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentChanges {
    pub body: Option<String>,
}

/// Which comments a listing starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentFilter {
    All,
    /// Root comments of a post
    RootsOf(Uuid),
    /// Direct replies of a comment
    ChildrenOf(Uuid),
}

/// A comment with its replies resolved down to a fixed depth.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommentTree {
    #[serde(flatten)]
    pub comment: Comment,
    #[serde(flatten)]
    pub votes: VoteSummary,
    /// Resolved replies; absent once the expansion depth is reached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replies_detailed: Option<Vec<CommentTree>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum VotedEntity {
    Post(Post),
    Comment(Comment),
}

impl VotedEntity {
    pub fn votes(&self) -> &VoterSets {
        match self {
            Self::Post(p) => &p.votes,
            Self::Comment(c) => &c.votes,
        }
    }
}

/// Outcome of a successful vote: the persisted entity and its fresh summary.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VoteResult {
    #[serde(flatten)]
    pub entity: VotedEntity,
    #[serde(flatten)]
    pub summary: VoteSummary,
}

impl VoteResult {
    pub fn new(entity: VotedEntity, voter: Uuid) -> Self {
        let summary = entity.votes().summary_for(voter);
        Self { entity, summary }
    }
}

/// Raw upload handed to `MediaStorage`.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaUpload {
    pub data: bytes::Bytes,
    pub content_type: mime::Mime,
}

/// Verified claims carried by a bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub user_id: Uuid,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

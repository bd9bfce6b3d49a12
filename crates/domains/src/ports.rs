//! # Ports
//!
//! Any adapter must implement these traits to be wired into the binary.
//! Stores are responsible for making vote updates and comment linkage atomic.

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::Result;
use crate::models::{
    Comment, CommentChanges, CommentFilter, IssuedToken, MediaUpload, NewComment, NewPost, NewUser, Post,
    PostChanges, TokenClaims, User, VoteDirection,
};

/// Identity persistence.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Fails with `Conflict` when the username or email is taken.
    async fn create(&self, user: NewUser) -> Result<User>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;
    /// Looks a user up by email or username.
    async fn find_by_login(&self, login: &str) -> Result<Option<User>>;
    async fn set_session_token(&self, id: Uuid, token: Option<String>) -> Result<()>;
}

/// Post persistence.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create(&self, post: NewPost) -> Result<Post>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Post>>;
    /// All posts, newest first, optionally filtered by a search term.
    async fn list(&self, search: Option<String>) -> Result<Vec<Post>>;
    async fn update(&self, id: Uuid, changes: PostChanges) -> Result<Option<Post>>;
    /// Returns the deleted post, if it existed.
    async fn delete(&self, id: Uuid) -> Result<Option<Post>>;
    /// Atomically casts a vote. `NotFound` / `AlreadyVoted` on rejection.
    async fn apply_vote(&self, id: Uuid, voter: Uuid, direction: VoteDirection) -> Result<Post>;
}

/// Comment persistence and reply linkage.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Creates the comment and, for a reply, links it into the parent in the
    /// same atomic step. `NotFound` if the parent is missing, `ValidationError`
    /// if it belongs to another post.
    async fn create(&self, comment: NewComment) -> Result<Comment>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Comment>>;
    /// Fetches the given ids, skipping missing ones, preserving input order.
    async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<Comment>>;
    /// Matching comments, oldest first.
    async fn list(&self, filter: CommentFilter) -> Result<Vec<Comment>>;
    async fn update(&self, id: Uuid, changes: CommentChanges) -> Result<Option<Comment>>;
    /// Deletes the comment and its descendants and unlinks it from its
    /// parent. Returns the number of comments removed (0 if missing).
    async fn delete(&self, id: Uuid) -> Result<usize>;
    /// Deletes every comment of a post. Returns the number removed.
    async fn delete_for_post(&self, post_id: Uuid) -> Result<usize>;
    /// Atomically casts a vote. `NotFound` / `AlreadyVoted` on rejection.
    async fn apply_vote(&self, id: Uuid, voter: Uuid, direction: VoteDirection) -> Result<Comment>;
}

/// Object storage for post attachments.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MediaStorage: Send + Sync {
    /// Stores the bytes and returns the opaque key to keep on the post.
    async fn upload(&self, upload: MediaUpload) -> Result<String>;
    /// Produces a fresh, time-limited retrieval URL for `key`.
    async fn signed_url(&self, key: &str) -> Result<String>;
    async fn remove(&self, key: &str) -> Result<()>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PasswordHasher: Send + Sync {
    /// Returns `(phc_hash, salt)`.
    async fn hash(&self, password: &str) -> Result<(String, String)>;
    async fn verify(&self, password: &str, phc_hash: &str) -> Result<bool>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait TokenService: Send + Sync {
    fn issue(&self, user_id: Uuid, session_id: &str) -> Result<IssuedToken>;
    /// `Unauthorized` for malformed, forged or expired tokens.
    fn verify(&self, token: &str) -> Result<TokenClaims>;
}

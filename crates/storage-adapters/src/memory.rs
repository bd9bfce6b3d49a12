//! # In-memory stores
//!
//! Process-local implementations of the repository ports, used by tests and
//! by `database.backend = "memory"`. Users and posts live in `DashMap`s so a
//! vote holds only its own entry's lock. Comments live in an append-only
//! arena behind one async `RwLock`, which makes child-create + parent-link
//! and subtree deletion a single critical section.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use domains::search::post_matches;
use domains::{
    AppError, Comment, CommentChanges, CommentFilter, CommentRepository, NewComment, NewPost, NewUser, Post,
    PostChanges, PostRepository, Result, User, UserRepository, VoteDirection,
};

// ── Users ───────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: DashMap<Uuid, User>,
    /// "u:<username>" / "e:<email>" -> user id; doubles as the uniqueness index
    logins: DashMap<String, Uuid>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves `key` for `id`; false if someone already holds it.
    fn reserve(&self, key: &str, id: Uuid) -> bool {
        match self.logins.entry(key.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(id);
                true
            }
        }
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: NewUser) -> Result<User> {
        let id = Uuid::new_v4();
        let username_key = format!("u:{}", user.username);
        let email_key = format!("e:{}", user.email.to_lowercase());

        if !self.reserve(&username_key, id) {
            return Err(AppError::Conflict("username is already taken".into()));
        }
        if !self.reserve(&email_key, id) {
            self.logins.remove(&username_key);
            return Err(AppError::Conflict("email is already registered".into()));
        }

        let user = user.into_user(id);
        self.users.insert(id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn find_by_login(&self, login: &str) -> Result<Option<User>> {
        let id = self
            .logins
            .get(&format!("e:{}", login.to_lowercase()))
            .or_else(|| self.logins.get(&format!("u:{login}")))
            .map(|id| *id);
        Ok(id.and_then(|id| self.users.get(&id).map(|u| u.clone())))
    }

    async fn set_session_token(&self, id: Uuid, token: Option<String>) -> Result<()> {
        let mut user = self.users.get_mut(&id).ok_or_else(|| AppError::not_found("User", id))?;
        user.session_token = token;
        Ok(())
    }
}

// ── Posts ───────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryPostRepository {
    posts: DashMap<Uuid, Post>,
}

impl InMemoryPostRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PostRepository for InMemoryPostRepository {
    async fn create(&self, post: NewPost) -> Result<Post> {
        let post = post.into_post(Uuid::new_v4());
        self.posts.insert(post.id, post.clone());
        Ok(post)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Post>> {
        Ok(self.posts.get(&id).map(|p| p.clone()))
    }

    async fn list(&self, search: Option<String>) -> Result<Vec<Post>> {
        let mut posts: Vec<Post> = self
            .posts
            .iter()
            .filter(|p| match search.as_deref() {
                Some(q) => post_matches(p.value(), q),
                None => true,
            })
            .map(|p| p.clone())
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(posts)
    }

    async fn update(&self, id: Uuid, changes: PostChanges) -> Result<Option<Post>> {
        Ok(self.posts.get_mut(&id).map(|mut post| {
            changes.apply_to(&mut post);
            post.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Post>> {
        Ok(self.posts.remove(&id).map(|(_, post)| post))
    }

    async fn apply_vote(&self, id: Uuid, voter: Uuid, direction: VoteDirection) -> Result<Post> {
        let mut post = self.posts.get_mut(&id).ok_or_else(|| AppError::not_found("Post", id))?;
        post.votes.apply(voter, direction)?;
        Ok(post.clone())
    }
}

// ── Comments ────────────────────────────────────────────────────────────────

/// One arena slot. `replies` are slot indices; the stored comment's own
/// `replies` field stays empty and is filled in on read.
struct Node {
    comment: Comment,
    parent: Option<usize>,
    replies: Vec<usize>,
}

#[derive(Default)]
struct CommentArena {
    /// Append-only; deleted slots become `None`.
    slots: Vec<Option<Node>>,
    index: HashMap<Uuid, usize>,
}

impl CommentArena {
    fn node(&self, at: usize) -> Option<&Node> {
        self.slots.get(at).and_then(Option::as_ref)
    }

    fn slot_of(&self, id: Uuid) -> Option<usize> {
        self.index.get(&id).copied()
    }

    fn materialize(&self, at: usize) -> Option<Comment> {
        let node = self.node(at)?;
        let mut comment = node.comment.clone();
        comment.replies = node
            .replies
            .iter()
            .filter_map(|&r| self.node(r).map(|n| n.comment.id))
            .collect();
        Some(comment)
    }

    fn get(&self, id: Uuid) -> Option<Comment> {
        self.slot_of(id).and_then(|at| self.materialize(at))
    }

    fn insert(&mut self, new: NewComment) -> Result<Comment> {
        let parent = match new.parent_id {
            Some(parent_id) => {
                let at = self
                    .slot_of(parent_id)
                    .ok_or_else(|| AppError::not_found("Comment", parent_id))?;
                let parent_post = self.node(at).map(|n| n.comment.post_id);
                if parent_post != Some(new.post_id) {
                    return Err(AppError::validation(format!(
                        "parent comment {parent_id} belongs to a different post"
                    )));
                }
                Some(at)
            }
            None => None,
        };

        let comment = new.into_comment(Uuid::new_v4());
        let at = self.slots.len();
        self.index.insert(comment.id, at);
        self.slots.push(Some(Node { comment: comment.clone(), parent, replies: Vec::new() }));
        if let Some(node) = parent.and_then(|p| self.slots[p].as_mut()) {
            node.replies.push(at);
        }
        Ok(comment)
    }

    /// Unlinks `at` from its parent and clears it and every descendant.
    fn remove_subtree(&mut self, at: usize) -> usize {
        if let Some(parent) = self.node(at).and_then(|n| n.parent) {
            if let Some(node) = self.slots[parent].as_mut() {
                node.replies.retain(|&r| r != at);
            }
        }

        let mut removed = 0;
        let mut stack = vec![at];
        while let Some(i) = stack.pop() {
            if let Some(node) = self.slots[i].take() {
                self.index.remove(&node.comment.id);
                stack.extend(node.replies);
                removed += 1;
            }
        }
        removed
    }

    fn matching(&self, filter: CommentFilter) -> Vec<Comment> {
        (0..self.slots.len())
            .filter(|&at| match (filter, self.node(at)) {
                (_, None) => false,
                (CommentFilter::All, Some(_)) => true,
                (CommentFilter::RootsOf(post), Some(n)) => n.comment.post_id == post && n.parent.is_none(),
                (CommentFilter::ChildrenOf(parent), Some(n)) => n.comment.parent_id == Some(parent),
            })
            .filter_map(|at| self.materialize(at))
            .collect()
    }
}

#[derive(Default)]
pub struct InMemoryCommentRepository {
    arena: RwLock<CommentArena>,
}

impl InMemoryCommentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CommentRepository for InMemoryCommentRepository {
    async fn create(&self, comment: NewComment) -> Result<Comment> {
        self.arena.write().await.insert(comment)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Comment>> {
        Ok(self.arena.read().await.get(id))
    }

    async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<Comment>> {
        let arena = self.arena.read().await;
        Ok(ids.iter().filter_map(|&id| arena.get(id)).collect())
    }

    async fn list(&self, filter: CommentFilter) -> Result<Vec<Comment>> {
        Ok(self.arena.read().await.matching(filter))
    }

    async fn update(&self, id: Uuid, changes: CommentChanges) -> Result<Option<Comment>> {
        let mut arena = self.arena.write().await;
        let Some(at) = arena.slot_of(id) else {
            return Ok(None);
        };
        if let (Some(body), Some(node)) = (changes.body, arena.slots[at].as_mut()) {
            node.comment.body = body;
        }
        Ok(arena.materialize(at))
    }

    async fn delete(&self, id: Uuid) -> Result<usize> {
        let mut arena = self.arena.write().await;
        Ok(match arena.slot_of(id) {
            Some(at) => arena.remove_subtree(at),
            None => 0,
        })
    }

    async fn delete_for_post(&self, post_id: Uuid) -> Result<usize> {
        let mut arena = self.arena.write().await;
        let roots: Vec<usize> = (0..arena.slots.len())
            .filter(|&at| {
                arena
                    .node(at)
                    .is_some_and(|n| n.comment.post_id == post_id && n.parent.is_none())
            })
            .collect();
        Ok(roots.into_iter().map(|at| arena.remove_subtree(at)).sum())
    }

    async fn apply_vote(&self, id: Uuid, voter: Uuid, direction: VoteDirection) -> Result<Comment> {
        let mut arena = self.arena.write().await;
        let at = arena.slot_of(id).ok_or_else(|| AppError::not_found("Comment", id))?;
        if let Some(node) = arena.slots[at].as_mut() {
            node.comment.votes.apply(voter, direction)?;
        }
        arena
            .materialize(at)
            .ok_or_else(|| AppError::not_found("Comment", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(name: &str) -> NewUser {
        NewUser {
            username: name.into(),
            email: format!("{name}@example.com"),
            password_hash: "phc".into(),
            password_salt: "salt".into(),
        }
    }

    fn new_comment(post_id: Uuid, parent_id: Option<Uuid>) -> NewComment {
        NewComment { body: "text".into(), post_id, parent_id, created_by: Uuid::new_v4() }
    }

    #[tokio::test]
    async fn users_are_unique_by_username_and_email() {
        let repo = InMemoryUserRepository::new();
        repo.create(new_user("ann")).await.unwrap();

        let dup_name = repo.create(new_user("ann")).await.unwrap_err();
        assert_eq!(dup_name, AppError::Conflict("username is already taken".into()));

        let mut other = new_user("bob");
        other.email = "ANN@example.com".into();
        let dup_email = repo.create(other).await.unwrap_err();
        assert_eq!(dup_email, AppError::Conflict("email is already registered".into()));

        // the failed attempt released its username reservation
        repo.create(new_user("bob")).await.unwrap();
    }

    #[tokio::test]
    async fn login_lookup_by_email_or_username() {
        let repo = InMemoryUserRepository::new();
        let user = repo.create(new_user("ann")).await.unwrap();
        assert_eq!(repo.find_by_login("ann").await.unwrap().map(|u| u.id), Some(user.id));
        assert_eq!(repo.find_by_login("Ann@Example.com").await.unwrap().map(|u| u.id), Some(user.id));
        assert!(repo.find_by_login("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn post_votes_are_exclusive_and_not_toggled() {
        let repo = InMemoryPostRepository::new();
        let post = repo
            .create(NewPost { title: "t".into(), content: "c".into(), media_key: None, created_by: Uuid::nil() })
            .await
            .unwrap();
        let voter = Uuid::new_v4();

        repo.apply_vote(post.id, voter, VoteDirection::Up).await.unwrap();
        let err = repo.apply_vote(post.id, voter, VoteDirection::Up).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyVoted(_)));

        let after = repo.apply_vote(post.id, voter, VoteDirection::Down).await.unwrap();
        assert!(after.votes.upvoters.is_empty());
        assert_eq!(after.votes.downvoters, vec![voter]);

        let missing = repo.apply_vote(Uuid::new_v4(), voter, VoteDirection::Up).await.unwrap_err();
        assert!(matches!(missing, AppError::NotFound(..)));
    }

    #[tokio::test]
    async fn concurrent_votes_are_not_lost() {
        let repo = std::sync::Arc::new(InMemoryPostRepository::new());
        let post = repo
            .create(NewPost { title: "t".into(), content: "c".into(), media_key: None, created_by: Uuid::nil() })
            .await
            .unwrap();
        let post_id = post.id;

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let repo = repo.clone();
                tokio::spawn(async move { repo.apply_vote(post_id, Uuid::new_v4(), VoteDirection::Up).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }
        let stored = repo.find_by_id(post_id).await.unwrap().unwrap();
        assert_eq!(stored.votes.upvoters.len(), 32);
    }

    #[tokio::test]
    async fn search_uses_fuzzy_match() {
        let repo = InMemoryPostRepository::new();
        for (title, content) in [("Rust tips", "ownership"), ("Gardening", "tomatoes")] {
            repo.create(NewPost { title: title.into(), content: content.into(), media_key: None, created_by: Uuid::nil() })
                .await
                .unwrap();
        }
        let hits = repo.list(Some("ownrship".into())).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Rust tips");
        assert_eq!(repo.list(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn reply_is_linked_into_parent() {
        let repo = InMemoryCommentRepository::new();
        let post = Uuid::new_v4();
        let root = repo.create(new_comment(post, None)).await.unwrap();
        let reply = repo.create(new_comment(post, Some(root.id))).await.unwrap();

        let parent = repo.find_by_id(root.id).await.unwrap().unwrap();
        assert_eq!(parent.replies, vec![reply.id]);
        assert_eq!(repo.list(CommentFilter::RootsOf(post)).await.unwrap().len(), 1);
        assert_eq!(repo.list(CommentFilter::ChildrenOf(root.id)).await.unwrap()[0].id, reply.id);
    }

    #[tokio::test]
    async fn reply_to_missing_or_foreign_parent_is_rejected() {
        let repo = InMemoryCommentRepository::new();
        let err = repo.create(new_comment(Uuid::new_v4(), Some(Uuid::new_v4()))).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(kind, _) if kind == "Comment"));

        let root = repo.create(new_comment(Uuid::new_v4(), None)).await.unwrap();
        let err = repo.create(new_comment(Uuid::new_v4(), Some(root.id))).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
        assert!(repo.find_by_id(root.id).await.unwrap().unwrap().replies.is_empty());
    }

    #[tokio::test]
    async fn delete_unlinks_and_cascades() {
        let repo = InMemoryCommentRepository::new();
        let post = Uuid::new_v4();
        let root = repo.create(new_comment(post, None)).await.unwrap();
        let keep = repo.create(new_comment(post, Some(root.id))).await.unwrap();
        let gone = repo.create(new_comment(post, Some(root.id))).await.unwrap();
        let gone_child = repo.create(new_comment(post, Some(gone.id))).await.unwrap();

        assert_eq!(repo.delete(gone.id).await.unwrap(), 2);
        assert_eq!(repo.find_by_id(root.id).await.unwrap().unwrap().replies, vec![keep.id]);
        assert!(repo.find_by_id(gone_child.id).await.unwrap().is_none());
        assert_eq!(repo.delete(gone.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_for_post_leaves_other_posts() {
        let repo = InMemoryCommentRepository::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let root = repo.create(new_comment(a, None)).await.unwrap();
        repo.create(new_comment(a, Some(root.id))).await.unwrap();
        repo.create(new_comment(b, None)).await.unwrap();

        assert_eq!(repo.delete_for_post(a).await.unwrap(), 2);
        assert_eq!(repo.list(CommentFilter::All).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn comment_votes_follow_post_rules() {
        let repo = InMemoryCommentRepository::new();
        let c = repo.create(new_comment(Uuid::new_v4(), None)).await.unwrap();
        let voter = Uuid::new_v4();
        repo.apply_vote(c.id, voter, VoteDirection::Down).await.unwrap();
        let after = repo.apply_vote(c.id, voter, VoteDirection::Up).await.unwrap();
        assert_eq!(after.votes.upvoters, vec![voter]);
        assert!(after.votes.downvoters.is_empty());
    }
}

//! Postgres store tests against a throwaway container.
//!
//! Run with `cargo test -p storage-adapters --features db-postgres -- --ignored`
//! on a machine with a Docker daemon.

use std::sync::Arc;

use sqlx::PgPool;
use testcontainers_modules::postgres::Postgres;
use testcontainers_modules::testcontainers::runners::AsyncRunner;
use testcontainers_modules::testcontainers::ContainerAsync;
use uuid::Uuid;

use domains::{
    AppError, CommentFilter, CommentRepository, NewComment, NewPost, NewUser, PostRepository, UserRepository,
    VoteDirection,
};
use storage_adapters::postgres::{
    connect, migrate, PostgresCommentRepository, PostgresPostRepository, PostgresUserRepository,
};
use storage_adapters::InMemoryPostRepository;

/// The container must outlive the pool, so both are handed back.
async fn database() -> (ContainerAsync<Postgres>, PgPool) {
    let container = Postgres::default().start().await.unwrap();
    let host = container.get_host().await.unwrap();
    let port = container.get_host_port_ipv4(5432).await.unwrap();
    let pool = connect(&format!("postgres://postgres:postgres@{host}:{port}/postgres"), 8)
        .await
        .unwrap();
    migrate(&pool).await.unwrap();
    (container, pool)
}

fn new_user(name: &str) -> NewUser {
    NewUser {
        username: name.into(),
        email: format!("{name}@example.com"),
        password_hash: "hash".into(),
        password_salt: "salt".into(),
    }
}

async fn author(pool: &PgPool, name: &str) -> Uuid {
    PostgresUserRepository::new(pool.clone()).create(new_user(name)).await.unwrap().id
}

fn new_post(title: &str, content: &str, created_by: Uuid) -> NewPost {
    NewPost { title: title.into(), content: content.into(), media_key: None, created_by }
}

fn new_comment(post_id: Uuid, parent_id: Option<Uuid>, created_by: Uuid) -> NewComment {
    NewComment { body: "text".into(), post_id, parent_id, created_by }
}

#[tokio::test]
#[ignore = "needs a docker daemon"]
async fn duplicate_username_is_a_conflict() {
    let (_db, pool) = database().await;
    let users = PostgresUserRepository::new(pool);
    users.create(new_user("ann")).await.unwrap();

    let err = users.create(new_user("ann")).await.unwrap_err();
    assert_eq!(err, AppError::Conflict("username is already taken".into()));
    assert!(users.find_by_login("ANN@example.com").await.unwrap().is_some());
}

#[tokio::test]
#[ignore = "needs a docker daemon"]
async fn post_votes_are_exclusive_and_not_toggled() {
    let (_db, pool) = database().await;
    let ann = author(&pool, "ann").await;
    let posts = PostgresPostRepository::new(pool);
    let post = posts.create(new_post("t", "c", ann)).await.unwrap();
    let voter = Uuid::new_v4();

    posts.apply_vote(post.id, voter, VoteDirection::Up).await.unwrap();
    let err = posts.apply_vote(post.id, voter, VoteDirection::Up).await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyVoted(_)));

    let after = posts.apply_vote(post.id, voter, VoteDirection::Down).await.unwrap();
    assert!(after.votes.upvoters.is_empty());
    assert_eq!(after.votes.downvoters, vec![voter]);

    let missing = posts.apply_vote(Uuid::new_v4(), voter, VoteDirection::Up).await.unwrap_err();
    assert!(matches!(missing, AppError::NotFound(kind, _) if kind == "Post"));
}

#[tokio::test]
#[ignore = "needs a docker daemon"]
async fn concurrent_votes_are_all_counted() {
    let (_db, pool) = database().await;
    let ann = author(&pool, "ann").await;
    let posts = Arc::new(PostgresPostRepository::new(pool));
    let post_id = posts.create(new_post("t", "c", ann)).await.unwrap().id;

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let posts = posts.clone();
            tokio::spawn(async move { posts.apply_vote(post_id, Uuid::new_v4(), VoteDirection::Up).await })
        })
        .collect();
    for h in handles {
        h.await.unwrap().unwrap();
    }
    let stored = posts.find_by_id(post_id).await.unwrap().unwrap();
    assert_eq!(stored.votes.upvoters.len(), 32);
}

#[tokio::test]
#[ignore = "needs a docker daemon"]
async fn comment_votes_reject_repeats() {
    let (_db, pool) = database().await;
    let ann = author(&pool, "ann").await;
    let post = PostgresPostRepository::new(pool.clone()).create(new_post("t", "c", ann)).await.unwrap();
    let comments = PostgresCommentRepository::new(pool);
    let comment = comments.create(new_comment(post.id, None, ann)).await.unwrap();
    let voter = Uuid::new_v4();

    let voted = comments.apply_vote(comment.id, voter, VoteDirection::Down).await.unwrap();
    assert_eq!(voted.votes.downvoters, vec![voter]);
    let err = comments.apply_vote(comment.id, voter, VoteDirection::Down).await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyVoted(_)));

    let missing = comments.apply_vote(Uuid::new_v4(), voter, VoteDirection::Up).await.unwrap_err();
    assert!(matches!(missing, AppError::NotFound(kind, _) if kind == "Comment"));
}

#[tokio::test]
#[ignore = "needs a docker daemon"]
async fn deleting_a_reply_removes_its_subtree_and_unlinks_it() {
    let (_db, pool) = database().await;
    let ann = author(&pool, "ann").await;
    let post = PostgresPostRepository::new(pool.clone()).create(new_post("t", "c", ann)).await.unwrap();
    let comments = PostgresCommentRepository::new(pool);

    let root = comments.create(new_comment(post.id, None, ann)).await.unwrap();
    let a = comments.create(new_comment(post.id, Some(root.id), ann)).await.unwrap();
    let b = comments.create(new_comment(post.id, Some(root.id), ann)).await.unwrap();
    comments.create(new_comment(post.id, Some(a.id), ann)).await.unwrap();

    let linked = comments.find_by_id(root.id).await.unwrap().unwrap();
    assert_eq!(linked.replies, vec![a.id, b.id]);

    // find_many keeps the order of the requested ids
    let many = comments.find_many(&[b.id, root.id, a.id]).await.unwrap();
    assert_eq!(many.iter().map(|c| c.id).collect::<Vec<_>>(), vec![b.id, root.id, a.id]);

    assert_eq!(comments.delete(a.id).await.unwrap(), 2);
    let root = comments.find_by_id(root.id).await.unwrap().unwrap();
    assert_eq!(root.replies, vec![b.id]);
    assert_eq!(comments.list(CommentFilter::ChildrenOf(root.id)).await.unwrap().len(), 1);
    assert_eq!(comments.delete(a.id).await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "needs a docker daemon"]
async fn reply_parent_must_exist_on_the_same_post() {
    let (_db, pool) = database().await;
    let ann = author(&pool, "ann").await;
    let posts = PostgresPostRepository::new(pool.clone());
    let first = posts.create(new_post("one", "c", ann)).await.unwrap();
    let second = posts.create(new_post("two", "c", ann)).await.unwrap();
    let comments = PostgresCommentRepository::new(pool);
    let root = comments.create(new_comment(first.id, None, ann)).await.unwrap();

    let foreign = comments.create(new_comment(second.id, Some(root.id), ann)).await.unwrap_err();
    assert!(matches!(foreign, AppError::ValidationError(_)));

    let missing = comments.create(new_comment(first.id, Some(Uuid::new_v4()), ann)).await.unwrap_err();
    assert!(matches!(missing, AppError::NotFound(kind, _) if kind == "Comment"));

    assert_eq!(comments.list(CommentFilter::RootsOf(first.id)).await.unwrap().len(), 1);
    assert!(comments.list(CommentFilter::RootsOf(second.id)).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "needs a docker daemon"]
async fn search_agrees_with_the_in_memory_store() {
    let (_db, pool) = database().await;
    let ann = author(&pool, "ann").await;
    let postgres = PostgresPostRepository::new(pool);
    let memory = InMemoryPostRepository::new();
    for (title, content) in [("Rust tips", "ownership"), ("Gardening", "tomatoes")] {
        postgres.create(new_post(title, content, ann)).await.unwrap();
        memory.create(new_post(title, content, ann)).await.unwrap();
    }

    for query in ["ownrship", "gardning", "!!!", "tomatos", "rust tips", "python"] {
        let mut from_db: Vec<String> =
            postgres.list(Some(query.into())).await.unwrap().into_iter().map(|p| p.title).collect();
        let mut from_memory: Vec<String> =
            memory.list(Some(query.into())).await.unwrap().into_iter().map(|p| p.title).collect();
        from_db.sort();
        from_memory.sort();
        assert_eq!(from_db, from_memory, "query {query:?}");
    }
    assert_eq!(postgres.list(Some("ownrship".into())).await.unwrap()[0].title, "Rust tips");
    assert_eq!(postgres.list(Some("!!!".into())).await.unwrap().len(), 2);
}

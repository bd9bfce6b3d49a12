//! Fills a Postgres database with a demo user, a post and a short comment
//! thread. Safe to run repeatedly: the demo user is reused when it exists.

use anyhow::Context;
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use auth_adapters::{Argon2PasswordHasher, JwtTokenService};
use configs::Settings;
use domains::{AppError, CommentRepository, PostRepository, UserRepository, VoteDirection, VoteTarget};
use services::{AuthService, CommentService, CreateComment, CreatePost, PostService, Registration, VoteService};
use storage_adapters::media::LocalMediaStorage;
use storage_adapters::postgres::{
    connect, migrate, PostgresCommentRepository, PostgresPostRepository, PostgresUserRepository,
};

const DEMO_USER: &str = "demo";
const DEMO_PASSWORD: &str = "demo-password";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading configuration")?;
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(&settings.log.level)).init();

    let url = settings.database.url.as_ref().context("seeding needs database.url")?;
    let pool = connect(url.expose_secret(), 2).await?;
    migrate(&pool).await?;

    let users: Arc<dyn UserRepository> = Arc::new(PostgresUserRepository::new(pool.clone()));
    let posts: Arc<dyn PostRepository> = Arc::new(PostgresPostRepository::new(pool.clone()));
    let comments: Arc<dyn CommentRepository> = Arc::new(PostgresCommentRepository::new(pool));
    let signing_key = settings.media.local.signing_key.as_ref().context("media.local.signing_key is not set")?;
    let media = Arc::new(LocalMediaStorage::new(
        settings.media.local.root.clone(),
        &settings.media.local.public_base_url,
        signing_key.expose_secret().as_bytes(),
        Duration::from_secs(settings.media.url_ttl_secs),
    ));

    let tokens = JwtTokenService::new(&settings.auth.jwt_secret, Duration::from_secs(settings.auth.token_ttl_secs))?;
    let auth = AuthService::new(users.clone(), Arc::new(Argon2PasswordHasher::new()), Arc::new(tokens));
    let registration = Registration {
        username: DEMO_USER.into(),
        email: format!("{DEMO_USER}@agora.local"),
        password: DEMO_PASSWORD.into(),
    };
    let author = match auth.register(registration).await {
        Ok(user) => user,
        Err(AppError::Conflict(_)) => users
            .find_by_login(DEMO_USER)
            .await?
            .context("demo user exists but could not be loaded")?,
        Err(err) => return Err(err.into()),
    };

    let post_service = PostService::new(posts.clone(), comments.clone(), media);
    let comment_service = CommentService::new(comments.clone(), posts.clone());
    let votes = VoteService::new(posts, comments);

    let post = post_service
        .create(
            author.id,
            CreatePost {
                title: "Welcome to Agora".into(),
                content: "Say hello below. Replies nest two levels deep when read.".into(),
                media: None,
            },
        )
        .await?;
    let root = comment_service
        .create(author.id, CreateComment { body: "First!".into(), post_id: post.post.id, parent_id: None })
        .await?;
    let reply = comment_service
        .create(
            author.id,
            CreateComment {
                body: "A reply to the first comment".into(),
                post_id: post.post.id,
                parent_id: Some(root.comment.id),
            },
        )
        .await?;
    comment_service
        .create(
            author.id,
            CreateComment {
                body: "And a reply to that".into(),
                post_id: post.post.id,
                parent_id: Some(reply.comment.id),
            },
        )
        .await?;
    votes.apply_vote(VoteTarget::Post(post.post.id), author.id, VoteDirection::Up).await?;

    info!(user = DEMO_USER, post_id = %post.post.id, "seeded demo content");
    Ok(())
}

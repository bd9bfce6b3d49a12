//! # Agora server
//!
//! Assembles the application from the adapters selected at compile time and
//! the backends chosen in configuration.

#[cfg(not(all(feature = "web-axum", feature = "auth-jwt")))]
compile_error!("the agora server needs the `web-axum` and `auth-jwt` features");

use anyhow::{bail, Context};
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use api_adapters::web::{router, AppState};
use auth_adapters::{Argon2PasswordHasher, JwtTokenService};
use configs::{DatabaseBackend, DatabaseSettings, LogSettings, MediaBackend, MediaSettings, Settings};
use domains::{CommentRepository, MediaStorage, PostRepository, UserRepository};
use services::{AuthService, CommentService, PostService, VoteService};
use storage_adapters::media::LocalMediaStorage;
use storage_adapters::{InMemoryCommentRepository, InMemoryPostRepository, InMemoryUserRepository};

type Repositories = (Arc<dyn UserRepository>, Arc<dyn PostRepository>, Arc<dyn CommentRepository>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading configuration")?;
    init_tracing(&settings.log);

    #[cfg(feature = "media-s3")]
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("a rustls crypto provider was already installed");
    }

    let (users, posts, comments) = repositories(&settings.database).await?;
    let (media, local_media) = media_storage(&settings.media).await?;
    let tokens = JwtTokenService::new(&settings.auth.jwt_secret, Duration::from_secs(settings.auth.token_ttl_secs))?;

    let auth = AuthService::new(users, Arc::new(Argon2PasswordHasher::new()), Arc::new(tokens));
    let mut state = AppState::new(
        Arc::new(auth),
        Arc::new(PostService::new(posts.clone(), comments.clone(), media)),
        Arc::new(CommentService::new(comments.clone(), posts.clone())),
        Arc::new(VoteService::new(posts, comments)),
    );
    if let Some(local) = local_media {
        state = state.with_local_media(local);
    }
    let app = router(state, settings.server.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(settings.server.bind_addr())
        .await
        .with_context(|| format!("binding {}", settings.server.bind_addr()))?;
    info!(addr = %listener.local_addr()?, database = ?settings.database.backend, media = ?settings.media.backend, "agora listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    info!("agora stopped");
    Ok(())
}

fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn repositories(database: &DatabaseSettings) -> anyhow::Result<Repositories> {
    match database.backend {
        DatabaseBackend::Memory => {
            warn!("using in-memory storage; data is lost on restart");
            let users: Arc<dyn UserRepository> = Arc::new(InMemoryUserRepository::new());
            let posts: Arc<dyn PostRepository> = Arc::new(InMemoryPostRepository::new());
            let comments: Arc<dyn CommentRepository> = Arc::new(InMemoryCommentRepository::new());
            Ok((users, posts, comments))
        }
        #[cfg(feature = "db-postgres")]
        DatabaseBackend::Postgres => {
            use storage_adapters::postgres::{
                connect, migrate, PostgresCommentRepository, PostgresPostRepository, PostgresUserRepository,
            };

            let url = database.url.as_ref().context("database.url is not set")?;
            let pool = connect(url.expose_secret(), database.max_connections).await?;
            migrate(&pool).await?;
            info!(max_connections = database.max_connections, "postgres ready");
            let users: Arc<dyn UserRepository> = Arc::new(PostgresUserRepository::new(pool.clone()));
            let posts: Arc<dyn PostRepository> = Arc::new(PostgresPostRepository::new(pool.clone()));
            let comments: Arc<dyn CommentRepository> = Arc::new(PostgresCommentRepository::new(pool));
            Ok((users, posts, comments))
        }
        #[cfg(not(feature = "db-postgres"))]
        DatabaseBackend::Postgres => bail!("this build does not include the `db-postgres` feature"),
    }
}

async fn media_storage(
    media: &MediaSettings,
) -> anyhow::Result<(Arc<dyn MediaStorage>, Option<Arc<LocalMediaStorage>>)> {
    let url_ttl = Duration::from_secs(media.url_ttl_secs);
    match media.backend {
        MediaBackend::Local => {
            let Some(signing_key) = media.local.signing_key.as_ref() else {
                bail!("media.local.signing_key is not set");
            };
            let local = Arc::new(LocalMediaStorage::new(
                media.local.root.clone(),
                &media.local.public_base_url,
                signing_key.expose_secret().as_bytes(),
                url_ttl,
            ));
            info!(root = %media.local.root.display(), "serving media from local disk");
            let shared: Arc<dyn MediaStorage> = local.clone();
            Ok((shared, Some(local)))
        }
        #[cfg(feature = "media-s3")]
        MediaBackend::S3 => {
            let s3 = media.s3.as_ref().context("media.s3 is not configured")?;
            let storage: Arc<dyn MediaStorage> = Arc::new(
                storage_adapters::media::S3MediaStorage::from_env(s3.bucket.clone(), s3.region.clone(), url_ttl).await,
            );
            info!(bucket = %s3.bucket, "serving media from s3");
            Ok((storage, None))
        }
        #[cfg(not(feature = "media-s3"))]
        MediaBackend::S3 => bail!("this build does not include the `media-s3` feature"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

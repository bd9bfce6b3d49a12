//! Shared harness for the HTTP-level tests: the full router over in-memory
//! repositories, Argon2, JWT and local media in a scratch directory.

#![cfg(feature = "web-axum")]

use api_adapters::web::{router, AppState};
use auth_adapters::{Argon2PasswordHasher, JwtTokenService};
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use secrecy::SecretString;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

use domains::{CommentRepository, PostRepository};
use services::{AuthService, CommentService, PostService, VoteService};
use storage_adapters::media::LocalMediaStorage;
use storage_adapters::{InMemoryCommentRepository, InMemoryPostRepository, InMemoryUserRepository};

pub const PUBLIC_BASE_URL: &str = "http://agora.test";
pub const MAX_UPLOAD_BYTES: usize = 1024 * 1024;

pub struct TestApp {
    pub router: Router,
    pub media_root: PathBuf,
}

pub struct Response {
    pub status: StatusCode,
    pub body: Value,
}

impl TestApp {
    pub fn new() -> Self {
        let media_root = std::env::temp_dir().join(format!("agora-it-{}", Uuid::new_v4()));
        let media = Arc::new(LocalMediaStorage::new(
            media_root.clone(),
            PUBLIC_BASE_URL,
            b"integration-signing-key",
            Duration::from_secs(300),
        ));
        let tokens = JwtTokenService::new(&SecretString::from("integration-secret"), Duration::from_secs(3600))
            .expect("jwt service");

        let posts: Arc<dyn PostRepository> = Arc::new(InMemoryPostRepository::new());
        let comments: Arc<dyn CommentRepository> = Arc::new(InMemoryCommentRepository::new());
        let auth = AuthService::new(
            Arc::new(InMemoryUserRepository::new()),
            Arc::new(Argon2PasswordHasher::new()),
            Arc::new(tokens),
        );
        let state = AppState::new(
            Arc::new(auth),
            Arc::new(PostService::new(posts.clone(), comments.clone(), media.clone())),
            Arc::new(CommentService::new(comments.clone(), posts.clone())),
            Arc::new(VoteService::new(posts, comments)),
        )
        .with_local_media(media);

        Self { router: router(state, MAX_UPLOAD_BYTES), media_root }
    }

    pub async fn raw(&self, request: Request<Body>) -> axum::response::Response {
        self.router.clone().oneshot(request).await.expect("router is infallible")
    }

    pub async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");
        read(self.raw(request).await).await
    }

    pub async fn get(&self, uri: &str, token: &str) -> Response {
        self.send(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> Response {
        self.send(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: Option<Value>) -> Response {
        self.send(Method::PUT, uri, Some(token), body).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> Response {
        self.send(Method::DELETE, uri, Some(token), None).await
    }

    /// Registers `name` with a fixed password and logs in; returns the token
    /// and the user id.
    pub async fn sign_up(&self, name: &str) -> (String, String) {
        let registered = self
            .send(
                Method::POST,
                "/auth/register",
                None,
                Some(serde_json::json!({
                    "username": name,
                    "email": format!("{name}@example.com"),
                    "password": "password123",
                })),
            )
            .await;
        assert_eq!(registered.status, StatusCode::OK, "{}", registered.body);

        let session = self.login(name, "password123").await;
        assert_eq!(session.status, StatusCode::OK, "{}", session.body);
        (
            session.body["data"]["token"].as_str().expect("token").to_owned(),
            registered.body["data"]["id"].as_str().expect("id").to_owned(),
        )
    }

    pub async fn login(&self, username: &str, password: &str) -> Response {
        self.send(
            Method::POST,
            "/auth/login",
            None,
            Some(serde_json::json!({ "username": username, "password": password })),
        )
        .await
    }

    pub async fn create_post(&self, token: &str, title: &str, content: &str) -> String {
        let created = self.post("/posts", token, serde_json::json!({ "title": title, "content": content })).await;
        assert_eq!(created.status, StatusCode::OK, "{}", created.body);
        created.body["data"]["id"].as_str().expect("post id").to_owned()
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.media_root);
    }
}

pub async fn read(response: axum::response::Response) -> Response {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), 4 * MAX_UPLOAD_BYTES).await.expect("read body");
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).expect("json body") };
    Response { status, body }
}

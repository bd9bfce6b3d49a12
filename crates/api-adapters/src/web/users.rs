use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use domains::{AppError, User};
use services::{Credentials, Registration, Session};

use super::extract::JsonBody;
use super::{AppState, Reply};
use crate::Envelope;

#[derive(Debug, Deserialize)]
pub(super) struct RegisterBody {
    #[serde(default)]
    username: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct LoginBody {
    email: Option<String>,
    username: Option<String>,
    #[serde(default)]
    password: String,
}

pub(super) async fn register(State(state): State<AppState>, JsonBody(body): JsonBody<RegisterBody>) -> Reply<User> {
    let input = Registration { username: body.username, email: body.email, password: body.password };
    Ok(Json(Envelope::ok(state.auth.register(input).await?)))
}

pub(super) async fn login(State(state): State<AppState>, JsonBody(body): JsonBody<LoginBody>) -> Reply<Session> {
    let login = body
        .email
        .or(body.username)
        .ok_or_else(|| AppError::validation("email or username is required"))?;
    let session = state.auth.login(Credentials { login, password: body.password }).await?;
    Ok(Json(Envelope::ok(session)))
}

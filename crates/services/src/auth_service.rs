//! Registration, login and bearer-token authentication.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use domains::{AppError, NewUser, PasswordHasher, Result, TokenService, User, UserRepository};

use crate::required;

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// `login` is either the email or the username.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

pub struct AuthService {
    users: Arc<dyn UserRepository>,
    hasher: Arc<dyn PasswordHasher>,
    tokens: Arc<dyn TokenService>,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepository>, hasher: Arc<dyn PasswordHasher>, tokens: Arc<dyn TokenService>) -> Self {
        Self { users, hasher, tokens }
    }

    #[instrument(skip_all, fields(username = %input.username))]
    pub async fn register(&self, input: Registration) -> Result<User> {
        let username = required("username", &input.username)?;
        let email = required("email", &input.email)?.to_lowercase();
        if input.password.is_empty() {
            return Err(AppError::validation("password is required"));
        }
        if !looks_like_email(&email) {
            return Err(AppError::validation("email is not a valid address"));
        }
        if input.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let (password_hash, password_salt) = self.hasher.hash(&input.password).await?;
        let user = self
            .users
            .create(NewUser { username, email, password_hash, password_salt })
            .await?;
        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// Verifies the password and opens a new session, superseding older ones.
    #[instrument(skip_all, fields(login = %input.login))]
    pub async fn login(&self, input: Credentials) -> Result<Session> {
        let login = required("email or username", &input.login)?;
        if input.password.is_empty() {
            return Err(AppError::validation("password is required"));
        }

        let invalid = || AppError::Unauthorized("invalid credentials".into());
        let Some(user) = self.users.find_by_login(&login).await? else {
            warn!("login for unknown user");
            return Err(invalid());
        };
        if !self.hasher.verify(&input.password, &user.password_hash).await? {
            warn!(user_id = %user.id, "login with wrong password");
            return Err(invalid());
        }

        let session_id = Uuid::new_v4().to_string();
        self.users.set_session_token(user.id, Some(session_id.clone())).await?;
        let issued = self.tokens.issue(user.id, &session_id)?;
        info!(user_id = %user.id, "session opened");

        Ok(Session {
            token: issued.token,
            expires_at: issued.expires_at,
            user: User { session_token: Some(session_id), ..user },
        })
    }

    /// Resolves a bearer token to its user.
    pub async fn authenticate(&self, token: &str) -> Result<User> {
        let claims = self.tokens.verify(token)?;
        let user = self
            .users
            .find_by_id(claims.user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized("token user does not exist".into()))?;
        if user.session_token.as_deref() != Some(claims.session_id.as_str()) {
            return Err(AppError::Unauthorized("session has been superseded".into()));
        }
        Ok(user)
    }
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}

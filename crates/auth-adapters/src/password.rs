use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use tokio::task;

use domains::{AppError, PasswordHasher, Result};

/// Argon2id with the crate's default parameters. Hashing runs on the
/// blocking pool so request workers are not stalled.
#[derive(Debug, Clone, Default)]
pub struct Argon2PasswordHasher;

impl Argon2PasswordHasher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PasswordHasher for Argon2PasswordHasher {
    async fn hash(&self, password: &str) -> Result<(String, String)> {
        let password = password.to_owned();
        task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            let phc = Argon2::default()
                .hash_password(password.as_bytes(), &salt)
                .map_err(AppError::upstream)?
                .to_string();
            Ok((phc, salt.as_str().to_owned()))
        })
        .await
        .map_err(AppError::upstream)?
    }

    async fn verify(&self, password: &str, phc_hash: &str) -> Result<bool> {
        let password = password.to_owned();
        let phc_hash = phc_hash.to_owned();
        task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&phc_hash).map_err(AppError::upstream)?;
            match Argon2::default().verify_password(password.as_bytes(), &parsed) {
                Ok(()) => Ok(true),
                Err(argon2::password_hash::Error::Password) => Ok(false),
                Err(err) => Err(AppError::upstream(err)),
            }
        })
        .await
        .map_err(AppError::upstream)?
    }
}

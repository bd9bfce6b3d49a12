//! HS256 bearer tokens carrying the user id and the login session id.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use domains::{AppError, IssuedToken, Result, TokenClaims, TokenService};

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: Uuid,
    sid: String,
    iat: i64,
    exp: i64,
}

pub struct JwtTokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl JwtTokenService {
    pub fn new(secret: &SecretString, ttl: std::time::Duration) -> Result<Self> {
        let secret = secret.expose_secret().as_bytes();
        if secret.is_empty() {
            return Err(AppError::validation("jwt secret must not be empty"));
        }
        let ttl = Duration::from_std(ttl).map_err(|err| AppError::validation(err.to_string()))?;
        expiry(ttl)?;
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl,
        })
    }
}

fn expiry(ttl: Duration) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let now = Utc::now();
    let expires_at = now
        .checked_add_signed(ttl)
        .ok_or_else(|| AppError::validation("token ttl is out of range"))?;
    Ok((now, expires_at))
}

impl TokenService for JwtTokenService {
    fn issue(&self, user_id: Uuid, session_id: &str) -> Result<IssuedToken> {
        let (now, expires_at) = expiry(self.ttl)?;
        let claims = Claims {
            sub: user_id,
            sid: session_id.to_owned(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(AppError::upstream)?;
        Ok(IssuedToken { token, expires_at })
    }

    fn verify(&self, token: &str) -> Result<TokenClaims> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|err| {
            debug!(error = %err, "rejected bearer token");
            AppError::Unauthorized("invalid or expired token".into())
        })?;
        Ok(TokenClaims { user_id: data.claims.sub, session_id: data.claims.sid })
    }
}

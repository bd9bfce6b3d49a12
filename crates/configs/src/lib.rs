//! Runtime settings.
//!
//! Layering, lowest precedence first:
//! 1. built-in defaults
//! 2. `config/default.toml`
//! 3. `config/{AGORA_ENV}.toml`
//! 4. `AGORA__SECTION__KEY` environment variables (`.env` is loaded first)

use config::{Config, ConfigBuilder, Environment, File};
use config::builder::DefaultState;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::debug;

pub const ENV_PREFIX: &str = "AGORA";
pub const ENV_SEPARATOR: &str = "__";
/// Upper bound for `auth.token_ttl_secs` (one year).
pub const MAX_TOKEN_TTL_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub log: LogSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub media: MediaSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Request body cap, which also bounds multipart uploads.
    pub max_upload_bytes: usize,
}

impl ServerSettings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    /// An `EnvFilter` directive such as `info` or `agora=debug,sqlx=warn`.
    pub level: String,
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub backend: DatabaseBackend,
    pub url: Option<SecretString>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    pub jwt_secret: SecretString,
    pub token_ttl_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaBackend {
    Local,
    S3,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaSettings {
    pub backend: MediaBackend,
    pub url_ttl_secs: u64,
    pub local: LocalMediaSettings,
    #[serde(default)]
    pub s3: Option<S3MediaSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalMediaSettings {
    pub root: PathBuf,
    pub public_base_url: String,
    pub signing_key: Option<SecretString>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3MediaSettings {
    pub bucket: String,
    #[serde(default)]
    pub region: Option<String>,
}

impl Settings {
    /// Loads `.env`, the config files and the environment.
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        let env = std::env::var("AGORA_ENV").unwrap_or_else(|_| "development".into());
        let builder = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{env}")).required(false))
            .add_source(Self::environment());
        Self::from_config(builder.build()?)
    }

    pub fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        Ok(Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.max_upload_bytes", 10 * 1024 * 1024)?
            .set_default("log.level", "info")?
            .set_default("log.json", false)?
            .set_default("database.backend", "memory")?
            .set_default("database.max_connections", 10)?
            .set_default("auth.token_ttl_secs", 24 * 60 * 60)?
            .set_default("media.backend", "local")?
            .set_default("media.url_ttl_secs", 3600)?
            .set_default("media.local.root", "./data/media")?
            .set_default("media.local.public_base_url", "http://localhost:8080")?)
    }

    pub fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
    }

    /// Deserializes and cross-checks a built configuration.
    pub fn from_config(config: Config) -> Result<Self> {
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.expose_secret().is_empty() {
            return Err(ConfigError::Invalid("auth.jwt_secret must not be empty".into()));
        }
        if self.auth.token_ttl_secs == 0 || self.auth.token_ttl_secs > MAX_TOKEN_TTL_SECS {
            return Err(ConfigError::Invalid(format!(
                "auth.token_ttl_secs must be between 1 and {MAX_TOKEN_TTL_SECS}"
            )));
        }
        if self.database.backend == DatabaseBackend::Postgres && self.database.url.is_none() {
            return Err(ConfigError::Invalid("database.url is required for the postgres backend".into()));
        }
        match self.media.backend {
            MediaBackend::Local if self.media.local.signing_key.is_none() => {
                Err(ConfigError::Invalid("media.local.signing_key is required for local media".into()))
            }
            MediaBackend::S3 if self.media.s3.is_none() => {
                Err(ConfigError::Invalid("media.s3.bucket is required for s3 media".into()))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;
    use std::collections::HashMap;

    fn build(toml: &str, env: &[(&str, &str)]) -> Result<Settings> {
        let vars: HashMap<String, String> = env.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        let config = Settings::defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .add_source(Settings::environment().source(Some(vars)))
            .build()?;
        Settings::from_config(config)
    }

    const MINIMAL: &str = r#"
        [auth]
        jwt_secret = "secret"
        [media.local]
        signing_key = "media-secret"
    "#;

    #[test]
    fn defaults_fill_the_gaps() {
        let settings = build(MINIMAL, &[]).unwrap();
        assert_eq!(settings.server.bind_addr(), "0.0.0.0:8080");
        assert_eq!(settings.database.backend, DatabaseBackend::Memory);
        assert_eq!(settings.media.backend, MediaBackend::Local);
        assert_eq!(settings.media.url_ttl_secs, 3600);
        assert!(!settings.log.json);
    }

    #[test]
    fn environment_overrides_files() {
        let settings = build(
            MINIMAL,
            &[("AGORA__SERVER__PORT", "9090"), ("AGORA__LOG__JSON", "true"), ("AGORA__AUTH__JWT_SECRET", "from-env")],
        )
        .unwrap();
        assert_eq!(settings.server.port, 9090);
        assert!(settings.log.json);
        assert_eq!(settings.auth.jwt_secret.expose_secret(), "from-env");
    }

    #[test]
    fn postgres_requires_a_url() {
        let err = build(MINIMAL, &[("AGORA__DATABASE__BACKEND", "postgres")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("database.url")));

        let ok = build(
            MINIMAL,
            &[("AGORA__DATABASE__BACKEND", "postgres"), ("AGORA__DATABASE__URL", "postgres://localhost/agora")],
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn s3_requires_a_bucket() {
        let err = build(MINIMAL, &[("AGORA__MEDIA__BACKEND", "s3")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let settings = build(MINIMAL, &[("AGORA__MEDIA__BACKEND", "s3"), ("AGORA__MEDIA__S3__BUCKET", "uploads")]).unwrap();
        assert_eq!(settings.media.s3.unwrap().bucket, "uploads");
    }

    #[test]
    fn token_ttl_is_bounded() {
        let err = build(MINIMAL, &[("AGORA__AUTH__TOKEN_TTL_SECS", "10000000000000")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("token_ttl_secs")));
        assert!(build(MINIMAL, &[("AGORA__AUTH__TOKEN_TTL_SECS", "86400")]).is_ok());
    }

    #[test]
    fn missing_jwt_secret_fails_to_load() {
        assert!(matches!(build("", &[]), Err(ConfigError::Load(_))));
    }

    #[test]
    fn secrets_are_redacted_in_debug_output() {
        let settings = build(MINIMAL, &[]).unwrap();
        assert!(!format!("{settings:?}").contains("media-secret"));
    }
}

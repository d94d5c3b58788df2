use std::collections::HashSet;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use reqwest::RequestBuilder;
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::Config;
use crate::error::TokenError;

pub const USER_NAME_HEADER: &str = "X-SLURM-USER-NAME";
pub const USER_TOKEN_HEADER: &str = "X-SLURM-USER-TOKEN";

/// Cached tokens are treated as expired this many seconds early.
pub const EXPIRY_LEEWAY_SECS: i64 = 10;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Claims {
    pub exp: i64,
    pub iat: i64,
    #[serde(rename = "sun")]
    pub subject: String,
}

impl Claims {
    fn is_fresh(&self, now: i64) -> bool {
        now < self.exp - EXPIRY_LEEWAY_SECS
    }
}

/// Mints and caches the HS256 tokens slurmrestd expects in
/// `X-SLURM-USER-TOKEN`.
///
/// A single token is cached on disk, under `<cache_dir>/slurmrestd/token`,
/// for the configured default user. The signing key is read on every use so
/// that a missing key surfaces as a fatal [`TokenError`] before any request.
#[derive(Clone, Debug)]
pub struct TokenManager {
    key_path: PathBuf,
    cache_dir: PathBuf,
    lifetime: Duration,
    default_user: String,
}

impl TokenManager {
    pub fn new(config: &Config) -> Self {
        Self {
            key_path: config.slurmrestd_jwt_key_path.clone(),
            cache_dir: config.cache_dir.clone(),
            lifetime: config.token_lifetime(),
            default_user: config.slurmrestd_user.clone(),
        }
    }

    #[inline]
    pub fn default_user(&self) -> &str {
        &self.default_user
    }

    pub fn token_path(&self) -> PathBuf {
        self.cache_dir.join("slurmrestd").join("token")
    }

    pub async fn load_key(&self) -> Result<Vec<u8>, TokenError> {
        tokio::fs::read(&self.key_path)
            .await
            .map_err(|source| match source.kind() {
                ErrorKind::NotFound => TokenError::KeyMissing(self.key_path.clone()),
                ErrorKind::PermissionDenied => TokenError::KeyPermission(self.key_path.clone()),
                _ => TokenError::KeyRead {
                    path: self.key_path.clone(),
                    source,
                },
            })
    }

    /// Reads the claims of a token without checking its signature: the token
    /// is self-issued and the cache file is only readable by its owner.
    pub fn decode(token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);
        Ok(jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)?.claims)
    }

    async fn load_cached(&self, subject: &str) -> Option<String> {
        let path = self.token_path();
        let token = match tokio::fs::read_to_string(&path).await {
            Ok(token) => token.trim().to_string(),
            Err(err) if err.kind() == ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!(
                    "Couldn't load token from cache file {}: {err}. Will acquire a new one",
                    path.display()
                );
                return None;
            }
        };
        let claims = match Self::decode(&token) {
            Ok(claims) => claims,
            Err(err) => {
                tracing::warn!("Cached token is malformed: {err}. Will acquire a new one");
                return None;
            }
        };
        if !claims.is_fresh(chrono::Utc::now().timestamp()) {
            tracing::warn!("Cached token is expired. Will acquire a new one");
            return None;
        }
        if claims.subject != subject {
            tracing::debug!("Cached token belongs to {}, not {subject}", claims.subject);
            return None;
        }
        Some(token)
    }

    fn mint(&self, key: &[u8], subject: &str) -> Result<String, TokenError> {
        let now = chrono::Utc::now().timestamp();
        let lifetime = i64::try_from(self.lifetime.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            exp: now.saturating_add(lifetime),
            iat: now,
            subject: subject.to_string(),
        };
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(key),
        )?)
    }

    async fn write_cache(&self, token: &str) {
        let path = self.token_path();
        if let Err(err) = write_private(&path, token).await {
            tracing::error!("Couldn't save token to {}: {err}", path.display());
        }
    }

    /// A valid token for `subject`, defaulting to the configured user.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub async fn token(&self, subject: Option<&str>) -> Result<String, TokenError> {
        let subject = subject.unwrap_or(&self.default_user);
        let key = self.load_key().await?;
        if let Some(token) = self.load_cached(subject).await {
            return Ok(token);
        }
        let token = self.mint(&key, subject)?;
        if subject == self.default_user {
            self.write_cache(&token).await;
        }
        tracing::debug!("Generated auth token for {subject}");
        Ok(token)
    }

    /// Attaches the acting user and its token to an outgoing request.
    pub async fn authorize(
        &self,
        request: RequestBuilder,
        subject: Option<&str>,
    ) -> Result<RequestBuilder, TokenError> {
        let token = self.token(subject).await?;
        let subject = subject.unwrap_or(&self.default_user);
        Ok(request
            .header(USER_NAME_HEADER, HeaderValue::from_str(subject)?)
            .header(USER_TOKEN_HEADER, HeaderValue::from_str(&token)?))
    }
}

async fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && tokio::fs::metadata(parent).await.is_err()
    {
        tracing::debug!("Creating missing cache directory {}", parent.display());
        tokio::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(parent)
            .await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .await?;
    file.write_all(contents.as_bytes()).await?;
    file.flush().await?;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
}

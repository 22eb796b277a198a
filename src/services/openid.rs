//! OpenID Connect id token verification.
//!
//! Tokens are RS256 JWTs checked against the provider's JWKS, fetched from
//! `<issuer>/.well-known/jwks.json` and cached. An unknown `kid` forces one
//! refresh to pick up rotated keys.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::auth::backends::OpenIdResponse;
use crate::config::OpenIdSettings;
use crate::error::{AppError, AppResult};

const JWKS_CACHE_TTL: Duration = Duration::from_secs(86400);
const JWKS_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const JWKS_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Turns a provider token into the identity it asserts.
#[async_trait]
pub trait OpenIdVerifier: Send + Sync {
    /// On failure the error message is safe to show to the client.
    async fn verify(&self, id_token: &str) -> AppResult<OpenIdResponse>;
}

/// Shared handle stored as app data.
#[derive(Clone)]
pub struct OpenIdHandle(pub Arc<dyn OpenIdVerifier>);

/// Claims read from the id token.
#[derive(Debug, Deserialize)]
pub struct IdTokenClaims {
    pub sub: String,
    pub iss: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
}

impl From<IdTokenClaims> for OpenIdResponse {
    fn from(claims: IdTokenClaims) -> Self {
        let identity_url = format!("{}#{}", claims.iss.trim_end_matches('/'), claims.sub);
        OpenIdResponse {
            display_id: claims
                .email
                .clone()
                .unwrap_or_else(|| identity_url.clone()),
            identity_url,
            nickname: claims.nickname.or(claims.preferred_username),
            email: claims.email,
            fullname: claims.name,
            first_name: claims.given_name,
            last_name: claims.family_name,
        }
    }
}

struct CachedKeys {
    keys: Vec<(String, DecodingKey)>,
    fetched_at: Instant,
}

#[derive(Deserialize)]
struct JwksResponse {
    keys: Vec<serde_json::Value>,
}

/// Verifier backed by the provider's published JWKS.
#[derive(Clone)]
pub struct JwksVerifier {
    issuer: String,
    jwks_url: String,
    audience: Option<String>,
    jwks_cache: Arc<RwLock<Option<CachedKeys>>>,
    http_client: reqwest::Client,
}

impl JwksVerifier {
    pub fn new(settings: &OpenIdSettings) -> AppResult<Self> {
        let jwks_url = format!(
            "{}/.well-known/jwks.json",
            settings.issuer.trim_end_matches('/')
        );

        if settings.audience.is_none() {
            warn!("MT_OPENID_AUDIENCE is not set; id tokens minted for other clients will be accepted");
        }

        let http_client = reqwest::Client::builder()
            .connect_timeout(JWKS_CONNECT_TIMEOUT)
            .timeout(JWKS_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::External(format!("Failed to build HTTP client: {}", e)))?;

        info!(
            "OpenID verifier initialized (issuer={}, jwks_url={})",
            settings.issuer, jwks_url
        );

        Ok(Self {
            issuer: settings.issuer.clone(),
            jwks_url,
            audience: settings.audience.clone(),
            jwks_cache: Arc::new(RwLock::new(None)),
            http_client,
        })
    }

    async fn find_key_with_retry(&self, kid: &str) -> Result<DecodingKey, String> {
        let keys = self.get_or_fetch_keys(false).await?;
        if let Some((_, key)) = keys.iter().find(|(k, _)| k == kid) {
            return Ok(key.clone());
        }

        info!("OpenID: kid '{}' not cached, refreshing JWKS", kid);
        let keys = self.get_or_fetch_keys(true).await?;
        keys.iter()
            .find(|(k, _)| k == kid)
            .map(|(_, key)| key.clone())
            .ok_or_else(|| format!("Unknown key ID '{}' after JWKS refresh", kid))
    }

    async fn get_or_fetch_keys(
        &self,
        force_refresh: bool,
    ) -> Result<Vec<(String, DecodingKey)>, String> {
        if !force_refresh {
            let cache = self.jwks_cache.read().await;
            if let Some(ref cached) = *cache
                && cached.fetched_at.elapsed() < JWKS_CACHE_TTL
            {
                return Ok(cached.keys.clone());
            }
        }

        match self.fetch_jwks().await {
            Ok(keys) => {
                let mut cache = self.jwks_cache.write().await;
                *cache = Some(CachedKeys {
                    keys: keys.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(keys)
            }
            Err(e) => {
                if !force_refresh {
                    let cache = self.jwks_cache.read().await;
                    if let Some(ref cached) = *cache {
                        warn!("Failed to refresh JWKS, using stale cache: {}", e);
                        return Ok(cached.keys.clone());
                    }
                }
                Err(e)
            }
        }
    }

    async fn fetch_jwks(&self) -> Result<Vec<(String, DecodingKey)>, String> {
        debug!("Fetching OpenID JWKS from {}", self.jwks_url);

        let response: JwksResponse = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| format!("Failed to fetch JWKS: {}", e))?
            .json()
            .await
            .map_err(|e| format!("Failed to parse JWKS response: {}", e))?;

        let mut keys = Vec::new();
        for jwk_value in &response.keys {
            let jwk: jsonwebtoken::jwk::Jwk = match serde_json::from_value(jwk_value.clone()) {
                Ok(j) => j,
                Err(e) => {
                    warn!("Failed to parse JWK: {}", e);
                    continue;
                }
            };
            if let Some(ref kid) = jwk.common.key_id {
                match DecodingKey::from_jwk(&jwk) {
                    Ok(key) => keys.push((kid.clone(), key)),
                    Err(e) => warn!("Failed to create decoding key from JWK {}: {}", kid, e),
                }
            }
        }

        info!("Loaded {} JWKS keys from OpenID provider", keys.len());
        Ok(keys)
    }
}

#[async_trait]
impl OpenIdVerifier for JwksVerifier {
    async fn verify(&self, id_token: &str) -> AppResult<OpenIdResponse> {
        let failed = || AppError::Unauthorized("OpenID authentication failed".to_string());

        let header = decode_header(id_token).map_err(|e| {
            warn!("OpenID: invalid JWT header: {}", e);
            failed()
        })?;
        let kid = header.kid.ok_or_else(|| {
            warn!("OpenID: JWT missing 'kid' header");
            failed()
        })?;

        let key = self.find_key_with_retry(&kid).await.map_err(|e| {
            warn!("OpenID: key lookup failed: {}", e);
            failed()
        })?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        match self.audience {
            Some(ref aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }

        let data = decode::<IdTokenClaims>(id_token, &key, &validation).map_err(|e| {
            warn!("OpenID: JWT verification failed: {}", e);
            failed()
        })?;

        debug!("OpenID token verified for sub={}", data.claims.sub);
        Ok(data.claims.into())
    }
}

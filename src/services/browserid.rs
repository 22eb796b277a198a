//! BrowserID (Persona) assertion verification.
//!
//! The assertion is POSTed together with the audience to the remote
//! verifier, which answers `{"status": "okay", "email": ...}` on success.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::BrowserIdSettings;
use crate::error::{AppError, AppResult};

const VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Verifies a BrowserID assertion and returns the email it vouches for.
#[async_trait]
pub trait BrowserIdVerifier: Send + Sync {
    /// `Ok(None)` when the verifier rejected the assertion.
    async fn verify(&self, assertion: &str, audience: &str) -> AppResult<Option<String>>;
}

/// Shared handle stored as app data.
#[derive(Clone)]
pub struct BrowserIdHandle(pub Arc<dyn BrowserIdVerifier>);

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    status: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// Verifier backed by the remote verification service.
pub struct RemoteVerifier {
    verify_url: String,
    http_client: reqwest::Client,
}

impl RemoteVerifier {
    pub fn new(settings: &BrowserIdSettings) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(VERIFY_TIMEOUT)
            .build()
            .map_err(|e| AppError::External(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            verify_url: settings.verify_url.clone(),
            http_client,
        })
    }
}

#[async_trait]
impl BrowserIdVerifier for RemoteVerifier {
    async fn verify(&self, assertion: &str, audience: &str) -> AppResult<Option<String>> {
        let response: VerifyResponse = self
            .http_client
            .post(&self.verify_url)
            .form(&[("assertion", assertion), ("audience", audience)])
            .send()
            .await
            .map_err(|e| AppError::External(format!("BrowserID verifier unreachable: {}", e)))?
            .json()
            .await
            .map_err(|e| AppError::External(format!("Invalid BrowserID verifier response: {}", e)))?;

        Ok(accepted_email(response))
    }
}

fn accepted_email(response: VerifyResponse) -> Option<String> {
    if response.status != "okay" {
        warn!(
            "BrowserID assertion rejected: {}",
            response.reason.as_deref().unwrap_or("no reason given")
        );
        return None;
    }
    let email = response.email.filter(|e| !e.is_empty());
    if email.is_none() {
        warn!("BrowserID verifier said okay without an email");
    } else {
        debug!("BrowserID assertion verified");
    }
    email
}

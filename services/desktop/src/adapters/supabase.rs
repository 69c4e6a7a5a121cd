//! services/desktop/src/adapters/supabase.rs
//!
//! This module contains the adapter for the Supabase auth (GoTrue) REST API.
//! It implements the `IdentityBackend` port from the `core` crate.

use crate::config::OAuthFlow;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use memowave_core::domain::{AuthUser, Session};
use memowave_core::ports::{IdentityBackend, PortError, PortResult};
use rand::RngCore as _;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use sha2::{Digest as _, Sha256};
use std::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use url::Url;

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl UserResponse {
    fn to_domain(self) -> AuthUser {
        AuthUser {
            id: self.id,
            email: self.email,
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: UserResponse,
}

impl TokenResponse {
    fn to_domain(self) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .or_else(|| {
                self.expires_in
                    .map(|secs| Utc::now() + chrono::Duration::seconds(secs))
            });
        Session {
            user: self.user.to_domain(),
            access_token: self.access_token,
            refresh_token: self.refresh_token.unwrap_or_default(),
            expires_at,
        }
    }
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

impl ErrorBody {
    fn into_message(self, status: StatusCode) -> String {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
            .unwrap_or_else(|| format!("request failed with status {}", status))
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `IdentityBackend` port against Supabase auth.
pub struct SupabaseAuthAdapter {
    http: Client,
    base_url: Url,
    anon_key: String,
    flow: OAuthFlow,
    current: RwLock<Option<Session>>,
    pending_verifier: Mutex<Option<String>>,
}

impl SupabaseAuthAdapter {
    /// Creates a new `SupabaseAuthAdapter`.
    pub fn new(http: Client, base_url: Url, anon_key: String, flow: OAuthFlow) -> Self {
        Self {
            http,
            base_url,
            anon_key,
            flow,
            current: RwLock::new(None),
            pending_verifier: Mutex::new(None),
        }
    }

    fn endpoint(&self, path: &str) -> PortResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| PortError::Unexpected(format!("invalid auth endpoint {}: {}", path, e)))
    }

    async fn send(&self, request: RequestBuilder) -> PortResult<Response> {
        let response = request
            .header("apikey", &self.anon_key)
            .send()
            .await
            .map_err(|e| PortError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body: ErrorBody = response.json().await.unwrap_or_default();
        let message = body.into_message(status);
        if status.is_server_error() {
            Err(PortError::Unavailable(message))
        } else {
            Err(PortError::Unauthorized(message))
        }
    }

    async fn fetch_user(&self, access_token: &str) -> PortResult<AuthUser> {
        let url = self.endpoint("auth/v1/user")?;
        let response = self.send(self.http.get(url).bearer_auth(access_token)).await?;
        let user: UserResponse = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(user.to_domain())
    }

    async fn token_grant(&self, grant_type: &str, body: serde_json::Value) -> PortResult<Session> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);
        let response = self.send(self.http.post(url).json(&body)).await?;
        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(tokens.to_domain())
    }

    async fn refresh(&self, refresh_token: &str) -> PortResult<Session> {
        self.token_grant(
            "refresh_token",
            serde_json::json!({ "refresh_token": refresh_token }),
        )
        .await
    }

    fn remember(&self, session: &Session) {
        if let Ok(mut current) = self.current.write() {
            *current = Some(session.clone());
        }
    }

    /// Clears the pending verifier unless a newer sign-in replaced it.
    fn forget_verifier(&self, verifier: &str) {
        if let Ok(mut pending) = self.pending_verifier.lock() {
            if pending.as_deref() == Some(verifier) {
                *pending = None;
            }
        }
    }
}

//=========================================================================================
// `IdentityBackend` Trait Implementation
//=========================================================================================

#[async_trait]
impl IdentityBackend for SupabaseAuthAdapter {
    async fn set_session(&self, access_token: &str, refresh_token: &str) -> PortResult<Session> {
        let session = match self.fetch_user(access_token).await {
            Ok(user) => Session {
                user,
                access_token: access_token.to_string(),
                refresh_token: refresh_token.to_string(),
                expires_at: jwt_expiry(access_token),
            },
            Err(PortError::Unauthorized(reason)) if !refresh_token.is_empty() => {
                debug!("Access token refused ({}), trying refresh grant", reason);
                self.refresh(refresh_token).await?
            }
            Err(e) => return Err(e),
        };
        info!("Session established for user {}", session.user.id);
        self.remember(&session);
        Ok(session)
    }

    async fn exchange_code(&self, code: &str) -> PortResult<Session> {
        // Cleared only once the backend has answered for this code.
        let verifier = self
            .pending_verifier
            .lock()
            .map_err(|_| PortError::Unexpected("verifier lock poisoned".to_string()))?
            .clone()
            .ok_or_else(|| {
                PortError::Unauthorized("no sign-in is waiting for an authorization code".to_string())
            })?;

        let result = self
            .token_grant(
                "pkce",
                serde_json::json!({ "auth_code": code, "code_verifier": verifier }),
            )
            .await;
        match &result {
            Ok(_) | Err(PortError::Unauthorized(_)) => self.forget_verifier(&verifier),
            Err(e) => warn!("Code exchange failed, keeping the pending sign-in: {}", e),
        }
        let session = result?;
        info!("Authorization code exchanged for user {}", session.user.id);
        self.remember(&session);
        Ok(session)
    }

    async fn current_user(&self) -> PortResult<AuthUser> {
        let access_token = self
            .current
            .read()
            .map_err(|_| PortError::Unexpected("session lock poisoned".to_string()))?
            .as_ref()
            .map(|s| s.access_token.clone())
            .ok_or_else(|| PortError::Unauthorized("no active session".to_string()))?;
        self.fetch_user(&access_token).await
    }

    async fn sign_out(&self) -> PortResult<()> {
        let access_token = self
            .current
            .write()
            .map_err(|_| PortError::Unexpected("session lock poisoned".to_string()))?
            .take()
            .map(|s| s.access_token);

        let Some(access_token) = access_token else {
            return Ok(());
        };
        let url = self.endpoint("auth/v1/logout")?;
        if let Err(e) = self.send(self.http.post(url).bearer_auth(access_token)).await {
            // The local session is already gone; a failed revoke only leaves the server token to expire.
            warn!("Remote sign-out failed: {}", e);
        }
        Ok(())
    }

    fn authorize_url(&self, provider: &str, redirect_to: &str) -> PortResult<String> {
        let mut url = self.endpoint("auth/v1/authorize")?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("provider", provider)
                .append_pair("redirect_to", redirect_to);
            if self.flow == OAuthFlow::Pkce {
                let pkce = generate_pkce();
                query
                    .append_pair("code_challenge", &pkce.challenge)
                    .append_pair("code_challenge_method", "s256");
                *self
                    .pending_verifier
                    .lock()
                    .map_err(|_| PortError::Unexpected("verifier lock poisoned".to_string()))? =
                    Some(pkce.verifier);
            }
        }
        Ok(url.to_string())
    }
}

//=========================================================================================
// Helpers
//=========================================================================================

/// PKCE verifier/challenge pair.
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

/// Generate a PKCE verifier (64 random bytes, base64url-encoded) and S256 challenge.
pub fn generate_pkce() -> Pkce {
    let mut bytes = [0u8; 64];
    rand::rng().fill_bytes(&mut bytes);
    let verifier = URL_SAFE_NO_PAD.encode(bytes);
    let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
    Pkce {
        verifier,
        challenge,
    }
}

/// Reads the `exp` claim of a JWT without verifying it.
fn jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    DateTime::<Utc>::from_timestamp(claims.get("exp")?.as_i64()?, 0)
}

//! Test identities and bearer token resolution.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::fmt;

use crate::error::AuthError;

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

// Keep passwords out of logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// A credential after setup: with a token when resolution succeeded.
#[derive(Debug, Clone)]
pub struct Identity {
    pub username: String,
    pub token: Option<String>,
}

impl Identity {
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

/// Exchanges a credential for a bearer token.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_token(&self, credential: &Credential) -> Result<String, AuthError>;
}

/// OpenID Connect resource-owner password grant.
#[derive(Debug, Clone)]
pub struct OidcTokenProvider {
    client: Client,
    token_url: String,
    client_id: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

impl OidcTokenProvider {
    pub fn new(client: Client, token_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            client,
            token_url: token_url.into(),
            client_id: client_id.into(),
        }
    }

    /// `{base}/realms/{realm}/protocol/openid-connect/token`
    pub fn token_url(base: &str, realm: &str) -> String {
        format!(
            "{}/realms/{realm}/protocol/openid-connect/token",
            base.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl TokenProvider for OidcTokenProvider {
    async fn fetch_token(&self, credential: &Credential) -> Result<String, AuthError> {
        let form = [
            ("grant_type", "password"),
            ("client_id", self.client_id.as_str()),
            ("username", credential.username.as_str()),
            ("password", credential.password.as_str()),
        ];
        let response = self
            .client
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(AuthError::Status(status.as_u16()));
        }
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;
        body.access_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)
    }
}

/// Resolve every credential once, in order.
///
/// A failure never aborts setup: the identity is kept without a token and its
/// users run anonymously.
pub async fn resolve_identities(
    provider: &dyn TokenProvider,
    credentials: &[Credential],
) -> Vec<Identity> {
    let mut identities = Vec::with_capacity(credentials.len());
    for credential in credentials {
        let token = match provider.fetch_token(credential).await {
            Ok(token) => {
                tracing::info!(user = %credential.username, "resolved token");
                Some(token)
            }
            Err(err) => {
                tracing::warn!(
                    user = %credential.username,
                    error = %err,
                    "token resolution failed, identity will run unauthenticated"
                );
                None
            }
        };
        identities.push(Identity {
            username: credential.username.clone(),
            token,
        });
    }
    identities
}

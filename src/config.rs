//! Environment-driven settings.
//!
//! Every key is optional. A missing key falls back to its default and the
//! fallback is logged once, so a misconfigured environment shows up in the
//! setup log instead of silently pointing the run somewhere unexpected.

use std::time::Duration;

use crate::{auth::Credential, error::ConfigError};

pub const API_GATEWAY_URL: &str = "API_GATEWAY_URL";
pub const KEYCLOAK_URL: &str = "KEYCLOAK_URL";
pub const KEYCLOAK_REALM: &str = "KEYCLOAK_REALM";
pub const KEYCLOAK_CLIENT_ID: &str = "KEYCLOAK_CLIENT_ID";
pub const TEST_USERS: &str = "TEST_USERS";
pub const SEED: &str = "LOADGATE_SEED";
pub const REQUEST_TIMEOUT_MS: &str = "LOADGATE_REQUEST_TIMEOUT_MS";

const DEFAULT_API_GATEWAY_URL: &str = "http://apiGateway:5000";
const DEFAULT_KEYCLOAK_URL: &str = "http://keycloak:8080";
const DEFAULT_REALM: &str = "instaclone";
const DEFAULT_CLIENT_ID: &str = "public-client";
const DEFAULT_TEST_USERS: &str = "testuser1:testpass123,testuser2:testpass123,\
testuser3:testpass123,testuser4:testpass123,testuser5:testpass123";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_gateway_url: String,
    pub keycloak_url: String,
    pub realm: String,
    pub client_id: String,
    pub test_users: Vec<Credential>,
    pub seed: Option<u64>,
    pub request_timeout: Duration,
    /// Keys that were absent and fell back to their defaults.
    pub defaulted: Vec<&'static str>,
}

impl Settings {
    pub fn from_env() -> crate::Result<Self> {
        Ok(Self::from_lookup(|key| std::env::var(key).ok())?)
    }

    /// Build settings from an arbitrary key lookup. Empty values count as absent.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut defaulted = Vec::new();
        let mut get = |key: &'static str, default: &str| -> String {
            match lookup(key).filter(|v| !v.trim().is_empty()) {
                Some(value) => value.trim().to_owned(),
                None => {
                    defaulted.push(key);
                    default.to_owned()
                }
            }
        };

        let api_gateway_url = get(API_GATEWAY_URL, DEFAULT_API_GATEWAY_URL);
        let keycloak_url = get(KEYCLOAK_URL, DEFAULT_KEYCLOAK_URL);
        let realm = get(KEYCLOAK_REALM, DEFAULT_REALM);
        let client_id = get(KEYCLOAK_CLIENT_ID, DEFAULT_CLIENT_ID);
        let test_users = parse_identities(&get(TEST_USERS, DEFAULT_TEST_USERS))?;
        let timeout_ms = get(REQUEST_TIMEOUT_MS, &DEFAULT_REQUEST_TIMEOUT_MS.to_string());
        let seed = lookup(SEED).filter(|v| !v.trim().is_empty());

        let request_timeout = timeout_ms
            .parse::<u64>()
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: REQUEST_TIMEOUT_MS,
                reason: format!("`{timeout_ms}` is not a positive number of milliseconds"),
            })?;
        let seed = seed
            .map(|s| {
                s.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                    key: SEED,
                    reason: format!("`{s}` is not an unsigned integer"),
                })
            })
            .transpose()?;

        Ok(Self {
            api_gateway_url,
            keycloak_url,
            realm,
            client_id,
            test_users,
            seed,
            request_timeout,
            defaulted,
        })
    }

    /// Log every defaulted key. Called once during setup.
    pub fn log_defaults(&self) {
        for key in &self.defaulted {
            let value = match *key {
                API_GATEWAY_URL => self.api_gateway_url.clone(),
                KEYCLOAK_URL => self.keycloak_url.clone(),
                KEYCLOAK_REALM => self.realm.clone(),
                KEYCLOAK_CLIENT_ID => self.client_id.clone(),
                TEST_USERS => format!("{} built-in identities", self.test_users.len()),
                REQUEST_TIMEOUT_MS => format!("{:?}", self.request_timeout),
                _ => continue,
            };
            tracing::info!(key, %value, "not set, using default");
        }
    }

    pub fn token_url(&self) -> String {
        crate::auth::OidcTokenProvider::token_url(&self.keycloak_url, &self.realm)
    }
}

/// `user:pass,user:pass`. The password may itself contain `:`.
pub fn parse_identities(raw: &str) -> Result<Vec<Credential>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once(':') {
            Some((user, pass)) if !user.is_empty() => Ok(Credential::new(user, pass)),
            _ => Err(ConfigError::MalformedIdentity(entry.to_owned())),
        })
        .collect()
}

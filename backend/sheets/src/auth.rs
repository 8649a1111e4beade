//! # Service Account Tokens
//!
//! Two-legged OAuth: sign a JWT with the service account's private key, trade it at the
//! token endpoint for a bearer token that lasts an hour.
//!
//! Tokens are cached and refreshed a minute before they expire.
use std::{
    fmt,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{SheetsError, client::parse_response};

pub const SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const TOKEN_LIFETIME_SECS: u64 = 3600;
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct ServiceAccount {
    pub email: String,
    private_key: String,
}

impl ServiceAccount {
    /// Keys pasted into env files usually carry literal `\n` sequences.
    pub fn new(email: &str, private_key: &str) -> Self {
        Self {
            email: email.trim().to_string(),
            private_key: private_key.replace("\\n", "\n"),
        }
    }

    pub fn private_key(&self) -> &str {
        &self.private_key
    }

    fn claims<'a>(&'a self, token_url: &'a str, now: u64) -> Claims<'a> {
        Claims {
            iss: &self.email,
            scope: SCOPE,
            aud: token_url,
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
        }
    }

    fn assertion(&self, token_url: &str, now: u64) -> Result<String, SheetsError> {
        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .map_err(|e| SheetsError::Credentials(e.to_string()))?;

        encode(
            &Header::new(Algorithm::RS256),
            &self.claims(token_url, now),
            &key,
        )
        .map_err(|e| SheetsError::Credentials(e.to_string()))
    }
}

impl fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("email", &self.email)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

#[derive(Serialize, Debug, PartialEq, Eq)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    TOKEN_LIFETIME_SECS
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now + REFRESH_MARGIN < self.expires_at
    }
}

#[derive(Default)]
pub(crate) struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub(crate) async fn bearer(
        &self,
        http: &Client,
        account: &ServiceAccount,
        token_url: &str,
    ) -> Result<String, SheetsError> {
        let mut slot = self.slot.lock().await;

        if let Some(token) = slot.as_ref().filter(|t| t.is_fresh(Instant::now())) {
            return Ok(token.value.clone());
        }

        let token = exchange(http, account, token_url).await?;
        let value = token.value.clone();
        *slot = Some(token);

        Ok(value)
    }
}

async fn exchange(
    http: &Client,
    account: &ServiceAccount,
    token_url: &str,
) -> Result<CachedToken, SheetsError> {
    let requested_at = Instant::now();
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let assertion = account.assertion(token_url, now)?;

    debug!("Requesting access token for {}", account.email);
    let response = http
        .post(token_url)
        .form(&[("grant_type", GRANT_TYPE), ("assertion", assertion.as_str())])
        .send()
        .await?;

    let token: TokenResponse = parse_response(response, "token").await?;

    Ok(CachedToken {
        value: token.access_token,
        expires_at: requested_at + Duration::from_secs(token.expires_in),
    })
}

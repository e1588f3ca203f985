//! Token authority.
//!
//! Tokens are opaque random values held server-side, so revocation and
//! expiry are immediate and need no shared signing key. An optional
//! static gateway token configured out-of-band is accepted alongside
//! issued tokens but can never be revoked. Raw token values never reach
//! the logs; only fingerprints do.

use crate::config::AuthConfig;
use crate::{Error, Result, current_timestamp};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// A token handed out by [`TokenAuthority::issue`] or login.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The opaque bearer value.
    pub value: String,
    /// Who the token was issued to.
    pub subject: String,
    /// Unix expiry timestamp, `None` for non-expiring tokens.
    pub expires_at: Option<u64>,
}

#[derive(Debug, Clone)]
struct TokenRecord {
    subject: String,
    expires_at: Option<u64>,
}

/// Issues, validates, and revokes bearer tokens.
pub struct TokenAuthority {
    tokens: Mutex<HashMap<String, TokenRecord>>,
    static_token: Option<SecretString>,
    username: Option<String>,
    password: Option<SecretString>,
    default_ttl_secs: Option<u64>,
}

impl TokenAuthority {
    /// Subject recorded for requests authenticated by the static token.
    pub const STATIC_SUBJECT: &'static str = "static";

    /// Creates an authority from the auth configuration.
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            static_token: config.static_token.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            default_ttl_secs: config.token_ttl_secs,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, TokenRecord>> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether requests must present a credential at all.
    ///
    /// Required once a static token is configured or any live issued
    /// token exists. A login pair alone does not close the gateway:
    /// until the first login there is nothing to authenticate against,
    /// so requests run open.
    #[must_use]
    pub fn auth_required(&self) -> bool {
        self.static_token.is_some() || self.has_live_tokens()
    }

    /// Whether a username/password pair is configured for login.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    /// Whether the store holds at least one unexpired token.
    fn has_live_tokens(&self) -> bool {
        let now = current_timestamp();
        self.lock()
            .values()
            .any(|record| record.expires_at.is_none_or(|exp| exp > now))
    }

    /// Issues a fresh token for `subject`.
    ///
    /// `ttl_secs` overrides the configured default; `None` falls back to
    /// it, and a configured `None` means the token never expires.
    #[must_use]
    pub fn issue(&self, subject: &str, ttl_secs: Option<u64>) -> IssuedToken {
        // Two v4 uuids give 244 bits of randomness in the value.
        let value = format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            uuid::Uuid::new_v4().simple()
        );
        let expires_at = ttl_secs
            .or(self.default_ttl_secs)
            .map(|ttl| current_timestamp() + ttl);

        self.lock().insert(
            value.clone(),
            TokenRecord {
                subject: subject.to_string(),
                expires_at,
            },
        );

        tracing::info!(
            subject = %subject,
            token = %fingerprint(&value),
            expires_at = ?expires_at,
            "issued token"
        );

        IssuedToken {
            value,
            subject: subject.to_string(),
            expires_at,
        }
    }

    /// Validates a token, returning its subject.
    pub fn validate(&self, value: &str) -> Result<String> {
        self.validate_at(value, current_timestamp())
    }

    /// Validates a token against an explicit clock.
    ///
    /// An expired token found here is purged so the store does not
    /// accumulate dead records between sweeps.
    pub fn validate_at(&self, value: &str, now: u64) -> Result<String> {
        if let Some(static_token) = &self.static_token {
            if constant_time_eq(value, static_token.expose_secret()) {
                return Ok(Self::STATIC_SUBJECT.to_string());
            }
        }

        let mut tokens = self.lock();
        match tokens.get(value) {
            Some(record) => {
                if record.expires_at.is_some_and(|exp| exp <= now) {
                    tokens.remove(value);
                    tracing::debug!(token = %fingerprint(value), "token expired");
                    return Err(Error::Unauthorized("token expired".to_string()));
                }
                Ok(record.subject.clone())
            }
            None => Err(Error::Unauthorized("unknown token".to_string())),
        }
    }

    /// Revokes an issued token.
    ///
    /// The static token is rejected with [`Error::UnrevokableToken`];
    /// a token the store does not hold is [`Error::TokenNotFound`].
    pub fn revoke(&self, value: &str) -> Result<()> {
        if let Some(static_token) = &self.static_token {
            if constant_time_eq(value, static_token.expose_secret()) {
                return Err(Error::UnrevokableToken);
            }
        }

        if self.lock().remove(value).is_none() {
            return Err(Error::TokenNotFound);
        }
        tracing::info!(token = %fingerprint(value), "revoked token");
        Ok(())
    }

    /// Removes every expired token, returning how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = current_timestamp();
        let mut tokens = self.lock();
        let before = tokens.len();
        tokens.retain(|_, record| record.expires_at.is_none_or(|exp| exp > now));
        let swept = before - tokens.len();
        if swept > 0 {
            tracing::debug!(swept, "swept expired tokens");
        }
        swept
    }

    /// Exchanges a username/password pair for a token.
    pub fn login(&self, username: &str, password: &str) -> Result<IssuedToken> {
        let (Some(expected_user), Some(expected_pass)) = (&self.username, &self.password) else {
            return Err(Error::AuthNotConfigured);
        };

        // Both comparisons always run so a failed username does not
        // return faster than a failed password.
        let user_ok = constant_time_eq(username, expected_user);
        let pass_ok = constant_time_eq(password, expected_pass.expose_secret());
        if !(user_ok && pass_ok) {
            tracing::warn!(username = %username, "login rejected");
            return Err(Error::InvalidCredentials);
        }

        Ok(self.issue(username, None))
    }

    /// Number of live (issued, unexpired or not-yet-swept) tokens.
    #[must_use]
    pub fn token_count(&self) -> usize {
        self.lock().len()
    }
}

/// Compares two strings without leaking the match position.
///
/// Hashing both sides first makes the byte comparison independent of
/// where the inputs diverge.
fn constant_time_eq(a: &str, b: &str) -> bool {
    Sha256::digest(a.as_bytes()) == Sha256::digest(b.as_bytes())
}

/// Short log-safe fingerprint of a token value.
#[must_use]
pub fn fingerprint(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    hex::encode(&digest[..4])
}

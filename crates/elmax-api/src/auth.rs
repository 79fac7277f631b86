// Credentials and session tokens
//
// The cloud service hands out a JWT at login. Its claims are read locally
// (no signature check) for the expiry and the bound e-mail address; the
// service stays the authority on whether the token is still accepted.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeDelta, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;

use crate::error::Error;

/// Prefix the service puts in front of the JWT, both in the login response
/// and in the `Authorization` header it expects back.
const TOKEN_SCHEME: &str = "JWT";

/// Renew tokens that expire within this window.
pub const REFRESH_MARGIN: TimeDelta = TimeDelta::seconds(600);

/// Username/password pair for the cloud account.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<SecretString>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Reject credentials that can never log in, without asking the service.
    pub fn validate(&self) -> Result<(), Error> {
        if self.username.trim().is_empty() || self.password.expose_secret().is_empty() {
            return Err(Error::BadLogin);
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    exp: Option<Value>,
    #[serde(default)]
    email: Option<String>,
}

/// A session token issued by the login endpoint.
#[derive(Debug)]
pub struct SessionToken {
    raw: SecretString,
    expires_at: Option<DateTime<Utc>>,
    username: Option<String>,
}

impl SessionToken {
    /// Parse the `token` field of a login response (`"JWT <jwt>"`).
    pub fn from_login_token(value: &str) -> Result<Self, Error> {
        let jwt = value
            .trim()
            .strip_prefix(TOKEN_SCHEME)
            .map(str::trim_start)
            .filter(|rest| !rest.is_empty())
            .ok_or_else(|| Error::InvalidToken(format!("missing {TOKEN_SCHEME} prefix")))?;
        Self::from_jwt(jwt)
    }

    /// Parse a bare JWT.
    pub fn from_jwt(jwt: &str) -> Result<Self, Error> {
        let mut parts = jwt.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::InvalidToken("expected three dot-separated segments".into()));
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| Error::InvalidToken(format!("claims are not base64url: {e}")))?;
        let claims: Claims = serde_json::from_slice(&bytes)
            .map_err(|e| Error::InvalidToken(format!("claims are not JSON: {e}")))?;

        let expires_at = claims
            .exp
            .as_ref()
            .and_then(|exp| exp.as_i64().or_else(|| exp.as_str()?.trim().parse().ok()))
            .and_then(|secs| DateTime::from_timestamp(secs, 0));

        Ok(Self {
            raw: SecretString::from(jwt),
            expires_at,
            username: claims.email,
        })
    }

    /// The bare JWT, as sent on the push channel.
    pub fn raw(&self) -> &str {
        self.raw.expose_secret()
    }

    /// Value of the `Authorization` header for REST calls.
    pub fn authorization_header(&self) -> String {
        format!("{TOKEN_SCHEME} {}", self.raw.expose_secret())
    }

    /// Expiry from the `exp` claim. `None` when the token carries none.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// The account e-mail from the `email` claim.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Whether the token should be renewed before its next use.
    ///
    /// A token without an `exp` claim is only renewed when the service
    /// rejects it.
    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh_at(Utc::now())
    }

    pub(crate) fn needs_refresh_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|exp| exp.signed_duration_since(now) < REFRESH_MARGIN)
    }
}

// Session management
//
// Holds the current token and serializes logins. Callers that find the
// token missing, about to expire, or rejected all funnel into `renew`;
// only the first one talks to the service, the rest pick up its result.
//
// The cloud logs in with account credentials; a panel on the local network
// logs in with its PIN. Everything after the login is the same.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

use crate::auth::{Credentials, SessionToken};
use crate::error::{self, Error};

/// What a login presents to the service.
#[derive(Debug, Clone)]
pub(crate) enum Login {
    Account(Credentials),
    PanelCode(SecretString),
}

impl Login {
    /// The error for a refused login: bad credentials or a bad PIN.
    fn refused(&self) -> Error {
        match self {
            Self::Account(_) => Error::BadLogin,
            Self::PanelCode(_) => Error::BadPin,
        }
    }

    fn validate(&self) -> Result<(), Error> {
        match self {
            Self::Account(credentials) => credentials.validate(),
            Self::PanelCode(code) if code.expose_secret().trim().is_empty() => Err(Error::BadPin),
            Self::PanelCode(_) => Ok(()),
        }
    }

    fn body(&self) -> Value {
        match self {
            Self::Account(credentials) => json!({
                "username": credentials.username,
                "password": credentials.password.expose_secret(),
            }),
            Self::PanelCode(code) => json!({ "pin": code.expose_secret() }),
        }
    }
}

#[derive(Deserialize)]
struct LoginResponse {
    token: Option<String>,
}

pub(crate) struct Authenticator {
    http: reqwest::Client,
    login_url: Url,
    login: Login,
    token: ArcSwapOption<SessionToken>,
    login_lock: Mutex<()>,
}

impl Authenticator {
    pub(crate) fn new(http: reqwest::Client, login_url: Url, login: Login) -> Self {
        Self {
            http,
            login_url,
            login,
            token: ArcSwapOption::empty(),
            login_lock: Mutex::new(()),
        }
    }

    /// The token currently held, whatever its state.
    pub(crate) fn current(&self) -> Option<Arc<SessionToken>> {
        self.token.load_full()
    }

    /// Log in unconditionally and store the new token.
    pub(crate) async fn login(&self) -> Result<Arc<SessionToken>, Error> {
        let _guard = self.login_lock.lock().await;
        self.login_locked().await
    }

    /// A token that is present and not about to expire, logging in if needed.
    pub(crate) async fn valid_token(&self) -> Result<Arc<SessionToken>, Error> {
        if let Some(token) = self.current().filter(|t| !t.needs_refresh()) {
            return Ok(token);
        }
        self.renew(None).await
    }

    /// Replace a token the service rejected (or a missing/expiring one when
    /// `stale` is `None`).
    ///
    /// If another task already swapped in a newer token while this one was
    /// waiting for the lock, that token is returned without a second login.
    pub(crate) async fn renew(
        &self,
        stale: Option<&Arc<SessionToken>>,
    ) -> Result<Arc<SessionToken>, Error> {
        let _guard = self.login_lock.lock().await;

        if let Some(current) = self.current() {
            let replaced = match stale {
                Some(stale) => !Arc::ptr_eq(stale, &current),
                None => !current.needs_refresh(),
            };
            if replaced {
                debug!("session already renewed by another caller");
                return Ok(current);
            }
        }

        if stale.is_some() {
            warn!("session token rejected, logging in again");
        }
        self.login_locked().await
    }

    pub(crate) fn logout(&self) {
        self.token.store(None);
    }

    async fn login_locked(&self) -> Result<Arc<SessionToken>, Error> {
        let token = Arc::new(self.do_login().await?);
        self.token.store(Some(Arc::clone(&token)));
        Ok(token)
    }

    async fn do_login(&self) -> Result<SessionToken, Error> {
        self.login.validate()?;

        debug!("POST {}", self.login_url);

        let body = self.login.body();

        let resp = self
            .http
            .post(self.login_url.clone())
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;

        match status.as_u16() {
            400 | 401 => return Err(self.login.refused()),
            403 if matches!(self.login, Login::PanelCode(_)) => return Err(Error::BadPin),
            422 => return Err(Error::PanelBusy),
            _ if !status.is_success() => {
                return Err(Error::Api {
                    status_code: status.as_u16(),
                    message: error::preview(&text).to_owned(),
                });
            }
            _ => {}
        }

        // The service answers a refused login with 200 and an empty body.
        if text.trim().is_empty() {
            return Err(self.login.refused());
        }

        let parsed: LoginResponse =
            serde_json::from_str(&text).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: error::preview(&text).to_owned(),
            })?;
        let raw = parsed
            .token
            .ok_or_else(|| Error::InvalidToken("login response has no token".into()))?;

        let token = SessionToken::from_login_token(&raw)?;
        debug!(
            username = token.username().unwrap_or("<unknown>"),
            expires_at = ?token.expires_at(),
            "login successful"
        );
        Ok(token)
    }
}

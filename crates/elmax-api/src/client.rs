// Elmax REST client
//
// One authenticated session per client. Every authorized call goes through
// `send_authorized`, which attaches the current token and, on a 401, renews
// the session and replays the request once.
//
// The same client drives either the cloud service or a single panel's own
// API on the local network. They differ in how the session is opened and in
// the route table; payloads are shared.

use std::sync::{Arc, LazyLock};

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::{Credentials, SessionToken};
use crate::error::{self, Error};
use crate::model::{Command, EndpointKind, EndpointStatus, PanelEntry, PanelStatus};
use crate::push::{PushListener, ReconnectConfig};
use crate::session::{Authenticator, Login};
use crate::transport::{self, TransportConfig};

/// Base URL of the Elmax cloud service.
pub const DEFAULT_API_URL: &str = "https://cloud.elmaxsrl.it";

/// Panel code used for status queries when none is configured.
pub const DEFAULT_PANEL_CODE: &str = "000000";

static DEFAULT_API: LazyLock<Url> =
    LazyLock::new(|| Url::parse(DEFAULT_API_URL).expect("DEFAULT_API_URL is a valid URL"));

// ── ClientConfig ────────────────────────────────────────────────────

/// Which service a client talks to.
#[derive(Debug, Clone)]
pub enum Backend {
    /// The Elmax cloud, logged in with account credentials.
    Cloud(Credentials),
    /// One panel's own API on the local network, logged in with the
    /// configured panel code.
    Local,
}

/// Everything needed to build an [`ElmaxClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base REST endpoint; API paths are appended to it.
    pub api_url: Url,
    /// Push notification channel (`wss://...`), if push is wanted.
    pub push_endpoint: Option<Url>,
    pub backend: Backend,
    /// Panel PIN, sent with status queries and arming commands. Required
    /// for [`Backend::Local`], where it is also the login secret.
    pub panel_code: Option<SecretString>,
    pub transport: TransportConfig,
}

impl ClientConfig {
    /// Cloud defaults for the given account.
    pub fn new(username: impl Into<String>, password: impl Into<SecretString>) -> Self {
        Self {
            api_url: DEFAULT_API.clone(),
            push_endpoint: None,
            backend: Backend::Cloud(Credentials::new(username, password)),
            panel_code: None,
            transport: TransportConfig::default(),
        }
    }

    /// A panel reached directly at `panel_api_url` (e.g.
    /// `https://192.168.1.10/api/v2`), unlocked with `panel_code`.
    ///
    /// Panels serve a self-signed certificate; pin it with
    /// [`TlsMode::PinnedCertificate`](crate::TlsMode::PinnedCertificate),
    /// see [`ElmaxClient::retrieve_server_certificate`].
    pub fn local(panel_api_url: Url, panel_code: impl Into<SecretString>) -> Self {
        Self {
            api_url: panel_api_url,
            push_endpoint: None,
            backend: Backend::Local,
            panel_code: Some(panel_code.into()),
            transport: TransportConfig::default(),
        }
    }

    pub fn with_api_url(mut self, api_url: Url) -> Self {
        self.api_url = api_url;
        self
    }

    pub fn with_push_endpoint(mut self, push_endpoint: Url) -> Self {
        self.push_endpoint = Some(push_endpoint);
        self
    }

    pub fn with_panel_code(mut self, code: impl Into<SecretString>) -> Self {
        self.panel_code = Some(code.into());
        self
    }

    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }
}

// ── ElmaxClient ─────────────────────────────────────────────────────

/// Async client for the Elmax API.
///
/// Cheap to share behind an `Arc`; all methods take `&self` and may run
/// concurrently. Logging in is implicit: the first authorized call (or
/// [`login`](Self::login)) obtains a token, and expiring or rejected tokens
/// are renewed on demand.
pub struct ElmaxClient {
    http: reqwest::Client,
    api_url: Url,
    push_endpoint: Option<Url>,
    panel_code: Option<SecretString>,
    transport: TransportConfig,
    local: bool,
    current_panel: ArcSwapOption<String>,
    session: Arc<Authenticator>,
}

impl ElmaxClient {
    /// Build a client, creating the HTTP client from `config.transport`.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let http = config.transport.build_client()?;
        Self::with_client(http, config)
    }

    /// Build a client around an existing `reqwest::Client`.
    ///
    /// A local client without a panel code fails with [`Error::BadPin`].
    pub fn with_client(http: reqwest::Client, config: ClientConfig) -> Result<Self, Error> {
        let (login_url, login, local) = match config.backend {
            Backend::Cloud(credentials) => (
                join(&config.api_url, &["api", "auth", "login"])?,
                Login::Account(credentials),
                false,
            ),
            Backend::Local => {
                let code = config.panel_code.clone().ok_or(Error::BadPin)?;
                (
                    join(&config.api_url, &["login"])?,
                    Login::PanelCode(code),
                    true,
                )
            }
        };
        let session = Arc::new(Authenticator::new(http.clone(), login_url, login));
        Ok(Self {
            http,
            api_url: config.api_url,
            push_endpoint: config.push_endpoint,
            panel_code: config.panel_code,
            transport: config.transport,
            local,
            current_panel: ArcSwapOption::empty(),
            session,
        })
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    /// Whether this client talks to a panel directly rather than the cloud.
    pub fn is_local(&self) -> bool {
        self.local
    }

    /// Fetch the certificate a panel presents on `host:port`, PEM-encoded,
    /// without verifying it. Meant for trust-on-first-use pinning.
    pub async fn retrieve_server_certificate(host: &str, port: u16) -> Result<String, Error> {
        transport::retrieve_server_certificate(host, port).await
    }

    // ── Session ──────────────────────────────────────────────────────

    /// Log in with the configured credentials, replacing any held token.
    pub async fn login(&self) -> Result<Arc<SessionToken>, Error> {
        self.session.login().await
    }

    /// Forget the session token. The service has no logout endpoint.
    pub fn logout(&self) {
        debug!("dropping session token");
        self.session.logout();
    }

    /// Whether a token is held and not past its expiry.
    pub fn is_authenticated(&self) -> bool {
        self.session.current().is_some_and(|token| {
            token
                .expires_at()
                .is_none_or(|expires_at| expires_at > Utc::now())
        })
    }

    pub fn token_expiration(&self) -> Option<DateTime<Utc>> {
        self.session.current().and_then(|token| token.expires_at())
    }

    /// The e-mail address bound to the current session, if logged in.
    pub fn get_authenticated_username(&self) -> Option<String> {
        self.session
            .current()
            .and_then(|token| token.username().map(str::to_owned))
    }

    // ── Panels ───────────────────────────────────────────────────────

    /// Panels the account can control, in the order the service lists them.
    ///
    /// A local client lists the one panel it is connected to.
    pub async fn list_control_panels(&self) -> Result<Vec<PanelEntry>, Error> {
        if self.local {
            let status = self.discover(&self.url(&["discovery"])?).await?;
            return Ok(vec![PanelEntry {
                hash: status.panel_id,
                online: true,
                names: Vec::new(),
            }]);
        }
        let url = self.url(&["api", "ext", "devices"])?;
        let panels: Option<Vec<PanelEntry>> = self.get(url).await?;
        Ok(panels.unwrap_or_default())
    }

    /// Remember `panel_id` for [`get_current_panel_status`](Self::get_current_panel_status).
    pub fn set_current_panel(&self, panel_id: impl Into<String>) {
        let panel_id = panel_id.into();
        info!(%panel_id, "current panel selected");
        self.current_panel.store(Some(Arc::new(panel_id)));
    }

    pub fn current_panel(&self) -> Option<String> {
        self.current_panel.load_full().map(|id| id.as_ref().clone())
    }

    /// Status of the selected panel, or of the connected one for a local
    /// client.
    pub async fn get_current_panel_status(&self) -> Result<PanelStatus, Error> {
        if self.local {
            return self.discover(&self.url(&["discovery"])?).await;
        }
        let panel_id = self.current_panel().ok_or(Error::NoPanelSelected)?;
        self.get_panel_status(&panel_id).await
    }

    /// Full status of a panel, queried with the configured panel code.
    pub async fn get_panel_status(&self, panel_id: &str) -> Result<PanelStatus, Error> {
        let pin = self
            .panel_code
            .as_ref()
            .map_or(DEFAULT_PANEL_CODE, ExposeSecret::expose_secret);
        self.get_panel_status_with_pin(panel_id, pin).await
    }

    /// Full status of a panel, queried with an explicit panel code.
    ///
    /// A local client is already unlocked by its login, so `pin` is not
    /// sent and `panel_id` only has to match the connected panel.
    pub async fn get_panel_status_with_pin(
        &self,
        panel_id: &str,
        pin: &str,
    ) -> Result<PanelStatus, Error> {
        let status = if self.local {
            let status = self.discover(&self.url(&["discovery"])?).await?;
            if !panel_id.is_empty() && status.panel_id != panel_id {
                warn!(
                    requested = panel_id,
                    connected = %status.panel_id,
                    "local panel id differs from the requested one"
                );
            }
            status
        } else {
            self.discover(&self.url(&["api", "ext", "discovery", panel_id, pin])?)
                .await?
        };
        debug!(
            panel_id,
            endpoints = status.all_endpoints().len(),
            "panel status"
        );
        Ok(status)
    }

    /// Status of a single endpoint.
    pub async fn get_endpoint_status(&self, endpoint_id: &str) -> Result<EndpointStatus, Error> {
        let url = if self.local {
            self.url(&["status", endpoint_id])?
        } else {
            self.url(&["api", "ext", "status", endpoint_id])?
        };
        self.get_required(url).await
    }

    async fn discover(&self, url: &Url) -> Result<PanelStatus, Error> {
        self.get_required(url.clone()).await
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Send `command` to an endpoint.
    ///
    /// Arming commands carry the configured panel code. Commands are not
    /// retried; a busy panel surfaces as [`Error::PanelBusy`].
    pub async fn execute_command(
        &self,
        endpoint_id: &str,
        command: impl Into<Command>,
    ) -> Result<(), Error> {
        let code = self.panel_code.as_ref().map(ExposeSecret::expose_secret);
        self.dispatch(endpoint_id, command.into(), code).await
    }

    /// Send `command` with an explicit panel code.
    pub async fn execute_command_with_code(
        &self,
        endpoint_id: &str,
        command: impl Into<Command>,
        code: &str,
    ) -> Result<(), Error> {
        self.dispatch(endpoint_id, command.into(), Some(code)).await
    }

    async fn dispatch(
        &self,
        endpoint_id: &str,
        command: Command,
        code: Option<&str>,
    ) -> Result<(), Error> {
        check_capability(endpoint_id, command)?;

        let body = if command.requires_code() {
            let code = code.ok_or(Error::BadPin)?;
            Some(json!({ "code": code }))
        } else {
            None
        };

        let url = if self.local {
            self.url(&["cmd", "exec", endpoint_id, command.code()])?
        } else {
            self.url(&["api", "ext", endpoint_id, command.code()])?
        };
        debug!(endpoint_id, %command, "executing command");
        self.send_authorized(Method::POST, url, body.as_ref())
            .await
            .map(drop)
    }

    // ── Push ─────────────────────────────────────────────────────────

    /// A push listener sharing this client's session.
    ///
    /// Fails if no push endpoint was configured.
    pub fn push_listener(&self) -> Result<PushListener, Error> {
        self.push_listener_with(ReconnectConfig::default())
    }

    /// Like [`push_listener`](Self::push_listener) with a custom reconnect
    /// policy.
    pub fn push_listener_with(&self, reconnect: ReconnectConfig) -> Result<PushListener, Error> {
        let endpoint = self
            .push_endpoint
            .clone()
            .ok_or_else(|| Error::WebSocketConnect("no push endpoint configured".into()))?;
        Ok(PushListener::new(
            endpoint,
            Arc::clone(&self.session),
            self.transport.clone(),
            reconnect,
        ))
    }

    // ── Request helpers ──────────────────────────────────────────────

    fn url(&self, segments: &[&str]) -> Result<Url, Error> {
        join(&self.api_url, segments)
    }

    /// GET a document that must be present. The service answers a session
    /// or PIN it does not accept with an empty 200.
    async fn get_required<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        match self.get(url).await? {
            Some(value) => Ok(value),
            None => {
                warn!("empty status response, login not accepted");
                Err(Error::BadLogin)
            }
        }
    }

    /// GET and decode. An empty body decodes to `None`.
    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>, Error> {
        let body = self.send_authorized(Method::GET, url, None).await?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: error::preview(&body).to_owned(),
            })
    }

    /// Send with the session token and return the body of a 2xx response.
    async fn send_authorized(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<String, Error> {
        let token = self.session.valid_token().await?;
        let mut resp = self
            .send_with(&token, method.clone(), url.clone(), body)
            .await?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            warn!(%url, "request unauthorized, renewing session and retrying once");
            let fresh = self.session.renew(Some(&token)).await?;
            resp = self.send_with(&fresh, method, url, body).await?;
        }

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            debug!(%status, "request failed");
            return Err(Error::from_status(status, &text));
        }
        Ok(text)
    }

    async fn send_with(
        &self,
        token: &SessionToken,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, Error> {
        debug!("{} {}", method, url);

        let mut auth = HeaderValue::from_str(&token.authorization_header())
            .map_err(|e| Error::InvalidToken(format!("token is not a valid header: {e}")))?;
        auth.set_sensitive(true);

        let mut builder = self.http.request(method, url).header(AUTHORIZATION, auth);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        Ok(builder.send().await?)
    }
}

/// Refuse commands the endpoint cannot take, before anything is sent.
///
/// Ids that do not follow the usual `{panel}-{kind}-{index}` shape are let
/// through; the service has the final word on those.
fn check_capability(endpoint_id: &str, command: Command) -> Result<(), Error> {
    match EndpointKind::from_endpoint_id(endpoint_id) {
        Some(kind) if !command.targets(kind) => Err(Error::CapabilityMismatch {
            endpoint_id: endpoint_id.to_owned(),
            kind,
            command,
        }),
        Some(_) => Ok(()),
        None => {
            warn!(endpoint_id, %command, "cannot infer endpoint kind, sending unchecked");
            Ok(())
        }
    }
}

/// Append path segments to a base URL, percent-encoding each one.
fn join(base: &Url, segments: &[&str]) -> Result<Url, Error> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

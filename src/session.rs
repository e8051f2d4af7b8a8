//! Authenticated session management: login handshake and page fetching.
//!
//! A [`Session`] is produced by [`Session::login`] and holds the cookie
//! state for the rest of the run. Both phases start with a login: the
//! crawl because every catalog page is behind it, the download purely to
//! establish a valid cookie before fetching files (the login response
//! body is discarded).
//!
//! The site answers a rejected login with HTTP 200 and an error message in
//! the page body, so credential failure is detected by a body-substring
//! check - a boundary contract with the site, not a status-code check.

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::{Client, Response};
use thiserror::Error;
use tracing::{debug, info, instrument};
use url::Url;

use crate::limiter::RateLimiter;

/// Connection establishment timeout in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Read timeout in seconds (generous: media files can be large).
const READ_TIMEOUT_SECS: u64 = 300;

/// Site login form endpoint.
const LOGIN_PATH: &str = "/login";

/// Path used by the download phase to (re)establish cookies. The response
/// body is discarded.
pub const DASHBOARD_PATH: &str = "/dashboard";

/// Phrase the site embeds in the login response body when credentials are
/// rejected. The login endpoint returns 200 either way, so this substring
/// is the only rejection signal.
const INVALID_CREDENTIALS_MARKER: &str = "Your username or password did not match";

/// Login credentials plus the host they authenticate against.
///
/// Supplied once per run and owned by the session. `Debug` redacts the
/// password so argument logging cannot leak it.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    password: String,
    /// Hostname or origin, e.g. `example.com` or `https://example.com`.
    pub host: String,
}

impl Credentials {
    /// Creates a credentials value.
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            host: host.into(),
        }
    }

    /// Returns the password.
    ///
    /// Sensitive - avoid logging the return value.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Resolves the host into a base origin URL.
    ///
    /// A bare hostname is given an `https://` scheme.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidUrl`] when the host does not parse.
    pub fn base_url(&self) -> Result<Url, SessionError> {
        let origin = if self.host.contains("://") {
            self.host.clone()
        } else {
            format!("https://{}", self.host)
        };
        Url::parse(&origin).map_err(|_| SessionError::invalid_url(&origin))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("host", &self.host)
            .finish()
    }
}

/// Errors from the login handshake and page fetches.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The site rejected the supplied username/password pair.
    #[error("login rejected: username or password did not match")]
    InvalidCredentials,

    /// Network-level error (DNS, connection refused, TLS, mid-body drop).
    #[error("network error requesting {url}: {source}")]
    Transport {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Unexpected non-success HTTP status.
    #[error("HTTP {status} requesting {url}")]
    Status {
        /// The URL that returned the status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// A host or href could not be parsed or resolved.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The offending URL string.
        url: String,
    },
}

impl SessionError {
    /// Creates a transport error, promoting timeouts to their own variant.
    pub fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url }
        } else {
            Self::Transport { url, source }
        }
    }

    /// Creates a status error.
    pub fn status(url: impl Into<String>, status: u16) -> Self {
        Self::Status {
            url: url.into(),
            status,
        }
    }

    /// Creates an invalid-URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }
}

/// Authenticated HTTP context shared by every request in a run.
///
/// Holds the cookie-carrying client and the run's base origin. Cookie
/// state is written once during login and read-only afterwards; the
/// session lives for the run and is never logged out.
#[derive(Debug, Clone)]
pub struct Session {
    client: Client,
    base: Url,
    limiter: Arc<RateLimiter>,
}

impl Session {
    /// Performs the login handshake and returns the authenticated session.
    ///
    /// Submits the username, password, and intended redirect target as a
    /// form to the site's login endpoint, following redirects and
    /// retaining cookies. Rate-limited like every other request.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidCredentials`] when the response body
    ///   carries the site's rejection phrase (the status is 200 either way)
    /// - [`SessionError::Transport`]/[`SessionError::Timeout`] on network
    ///   failure
    /// - [`SessionError::Status`] on an unexpected non-success status
    #[instrument(skip(credentials, limiter), fields(host = %credentials.host))]
    pub async fn login(
        credentials: &Credentials,
        limiter: Arc<RateLimiter>,
        redirect_target: &str,
    ) -> Result<Self, SessionError> {
        let base = credentials.base_url()?;
        let client = build_client();

        let login_url = base
            .join(LOGIN_PATH)
            .map_err(|_| SessionError::invalid_url(LOGIN_PATH))?;

        debug!(url = %login_url, "submitting login form");
        limiter.acquire(1).await;

        let response = client
            .post(login_url.clone())
            .form(&[
                ("username", credentials.username.as_str()),
                ("password", credentials.password()),
                ("redirect", redirect_target),
            ])
            .send()
            .await
            .map_err(|e| SessionError::transport(login_url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::status(login_url.as_str(), status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SessionError::transport(login_url.as_str(), e))?;

        if body.contains(INVALID_CREDENTIALS_MARKER) {
            return Err(SessionError::InvalidCredentials);
        }

        info!(host = %base, "login succeeded");
        Ok(Self {
            client,
            base,
            limiter,
        })
    }

    /// Returns the run's base origin URL.
    #[must_use]
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Resolves an absolute or host-relative href against the run's host.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidUrl`] when the href neither parses
    /// on its own nor joins against the base.
    pub fn resolve(&self, href: &str) -> Result<Url, SessionError> {
        match Url::parse(href) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => self
                .base
                .join(href)
                .map_err(|_| SessionError::invalid_url(href)),
            Err(_) => Err(SessionError::invalid_url(href)),
        }
    }

    /// Issues a rate-limited GET and returns the response after a status
    /// check, leaving the body unconsumed for the caller to stream.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Transport`]/[`SessionError::Timeout`] on
    /// network failure and [`SessionError::Status`] on non-success.
    #[instrument(level = "debug", skip(self), fields(url = %url))]
    pub async fn get(&self, url: &Url) -> Result<Response, SessionError> {
        self.limiter.acquire(1).await;

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| SessionError::transport(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::status(url.as_str(), status.as_u16()));
        }
        Ok(response)
    }

    /// Fetches a page by absolute URL or host-relative path and returns
    /// its body text. This is the page fetcher the crawl is built on.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`get`](Self::get), plus
    /// [`SessionError::InvalidUrl`] for an unresolvable path.
    #[instrument(level = "debug", skip(self))]
    pub async fn fetch_page(&self, path: &str) -> Result<String, SessionError> {
        let url = self.resolve(path)?;
        let response = self.get(&url).await?;
        response
            .text()
            .await
            .map_err(|e| SessionError::transport(url.as_str(), e))
    }
}

/// Builds the cookie-carrying HTTP client shared by all session requests.
#[allow(clippy::expect_used)]
fn build_client() -> Client {
    Client::builder()
        .cookie_provider(Arc::new(Jar::default()))
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(READ_TIMEOUT_SECS))
        .gzip(true)
        .user_agent(concat!("coursefetch/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("failed to build HTTP client with static configuration")
}

//! Session management
//!
//! This module handles:
//! - Logging into the forum and collecting the session cookies
//! - The session credential (a cookie jar scoped to the forum)
//! - Per-worker snapshots of that credential
//!
//! `reqwest`'s cookie jar is shared by reference and mutated whenever a
//! response sets a cookie, including on redirect hops. Fetches therefore take
//! `&mut SessionCredential`: the canonical credential issued by [`SessionManager::login`]
//! is only ever read, and every concurrent fetch works on its own snapshot.

use crate::config::Config;
use crate::crawler::fetcher::{FetchError, FetchRequest, Fetcher};
use crate::ConfigError;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderValue, SET_COOKIE};
use thiserror::Error;
use url::Url;

/// Errors raised while reading or copying cookie state
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Cookie header for {url} is not valid text")]
    UnreadableCookies { url: String },

    #[error("Cookies for {url} cannot be sent as a header")]
    InvalidCookieHeader { url: String },
}

/// Errors raised by the login call
#[derive(Debug, Error)]
pub enum LoginError {
    #[error("login request failed: {0}")]
    Request(#[from] FetchError),

    #[error("login to {url} returned no session cookies")]
    NoCookies { url: String },

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// A single cookie as visible to requests for a given URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
}

/// Authenticated cookie state for one forum
///
/// Not `Clone`: copies are made explicitly with [`SessionCredential::snapshot`]
/// so that two holders never share the underlying jar.
pub struct SessionCredential {
    jar: Jar,
    scope: Url,
}

impl SessionCredential {
    /// Creates an empty credential scoped to the given URL
    pub fn new(scope: Url) -> Self {
        Self {
            jar: Jar::default(),
            scope,
        }
    }

    /// The URL this credential was issued or snapshotted for
    pub fn scope(&self) -> &Url {
        &self.scope
    }

    /// Cookies applicable to the credential's own scope
    pub fn cookies(&self) -> Result<Vec<SessionCookie>, SessionError> {
        self.cookies_for(&self.scope)
    }

    /// Cookies that would be sent with a request to `url`
    pub fn cookies_for(&self, url: &Url) -> Result<Vec<SessionCookie>, SessionError> {
        let Some(header) = self.jar.cookies(url) else {
            return Ok(Vec::new());
        };

        let header = header.to_str().map_err(|_| SessionError::UnreadableCookies {
            url: url.to_string(),
        })?;

        Ok(parse_cookie_header(header))
    }

    /// Number of cookies applicable to the credential's scope
    pub fn cookie_count(&self) -> Result<usize, SessionError> {
        self.cookies().map(|c| c.len())
    }

    /// Like [`cookie_count`](Self::cookie_count), but an unreadable jar is
    /// logged and counted as empty
    pub fn len(&self) -> usize {
        match self.cookie_count() {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!("Counting session cookies failed: {}", e);
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Produces an independent credential holding the cookies applicable to `scope`
    ///
    /// Each cookie is re-scoped to `scope`'s host with `Path=/`. Mutating the
    /// snapshot (for example by following a redirect that sets a cookie)
    /// never affects `self` or any other snapshot.
    pub fn snapshot(&self, scope: &Url) -> Result<SessionCredential, SessionError> {
        let copy = SessionCredential::new(scope.clone());

        for cookie in self.cookies_for(scope)? {
            copy.jar
                .add_cookie_str(&format!("{}={}; Path=/", cookie.name, cookie.value), scope);
        }

        Ok(copy)
    }

    /// Adds a cookie in `Set-Cookie` syntax as if `url` had sent it
    pub fn add_cookie_str(&mut self, cookie: &str, url: &Url) {
        self.jar.add_cookie_str(cookie, url);
    }

    /// Stores every `Set-Cookie` header of a response received from `url`
    pub(crate) fn store_response_cookies(&mut self, headers: &HeaderMap, url: &Url) {
        self.jar.set_cookies(&mut headers.get_all(SET_COOKIE).iter(), url);
    }

    /// Builds the `Cookie` header for a request to `next`
    ///
    /// On a redirect hop, cookies applicable to the previous response's URL
    /// are merged in as well, unless `next` already carries a cookie with the
    /// same name.
    pub(crate) fn request_cookie_header(
        &self,
        previous: Option<&Url>,
        next: &Url,
    ) -> Result<Option<HeaderValue>, SessionError> {
        let mut cookies = self.cookies_for(next)?;

        if let Some(previous) = previous {
            for cookie in self.cookies_for(previous)? {
                if !cookies.iter().any(|c| c.name == cookie.name) {
                    cookies.push(cookie);
                }
            }
        }

        if cookies.is_empty() {
            return Ok(None);
        }

        let header = cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");

        HeaderValue::from_str(&header)
            .map(Some)
            .map_err(|_| SessionError::InvalidCookieHeader {
                url: next.to_string(),
            })
    }
}

impl std::fmt::Debug for SessionCredential {
    // Cookie values are session secrets; only names are shown
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .cookies()
            .unwrap_or_default()
            .into_iter()
            .map(|c| c.name)
            .collect();

        f.debug_struct("SessionCredential")
            .field("scope", &self.scope.as_str())
            .field("cookies", &names)
            .finish()
    }
}

/// Splits a `Cookie` request header into name/value pairs
fn parse_cookie_header(header: &str) -> Vec<SessionCookie> {
    header
        .split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((name, value)) => SessionCookie {
                name: name.to_string(),
                value: value.to_string(),
            },
            None => SessionCookie {
                name: pair.to_string(),
                value: String::new(),
            },
        })
        .collect()
}

/// Issues the login request and produces the canonical session credential
#[derive(Debug, Clone)]
pub struct SessionManager {
    login_url: Url,
    scope: Url,
    expected_cookies: usize,
    form_body: String,
}

impl SessionManager {
    /// Builds a session manager from the site and credential configuration
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let credentials = &config.credentials;

        let mut form = url::form_urlencoded::Serializer::new(String::new());
        form.append_pair("login_username", &credentials.username)
            .append_pair("login_password", &credentials.password)
            .append_pair("autologin", "1");
        let mut form_body = form.finish();

        // The login token is site-specific, already-encoded bytes
        form_body.push_str("&login=");
        form_body.push_str(&credentials.login_token);

        Ok(Self {
            login_url: config.site.login_url()?,
            scope: config.site.base_url()?,
            expected_cookies: config.site.expected_cookies,
            form_body,
        })
    }

    pub fn login_url(&self) -> &Url {
        &self.login_url
    }

    /// The form-encoded login request body
    pub fn form_body(&self) -> &str {
        &self.form_body
    }

    /// Logs in and returns the canonical session credential
    ///
    /// Cookies set on every redirect hop of the login response are kept.
    /// A cookie count other than the expected one is logged as a warning;
    /// a login that yields no cookie at all is an error.
    pub async fn login(&self, fetcher: &Fetcher) -> Result<SessionCredential, LoginError> {
        tracing::info!("Logging in at {}", self.login_url);

        let mut credential = SessionCredential::new(self.scope.clone());
        let request = FetchRequest::post_form(self.login_url.clone(), self.form_body.clone());

        // The login page body carries nothing we need
        fetcher.execute(request, &mut credential).await?;

        let cookies = credential.cookies()?;
        if cookies.is_empty() {
            return Err(LoginError::NoCookies {
                url: self.login_url.to_string(),
            });
        }

        if cookies.len() != self.expected_cookies {
            tracing::warn!(
                "Login produced {} cookies, expected {}; session may be partially usable",
                cookies.len(),
                self.expected_cookies
            );
        }

        tracing::debug!(
            "Session cookies: {}",
            cookies
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(credential)
    }
}

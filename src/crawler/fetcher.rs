//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests made by the harvester, including:
//! - Building the shared HTTP client with the configured user agent
//! - Following redirects by hand, carrying session cookies across hops
//! - Status validation (only 200 is accepted)
//! - Transcoding windows-1251 bodies to UTF-8
//! - Error classification

use crate::config::HttpConfig;
use crate::crawler::session::{SessionCredential, SessionError};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, COOKIE, LOCATION};
use reqwest::{redirect::Policy, Client, Method, Response, StatusCode};
use thiserror::Error;
use url::Url;

/// The exact `Content-Type` value that triggers windows-1251 transcoding
pub const WINDOWS_1251_CONTENT_TYPE: &str = "text/html; charset=windows-1251";

/// Errors for a single fetch
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error for {url}: {source}")]
    Transport { url: String, source: reqwest::Error },

    #[error("Redirect from {url} points to unusable location '{location}'")]
    InvalidRedirect { url: String, location: String },

    #[error("Unexpected status code for {url}: {status}")]
    Status { url: String, status: String },

    #[error("Failed to decode body of {url} as {encoding}")]
    Decode {
        url: String,
        encoding: &'static str,
        /// Byte offset of the first undecodable sequence, when known
        offset: Option<usize>,
    },

    #[error("Session error for {url}: {source}")]
    Session { url: String, source: SessionError },

    #[error("Fetch of {url} was cancelled")]
    Cancelled { url: String },

    #[error("Worker fetching {url} stopped before reporting a result")]
    WorkerLost { url: String },
}

/// Coarse classification of a [`FetchError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    /// Connection, timeout, TLS, body read or redirect failure
    Transport,
    /// Non-200 response
    Status,
    /// Body could not be transcoded
    Decode,
    /// Batch was cancelled before the fetch finished
    Cancelled,
    /// Cookie handling or worker failure inside the harvester
    Internal,
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::Transport { .. } | Self::InvalidRedirect { .. } => FetchErrorKind::Transport,
            Self::Status { .. } => FetchErrorKind::Status,
            Self::Decode { .. } => FetchErrorKind::Decode,
            Self::Cancelled { .. } => FetchErrorKind::Cancelled,
            Self::Session { .. } | Self::WorkerLost { .. } => FetchErrorKind::Internal,
        }
    }

    /// The URL whose fetch failed
    pub fn url(&self) -> &str {
        match self {
            Self::Transport { url, .. }
            | Self::InvalidRedirect { url, .. }
            | Self::Status { url, .. }
            | Self::Decode { url, .. }
            | Self::Session { url, .. }
            | Self::Cancelled { url }
            | Self::WorkerLost { url } => url,
        }
    }
}

/// A request to send through the [`Fetcher`]
#[derive(Debug, Clone)]
pub struct FetchRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<String>,
}

impl FetchRequest {
    /// A plain GET request
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// A POST carrying an `application/x-www-form-urlencoded` body
    pub fn post_form(url: Url, body: String) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );

        Self {
            method: Method::POST,
            url,
            headers,
            body: Some(body),
        }
    }

    /// Adds or replaces a header
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

/// Builds an HTTP client with proper configuration
///
/// Redirects are disabled on the client: [`Fetcher`] follows them itself so
/// that the session cookies of every hop reach the next request.
///
/// # Example
///
/// ```no_run
/// use forum_harvest::config::HttpConfig;
/// use forum_harvest::crawler::build_http_client;
///
/// let client = build_http_client(&HttpConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.timeout())
        .connect_timeout(config.connect_timeout())
        .redirect(Policy::none()) // Handle redirects manually
        .https_only(config.https_only)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Sends requests and turns responses into UTF-8 page bodies
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    max_redirects: usize,
}

impl Fetcher {
    pub fn new(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
            max_redirects: config.max_redirects,
        })
    }

    /// Wraps an existing client
    pub fn with_client(client: Client, max_redirects: usize) -> Self {
        Self {
            client,
            max_redirects,
        }
    }

    /// Fetches a page and returns its body as UTF-8 text
    ///
    /// # Request Flow
    ///
    /// 1. Send the request with the credential's cookies
    /// 2. Store any `Set-Cookie` headers in the credential
    /// 3. On a 3xx with `Location`, follow it (up to `max_redirects` hops)
    /// 4. Require status 200
    /// 5. Transcode windows-1251 bodies, pass everything else through
    ///
    /// # Errors
    ///
    /// | Condition | Error |
    /// |-----------|-------|
    /// | Connection, timeout, TLS, body read | `Transport` |
    /// | Unparsable `Location` | `InvalidRedirect` |
    /// | Final status other than 200 | `Status` |
    /// | windows-1251 body that cannot be transcoded | `Decode` |
    pub async fn fetch(
        &self,
        request: FetchRequest,
        credential: &mut SessionCredential,
    ) -> Result<String, FetchError> {
        let response = self.execute(request, credential).await?;
        let url = response.url().clone();

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        decode_body(&url, content_type.as_deref(), &bytes)
    }

    /// Sends a request, following redirects, and returns the validated 200 response
    ///
    /// The body is left unread.
    pub async fn execute(
        &self,
        request: FetchRequest,
        credential: &mut SessionCredential,
    ) -> Result<Response, FetchError> {
        let FetchRequest {
            mut method,
            mut url,
            mut headers,
            mut body,
        } = request;
        let mut previous: Option<Url> = None;
        let mut redirects = 0;

        loop {
            tracing::debug!("{} {}", method, url);

            let mut builder = self
                .client
                .request(method.clone(), url.clone())
                .headers(headers.clone());

            let cookies = credential
                .request_cookie_header(previous.as_ref(), &url)
                .map_err(|source| FetchError::Session {
                    url: url.to_string(),
                    source,
                })?;
            if let Some(cookies) = cookies {
                builder = builder.header(COOKIE, cookies);
            }
            if let Some(body) = &body {
                builder = builder.body(body.clone());
            }

            let response = builder
                .send()
                .await
                .map_err(|source| classify_transport(&url, source))?;

            credential.store_response_cookies(response.headers(), &url);

            let status = response.status();
            let location = if status.is_redirection() && redirects < self.max_redirects {
                response.headers().get(LOCATION).cloned()
            } else {
                None
            };

            let Some(location) = location else {
                if status != StatusCode::OK {
                    return Err(FetchError::Status {
                        url: url.to_string(),
                        status: status.to_string(),
                    });
                }
                return Ok(response);
            };

            let next = location
                .to_str()
                .ok()
                .and_then(|location| url.join(location).ok())
                .ok_or_else(|| FetchError::InvalidRedirect {
                    url: url.to_string(),
                    location: String::from_utf8_lossy(location.as_bytes()).into_owned(),
                })?;

            // Browsers turn these into GETs; 307/308 keep method and body
            if matches!(
                status,
                StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER
            ) && method != Method::GET
                && method != Method::HEAD
            {
                method = Method::GET;
                body = None;
                headers.remove(CONTENT_TYPE);
            }

            tracing::debug!("{} redirected to {}", url, next);
            redirects += 1;
            previous = Some(std::mem::replace(&mut url, next));
        }
    }
}

/// Converts a send failure into a transport error, logging its class
fn classify_transport(url: &Url, source: reqwest::Error) -> FetchError {
    if source.is_timeout() {
        tracing::debug!("Request to {} timed out", url);
    } else if source.is_connect() {
        tracing::debug!("Connection to {} failed", url);
    }

    FetchError::Transport {
        url: url.to_string(),
        source,
    }
}

/// Decodes a response body according to its declared content type
///
/// Only the exact value [`WINDOWS_1251_CONTENT_TYPE`] is transcoded, and only
/// that path can fail. Any other (or missing) content type is taken to be
/// UTF-8; invalid sequences are replaced with U+FFFD and logged by offset.
pub fn decode_body(
    url: &Url,
    content_type: Option<&str>,
    bytes: &[u8],
) -> Result<String, FetchError> {
    if content_type == Some(WINDOWS_1251_CONTENT_TYPE) {
        tracing::debug!("Converting body of {} from windows-1251 to UTF-8", url);

        return encoding_rs::WINDOWS_1251
            .decode_without_bom_handling_and_without_replacement(bytes)
            .map(|text| text.into_owned())
            .ok_or_else(|| FetchError::Decode {
                url: url.to_string(),
                encoding: "windows-1251",
                offset: None,
            });
    }

    if let Err(e) = std::str::from_utf8(bytes) {
        tracing::warn!(
            "Body of {} is not valid UTF-8 (first bad byte at offset {}); replacing invalid sequences",
            url,
            e.valid_up_to()
        );
    }

    Ok(String::from_utf8_lossy(bytes).into_owned())
}

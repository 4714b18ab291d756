use crate::ConfigError;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Main configuration structure for forum-harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub site: SiteConfig,
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Forum endpoints and layout
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Forum base URL; item hrefs are resolved against it
    #[serde(rename = "forum-url")]
    pub forum_url: String,

    /// Login endpoint, relative to the forum URL
    #[serde(rename = "login-path", default = "default_login_path")]
    pub login_path: String,

    /// Index page listing the items to fetch, relative to the forum URL
    #[serde(rename = "index-path")]
    pub index_path: String,

    /// Substring an anchor's href must contain to be treated as an item link
    #[serde(rename = "topic-marker", default = "default_topic_marker")]
    pub topic_marker: String,

    /// Number of site cookies a successful login is expected to produce
    #[serde(rename = "expected-cookies", default = "default_expected_cookies")]
    pub expected_cookies: usize,
}

/// Login form values
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    pub username: String,

    pub password: String,

    /// Value of the `login` form field, appended verbatim (already form-encoded)
    #[serde(rename = "login-token", default)]
    pub login_token: String,
}

/// HTTP client behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Total request timeout in seconds
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connect timeout in seconds
    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Maximum number of redirect hops followed per request
    #[serde(rename = "max-redirects", default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Refuse plain-HTTP URLs
    #[serde(rename = "https-only", default)]
    pub https_only: bool,
}

/// Batch fetch behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Worker pool size; 0 selects twice the available parallelism
    #[serde(default)]
    pub workers: usize,

    /// How long in-flight fetches may run after cancellation (milliseconds)
    #[serde(rename = "cancel-grace-ms", default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,
}

/// Output configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    /// Directory fetched pages are written to; pages are discarded when absent
    pub directory: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_redirects: default_max_redirects(),
            https_only: false,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            cancel_grace_ms: default_cancel_grace_ms(),
        }
    }
}

impl SiteConfig {
    /// Parses the forum base URL
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.forum_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid forum-url: {}", e)))
    }

    /// Absolute URL of the login endpoint
    pub fn login_url(&self) -> Result<Url, ConfigError> {
        self.base_url()?
            .join(&self.login_path)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid login-path: {}", e)))
    }

    /// Absolute URL of the index page
    pub fn index_url(&self) -> Result<Url, ConfigError> {
        self.base_url()?
            .join(&self.index_path)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid index-path: {}", e)))
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl FetchConfig {
    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}

fn default_login_path() -> String {
    "login.php".to_string()
}

fn default_topic_marker() -> String {
    "viewtopic.php?t=".to_string()
}

fn default_expected_cookies() -> usize {
    2
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64; rv:129.0) Gecko/20100101 Firefox/129.0".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_max_redirects() -> usize {
    10
}

fn default_cancel_grace_ms() -> u64 {
    5000
}

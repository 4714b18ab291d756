use crate::config::types::{Config, CredentialsConfig, FetchConfig, HttpConfig, SiteConfig};
use crate::ConfigError;
use reqwest::header::HeaderValue;

/// Upper bound on the worker pool size accepted from configuration
const MAX_WORKERS: usize = 256;

/// Upper bound on redirect hops accepted from configuration
const MAX_REDIRECTS: usize = 50;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_site_config(&config.site, &config.http)?;
    validate_credentials(&config.credentials)?;
    validate_http_config(&config.http)?;
    validate_fetch_config(&config.fetch)?;
    Ok(())
}

/// Validates forum endpoints
fn validate_site_config(site: &SiteConfig, http: &HttpConfig) -> Result<(), ConfigError> {
    let base = site.base_url()?;

    if base.scheme() != "http" && base.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "forum-url must use http or https, got '{}'",
            site.forum_url
        )));
    }

    if http.https_only && base.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "forum-url '{}' must use HTTPS when https-only is set",
            site.forum_url
        )));
    }

    // Relative paths are joined onto the base, which drops a last segment
    // that lacks a trailing slash.
    if !base.path().ends_with('/') {
        return Err(ConfigError::InvalidUrl(format!(
            "forum-url must end with '/', got '{}'",
            site.forum_url
        )));
    }

    site.login_url()?;
    site.index_url()?;

    if site.topic_marker.is_empty() {
        return Err(ConfigError::Validation(
            "topic-marker cannot be empty".to_string(),
        ));
    }

    if site.expected_cookies == 0 {
        return Err(ConfigError::Validation(
            "expected-cookies must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates login form values
fn validate_credentials(credentials: &CredentialsConfig) -> Result<(), ConfigError> {
    if credentials.username.is_empty() {
        return Err(ConfigError::Validation(
            "username cannot be empty".to_string(),
        ));
    }

    // The token is sent verbatim, so it must already be form-encoded
    if !credentials
        .login_token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '%' | '+' | '-' | '_' | '.' | '*'))
    {
        return Err(ConfigError::Validation(format!(
            "login-token must be form-encoded, got '{}'",
            credentials.login_token
        )));
    }

    Ok(())
}

/// Validates HTTP client settings
fn validate_http_config(http: &HttpConfig) -> Result<(), ConfigError> {
    if http.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    HeaderValue::from_str(&http.user_agent).map_err(|_| {
        ConfigError::Validation(format!(
            "user-agent is not a valid header value: '{}'",
            http.user_agent
        ))
    })?;

    if http.timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "timeout-secs must be >= 1, got {}",
            http.timeout_secs
        )));
    }

    if http.connect_timeout_secs < 1 || http.connect_timeout_secs > http.timeout_secs {
        return Err(ConfigError::Validation(format!(
            "connect-timeout-secs must be between 1 and timeout-secs ({}), got {}",
            http.timeout_secs, http.connect_timeout_secs
        )));
    }

    if http.max_redirects > MAX_REDIRECTS {
        return Err(ConfigError::Validation(format!(
            "max-redirects must be <= {}, got {}",
            MAX_REDIRECTS, http.max_redirects
        )));
    }

    Ok(())
}

/// Validates batch fetch settings
fn validate_fetch_config(fetch: &FetchConfig) -> Result<(), ConfigError> {
    if fetch.workers > MAX_WORKERS {
        return Err(ConfigError::Validation(format!(
            "workers must be between 0 and {}, got {}",
            MAX_WORKERS, fetch.workers
        )));
    }

    Ok(())
}

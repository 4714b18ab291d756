//! Integration tests for forum-harvest
//!
//! These tests use wiremock to stand in for the forum and exercise login,
//! fetching, and the full harvest pipeline over real HTTP.

mod fetch_tests;

use forum_harvest::config::{parse_config, Config};
use forum_harvest::crawler::{FetchRequest, TargetDescriptor};
use url::Url;
use wiremock::MockServer;

/// Builds a configuration pointing at the mock server's `/forum/` path
pub fn create_test_config(server: &MockServer, output_dir: Option<&str>) -> Config {
    let output = match output_dir {
        Some(dir) => format!("\n[output]\ndirectory = {:?}\n", dir),
        None => String::new(),
    };

    parse_config(&format!(
        r#"
[site]
forum-url = "{}/forum/"
index-path = "top.php?mode=release&stat=30days"

[credentials]
username = "reader"
password = "secret"
login-token = "%C2%F5%EE%E4"

[http]
timeout-secs = 5
connect-timeout-secs = 2

[fetch]
workers = 2
cancel-grace-ms = 200
{}"#,
        server.uri(),
        output
    ))
    .expect("test config should be valid")
}

/// Absolute URL for `path` on the mock server
pub fn server_url(server: &MockServer, path: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), path)).expect("valid mock URL")
}

pub fn get(server: &MockServer, path: &str) -> FetchRequest {
    FetchRequest::get(server_url(server, path))
}

pub fn topic(server: &MockServer, n: usize) -> TargetDescriptor {
    TargetDescriptor {
        title: format!("Topic {}", n),
        url: server_url(server, &format!("/forum/viewtopic.php?t={}", n)),
    }
}

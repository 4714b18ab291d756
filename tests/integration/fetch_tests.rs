//! Fetcher and batch tests against a mock forum

use crate::{get, server_url, topic};
use forum_harvest::config::HttpConfig;
use forum_harvest::crawler::{
    fetch_all, BatchOptions, FetchError, FetchErrorKind, Fetcher, SessionCredential,
    TargetDescriptor, WINDOWS_1251_CONTENT_TYPE,
};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;
use wiremock::matchers::{header_regex, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher() -> Fetcher {
    Fetcher::new(&HttpConfig::default()).expect("Failed to build fetcher")
}

fn credential(server: &MockServer) -> SessionCredential {
    let forum = server_url(server, "/forum/");
    let mut credential = SessionCredential::new(forum.clone());
    credential.add_cookie_str("bb_data=abc; Path=/", &forum);
    credential.add_cookie_str("bb_sid=xyz; Path=/", &forum);
    credential
}

#[tokio::test]
async fn test_fetch_transcodes_windows_1251() {
    let mock_server = MockServer::start().await;
    let page = "<html><head><title>Раздача</title></head><body>Привет, мир</body></html>";
    let (bytes, _, had_errors) = encoding_rs::WINDOWS_1251.encode(page);
    assert!(!had_errors);

    Mock::given(method("GET"))
        .and(path("/forum/viewtopic.php"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(bytes.into_owned())
                .insert_header("content-type", WINDOWS_1251_CONTENT_TYPE),
        )
        .mount(&mock_server)
        .await;

    let mut credential = credential(&mock_server);
    let body = fetcher()
        .fetch(get(&mock_server, "/forum/viewtopic.php?t=1"), &mut credential)
        .await
        .expect("Fetch failed");

    assert_eq!(body, page);
}

#[tokio::test]
async fn test_fetch_passes_utf8_through() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/forum/viewtopic.php"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<p>Уже UTF-8</p>")
                .insert_header("content-type", "text/html; charset=utf-8"),
        )
        .mount(&mock_server)
        .await;

    let mut credential = credential(&mock_server);
    let body = fetcher()
        .fetch(get(&mock_server, "/forum/viewtopic.php?t=1"), &mut credential)
        .await
        .expect("Fetch failed");

    assert_eq!(body, "<p>Уже UTF-8</p>");
}

#[tokio::test]
async fn test_fetch_server_error_is_status_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/forum/viewtopic.php"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let mut credential = credential(&mock_server);
    let err = fetcher()
        .fetch(get(&mock_server, "/forum/viewtopic.php?t=7"), &mut credential)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FetchErrorKind::Status);
    assert!(err.url().ends_with("/forum/viewtopic.php?t=7"));
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn test_fetch_sends_session_cookies() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/forum/viewtopic.php"))
        .and(header_regex("cookie", "bb_sid=xyz"))
        .and(header_regex("cookie", "bb_data=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_string("members only"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut credential = credential(&mock_server);
    let body = fetcher()
        .fetch(get(&mock_server, "/forum/viewtopic.php?t=1"), &mut credential)
        .await
        .expect("Fetch failed");

    assert_eq!(body, "members only");
}

#[tokio::test]
async fn test_redirect_carries_cookies_between_hops() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/forum/start.php"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("set-cookie", "hop=1; Path=/")
                .insert_header("location", "/forum/end.php"),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/forum/end.php"))
        .and(header_regex("cookie", "hop=1"))
        .and(header_regex("cookie", "bb_sid=xyz"))
        .respond_with(ResponseTemplate::new(200).set_body_string("arrived"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut credential = credential(&mock_server);
    let body = fetcher()
        .fetch(get(&mock_server, "/forum/start.php"), &mut credential)
        .await
        .expect("Fetch failed");

    assert_eq!(body, "arrived");
    assert_eq!(credential.len(), 3);
}

#[tokio::test]
async fn test_redirect_limit_returns_last_redirect() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/forum/loop.php"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/forum/loop.php"))
        .mount(&mock_server)
        .await;

    let config = HttpConfig {
        max_redirects: 3,
        ..HttpConfig::default()
    };
    let fetcher = Fetcher::new(&config).expect("Failed to build fetcher");

    let mut credential = credential(&mock_server);
    let err = fetcher
        .fetch(get(&mock_server, "/forum/loop.php"), &mut credential)
        .await
        .unwrap_err();

    match err {
        FetchError::Status { status, .. } => assert!(status.starts_with("302")),
        other => panic!("Expected status error, got {:?}", other),
    }

    // The original request plus three followed hops
    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 4);
}

#[tokio::test]
async fn test_snapshot_is_isolated_from_canonical() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/forum/viewtopic.php"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "bb_t=visited; Path=/")
                .set_body_string("ok"),
        )
        .mount(&mock_server)
        .await;

    let canonical = credential(&mock_server);
    let target = server_url(&mock_server, "/forum/viewtopic.php?t=1");
    let mut snapshot = canonical.snapshot(&target).unwrap();

    fetcher()
        .fetch(get(&mock_server, "/forum/viewtopic.php?t=1"), &mut snapshot)
        .await
        .expect("Fetch failed");

    assert_eq!(snapshot.len(), 3);
    assert_eq!(canonical.len(), 2);
    assert!(canonical
        .cookies()
        .unwrap()
        .iter()
        .all(|c| c.name != "bb_t"));
}

#[tokio::test]
async fn test_fetch_all_success_in_input_order() {
    let mock_server = MockServer::start().await;

    for n in 0..5 {
        Mock::given(method("GET"))
            .and(path("/forum/viewtopic.php"))
            .and(query_param("t", n.to_string()))
            .and(header_regex("cookie", "bb_sid=xyz"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!("topic body {}", n)))
            .expect(1)
            .mount(&mock_server)
            .await;
    }

    let targets: Vec<_> = (0..5).map(|n| topic(&mock_server, n)).collect();
    let options = BatchOptions {
        workers: 2,
        ..BatchOptions::default()
    };

    let credential = credential(&mock_server);
    let outcomes = fetch_all(targets.clone(), &credential, &fetcher(), &options).await;

    assert!(outcomes.is_success());
    assert_eq!(outcomes.len(), 5);
    for (n, result) in outcomes.results().iter().enumerate() {
        assert_eq!(result.index, n);
        assert_eq!(result.target, targets[n]);
        assert_eq!(result.body(), Some(format!("topic body {}", n).as_str()));
    }

    // Workers fetched with snapshots; the canonical credential is unchanged
    assert_eq!(credential.len(), 2);
}

#[tokio::test]
async fn test_fetch_all_reports_each_failure() {
    let mock_server = MockServer::start().await;

    for n in [0, 1] {
        Mock::given(method("GET"))
            .and(path("/forum/viewtopic.php"))
            .and(query_param("t", n.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_string("fine"))
            .mount(&mock_server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path("/forum/viewtopic.php"))
        .and(query_param("t", "2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let targets: Vec<_> = (0..3).map(|n| topic(&mock_server, n)).collect();
    let credential = credential(&mock_server);
    let outcomes = fetch_all(targets, &credential, &fetcher(), &BatchOptions::default()).await;

    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes.failure_count(), 1);
    assert_eq!(outcomes.successes().count(), 2);

    let failure = outcomes.into_result().unwrap_err();
    let errors: Vec<_> = failure.errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0.title, "Topic 2");
    assert_eq!(errors[0].1.kind(), FetchErrorKind::Status);
    assert!(failure.to_string().contains("viewtopic.php?t=2"));
}

#[tokio::test]
async fn test_fetch_all_transport_failure() {
    // Bind and release a port so that nothing is listening on it
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let url = Url::parse(&format!("http://127.0.0.1:{}/forum/viewtopic.php?t=1", port)).unwrap();
    let targets = vec![TargetDescriptor {
        title: "Unreachable".to_string(),
        url: url.clone(),
    }];
    let credential = SessionCredential::new(url);

    let outcomes = fetch_all(targets, &credential, &fetcher(), &BatchOptions::default()).await;

    assert_eq!(outcomes.failure_count(), 1);
    let error = outcomes.results()[0].error().unwrap();
    assert_eq!(error.kind(), FetchErrorKind::Transport);
}

/// Mounts `count` topics that each answer after `delay`
async fn mount_slow_topics(server: &MockServer, count: usize, delay: Duration) {
    for n in 0..count {
        Mock::given(method("GET"))
            .and(path("/forum/viewtopic.php"))
            .and(query_param("t", n.to_string()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!("slow body {}", n))
                    .set_delay(delay),
            )
            .mount(server)
            .await;
    }
}

#[tokio::test]
async fn test_fetch_all_never_exceeds_worker_count() {
    let mock_server = MockServer::start().await;
    let delay = Duration::from_millis(300);
    mount_slow_topics(&mock_server, 6, delay).await;

    let targets: Vec<_> = (0..6).map(|n| topic(&mock_server, n)).collect();
    let options = BatchOptions {
        workers: 2,
        ..BatchOptions::default()
    };

    let started = Instant::now();
    let outcomes = fetch_all(targets, &credential(&mock_server), &fetcher(), &options).await;
    let elapsed = started.elapsed();

    assert!(outcomes.is_success());
    assert_eq!(outcomes.len(), 6);
    // Two at a time means three rounds of the server delay
    assert!(
        elapsed >= delay * 3,
        "6 fetches on 2 workers finished in {:?}",
        elapsed
    );
}

#[tokio::test]
async fn test_fetch_all_cancels_in_flight_fetches() {
    let mock_server = MockServer::start().await;
    mount_slow_topics(&mock_server, 6, Duration::from_secs(3)).await;

    let targets: Vec<_> = (0..6).map(|n| topic(&mock_server, n)).collect();
    let options = BatchOptions {
        workers: 2,
        cancel_grace: Duration::from_millis(200),
        ..BatchOptions::default()
    };

    let cancel = options.cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        cancel.cancel();
    });

    let started = Instant::now();
    let outcomes = fetch_all(targets, &credential(&mock_server), &fetcher(), &options).await;
    let elapsed = started.elapsed();

    assert!(
        elapsed < Duration::from_secs(2),
        "cancelled batch took {:?}",
        elapsed
    );
    assert_eq!(outcomes.len(), 6);
    for (n, result) in outcomes.results().iter().enumerate() {
        assert_eq!(result.index, n);
        assert!(matches!(result.error(), Some(FetchError::Cancelled { .. })));
    }
}

#[tokio::test]
async fn test_fetch_finishing_within_grace_is_kept() {
    let mock_server = MockServer::start().await;
    mount_slow_topics(&mock_server, 1, Duration::from_millis(300)).await;

    let options = BatchOptions {
        workers: 1,
        cancel_grace: Duration::from_secs(3),
        ..BatchOptions::default()
    };

    let cancel = options.cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });

    let outcomes = fetch_all(
        vec![topic(&mock_server, 0)],
        &credential(&mock_server),
        &fetcher(),
        &options,
    )
    .await;

    assert!(outcomes.is_success());
    assert_eq!(outcomes.results()[0].body(), Some("slow body 0"));
}

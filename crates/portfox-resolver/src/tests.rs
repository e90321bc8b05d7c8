use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread::JoinHandle;

use portfox_core::{LifecycleError, Platform, PortfoxConfig, ReleaseChannel};

use crate::product_details::{parse_channel_version, ParseFailure};
use crate::{ProductDetailsResolver, VersionResolver};

const VERSIONS_JSON: &str = r#"{
  "FIREFOX_DEVEDITION": "122.0b3",
  "FIREFOX_ESR": "115.6.0esr",
  "LATEST_FIREFOX_DEVEL_VERSION": "122.0b3",
  "LATEST_FIREFOX_VERSION": "121.0.1"
}"#;

struct Route {
    path: &'static str,
    status: &'static str,
    body: String,
}

fn route(path: &'static str, body: impl Into<String>) -> Route {
    Route {
        path,
        status: "200 OK",
        body: body.into(),
    }
}

/// Serves `connections` requests, answering each by matching the request path.
fn start_route_server(routes: Vec<Route>, connections: usize) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("must bind route test server");
    let address = listener
        .local_addr()
        .expect("must read route test server address");
    let base = format!("http://{address}");
    let handle = std::thread::spawn(move || {
        for _ in 0..connections {
            let (mut stream, _) = listener.accept().expect("must accept test client");
            let mut request_buffer = [0_u8; 2048];
            let read = stream.read(&mut request_buffer).unwrap_or(0);
            let request = String::from_utf8_lossy(&request_buffer[..read]);
            let path = request
                .lines()
                .next()
                .and_then(|line| line.split_whitespace().nth(1))
                .unwrap_or("/")
                .to_string();

            let (status, body) = routes
                .iter()
                .find(|route| route.path == path)
                .map(|route| (route.status, route.body.as_str()))
                .unwrap_or(("404 Not Found", ""));
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream
                .write_all(response.as_bytes())
                .expect("must write test response");
            stream.flush().expect("must flush test response");
        }
    });
    (base, handle)
}

fn test_config(base: &str) -> PortfoxConfig {
    PortfoxConfig {
        versions_url: format!("{base}/1.0/firefox_versions.json"),
        releases_base_url: format!("{base}/pub/firefox/releases"),
        devedition_base_url: format!("{base}/pub/devedition/releases"),
        platform: Platform::Linux64,
        resolve_timeout_secs: 2,
        ..PortfoxConfig::default()
    }
}

#[test]
fn parse_channel_version_reads_each_channel_key() {
    let stable = parse_channel_version(VERSIONS_JSON, ReleaseChannel::Stable);
    assert!(matches!(stable, Ok(ref version) if version == "121.0.1"));
    let beta = parse_channel_version(VERSIONS_JSON, ReleaseChannel::Beta);
    assert!(matches!(beta, Ok(ref version) if version == "122.0b3"));
    let dev = parse_channel_version(VERSIONS_JSON, ReleaseChannel::DevEdition);
    assert!(matches!(dev, Ok(ref version) if version == "122.0b3"));
}

#[test]
fn parse_channel_version_distinguishes_missing_from_malformed() {
    let missing = parse_channel_version(r#"{"LATEST_FIREFOX_VERSION": ""}"#, ReleaseChannel::Stable);
    assert!(matches!(missing, Err(ParseFailure::Missing)));

    let absent = parse_channel_version("{}", ReleaseChannel::Beta);
    assert!(matches!(absent, Err(ParseFailure::Missing)));

    let not_json = parse_channel_version("<html>", ReleaseChannel::Stable);
    assert!(matches!(not_json, Err(ParseFailure::Malformed(_))));

    let wrong_type =
        parse_channel_version(r#"{"LATEST_FIREFOX_VERSION": 121}"#, ReleaseChannel::Stable);
    assert!(matches!(wrong_type, Err(ParseFailure::Malformed(_))));

    let bad_version = parse_channel_version(
        r#"{"LATEST_FIREFOX_VERSION": "121.0/../x"}"#,
        ReleaseChannel::Stable,
    );
    assert!(matches!(bad_version, Err(ParseFailure::Malformed(_))));
}

#[test]
fn resolve_returns_descriptor_with_published_digest() {
    let digest = "A".repeat(128);
    let sums = format!(
        "{}  linux-x86_64/en-US/firefox-121.0.1.tar.xz\n{}  win64/en-US/Firefox Setup 121.0.1.exe\n",
        digest,
        "b".repeat(128)
    );
    let (base, server) = start_route_server(
        vec![
            route("/1.0/firefox_versions.json", VERSIONS_JSON),
            route("/pub/firefox/releases/121.0.1/SHA512SUMS", sums),
        ],
        2,
    );
    let resolver = ProductDetailsResolver::new(test_config(&base)).expect("must build resolver");

    let descriptor = resolver
        .resolve(ReleaseChannel::Stable)
        .expect("must resolve stable");
    server.join().expect("server thread must join");

    assert_eq!(descriptor.info.version, "121.0.1");
    assert_eq!(descriptor.info.channel, ReleaseChannel::Stable);
    assert_eq!(
        descriptor.download_url,
        format!("{base}/pub/firefox/releases/121.0.1/linux-x86_64/en-US/firefox-121.0.1.tar.xz")
    );
    assert_eq!(descriptor.digest, Some("a".repeat(128)));
    assert_eq!(descriptor.file_name, "firefox-121.0.1.tar.xz");
}

#[test]
fn resolve_tolerates_missing_checksum_list() {
    let (base, server) = start_route_server(
        vec![route("/1.0/firefox_versions.json", VERSIONS_JSON)],
        2,
    );
    let resolver = ProductDetailsResolver::new(test_config(&base)).expect("must build resolver");

    let descriptor = resolver
        .resolve(ReleaseChannel::DevEdition)
        .expect("must resolve devedition");
    server.join().expect("server thread must join");

    assert_eq!(descriptor.info.version, "122.0b3");
    assert!(descriptor.digest.is_none());
    assert!(descriptor.download_url.contains("/pub/devedition/releases/122.0b3/"));
}

#[test]
fn resolve_reports_not_found_for_unpublished_channel() {
    let (base, server) = start_route_server(
        vec![route(
            "/1.0/firefox_versions.json",
            r#"{"LATEST_FIREFOX_VERSION": "121.0"}"#,
        )],
        1,
    );
    let resolver = ProductDetailsResolver::new(test_config(&base)).expect("must build resolver");

    let err = resolver
        .resolve(ReleaseChannel::Beta)
        .expect_err("beta must be missing");
    server.join().expect("server thread must join");

    assert!(
        matches!(err, LifecycleError::NotFound { ref channel } if channel == "beta"),
        "unexpected error: {err}"
    );
}

#[test]
fn resolve_reports_network_error_for_http_failure() {
    let (base, server) = start_route_server(Vec::new(), 1);
    let resolver = ProductDetailsResolver::new(test_config(&base)).expect("must build resolver");

    let err = resolver
        .resolve(ReleaseChannel::Stable)
        .expect_err("404 must fail");
    server.join().expect("server thread must join");

    assert!(matches!(err, LifecycleError::Network { .. }), "unexpected error: {err}");
    assert!(err.to_string().contains("404"), "unexpected error: {err}");
    assert!(err.is_retryable());
}

#[test]
fn resolve_reports_network_error_when_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("must bind");
    let address = listener.local_addr().expect("must read address");
    drop(listener);

    let resolver = ProductDetailsResolver::new(test_config(&format!("http://{address}")))
        .expect("must build resolver");
    let err = resolver
        .resolve(ReleaseChannel::Stable)
        .expect_err("closed port must fail");

    assert!(
        matches!(err, LifecycleError::Network { .. }),
        "unexpected error: {err}"
    );
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn resolve_times_out_on_silent_server() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("must bind silent server");
    let address = listener.local_addr().expect("must read address");
    let server = std::thread::spawn(move || {
        let (stream, _) = listener.accept().expect("must accept test client");
        std::thread::sleep(std::time::Duration::from_secs(3));
        drop(stream);
    });

    let mut config = test_config(&format!("http://{address}"));
    config.resolve_timeout_secs = 1;
    let resolver = ProductDetailsResolver::new(config).expect("must build resolver");

    let err = resolver
        .resolve(ReleaseChannel::Stable)
        .expect_err("silent server must time out");
    server.join().expect("server thread must join");

    assert!(
        matches!(err, LifecycleError::Timeout { after_secs: 1, .. }),
        "unexpected error: {err}"
    );
}

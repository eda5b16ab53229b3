//! Integration tests for the HTTP page source and the mail notifiers.
//!
//! Uses `wiremock` to stand up a local HTTP server for each test so no real
//! network traffic is made.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use kita_watch::error::AppError;
use kita_watch::models::{Config, MailTransport, NotifyConfig};
use kita_watch::pipeline::{CycleOutcome, Poller};
use kita_watch::services::{HttpSource, Notification, Notifier, PageSource, notifier};
use kita_watch::storage::{LocalStorage, SnapshotStore};
use kita_watch::utils::http::create_async_client;

const PAGE: &str = "<html><body><form><div>\
    <table><tr><td>Suche</td></tr></table>\
    <table>\
    <tr><td><a id=\"GridView1_HLinkKitaNr_0\" href=\"Einrichtung.aspx?ID=1001\">1001</a></td>\
    <td><span id=\"GridView1_lblKitaName_0\">Kita Sonnenschein</span></td>\
    <td><span id=\"GridView1_lblPlaetzeUnter3_0\">2</span></td>\
    <td><span id=\"GridView1_lblStdTaeglich_0\">7 - 9</span></td></tr>\
    <tr><td><a id=\"GridView1_HLinkKitaNr_1\" href=\"Einrichtung.aspx?ID=1001\">1001</a></td>\
    <td><span id=\"GridView1_lblKitaName_1\">Kita Sonnenschein</span></td>\
    <td><span id=\"GridView1_lblPlaetzeUnter3_1\">2</span></td>\
    <td><span id=\"GridView1_lblStdTaeglich_1\">9 - 12</span></td></tr>\
    </table></div></form></body></html>";

fn client_with_timeout(timeout_secs: u64) -> reqwest::Client {
    let mut config = Config::default();
    config.source.timeout_secs = timeout_secs;
    create_async_client(&config.source).expect("failed to build test client")
}

fn test_client() -> reqwest::Client {
    client_with_timeout(5)
}

#[tokio::test]
async fn fetch_returns_body_on_200() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/verzeichnis/FreiePlaetze.aspx"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
        .mount(&server)
        .await;

    let source = HttpSource::new(
        test_client(),
        format!("{}/verzeichnis/FreiePlaetze.aspx", server.uri()),
    );
    let html = source.fetch().await.expect("fetch should succeed");
    assert!(html.contains("GridView1_HLinkKitaNr_0"));
}

#[tokio::test]
async fn fetch_reports_non_200_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let source = HttpSource::new(test_client(), format!("{}/FreiePlaetze.aspx", server.uri()));
    let result = source.fetch().await;

    assert!(
        matches!(result, Err(AppError::Status { status: 503, .. })),
        "expected status error, got: {result:?}"
    );
}

#[tokio::test]
async fn fetch_treats_other_success_codes_as_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let source = HttpSource::new(test_client(), format!("{}/FreiePlaetze.aspx", server.uri()));
    assert!(matches!(
        source.fetch().await,
        Err(AppError::Status { status: 204, .. })
    ));
}

#[tokio::test]
async fn fetch_fails_when_request_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(PAGE)
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let source = HttpSource::new(
        client_with_timeout(1),
        format!("{}/FreiePlaetze.aspx", server.uri()),
    );
    let result = source.fetch().await;

    assert!(
        matches!(&result, Err(AppError::Http(e)) if e.is_timeout()),
        "expected timeout, got: {result:?}"
    );
}

#[tokio::test]
async fn timed_out_cycle_leaves_state_untouched() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(PAGE)
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let tmp = tempfile::TempDir::new().unwrap();
    let config = Config::default();
    let poller = Poller::new(
        &config,
        Box::new(HttpSource::new(
            client_with_timeout(1),
            format!("{}/FreiePlaetze.aspx", server.uri()),
        )),
        Box::new(LocalStorage::new(tmp.path())),
        notifier::from_config(&config.notify, test_client()).unwrap(),
    );

    let mut previous = None;
    let result = poller.run_cycle(&mut previous).await;

    assert!(matches!(result, Err(AppError::Http(_))));
    assert!(previous.is_none());
    let stored = LocalStorage::new(tmp.path()).load_previous().await.unwrap();
    assert!(stored.is_none());
}

#[tokio::test]
async fn smtp_notifier_reports_unreachable_server() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let config = NotifyConfig {
        enabled: true,
        host: "localhost".into(),
        port,
        sender: Some("watch@example.com".into()),
        recipients: vec!["parent@example.com".into()],
        ..NotifyConfig::default()
    };
    let notifier = notifier::from_config(&config, test_client()).unwrap();
    let notification = Notification {
        subject: "kita gefunden".into(),
        body: "line\n".into(),
        recipients: config.recipients.clone(),
    };

    assert!(matches!(
        notifier.notify(&notification).await,
        Err(AppError::Smtp(_))
    ));
}

#[tokio::test]
async fn webhook_notifier_posts_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/send"))
        .and(header_exists("authorization"))
        .and(body_json(json!({
            "from": "watch@example.com",
            "to": ["parent@example.com"],
            "subject": "kita gefunden",
            "text": "line\n"
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let config = NotifyConfig {
        enabled: true,
        transport: MailTransport::Relay,
        endpoint: Some(format!("{}/send", server.uri())),
        user: Some("watch".into()),
        password: Some("secret".into()),
        sender: Some("watch@example.com".into()),
        recipients: vec!["parent@example.com".into()],
        ..NotifyConfig::default()
    };
    let notifier = notifier::from_config(&config, test_client()).unwrap();

    let notification = Notification {
        subject: "kita gefunden".into(),
        body: "line\n".into(),
        recipients: config.recipients.clone(),
    };
    notifier.notify(&notification).await.expect("relay accepts message");
}

#[tokio::test]
async fn webhook_notifier_reports_relay_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = NotifyConfig {
        enabled: true,
        transport: MailTransport::Relay,
        endpoint: Some(format!("{}/send", server.uri())),
        recipients: vec!["parent@example.com".into()],
        ..NotifyConfig::default()
    };
    let notifier = notifier::from_config(&config, test_client()).unwrap();
    let notification = Notification {
        subject: "s".into(),
        body: "b".into(),
        recipients: config.recipients.clone(),
    };

    assert!(matches!(
        notifier.notify(&notification).await,
        Err(AppError::Notify(_))
    ));
}

#[tokio::test]
async fn poll_cycle_over_http_merges_rows_and_notifies_once() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/verzeichnis/FreiePlaetze.aspx"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/send"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let tmp = tempfile::TempDir::new().unwrap();
    let mut config = Config::default();
    config.source.base_url = format!("{}/verzeichnis/", server.uri());
    config.notify.enabled = true;
    config.notify.transport = MailTransport::Relay;
    config.notify.endpoint = Some(format!("{}/send", server.uri()));
    config.notify.recipients = vec!["parent@example.com".into()];

    let client = test_client();
    let poller = Poller::new(
        &config,
        Box::new(HttpSource::new(client.clone(), config.source.listing_url())),
        Box::new(LocalStorage::new(tmp.path())),
        notifier::from_config(&config.notify, client).unwrap(),
    );

    let mut previous = poller.load_previous().await;
    for _ in 0..2 {
        let outcome = poller.run_cycle(&mut previous).await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Completed(_)));
    }

    let stored = LocalStorage::new(tmp.path())
        .load_previous()
        .await
        .unwrap()
        .expect("snapshot persisted");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored.entities["1001"].daily_hours(), ["7 - 9", "9 - 12"]);
}

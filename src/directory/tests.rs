use super::*;
use serde_json::json;
use sha1::{Digest, Sha1};
use wiremock::matchers::{header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(base_url: &str) -> DirectoryConfig {
    DirectoryConfig {
        base_url: base_url.to_string(),
        auth_key: "key".into(),
        secret_key: "secret".into(),
        user_agent: "podcast-sync-test/1.0".into(),
        request_timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

fn feed(itunes_id: serde_json::Value, language: &str) -> serde_json::Value {
    json!({ "itunesId": itunes_id, "language": language, "lastUpdateTime": 1_700_000_000 })
}

async fn serve(body: serde_json::Value) -> MockServer {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/podcasts/updated"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&mock_server)
        .await;
    mock_server
}

#[tokio::test]
async fn sends_signed_request_with_window_and_max() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/podcasts/updated"))
        .and(query_param("max", "1000"))
        .and(header("X-Auth-Key", "key"))
        .and(header("User-Agent", "podcast-sync-test/1.0"))
        .and(header_exists("X-Auth-Date"))
        .and(header_exists("Authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "feeds": [] })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = DirectoryClient::new(&test_config(&mock_server.uri())).unwrap();
    let before = Utc::now().timestamp();
    let feeds = client
        .fetch_recently_updated(Duration::from_secs(600))
        .await
        .unwrap();
    let after = Utc::now().timestamp();
    assert!(feeds.is_empty());

    let requests = mock_server.received_requests().await.unwrap();
    let request = &requests[0];

    let date: i64 = request.headers["X-Auth-Date"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(date >= before && date <= after, "stale signing time {}", date);

    let expected = Sha1::digest(format!("keysecret{}", date).as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>();
    assert_eq!(request.headers["Authorization"].to_str().unwrap(), expected);

    let since: i64 = request
        .url
        .query_pairs()
        .find(|(k, _)| k == "since")
        .map(|(_, v)| v.parse().unwrap())
        .unwrap();
    assert!(since >= before - 600 && since <= after - 600);
}

#[tokio::test]
async fn each_request_is_signed_at_send_time() {
    let mock_server = serve(json!({ "feeds": [] })).await;
    let client = DirectoryClient::new(&test_config(&mock_server.uri())).unwrap();

    client
        .fetch_recently_updated(Duration::from_secs(60))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    client
        .fetch_recently_updated(Duration::from_secs(60))
        .await
        .unwrap();

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let dates: Vec<&str> = requests
        .iter()
        .map(|r| r.headers["X-Auth-Date"].to_str().unwrap())
        .collect();
    assert_ne!(dates[0], dates[1]);
    assert_ne!(
        requests[0].headers["Authorization"],
        requests[1].headers["Authorization"]
    );
}

#[tokio::test]
async fn drops_ineligible_entries_and_duplicates() {
    let mock_server = serve(json!({
        "status": "true",
        "feeds": [
            feed(json!(999), "en"),
            feed(json!(null), "en"),
            feed(json!(12), ""),
            { "itunesId": 13 },
            feed(json!("999"), "fr"),
            feed(json!(999), "en"),
            feed(json!(0), "en"),
            feed(json!(42), "es"),
        ],
        "count": 8
    }))
    .await;

    let client = DirectoryClient::new(&test_config(&mock_server.uri())).unwrap();
    let feeds = client
        .fetch_recently_updated(Duration::from_secs(600))
        .await
        .unwrap();

    let ids: Vec<&str> = feeds.iter().map(|f| f.external_id.as_str()).collect();
    assert_eq!(ids, vec!["999", "42"]);
    assert_eq!(feeds[0].language, "en");
}

#[tokio::test]
async fn bad_entries_are_dropped_individually() {
    let mock_server = serve(json!({
        "feeds": [
            { "itunesId": 1, "language": "en", "lastUpdateTime": 1_700_000_000 },
            { "itunesId": 2, "language": "en", "lastUpdateTime": "1700000000" },
            { "itunesId": 3, "language": "en", "lastUpdateTime": 1.7e9 },
            null,
            "75075",
            { "itunesId": 1234.0, "language": "en" },
            { "itunesId": 5, "language": "en", "lastUpdateTime": { "at": "noon" } },
        ]
    }))
    .await;

    let client = DirectoryClient::new(&test_config(&mock_server.uri())).unwrap();
    let feeds = client
        .fetch_recently_updated(Duration::from_secs(600))
        .await
        .unwrap();

    let ids: Vec<&str> = feeds.iter().map(|f| f.external_id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3", "1234", "5"]);
    assert!(
        feeds[..3]
            .iter()
            .all(|f| f.last_updated.map(|t| t.timestamp()) == Some(1_700_000_000))
    );
    assert_eq!(feeds[4].last_updated, None);
}

#[tokio::test]
async fn caps_result_at_one_thousand_ids() {
    let feeds: Vec<_> = (1..=1500).map(|i| feed(json!(i), "en")).collect();
    let mock_server = serve(json!({ "feeds": feeds })).await;

    let client = DirectoryClient::new(&test_config(&mock_server.uri())).unwrap();
    let result = client
        .fetch_recently_updated(Duration::from_secs(600))
        .await
        .unwrap();

    assert_eq!(result.len(), MAX_RECENTLY_UPDATED);
    assert_eq!(result[0].external_id, "1");
    assert_eq!(result[999].external_id, "1000");
}

#[tokio::test]
async fn non_success_status_is_an_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/podcasts/updated"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad auth"))
        .mount(&mock_server)
        .await;

    let client = DirectoryClient::new(&test_config(&mock_server.uri())).unwrap();
    let err = client
        .fetch_recently_updated(Duration::from_secs(600))
        .await
        .unwrap_err();
    assert!(matches!(err, DirectoryFetchError::Status { status: 401, .. }));
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/podcasts/updated"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"feeds\": [oops"))
        .mount(&mock_server)
        .await;

    let client = DirectoryClient::new(&test_config(&mock_server.uri())).unwrap();
    let err = client
        .fetch_recently_updated(Duration::from_secs(600))
        .await
        .unwrap_err();
    assert!(matches!(err, DirectoryFetchError::Decode(_)));

    // a body without the feeds list is rejected rather than read as empty
    let mock_server = serve(json!({ "status": "true" })).await;
    let client = DirectoryClient::new(&test_config(&mock_server.uri())).unwrap();
    let err = client
        .fetch_recently_updated(Duration::from_secs(600))
        .await
        .unwrap_err();
    assert!(matches!(err, DirectoryFetchError::Decode(_)));
}

#[tokio::test]
async fn slow_directory_times_out() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/podcasts/updated"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "feeds": [] }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&mock_server)
        .await;

    let mut config = test_config(&mock_server.uri());
    config.request_timeout = Duration::from_millis(200);
    let client = DirectoryClient::new(&config).unwrap();

    let err = client
        .fetch_recently_updated(Duration::from_secs(600))
        .await
        .unwrap_err();
    assert!(matches!(err, DirectoryFetchError::Timeout { .. }), "{:?}", err);
}

#[test]
fn rejects_unusable_base_urls() {
    let err = DirectoryClient::new(&test_config("not a url")).unwrap_err();
    assert!(matches!(err, DirectoryFetchError::InvalidBaseUrl(_)));

    let err = DirectoryClient::new(&test_config("ftp://example.com/api")).unwrap_err();
    assert!(matches!(err, DirectoryFetchError::InvalidBaseUrl(_)));
}

#[test]
fn endpoint_keeps_base_path() {
    let url = updated_endpoint("https://api.podcastindex.org/api/1.0/").unwrap();
    assert_eq!(
        url.as_str(),
        "https://api.podcastindex.org/api/1.0/podcasts/updated"
    );
}

//! HTTP-level tests of the platform client against a mock server

use shortsnap::platform::{FailureClass, SearchRequest, VideoApi, YoutubeClient};
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client_for(server: &MockServer) -> YoutubeClient {
    let base = Url::parse(&format!("{}/", server.uri())).unwrap();
    YoutubeClient::with_base_url("test-api-key", base)
}

fn search_request(query: &str) -> SearchRequest {
    SearchRequest {
        query: query.to_string(),
        published_after: Some(
            chrono::DateTime::parse_from_rfc3339("2024-06-01T00:00:00Z")
                .unwrap()
                .with_timezone(&chrono::Utc),
        ),
        page_size: 50,
        page_token: None,
    }
}

#[tokio::test]
async fn test_search_sends_expected_params_and_parses_ids() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "new music"))
        .and(query_param("type", "video"))
        .and(query_param("order", "date"))
        .and(query_param("maxResults", "50"))
        .and(query_param("publishedAfter", "2024-06-01T00:00:00Z"))
        .and(query_param("key", "test-api-key"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{
                "items": [
                    {"id": {"videoId": "vid-1"}},
                    {"id": {"videoId": "vid-2"}},
                    {"id": {"channelId": "not-a-video"}}
                ],
                "nextPageToken": "page-2"
            }"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let page = client.search_page(&search_request("new music")).await.unwrap();

    assert_eq!(page.ids, vec!["vid-1".to_string(), "vid-2".to_string()]);
    assert_eq!(page.next_page_token.as_deref(), Some("page-2"));
    assert_eq!(page.cost, 100);
}

#[tokio::test]
async fn test_cyrillic_query_localizes_search() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("relevanceLanguage", "ru"))
        .and(query_param("regionCode", "RU"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(r#"{"items": []}"#, "application/json"),
        )
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let page = client.search_page(&search_request("новая музыка")).await.unwrap();
    assert!(page.ids.is_empty());
}

#[tokio::test]
async fn test_quota_error_classifies_as_credential_exhausted() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(403).set_body_raw(
            r#"{
                "error": {
                    "code": 403,
                    "message": "The request cannot be completed because you have exceeded your quota.",
                    "errors": [{"reason": "quotaExceeded", "domain": "youtube.quota"}]
                }
            }"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client
        .search_page(&search_request("new music"))
        .await
        .unwrap_err();

    assert_eq!(err.status, Some(403));
    assert_eq!(err.reason.as_deref(), Some("quotaExceeded"));
    assert_eq!(err.classify(), FailureClass::CredentialExhausted);
}

#[tokio::test]
async fn test_video_details_parses_statistics_and_duration() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/videos"))
        .and(query_param("id", "vid-1,vid-2"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{
                "items": [{
                    "id": "vid-1",
                    "snippet": {
                        "title": "My track #music",
                        "description": "out now",
                        "tags": ["music"],
                        "channelId": "ch-1",
                        "channelTitle": "A Channel",
                        "publishedAt": "2024-06-10T09:30:00Z",
                        "defaultLanguage": "en"
                    },
                    "statistics": {
                        "viewCount": "15000",
                        "likeCount": "900",
                        "commentCount": "40"
                    },
                    "contentDetails": {"duration": "PT1M30S"},
                    "status": {"madeForKids": false}
                }, {
                    "id": "vid-2",
                    "snippet": {
                        "title": "no stats",
                        "channelId": "ch-2",
                        "publishedAt": "2024-06-10T10:00:00Z"
                    },
                    "statistics": {"viewCount": "10"}
                }]
            }"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let details = client
        .video_details(&["vid-1".to_string(), "vid-2".to_string()])
        .await
        .unwrap();

    assert_eq!(details.len(), 2);
    let first = &details[0];
    assert_eq!(first.id, "vid-1");
    assert_eq!(first.view_count, Some(15_000));
    assert_eq!(first.like_count, Some(900));
    assert_eq!(first.duration_secs, Some(90));
    assert_eq!(first.channel_id, "ch-1");
    assert!(!first.made_for_kids);

    // Counters the platform withheld stay unknown
    let second = &details[1];
    assert_eq!(second.view_count, Some(10));
    assert_eq!(second.like_count, None);
    assert_eq!(second.comment_count, None);
    assert_eq!(second.duration_secs, None);
}

#[tokio::test]
async fn test_channel_details_not_found_is_none() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/channels"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(r#"{"items": []}"#, "application/json"),
        )
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let channel = client.channel_details("gone").await.unwrap();
    assert!(channel.is_none());
}

#[tokio::test]
async fn test_channel_details_parses_attributes() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/channels"))
        .and(query_param("id", "ch-1"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{
                "items": [{
                    "snippet": {"title": "A Channel", "country": "DE"},
                    "statistics": {
                        "subscriberCount": "44000",
                        "videoCount": "213",
                        "viewCount": "9800000"
                    }
                }]
            }"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let channel = client.channel_details("ch-1").await.unwrap().unwrap();

    assert_eq!(channel.title, "A Channel");
    assert_eq!(channel.subscriber_count, Some(44_000));
    assert_eq!(channel.video_count, Some(213));
    assert_eq!(channel.view_count, Some(9_800_000));
    assert_eq!(channel.country, "DE");
}

#[tokio::test]
async fn test_top_comments_parses_threads() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/commentThreads"))
        .and(query_param("videoId", "vid-1"))
        .and(query_param("order", "relevance"))
        .and(query_param("maxResults", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{
                "items": [{
                    "snippet": {
                        "totalReplyCount": 3,
                        "topLevelComment": {
                            "snippet": {
                                "textDisplay": "great track",
                                "likeCount": 12,
                                "authorDisplayName": "@viewer",
                                "publishedAt": "2024-06-11T08:00:00Z"
                            }
                        }
                    }
                }]
            }"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let comments = client.top_comments("vid-1", 100).await.unwrap();

    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].text, "great track");
    assert_eq!(comments[0].like_count, 12);
    assert_eq!(comments[0].reply_count, 3);
    assert_eq!(comments[0].author, "@viewer");
}

#[tokio::test]
async fn test_comments_disabled_classifies_permanent() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/commentThreads"))
        .respond_with(ResponseTemplate::new(403).set_body_raw(
            r#"{
                "error": {
                    "code": 403,
                    "message": "The video identified by videoId has disabled comments.",
                    "errors": [{"reason": "commentsDisabled"}]
                }
            }"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client.top_comments("vid-1", 100).await.unwrap_err();
    assert_eq!(err.classify(), FailureClass::PermanentlyDisabled);
}

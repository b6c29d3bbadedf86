use pipeline::{SearchError, SearchGateway};
use pretty_assertions::assert_eq;
use search::{TavilyClient, TavilyConfig, TavilyTopic};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> TavilyClient {
    let config = TavilyConfig::new("tvly-test").with_endpoint(format!("{}/search", server.uri()));
    TavilyClient::new(config).unwrap()
}

#[tokio::test]
async fn results_are_mapped_and_capped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(header("authorization", "Bearer tvly-test"))
        .and(body_json(json!({
            "query": "quantum computing basics",
            "max_results": 2,
            "topic": "general",
            "include_raw_content": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "query": "quantum computing basics",
            "results": [
                {"url": "https://a.example", "title": "A", "content": "snippet a",
                 "raw_content": "full a", "score": 0.9},
                {"url": "https://b.example", "title": "B", "content": "snippet b",
                 "raw_content": null, "score": 0.8},
                {"url": "https://c.example", "title": "C", "content": "snippet c", "score": 0.1}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let results = client(&server)
        .search("quantum computing basics", 2)
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].url, "https://a.example");
    assert_eq!(results[0].best_content(), "full a");
    assert_eq!(results[1].raw_content, None);
    assert_eq!(results[1].best_content(), "snippet b");
}

#[tokio::test]
async fn topic_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_json(json!({
            "query": "rates",
            "max_results": 3,
            "topic": "finance",
            "include_raw_content": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .expect(1)
        .mount(&server)
        .await;

    let config = TavilyConfig::new("tvly-test")
        .with_endpoint(server.uri())
        .with_topic(TavilyTopic::Finance);
    let results = TavilyClient::new(config)
        .unwrap()
        .search("rates", 3)
        .await
        .unwrap();

    assert!(results.is_empty());
}

#[tokio::test]
async fn api_errors_become_provider_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let err = client(&server).search("anything", 3).await.unwrap_err();

    assert_eq!(
        err,
        SearchError::Provider {
            status: 401,
            message: "invalid api key".into()
        }
    );
}

#[tokio::test]
async fn malformed_body_is_an_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = client(&server).search("anything", 3).await.unwrap_err();

    assert!(matches!(err, SearchError::InvalidResponse(_)));
}

#[test]
fn query_limit_is_under_tavily_cap() {
    let client = TavilyClient::new(TavilyConfig::new("k")).unwrap();
    assert_eq!(client.max_query_chars(), 380);
}

//! HTTP tagger against a mock sidecar.

use lore_tagger::{Error, HttpTagger, TagRequest, Tagger, TaggerConfig};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn tagger_for(server: &MockServer) -> HttpTagger {
    HttpTagger::new(TaggerConfig {
        url: format!("{}/tag", server.uri()),
        timeout_secs: 2,
    })
    .expect("Failed to create tagger")
}

fn request() -> TagRequest {
    TagRequest {
        note_id: 12,
        text: "Aria cast Fireball at Bree".to_string(),
        user_id: 4,
    }
}

#[tokio::test]
async fn test_tag_posts_note_and_parses_proposals() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/tag"))
        .and(body_json(serde_json::json!({
            "note_id": 12,
            "text": "Aria cast Fireball at Bree",
            "user_id": 4
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"name": "Aria", "type": "PERSON", "start": 0, "end": 4,
             "confidence": 0.93, "source": "PHRASEMATCHER_EXACT"},
            {"name": "Fireball", "type": "SPELL", "start": 10, "end": 18}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let proposals = tagger_for(&server).tag(&request()).await.unwrap();

    assert_eq!(proposals.len(), 2);
    assert_eq!(proposals[0].name, "Aria");
    assert_eq!(proposals[0].node_type, "PERSON");
    assert_eq!(proposals[0].source.as_deref(), Some("PHRASEMATCHER_EXACT"));
    assert!((proposals[0].confidence.unwrap() - 0.93).abs() < 0.001);
    assert_eq!((proposals[1].start, proposals[1].end), (10, 18));
    assert!(proposals[1].confidence.is_none());
    assert!(proposals[1].source.is_none());
}

#[tokio::test]
async fn test_tag_empty_array() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tag"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;

    let proposals = tagger_for(&server).tag(&request()).await.unwrap();
    assert!(proposals.is_empty());
}

#[tokio::test]
async fn test_tag_error_status_is_tagger_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tag"))
        .respond_with(ResponseTemplate::new(503).set_body_string("model loading"))
        .mount(&server)
        .await;

    let err = tagger_for(&server).tag(&request()).await.unwrap_err();
    match err {
        Error::Tagger(message) => {
            assert!(message.contains("503"), "unexpected message: {}", message);
            assert!(message.contains("model loading"));
        }
        other => panic!("expected tagger error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_tag_malformed_payload_is_tagger_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tag"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"entities": "nope"})),
        )
        .mount(&server)
        .await;

    let err = tagger_for(&server).tag(&request()).await.unwrap_err();
    assert!(matches!(err, Error::Tagger(ref m) if m.starts_with("Malformed tagger response")));
}

#[tokio::test]
async fn test_tag_unreachable_is_tagger_error() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let tagger = HttpTagger::new(TaggerConfig {
        url: format!("{}/tag", uri),
        timeout_secs: 1,
    })
    .unwrap();
    let err = tagger.tag(&request()).await.unwrap_err();
    assert!(matches!(err, Error::Tagger(_)));
}

#[tokio::test]
async fn test_health_check() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})))
        .mount(&server)
        .await;

    assert!(tagger_for(&server).health_check().await.unwrap());
}

#[tokio::test]
async fn test_health_check_down() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let tagger = tagger_for(&server);
    assert!(!tagger.health_check().await.unwrap());
    assert_eq!(tagger.name(), "http");
}

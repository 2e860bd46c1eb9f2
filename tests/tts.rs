//! Cloud TTS upstream tests: service account auth and synthesis against a mock Google API

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use base64::Engine;
use pickleball_guru::api::{ApiServerBuilder, TtsBackend};
use pickleball_guru::config::TtsConfig;
use pickleball_guru::tts::{CloudSynthesizer, GoogleTts, ServiceAccount, SynthesisError};
use secrecy::SecretString;
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{body_string_contains, header as header_is, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TEST_KEY_PEM: &str = include_str!("fixtures/test_service_account_key.pem");
const AUDIO: &[u8] = b"ID3\x04synthesized";

fn tts_config(server: &MockServer) -> TtsConfig {
    let credentials = json!({
        "type": "service_account",
        "project_id": "pickleball-guru-test",
        "client_email": "tts@pickleball-guru-test.iam.gserviceaccount.com",
        "private_key": TEST_KEY_PEM,
        "token_uri": format!("{}/token", server.uri()),
    });
    TtsConfig {
        credentials_json: Some(SecretString::from(credentials.to_string())),
        endpoint: format!("{}/v1", server.uri()),
        ..TtsConfig::default()
    }
}

fn google_tts(server: &MockServer) -> GoogleTts {
    let config = tts_config(server);
    let account = ServiceAccount::from_json(config.credentials_json.as_ref()).unwrap();
    GoogleTts::new(account, &config)
}

async fn mount_token(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("assertion="))
        .and(body_string_contains("jwt-bearer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.test-token",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn mount_synthesize(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/v1/text:synthesize"))
        .and(header_is("authorization", "Bearer ya29.test-token"))
        .respond_with(response)
        .mount(server)
        .await;
}

fn audio_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "audioContent": base64::engine::general_purpose::STANDARD.encode(AUDIO)
    }))
}

async fn synthesize_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path().ends_with("text:synthesize"))
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

#[tokio::test]
async fn test_synthesize_decodes_audio_and_reuses_token() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    mount_synthesize(&server, audio_response()).await;

    let tts = google_tts(&server);
    assert_eq!(tts.voice_label(), "en-US-Standard-I (en-US)");

    assert_eq!(tts.synthesize("Hello world").await.unwrap(), AUDIO);
    assert_eq!(tts.synthesize("Again").await.unwrap(), AUDIO);

    let bodies = synthesize_bodies(&server).await;
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0]["input"]["text"], "Hello world");
    assert_eq!(bodies[0]["voice"]["name"], "en-US-Standard-I");
    assert_eq!(bodies[0]["voice"]["languageCode"], "en-US");
    assert_eq!(bodies[0]["audioConfig"]["audioEncoding"], "MP3");
}

#[tokio::test]
async fn test_forbidden_is_permission_denied() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    mount_synthesize(
        &server,
        ResponseTemplate::new(403).set_body_json(json!({
            "error": { "code": 403, "status": "PERMISSION_DENIED" }
        })),
    )
    .await;

    let err = google_tts(&server).synthesize("Hi").await.unwrap_err();
    assert!(matches!(err, SynthesisError::PermissionDenied(_)));
}

#[tokio::test]
async fn test_rejected_token_request_fails_synthesis() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })))
        .mount(&server)
        .await;

    let err = google_tts(&server).synthesize("Hi").await.unwrap_err();
    assert!(matches!(err, SynthesisError::Failed(_)));
    assert!(synthesize_bodies(&server).await.is_empty());
}

#[tokio::test]
async fn test_invalid_private_key_fails_without_token_request() {
    let server = MockServer::start().await;
    let mut config = tts_config(&server);
    config.credentials_json = Some(SecretString::from(
        json!({
            "client_email": "tts@example.iam.gserviceaccount.com",
            "private_key": "not a pem",
            "token_uri": format!("{}/token", server.uri()),
        })
        .to_string(),
    ));
    let account = ServiceAccount::from_json(config.credentials_json.as_ref()).unwrap();

    let err = GoogleTts::new(account, &config)
        .synthesize("Hi")
        .await
        .unwrap_err();
    assert!(matches!(err, SynthesisError::Failed(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_proxy_end_to_end_cleans_text() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    mount_synthesize(&server, audio_response()).await;

    let backend = TtsBackend::from_config(&tts_config(&server));
    assert!(matches!(backend, TtsBackend::Ready(_)));
    let app = ApiServerBuilder::new(0).tts_backend(backend).build().router();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/tts")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"text":"Hello *world*"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], AUDIO);

    let bodies = synthesize_bodies(&server).await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["input"]["text"], "Hello world");
}

//! Delivery client behavior against a mock destination.

use std::time::Duration;

use webhookhub_delivery::{ClientConfig, DeliveryClient, DeliveryOutcome};
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn successful_post_classifies_as_success() {
    let mock_server = MockServer::start().await;

    Mock::given(matchers::method("POST"))
        .and(matchers::path("/hook"))
        .and(matchers::header("content-type", "application/json"))
        .and(matchers::body_string(r#"{"ref":"main"}"#))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = DeliveryClient::with_defaults().expect("client");
    let outcome = client.post(&format!("{}/hook", mock_server.uri()), r#"{"ref":"main"}"#).await;

    assert_eq!(outcome, DeliveryOutcome::Success { status: 200 });
    mock_server.verify().await;
}

#[tokio::test]
async fn client_error_is_terminal() {
    let mock_server = MockServer::start().await;

    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&mock_server)
        .await;

    let client = DeliveryClient::with_defaults().expect("client");
    let outcome = client.post(&format!("{}/hook", mock_server.uri()), "{}").await;

    match outcome {
        DeliveryOutcome::Failure { message, status_code, retryable } => {
            assert_eq!(status_code, Some(400));
            assert!(!retryable);
            assert!(message.contains("HTTP 400"));
        },
        DeliveryOutcome::Success { .. } => unreachable!("400 is not a success"),
    }
}

#[tokio::test]
async fn server_error_is_retryable() {
    let mock_server = MockServer::start().await;

    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let client = DeliveryClient::with_defaults().expect("client");
    let outcome = client.post(&format!("{}/hook", mock_server.uri()), "{}").await;

    match outcome {
        DeliveryOutcome::Failure { status_code, retryable, .. } => {
            assert_eq!(status_code, Some(503));
            assert!(retryable);
        },
        DeliveryOutcome::Success { .. } => unreachable!("503 is not a success"),
    }
}

#[tokio::test]
async fn rate_limit_is_retryable() {
    let mock_server = MockServer::start().await;

    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&mock_server)
        .await;

    let client = DeliveryClient::with_defaults().expect("client");
    let outcome = client.post(&format!("{}/hook", mock_server.uri()), "{}").await;

    match outcome {
        DeliveryOutcome::Failure { status_code, retryable, .. } => {
            assert_eq!(status_code, Some(429));
            assert!(retryable);
        },
        DeliveryOutcome::Success { .. } => unreachable!("429 is not a success"),
    }
}

#[tokio::test]
async fn redirect_is_not_followed_and_is_terminal() {
    let mock_server = MockServer::start().await;

    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "https://elsewhere"))
        .mount(&mock_server)
        .await;

    let client = DeliveryClient::with_defaults().expect("client");
    let outcome = client.post(&format!("{}/hook", mock_server.uri()), "{}").await;

    match outcome {
        DeliveryOutcome::Failure { status_code, retryable, .. } => {
            assert_eq!(status_code, Some(302));
            assert!(!retryable);
        },
        DeliveryOutcome::Success { .. } => unreachable!("302 is not a success"),
    }
}

#[tokio::test]
async fn connection_failure_is_retryable_without_status() {
    // Nothing listens here; the connect attempt itself fails.
    let client = DeliveryClient::with_defaults().expect("client");
    let outcome = client.post("http://127.0.0.1:9/hook", "{}").await;

    match outcome {
        DeliveryOutcome::Failure { status_code, retryable, message } => {
            assert_eq!(status_code, None);
            assert!(retryable);
            assert!(!message.is_empty());
        },
        DeliveryOutcome::Success { .. } => unreachable!("connect failure is not a success"),
    }
}

#[tokio::test]
async fn stalled_destination_times_out_as_retryable() {
    let mock_server = MockServer::start().await;

    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&mock_server)
        .await;

    let config = ClientConfig { request_timeout: Duration::from_millis(250), ..Default::default() };
    let client = DeliveryClient::new(config).expect("client");
    let outcome = client.post(&format!("{}/hook", mock_server.uri()), "{}").await;

    match outcome {
        DeliveryOutcome::Failure { status_code, retryable, .. } => {
            assert_eq!(status_code, None);
            assert!(retryable);
        },
        DeliveryOutcome::Success { .. } => unreachable!("timeout is not a success"),
    }
}

#[tokio::test]
async fn payload_bytes_pass_through_unchanged() {
    let mock_server = MockServer::start().await;
    let payload = "{\"text\":\"caf\u{e9} \\u0000 escapes\",\"n\":1}";

    Mock::given(matchers::method("POST"))
        .and(matchers::body_string(payload))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = DeliveryClient::with_defaults().expect("client");
    let outcome = client.post(&format!("{}/hook", mock_server.uri()), payload).await;

    assert!(outcome.is_success());
    mock_server.verify().await;
}

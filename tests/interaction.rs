//! Integration tests for the visit/wait interaction handshake.

use bakery_client::protocol::{CONTENT_TYPE_HEADER, JSON_CONTENT_TYPE, MACAROONS_HEADER};
use bakery_client::{
    AuthorizationError, BakeryClient, BakeryError, ErrorInfo, HeaderValue, HttpResponse,
    MAX_WAIT_ATTEMPTS,
};
use serde_json::json;

mod support;
use support::fakes::{
    RecordingVisitPage, SERVICE_URL, ScriptedTransport, VISIT_URL, WAIT_URL, charmstore_storage,
    client_with, interaction_required,
};

fn resource_url() -> String {
    format!("{SERVICE_URL}/v5/whoami")
}

#[tokio::test]
async fn test_interaction_then_replay() {
    let transport = ScriptedTransport::new();
    transport
        .respond_json(&resource_url(), 401, &interaction_required(VISIT_URL, WAIT_URL))
        .respond(WAIT_URL, HttpResponse::new(200, "{}"))
        .respond(&resource_url(), HttpResponse::new(200, "doctor"));
    let visit_page = RecordingVisitPage::new();
    let client = client_with(&transport, &visit_page);

    let response = client
        .put(&resource_url(), r#"{"name":"doctor"}"#)
        .await
        .unwrap();
    assert_eq!(response.body, "doctor");
    assert_eq!(visit_page.visited(), vec![VISIT_URL.to_string()]);
    assert_eq!(
        transport.request_urls(),
        vec![resource_url(), WAIT_URL.to_string(), resource_url()]
    );

    let requests = transport.requests();
    let wait = &requests[1];
    assert_eq!(wait.method, "get");
    assert_eq!(
        wait.header(CONTENT_TYPE_HEADER),
        Some(&HeaderValue::Text(JSON_CONTENT_TYPE.to_string()))
    );
    assert_eq!(wait.body, None);
    assert!(!wait.with_credentials);

    // The replay is the original request verbatim.
    assert_eq!(requests[2].method, "put");
    assert_eq!(requests[2].body.as_deref(), Some(r#"{"name":"doctor"}"#));
}

#[tokio::test]
async fn test_wait_request_carries_no_stored_credential() {
    let transport = ScriptedTransport::new();
    transport
        .respond_json(&resource_url(), 401, &interaction_required(VISIT_URL, WAIT_URL))
        .respond(WAIT_URL, HttpResponse::new(200, "{}"));
    let client = client_with(&transport, &RecordingVisitPage::new());
    client.storage().set(WAIT_URL, "identity-credential").unwrap();

    client.get(&resource_url()).await.unwrap();
    assert_eq!(transport.requests_to(WAIT_URL)[0].header(MACAROONS_HEADER), None);
}

#[tokio::test]
async fn test_transient_wait_failures_are_retried() {
    let transport = ScriptedTransport::new();
    transport.respond_json(&resource_url(), 401, &interaction_required(VISIT_URL, WAIT_URL));
    for _ in 0..MAX_WAIT_ATTEMPTS - 1 {
        transport.respond(WAIT_URL, HttpResponse::no_response());
    }
    transport
        .respond(WAIT_URL, HttpResponse::new(200, "{}"))
        .respond(&resource_url(), HttpResponse::new(200, "doctor"));
    let visit_page = RecordingVisitPage::new();
    let client = client_with(&transport, &visit_page);

    let response = client.get(&resource_url()).await.unwrap();
    assert_eq!(response.body, "doctor");
    assert_eq!(transport.requests_to(WAIT_URL).len(), 6);
    assert_eq!(visit_page.visited().len(), 1);
}

#[tokio::test]
async fn test_wait_gives_up_after_max_attempts() {
    let transport = ScriptedTransport::new();
    transport.respond_json(&resource_url(), 401, &interaction_required(VISIT_URL, WAIT_URL));
    for _ in 0..10 {
        transport.respond(WAIT_URL, HttpResponse::no_response());
    }
    let client = client_with(&transport, &RecordingVisitPage::new());

    let error = client.get(&resource_url()).await.unwrap_err();
    assert!(matches!(error, BakeryError::Interaction(_)), "{error:?}");
    assert!(error.to_string().starts_with("cannot interact: "), "{error}");
    assert_eq!(transport.requests_to(WAIT_URL).len(), 6);
    assert_eq!(transport.requests_to(&resource_url()).len(), 1);
}

#[tokio::test]
async fn test_wait_error_message_is_reported() {
    let transport = ScriptedTransport::new();
    transport
        .respond_json(&resource_url(), 401, &interaction_required(VISIT_URL, WAIT_URL))
        .respond_json(
            WAIT_URL,
            401,
            &json!({"Code": "interaction failed", "Message": "user cancelled login"}),
        );
    let client = client_with(&transport, &RecordingVisitPage::new());

    let error = client.get(&resource_url()).await.unwrap_err();
    assert_eq!(error.to_string(), "cannot interact: user cancelled login");
    assert_eq!(transport.requests_to(WAIT_URL).len(), 1);
}

#[tokio::test]
async fn test_wait_http_failure_without_structured_error() {
    let transport = ScriptedTransport::new();
    transport
        .respond_json(&resource_url(), 401, &interaction_required(VISIT_URL, WAIT_URL))
        .respond(WAIT_URL, HttpResponse::new(502, "bad gateway"));
    let client = client_with(&transport, &RecordingVisitPage::new());

    let error = client.get(&resource_url()).await.unwrap_err();
    assert_eq!(
        error.to_string(),
        "cannot interact: wait request failed with HTTP 502"
    );
}

#[tokio::test]
async fn test_missing_wait_url_sends_nothing() {
    let transport = ScriptedTransport::new();
    transport.respond_json(
        &resource_url(),
        401,
        &json!({"Code": "interaction required", "Info": {"VisitURL": VISIT_URL}}),
    );
    let visit_page = RecordingVisitPage::new();
    let client = client_with(&transport, &visit_page);

    let error = client.get(&resource_url()).await.unwrap_err();
    assert_eq!(
        error.to_string(),
        "cannot interact: missing visit or wait URL"
    );
    assert!(visit_page.visited().is_empty());
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn test_visit_page_failure_still_polls() {
    let transport = ScriptedTransport::new();
    transport
        .respond_json(&resource_url(), 401, &interaction_required(VISIT_URL, WAIT_URL))
        .respond(WAIT_URL, HttpResponse::new(200, "{}"))
        .respond(&resource_url(), HttpResponse::new(200, "doctor"));
    let visit_page = RecordingVisitPage::failing();
    let client = client_with(&transport, &visit_page);

    let response = client.get(&resource_url()).await.unwrap();
    assert_eq!(response.body, "doctor");
    assert_eq!(visit_page.visited().len(), 1);
}

#[tokio::test]
async fn test_legacy_interaction_urls_are_used() {
    let transport = ScriptedTransport::new();
    transport
        .respond_json(
            &resource_url(),
            401,
            &json!({
                "Code": "interaction required",
                "Info": {"LegacyVisitURL": VISIT_URL, "LegacyWaitURL": WAIT_URL}
            }),
        )
        .respond(WAIT_URL, HttpResponse::new(200, "{}"))
        .respond(&resource_url(), HttpResponse::new(200, "doctor"));
    let visit_page = RecordingVisitPage::new();
    let client = client_with(&transport, &visit_page);

    client.get(&resource_url()).await.unwrap();
    assert_eq!(visit_page.visited(), vec![VISIT_URL.to_string()]);
    assert_eq!(transport.requests_to(WAIT_URL).len(), 1);
}

#[tokio::test]
async fn test_configured_wait_method() {
    let transport = ScriptedTransport::new();
    transport.respond(WAIT_URL, HttpResponse::new(200, "{}"));
    let client = BakeryClient::builder(transport.clone(), charmstore_storage())
        .visit_page(RecordingVisitPage::new())
        .wait_method("POST")
        .build();

    let error = AuthorizationError {
        code: "interaction required".to_string(),
        info: ErrorInfo {
            visit_url: Some(VISIT_URL.to_string()),
            wait_url: Some(WAIT_URL.to_string()),
            ..ErrorInfo::default()
        },
        ..AuthorizationError::default()
    };
    client.interact(&error).await.unwrap();
    assert_eq!(transport.requests()[0].method, "post");
}

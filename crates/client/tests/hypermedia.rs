mod common;

use herald_client::{Action, ErrorKind, LoginRequest};
use serde_json::json;

use common::{Harness, Mock};

async fn signed_in() -> Harness {
    let h = Harness::new().await;
    h.session
        .login(&LoginRequest::new("a@b.com", "secret"))
        .await
        .unwrap();
    h
}

#[tokio::test]
async fn only_offered_actions_are_followed() {
    let h = signed_in().await;
    let notification = h.client().get("/notifications/42").await.unwrap();

    let actions = notification.available_actions();
    assert!(actions.contains(&Action::Approve));
    assert!(!actions.contains(&Action::Deny));

    let approved = h
        .client()
        .follow_link(&notification, "approve", None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(approved.field::<String>("status").as_deref(), Some("approved"));
    assert_eq!(Mock::count(&h.mock().approve_calls), 1);

    let denied = h
        .client()
        .follow_link(&notification, "deny", None)
        .await
        .unwrap();
    assert!(denied.is_none());
    assert_eq!(Mock::count(&h.mock().deny_calls), 0);
}

#[tokio::test]
async fn unknown_link_method_is_a_validation_error() {
    let h = signed_in().await;
    let notification = h.client().get("/notifications/42").await.unwrap();

    let err = h
        .client()
        .follow_link(&notification, "purge", None)
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Validation);
    assert!(!err.retryable);
    assert_eq!(Mock::count(&h.mock().purge_calls), 0);
}

#[tokio::test]
async fn forbidden_is_returned_without_ending_the_session() {
    let h = signed_in().await;

    let err = h.client().get("/problems/forbidden").await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Authorization);
    assert_eq!(err.status, Some(403));
    assert_eq!(err.detail, "missing audit:view");
    assert!(!err.retryable);
    assert!(h.session.is_authenticated());
    assert_eq!(h.invalidations(), 0);
}

#[tokio::test]
async fn validation_problem_carries_field_messages() {
    let h = signed_in().await;

    let err = h
        .client()
        .post("/problems/invalid", &json!({ "email": "" }))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(err.title.as_deref(), Some("Validation failed"));
    assert_eq!(err.field_message("email"), Some("must not be empty"));
    assert!(!err.retryable);
}

#[tokio::test]
async fn server_failures_are_retryable() {
    let h = signed_in().await;

    let err = h.client().get("/problems/unavailable").await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Server);
    assert_eq!(err.detail, "upstream down");
    assert!(err.retryable);
}

#[tokio::test]
async fn malformed_success_body_is_a_network_failure() {
    let h = signed_in().await;

    let err = h.client().get("/problems/malformed").await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Network);
    assert!(err.retryable);
    assert!(err.status.is_none());
}

#[tokio::test]
async fn timeout_is_a_network_failure() {
    let h = signed_in().await;

    let err = h.client().get("/slow").await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Network);
    assert_eq!(err.detail, "request timed out");
    assert!(err.retryable);
}

#[tokio::test]
async fn unreachable_server_is_a_network_failure() {
    let h = Harness::new().await;
    let mut config = h.server.config();
    config.api_url = "http://127.0.0.1:9".to_string();
    let client = herald_client::HalClient::new(
        &config,
        h.client().store().clone(),
        h.client().bus().clone(),
    )
    .unwrap();

    let err = client.get("/echo").await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Network);
    assert!(err.retryable);
}

#[tokio::test]
async fn embedded_collections_are_exposed() {
    let h = signed_in().await;
    let org = h
        .client()
        .get(&format!("/organizations/{}", common::ORG_ID))
        .await
        .unwrap();

    assert!(org.has_link("self"));
    assert!(org.embedded("members").is_empty());
    assert_eq!(org.field::<String>("name").as_deref(), Some("Acme"));
}

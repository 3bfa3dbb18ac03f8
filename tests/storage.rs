//! Integration tests for credential storage through the public API.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bakery_client::storage::DEFAULT_COOKIE_SERVICE;
use bakery_client::{CredentialStore, FileStore, InMemoryStore, KeyValueStore, StoreError};
use serde_json::json;
use tempfile::TempDir;

mod support;
use support::fakes::RecordingCookieSetter;

fn services() -> [(&'static str, &'static str); 3] {
    [
        ("charmstore", "http://example.com/charmstore"),
        ("identity", "http://example.com/identity"),
        ("charmstore-beta", "http://example.com/charmstore/beta"),
    ]
}

#[test]
fn test_key_derivation_rules() {
    let store = CredentialStore::builder(Arc::new(InMemoryStore::new()))
        .services(services())
        .build();

    let cases = [
        ("http://example.com/charmstore", "charmstore"),
        ("http://example.com/charmstore/v5/meta", "charmstore"),
        ("http://example.com/charmstore/discharge", "charmstore"),
        ("http://example.com/identity/discharge", "identity"),
        ("http://example.com/charmstore/beta/v5", "charmstore-beta"),
        ("http://example.com/other", "http://example.com/other"),
        ("http://example.com/other/discharge", "http://example.com/other"),
    ];
    for (url, expected) in cases {
        assert_eq!(store.key_for(url), expected, "key for {url}");
    }
}

#[test]
fn test_file_backed_store_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bakery").join("credentials.json");

    let first = CredentialStore::builder(Arc::new(FileStore::new(&path)))
        .services(services())
        .build();
    first
        .set("http://example.com/charmstore/v5/whoami", "doctor")
        .unwrap();
    first.set("http://example.com/other", "who").unwrap();

    let reopened = CredentialStore::builder(Arc::new(FileStore::new(&path)))
        .services(services())
        .build();
    assert_eq!(
        reopened.get("http://example.com/charmstore").unwrap().as_deref(),
        Some("doctor")
    );
    assert_eq!(
        reopened.get("http://example.com/other/discharge").unwrap().as_deref(),
        Some("who")
    );

    reopened.remove("http://example.com/charmstore/x").unwrap();
    assert_eq!(reopened.get("http://example.com/charmstore").unwrap(), None);

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw, json!({"http://example.com/other": "who"}));
}

#[test]
fn test_cookie_bridge_only_for_cookie_service() {
    let cookies = RecordingCookieSetter::new();
    let store = CredentialStore::builder(Arc::new(InMemoryStore::new()))
        .services(services())
        .cookie_setter(cookies.clone())
        .build();
    let encoded = STANDARD.encode(json!([{"i": "root"}]).to_string());

    store.set("http://example.com/identity", &encoded).unwrap();
    assert!(cookies.cookies().is_empty());

    store.set("http://example.com/charmstore/v5", &encoded).unwrap();
    assert_eq!(cookies.cookies(), vec![json!([{"i": "root"}])]);
}

#[test]
fn test_cookie_bridge_failures_propagate_but_value_is_kept() {
    let backing = Arc::new(InMemoryStore::new());
    let store = CredentialStore::builder(backing.clone())
        .services(services())
        .cookie_setter(RecordingCookieSetter::new())
        .build();

    let result = store.set("http://example.com/charmstore", "not base64!");
    assert!(matches!(result, Err(StoreError::Base64(_))), "{result:?}");
    assert_eq!(
        backing.get_item(DEFAULT_COOKIE_SERVICE).unwrap().as_deref(),
        Some("not base64!")
    );

    let not_json = STANDARD.encode("not json");
    let result = store.set("http://example.com/charmstore", &not_json);
    assert!(matches!(result, Err(StoreError::Json(_))), "{result:?}");
}

#[test]
fn test_without_cookie_setter_values_are_opaque() {
    let store = CredentialStore::builder(Arc::new(InMemoryStore::new()))
        .services(services())
        .build();
    store
        .set("http://example.com/charmstore", "not base64!")
        .unwrap();
    assert_eq!(
        store.get("http://example.com/charmstore").unwrap().as_deref(),
        Some("not base64!")
    );
}

#[test]
fn test_custom_cookie_service() {
    let cookies = RecordingCookieSetter::new();
    let store = CredentialStore::builder(Arc::new(InMemoryStore::new()))
        .services(services())
        .cookie_service("identity")
        .cookie_setter(cookies.clone())
        .build();
    let encoded = STANDARD.encode("{}");

    store.set("http://example.com/charmstore", &encoded).unwrap();
    assert!(cookies.cookies().is_empty());
    store.set("http://example.com/identity", &encoded).unwrap();
    assert_eq!(cookies.cookies().len(), 1);
}

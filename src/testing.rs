use serde_json::{json, Value};

use crate::{Client, Config, RetryConfig};

/// Create a test client configured to use a wiremock server.
/// Disables retries by default for predictable test behavior.
pub fn test_client(base_url: &str) -> Client {
    test_client_with(base_url, Config::default())
}

/// Like [`test_client`], keeping every other field of `cfg`.
pub fn test_client_with(base_url: &str, cfg: Config) -> Client {
    let retry = cfg.retry.clone().or_else(|| Some(RetryConfig::disabled()));
    Client::new(Config {
        base_url: Some(base_url.to_string()),
        token: Some("apify_api_test_token".into()),
        retry,
        ..cfg
    })
    .expect("client")
}

/// Wrap a payload in the service's `{"data": ...}` envelope.
pub fn data(payload: Value) -> Value {
    json!({ "data": payload })
}

/// Error body in the service's envelope.
pub fn error_body(kind: &str, message: &str) -> Value {
    json!({ "error": { "type": kind, "message": message } })
}

//! Field sanitization applied to every log entry before it is written.
//!
//! Keys that name a credential are replaced wholesale. Values that look like
//! bearer headers or JWTs are replaced. Values that look like URLs keep only
//! their scheme, host and path: fragment and query are dropped, since deep
//! links carry OAuth tokens there.

use serde_json::{Map, Value};
use std::collections::HashMap;

pub const REDACTED: &str = "[REDACTED]";

const DENYLIST_KEYS: &[&str] = &[
    "access_token",
    "refresh_token",
    "authorization",
    "password",
    "secret",
    "apikey",
    "api_key",
];

/// Strip the query string and fragment from a URL-like string.
///
/// Everything from the first `?` or `#` onward is removed.
pub fn strip_url_secrets(raw: &str) -> &str {
    match raw.find(['?', '#']) {
        Some(idx) => &raw[..idx],
        None => raw,
    }
}

/// Sanitize a map of structured fields.
pub fn sanitize_fields(fields: &HashMap<String, Value>) -> HashMap<String, Value> {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), sanitize_value(k, v)))
        .collect()
}

/// Sanitize a free-form log message.
///
/// Messages are scanned word by word so a URL embedded in a sentence is
/// stripped without touching the rest of the text.
pub fn sanitize_message(message: &str) -> String {
    if !message.contains(['?', '#']) && !message.to_ascii_lowercase().contains("bearer ") {
        return message.to_string();
    }

    let mut out = Vec::new();
    let mut redact_next = false;
    for word in message.split(' ') {
        if redact_next {
            out.push(REDACTED.to_string());
            redact_next = false;
            continue;
        }
        if word.eq_ignore_ascii_case("bearer") {
            redact_next = true;
            out.push(word.to_string());
            continue;
        }
        if looks_like_url(word) {
            out.push(strip_url_secrets(word).to_string());
        } else {
            out.push(word.to_string());
        }
    }
    out.join(" ")
}

fn sanitize_value(key: &str, value: &Value) -> Value {
    if is_sensitive_key(key) {
        return Value::String(REDACTED.to_string());
    }

    match value {
        Value::String(s) => sanitize_string(s),
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                out.insert(k.clone(), sanitize_value(k, v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| sanitize_value(key, item))
                .collect::<Vec<_>>(),
        ),
        _ => value.clone(),
    }
}

fn sanitize_string(raw: &str) -> Value {
    if looks_like_sensitive_value(raw) {
        return Value::String(REDACTED.to_string());
    }
    if looks_like_url(raw) {
        return Value::String(strip_url_secrets(raw).to_string());
    }
    Value::String(raw.to_string())
}

fn looks_like_url(raw: &str) -> bool {
    raw.contains("://")
}

fn looks_like_sensitive_value(raw: &str) -> bool {
    let lower = raw.to_ascii_lowercase();
    if lower.starts_with("bearer ") {
        return true;
    }
    if !raw.contains("://") && raw.matches('.').count() == 2 && raw.len() > 40 {
        return true;
    }
    false
}

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    DENYLIST_KEYS.iter().any(|entry| lower.contains(entry))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fragment_and_query() {
        assert_eq!(
            strip_url_secrets("lastbite://auth/callback?x=1#access_token=abc"),
            "lastbite://auth/callback"
        );
        assert_eq!(
            strip_url_secrets("lastbite://auth/callback#access_token=abc"),
            "lastbite://auth/callback"
        );
        assert_eq!(strip_url_secrets("lastbite://home"), "lastbite://home");
    }

    #[test]
    fn redacts_sensitive_keys() {
        let mut fields = HashMap::new();
        fields.insert(
            "refresh_token".to_string(),
            Value::String("r-123".to_string()),
        );
        fields.insert("user_id".to_string(), Value::String("usr-1".to_string()));

        let out = sanitize_fields(&fields);
        assert_eq!(out["refresh_token"], Value::String(REDACTED.to_string()));
        assert_eq!(out["user_id"], Value::String("usr-1".to_string()));
    }

    #[test]
    fn strips_url_values() {
        let mut fields = HashMap::new();
        fields.insert(
            "url".to_string(),
            Value::String("lastbite://cb#access_token=AAA&refresh_token=BBB".to_string()),
        );

        let out = sanitize_fields(&fields);
        let url = out["url"].as_str().unwrap();
        assert_eq!(url, "lastbite://cb");
        assert!(!url.contains("AAA"));
        assert!(!url.contains("BBB"));
    }

    #[test]
    fn redacts_jwt_like_values() {
        let jwt = format!("{}.{}.{}", "a".repeat(20), "b".repeat(20), "c".repeat(20));
        let mut fields = HashMap::new();
        fields.insert("value".to_string(), Value::String(jwt));

        let out = sanitize_fields(&fields);
        assert_eq!(out["value"], Value::String(REDACTED.to_string()));
    }

    #[test]
    fn sanitizes_urls_inside_messages() {
        let message = "opening lastbite://cb#access_token=AAA now";
        assert_eq!(sanitize_message(message), "opening lastbite://cb now");
    }

    #[test]
    fn sanitizes_bearer_inside_messages() {
        let message = "header was Bearer abc.def.ghi";
        assert_eq!(sanitize_message(message), "header was Bearer [REDACTED]");
    }

    #[test]
    fn leaves_plain_messages_alone() {
        assert_eq!(sanitize_message("session verified"), "session verified");
    }
}

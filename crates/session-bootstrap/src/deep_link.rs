//! Deep-link token extraction and log redaction.
//!
//! OAuth callbacks land as `lastbite://auth/callback#access_token=..&refresh_token=..`.
//! The fragment is parsed as form-urlencoded pairs. A URL without a fragment
//! is not an error: it means the caller should look for an existing session.

use std::fmt;

/// Token pair carried in a deep-link fragment.
#[derive(Clone, PartialEq, Eq)]
pub struct DeepLinkTokens {
    pub access_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for DeepLinkTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeepLinkTokens")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

/// Extract the access/refresh token pair from a deep-link URL.
///
/// Returns `None` when the URL has no `#`, or when either token is missing
/// or empty.
pub fn extract_tokens(url: &str) -> Option<DeepLinkTokens> {
    let (_, fragment) = url.split_once('#')?;

    let mut access_token = None;
    let mut refresh_token = None;
    for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
        match key.as_ref() {
            "access_token" if access_token.is_none() => access_token = Some(value.into_owned()),
            "refresh_token" if refresh_token.is_none() => {
                refresh_token = Some(value.into_owned())
            }
            _ => {}
        }
    }

    match (access_token, refresh_token) {
        (Some(access_token), Some(refresh_token))
            if !access_token.is_empty() && !refresh_token.is_empty() =>
        {
            Some(DeepLinkTokens {
                access_token,
                refresh_token,
            })
        }
        _ => None,
    }
}

/// Return the log-safe form of a URL: everything from the first `?` or `#`
/// is dropped.
pub fn redact_url(url: &str) -> String {
    match url.find(['?', '#']) {
        Some(idx) => url[..idx].to_string(),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_both_tokens() {
        let tokens =
            extract_tokens("lastbite://auth/callback#access_token=A&refresh_token=B").unwrap();
        assert_eq!(tokens.access_token, "A");
        assert_eq!(tokens.refresh_token, "B");
    }

    #[test]
    fn extracts_tokens_among_other_fields() {
        let url = "lastbite://auth/callback?source=email#expires_in=3600&access_token=eyJ.a.b\
                   &token_type=bearer&refresh_token=r-9&type=magiclink";
        let tokens = extract_tokens(url).unwrap();
        assert_eq!(tokens.access_token, "eyJ.a.b");
        assert_eq!(tokens.refresh_token, "r-9");
    }

    #[test]
    fn decodes_url_encoded_values() {
        let tokens =
            extract_tokens("scheme://host#access_token=a%2Fb%3Dc&refresh_token=x%20y").unwrap();
        assert_eq!(tokens.access_token, "a/b=c");
        assert_eq!(tokens.refresh_token, "x y");
    }

    #[test]
    fn no_fragment_means_no_tokens() {
        assert!(extract_tokens("lastbite://auth/callback").is_none());
        assert!(extract_tokens("lastbite://auth/callback?access_token=A&refresh_token=B").is_none());
    }

    #[test]
    fn single_token_means_no_tokens() {
        assert!(extract_tokens("scheme://host#access_token=A").is_none());
        assert!(extract_tokens("scheme://host#refresh_token=B").is_none());
    }

    #[test]
    fn empty_token_means_no_tokens() {
        assert!(extract_tokens("scheme://host#access_token=&refresh_token=B").is_none());
        assert!(extract_tokens("scheme://host#access_token=A&refresh_token=").is_none());
        assert!(extract_tokens("scheme://host#").is_none());
    }

    #[test]
    fn first_occurrence_wins() {
        let tokens =
            extract_tokens("s://h#access_token=A&access_token=Z&refresh_token=B").unwrap();
        assert_eq!(tokens.access_token, "A");
    }

    #[test]
    fn redaction_strips_fragment_and_query() {
        let url = "lastbite://auth/callback?flow=pkce#access_token=SECRET_A&refresh_token=SECRET_B";
        let redacted = redact_url(url);
        assert_eq!(redacted, "lastbite://auth/callback");
        assert!(!redacted.contains("SECRET_A"));
        assert!(!redacted.contains("SECRET_B"));
    }

    #[test]
    fn redaction_keeps_plain_urls() {
        assert_eq!(redact_url("lastbite://home"), "lastbite://home");
    }

    #[test]
    fn tokens_debug_is_redacted() {
        let tokens = extract_tokens("s://h#access_token=SECRET_A&refresh_token=SECRET_B").unwrap();
        let debug = format!("{:?}", tokens);
        assert!(!debug.contains("SECRET_A"));
        assert!(!debug.contains("SECRET_B"));
    }
}

//! Endpoint URL construction.

use url::Url;

use crate::client::state::ClientError;

/// Build the connection URL, appending the credential only when it is non-empty.
pub fn build_url(endpoint: &str, credential: Option<&str>, param: &str) -> Result<Url, ClientError> {
    let invalid = |reason: String| ClientError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason,
    };

    let mut url = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }

    let credential = credential.filter(|c| !c.trim().is_empty());
    if let Some(credential) = credential {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != param)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair(param, credential);
    }
    Ok(url)
}

/// Render a URL for logs with the credential masked.
pub fn redact(url: &Url, param: &str) -> String {
    if !url.query_pairs().any(|(k, _)| k == param) {
        return url.to_string();
    }
    let mut masked = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == param { "***".to_string() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    masked.query_pairs_mut().clear().extend_pairs(pairs);
    masked.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_credential() {
        let url = build_url("ws://localhost:9600/ws/metrics", None, "token").unwrap();
        assert_eq!(url.as_str(), "ws://localhost:9600/ws/metrics");
    }

    #[test]
    fn test_empty_credential_is_no_credential() {
        for credential in ["", "   "] {
            let url = build_url("ws://localhost:9600/ws/metrics", Some(credential), "token").unwrap();
            assert_eq!(url.query(), None);
        }
    }

    #[test]
    fn test_credential_sent_verbatim() {
        let url = build_url("ws://h/ws", Some(" a b "), "token").unwrap();
        let sent: Vec<_> = url.query_pairs().collect();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, " a b ");
    }

    #[test]
    fn test_credential_appended() {
        let url = build_url("wss://example.com/ws?tenant=1", Some("s3cr3t"), "token").unwrap();
        assert_eq!(url.as_str(), "wss://example.com/ws?tenant=1&token=s3cr3t");
    }

    #[test]
    fn test_existing_credential_replaced() {
        let url = build_url("ws://h/ws?token=old", Some("new"), "token").unwrap();
        assert_eq!(url.query(), Some("token=new"));
    }

    #[test]
    fn test_invalid() {
        assert!(matches!(
            build_url("http://example.com", None, "token"),
            Err(ClientError::InvalidEndpoint { .. })
        ));
        assert!(matches!(
            build_url("not a url", None, "token"),
            Err(ClientError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn test_redact() {
        let url = build_url("ws://h/ws?tenant=1", Some("s3cr3t"), "token").unwrap();
        let shown = redact(&url, "token");
        assert!(!shown.contains("s3cr3t"));
        assert!(shown.contains("tenant=1"));
        assert!(shown.contains("token=***") || shown.contains("token=%2A%2A%2A"));
    }
}

//! HTTP authorizer posting to the application's auth endpoint.

use super::Authorizer;
use crate::error::{AuthError, Error};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Authorizes subscriptions by POSTing `socket_id` and `channel_name` as
/// form data to an application endpoint and returning the response body.
///
/// The endpoint is expected to answer `200 OK` with the token JSON; any
/// other status is reported as a rejection. Extra headers (cookies, CSRF
/// tokens) can be attached with [`with_header`](Self::with_header).
pub struct HttpAuthorizer {
    endpoint: Url,
    headers: HashMap<String, String>,
    client: reqwest::blocking::Client,
}

impl HttpAuthorizer {
    /// Create an authorizer for the given endpoint URL.
    pub fn new(endpoint: &str) -> Result<Self, Error> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| Error::Argument(format!("invalid auth endpoint {endpoint:?}: {e}")))?;
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Argument(format!("failed to build http client: {e}")))?;

        Ok(Self {
            endpoint,
            headers: HashMap::new(),
            client,
        })
    }

    /// Attach a header to every authorization request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

impl std::fmt::Debug for HttpAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAuthorizer")
            .field("endpoint", &self.endpoint.as_str())
            .field("headers", &self.headers.keys())
            .finish()
    }
}

impl Authorizer for HttpAuthorizer {
    fn authorize(&self, channel_name: &str, socket_id: &str) -> Result<String, AuthError> {
        let mut request = self.client.post(self.endpoint.clone()).form(&[
            ("socket_id", socket_id),
            ("channel_name", channel_name),
        ]);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .map_err(|e| AuthError::Request(Box::new(e)))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| AuthError::Request(Box::new(e)))?;

        if !status.is_success() {
            return Err(AuthError::Rejected(format!(
                "auth endpoint answered {status} for channel {channel_name}"
            )));
        }

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unparseable_endpoint() {
        assert!(matches!(
            HttpAuthorizer::new("not a url"),
            Err(Error::Argument(_))
        ));
    }

    #[test]
    fn test_builds_with_headers() {
        let authorizer = HttpAuthorizer::new("https://example.com/pusher/auth")
            .unwrap()
            .with_header("X-CSRF-Token", "abc123");
        assert_eq!(authorizer.headers.len(), 1);
    }
}

//! Client configuration and endpoint construction.

use crate::auth::Authorizer;
use std::fmt;
use std::sync::Arc;

const DEFAULT_HOST: &str = "ws.pusherapp.com";
const DEFAULT_WS_PORT: u16 = 80;
const DEFAULT_WSS_PORT: u16 = 443;
const PROTOCOL_VERSION: u8 = 7;

/// Configuration for a [`Client`](crate::Client).
///
/// ```
/// use riptide::ClientOptions;
///
/// let options = ClientOptions::new().cluster("eu").encrypted(true);
/// assert_eq!(
///     options.endpoint("a1b2c3"),
///     format!(
///         "wss://ws-eu.pusher.com:443/app/a1b2c3?client=riptide&version={}&protocol=7",
///         env!("CARGO_PKG_VERSION"),
///     ),
/// );
/// ```
#[derive(Clone, Default)]
pub struct ClientOptions {
    /// Authorizer for private and presence subscriptions.
    pub authorizer: Option<Arc<dyn Authorizer>>,
    /// Cluster shortcut: resolves to the `ws-<cluster>.pusher.com` host.
    pub cluster: Option<String>,
    /// Explicit host; takes precedence over `cluster`.
    pub host: Option<String>,
    /// Port for plaintext connections.
    pub ws_port: Option<u16>,
    /// Port for TLS connections.
    pub wss_port: Option<u16>,
    /// Whether to connect over TLS.
    pub encrypted: bool,
}

impl ClientOptions {
    /// Options with library defaults: the main endpoint host, standard
    /// ports, plaintext, and no authorizer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the authorizer used by private and presence subscriptions.
    pub fn authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    /// Connect to the given cluster's endpoint.
    pub fn cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    /// Connect to an explicit host instead of the hosted endpoints.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Override the plaintext port.
    pub fn ws_port(mut self, port: u16) -> Self {
        self.ws_port = Some(port);
        self
    }

    /// Override the TLS port.
    pub fn wss_port(mut self, port: u16) -> Self {
        self.wss_port = Some(port);
        self
    }

    /// Connect over TLS.
    pub fn encrypted(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }

    /// The websocket endpoint URL for the given application key.
    pub fn endpoint(&self, api_key: &str) -> String {
        let host = match (&self.host, &self.cluster) {
            (Some(host), _) => host.clone(),
            (None, Some(cluster)) => format!("ws-{cluster}.pusher.com"),
            (None, None) => DEFAULT_HOST.to_string(),
        };
        let (scheme, port) = if self.encrypted {
            ("wss", self.wss_port.unwrap_or(DEFAULT_WSS_PORT))
        } else {
            ("ws", self.ws_port.unwrap_or(DEFAULT_WS_PORT))
        };
        format!(
            "{scheme}://{host}:{port}/app/{api_key}?client=riptide&version={}&protocol={PROTOCOL_VERSION}",
            env!("CARGO_PKG_VERSION"),
        )
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("authorizer", &self.authorizer.is_some())
            .field("cluster", &self.cluster)
            .field("host", &self.host)
            .field("ws_port", &self.ws_port)
            .field("wss_port", &self.wss_port)
            .field("encrypted", &self.encrypted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoint() {
        assert_eq!(
            ClientOptions::new().endpoint("key"),
            format!(
                "ws://ws.pusherapp.com:80/app/key?client=riptide&version={}&protocol=7",
                env!("CARGO_PKG_VERSION"),
            ),
        );
    }

    #[test]
    fn test_explicit_host_beats_cluster() {
        let options = ClientOptions::new()
            .cluster("eu")
            .host("socket.internal")
            .ws_port(6001);
        assert!(
            options
                .endpoint("key")
                .starts_with("ws://socket.internal:6001/app/key")
        );
    }

    #[test]
    fn test_encrypted_uses_wss_scheme_and_port() {
        let options = ClientOptions::new().encrypted(true);
        assert!(options.endpoint("key").starts_with("wss://ws.pusherapp.com:443/"));

        let custom = ClientOptions::new().encrypted(true).wss_port(6002);
        assert!(custom.endpoint("key").starts_with("wss://ws.pusherapp.com:6002/"));
    }
}

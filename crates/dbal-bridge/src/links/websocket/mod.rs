use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dbal_core::Method;
use serde_json::Value;
use typed_builder::TypedBuilder;

use super::Link;
use crate::BridgeResult;

mod connection;
mod connector;
mod dispatcher;
mod router;
mod state;

use connection::ConnectionManager;
pub use connector::{Connector, FrameSink, FrameStream, TransportError, TungsteniteConnector};
use dispatcher::CallDispatcher;
pub use dispatcher::IdGenerator;
use state::BridgeState;

/// The per-call budget used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// The configuration of a [`WebSocketLink`].
///
/// # Example
///
/// ```
/// # use std::time::Duration;
/// # use dbal_bridge::links::WebSocketLinkConfig;
/// let config = WebSocketLinkConfig::builder()
///     .endpoint("ws://127.0.0.1:8787")
///     .token("secret") // Optional, forwarded to the daemon as a bearer token.
///     .timeout(Duration::from_secs(5)) // Defaults to 30 seconds.
///     .build();
/// ```
#[derive(TypedBuilder, Debug, Clone)]
pub struct WebSocketLinkConfig {
    /// The daemon URL.
    #[builder(setter(into))]
    endpoint: String,
    /// The bearer token to send to the daemon.
    #[builder(default, setter(into, strip_option))]
    token: Option<String>,
    /// How long a call waits for its response once sent.
    #[builder(default = DEFAULT_TIMEOUT)]
    timeout: Duration,
}

impl WebSocketLinkConfig {
    /// The variable holding the daemon URL.
    pub const ENDPOINT_ENV: &'static str = "DBAL_DAEMON_URL";
    /// The variable holding the bearer token.
    pub const TOKEN_ENV: &'static str = "DBAL_AUTH_TOKEN";
    /// The variable holding the per-call budget, in milliseconds.
    pub const TIMEOUT_ENV: &'static str = "DBAL_BRIDGE_TIMEOUT_MS";

    /// Loads the configuration from environment variables.
    ///
    /// Returns `None` if the daemon URL is not set. An unparsable timeout falls back to the
    /// default.
    pub fn from_env() -> Option<Self> {
        let endpoint = env::var(Self::ENDPOINT_ENV).ok()?;
        let token = env::var(Self::TOKEN_ENV).ok().filter(|m| !m.is_empty());
        let timeout = env::var(Self::TIMEOUT_ENV)
            .ok()
            .and_then(|m| match m.parse::<u64>() {
                Ok(m) => Some(Duration::from_millis(m)),
                Err(e) => {
                    tracing::warn!(value = %m, reason = %e, "ignoring invalid bridge timeout");
                    None
                }
            })
            .unwrap_or(DEFAULT_TIMEOUT);

        Some(Self {
            endpoint,
            token,
            timeout,
        })
    }

    /// Returns the daemon URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the per-call budget.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// A Link that multiplexes calls over one persistent connection to a daemon.
///
/// The connection is opened lazily by the first call and reopened lazily by the first call
/// after it is lost. Every call is matched to its response by a correlation id, so the daemon
/// may answer in any order.
#[derive(Clone)]
pub struct WebSocketLink {
    dispatcher: Arc<CallDispatcher>,
}

impl fmt::Debug for WebSocketLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketLink")
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

impl WebSocketLink {
    /// Creates a link that connects with [`TungsteniteConnector`].
    pub fn new(config: WebSocketLinkConfig) -> Self {
        Self::with_connector(config, TungsteniteConnector::new())
    }

    /// Creates a link that connects with a custom connector.
    pub fn with_connector<C>(config: WebSocketLinkConfig, connector: C) -> Self
    where
        C: Connector,
    {
        Self::with_parts(config, Arc::new(connector), IdGenerator::new())
    }

    /// Creates a link with a custom connector and id generator.
    pub fn with_parts(
        config: WebSocketLinkConfig,
        connector: Arc<dyn Connector>,
        ids: IdGenerator,
    ) -> Self {
        let WebSocketLinkConfig {
            endpoint,
            token,
            timeout,
        } = config;

        let state = Arc::new(BridgeState::new(endpoint, token));
        let connection = ConnectionManager::new(state, connector);

        Self {
            dispatcher: Arc::new(CallDispatcher::new(connection, ids, timeout)),
        }
    }

    /// Returns the id generator used by current instance.
    pub fn ids(&self) -> &IdGenerator {
        self.dispatcher.ids()
    }

    /// Returns the number of calls waiting for a response.
    pub fn pending_calls(&self) -> usize {
        self.dispatcher.connection().state().pending_len()
    }

    /// Fails every pending call with [`BridgeError::Closed`](crate::BridgeError::Closed) and
    /// closes the connection.
    ///
    /// The link stays usable, the next call reconnects.
    pub async fn close(&self) {
        self.dispatcher.connection().close().await
    }
}

#[async_trait]
impl Link for WebSocketLink {
    async fn call(&self, method: Method, params: Vec<Value>) -> BridgeResult<Value> {
        self.dispatcher.call(method, params).await
    }

    async fn shutdown(&self) {
        self.close().await
    }
}

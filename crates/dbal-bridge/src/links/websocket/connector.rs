use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::{future, Sink, SinkExt, Stream, StreamExt};
use thiserror::Error;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

/// The write half of an established connection, accepting text frames.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// The read half of an established connection, yielding text frames.
///
/// The stream ends when the peer closes the connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// An error raised by the underlying transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(String);

impl TransportError {
    /// Creates a transport error from any displayable reason.
    pub fn new<S>(reason: S) -> Self
    where
        S: fmt::Display,
    {
        Self(reason.to_string())
    }
}

/// Opens message-oriented connections to a daemon.
#[async_trait]
pub trait Connector: fmt::Debug + Send + Sync + 'static {
    /// Opens a connection to `endpoint`.
    ///
    /// The token is forwarded to the daemon as is.
    async fn connect(
        &self,
        endpoint: &str,
        token: Option<&str>,
    ) -> Result<(FrameSink, FrameStream), TransportError>;
}

/// A Connector implemented with `tokio-tungstenite`.
///
/// Frames are exchanged as WebSocket text messages. The token, when present, is sent as a bearer
/// `authorization` header during the handshake.
#[derive(Debug, Default, Clone)]
pub struct TungsteniteConnector {}

impl TungsteniteConnector {
    /// Creates a connector.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(
        &self,
        endpoint: &str,
        token: Option<&str>,
    ) -> Result<(FrameSink, FrameStream), TransportError> {
        let mut request = endpoint
            .into_client_request()
            .map_err(TransportError::new)?;

        if let Some(m) = token {
            let value =
                HeaderValue::from_str(&format!("Bearer {m}")).map_err(TransportError::new)?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (ws, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(TransportError::new)?;
        let (sink, stream) = ws.split();

        let sink = sink
            .with(|m: String| future::ready(Ok::<_, WsError>(Message::Text(m))))
            .sink_map_err(TransportError::new);

        let stream = stream.filter_map(|m| {
            future::ready(match m {
                Ok(Message::Text(m)) => Some(Ok(m)),
                Ok(Message::Binary(m)) => Some(Ok(String::from_utf8_lossy(&m).into_owned())),
                // control frames are answered by tungstenite itself
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => None,
                Ok(Message::Close(_)) => None,
                Err(e) => Some(Err(TransportError::new(e))),
            })
        });

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}

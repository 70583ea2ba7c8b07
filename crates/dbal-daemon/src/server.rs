use std::future::{self, Future};
use std::io;
use std::net::SocketAddr;
use std::pin::pin;
use std::sync::Arc;
use std::time::Instant;

use dbal_bridge::links::Link;
use dbal_bridge::BridgeError;
use dbal_core::protocol::{MalformedRequest, RequestFrame, ResponseFrame, ResponseOutcome};
use dbal_core::{Method, StorageError};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

/// The target of the event emitted for every resolved call.
pub(crate) const CALL_TARGET: &str = "dbal_daemon::server::call";

/// A daemon server.
///
/// Every connection is a session. Requests of a session are resolved concurrently with a
/// [`Link`], so responses may leave in a different order than requests arrived.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    token: Option<Arc<str>>,
}

impl Server {
    /// Binds a server to `addr`.
    pub async fn bind<A>(addr: A) -> io::Result<Self>
    where
        A: ToSocketAddrs,
    {
        Ok(Self {
            listener: TcpListener::bind(addr).await?,
            token: None,
        })
    }

    /// Requires clients to present `token` as a bearer token.
    pub fn with_token<S>(mut self, token: S) -> Self
    where
        S: Into<String>,
    {
        self.token = Some(token.into().into());
        self
    }

    /// Returns the address the server is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves connections until the process exits.
    pub async fn serve<L>(self, link: L) -> io::Result<()>
    where
        L: 'static + Link + Clone,
    {
        self.serve_with_shutdown(link, future::pending()).await
    }

    /// Serves connections until `signal` resolves.
    ///
    /// Sessions that are already open keep running until their client goes away.
    pub async fn serve_with_shutdown<L, F>(self, link: L, signal: F) -> io::Result<()>
    where
        L: 'static + Link + Clone,
        F: Future<Output = ()>,
    {
        let Self { listener, token } = self;
        let mut signal = pin!(signal);

        loop {
            let (stream, peer) = tokio::select! {
                _ = &mut signal => break,
                accepted = listener.accept() => match accepted {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::warn!(reason = %e, "failed to accept connection");
                        continue;
                    }
                },
            };

            tokio::spawn(session(link.clone(), stream, peer, token.clone()));
        }

        tracing::debug!("server stopped accepting connections");
        Ok(())
    }
}

fn is_authorized(request: &Request, expected: &str) -> bool {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|m| m.to_str().ok())
        .and_then(|m| m.strip_prefix("Bearer "))
        == Some(expected)
}

fn unauthorized() -> ErrorResponse {
    let mut resp = ErrorResponse::new(Some("unauthorized".to_owned()));
    *resp.status_mut() = StatusCode::UNAUTHORIZED;

    resp
}

/// Where the responses of a session are queued, drained by the session's writer task.
type Responder = mpsc::UnboundedSender<String>;

fn respond(tx: &Responder, frame: ResponseFrame) {
    match frame.to_text() {
        // the client may be gone already.
        Ok(m) => {
            let _ = tx.send(m);
        }
        Err(e) => tracing::warn!(id = %frame.id, reason = %e, "failed to encode response"),
    }
}

async fn session<L>(link: L, stream: TcpStream, peer: SocketAddr, token: Option<Arc<str>>)
where
    L: 'static + Link + Clone,
{
    let authorize = |req: &Request, resp: Response| match token.as_deref() {
        Some(m) if !is_authorized(req, m) => Err(unauthorized()),
        _ => Ok(resp),
    };

    let ws = match tokio_tungstenite::accept_hdr_async(stream, authorize).await {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(%peer, reason = %e, "handshake failed");
            return;
        }
    };

    tracing::debug!(%peer, "session opened");

    let (mut sink, mut stream) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        while let Some(m) = rx.recv().await {
            if let Err(e) = sink.send(Message::Text(m)).await {
                tracing::debug!(%peer, reason = %e, "failed to write response");
                return;
            }
        }

        let _ = sink.close().await;
    });

    while let Some(message) = stream.next().await {
        let raw = match message {
            Ok(Message::Text(m)) => m,
            Ok(Message::Binary(m)) => String::from_utf8_lossy(&m).into_owned(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(%peer, reason = %e, "session failed");
                break;
            }
        };

        if let Flow::Close = dispatch(&link, &tx, &raw) {
            break;
        }
    }

    // the writer stops once every in-flight call has responded.
    drop(tx);
    let _ = writer.await;

    tracing::debug!(%peer, "session closed");
}

enum Flow {
    Continue,
    Close,
}

fn dispatch<L>(link: &L, tx: &Responder, raw: &str) -> Flow
where
    L: 'static + Link + Clone,
{
    let frame = match RequestFrame::parse(raw) {
        Ok(m) => m,
        Err(MalformedRequest { id: Some(id), error }) => {
            tracing::warn!(%id, reason = %error, "rejecting malformed request");
            let error = StorageError::validation(error.to_string());
            respond(tx, ResponseFrame::new(id, ResponseOutcome::Error(error)));

            return Flow::Continue;
        }
        Err(e) => {
            tracing::warn!(reason = %e, len = raw.len(), "dropping malformed request");
            return Flow::Continue;
        }
    };

    let RequestFrame { id, method, params } = frame;

    let method = match method.parse::<Method>() {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(%id, method = %e.0, "rejecting unknown method");
            let error = StorageError::unknown_method(e.0);
            respond(tx, ResponseFrame::new(id, ResponseOutcome::Error(error)));

            return Flow::Continue;
        }
    };

    // closing ends this session only, the adapter is shared with every other client.
    if method == Method::Close {
        respond(tx, ResponseFrame::new(id, ResponseOutcome::Result(Value::Null)));
        return Flow::Close;
    }

    let link = link.clone();
    let tx = tx.clone();

    tokio::spawn(async move {
        let started = Instant::now();

        let outcome = match link.call(method, params).await {
            Ok(m) => Ok(m),
            Err(BridgeError::Remote(e)) => Err(e),
            Err(e) => Err(StorageError::internal(e.to_string())),
        };

        tracing::info!(
            target: CALL_TARGET,
            id = %id,
            method = method.as_str(),
            code = outcome.as_ref().err().map(|m| m.code),
            duration = started.elapsed().as_micros(),
            "resolved call"
        );

        respond(&tx, ResponseFrame::new(id, outcome));
    });

    Flow::Continue
}

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dbal_bridge::links::{
    Connector, FrameSink, FrameStream, IdGenerator, TransportError, WebSocketLink,
    WebSocketLinkConfig,
};
use dbal_bridge::Bridge;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc as tokio_mpsc;
use tokio::sync::Mutex;

/// The daemon side of one mock connection.
#[derive(Debug)]
pub struct MockPeer {
    requests: mpsc::UnboundedReceiver<String>,
    responses: mpsc::UnboundedSender<Result<String, TransportError>>,
}

impl MockPeer {
    /// Waits for the next request and decodes it.
    pub async fn request(&mut self) -> Value {
        let raw = self.requests.next().await.expect("connection closed");

        serde_json::from_str(&raw).expect("request is not json")
    }

    /// Returns `None` once the bridge closed its write half.
    pub async fn raw_request(&mut self) -> Option<String> {
        self.requests.next().await
    }

    /// Stops reading requests, later writes of the bridge fail while responses still flow.
    pub fn stop_reading(&mut self) {
        self.requests.close();
    }

    pub async fn respond(&mut self, frame: Value) {
        self.respond_raw(frame.to_string()).await;
    }

    pub async fn respond_raw<S>(&mut self, raw: S)
    where
        S: Into<String>,
    {
        self.responses
            .send(Ok(raw.into()))
            .await
            .expect("bridge went away");
    }

    pub async fn fail(&mut self, reason: &str) {
        self.responses
            .send(Err(TransportError::new(reason)))
            .await
            .expect("bridge went away");
    }
}

/// A connector that hands every connection it opens to the test.
#[derive(Debug)]
pub struct MockConnector {
    attempts: AtomicUsize,
    failures: AtomicUsize,
    delay: Duration,
    tokens: std::sync::Mutex<Vec<Option<String>>>,
    peers: tokio_mpsc::UnboundedSender<MockPeer>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        _endpoint: &str,
        token: Option<&str>,
    ) -> Result<(FrameSink, FrameStream), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.tokens
            .lock()
            .expect("poisoned")
            .push(token.map(str::to_owned));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let should_fail = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |m| m.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(TransportError::new("connection refused"));
        }

        let (req_tx, req_rx) = mpsc::unbounded();
        let (resp_tx, resp_rx) = mpsc::unbounded();

        let _ = self.peers.send(MockPeer {
            requests: req_rx,
            responses: resp_tx,
        });

        Ok((
            Box::pin(req_tx.sink_map_err(TransportError::new)),
            Box::pin(resp_rx),
        ))
    }
}

/// What a test needs to drive a bridge against a mock daemon.
pub struct Harness {
    pub bridge: Bridge<WebSocketLink>,
    pub connector: Arc<MockConnector>,
    peers: Mutex<tokio_mpsc::UnboundedReceiver<MockPeer>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            timeout: Duration::from_secs(5),
            delay: Duration::ZERO,
            failures: 0,
            token: None,
        }
    }

    pub fn link(&self) -> &WebSocketLink {
        self.bridge.link()
    }

    pub fn attempts(&self) -> usize {
        self.connector.attempts.load(Ordering::SeqCst)
    }

    pub fn tokens(&self) -> Vec<Option<String>> {
        self.connector.tokens.lock().expect("poisoned").clone()
    }

    /// Waits for the next connection the bridge opens.
    pub async fn accept(&self) -> MockPeer {
        tokio::time::timeout(Duration::from_secs(5), self.peers.lock().await.recv())
            .await
            .expect("bridge did not connect")
            .expect("connector went away")
    }
}

pub struct HarnessBuilder {
    timeout: Duration,
    delay: Duration,
    failures: usize,
    token: Option<String>,
}

impl HarnessBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Delays every connection attempt.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fails the first `failures` connection attempts.
    pub fn failures(mut self, failures: usize) -> Self {
        self.failures = failures;
        self
    }

    pub fn token(mut self, token: &str) -> Self {
        self.token = Some(token.to_owned());
        self
    }

    pub fn build(self) -> Harness {
        let (tx, rx) = tokio_mpsc::unbounded_channel();
        let connector = Arc::new(MockConnector {
            attempts: AtomicUsize::new(0),
            failures: AtomicUsize::new(self.failures),
            delay: self.delay,
            tokens: Default::default(),
            peers: tx,
        });

        let config = match self.token {
            Some(m) => WebSocketLinkConfig::builder()
                .endpoint("ws://daemon.test")
                .token(m)
                .timeout(self.timeout)
                .build(),
            None => WebSocketLinkConfig::builder()
                .endpoint("ws://daemon.test")
                .timeout(self.timeout)
                .build(),
        };

        let link = WebSocketLink::with_parts(
            config,
            connector.clone(),
            IdGenerator::with_prefix("req"),
        );

        Harness {
            bridge: Bridge::new(link),
            connector,
            peers: Mutex::new(rx),
        }
    }
}

//! The links used to resolve calls.
//!
//! A link takes an operation name with its positional arguments and returns the encoded result.

use async_trait::async_trait;
use dbal_core::Method;
use serde_json::Value;

use crate::BridgeResult;

mod local_link;
mod websocket;

pub use local_link::LocalLink;
pub use websocket::{
    Connector, FrameSink, FrameStream, IdGenerator, TransportError, TungsteniteConnector,
    WebSocketLink, WebSocketLinkConfig, DEFAULT_TIMEOUT,
};

/// Common methods across all links.
#[async_trait]
pub trait Link: Send + Sync {
    /// Resolves one call.
    async fn call(&self, method: Method, params: Vec<Value>) -> BridgeResult<Value>;

    /// Releases the resources held by this link.
    ///
    /// Calls issued afterwards may reopen them.
    async fn shutdown(&self);
}

#[async_trait]
impl<L> Link for Box<L>
where
    L: ?Sized + Link,
{
    async fn call(&self, method: Method, params: Vec<Value>) -> BridgeResult<Value> {
        (**self).call(method, params).await
    }

    async fn shutdown(&self) {
        (**self).shutdown().await
    }
}

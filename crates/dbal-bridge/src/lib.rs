//! Bridge between a DBAL consumer and the storage that serves it.
//!
//! This crate is a RPC implementation that exposes the [storage adapter contract](Adapter) over a
//! [`Link`](links::Link).
//!
//! Bridge has 2 connection methods `local` and `remote`. A [`LocalLink`](links::LocalLink)
//! resolves calls with an adapter living in the same process. A
//! [`WebSocketLink`](links::WebSocketLink) multiplexes calls over a single persistent connection
//! to a DBAL daemon, correlating each response to its request by id.
//!
//! Either way, [`Bridge`] implements [`Adapter`] itself, so consumers are transport-agnostic.
//!
//! ```no_run
//! # async fn example() -> dbal_bridge::BridgeResult<()> {
//! use dbal_bridge::links::{WebSocketLink, WebSocketLinkConfig};
//! use dbal_bridge::{Adapter, Bridge};
//!
//! let config = WebSocketLinkConfig::builder()
//!     .endpoint("ws://127.0.0.1:8787")
//!     .build();
//! let bridge = Bridge::new(WebSocketLink::new(config));
//!
//! let user = bridge.read("User", "u1").await?;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all)]
#![deny(missing_debug_implementations)]
#![deny(unsafe_code)]
#![deny(non_snake_case)]
#![deny(clippy::cognitive_complexity)]
#![deny(missing_docs)]
#![cfg_attr(documenting, feature(doc_cfg))]
#![cfg_attr(documenting, feature(doc_auto_cfg))]
#![cfg_attr(any(releasing, not(debug_assertions)), deny(dead_code, unused_imports))]

mod bridge;
mod error;
pub mod links;

pub use bridge::Bridge;
pub use dbal_core::{Adapter, Method};
pub use error::{BridgeError, BridgeResult, ErrorKind};

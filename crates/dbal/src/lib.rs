//! Database abstraction layer.
//!
//! DBAL lets an application talk to storage through a single adapter contract, whether the
//! storage lives in the same process or behind a daemon:
//!
//! 1. A storage adapter contract with typed options and errors.
//! 2. An in-memory adapter.
//! 3. A bridge that exposes a remote daemon as an adapter, over one persistent connection.
//! 4. A daemon that serves any adapter to remote bridges.
//!
//! # Components
//!
//! 1. [dbal-core](dbal_core): The adapter contract, the wire frames and the in-memory adapter.
//! 2. [dbal-bridge](dbal_bridge): The bridge, with a local link and a WebSocket link.
//! 3. [dbal-daemon](dbal_daemon): The daemon server and its command line.

#![deny(clippy::all)]
#![deny(missing_debug_implementations)]
#![deny(unsafe_code)]
#![deny(non_snake_case)]
#![deny(missing_docs)]

pub use {dbal_bridge, dbal_core, dbal_daemon};

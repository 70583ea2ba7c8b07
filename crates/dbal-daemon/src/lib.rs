//! The DBAL daemon.
//!
//! The daemon serves a storage adapter to remote bridges over WebSocket. Every connection is a
//! session, requests of a session are resolved concurrently and answered by correlation id.
//!
//! ```no_run
//! use dbal_bridge::links::LocalLink;
//! use dbal_core::memory::MemoryAdapter;
//! use dbal_daemon::Cli;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     dbal_daemon::trace::init_default("DBAL_LOG");
//!
//!     let link = LocalLink::new(MemoryAdapter::new());
//!     Cli::builder().link(link).build().run().await?;
//!
//!     Ok(())
//! }
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

mod cli;
mod env_file;
mod server;
pub mod trace;

pub use cli::Cli;
pub use server::Server;

//! The core component of the DBAL bridge, shared between the bridge and the daemon.
//!
//! This crate defines:
//!
//! - The storage [adapter contract](Adapter) and its value types.
//! - The [storage error object](StorageError) reported by adapters and carried over the wire.
//! - The [wire frames](protocol) exchanged between a bridge and a daemon.
//! - An [in-memory adapter](memory::MemoryAdapter) used by the daemon binary and tests.

#![deny(clippy::all)]
#![deny(missing_debug_implementations)]
#![deny(unsafe_code)]
#![deny(non_snake_case)]
#![deny(clippy::cognitive_complexity)]
#![deny(missing_docs)]
#![cfg_attr(documenting, feature(doc_cfg))]
#![cfg_attr(documenting, feature(doc_auto_cfg))]
#![cfg_attr(any(releasing, not(debug_assertions)), deny(dead_code, unused_imports))]

mod adapter;
mod error;
pub mod memory;
pub mod protocol;
mod types;

pub use adapter::{Adapter, Method, UnknownMethod};
pub use error::{ErrorCode, StorageError, StorageResult};
pub use types::{AdapterCapabilities, ListOptions, ListResult, Record, SortDirection};

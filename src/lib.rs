// SPDX-License-Identifier: Apache-2.0

//! # keypipe
//!
//! `keypipe` is a pipelining client library for RESP-family key-value
//! servers. There are several modules within this crate; see the modules
//! for their respective documentation.
//!
//! Four pieces compose to form the library:
//!
//! - [`wire`] — the binary protocol: pipeline encoding and reply decoding,
//!   including the in-bulk type marker convention for raw binary and
//!   frozen-object payloads.
//! - [`session`] — the pipelining runtime: a request queue scoped by
//!   [`session::with_connection`]/[`session::Session::with_replies`], with
//!   a stack of "current parser" values layered over it.
//! - [`cluster`] — keyslot computation and a redirect-aware dispatcher
//!   that fans a batch of requests out across a cluster's nodes.
//! - [`tundra`] — a coordinator that keeps cold keys alive on demand and
//!   marks hot ones for asynchronous eviction into an external datastore.
//!
//! None of connection pooling, command-argument building, the work queue,
//! the blob datastore, or application-object serialization are implemented
//! here — see [`pool::ConnectionPool`], [`commands`], [`tundra::WorkQueue`],
//! [`tundra::BlobStore`], and [`freeze::Freezer`] for the boundaries this
//! crate depends on but expects a caller to supply.

pub mod cluster;
pub mod commands;
pub mod config;
pub mod error;
pub mod executor;
pub mod freeze;
pub mod pool;
pub mod request;
pub mod session;
pub mod tundra;
pub mod value;
pub mod wire;

pub use error::{Error, Result};
pub use request::{ReplyParser, RequestOptions};
pub use session::{with_connection, FlushResult, Session, Target};
pub use value::{Arg, Value};
pub use wire::reply::{Bulk, Reply};

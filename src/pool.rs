// SPDX-License-Identifier: Apache-2.0

//! The connection-pool contract (spec §6): a collaborator this crate
//! depends on but never implements.
//!
//! Written with hand-rolled boxed futures in the trait, the same idiom the
//! teacher uses for its own protocol-layer traits (see
//! `server/src/dbnet/connection.rs`'s `ProtocolConnectionExt`) instead of
//! pulling in `async-trait` — nothing in the pack depends on that crate.

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::NodeSpec;
use crate::error::Result;

/// A leased network connection to a single node.
pub trait Connection: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Connection for T {}

/// A pool of connections, keyed by [`NodeSpec`].
///
/// `acquire`/`release` bracket exactly one pipeline flush (spec §4.4): the
/// executor always releases what it acquires, signalling `failure` when
/// the connection should not be reused (spec §6: "a failed request poisons
/// the connection back to the pool").
pub trait ConnectionPool: Send + Sync {
    type Conn: Connection;

    fn acquire<'a>(
        &'a self,
        spec: &'a NodeSpec,
    ) -> Pin<Box<dyn Future<Output = Result<Self::Conn>> + Send + 'a>>;

    fn release<'a>(
        &'a self,
        spec: &'a NodeSpec,
        conn: Self::Conn,
        failure: Option<&'a crate::error::Error>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

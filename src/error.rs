// SPDX-License-Identifier: Apache-2.0

//! Error types for keypipe.
//!
//! Follows the hand-rolled `enum` + manual `Display`/`From` convention used
//! throughout the teacher codebase (see `cli/src/error.rs`) rather than a
//! derive-macro crate: every variant maps onto one failure mode named in
//! the error taxonomy, and conversions are written by hand.

use std::collections::HashMap;
use std::fmt;

/// A structured server-side error reply: `{prefix, message}` (spec §3).
///
/// `prefix` is the first whitespace-delimited token of the error line,
/// lowercased (e.g. `moved`, `ask`, `wrongtype`, `err`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    pub prefix: String,
    pub message: String,
}

impl ServerError {
    pub fn parse(line: &str) -> Self {
        let prefix = line
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        Self {
            prefix,
            message: line.to_owned(),
        }
    }

    pub fn is_moved(&self) -> bool {
        self.prefix == "moved"
    }

    pub fn is_ask(&self) -> bool {
        self.prefix == "ask"
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ServerError {}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// The underlying transport failed (connect, read, write).
    Io(std::io::Error),
    /// The reply stream did not conform to the wire protocol.
    Protocol(String),
    /// The server returned a semantic error reply (`WRONGTYPE`, `ERR`, ...).
    Server(ServerError),
    /// Argument coercion rejected a value before it ever reached the wire.
    Coerce(String),
    /// The configured freezer failed to serialize an application value.
    Freeze(String),
    /// The configured freezer failed to deserialize a bulk payload.
    Thaw(String),
    /// The external blob datastore used by the tundra coordinator failed.
    Datastore(String),
    /// A per-key aggregate failure from `ensure_ks`/`dirty`.
    Aggregate(HashMap<Vec<u8>, Error>),
    /// A cluster dispatch group did not complete within its wall-clock
    /// budget; the connections involved should be considered poisoned.
    Timeout,
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ServerError> for Error {
    fn from(e: ServerError) -> Self {
        Self::Server(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "i/o error. {e}"),
            Self::Protocol(e) => write!(f, "protocol error. {e}"),
            Self::Server(e) => write!(f, "server error. {e}"),
            Self::Coerce(e) => write!(f, "invalid argument. {e}"),
            Self::Freeze(e) => write!(f, "freeze failed. {e}"),
            Self::Thaw(e) => write!(f, "thaw failed. {e}"),
            Self::Datastore(e) => write!(f, "datastore failed. {e}"),
            Self::Aggregate(keys) => {
                write!(f, "{} key(s) failed: ", keys.len())?;
                let mut first = true;
                for (k, cause) in keys {
                    if !first {
                        write!(f, ", ")?;
                    }
                    first = false;
                    write!(f, "{:?}: {cause}", String::from_utf8_lossy(k))?;
                }
                Ok(())
            }
            Self::Timeout => write!(f, "cluster dispatch group timed out"),
        }
    }
}

impl std::error::Error for Error {}

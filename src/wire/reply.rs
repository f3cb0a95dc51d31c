// SPDX-License-Identifier: Apache-2.0

//! The reply type produced by [`crate::wire::decode`].

use crate::error::ServerError;
use crate::value::Value;

/// A decoded bulk-string payload, after the in-bulk marker convention
/// (spec §4.2) has been stripped and interpreted.
#[derive(Debug, Clone, PartialEq)]
pub enum Bulk {
    Nil,
    /// Marked as raw binary (`0x00 '<'`), or returned verbatim because the
    /// request set `raw_bulk`.
    Bytes(Vec<u8>),
    /// No marker present: plain text.
    Text(String),
    /// Marked as a frozen object (`0x00 '>'`) and thawed by the session's
    /// freezer, or opportunistically thawed via the legacy-header fallback.
    Object(Value),
}

/// One reply from the wire, fully decoded (spec §3).
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Simple(String),
    Int(i64),
    Error(ServerError),
    Bulk(Bulk),
    /// `None` is a nil array (`*-1\r\n`).
    Array(Option<Vec<Reply>>),
}

impl Reply {
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    pub fn as_error(&self) -> Option<&ServerError> {
        match self {
            Reply::Error(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_result(self) -> crate::error::Result<Reply> {
        match self {
            Reply::Error(e) => Err(e.into()),
            other => Ok(other),
        }
    }
}

// SPDX-License-Identifier: Apache-2.0

//! Pipeline encoding (spec §4.2).
//!
//! Synthetic requests (spec §4.3's `return`) contribute no bytes at all:
//! they're placeholders resolved entirely client-side.

use crate::request::{Body, Request};

/// Encode a batch of requests into a single pipeline buffer.
///
/// `*N\r\n` followed by `$L\r\n<bytes>\r\n` per argument, one array per
/// non-synthetic request, concatenated in order.
pub fn encode_pipeline(requests: &[Request]) -> Vec<u8> {
    let mut out = Vec::new();
    for req in requests {
        if let Body::Wire(args) = &req.body {
            encode_one(args, &mut out);
        }
    }
    out
}

/// Encode a single already-coerced argument list.
pub fn encode_one(args: &[Vec<u8>], out: &mut Vec<u8>) {
    out.push(b'*');
    out.extend_from_slice(args.len().to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    for arg in args {
        out.push(b'$');
        out.extend_from_slice(arg.len().to_string().as_bytes());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
}

// SPDX-License-Identifier: Apache-2.0

//! Reply decoding (spec §4.2).
//!
//! Mirrors the legacy parser's shape in spirit (`cli/src/protocol/deserializer.rs`):
//! a hand-rolled recursive-descent scan over a byte slice that reports
//! "not enough bytes yet" rather than blocking, so the caller (see
//! [`crate::executor`]) can keep filling its buffer and retry the whole
//! parse. Unlike the legacy parser this one recurses for nested arrays,
//! since RESP arrays can contain arrays.

use crate::error::{Error, Result};
use crate::freeze::Freezer;
use crate::request::RequestOptions;
use crate::wire::reply::{Bulk, Reply};
use crate::wire::{BINARY_MARKER, OBJECT_MARKER};

/// Attempt to decode exactly one reply starting at the front of `buf`.
///
/// Returns `Ok(None)` when `buf` doesn't yet hold a complete reply (the
/// caller should read more bytes and retry); returns `Ok(Some((reply,
/// consumed)))` on success, where `consumed` is the number of leading
/// bytes of `buf` the reply occupied.
pub fn try_decode(
    buf: &[u8],
    opts: &RequestOptions,
    freezer: Option<&dyn Freezer>,
) -> Result<Option<(Reply, usize)>> {
    match parse_one(buf, 0, opts, freezer)? {
        Some((reply, end)) => Ok(Some((reply, end))),
        None => Ok(None),
    }
}

fn find_crlf(buf: &[u8], start: usize) -> Option<usize> {
    if start > buf.len() {
        return None;
    }
    buf[start..]
        .windows(2)
        .position(|w| w == b"\r\n")
        .map(|i| start + i)
}

/// Read a CRLF-terminated line starting at `start`. Returns the line's
/// content and the position immediately after the CRLF.
fn read_line(buf: &[u8], start: usize) -> Option<(&[u8], usize)> {
    let idx = find_crlf(buf, start)?;
    Some((&buf[start..idx], idx + 2))
}

fn parse_int_line(line: &[u8]) -> Result<i64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| Error::Protocol(format!("expected integer line, got {line:?}")))
}

fn parse_one(
    buf: &[u8],
    start: usize,
    opts: &RequestOptions,
    freezer: Option<&dyn Freezer>,
) -> Result<Option<(Reply, usize)>> {
    if start >= buf.len() {
        return Ok(None);
    }
    let tag = buf[start];
    let body_start = start + 1;
    match tag {
        b'+' => match read_line(buf, body_start) {
            Some((line, end)) => Ok(Some((
                Reply::Simple(String::from_utf8_lossy(line).into_owned()),
                end,
            ))),
            None => Ok(None),
        },
        b'-' => match read_line(buf, body_start) {
            Some((line, end)) => {
                let text = String::from_utf8_lossy(line);
                Ok(Some((Reply::Error(crate::error::ServerError::parse(&text)), end)))
            }
            None => Ok(None),
        },
        b':' => match read_line(buf, body_start) {
            Some((line, end)) => Ok(Some((Reply::Int(parse_int_line(line)?), end))),
            None => Ok(None),
        },
        b'$' => match read_line(buf, body_start) {
            Some((line, header_end)) => {
                let len = parse_int_line(line)?;
                if len < 0 {
                    return Ok(Some((Reply::Bulk(Bulk::Nil), header_end)));
                }
                let len = len as usize;
                let payload_end = header_end + len;
                if buf.len() < payload_end + 2 {
                    return Ok(None);
                }
                if &buf[payload_end..payload_end + 2] != b"\r\n" {
                    return Err(Error::Protocol("bulk string missing trailing CRLF".into()));
                }
                let payload = &buf[header_end..payload_end];
                let bulk = interpret_bulk(payload, opts, freezer)?;
                Ok(Some((Reply::Bulk(bulk), payload_end + 2)))
            }
            None => Ok(None),
        },
        b'*' => match read_line(buf, body_start) {
            Some((line, header_end)) => {
                let count = parse_int_line(line)?;
                if count < 0 {
                    return Ok(Some((Reply::Array(None), header_end)));
                }
                let mut items = Vec::with_capacity(count as usize);
                let mut pos = header_end;
                for _ in 0..count {
                    match parse_one(buf, pos, opts, freezer)? {
                        Some((reply, end)) => {
                            items.push(reply);
                            pos = end;
                        }
                        None => return Ok(None),
                    }
                }
                Ok(Some((Reply::Array(Some(items)), pos)))
            }
            None => Ok(None),
        },
        other => Err(Error::Protocol(format!(
            "unknown reply type byte {other:#04x}"
        ))),
    }
}

/// Interpret a decoded bulk-string payload according to the in-bulk
/// marker convention (spec §4.2), unless `opts.raw_bulk` bypasses it.
fn interpret_bulk(
    bytes: &[u8],
    opts: &RequestOptions,
    freezer: Option<&dyn Freezer>,
) -> Result<Bulk> {
    if opts.raw_bulk {
        return Ok(Bulk::Bytes(bytes.to_vec()));
    }
    if bytes.len() >= 2 && &bytes[..2] == &OBJECT_MARKER[..] {
        let freezer = freezer
            .ok_or_else(|| Error::Thaw("frozen object received but no freezer is configured".into()))?;
        let value = freezer
            .thaw(&bytes[2..], &opts.thaw_options)
            .map_err(|e| Error::Thaw(e.to_string()))?;
        return Ok(Bulk::Object(value));
    }
    if bytes.len() >= 2 && &bytes[..2] == &BINARY_MARKER[..] {
        return Ok(Bulk::Bytes(bytes[2..].to_vec()));
    }
    if opts.thaw_options.legacy_compat {
        if let Some(freezer) = freezer {
            if let Some(header) = freezer.legacy_header() {
                if !header.is_empty() && bytes.starts_with(header) {
                    return Ok(match freezer.thaw(bytes, &opts.thaw_options) {
                        Ok(value) => Bulk::Object(value),
                        Err(_) => Bulk::Bytes(bytes.to_vec()),
                    });
                }
            }
        }
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => Ok(Bulk::Text(s.to_owned())),
        Err(_) => Ok(Bulk::Bytes(bytes.to_vec())),
    }
}

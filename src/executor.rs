// SPDX-License-Identifier: Apache-2.0

//! The single-node executor (spec §4.4).
//!
//! Acquires one connection, writes the whole pipeline in one `write_all`,
//! then reads replies one at a time off a growable buffer, matching the
//! teacher's manual `BytesMut` buffering in `dbnet/connection.rs` rather
//! than wrapping the stream in `tokio::io::BufReader` (we need to interleave
//! writes and reads on the same stream, and the decoder already knows how
//! to ask for "not enough bytes yet").

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::freeze::Freezer;
use crate::pool::{Connection, ConnectionPool};
use crate::request::{Body, Request};
use crate::wire::reply::Reply;
use crate::wire::{decode, encode};

const INITIAL_READ_BUF: usize = 4096;

/// Run every request in `requests` against the single node `spec`,
/// acquiring and releasing exactly one connection from `pool`.
pub async fn execute<P: ConnectionPool>(
    pool: &P,
    spec: &crate::config::NodeSpec,
    requests: &[Request],
    freezer: Option<&dyn Freezer>,
) -> Result<Vec<Reply>> {
    if requests.is_empty() {
        return Ok(Vec::new());
    }
    if requests.iter().all(|r| r.is_synthetic()) {
        return Ok(requests
            .iter()
            .map(|r| r.parser.apply(Reply::Simple(String::new())))
            .collect());
    }
    log::debug!(
        "flushing pipeline to {}:{} ({} request(s))",
        spec.host,
        spec.port,
        requests.len()
    );
    let mut conn = pool.acquire(spec).await?;
    let outcome = run_pipeline(&mut conn, requests, freezer).await;
    match &outcome {
        Ok(_) => pool.release(spec, conn, None).await,
        Err(e) => pool.release(spec, conn, Some(e)).await,
    }
    outcome
}

async fn run_pipeline<C: Connection>(
    conn: &mut C,
    requests: &[Request],
    freezer: Option<&dyn Freezer>,
) -> Result<Vec<Reply>> {
    let bytes = encode::encode_pipeline(requests);
    if !bytes.is_empty() {
        conn.write_all(&bytes).await?;
        conn.flush().await?;
    }

    let mut buf = BytesMut::with_capacity(INITIAL_READ_BUF);
    let mut out = Vec::with_capacity(requests.len());
    for req in requests {
        out.push(match &req.body {
            Body::Wire(_) => {
                let raw = read_one(conn, &mut buf, &req.parser.options, freezer).await?;
                req.parser.apply(raw)
            }
            Body::Synthetic => req.parser.apply(Reply::Simple(String::new())),
        });
    }
    Ok(out)
}

async fn read_one<C: Connection>(
    conn: &mut C,
    buf: &mut BytesMut,
    opts: &crate::request::RequestOptions,
    freezer: Option<&dyn Freezer>,
) -> Result<Reply> {
    loop {
        if let Some((reply, consumed)) = decode::try_decode(buf, opts, freezer)? {
            let _ = buf.split_to(consumed);
            return Ok(reply);
        }
        let n = conn.read_buf(buf).await?;
        if n == 0 {
            return Err(Error::Protocol(
                "connection closed mid-reply".to_owned(),
            ));
        }
    }
}

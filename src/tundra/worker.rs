// SPDX-License-Identifier: Apache-2.0

//! The tundra worker loop (spec §4.6): drain the dirty-key queue, `DUMP`
//! each key with `raw_bulk` set (there's no reason to interpret its
//! payload through the marker convention — it's opaque to us), optionally
//! run it through the freezer as a storage-side transform, and persist it
//! to the blob datastore.

use std::collections::HashMap;

use crate::commands;
use crate::config::WorkerConfig;
use crate::error::{Error, Result};
use crate::freeze::Freezer;
use crate::pool::ConnectionPool;
use crate::request::{ReplyParser, RequestOptions};
use crate::session::Session;
use crate::value::Value;
use crate::wire::reply::{Bulk, Reply};

use super::queue::{DirtyMessage, WorkQueue};
use super::store::BlobStore;

/// The result of attempting to freeze one key.
pub enum WorkerOutcome {
    /// The key was frozen (or had already vanished, which is equivalent).
    Success,
    /// A transient failure; worth retrying within the attempt budget.
    Retry(Error),
    /// A failure retrying won't fix (malformed reply, coercion failure).
    Error(Error),
}

/// Process a single dirty-key message end to end.
///
/// A nil `DUMP` (the key no longer exists on the server) is treated as a
/// completed freeze, not an error: its absence is authoritative, which is
/// a deliberate deviation documented in `DESIGN.md`.
pub async fn process_one<P, S>(
    session: &mut Session<'_, P>,
    store: &S,
    message: &DirtyMessage,
    freezer: Option<&dyn Freezer>,
) -> WorkerOutcome
where
    P: ConnectionPool,
    S: BlobStore,
{
    let raw_bulk_parser = ReplyParser::new(RequestOptions {
        raw_bulk: true,
        ..Default::default()
    });
    if let Err(e) = session.with_parser(raw_bulk_parser, |s| {
        s.push(commands::dump(message.key.clone()), Some(message.key.as_slice()))
    }) {
        return WorkerOutcome::Error(e);
    }

    let reply = match session.flush(false).await {
        Ok(r) => r
            .into_single()
            .expect("flush(false) of a single DUMP yields a single reply"),
        Err(e) => return classify(e),
    };

    let bytes = match reply {
        Reply::Bulk(Bulk::Nil) => return WorkerOutcome::Success,
        Reply::Bulk(Bulk::Bytes(b)) => b,
        other => {
            return WorkerOutcome::Error(Error::Protocol(format!(
                "unexpected DUMP reply shape: {other:?}"
            )))
        }
    };

    let payload = match freezer {
        Some(f) => match f.freeze(&Value::Bytes(bytes)) {
            Ok(transformed) => transformed,
            Err(e) => return WorkerOutcome::Retry(Error::Freeze(e.to_string())),
        },
        None => bytes,
    };

    match store.put(&message.key, payload).await {
        Ok(()) => WorkerOutcome::Success,
        Err(e) => classify(e),
    }
}

fn classify(e: Error) -> WorkerOutcome {
    match e {
        Error::Io(_) | Error::Timeout | Error::Datastore(_) => WorkerOutcome::Retry(e),
        other => WorkerOutcome::Error(other),
    }
}

/// Drain up to one batch of the dirty queue, processing each message and
/// acking, nacking, or giving up according to `cfg.nattempts`.
///
/// `attempts` tracks per-message retry counts across calls; a real
/// deployment runs this in a loop from several worker tasks, one
/// `attempts` map per task (spec's `WorkerConfig::nthreads`).
pub async fn drain_once<P, S, Q>(
    session: &mut Session<'_, P>,
    store: &S,
    queue: &Q,
    attempts: &mut HashMap<String, u32>,
    cfg: &WorkerConfig,
    freezer: Option<&dyn Freezer>,
) -> Result<usize>
where
    P: ConnectionPool,
    S: BlobStore,
    Q: WorkQueue,
{
    let batch = queue.dequeue(cfg.nthreads.max(1)).await?;
    if batch.is_empty() {
        tokio::time::sleep(cfg.eoq_backoff).await;
        return Ok(0);
    }

    let mut processed = 0usize;
    for message in &batch {
        match process_one(session, store, message, freezer).await {
            WorkerOutcome::Success => {
                queue.ack(&message.id).await?;
                attempts.remove(&message.id);
                processed += 1;
            }
            WorkerOutcome::Retry(e) => {
                log::warn!(
                    "tundra worker: transient failure on key {:?}: {e}",
                    String::from_utf8_lossy(&message.key)
                );
                give_up_or_retry(queue, attempts, message, cfg).await?;
            }
            WorkerOutcome::Error(e) => {
                log::error!(
                    "tundra worker: permanent failure on key {:?}: {e}",
                    String::from_utf8_lossy(&message.key)
                );
                queue.ack(&message.id).await?;
                attempts.remove(&message.id);
            }
        }
        tokio::time::sleep(cfg.throttle).await;
    }
    Ok(processed)
}

async fn give_up_or_retry<Q: WorkQueue>(
    queue: &Q,
    attempts: &mut HashMap<String, u32>,
    message: &DirtyMessage,
    cfg: &WorkerConfig,
) -> Result<()> {
    let count = attempts.entry(message.id.clone()).or_insert(0);
    *count += 1;
    if *count >= cfg.nattempts {
        log::error!(
            "tundra worker: key {:?} exhausted {} attempt(s), giving up",
            String::from_utf8_lossy(&message.key),
            cfg.nattempts
        );
        queue.ack(&message.id).await?;
        attempts.remove(&message.id);
    } else {
        queue.nack(&message.id).await?;
    }
    Ok(())
}

// SPDX-License-Identifier: Apache-2.0

//! `dirty`: mark a batch of keys for asynchronous freezing (spec §4.6).
//!
//! Reuses `ensure_ks`'s "does it exist, and if so bump its TTL" round trip
//! to learn which of `keys` are actually live before queuing work for
//! them; enqueuing is idempotent by message id, and the id is derived
//! deterministically from the key itself (its hex encoding) so marking
//! the same key dirty twice before the worker has drained it collapses
//! into one message instead of queuing duplicate freeze work.

use std::collections::HashMap;

use super::ensure::check_and_extend;
use super::queue::{DirtyMessage, WorkQueue};
use crate::config::TundraConfig;
use crate::error::{Error, Result};
use crate::pool::ConnectionPool;
use crate::session::Session;

/// Mark every key in `keys` that currently exists on the server as dirty,
/// enqueuing one idempotent message per key onto `queue`. `cfg`'s TTL is
/// the same floor `ensure_ks` would apply (spec's tundra TTL, `0` if
/// unset), and is validated before anything is touched (spec §3's ≥10h
/// floor).
///
/// Keys that were missing are *not* enqueued and are reported in a single
/// [`Error::Aggregate`] once every present key has already been queued;
/// enqueuing the present keys is never rolled back on that error (spec
/// §4.6: "queuing is not rolled back").
pub async fn dirty<P, Q>(
    session: &mut Session<'_, P>,
    queue: &Q,
    keys: &[Vec<u8>],
    cfg: &TundraConfig,
) -> Result<()>
where
    P: ConnectionPool,
    Q: WorkQueue,
{
    cfg.validate()?;
    if keys.is_empty() {
        return Ok(());
    }
    let ttl_millis = cfg.ttl_millis();
    let found = check_and_extend(session, keys, ttl_millis).await?;

    let mut missing: HashMap<Vec<u8>, Error> = HashMap::new();
    for (key, present) in keys.iter().zip(found.iter()) {
        if *present {
            let message = DirtyMessage {
                id: message_id(key),
                key: key.clone(),
            };
            queue.enqueue(message).await?;
        } else {
            missing.insert(key.clone(), Error::Protocol("key does not exist".into()));
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::Aggregate(missing))
    }
}

fn message_id(key: &[u8]) -> String {
    let mut out = String::with_capacity(key.len() * 2);
    for b in key {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

// SPDX-License-Identifier: Apache-2.0

//! `ensure_ks`: make sure a batch of keys is live on the server, restoring
//! any that tundra had frozen (and evicted) from the blob datastore (spec
//! §4.6).
//!
//! The spec's "single atomic server-side script" that checks-or-extends
//! every key in one pass is simulated here as one pipelined `PEXPIRE` per
//! key, flushed together: `PEXPIRE`'s integer reply is `0` for a missing
//! key and `1` for one that was touched, so the same round trip that
//! learns existence also refreshes the TTL, with no race window between
//! a separate `EXISTS` and a following `PEXPIRE`.

use std::collections::HashMap;

use crate::commands;
use crate::config::TundraConfig;
use crate::error::{Error, Result};
use crate::freeze::{Freezer, ThawOptions};
use crate::pool::ConnectionPool;
use crate::session::Session;
use crate::value::Value;
use crate::wire::reply::Reply;

use super::store::BlobStore;

/// Check which of `keys` are currently live on the server, extending each
/// one's TTL to `ttl_millis` in the same round trip (spec §4.6 step 1,
/// shared with [`super::dirty::dirty`]).
///
/// Returns, in the same order as `keys`, whether each key was found.
pub(super) async fn check_and_extend<P: ConnectionPool>(
    session: &mut Session<'_, P>,
    keys: &[Vec<u8>],
    ttl_millis: i64,
) -> Result<Vec<bool>> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }
    for key in keys {
        session.push(commands::pexpire(key.clone(), ttl_millis), Some(key.as_slice()))?;
    }
    let replies = session.flush(true).await?.into_vec();
    Ok(replies
        .into_iter()
        .map(|r| matches!(r, Reply::Int(1)))
        .collect())
}

/// Ensure every key in `keys` is present and carries at least `ttl_millis`
/// of remaining life, restoring whichever ones the server doesn't have
/// from `store`.
///
/// A concurrent restore losing the race to another caller surfaces as the
/// server's `"ERR Target key name is busy."` and is treated as success:
/// the key is live either way, which is all this operation promises. Any
/// other per-key failure is collected and raised together as
/// [`Error::Aggregate`] once every key has been attempted.
///
/// `freezer`, if given, inverts the transform the tundra worker applied
/// before handing a `DUMP` payload to the datastore (spec §8 scenario 6:
/// "DUMP/RESTORE payloads are already the server's native format; the
/// freezer here wraps only for the datastore's sake") — the stored blob is
/// thawed back into the raw bytes `RESTORE` expects. With no freezer
/// configured, the datastore is assumed to already hold raw `DUMP` bytes.
///
/// `cfg` is validated before anything is touched, enforcing the ≥10h TTL
/// floor (spec §3) on the actual call path rather than leaving it to the
/// caller's discretion.
pub async fn ensure_ks<P, S>(
    session: &mut Session<'_, P>,
    store: &S,
    freezer: Option<&dyn Freezer>,
    keys: &[Vec<u8>],
    cfg: &TundraConfig,
) -> Result<()>
where
    P: ConnectionPool,
    S: BlobStore,
{
    cfg.validate()?;
    if keys.is_empty() {
        return Ok(());
    }
    let ttl_millis = cfg.ttl_millis();
    let found = check_and_extend(session, keys, ttl_millis).await?;
    let missing: Vec<Vec<u8>> = keys
        .iter()
        .zip(found.iter())
        .filter_map(|(k, &present)| if present { None } else { Some(k.clone()) })
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    let mut errors: HashMap<Vec<u8>, Error> = HashMap::new();
    let mut to_restore: Vec<(Vec<u8>, Vec<u8>)> = Vec::with_capacity(missing.len());
    for key in missing {
        let stored = match store.get(&key).await {
            // Nothing was ever frozen for this key: its absence is authoritative.
            Ok(None) => continue,
            Ok(Some(blob)) => blob,
            Err(e) => {
                errors.insert(key, e);
                continue;
            }
        };
        let raw = match freezer {
            None => stored,
            Some(f) => match f.thaw(&stored, &ThawOptions::default()) {
                Ok(Value::Bytes(raw)) => raw,
                Ok(_) => {
                    errors.insert(
                        key,
                        Error::Thaw("thawed datastore blob was not raw bytes".into()),
                    );
                    continue;
                }
                Err(e) => {
                    errors.insert(key, Error::Thaw(e.to_string()));
                    continue;
                }
            },
        };
        to_restore.push((key, raw));
    }

    if !to_restore.is_empty() {
        for (key, blob) in &to_restore {
            session.push(commands::restore(key.clone(), ttl_millis, blob.clone()), Some(key.as_slice()))?;
        }
        let replies = session.flush(true).await?.into_vec();
        for ((key, _), reply) in to_restore.into_iter().zip(replies) {
            if let Reply::Error(e) = reply {
                if !is_key_busy(&e.message) {
                    errors.insert(key, Error::Server(e));
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Aggregate(errors))
    }
}

fn is_key_busy(message: &str) -> bool {
    message.to_ascii_lowercase().contains("busy")
}

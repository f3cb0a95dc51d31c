// SPDX-License-Identifier: Apache-2.0

mod support;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use keypipe::config::{NodeSpec, TundraConfig, WorkerConfig};
use keypipe::error::Result;
use keypipe::session::{with_connection, Target};
use keypipe::tundra::{dirty, ensure_ks, BlobStore, DirtyMessage, WorkQueue};
use support::ScriptedPool;

/// No TTL floor configured: `ensure_ks`/`dirty` fall back to `0` (no
/// extension), matching what these tests exercised before `TundraConfig`
/// wiring was added.
fn no_ttl_cfg() -> TundraConfig {
    TundraConfig::new(
        None,
        WorkerConfig {
            nthreads: 1,
            throttle: Duration::from_millis(100),
            eoq_backoff: Duration::from_secs(1),
            nattempts: 3,
        },
    )
}

/// An in-memory datastore fake, in the spirit of `support::ScriptedPool`.
#[derive(Default)]
struct MemStore {
    blobs: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemStore {
    fn with(entries: &[(&[u8], &[u8])]) -> Self {
        let mut blobs = HashMap::new();
        for (k, v) in entries {
            blobs.insert(k.to_vec(), v.to_vec());
        }
        Self {
            blobs: Mutex::new(blobs),
        }
    }
}

impl BlobStore for MemStore {
    fn put<'a>(
        &'a self,
        key: &'a [u8],
        blob: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.blobs.lock().unwrap().insert(key.to_vec(), blob);
            Ok(())
        })
    }

    fn get<'a>(
        &'a self,
        key: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>>> + Send + 'a>> {
        Box::pin(async move { Ok(self.blobs.lock().unwrap().get(key).cloned()) })
    }

    fn delete<'a>(&'a self, key: &'a [u8]) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.blobs.lock().unwrap().remove(key);
            Ok(())
        })
    }
}

#[derive(Default)]
struct MemQueue {
    messages: Mutex<Vec<DirtyMessage>>,
}

impl WorkQueue for MemQueue {
    fn enqueue<'a>(
        &'a self,
        message: DirtyMessage,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut messages = self.messages.lock().unwrap();
            if !messages.iter().any(|m| m.id == message.id) {
                messages.push(message);
            }
            Ok(())
        })
    }

    fn dequeue<'a>(
        &'a self,
        max: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DirtyMessage>>> + Send + 'a>> {
        Box::pin(async move {
            let mut messages = self.messages.lock().unwrap();
            let drained: Vec<_> = messages.drain(..messages.len().min(max)).collect();
            Ok(drained)
        })
    }

    fn ack<'a>(&'a self, _id: &'a str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move { Ok(()) })
    }

    fn nack<'a>(&'a self, _id: &'a str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move { Ok(()) })
    }
}

#[tokio::test]
async fn ensure_ks_restores_only_the_missing_keys() {
    // k1 is missing on the server (PEXPIRE -> 0) and has a frozen blob;
    // k2 is already live (PEXPIRE -> 1) so it's never touched again.
    let store = MemStore::with(&[(b"k1", b"frozen-blob")]);
    let pool = ScriptedPool::new(vec![
        b":0\r\n:1\r\n",   // PEXPIRE k1, PEXPIRE k2
        b"+OK\r\n",        // RESTORE k1
    ]);
    let spec = NodeSpec::new("127.0.0.1", 7000);

    with_connection(&pool, Target::Node(spec), None, true, |s| async move {
        ensure_ks(s, &store, None, &[b"k1".to_vec(), b"k2".to_vec()], &no_ttl_cfg())
            .await
            .unwrap();
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn ensure_ks_treats_busy_restore_as_success() {
    let store = MemStore::with(&[(b"k1", b"frozen-blob")]);
    let pool = ScriptedPool::new(vec![
        b":0\r\n",
        b"-ERR Target key name is busy.\r\n",
    ]);
    let spec = NodeSpec::new("127.0.0.1", 7000);

    with_connection(&pool, Target::Node(spec), None, true, |s| async move {
        ensure_ks(s, &store, None, &[b"k1".to_vec()], &no_ttl_cfg()).await.unwrap();
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn ensure_ks_treats_unseen_missing_key_as_fine() {
    let store = MemStore::default(); // no blob for k1: datastore never saw it
    let pool = ScriptedPool::new(vec![b":0\r\n"]);
    let spec = NodeSpec::new("127.0.0.1", 7000);

    // k1 is missing and the store has nothing for it either: its absence
    // is authoritative, so this is not an error.
    with_connection(&pool, Target::Node(spec), None, true, |s| async move {
        ensure_ks(s, &store, None, &[b"k1".to_vec()], &no_ttl_cfg()).await.unwrap();
    })
    .await
    .unwrap();
}

struct FailingStore;

impl BlobStore for FailingStore {
    fn put<'a>(
        &'a self,
        _key: &'a [u8],
        _blob: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move { Err(keypipe::Error::Datastore("put unavailable".into())) })
    }

    fn get<'a>(
        &'a self,
        _key: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>>> + Send + 'a>> {
        Box::pin(async move { Err(keypipe::Error::Datastore("fetch unavailable".into())) })
    }

    fn delete<'a>(&'a self, _key: &'a [u8]) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move { Ok(()) })
    }
}

#[tokio::test]
async fn ensure_ks_aggregates_datastore_failures_by_key() {
    let store = FailingStore;
    let pool = ScriptedPool::new(vec![b":0\r\n:0\r\n"]); // both k1 and k2 missing
    let spec = NodeSpec::new("127.0.0.1", 7000);

    with_connection(&pool, Target::Node(spec), None, true, |s| async move {
        let err = ensure_ks(s, &store, None, &[b"k1".to_vec(), b"k2".to_vec()], &no_ttl_cfg())
            .await
            .unwrap_err();
        match err {
            keypipe::Error::Aggregate(errs) => {
                assert_eq!(errs.len(), 2);
                assert!(errs.contains_key(&b"k1".to_vec()));
                assert!(errs.contains_key(&b"k2".to_vec()));
            }
            other => panic!("expected an aggregate error, got {other:?}"),
        }
    })
    .await
    .unwrap();
}

/// A freezer whose "frozen" form is just the raw bytes reversed, so tests
/// can tell whether `ensure_ks` actually thawed a stored blob before using
/// it as a `RESTORE` payload.
struct ReversingFreezer;

impl keypipe::freeze::Freezer for ReversingFreezer {
    fn freeze(&self, value: &keypipe::Value) -> Result<Vec<u8>> {
        match value {
            keypipe::Value::Bytes(b) => Ok(b.iter().rev().copied().collect()),
            _ => Err(keypipe::Error::Freeze("only bytes are supported".into())),
        }
    }

    fn thaw(&self, bytes: &[u8], _opts: &keypipe::freeze::ThawOptions) -> Result<keypipe::Value> {
        Ok(keypipe::Value::Bytes(bytes.iter().rev().copied().collect()))
    }
}

#[tokio::test]
async fn ensure_ks_thaws_the_stored_blob_before_restoring() {
    // The datastore holds dump bytes run through `ReversingFreezer::freeze`
    // (as the worker would have stored them); ensure_ks must thaw them
    // back to the original bytes before issuing RESTORE.
    let original = b"dump-bytes".to_vec();
    let stored: Vec<u8> = original.iter().rev().copied().collect();
    let store = MemStore::with(&[(b"k1", &stored)]);
    let freezer = ReversingFreezer;

    let pool = ScriptedPool::new(vec![b":0\r\n", b"+OK\r\n"]);
    let spec = NodeSpec::new("127.0.0.1", 7000);

    with_connection(&pool, Target::Node(spec), None, true, |s| async move {
        ensure_ks(s, &store, Some(&freezer), &[b"k1".to_vec()], &no_ttl_cfg())
            .await
            .unwrap();
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn dirty_enqueues_present_keys_and_reports_missing_ones() {
    let queue = MemQueue::default();
    let pool = ScriptedPool::new(vec![b":1\r\n:0\r\n"]); // k1 present, k2 missing
    let spec = NodeSpec::new("127.0.0.1", 7000);

    let err = with_connection(&pool, Target::Node(spec), None, true, |s| async move {
        dirty(s, &queue, &[b"k1".to_vec(), b"k2".to_vec()], &no_ttl_cfg())
            .await
            .unwrap_err();
    })
    .await;

    assert!(err.is_ok(), "with_connection itself should not fail: {err:?}");
    assert_eq!(queue.messages.lock().unwrap().len(), 1);
    assert_eq!(queue.messages.lock().unwrap()[0].key, b"k1".to_vec());
}

#[tokio::test]
async fn ensure_ks_rejects_a_ttl_below_the_floor_before_touching_the_wire() {
    let store = MemStore::default();
    // No scripted replies: a wire round trip here would fail the test.
    let pool = ScriptedPool::new(vec![]);
    let spec = NodeSpec::new("127.0.0.1", 7000);
    let cfg = TundraConfig::new(
        Some(Duration::from_secs(60)),
        WorkerConfig {
            nthreads: 1,
            throttle: Duration::from_millis(100),
            eoq_backoff: Duration::from_secs(1),
            nattempts: 3,
        },
    );

    let err = with_connection(&pool, Target::Node(spec), None, true, |s| async move {
        let err = ensure_ks(s, &store, None, &[b"k1".to_vec()], &cfg).await.unwrap_err();
        assert!(matches!(err, keypipe::Error::Coerce(_)));
    })
    .await;

    assert!(err.is_ok(), "with_connection itself should not fail: {err:?}");
}

#[tokio::test]
async fn dirty_rejects_a_ttl_below_the_floor_before_touching_the_wire() {
    let queue = MemQueue::default();
    let pool = ScriptedPool::new(vec![]);
    let spec = NodeSpec::new("127.0.0.1", 7000);
    let cfg = TundraConfig::new(
        Some(Duration::from_secs(60)),
        WorkerConfig {
            nthreads: 1,
            throttle: Duration::from_millis(100),
            eoq_backoff: Duration::from_secs(1),
            nattempts: 3,
        },
    );

    let err = with_connection(&pool, Target::Node(spec), None, true, |s| async move {
        let err = dirty(s, &queue, &[b"k1".to_vec()], &cfg).await.unwrap_err();
        assert!(matches!(err, keypipe::Error::Coerce(_)));
    })
    .await;

    assert!(err.is_ok(), "with_connection itself should not fail: {err:?}");
    assert!(queue.messages.lock().unwrap().is_empty());
}

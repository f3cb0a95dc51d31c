// SPDX-License-Identifier: Apache-2.0

//! A scripted `ConnectionPool` fake backed by `tokio::io::duplex`, in the
//! spirit of the teacher's `harness` crate: something that drives a
//! session end to end without a real server on the other side.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Once;

use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::Mutex;

use keypipe::config::NodeSpec;
use keypipe::error::{Error, Result};
use keypipe::pool::ConnectionPool;

static LOG_INIT: Once = Once::new();

/// Initialize `env_logger` once per test binary, so `log::debug!`/`warn!`
/// calls along the redirect/timeout/give-up paths are visible under
/// `RUST_LOG=keypipe=debug cargo test -- --nocapture`.
pub fn init_logging() {
    LOG_INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Hands out one scripted reply buffer per `acquire` call, in order,
/// regardless of which node spec was asked for.
pub struct ScriptedPool {
    scripts: Mutex<VecDeque<Vec<u8>>>,
}

impl ScriptedPool {
    pub fn new(scripts: Vec<&'static [u8]>) -> Self {
        init_logging();
        Self {
            scripts: Mutex::new(scripts.into_iter().map(|s| s.to_vec()).collect()),
        }
    }
}

impl ConnectionPool for ScriptedPool {
    type Conn = DuplexStream;

    fn acquire<'a>(
        &'a self,
        _spec: &'a NodeSpec,
    ) -> Pin<Box<dyn Future<Output = Result<Self::Conn>> + Send + 'a>> {
        Box::pin(async move {
            let script = self
                .scripts
                .lock()
                .await
                .pop_front()
                .ok_or_else(|| Error::Protocol("scripted pool ran out of replies".into()))?;
            let (client, mut server) = tokio::io::duplex(8192);
            tokio::spawn(async move {
                let _ = server.write_all(&script).await;
            });
            Ok(client)
        })
    }

    fn release<'a>(
        &'a self,
        _spec: &'a NodeSpec,
        _conn: Self::Conn,
        _failure: Option<&'a Error>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {})
    }
}

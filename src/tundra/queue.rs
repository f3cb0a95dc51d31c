// SPDX-License-Identifier: Apache-2.0

//! The external work-queue contract `dirty` pushes onto and the worker
//! drains from (spec §4.6/§6). Out of scope to implement — this crate only
//! defines the boundary a real queue (SQS, a Redis list, anything else)
//! is plugged in behind.

use std::future::Future;
use std::pin::Pin;

use crate::error::Result;

/// One message on the tundra work queue: "this key needs to be frozen".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirtyMessage {
    /// An idempotency key: enqueuing the same id twice must not duplicate
    /// work (spec §4.6's "idempotent by message id").
    pub id: String,
    pub key: Vec<u8>,
}

pub trait WorkQueue: Send + Sync {
    /// Enqueue `message`, returning `Ok(())` whether or not a message with
    /// the same id was already queued.
    fn enqueue<'a>(
        &'a self,
        message: DirtyMessage,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Pull up to `max` messages for the worker to process.
    fn dequeue<'a>(
        &'a self,
        max: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DirtyMessage>>> + Send + 'a>>;

    /// Acknowledge successful (or permanently failed) processing, removing
    /// the message from the queue.
    fn ack<'a>(&'a self, id: &'a str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Return a message to the queue after a transient failure, typically
    /// behind some backoff the queue implementation applies itself.
    fn nack<'a>(&'a self, id: &'a str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

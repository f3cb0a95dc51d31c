// SPDX-License-Identifier: Apache-2.0

//! The tundra eviction/restore coordinator (spec §4.6): keeps cold keys
//! alive on demand (`ensure_ks`), marks hot keys for eviction (`dirty`),
//! and the worker that actually freezes them into the blob datastore.

pub mod dirty;
pub mod ensure;
pub mod queue;
pub mod store;
pub mod worker;

pub use dirty::dirty;
pub use ensure::ensure_ks;
pub use queue::{DirtyMessage, WorkQueue};
pub use store::BlobStore;
pub use worker::{drain_once, process_one, WorkerOutcome};

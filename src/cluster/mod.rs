// SPDX-License-Identifier: Apache-2.0

//! Cluster-aware dispatch (spec §4.5): keyslot computation, the
//! redirect-target cache, and the parallel per-node dispatcher.

pub mod cache;
pub mod dispatch;
pub mod keyslot;

pub use cache::SlotCache;
pub use dispatch::{dispatch, ClusterState};
pub use keyslot::keyslot;

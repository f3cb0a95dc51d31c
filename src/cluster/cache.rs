// SPDX-License-Identifier: Apache-2.0

//! The keyslot → node redirect cache (spec §4.5).
//!
//! A `MOVED` reply permanently updates where a slot lives; ASK redirects
//! never touch this cache (spec explicitly: "never cached"). Modeled as a
//! copy-on-write map behind a `parking_lot::RwLock`, the same lock the
//! teacher reaches for across `corestore`/`coredb` rather than a lock-free
//! structure — readers (one per dispatch) vastly outnumber writers (one
//! per `MOVED`).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::NodeSpec;

#[derive(Debug, Default)]
pub struct SlotCache {
    inner: RwLock<Arc<HashMap<u16, NodeSpec>>>,
}

impl SlotCache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// The node currently believed to own `slot`, if a `MOVED` has ever
    /// been observed for it.
    pub fn lookup(&self, slot: u16) -> Option<NodeSpec> {
        self.inner.read().get(&slot).cloned()
    }

    /// Record that `slot` now lives at `node`, replacing the whole map
    /// with a fresh copy that differs only in this one entry.
    pub fn update(&self, slot: u16, node: NodeSpec) {
        let mut guard = self.inner.write();
        let mut next = HashMap::clone(&guard);
        next.insert(slot, node);
        *guard = Arc::new(next);
    }
}

// SPDX-License-Identifier: Apache-2.0

//! Typed configuration structs.
//!
//! `keypipe` is a library, not a server, so unlike the teacher's
//! `config/cfgfile.rs` there is no file to load; callers build these
//! directly. They stay `serde`-derived regardless, matching the teacher's
//! habit of deriving `Deserialize` on every config struct so embedding
//! applications can still load them from their own config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single node's connection spec (spec §3/§6).
///
/// `cluster` being `Some(name)` is what selects cluster-dispatch mode for a
/// [`crate::session::Session`] bound to this spec (spec §4.3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeSpec {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub cluster: Option<String>,
}

impl NodeSpec {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            cluster: None,
        }
    }

    pub fn in_cluster(mut self, name: impl Into<String>) -> Self {
        self.cluster = Some(name.into());
        self
    }

    pub fn is_clustered(&self) -> bool {
        self.cluster.is_some()
    }
}

/// Cluster topology and dispatch limits (spec §4.5/§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub nodes: Vec<NodeSpec>,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u8,
    #[serde(default = "default_task_timeout", with = "duration_secs")]
    pub task_timeout: Duration,
}

fn default_max_redirects() -> u8 {
    14
}

fn default_task_timeout() -> Duration {
    Duration::from_secs(5)
}

impl ClusterConfig {
    pub fn new(nodes: Vec<NodeSpec>) -> Self {
        Self {
            nodes,
            max_redirects: default_max_redirects(),
            task_timeout: default_task_timeout(),
        }
    }
}

/// Tundra eviction/restore coordinator configuration (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TundraConfig {
    /// Minimum freeze TTL; spec requires at least 10 hours when set, to
    /// keep a dirtied key alive long enough for the worker to drain it.
    #[serde(default, with = "opt_duration_secs")]
    pub ttl: Option<Duration>,
    pub worker: WorkerConfig,
}

impl TundraConfig {
    pub fn new(ttl: Option<Duration>, worker: WorkerConfig) -> Self {
        Self { ttl, worker }
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if let Some(ttl) = self.ttl {
            if ttl < Duration::from_secs(10 * 3600) {
                return Err(crate::error::Error::Coerce(
                    "tundra ttl must be at least 10 hours".into(),
                ));
            }
        }
        Ok(())
    }

    /// The TTL `ensure_ks`/`dirty` apply to a key they touch, in
    /// milliseconds: `0` (no floor) when unset.
    pub(crate) fn ttl_millis(&self) -> i64 {
        self.ttl.map(|d| d.as_millis() as i64).unwrap_or(0)
    }
}

/// Tundra worker pool configuration (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub nthreads: usize,
    #[serde(with = "duration_secs")]
    pub throttle: Duration,
    #[serde(with = "duration_secs")]
    pub eoq_backoff: Duration,
    #[serde(default = "default_nattempts")]
    pub nattempts: u32,
}

fn default_nattempts() -> u32 {
    3
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs_f64().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

mod opt_duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        d.map(|d| d.as_secs_f64()).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<f64>::deserialize(d)?;
        Ok(secs.map(Duration::from_secs_f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tundra_ttl_below_floor_is_rejected() {
        let cfg = TundraConfig {
            ttl: Some(Duration::from_secs(60)),
            worker: WorkerConfig {
                nthreads: 1,
                throttle: Duration::from_millis(100),
                eoq_backoff: Duration::from_secs(1),
                nattempts: 3,
            },
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn tundra_ttl_at_floor_is_accepted() {
        let cfg = TundraConfig {
            ttl: Some(Duration::from_secs(10 * 3600)),
            worker: WorkerConfig {
                nthreads: 1,
                throttle: Duration::from_millis(100),
                eoq_backoff: Duration::from_secs(1),
                nattempts: 3,
            },
        };
        assert!(cfg.validate().is_ok());
    }
}

// SPDX-License-Identifier: Apache-2.0

//! The cluster dispatcher (spec §4.5).
//!
//! Groups requests by the node currently believed to own their keyslot,
//! runs one group per node concurrently (bounded by a per-group wall-clock
//! timeout), and repeats against whatever `MOVED`/`ASK` redirected until
//! every request has a final reply or the redirect budget
//! (`ClusterConfig::max_redirects`) is spent. Concurrency uses `futures`'
//! `join_all` rather than spawning OS tasks, since every future here only
//! borrows `pool` for the duration of one dispatch call (the teacher's own
//! codebase has no direct analogue for fan-out-with-timeout; this pattern
//! is grounded on how `tendermint-rs`'s `rpc` client uses `futures` to
//! drive several in-flight requests at once).

use std::collections::HashMap;

use crate::config::{ClusterConfig, NodeSpec};
use crate::error::{Error, Result, ServerError};
use crate::freeze::Freezer;
use crate::pool::ConnectionPool;
use crate::request::{Request, ReplyParser};
use crate::wire::reply::Reply;
use crate::{cluster::cache::SlotCache, executor};

/// Shared, long-lived cluster state a session dispatches against.
#[derive(Debug)]
pub struct ClusterState {
    pub config: ClusterConfig,
    pub cache: SlotCache,
}

impl ClusterState {
    pub fn new(config: ClusterConfig) -> Self {
        Self {
            config,
            cache: SlotCache::new(),
        }
    }

    fn cluster_name(&self) -> Option<&str> {
        self.config.nodes.first().and_then(|n| n.cluster.as_deref())
    }
}

struct PendingItem {
    request: Request,
    target: NodeSpec,
    asking: bool,
}

enum ItemOutcome {
    Done(Reply),
    Retry(PendingItem),
}

/// Dispatch `requests` across the cluster described by `state`, returning
/// replies in the same order the requests were given in.
pub async fn dispatch<P: ConnectionPool>(
    pool: &P,
    state: &ClusterState,
    requests: Vec<Request>,
    freezer: Option<&dyn Freezer>,
) -> Result<Vec<Reply>> {
    let total = requests.len();
    if total == 0 {
        return Ok(Vec::new());
    }

    let mut results: Vec<Option<Reply>> = (0..total).map(|_| None).collect();
    let mut pending: Vec<PendingItem> = requests
        .into_iter()
        .enumerate()
        .map(|(i, mut req)| {
            req.pos = i;
            let target = resolve_target(&req, state);
            PendingItem {
                request: req,
                target,
                asking: false,
            }
        })
        .collect();

    for _ in 0..state.config.max_redirects {
        if pending.is_empty() {
            break;
        }
        let groups = group_by_node(pending);
        let group_futures = groups
            .into_iter()
            .map(|(node, items)| run_group(pool, state, node, items, freezer));
        let group_results = futures::future::join_all(group_futures).await;

        pending = Vec::new();
        for outcome in group_results {
            match outcome {
                Ok(resolved) => {
                    for (pos, item_outcome) in resolved {
                        match item_outcome {
                            ItemOutcome::Done(reply) => results[pos] = Some(reply),
                            ItemOutcome::Retry(item) => pending.push(item),
                        }
                    }
                }
                Err((node, items, err)) => {
                    log::warn!(
                        "cluster dispatch group to {}:{} failed: {err}",
                        node.host,
                        node.port
                    );
                    for item in items {
                        results[item.request.pos] = Some(Reply::Error(ServerError {
                            prefix: "ioerr".to_owned(),
                            message: err.to_string(),
                        }));
                    }
                }
            }
        }
    }

    if !pending.is_empty() {
        for item in pending {
            results[item.request.pos] = Some(Reply::Error(ServerError {
                prefix: "err".to_owned(),
                message: "exceeded maximum number of cluster redirects".to_owned(),
            }));
        }
    }

    Ok(results
        .into_iter()
        .map(|r| r.expect("every request position is resolved by the dispatch loop"))
        .collect())
}

fn resolve_target(req: &Request, state: &ClusterState) -> NodeSpec {
    if let Some(slot) = req.expected_keyslot {
        if let Some(node) = state.cache.lookup(slot) {
            return node;
        }
    }
    state
        .config
        .nodes
        .first()
        .cloned()
        .expect("a cluster config must name at least one seed node")
}

fn group_by_node(pending: Vec<PendingItem>) -> Vec<(NodeSpec, Vec<PendingItem>)> {
    let mut groups: HashMap<NodeSpec, Vec<PendingItem>> = HashMap::new();
    for item in pending {
        groups.entry(item.target.clone()).or_default().push(item);
    }
    groups.into_iter().collect()
}

type GroupError = (NodeSpec, Vec<PendingItem>, Error);

async fn run_group<P: ConnectionPool>(
    pool: &P,
    state: &ClusterState,
    node: NodeSpec,
    items: Vec<PendingItem>,
    freezer: Option<&dyn Freezer>,
) -> std::result::Result<Vec<(usize, ItemOutcome)>, GroupError> {
    let mut wire = Vec::with_capacity(items.len() * 2);
    for item in &items {
        if item.asking {
            wire.push(Request::wire(
                vec![b"ASKING".to_vec()],
                ReplyParser::default(),
                None,
            ));
        }
        wire.push(item.request.clone());
    }

    let fut = executor::execute(pool, &node, &wire, freezer);
    let replies = match tokio::time::timeout(state.config.task_timeout, fut).await {
        Ok(Ok(replies)) => replies,
        Ok(Err(e)) => return Err((node, items, e)),
        Err(_) => return Err((node, items, Error::Timeout)),
    };

    let mut reply_iter = replies.into_iter();
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if item.asking {
            let _ = reply_iter.next();
        }
        let reply = reply_iter
            .next()
            .expect("one reply per dispatched wire request");
        out.push(resolve_item(item, reply, state));
    }
    Ok(out)
}

fn resolve_item(item: PendingItem, reply: Reply, state: &ClusterState) -> (usize, ItemOutcome) {
    let pos = item.request.pos;
    match &reply {
        Reply::Error(e) if e.is_moved() => match parse_redirect_target(&e.message, state.cluster_name()) {
            Some(target) => {
                if let Some(slot) = item.request.expected_keyslot {
                    state.cache.update(slot, target.clone());
                }
                log::debug!("MOVED -> {}:{}", target.host, target.port);
                (
                    pos,
                    ItemOutcome::Retry(PendingItem {
                        request: item.request,
                        target,
                        asking: false,
                    }),
                )
            }
            None => (pos, ItemOutcome::Done(reply)),
        },
        Reply::Error(e) if e.is_ask() => match parse_redirect_target(&e.message, state.cluster_name()) {
            Some(target) => {
                log::debug!("ASK -> {}:{}", target.host, target.port);
                (
                    pos,
                    ItemOutcome::Retry(PendingItem {
                        request: item.request,
                        target,
                        asking: true,
                    }),
                )
            }
            None => (pos, ItemOutcome::Done(reply)),
        },
        _ => (pos, ItemOutcome::Done(reply)),
    }
}

/// Parse `"MOVED 3999 127.0.0.1:6381"` / `"ASK 3999 127.0.0.1:6381"` into a
/// [`NodeSpec`], keeping the same `cluster` name as the rest of the topology.
fn parse_redirect_target(message: &str, cluster_name: Option<&str>) -> Option<NodeSpec> {
    let hostport = message.split_whitespace().nth(2)?;
    let (host, port) = hostport.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    let mut spec = NodeSpec::new(host, port);
    if let Some(name) = cluster_name {
        spec = spec.in_cluster(name);
    }
    Some(spec)
}

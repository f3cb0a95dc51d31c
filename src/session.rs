// SPDX-License-Identifier: Apache-2.0

//! The session: a dynamically-scoped request queue plus a stack of
//! "current parser" values (spec §4.3).
//!
//! The original design keeps this queue in an atomically-swapped cell so
//! that a `return` pushed during stashing can't race a flush. `Session` is
//! used exclusively through `&mut self`, so ordinary field mutation gives
//! the same guarantee without needing real atomics — the "swap" is just
//! `std::mem::take`, performed under the same exclusive borrow that would
//! otherwise serialize concurrent access anyway.

use std::future::Future;
use std::sync::Arc;

use crate::cluster::{self, ClusterState};
use crate::config::NodeSpec;
use crate::error::{Error, Result};
use crate::freeze::Freezer;
use crate::pool::ConnectionPool;
use crate::request::{coerce, ReplyParser, Request, RequestOptions};
use crate::value::Arg;
use crate::wire::reply::Reply;
use crate::executor;

/// What a session is bound to: one node, or one cluster.
#[derive(Clone)]
pub enum Target {
    Node(NodeSpec),
    Cluster(Arc<ClusterState>),
}

/// The result of a flush: a single reply when exactly one request was
/// issued and the caller didn't ask to keep pipeline shape, or the full
/// ordered vector otherwise (spec §4.3/§4.4's "unwrap a single reply").
#[derive(Debug, Clone)]
pub enum FlushResult {
    Single(Reply),
    Many(Vec<Reply>),
}

impl FlushResult {
    pub fn into_vec(self) -> Vec<Reply> {
        match self {
            FlushResult::Single(r) => vec![r],
            FlushResult::Many(rs) => rs,
        }
    }

    pub fn into_single(self) -> Option<Reply> {
        match self {
            FlushResult::Single(r) => Some(r),
            FlushResult::Many(mut rs) if rs.len() == 1 => rs.pop(),
            _ => None,
        }
    }
}

/// A bound session: one connection (or cluster) spec, a pending request
/// queue, and a stack of parser scopes (spec §3/§4.3).
pub struct Session<'p, P: ConnectionPool> {
    pool: &'p P,
    target: Target,
    freezer: Option<Arc<dyn Freezer>>,
    pending: Vec<Request>,
    parser_stack: Vec<ReplyParser>,
}

impl<'p, P: ConnectionPool> Session<'p, P> {
    fn new(pool: &'p P, target: Target, freezer: Option<Arc<dyn Freezer>>) -> Self {
        Self {
            pool,
            target,
            freezer,
            pending: Vec::new(),
            parser_stack: vec![ReplyParser::default()],
        }
    }

    fn current_parser(&self) -> ReplyParser {
        self.parser_stack
            .last()
            .cloned()
            .unwrap_or_default()
    }

    /// Run `parser` as the active parser for the duration of `within`,
    /// restoring whatever was active before on scope exit (spec §4.3).
    pub fn with_parser<F, R>(&mut self, parser: ReplyParser, within: F) -> R
    where
        F: FnOnce(&mut Self) -> R,
    {
        self.parser_stack.push(parser);
        let mut guard = ParserGuard { session: self };
        within(&mut *guard.session)
    }

    /// Queue one command call. `keyslot_of` is the byte string of the
    /// argument that should determine this request's keyslot under
    /// cluster dispatch (spec §4.5), or `None` for keyless commands.
    pub fn push(&mut self, args: Vec<Arg>, keyslot_of: Option<&[u8]>) -> Result<()> {
        let bytes = coerce(&args, self.freezer.as_deref())?;
        let keyslot = match &self.target {
            Target::Cluster(_) => keyslot_of.map(cluster::keyslot),
            Target::Node(_) => None,
        };
        let parser = self.current_parser();
        let mut req = Request::wire(bytes, parser, keyslot);
        req.pos = self.pending.len();
        self.pending.push(req);
        Ok(())
    }

    /// Run `within` with the active parser's `as_pipeline` option pinned to
    /// `pinned`, so a single command call issued inside it keeps (or loses)
    /// pipeline shape regardless of the enclosing scope's own shape. Merges
    /// with whatever parser function/options are already active, the same
    /// inner-wins composition `with_parser` itself uses.
    pub fn as_pipeline<F, R>(&mut self, pinned: bool, within: F) -> R
    where
        F: FnOnce(&mut Self) -> R,
    {
        let current = self.current_parser();
        let mut options = current.options.clone();
        options.as_pipeline = Some(pinned);
        let parser = current.with_options(options);
        self.with_parser(parser, within)
    }

    /// `return`: push a zero-argument placeholder resolving to `reply`
    /// without touching the wire (spec §4.3). The dummy reply is threaded
    /// through whatever parser is currently active, so a user parser
    /// scoped over this call still runs on it.
    pub fn return_value(&mut self, reply: Reply) {
        let mut req = Request::synthetic_with_parser(reply, self.current_parser());
        req.pos = self.pending.len();
        self.pending.push(req);
    }

    /// Restore a stashed `with_replies` reply as a `return`-placeholder
    /// with the null parser: it was already parsed once when its request
    /// was first flushed, so it must pass through untouched this time
    /// (spec §4.3's stash/restore dance).
    fn restore_stashed(&mut self, reply: Reply) {
        let mut req = Request::synthetic(reply);
        req.pos = self.pending.len();
        self.pending.push(req);
    }

    async fn flush_requests(&mut self, requests: Vec<Request>, as_pipeline: bool) -> Result<FlushResult> {
        if requests.is_empty() {
            return Ok(FlushResult::Many(Vec::new()));
        }
        // A single request's own `as_pipeline` option, if it set one,
        // overrides the scope's shape for that one call (spec §4.4: "unless
        // the caller asked to unwrap a single reply" is a property of the
        // call, not just the enclosing scope).
        let effective_as_pipeline = if requests.len() == 1 {
            requests[0].parser.options.as_pipeline.unwrap_or(as_pipeline)
        } else {
            as_pipeline
        };
        let single = requests.len() == 1 && !effective_as_pipeline;
        let replies = match &self.target {
            Target::Node(spec) => {
                executor::execute(self.pool, spec, &requests, self.freezer.as_deref()).await?
            }
            Target::Cluster(state) => {
                cluster::dispatch(self.pool, state, requests, self.freezer.as_deref()).await?
            }
        };
        if single {
            let reply = replies.into_iter().next().expect("single-reply flush");
            if let Reply::Error(e) = reply {
                return Err(Error::Server(e));
            }
            Ok(FlushResult::Single(reply))
        } else {
            Ok(FlushResult::Many(replies))
        }
    }

    /// Stash the currently pending queue, run `body`, flush whatever it
    /// queued and return those replies, then restore the stashed requests
    /// as `return`-placeholders so the enclosing scope still observes them
    /// in order (spec §4.3's `with-replies`).
    pub async fn with_replies<F, Fut>(&mut self, as_pipeline: bool, body: F) -> Result<FlushResult>
    where
        F: FnOnce(&mut Self) -> Fut,
        Fut: Future<Output = ()>,
    {
        let stashed = std::mem::take(&mut self.pending);
        let stashed_replies = self.flush_requests(stashed, true).await?.into_vec();

        body(self).await;

        let nested = std::mem::take(&mut self.pending);
        let result = self.flush_requests(nested, as_pipeline).await;

        for reply in stashed_replies {
            self.restore_stashed(reply);
        }

        result
    }

    /// `with-replies` with pipeline semantics and no result-unwrapping:
    /// run N commands, always get N replies back.
    pub async fn pipe<F, Fut>(&mut self, body: F) -> Result<Vec<Reply>>
    where
        F: FnOnce(&mut Self) -> Fut,
        Fut: Future<Output = ()>,
    {
        Ok(self.with_replies(true, body).await?.into_vec())
    }

    /// Flush whatever is currently queued right now, outside of any
    /// `with_replies` stash/restore dance. Used by multi-round-trip
    /// protocols (the tundra coordinator's `ensure_ks`) that need a reply
    /// before deciding what to queue next.
    pub async fn flush(&mut self, as_pipeline: bool) -> Result<FlushResult> {
        let pending = std::mem::take(&mut self.pending);
        self.flush_requests(pending, as_pipeline).await
    }
}

struct ParserGuard<'a, 'p, P: ConnectionPool> {
    session: &'a mut Session<'p, P>,
}

impl<'a, 'p, P: ConnectionPool> Drop for ParserGuard<'a, 'p, P> {
    fn drop(&mut self) {
        self.session.parser_stack.pop();
    }
}

/// `with-connection`: open a fresh session bound to `target`, run `body`,
/// flush anything still queued, and return the result (spec §4.3).
pub async fn with_connection<P, F, Fut>(
    pool: &P,
    target: Target,
    freezer: Option<Arc<dyn Freezer>>,
    as_pipeline: bool,
    body: F,
) -> Result<FlushResult>
where
    P: ConnectionPool,
    F: FnOnce(&mut Session<'_, P>) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut session = Session::new(pool, target, freezer);
    body(&mut session).await;
    let pending = std::mem::take(&mut session.pending);
    session.flush_requests(pending, as_pipeline).await
}

/// Default wire-framing options for a request (no raw-bulk, no legacy
/// thaw compatibility, pipeline-shape inherited from the enclosing scope).
pub fn default_options() -> RequestOptions {
    RequestOptions::default()
}

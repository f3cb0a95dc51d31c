// SPDX-License-Identifier: Apache-2.0

//! Requests: the unit of work a [`crate::session::Session`] queues.
//!
//! A request is either a *wire* request (a bytestring-req: the already
//! coerced argument list that will be written to the network) or a
//! *synthetic* request (spec §4.3's `return` primitive): a zero-argument
//! placeholder that consumes no wire bytes and resolves to a reply supplied
//! up front, used to splice stashed replies back into an outer scope.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::freeze::{Freezer, ThawOptions};
use crate::value::Arg;
use crate::wire::reply::Reply;

/// The body of a request: either bytes destined for the wire, or a
/// synthetic placeholder that never touches the wire.
#[derive(Debug, Clone)]
pub enum Body {
    /// One coerced argument per wire bulk string (the "bytestring-req").
    Wire(Vec<Vec<u8>>),
    /// `return`: produces `dummy_reply` without sending anything.
    Synthetic,
}

/// A pure function applied to a reply before it's handed back to the
/// caller, bundled with the request options active when it was captured
/// (spec §4.3's "current parser" is a value, not just a function).
#[derive(Clone, Default)]
pub struct ReplyParser {
    pub options: RequestOptions,
    func: Option<Arc<dyn Fn(Reply) -> Reply + Send + Sync>>,
}

impl ReplyParser {
    pub fn new(options: RequestOptions) -> Self {
        Self {
            options,
            func: None,
        }
    }

    pub fn with_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(Reply) -> Reply + Send + Sync + 'static,
    {
        self.func = Some(Arc::new(f));
        self
    }

    /// Replace the options while keeping whatever transform function was
    /// already attached, for scopes that only want to override a single
    /// option (e.g. [`crate::session::Session::as_pipeline`]) without
    /// dropping the currently active parser function.
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// Compose `self` as the outer transform around `inner`: `inner` runs
    /// first, then `self`'s function, matching spec §4.3's "explicit
    /// opt-in composition operator, not an implicit chain".
    pub fn compose(self, inner: ReplyParser) -> Self {
        let outer_fn = self.func.clone();
        let inner_fn = inner.func.clone();
        let func: Option<Arc<dyn Fn(Reply) -> Reply + Send + Sync>> = match (outer_fn, inner_fn) {
            (Some(o), Some(i)) => Some(Arc::new(move |r| o(i(r)))),
            (Some(o), None) => Some(o),
            (None, Some(i)) => Some(i),
            (None, None) => None,
        };
        Self {
            options: self.options,
            func,
        }
    }

    /// Apply the parser function, unless `reply` is a server error and
    /// `parse_exceptions` isn't set — in which case the error passes
    /// through untouched (spec §3: a parser "runs on errors only if
    /// `parse_exceptions?` is set").
    pub fn apply(&self, reply: Reply) -> Reply {
        if matches!(reply, Reply::Error(_)) && !self.options.parse_exceptions {
            return reply;
        }
        match &self.func {
            Some(f) => f(reply),
            None => reply,
        }
    }
}

impl std::fmt::Debug for ReplyParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyParser")
            .field("options", &self.options)
            .field("has_fn", &self.func.is_some())
            .finish()
    }
}

/// Per-request options (spec §3's "itself bearing metadata acting as
/// request options").
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Bypass the in-bulk marker convention entirely; return bulk payloads
    /// as raw bytes regardless of what they start with.
    pub raw_bulk: bool,
    pub thaw_options: ThawOptions,
    /// Opt this one call out of (or into) `with_replies`' single-reply
    /// unwrap behaviour, independent of the enclosing scope.
    pub as_pipeline: Option<bool>,
    /// Run the parser function even when the reply is a server error (spec
    /// §3: "if true, the parser is invoked even when the reply is an
    /// error"). A request's parser otherwise never sees `Reply::Error`.
    pub parse_exceptions: bool,
}

/// One queued unit of work.
#[derive(Debug, Clone)]
pub struct Request {
    pub body: Body,
    pub parser: ReplyParser,
    /// Precomputed CRC16 keyslot, if this request carries a key and the
    /// session is cluster-bound (spec §4.5).
    pub expected_keyslot: Option<u16>,
    /// Position in the originating batch; used to reassemble cluster
    /// dispatch results in caller order (spec §4.5).
    pub pos: usize,
}

impl Request {
    /// A `return`-placeholder whose parser is the null parser: the dummy
    /// reply surfaces completely untouched. Used internally to restore
    /// stashed `with_replies` replies, which were already parsed once and
    /// must not be parsed again (spec §4.3's stash/restore dance; see
    /// [`crate::session::Session`]).
    pub fn synthetic(dummy_reply: Reply) -> Self {
        let parser = ReplyParser::default().with_fn(move |_| dummy_reply.clone());
        Self {
            body: Body::Synthetic,
            parser,
            expected_keyslot: None,
            pos: 0,
        }
    }

    /// A `return`-placeholder whose dummy reply is threaded through
    /// `active_parser` before it surfaces, so a user parser scoped over the
    /// call site still runs on it (spec §4.3: "threaded through the
    /// currently active parser so user parsers still run on it"). This is
    /// the primitive `Session::return_value` exposes publicly.
    pub fn synthetic_with_parser(dummy_reply: Reply, active_parser: ReplyParser) -> Self {
        let producer = ReplyParser::default().with_fn(move |_| dummy_reply.clone());
        Self {
            body: Body::Synthetic,
            parser: active_parser.compose(producer),
            expected_keyslot: None,
            pos: 0,
        }
    }

    pub fn wire(args: Vec<Vec<u8>>, parser: ReplyParser, expected_keyslot: Option<u16>) -> Self {
        Self {
            body: Body::Wire(args),
            parser,
            expected_keyslot,
            pos: 0,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self.body, Body::Synthetic)
    }
}

/// Coerce application-level arguments into the bytestring-req form (spec
/// §4.1). `freezer` is required only when an `Arg::Object` is present.
pub fn coerce(args: &[Arg], freezer: Option<&dyn Freezer>) -> Result<Vec<Vec<u8>>> {
    args.iter().map(|a| coerce_one(a, freezer)).collect()
}

fn coerce_one(arg: &Arg, freezer: Option<&dyn Freezer>) -> Result<Vec<u8>> {
    match arg {
        Arg::Text(s) => {
            let bytes = s.as_bytes().to_vec();
            reject_leading_nul(&bytes)?;
            Ok(bytes)
        }
        Arg::Int(n) => {
            let bytes = n.to_string().into_bytes();
            reject_leading_nul(&bytes)?;
            Ok(bytes)
        }
        Arg::Float(n) => {
            let bytes = format_float(*n).into_bytes();
            reject_leading_nul(&bytes)?;
            Ok(bytes)
        }
        Arg::Verbatim(bytes) => {
            reject_leading_nul(bytes)?;
            Ok(bytes.clone())
        }
        Arg::Binary(bytes) => {
            reject_leading_nul(bytes)?;
            let mut out = Vec::with_capacity(bytes.len() + 2);
            out.extend_from_slice(crate::wire::BINARY_MARKER);
            out.extend_from_slice(bytes);
            Ok(out)
        }
        Arg::Object(value) => {
            let freezer = freezer.ok_or_else(|| {
                Error::Coerce("object argument given but no freezer is configured".into())
            })?;
            let frozen = freezer.freeze(value).map_err(|e| Error::Freeze(e.to_string()))?;
            let mut out = Vec::with_capacity(frozen.len() + 2);
            out.extend_from_slice(crate::wire::OBJECT_MARKER);
            out.extend_from_slice(&frozen);
            Ok(out)
        }
    }
}

fn reject_leading_nul(bytes: &[u8]) -> Result<()> {
    if bytes.first() == Some(&0u8) {
        return Err(Error::Coerce(
            "Args can't begin with null terminator".into(),
        ));
    }
    Ok(())
}

fn format_float(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_and_numbers_coerce_verbatim() {
        assert_eq!(coerce_one(&Arg::Text("hi".into()), None).unwrap(), b"hi");
        assert_eq!(coerce_one(&Arg::Int(42), None).unwrap(), b"42");
        assert_eq!(coerce_one(&Arg::Float(1.5), None).unwrap(), b"1.5");
    }

    #[test]
    fn binary_gets_raw_marker_prefix() {
        let out = coerce_one(&Arg::Binary(vec![1, 2, 3]), None).unwrap();
        assert_eq!(out, vec![0x00, b'<', 1, 2, 3]);
    }

    #[test]
    fn leading_nul_in_binary_is_rejected() {
        let err = coerce_one(&Arg::Binary(vec![0x00, 0xff]), None).unwrap_err();
        assert!(matches!(err, Error::Coerce(_)));
    }

    #[test]
    fn leading_nul_in_verbatim_is_rejected() {
        let err = coerce_one(&Arg::Verbatim(vec![0x00, 0x01]), None).unwrap_err();
        assert!(matches!(err, Error::Coerce(_)));
    }

    #[test]
    fn object_without_freezer_fails() {
        let err = coerce_one(&Arg::Object(crate::value::Value::Null), None).unwrap_err();
        assert!(matches!(err, Error::Coerce(_)));
    }

    fn err_reply() -> Reply {
        Reply::Error(crate::error::ServerError::parse("WRONGTYPE oops"))
    }

    #[test]
    fn parser_does_not_see_errors_by_default() {
        let parser = ReplyParser::default().with_fn(|_| Reply::Simple("rewritten".into()));
        assert_eq!(parser.apply(err_reply()), err_reply());
    }

    #[test]
    fn parse_exceptions_opts_the_parser_into_seeing_errors() {
        let mut options = RequestOptions::default();
        options.parse_exceptions = true;
        let parser = ReplyParser::new(options).with_fn(|_| Reply::Simple("rewritten".into()));
        assert_eq!(parser.apply(err_reply()), Reply::Simple("rewritten".into()));
    }

    #[test]
    fn non_error_replies_always_reach_the_parser() {
        let parser = ReplyParser::default().with_fn(|_| Reply::Simple("rewritten".into()));
        assert_eq!(parser.apply(Reply::Int(1)), Reply::Simple("rewritten".into()));
    }
}

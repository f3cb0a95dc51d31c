// SPDX-License-Identifier: Apache-2.0

//! A deliberately trivial command-argument table.
//!
//! Spec treats "command-argument builders" as an out-of-scope collaborator
//! (callers are expected to bring their own, generated or hand-written);
//! this module exists only so the crate's own tests and doctests have
//! something to call without depending on a real server's command set.
//! Keep it small — anything more than the handful of commands exercised by
//! the tundra coordinator and the testable scenarios in spec §8 belongs in
//! a caller's own command layer, not here.

use crate::value::Arg;

pub fn ping() -> Vec<Arg> {
    vec![Arg::from("PING")]
}

pub fn get(key: impl Into<Vec<u8>>) -> Vec<Arg> {
    vec![Arg::from("GET"), Arg::Binary(key.into())]
}

pub fn set(key: impl Into<Vec<u8>>, value: Arg) -> Vec<Arg> {
    vec![Arg::from("SET"), Arg::Binary(key.into()), value]
}

pub fn incr(key: impl Into<Vec<u8>>) -> Vec<Arg> {
    vec![Arg::from("INCR"), Arg::Binary(key.into())]
}

pub fn del(keys: &[&[u8]]) -> Vec<Arg> {
    let mut args = vec![Arg::from("DEL")];
    args.extend(keys.iter().map(|k| Arg::Binary(k.to_vec())));
    args
}

pub fn exists(keys: &[&[u8]]) -> Vec<Arg> {
    let mut args = vec![Arg::from("EXISTS")];
    args.extend(keys.iter().map(|k| Arg::Binary(k.to_vec())));
    args
}

pub fn pexpire(key: impl Into<Vec<u8>>, millis: i64) -> Vec<Arg> {
    vec![
        Arg::from("PEXPIRE"),
        Arg::Binary(key.into()),
        Arg::Int(millis),
    ]
}

pub fn dump(key: impl Into<Vec<u8>>) -> Vec<Arg> {
    vec![Arg::from("DUMP"), Arg::Binary(key.into())]
}

pub fn restore(key: impl Into<Vec<u8>>, ttl_millis: i64, serialized: Vec<u8>) -> Vec<Arg> {
    vec![
        Arg::from("RESTORE"),
        Arg::Binary(key.into()),
        Arg::Int(ttl_millis),
        Arg::Verbatim(serialized),
    ]
}

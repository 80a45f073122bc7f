#![deny(missing_docs)]
#![deny(clippy::all)]
//! Primary/backup replicated key/value store.
//!
//! Two replicas serve a string map under roles assigned by the view
//! service. Clients talk to the primary; the primary pushes every write to
//! the backup and only then applies and answers. A freshly inducted backup
//! receives the whole map through the same write path. Duplicate
//! deliveries, retried forwards and client retries are folded into a
//! single application per operation by a fingerprint table.

use serde::{Deserialize, Serialize};

/// Outcome of a KV operation as carried on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// The operation took effect (or was a folded duplicate).
    Ok,
    /// Get on a key that has never been written.
    NoKey,
    /// The receiving server is not the current primary.
    WrongServer,
}

/// Reply to `get`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GetReply {
    /// `Ok`, `NoKey` or `WrongServer`.
    pub status: Status,
    /// The stored value; empty unless `status` is `Ok`. An empty string is
    /// a legal stored value, distinct from an absent key.
    pub value: String,
}

/// Reply to `put`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PutReply {
    /// `Ok` for applied writes and folded duplicates.
    pub status: Status,
    /// Value the key held immediately before this operation took effect.
    pub previous: String,
}

labrpc::service! {
    service kv_svc {
        fn get(key: String) -> GetReply;
        fn put(key: String, value: String, do_hash: bool, commit: bool, cmd_id: u64) -> PutReply;
    }
}

pub use kv_svc::{Client as KvClient, Server as KvServer, Service as KvService};

/// 32-bit FNV-1a over `previous` followed by `value`.
///
/// Primary and backup must compute this bit for bit; a hashed put stores
/// the decimal rendering of the result.
pub fn chain_hash(previous: &str, value: &str) -> u32 {
    let mut h: u32 = 0x811c_9dc5;
    for b in previous.bytes().chain(value.bytes()) {
        h ^= u32::from(b);
        h = h.wrapping_mul(0x0100_0193);
    }
    h
}

/// KV client with retries.
pub mod client;
mod server;


pub use client::Client;
pub use server::Replica;

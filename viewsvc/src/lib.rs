#![deny(missing_docs)]
#![deny(clippy::all)]
//! Single-node view service.
//!
//! Participants ping periodically; the service tracks their liveness and
//! publishes a monotonically numbered sequence of views, each naming a
//! primary and (possibly) a backup. A new view is only formed once the
//! primary of the current one has pinged with the current view number, so
//! the roles can never split between two servers that both believe they
//! lead.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cadence at which participants ping the service. Also the backoff used
/// by replicas when retrying forwards.
pub const PING_INTERVAL: Duration = Duration::from_millis(100);

/// A participant is dead once no ping has arrived for
/// `PING_INTERVAL * DEAD_PINGS`.
pub const DEAD_PINGS: u32 = 5;

/// One role assignment. `viewnum = 0` is the bootstrap view with no
/// primary; an empty `backup` means the slot is vacant.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    /// Number of this view; bumps exactly when the role pair changes.
    pub viewnum: u64,
    /// Name of the primary, or empty before the first ping.
    pub primary: String,
    /// Name of the backup, or empty while the slot is vacant.
    pub backup: String,
}

labrpc::service! {
    service view_svc {
        fn ping(me: String, viewnum: u64) -> View;
        fn get() -> View;
    }
}

pub use view_svc::{Client as ViewClient, Server as ViewServer, Service as ViewService};

mod client;
mod server;


pub use client::Client;
pub use server::ViewTracker;

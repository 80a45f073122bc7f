use std::collections::HashMap;
use std::time::Instant;

use labrpc::anyhow::Result;
use labrpc::log::info;

use crate::{View, ViewService, DEAD_PINGS, PING_INTERVAL};

/// The election state machine behind the RPC surface.
///
/// All transitions happen inside `ping`; `get` is read-only. The server
/// loop dispatches one request at a time, which serializes every handler.
pub struct ViewTracker {
    view: View,
    acked: bool,
    last_ping: HashMap<String, Instant>,
    seen_first: bool,
}

impl ViewTracker {
    /// Start from the bootstrap view `(0, "", "")`.
    pub fn new() -> Self {
        Self {
            view: View::default(),
            acked: false,
            last_ping: HashMap::new(),
            seen_first: false,
        }
    }

    fn is_dead(&self, id: &str) -> bool {
        if id.is_empty() {
            return false;
        }
        match self.last_ping.get(id) {
            Some(t) => t.elapsed() > PING_INTERVAL * DEAD_PINGS,
            None => false,
        }
    }
}

impl Default for ViewTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[labrpc::async_trait]
impl ViewService for ViewTracker {
    async fn ping(&mut self, me: String, viewnum: u64) -> Result<View> {
        let before = self.view.clone();
        self.last_ping.insert(me.clone(), Instant::now());

        if !self.seen_first {
            // The very first participant seeds the service as primary.
            self.view.primary = me.clone();
            self.seen_first = true;
        } else {
            if me == self.view.primary && viewnum == self.view.viewnum {
                self.acked = true;
            }
            // Until the primary has seen the current view, no new view may
            // be formed.
            if self.acked {
                // A ping with viewnum 0 from a server holding a role means
                // it restarted and lost its state; same as death.
                if self.is_dead(&self.view.primary)
                    || (me == self.view.primary && viewnum == 0)
                {
                    self.view.primary.clear();
                }
                if self.is_dead(&self.view.backup) || (me == self.view.backup && viewnum == 0) {
                    self.view.backup.clear();
                }
                // With both slots empty there is nobody left to promote;
                // the service is stuck until rebooted.
                if !self.view.primary.is_empty() || !self.view.backup.is_empty() {
                    if self.view.primary.is_empty() {
                        self.view.primary = std::mem::take(&mut self.view.backup);
                    }
                    if self.view.backup.is_empty() && me != self.view.primary {
                        self.view.backup = me.clone();
                    }
                }
            }
        }

        if before.primary != self.view.primary || before.backup != self.view.backup {
            self.view.viewnum += 1;
            self.acked = false;
            info!(
                "view {}: primary={:?} backup={:?}",
                self.view.viewnum, self.view.primary, self.view.backup
            );
        }
        Ok(self.view.clone())
    }

    async fn get(&mut self) -> Result<View> {
        Ok(self.view.clone())
    }
}

use labrpc::anyhow::Result;

use crate::{View, ViewClient};

/// Handle a participant (or an observer) uses to talk to the view service.
pub struct Client {
    me: String,
    vs: ViewClient,
}

impl Client {
    /// `me` is the name this client pings under.
    pub fn new(me: String, vs: ViewClient) -> Self {
        Self { me, vs }
    }

    /// Report liveness along with the last view number seen; the reply is
    /// the current view.
    pub async fn ping(&self, viewnum: u64) -> Result<View> {
        self.vs.ping(self.me.clone(), viewnum).await
    }

    /// Fetch the current view without side effects.
    pub async fn get(&self) -> Result<View> {
        self.vs.get().await
    }

    /// Current primary, or empty if the lookup failed.
    pub async fn primary(&self) -> String {
        self.get().await.map(|v| v.primary).unwrap_or_default()
    }

    /// Current backup, or empty if the lookup failed.
    pub async fn backup(&self) -> String {
        self.get().await.map(|v| v.backup).unwrap_or_default()
    }
}

use labrpc::{
    client::Client as _,
    network::Envelope,
    tokio::{sync::mpsc::Sender, time},
};
use viewsvc::{ViewClient, PING_INTERVAL};

use crate::{KvClient, Status};

/// Client for the replicated store.
///
/// Every operation looks the primary up in the view service and retries
/// with `PING_INTERVAL` backoff until a definitive reply arrives, so a
/// failover in the middle of a call is invisible to the caller. Each
/// logical put carries one `cmd_id` across all of its retries; the servers
/// fold the retries into a single application.
pub struct Client {
    vs: viewsvc::Client,
    net: Sender<Envelope>,
    tag: u32,
    seq: u32,
}

impl Client {
    /// New client talking to the view service at `vs_id`.
    pub fn new(vs_id: String, net: Sender<Envelope>) -> Self {
        let tag: u32 = rand::random();
        let vs = viewsvc::Client::new(
            format!("client-{}", tag),
            ViewClient::from_server(vs_id, net.clone()),
        );
        Self {
            vs,
            net,
            tag,
            seq: 0,
        }
    }

    fn next_cmd_id(&mut self) -> u64 {
        self.seq = self.seq.wrapping_add(1);
        (u64::from(self.tag) << 32) | u64::from(self.seq)
    }

    fn dial(&self, id: String) -> KvClient {
        KvClient::from_server(id, self.net.clone())
    }

    /// Fetch `key` from the primary; `None` if it has never been written.
    pub async fn get(&self, key: &str) -> Option<String> {
        loop {
            let primary = self.vs.primary().await;
            if !primary.is_empty() {
                if let Ok(reply) = self.dial(primary).get(key.to_string()).await {
                    match reply.status {
                        Status::Ok => return Some(reply.value),
                        Status::NoKey => return None,
                        // Stale view; look the primary up again.
                        Status::WrongServer => {}
                    }
                }
            }
            time::sleep(PING_INTERVAL).await;
        }
    }

    async fn put_ext(&mut self, key: &str, value: &str, do_hash: bool) -> String {
        let cmd_id = self.next_cmd_id();
        loop {
            let primary = self.vs.primary().await;
            if !primary.is_empty() {
                if let Ok(reply) = self
                    .dial(primary)
                    .put(key.to_string(), value.to_string(), do_hash, true, cmd_id)
                    .await
                {
                    if reply.status == Status::Ok {
                        return reply.previous;
                    }
                }
            }
            time::sleep(PING_INTERVAL).await;
        }
    }

    /// Store `value` under `key`.
    pub async fn put(&mut self, key: &str, value: &str) {
        self.put_ext(key, value, false).await;
    }

    /// Replace `key` with the chain hash of its previous value and
    /// `value`; returns the previous value.
    pub async fn put_hash(&mut self, key: &str, value: &str) -> String {
        self.put_ext(key, value, true).await
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use labrpc::{
    anyhow::Result,
    client::Client as _,
    log::info,
    network::Envelope,
    tokio::{self, sync::mpsc::Sender, sync::Mutex, task::JoinHandle, time},
};
use viewsvc::{View, ViewClient, PING_INTERVAL};

use crate::{chain_hash, GetReply, KvClient, KvService, PutReply, Status};

/// A replica server: the RPC service plus a periodic ticker.
///
/// One coarse lock guards the map, the fingerprint table and the cached
/// view. Handlers and the ticker take it on entry and keep it across every
/// await inside, including the forward to the backup; a get can therefore
/// never observe a write the backup does not already hold.
#[derive(Clone)]
pub struct Replica {
    state: Arc<Mutex<State>>,
}

/// What identifies one client-originated put for at-most-once execution.
/// `cmd_id` is minted by the caller and reused verbatim on its retries.
#[derive(Clone, Hash, PartialEq, Eq)]
struct Fingerprint {
    key: String,
    value: String,
    do_hash: bool,
    cmd_id: u64,
}

struct State {
    me: String,
    vs: viewsvc::Client,
    net: Sender<Envelope>,
    view: View,
    store: HashMap<String, String>,
    // fingerprint -> the `previous` captured when it first applied
    applied: HashMap<Fingerprint, String>,
    xfer_tag: u32,
    xfer_seq: u32,
}

impl Replica {
    /// New replica named `me`, pinging the view service at `vs_id`. The
    /// server loop and the ticker still have to be spawned.
    pub fn new(me: String, vs_id: String, net: Sender<Envelope>) -> Self {
        let vs = viewsvc::Client::new(me.clone(), ViewClient::from_server(vs_id, net.clone()));
        Self {
            state: Arc::new(Mutex::new(State {
                me,
                vs,
                net,
                view: View::default(),
                store: HashMap::new(),
                applied: HashMap::new(),
                xfer_tag: rand::random(),
                xfer_seq: 0,
            })),
        }
    }

    /// Spawn the tick loop: ping the view service once per `PING_INTERVAL`
    /// and push the whole map to a backup that just appeared.
    pub fn spawn_ticker(&self) -> JoinHandle<()> {
        let state = self.state.clone();
        tokio::spawn(async move {
            loop {
                state.lock().await.tick().await;
                time::sleep(PING_INTERVAL).await;
            }
        })
    }
}

#[labrpc::async_trait]
impl KvService for Replica {
    async fn get(&mut self, key: String) -> Result<GetReply> {
        let state = self.state.lock().await;
        // Check the role against the live view, not the cached one; the
        // cache may predate a failover.
        if state.vs.primary().await != state.me {
            return Ok(GetReply {
                status: Status::WrongServer,
                value: String::new(),
            });
        }
        Ok(match state.store.get(&key) {
            Some(v) => GetReply {
                status: Status::Ok,
                value: v.clone(),
            },
            None => GetReply {
                status: Status::NoKey,
                value: String::new(),
            },
        })
    }

    async fn put(
        &mut self,
        key: String,
        value: String,
        do_hash: bool,
        commit: bool,
        cmd_id: u64,
    ) -> Result<PutReply> {
        let mut state = self.state.lock().await;
        Ok(state.put(key, value, do_hash, commit, cmd_id).await)
    }
}

impl State {
    async fn put(
        &mut self,
        key: String,
        value: String,
        do_hash: bool,
        commit: bool,
        cmd_id: u64,
    ) -> PutReply {
        let previous = self.store.get(&key).cloned().unwrap_or_default();

        let fp = Fingerprint {
            key: key.clone(),
            value: value.clone(),
            do_hash,
            cmd_id,
        };
        // At-most-once: a redelivery answers with what the first delivery
        // saw and touches nothing.
        if let Some(first) = self.applied.get(&fp) {
            return PutReply {
                status: Status::Ok,
                previous: first.clone(),
            };
        }
        self.applied.insert(fp, previous.clone());

        // The backup must hold the write before we apply it; a primary
        // crashing after its reply would otherwise lose an acknowledged
        // put. Forwarded writes always commit on the backup.
        if self.view.primary == self.me {
            self.forward(&key, &value, do_hash, cmd_id).await;
        }

        if commit {
            let stored = if do_hash {
                chain_hash(&previous, &value).to_string()
            } else {
                value
            };
            self.store.insert(key, stored);
        }

        PutReply {
            status: Status::Ok,
            previous,
        }
    }

    /// Push one write to the current backup, retrying with
    /// `PING_INTERVAL` backoff until the backup confirms. Ends as a no-op
    /// once the live view shows no backup, or this server demoted, or this
    /// server itself in the backup slot.
    async fn forward(&self, key: &str, value: &str, do_hash: bool, cmd_id: u64) {
        loop {
            let view = match self.vs.get().await {
                Ok(v) => v,
                Err(_) => {
                    time::sleep(PING_INTERVAL).await;
                    continue;
                }
            };
            if view.primary != self.me || view.backup.is_empty() || view.backup == self.me {
                return;
            }
            let backup = KvClient::from_server(view.backup.clone(), self.net.clone());
            match backup
                .put(key.to_string(), value.to_string(), do_hash, true, cmd_id)
                .await
            {
                Ok(reply) if reply.status == Status::Ok => return,
                _ => time::sleep(PING_INTERVAL).await,
            }
        }
    }

    async fn tick(&mut self) {
        let old_backup = self.view.backup.clone();
        match self.vs.ping(self.view.viewnum).await {
            Ok(v) => self.view = v,
            Err(_) => return,
        }

        // A fresh backup starts blank: hand it the whole map now, before
        // any further write can slip past it. The lock is held throughout,
        // so the write handlers wait behind the transfer.
        if self.view.primary == self.me
            && self.view.backup != old_backup
            && !self.view.backup.is_empty()
        {
            info!(
                "{}: transferring {} keys to {}",
                self.me,
                self.store.len(),
                self.view.backup
            );
            let entries: Vec<(String, String)> = self
                .store
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            for (key, value) in entries {
                let cmd_id = self.next_xfer_id();
                self.forward(&key, &value, false, cmd_id).await;
            }
        }
    }

    fn next_xfer_id(&mut self) -> u64 {
        self.xfer_seq = self.xfer_seq.wrapping_add(1);
        (u64::from(self.xfer_tag) << 32) | u64::from(self.xfer_seq)
    }
}

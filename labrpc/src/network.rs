use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use futures::Future;
use log::{info, warn};
use tokio::sync::mpsc::{self, Receiver, Sender};

use crate::{client::Client, server::Server};

/// One request in flight: destination node, channel for the reply,
/// serialized request body.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub dest: String,
    pub reply: Sender<String>,
    pub body: String,
}

/// Probabilities of the network misbehaving, sampled per envelope.
///
/// `drop_rate` loses the request before it reaches the node, `reply_drop_rate`
/// delivers the request but loses the reply, `dup_rate` delivers the request
/// twice. All zero by default.
#[derive(Debug, Clone, Copy, Default)]
pub struct Faults {
    pub drop_rate: f32,
    pub reply_drop_rate: f32,
    pub dup_rate: f32,
}

/// Routes envelopes between registered nodes.
pub struct Network {
    pub tx: Sender<Envelope>,
    rx: Receiver<Envelope>,
    pub nodes: Arc<Mutex<HashMap<String, Sender<Envelope>>>>,
    pub faults: Arc<Mutex<Faults>>,
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl Network {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(100);
        Self {
            tx,
            rx,
            nodes: Arc::new(Mutex::new(HashMap::default())),
            faults: Arc::new(Mutex::new(Faults::default())),
        }
    }

    /// Register a node under `id`. The returned future is the server loop;
    /// the service is rebuilt from `f` whenever a handler fails, which
    /// models a crash-restart with fresh state.
    pub fn register_service<S, C, F, V>(&self, id: String, f: F) -> (C, impl Future<Output = ()>)
    where
        F: Fn() -> V,
        S: Server<Service = V> + Send + 'static,
        C: Client,
    {
        let client = C::from_server(id.clone(), self.tx.clone());
        let nodes = self.nodes.clone();
        (client, async move {
            loop {
                let mut server = S::from_service(f());
                nodes.lock().unwrap().insert(id.clone(), server.inbox());
                if server.run().await.is_ok() {
                    break;
                }
                info!("node {} restarted", id);
            }
        })
    }

    pub async fn run(&mut self) {
        loop {
            let mut env = self
                .rx
                .recv()
                .await
                .expect("sender cannot be dropped by itself");

            let faults = *self.faults.lock().unwrap();
            let drop_req = rand::random::<f32>() < faults.drop_rate;
            let drop_reply = rand::random::<f32>() < faults.reply_drop_rate;
            let duplicate = rand::random::<f32>() < faults.dup_rate;

            if drop_req {
                warn!("request to {} dropped", env.dest);
                continue;
            }
            if drop_reply {
                // Deliver the request, lose the reply: the receiver end is
                // gone before the node answers.
                let (tx, _) = mpsc::channel(1);
                env.reply = tx;
            }

            let node = {
                let nodes = self.nodes.lock().unwrap();
                nodes.get(&env.dest).cloned()
            };
            match node {
                Some(inbox) => {
                    if duplicate {
                        warn!("request to {} duplicated", env.dest);
                        if inbox.send(env.clone()).await.is_err() {
                            warn!("send to node failed, dropped");
                        }
                    }
                    if inbox.send(env).await.is_err() {
                        warn!("send to node failed, dropped");
                    }
                }
                None => warn!("node {} not found", env.dest),
            }
        }
    }
}

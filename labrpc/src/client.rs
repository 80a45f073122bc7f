use tokio::sync::mpsc::Sender;

use crate::network::Envelope;

pub trait Client {
    fn from_server(server_id: String, net_tx: Sender<Envelope>) -> Self;
}

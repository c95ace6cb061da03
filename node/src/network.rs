use std::sync::{Arc, RwLock};

use fnv::FnvHashMap;
use types::Replica;
use tokio::sync::mpsc::Sender;

/// In-process message bus. Every node owns one bounded inbox; unicast and
/// broadcast resolve against the shared peer registry. Sends run on their
/// own task so a full inbox never blocks the sending handler.
pub struct Network<M> {
    peers: Arc<RwLock<FnvHashMap<Replica, Sender<M>>>>,
}

impl<M> Clone for Network<M> {
    fn clone(&self) -> Network<M> {
        Network {
            peers: self.peers.clone(),
        }
    }
}

impl<M: Clone + Send + 'static> Network<M> {
    pub fn new() -> Network<M> {
        Network {
            peers: Arc::new(RwLock::new(FnvHashMap::default())),
        }
    }

    pub fn register(&self, id: Replica, inbox: Sender<M>) {
        let mut peers = self.peers.write().expect("peer registry lock poisoned");
        peers.insert(id, inbox);
    }

    pub fn send(&self, to: Replica, msg: M) {
        let inbox = {
            let peers = self.peers.read().expect("peer registry lock poisoned");
            peers.get(&to).cloned()
        };
        match inbox {
            Some(inbox) => {
                tokio::spawn(async move {
                    if inbox.send(msg).await.is_err() {
                        log::debug!(target: "network", "peer {} stopped, message dropped", to);
                    }
                });
            }
            None => log::warn!(target: "network", "no peer registered under id {}", to),
        }
    }

    pub fn broadcast(&self, msg: M) {
        let inboxes: Vec<(Replica, Sender<M>)> = {
            let peers = self.peers.read().expect("peer registry lock poisoned");
            peers.iter().map(|(id, tx)| (*id, tx.clone())).collect()
        };
        for (id, inbox) in inboxes {
            let msg = msg.clone();
            tokio::spawn(async move {
                if inbox.send(msg).await.is_err() {
                    log::debug!(target: "network", "peer {} stopped, broadcast dropped", id);
                }
            });
        }
    }
}

impl<M: Clone + Send + 'static> Default for Network<M> {
    fn default() -> Network<M> {
        Network::new()
    }
}

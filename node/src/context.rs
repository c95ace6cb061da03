use std::sync::Arc;

use aba::{ABAMsg, ABA};
use anyhow::{anyhow, Result};
use types::{Certification, Effects, Replica};
use tokio::sync::{
    mpsc::{channel, Receiver, UnboundedReceiver, UnboundedSender},
    oneshot,
};

use crate::network::Network;

const INBOX_CAPACITY: usize = 10_000;

/// One node's service task: a single cooperative loop draining the inbox
/// and running the ABA engine. All effects of one message are flushed
/// before the next message is taken, so there is no suspension point
/// inside a handler.
pub struct Context {
    myid: Replica,
    net: Network<ABAMsg>,
    inbox: Receiver<ABAMsg>,
    decision_out: UnboundedSender<(Replica, u8)>,
    exit_rx: oneshot::Receiver<()>,
    aba: ABA,
}

impl Context {
    /// Spawns the node's task. The caller has already registered `inbox`'s
    /// sending half with the bus, so no broadcast can be missed regardless
    /// of task start order.
    pub fn spawn(
        myid: Replica,
        num_nodes: usize,
        num_faults: usize,
        input_bit: u8,
        net: Network<ABAMsg>,
        inbox: Receiver<ABAMsg>,
        cert: Arc<Certification>,
        decision_out: UnboundedSender<(Replica, u8)>,
    ) -> oneshot::Sender<()> {
        let (exit_tx, exit_rx) = oneshot::channel();
        tokio::spawn(async move {
            let mut context = Context {
                myid,
                net,
                inbox,
                decision_out,
                exit_rx,
                aba: ABA::new(myid, num_nodes, num_faults, input_bit, cert),
            };
            if let Err(e) = context.run().await {
                log::error!(target: "node", "[{}] node task failed: {}", myid, e);
            }
        });
        exit_tx
    }

    async fn run(&mut self) -> Result<()> {
        let mut fx = Effects::new();
        self.aba.start(&mut fx);
        self.flush(fx);

        loop {
            tokio::select! {
                exit_val = &mut self.exit_rx => {
                    exit_val.map_err(anyhow::Error::new)?;
                    log::info!(target: "node", "[{}] termination signal received, exiting", self.myid);
                    break;
                },
                msg = self.inbox.recv() => {
                    let msg = msg.ok_or_else(|| anyhow!("inbox closed"))?;
                    self.process_msg(msg);
                },
            }
        }
        Ok(())
    }

    fn process_msg(&mut self, msg: ABAMsg) {
        let mut fx = Effects::new();
        self.aba.on_message(msg, &mut fx);
        self.flush(fx);
    }

    fn flush(&mut self, fx: Effects<ABAMsg, u8>) {
        for (to, msg) in fx.unicasts {
            self.net.send(to, msg);
        }
        for msg in fx.broadcasts {
            self.net.broadcast(msg);
        }
        for decision in fx.results {
            if self.decision_out.send((self.myid, decision)).is_err() {
                log::warn!(target: "node", "[{}] driver gone, decision dropped", self.myid);
            }
        }
    }
}

/// Wires up one live node per input bit over a fresh bus: all inboxes are
/// registered before any task starts, then every node is spawned. The
/// driver passes `n - t` inputs; tests may run up to `n`. Returns the exit
/// handles and the stream of (node, decision) pairs.
pub fn launch_cluster(
    num_nodes: usize,
    num_faults: usize,
    inputs: &[u8],
) -> (Vec<oneshot::Sender<()>>, UnboundedReceiver<(Replica, u8)>) {
    let honest = inputs.len();
    assert!(
        honest >= num_nodes - num_faults && honest <= num_nodes,
        "live node count must lie in [n - t, n]"
    );

    let net: Network<ABAMsg> = Network::new();
    let (decision_tx, decision_rx) = tokio::sync::mpsc::unbounded_channel();

    let mut inboxes = Vec::with_capacity(honest);
    for id in 1..=honest {
        let (tx, rx) = channel(INBOX_CAPACITY);
        net.register(id, tx);
        inboxes.push(rx);
    }

    let mut exits = Vec::with_capacity(honest);
    for (idx, inbox) in inboxes.into_iter().enumerate() {
        let id = idx + 1;
        let cert = Arc::new(Certification::new());
        exits.push(Context::spawn(
            id,
            num_nodes,
            num_faults,
            inputs[idx],
            net.clone(),
            inbox,
            cert,
            decision_tx.clone(),
        ));
    }

    (exits, decision_rx)
}

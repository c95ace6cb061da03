use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use types::{Replica, ServiceContext};

use crate::msg::{ACastMsg, ACastStep};

/// State of one broadcast instance. Voter maps are released once the value
/// is delivered; the latched `delivered` flag keeps late duplicates silent.
#[derive(Debug)]
struct ACastInstance<V> {
    echo_voters: HashMap<V, HashSet<Replica>>,
    ready_voters: HashMap<V, HashSet<Replica>>,
    sent_echo: bool,
    sent_ready: bool,
    delivered: bool,
}

impl<V> ACastInstance<V> {
    fn new() -> ACastInstance<V> {
        ACastInstance {
            echo_voters: HashMap::new(),
            ready_voters: HashMap::new(),
            sent_echo: false,
            sent_ready: false,
            delivered: false,
        }
    }
}

/// Bracha reliable broadcast over values of type V, one instance per uuid.
#[derive(Debug)]
pub struct ACast<V> {
    myid: Replica,
    num_nodes: usize,
    num_faults: usize,
    instances: HashMap<String, ACastInstance<V>>,
}

impl<V> ACast<V>
where
    V: Clone + Eq + Hash,
{
    pub fn new(myid: Replica, num_nodes: usize, num_faults: usize) -> ACast<V> {
        ACast {
            myid,
            num_nodes,
            num_faults,
            instances: HashMap::new(),
        }
    }

    /// Handles one MSG/ECHO/READY step and emits the resulting broadcasts
    /// and at most one delivery per uuid.
    pub fn on_message(
        &mut self,
        msg: ACastMsg<V>,
        ctx: &mut impl ServiceContext<ACastMsg<V>, V>,
    ) {
        let myid = self.myid;
        let echo_threshold = self.num_nodes - self.num_faults;
        let ready_amplify = self.num_faults + 1;
        let deliver_threshold = 2 * self.num_faults + 1;

        let inst = self
            .instances
            .entry(msg.uuid.clone())
            .or_insert_with(ACastInstance::new);

        if inst.delivered {
            return;
        }

        match msg.step {
            ACastStep::Msg => {
                if !inst.sent_echo {
                    inst.sent_echo = true;
                    log::debug!(target: "acast", "[{}] {}: got MSG from {}, broadcasting ECHO", myid, msg.uuid, msg.from);
                    ctx.broadcast(ACastMsg {
                        step: ACastStep::Echo,
                        uuid: msg.uuid,
                        value: msg.value,
                        from: myid,
                    });
                }
            }
            ACastStep::Echo => {
                let voters = inst.echo_voters.entry(msg.value.clone()).or_default();
                voters.insert(msg.from);
                if voters.len() >= echo_threshold && !inst.sent_ready {
                    inst.sent_ready = true;
                    log::debug!(target: "acast", "[{}] {}: ECHO threshold reached, broadcasting READY", myid, msg.uuid);
                    ctx.broadcast(ACastMsg {
                        step: ACastStep::Ready,
                        uuid: msg.uuid,
                        value: msg.value,
                        from: myid,
                    });
                }
            }
            ACastStep::Ready => {
                let voters = inst.ready_voters.entry(msg.value.clone()).or_default();
                voters.insert(msg.from);
                let count = voters.len();

                if count >= ready_amplify && !inst.sent_ready {
                    inst.sent_ready = true;
                    log::debug!(target: "acast", "[{}] {}: READY amplification, broadcasting READY", myid, msg.uuid);
                    ctx.broadcast(ACastMsg {
                        step: ACastStep::Ready,
                        uuid: msg.uuid.clone(),
                        value: msg.value.clone(),
                        from: myid,
                    });
                }

                if count >= deliver_threshold && !inst.delivered {
                    inst.delivered = true;
                    // Release voter tables; only the latch is kept.
                    inst.echo_voters = HashMap::new();
                    inst.ready_voters = HashMap::new();
                    log::debug!(target: "acast", "[{}] {}: delivered", myid, msg.uuid);
                    ctx.send_result(msg.value);
                }
            }
        }
    }
}

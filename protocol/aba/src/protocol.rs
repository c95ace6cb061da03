use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use acast::{ACast, ACastMsg};
use icc::{ICCMsg, ICCResult, ICC};
use types::{Certification, Effects, Replica, Round, ServiceContext};
use vote::{Vote, VoteMsg, VoteResult};

use crate::msg::{ABAMsg, CompletePayload};

/// Asynchronous Byzantine Agreement on one bit. Each round runs Vote and
/// ICC in parallel; the Complete gadget decides independently of rounds.
/// The engine emits the decision once and keeps participating so its
/// Complete relays can push slower nodes over the t+1 threshold.
pub struct ABA {
    myid: Replica,
    num_nodes: usize,
    num_faults: usize,
    estimate: u8,
    round: Round,

    cert: Arc<Certification>,

    vote: Vote,
    icc: HashMap<Round, ICC>,
    complete_acast: ACast<CompletePayload>,

    /// Results of the current round only; cleared on round advance.
    vote_result: Option<VoteResult>,
    icc_result: Option<ICCResult>,

    /// value -> senders whose Complete was delivered.
    complete_counts: HashMap<u8, HashSet<Replica>>,
    decided: bool,
    decision: Option<u8>,
    has_broadcast_complete: bool,

    /// Vote/ICC messages tagged with a round ahead of ours, replayed on
    /// round advance.
    future_msgs: BTreeMap<Round, Vec<ABAMsg>>,
}

impl ABA {
    pub fn new(
        myid: Replica,
        num_nodes: usize,
        num_faults: usize,
        input_bit: u8,
        cert: Arc<Certification>,
    ) -> ABA {
        ABA {
            myid,
            num_nodes,
            num_faults,
            estimate: input_bit,
            round: 0,
            cert,
            vote: Vote::new(myid, num_nodes, num_faults),
            icc: HashMap::new(),
            complete_acast: ACast::new(myid, num_nodes, num_faults),
            vote_result: None,
            icc_result: None,
            complete_counts: HashMap::new(),
            decided: false,
            decision: None,
            has_broadcast_complete: false,
            future_msgs: BTreeMap::new(),
        }
    }

    pub fn decided(&self) -> Option<u8> {
        self.decision
    }

    pub fn start(&mut self, ctx: &mut impl ServiceContext<ABAMsg, u8>) {
        log::info!(target: "aba", "[{}] starting with estimate {}", self.myid, self.estimate);
        self.start_round(1, ctx);
    }

    pub fn on_message(&mut self, msg: ABAMsg, ctx: &mut impl ServiceContext<ABAMsg, u8>) {
        match &msg {
            ABAMsg::Complete(_) => self.dispatch(msg, ctx),
            ABAMsg::Vote { round, .. } | ABAMsg::Icc { round, .. } => {
                if *round > self.round {
                    self.future_msgs.entry(*round).or_default().push(msg);
                } else {
                    self.dispatch(msg, ctx);
                }
            }
        }
    }

    fn dispatch(&mut self, msg: ABAMsg, ctx: &mut impl ServiceContext<ABAMsg, u8>) {
        match msg {
            ABAMsg::Vote { round, msg } => {
                self.drive_vote(round, ctx, |vote, fx| vote.on_message(msg, fx));
            }
            ABAMsg::Icc { round, msg } => {
                self.drive_icc(round, ctx, |engine, fx| engine.on_message(msg, fx));
            }
            ABAMsg::Complete(acast_msg) => self.handle_complete_acast(acast_msg, ctx),
        }
    }

    fn start_round(&mut self, round: Round, ctx: &mut impl ServiceContext<ABAMsg, u8>) {
        self.round = round;
        self.vote_result = None;
        self.icc_result = None;
        log::info!(target: "aba", "[{}] round {}: starting with estimate {}", self.myid, round, self.estimate);

        self.icc.insert(
            round,
            ICC::new(
                self.myid,
                self.num_nodes,
                self.num_faults,
                round,
                self.cert.clone(),
            ),
        );

        let estimate = self.estimate;
        self.drive_vote(round, ctx, |vote, fx| vote.start_round(round, estimate, fx));
        self.drive_icc(round, ctx, |engine, fx| engine.start(fx));

        if let Some(buffered) = self.future_msgs.remove(&round) {
            log::info!(target: "aba", "[{}] round {}: replaying {} buffered messages", self.myid, round, buffered.len());
            for msg in buffered {
                self.dispatch(msg, ctx);
            }
        }
    }

    /// Runs a closure against the vote engine and translates its effects
    /// into round-tagged envelopes and result handling.
    fn drive_vote(
        &mut self,
        round: Round,
        ctx: &mut impl ServiceContext<ABAMsg, u8>,
        action: impl FnOnce(&mut Vote, &mut Effects<VoteMsg, VoteResult>),
    ) {
        let mut fx = Effects::new();
        action(&mut self.vote, &mut fx);
        for (to, msg) in fx.unicasts {
            ctx.send(to, ABAMsg::Vote { round, msg });
        }
        for msg in fx.broadcasts {
            ctx.broadcast(ABAMsg::Vote { round, msg });
        }
        for result in fx.results {
            if result.round == self.round {
                self.vote_result = Some(result);
                self.check_round_progress(ctx);
            }
        }
    }

    fn drive_icc(
        &mut self,
        round: Round,
        ctx: &mut impl ServiceContext<ABAMsg, u8>,
        action: impl FnOnce(&mut ICC, &mut Effects<ICCMsg, ICCResult>),
    ) {
        let engine = match self.icc.get_mut(&round) {
            Some(engine) => engine,
            None => return,
        };
        let mut fx = Effects::new();
        action(engine, &mut fx);
        for (to, msg) in fx.unicasts {
            ctx.send(to, ABAMsg::Icc { round, msg });
        }
        for msg in fx.broadcasts {
            ctx.broadcast(ABAMsg::Icc { round, msg });
        }
        for result in fx.results {
            if round == self.round {
                self.icc_result = Some(result);
                self.check_round_progress(ctx);
            }
        }
    }

    fn handle_complete_acast(
        &mut self,
        msg: ACastMsg<CompletePayload>,
        ctx: &mut impl ServiceContext<ABAMsg, u8>,
    ) {
        let mut fx = Effects::new();
        self.complete_acast.on_message(msg, &mut fx);
        for out in fx.broadcasts {
            ctx.broadcast(ABAMsg::Complete(out));
        }
        for payload in fx.results {
            self.handle_complete_delivery(payload, ctx);
        }
    }

    fn broadcast_complete(&mut self, value: u8, ctx: &mut impl ServiceContext<ABAMsg, u8>) {
        self.has_broadcast_complete = true;
        log::info!(target: "aba", "[{}] broadcasting COMPLETE({})", self.myid, value);
        let payload = CompletePayload {
            sender: self.myid,
            value,
        };
        let msg = ACastMsg::initial(payload, self.myid);
        ctx.broadcast(ABAMsg::Complete(msg.clone()));
        self.handle_complete_acast(msg, ctx);
    }

    /// Termination gadget: t+1 delivered Completes for one value decide it.
    /// A node that decides without having claimed the value itself still
    /// broadcasts its own Complete to help the rest reach the threshold.
    fn handle_complete_delivery(
        &mut self,
        payload: CompletePayload,
        ctx: &mut impl ServiceContext<ABAMsg, u8>,
    ) {
        let senders = self.complete_counts.entry(payload.value).or_default();
        senders.insert(payload.sender);
        let count = senders.len();
        log::info!(target: "aba", "[{}] COMPLETE({}) from {}, {} total", self.myid, payload.value, payload.sender, count);

        if count >= self.num_faults + 1 && !self.decided {
            self.decided = true;
            self.decision = Some(payload.value);
            log::info!(target: "aba", "[{}] DECIDED {}", self.myid, payload.value);
            ctx.send_result(payload.value);

            if !self.has_broadcast_complete {
                self.broadcast_complete(payload.value, ctx);
            }
        }
    }

    /// Round epilogue, run once both the vote and the coin are in: update
    /// the estimate, claim completion on strong confidence, advance.
    fn check_round_progress(&mut self, ctx: &mut impl ServiceContext<ABAMsg, u8>) {
        let (vote_result, icc_result) = match (&self.vote_result, &self.icc_result) {
            (Some(vote_result), Some(icc_result)) => (*vote_result, *icc_result),
            _ => return,
        };

        log::info!(
            target: "aba",
            "[{}] round {}: vote {:?} at confidence {}, coin {}",
            self.myid, self.round, vote_result.value, vote_result.confidence, icc_result.coin
        );

        if self.decided {
            self.estimate = self.decision.expect("decided without a decision value");
        } else if vote_result.confidence == 2 {
            let value = vote_result.value.expect("confidence 2 without a value");
            self.estimate = value;
            if !self.has_broadcast_complete {
                self.broadcast_complete(value, ctx);
            }
        } else if vote_result.confidence == 1 {
            self.estimate = vote_result.value.expect("confidence 1 without a value");
        } else {
            self.estimate = icc_result.coin;
        }

        let next = self.round + 1;
        self.start_round(next, ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Cluster {
        engines: Vec<ABA>,
        queue: VecDeque<(Replica, ABAMsg)>,
        decisions: Vec<Vec<u8>>,
        num_nodes: usize,
    }

    impl Cluster {
        fn new(num_nodes: usize, num_faults: usize, inputs: &[u8]) -> Cluster {
            Cluster {
                engines: (1..=num_nodes)
                    .map(|id| {
                        ABA::new(
                            id,
                            num_nodes,
                            num_faults,
                            inputs[id - 1],
                            Arc::new(Certification::new()),
                        )
                    })
                    .collect(),
                queue: VecDeque::new(),
                decisions: vec![Vec::new(); num_nodes],
                num_nodes,
            }
        }

        fn route(&mut self, node: Replica, fx: Effects<ABAMsg, u8>) {
            for (to, msg) in fx.unicasts {
                self.queue.push_back((to, msg));
            }
            for msg in fx.broadcasts {
                for peer in 1..=self.num_nodes {
                    self.queue.push_back((peer, msg.clone()));
                }
            }
            for decision in fx.results {
                self.decisions[node - 1].push(decision);
            }
        }

        fn start_all(&mut self) {
            for node in 1..=self.num_nodes {
                let mut fx = Effects::new();
                self.engines[node - 1].start(&mut fx);
                self.route(node, fx);
            }
        }

        /// Decided nodes keep running rounds, so the queue never drains on
        /// its own; pump until every node decided, within a budget.
        fn pump_until_all_decided(&mut self, budget: usize) {
            let mut processed = 0usize;
            while processed < budget {
                if self.decisions.iter().all(|d| !d.is_empty()) {
                    return;
                }
                let (to, msg) = match self.queue.pop_front() {
                    Some(entry) => entry,
                    None => break,
                };
                let mut fx = Effects::new();
                self.engines[to - 1].on_message(msg, &mut fx);
                self.route(to, fx);
                processed += 1;
            }
            assert!(
                self.decisions.iter().all(|d| !d.is_empty()),
                "not all nodes decided within the message budget"
            );
        }
    }

    fn run_agreement(inputs: &[u8], expected: u8) {
        let mut cluster = Cluster::new(inputs.len(), 1, inputs);
        cluster.start_all();
        cluster.pump_until_all_decided(5_000_000);
        for node in 1..=inputs.len() {
            assert_eq!(
                cluster.decisions[node - 1],
                vec![expected],
                "node {} decision",
                node
            );
        }
    }

    #[test]
    fn unanimous_ones_decide_one() {
        run_agreement(&[1, 1, 1, 1], 1);
    }

    #[test]
    fn unanimous_zeros_decide_zero() {
        run_agreement(&[0, 0, 0, 0], 0);
    }

    #[test]
    fn outnumbered_dissenter_joins_the_majority() {
        run_agreement(&[1, 1, 1, 0], 1);
    }

    /// With the inputs split 2-2, votes may carry no unanimity and nodes
    /// fall back to the common coin; the protocol must still converge on a
    /// single bit, whichever it is.
    #[test]
    fn split_inputs_converge_via_the_coin() {
        let inputs = [1u8, 1, 0, 0];
        let mut cluster = Cluster::new(4, 1, &inputs);
        cluster.start_all();
        cluster.pump_until_all_decided(10_000_000);

        let first = cluster.decisions[0][0];
        assert!(first <= 1);
        for node in 1..=4 {
            assert_eq!(cluster.decisions[node - 1], vec![first], "node {}", node);
        }
    }

    #[test]
    fn decisions_are_emitted_once() {
        let inputs = [1u8, 1, 1, 1];
        let mut cluster = Cluster::new(4, 1, &inputs);
        cluster.start_all();
        cluster.pump_until_all_decided(5_000_000);

        // Keep pumping a while longer; the decided latch must hold.
        for _ in 0..50_000 {
            let (to, msg) = match cluster.queue.pop_front() {
                Some(entry) => entry,
                None => break,
            };
            let mut fx = Effects::new();
            cluster.engines[to - 1].on_message(msg, &mut fx);
            cluster.route(to, fx);
        }
        for node in 1..=4 {
            assert_eq!(cluster.decisions[node - 1].len(), 1);
        }
    }
}

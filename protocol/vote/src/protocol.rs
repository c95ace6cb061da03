use std::collections::{HashMap, HashSet};

use acast::{ACast, ACastMsg};
use types::{Effects, Replica, Round, ServiceContext};

use crate::msg::{VoteMsg, VotePayload, VoteResult};

/// Per-round state of the three-phase vote.
#[derive(Debug, Default)]
struct VoteRound {
    received_inputs: HashMap<Replica, u8>,
    my_a: Vec<Replica>,
    sent_vote1: bool,

    received_vote1: HashMap<Replica, (Vec<Replica>, u8)>,
    my_b: Vec<Replica>,
    sent_revote: bool,

    received_revote: HashMap<Replica, (Vec<Replica>, u8)>,
    my_c: Vec<Replica>,

    finished: bool,
}

/// Three-phase vote producing (value, confidence) per round. One engine
/// serves every round; round state is created on first touch.
pub struct Vote {
    myid: Replica,
    num_nodes: usize,
    num_faults: usize,
    acast: ACast<VotePayload>,
    rounds: HashMap<Round, VoteRound>,
}

impl Vote {
    pub fn new(myid: Replica, num_nodes: usize, num_faults: usize) -> Vote {
        Vote {
            myid,
            num_nodes,
            num_faults,
            acast: ACast::new(myid, num_nodes, num_faults),
            rounds: HashMap::new(),
        }
    }

    pub fn start_round(
        &mut self,
        round: Round,
        input_bit: u8,
        ctx: &mut impl ServiceContext<VoteMsg, VoteResult>,
    ) {
        if self.round_state(round).finished {
            return;
        }
        log::info!(target: "vote", "[{}] round {}: voting with input {}", self.myid, round, input_bit);
        self.start_acast(
            VotePayload::Input {
                sender: self.myid,
                bit: input_bit,
                round,
            },
            ctx,
        );
        self.check_progress(round, ctx);
    }

    pub fn on_message(
        &mut self,
        msg: VoteMsg,
        ctx: &mut impl ServiceContext<VoteMsg, VoteResult>,
    ) {
        match msg {
            VoteMsg::ACast(acast_msg) => self.handle_acast(acast_msg, ctx),
        }
    }

    fn handle_acast(
        &mut self,
        msg: ACastMsg<VotePayload>,
        ctx: &mut impl ServiceContext<VoteMsg, VoteResult>,
    ) {
        let mut fx = Effects::new();
        self.acast.on_message(msg, &mut fx);
        for out in fx.broadcasts {
            ctx.broadcast(VoteMsg::ACast(out));
        }
        for payload in fx.results {
            self.process_delivered_payload(payload, ctx);
        }
    }

    fn start_acast(
        &mut self,
        payload: VotePayload,
        ctx: &mut impl ServiceContext<VoteMsg, VoteResult>,
    ) {
        let msg = ACastMsg::initial(payload, self.myid);
        ctx.broadcast(VoteMsg::ACast(msg.clone()));
        self.handle_acast(msg, ctx);
    }

    fn process_delivered_payload(
        &mut self,
        payload: VotePayload,
        ctx: &mut impl ServiceContext<VoteMsg, VoteResult>,
    ) {
        let round = payload.round();
        {
            let state = self.round_state(round);
            if state.finished {
                return;
            }
            match payload {
                VotePayload::Input { sender, bit, .. } => {
                    state.received_inputs.insert(sender, bit);
                }
                VotePayload::Vote1 {
                    sender, bit, set, ..
                } => {
                    state.received_vote1.insert(sender, (set, bit));
                }
                VotePayload::Revote {
                    sender, bit, set, ..
                } => {
                    state.received_revote.insert(sender, (set, bit));
                }
            }
        }
        self.check_progress(round, ctx);
    }

    fn check_progress(
        &mut self,
        round: Round,
        ctx: &mut impl ServiceContext<VoteMsg, VoteResult>,
    ) {
        let threshold = self.num_nodes - self.num_faults;
        let myid = self.myid;

        // Phase 1: n-t INPUTs fix A_i and the first vote (majority, ties
        // towards 0).
        let vote1_payload = {
            let state = self.round_state(round);
            if state.finished {
                return;
            }
            if !state.sent_vote1 && state.received_inputs.len() >= threshold {
                let mut a_set: Vec<Replica> = state.received_inputs.keys().copied().collect();
                a_set.sort_unstable();
                let bit = majority(state.received_inputs.values().copied());
                state.my_a = a_set.clone();
                state.sent_vote1 = true;
                log::info!(target: "vote", "[{}] round {}: broadcasting VOTE1 bit {} over A = {:?}", myid, round, bit, a_set);
                Some(VotePayload::Vote1 {
                    sender: myid,
                    bit,
                    set: a_set,
                    round,
                })
            } else {
                None
            }
        };
        if let Some(payload) = vote1_payload {
            self.start_acast(payload, ctx);
        }

        // Phase 2: a VOTE1 is justified once every member of its set has an
        // INPUT delivered here; n-t justified votes fix B_i and the revote.
        let revote_payload = {
            let state = self.round_state(round);
            let valid_vote1 = justified_vote1(state);
            if state.sent_vote1 && !state.sent_revote && valid_vote1.len() >= threshold {
                let mut b_set = valid_vote1;
                b_set.sort_unstable();
                let bit = majority(b_set.iter().map(|j| state.received_vote1[j].1));
                state.my_b = b_set.clone();
                state.sent_revote = true;
                log::info!(target: "vote", "[{}] round {}: broadcasting REVOTE bit {} over B = {:?}", myid, round, bit, b_set);
                Some(VotePayload::Revote {
                    sender: myid,
                    bit,
                    set: b_set,
                    round,
                })
            } else {
                None
            }
        };
        if let Some(payload) = revote_payload {
            self.start_acast(payload, ctx);
        }

        // Phase 3: n-t justified REVOTEs fix C_i and decide the round.
        let result = {
            let state = self.round_state(round);
            if !state.sent_revote || state.finished {
                None
            } else {
                let justified: HashSet<Replica> = justified_vote1(state).into_iter().collect();
                let mut c_set: Vec<Replica> = state
                    .received_revote
                    .iter()
                    .filter(|(_, (set, _))| set.iter().all(|j| justified.contains(j)))
                    .map(|(j, _)| *j)
                    .collect();
                if c_set.len() < threshold {
                    None
                } else {
                    c_set.sort_unstable();
                    state.my_c = c_set;

                    let b_bits: Vec<u8> = state
                        .my_b
                        .iter()
                        .map(|j| state.received_vote1[j].1)
                        .collect();
                    let c_bits: Vec<u8> = state
                        .my_c
                        .iter()
                        .map(|j| state.received_revote[j].1)
                        .collect();

                    let outcome = if unanimous(&b_bits) {
                        VoteResult {
                            round,
                            value: Some(b_bits[0]),
                            confidence: 2,
                        }
                    } else if unanimous(&c_bits) {
                        VoteResult {
                            round,
                            value: Some(c_bits[0]),
                            confidence: 1,
                        }
                    } else {
                        VoteResult {
                            round,
                            value: None,
                            confidence: 0,
                        }
                    };
                    state.finished = true;
                    Some(outcome)
                }
            }
        };
        if let Some(outcome) = result {
            log::info!(target: "vote", "[{}] round {}: vote finished with {:?} at confidence {}", myid, round, outcome.value, outcome.confidence);
            ctx.send_result(outcome);
        }
    }

    fn round_state(&mut self, round: Round) -> &mut VoteRound {
        self.rounds.entry(round).or_default()
    }
}

/// Senders whose VOTE1 set is fully covered by the INPUTs delivered so far.
fn justified_vote1(state: &VoteRound) -> Vec<Replica> {
    state
        .received_vote1
        .iter()
        .filter(|(_, (set, _))| set.iter().all(|j| state.received_inputs.contains_key(j)))
        .map(|(j, _)| *j)
        .collect()
}

fn majority(bits: impl Iterator<Item = u8>) -> u8 {
    let mut ones = 0usize;
    let mut zeros = 0usize;
    for bit in bits {
        if bit == 1 {
            ones += 1;
        } else {
            zeros += 1;
        }
    }
    if ones > zeros {
        1
    } else {
        0
    }
}

fn unanimous(bits: &[u8]) -> bool {
    !bits.is_empty() && bits.iter().all(|b| *b == bits[0])
}

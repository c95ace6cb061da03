use acast::ACastMsg;
use types::{Replica, Round};
use serde::{Deserialize, Serialize};

/// All vote traffic rides on A-Cast; there are no direct messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum VoteMsg {
    ACast(ACastMsg<VotePayload>),
}

/// Payloads of the three vote phases. Sets are sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VotePayload {
    Input {
        sender: Replica,
        bit: u8,
        round: Round,
    },
    Vote1 {
        sender: Replica,
        bit: u8,
        set: Vec<Replica>,
        round: Round,
    },
    Revote {
        sender: Replica,
        bit: u8,
        set: Vec<Replica>,
        round: Round,
    },
}

impl VotePayload {
    pub fn round(&self) -> Round {
        match self {
            VotePayload::Input { round, .. } => *round,
            VotePayload::Vote1 { round, .. } => *round,
            VotePayload::Revote { round, .. } => *round,
        }
    }
}

/// Outcome of one vote round. `value` is None when no unanimity emerged;
/// confidence 2 means unanimity already in the first vote set, 1 only after
/// the revote, 0 none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteResult {
    pub round: Round,
    pub value: Option<u8>,
    pub confidence: u8,
}

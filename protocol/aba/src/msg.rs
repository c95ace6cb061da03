use acast::ACastMsg;
use icc::ICCMsg;
use types::{Replica, Round};
use serde::{Deserialize, Serialize};
use vote::VoteMsg;

/// Outermost wire envelope. Vote and ICC traffic is tagged with its round
/// so receivers can buffer messages that run ahead of their own round;
/// Complete broadcasts are round-free.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ABAMsg {
    Vote { round: Round, msg: VoteMsg },
    Icc { round: Round, msg: ICCMsg },
    Complete(ACastMsg<CompletePayload>),
}

/// Termination gadget payload: the sender claims the decision value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompletePayload {
    pub sender: Replica,
    pub value: u8,
}

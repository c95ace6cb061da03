use acast::ACastMsg;
use ivss::IVSSMsg;
use types::Replica;
use serde::{Deserialize, Serialize};

/// ICC traffic: embedded IVSS messages plus the coin's own A-Cast payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ICCMsg {
    Ivss(IVSSMsg),
    ACast(ACastMsg<ICCPayload>),
}

/// Set-exchange payloads of the coin protocol. All id lists are sorted
/// ascending before broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ICCPayload {
    Attach {
        sender: Replica,
        set_t: Vec<Replica>,
    },
    Accept {
        sender: Replica,
        set_a: Vec<Replica>,
    },
    FinalSets {
        sender: Replica,
        set_h: Vec<Replica>,
        set_s: Vec<Replica>,
    },
}

/// The coin bit for one round, emitted exactly once per node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ICCResult {
    pub coin: u8,
}

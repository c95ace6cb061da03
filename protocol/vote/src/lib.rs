pub mod msg;
pub use msg::{VoteMsg, VotePayload, VoteResult};

mod protocol;
pub use protocol::Vote;

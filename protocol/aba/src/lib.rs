pub mod msg;
pub use msg::{ABAMsg, CompletePayload};

mod protocol;
pub use protocol::ABA;

pub mod msg;
pub use msg::{ICCMsg, ICCPayload, ICCResult};

mod protocol;
pub use protocol::ICC;

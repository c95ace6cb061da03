pub mod msg;
pub use msg::{IVSSEvent, IVSSMsg, IVSSPayload};

mod protocol;
pub use protocol::IVSS;

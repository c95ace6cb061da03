pub mod msg;
pub use msg::{ACastMsg, ACastStep};

mod protocol;
pub use protocol::ACast;

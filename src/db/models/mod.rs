pub mod session;
pub mod violation;

pub use session::{SessionRecord, SessionStatus};
pub use violation::ViolationRecord;

pub mod comment;
pub mod pattern;
pub mod session;

pub use comment::Comment;
pub use pattern::{Pattern, SelectorSpec};
pub use session::{FailureReason, ScrapeReport, SessionState};

pub mod jobs;
pub mod messages;
pub mod selection;

pub use jobs::JobState;
pub use messages::{AppMessage, Job, LogEntry, LogLevel, Outline};
pub use selection::{OutlineStyle, Selection};

//! Alert forwarding and session summaries

mod forward;
mod summary;

pub use forward::ReportForwarder;
pub use summary::{SessionSummary, SessionTally};

//! Reading session controller.
//!
//! Holds the operator's Pending Submission and ties the meter directory,
//! history retriever, classifier and submission assembler together.

mod controller;
pub mod scan;
pub mod state;

pub use controller::{ReadingSession, SessionConfig};
pub use scan::ScanGate;
pub use state::{HistoryStatus, PendingSubmission, SessionView};

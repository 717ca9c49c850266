pub mod pipeline;
pub mod report;

pub use pipeline::{Pipeline, RunOutcome};
pub use report::{ChangeLedger, LedgerEntry, SkippedEntry, SummaryRow};

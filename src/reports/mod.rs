// Reporting over stored payout history
//
// Numan Thabit 2025 Nov

pub mod dashboard;
pub mod export;

pub use dashboard::{failed_only, summary, totals_by_destination, Destination, HistorySummary};
pub use export::{export_filename, from_tabular, to_tabular, ImportReport, RowDiagnostic};

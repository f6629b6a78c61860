// Batch orchestration module
// Sequential payout batches with per-item outcomes, progress events and
// cooperative cancellation
//
// Numan Thabit 2025 Nov

pub mod executor;

pub use executor::{
    BatchContext, BatchEvent, BatchExecutor, BatchReport, BatchRun, BatchStatus, CancelHandle,
};

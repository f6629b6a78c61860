// History module - bounded per-account payout audit trail
//
// Numan Thabit 2025 Nov

pub mod entry;
pub mod file;
pub mod store;

pub use entry::HistoryEntry;
pub use file::FileHistoryStore;
pub use store::{HistoryStore, MemoryHistoryStore, MAX_HISTORY_ENTRIES};

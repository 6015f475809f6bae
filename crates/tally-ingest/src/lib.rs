//! tally-ingest
//!
//! The two ingestion adapters and the pipeline they share.
//!
//! - webhook: one pushed event, label-driven, exact-second duplicates
//! - bulk: a device date range replayed in order, shift-driven, ±window duplicates
//!
//! Storage and lookup go through the traits in [`store`]. Every punch runs
//! under a per-employee lock, so concurrent deliveries for one employee
//! serialize while different employees proceed in parallel.

mod bulk;
mod error;
mod locks;
pub mod memory;
mod pipeline;
pub mod store;
mod webhook;

pub use bulk::BulkSummary;
pub use error::IngestError;
pub use locks::EmployeeLocks;
pub use memory::{MemoryDirectory, MemoryStore};
pub use pipeline::{IngestOptions, Ingestor, PunchOutcome, PunchReceipt, ReceiptView};
pub use store::{match_device_address, AttendanceStore, CalendarProvider, Directory};

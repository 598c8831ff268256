pub mod contracts;
pub mod storage;

pub use contracts::{ExtractService, QueryWindow, RunSummary};
pub use storage::{LocalObjectStore, ObjectStore, S3ObjectStore};

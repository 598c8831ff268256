pub mod api;
pub mod fetcher;
pub mod service;
pub mod types;
pub mod writer;

pub use api::{ContractsApi, SocrataContractsApi};
pub use fetcher::{PagedFetcher, Pause, RetryPolicy, TokioPause};
pub use service::ExtractService;
pub use types::{PageRequest, QueryWindow, Record, RunStage, RunSummary};
pub use writer::ContractsCsvWriter;

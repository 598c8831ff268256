use crate::config::ExtractConfig;
use crate::domains::contracts::api::{ContractsApi, SocrataContractsApi};
use crate::domains::contracts::fetcher::{PagedFetcher, Pause, RetryPolicy};
use crate::domains::contracts::types::{QueryWindow, Record, RunStage, RunSummary};
use crate::domains::contracts::writer::ContractsCsvWriter;
use crate::domains::storage::ObjectStore;
use crate::errors::{ConfigResult, ExtractResult, FetchError, ValidationError};
use chrono::Local;
use futures::stream::{Stream, TryStreamExt};
use log::{debug, info, warn};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

/// Runs the daily extraction: fetch one day of contracts, write them to a
/// local CSV and publish it when it has rows.
pub struct ExtractService {
    config: ExtractConfig,
    fetcher: PagedFetcher,
    store: Arc<dyn ObjectStore>,
}

impl ExtractService {
    /// Build a service for a validated config
    pub fn new(config: ExtractConfig, api: Arc<dyn ContractsApi>, store: Arc<dyn ObjectStore>) -> ConfigResult<Self> {
        config.validate()?;
        let policy = RetryPolicy::new(config.max_retries, config.backoff_base);
        let fetcher = PagedFetcher::new(api, policy, config.page_size);
        Ok(Self { config, fetcher, store })
    }

    /// Service talking to the Socrata endpoint named in the config
    pub fn with_socrata(config: ExtractConfig, store: Arc<dyn ObjectStore>) -> ExtractResult<Self> {
        config.validate()?;
        let api = SocrataContractsApi::new(&config.base_url, config.request_timeout, &config.user_agent)?;
        Ok(Self::new(config, Arc::new(api), store)?)
    }

    /// Replace the backoff timer
    pub fn with_pause(mut self, pause: Arc<dyn Pause>) -> Self {
        self.fetcher = self.fetcher.with_pause(pause);
        self
    }

    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    /// The day `days_back` days before the local date
    pub fn target_window(&self) -> ConfigResult<QueryWindow> {
        QueryWindow::days_back_from(Local::now().date_naive(), self.config.days_back)
            .ok_or_else(|| ValidationError::invalid_value("DAYS_BACK", "offset falls outside the calendar").into())
    }

    /// Extract the configured day
    pub async fn run(&self) -> ExtractResult<RunSummary> {
        let window = self.target_window()?;
        self.run_for(window).await
    }

    /// Extract a specific day
    pub async fn run_for(&self, window: QueryWindow) -> ExtractResult<RunSummary> {
        log_stage(RunStage::Init, &window);
        info!(
            "Extracting contracts for {} (page size {}, {} attempts per page)",
            window, self.config.page_size, self.config.max_retries
        );

        log_stage(RunStage::Fetching, &window);
        let pages = self.fetcher.pages(&window);
        self.write_and_publish(&window, pages).await
    }

    /// Write every page to the local file, then publish it if it has rows.
    /// Nothing is uploaded unless the whole file was written and closed.
    pub async fn write_and_publish<S>(&self, window: &QueryWindow, pages: S) -> ExtractResult<RunSummary>
    where
        S: Stream<Item = Result<Vec<Record>, FetchError>>,
    {
        let output_path = self.config.output_path.as_path();
        let count = match self.write_local_file(window, pages).await {
            Ok(count) => count,
            Err(e) => {
                // a partial file is never kept
                discard_local_file(output_path).await;
                return Err(e);
            }
        };

        if count == 0 {
            log_stage(RunStage::Skip, window);
            info!("No data for {}", window);
            self.release_local_file(output_path).await;
            log_stage(RunStage::Done, window);
            return Ok(RunSummary {
                day: window.to_string(),
                count: 0,
                location: None,
            });
        }

        log_stage(RunStage::Publishing, window);
        let key = window.object_key();
        let location = match self.store.put_file(output_path, &key).await {
            Ok(location) => location,
            Err(e) => {
                self.release_local_file(output_path).await;
                return Err(e.into());
            }
        };
        info!("Uploaded CSV to {} ({} rows)", location, count);

        self.release_local_file(output_path).await;
        log_stage(RunStage::Done, window);

        Ok(RunSummary {
            day: window.to_string(),
            count,
            location: Some(location),
        })
    }

    async fn write_local_file<S>(&self, window: &QueryWindow, pages: S) -> ExtractResult<usize>
    where
        S: Stream<Item = Result<Vec<Record>, FetchError>>,
    {
        let mut writer = ContractsCsvWriter::create(&self.config.output_path)?;
        log_stage(RunStage::Writing, window);

        futures::pin_mut!(pages);
        while let Some(page) = pages.try_next().await? {
            writer.write_all(&page)?;
            debug!("{} rows written so far", writer.rows_written());
        }
        Ok(writer.finish()?)
    }

    async fn release_local_file(&self, path: &Path) {
        if self.config.keep_local_file {
            return;
        }
        discard_local_file(path).await;
    }
}

async fn discard_local_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove local file {}: {}", path.display(), e),
    }
}

fn log_stage(stage: RunStage, window: &QueryWindow) {
    debug!("[{}] stage {}", window, stage);
}

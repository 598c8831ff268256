//! Paginated, retrying fetch of one day of contracts.
//!
//! [`PagedFetcher`] wraps a [`ContractsApi`] with two behaviors:
//!
//! - **Retry** - each page request gets up to `max_attempts` tries, with an
//!   exponential delay of `backoff_base * 2^attempt` between them
//! - **Offset pagination** - pages of `page_size` records are requested until
//!   a short or empty page comes back
//!
//! Pages are produced lazily as a stream, one fully buffered page at a time.

use crate::domains::contracts::api::ContractsApi;
use crate::domains::contracts::types::{PageRequest, QueryWindow, Record};
use crate::errors::{FetchError, FetchResult};
use async_trait::async_trait;
use futures::stream::{self, Stream, TryStreamExt};
use log::{debug, error, warn};
use std::sync::Arc;
use std::time::Duration;

/// Suspends the fetcher between retry attempts
#[async_trait]
pub trait Pause: Send + Sync {
    async fn pause(&self, delay: Duration);
}

/// Timer-based pause on the tokio runtime
pub struct TokioPause;

#[async_trait]
impl Pause for TokioPause {
    async fn pause(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per request, first one included
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self { max_attempts, backoff_base }
    }

    /// Delay after the failed attempt with index `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let secs = self.backoff_base.as_secs_f64() * 2f64.powi(attempt.min(i32::MAX as u32) as i32);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

pub struct PagedFetcher {
    api: Arc<dyn ContractsApi>,
    pause: Arc<dyn Pause>,
    policy: RetryPolicy,
    page_size: usize,
}

impl PagedFetcher {
    /// A page size of 0 is raised to 1 so the offset always advances
    pub fn new(api: Arc<dyn ContractsApi>, policy: RetryPolicy, page_size: usize) -> Self {
        Self {
            api,
            pause: Arc::new(TokioPause),
            policy,
            page_size: page_size.max(1),
        }
    }

    /// Replace the backoff timer
    pub fn with_pause(mut self, pause: Arc<dyn Pause>) -> Self {
        self.pause = pause;
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Run one page request under the retry policy
    pub async fn fetch_with_retry(&self, request: &PageRequest) -> FetchResult<Vec<Record>> {
        let mut attempt: u32 = 0;
        loop {
            match self.api.fetch_page(request).await {
                Ok(records) => return Ok(records),
                Err(err) => {
                    let attempts = attempt + 1;
                    if attempts >= self.policy.max_attempts {
                        error!(
                            "Page at offset {} failed after {} attempts: {}",
                            request.offset, attempts, err
                        );
                        return Err(FetchError::Exhausted { attempts, last: Box::new(err) });
                    }

                    // TODO: stop retrying 4xx responses (see FetchError::is_client_error)
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        "Attempt {}/{} for offset {} failed: {}; retrying in {:?}",
                        attempts, self.policy.max_attempts, request.offset, err, delay
                    );
                    self.pause.pause(delay).await;
                    attempt = attempts;
                }
            }
        }
    }

    /// Stream of pages for the window. Ends after the first short or empty
    /// page; the first exhausted request ends it with an error.
    pub fn pages<'a>(&'a self, window: &QueryWindow) -> impl Stream<Item = FetchResult<Vec<Record>>> + 'a {
        let first = PageRequest::first(window, self.page_size);

        stream::try_unfold(Some(first), move |next| async move {
            let request = match next {
                Some(request) => request,
                None => return Ok(None),
            };

            let page = self.fetch_with_retry(&request).await?;
            debug!("Fetched {} records at offset {}", page.len(), request.offset);

            if page.is_empty() {
                return Ok(None);
            }

            let following = if page.len() < self.page_size {
                None
            } else {
                Some(request.next())
            };
            Ok::<_, FetchError>(Some((page, following)))
        })
    }

    /// Every record for the window, in API order
    pub async fn fetch_all(&self, window: &QueryWindow) -> FetchResult<Vec<Record>> {
        self.pages(window).try_concat().await
    }
}

/// Pause that records requested delays instead of sleeping
#[cfg(test)]
#[derive(Default)]
pub struct RecordingPause {
    delays: std::sync::Mutex<Vec<Duration>>,
}

#[cfg(test)]
impl RecordingPause {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Pause for RecordingPause {
    async fn pause(&self, delay: Duration) {
        self.delays.lock().unwrap().push(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::contracts::api::{records_from, MockContractsApi};
    use futures::StreamExt;
    use serde_json::json;

    fn transient() -> FetchError {
        FetchError::Transport("connection reset".to_string())
    }

    fn fetcher_for(api: Arc<MockContractsApi>, pause: Arc<RecordingPause>, attempts: u32, page_size: usize) -> PagedFetcher {
        PagedFetcher::new(api, RetryPolicy::new(attempts, Duration::from_millis(800)), page_size)
            .with_pause(pause)
    }

    fn window() -> QueryWindow {
        QueryWindow::parse("2024-03-01").unwrap()
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::new(5, Duration::from_millis(800));
        assert_eq!(policy.delay_for(0), Duration::from_millis(800));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1600));
        assert_eq!(policy.delay_for(3), Duration::from_millis(6400));
        assert_eq!(RetryPolicy::new(5, Duration::ZERO).delay_for(4), Duration::ZERO);
        assert_eq!(policy.delay_for(200), Duration::MAX);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let page = records_from(json!([{"id": 1}]));
        let api = Arc::new(MockContractsApi::new(vec![
            Err(transient()),
            Err(FetchError::Status { status: 502, body: String::new() }),
            Err(transient()),
            Ok(page.clone()),
        ]));
        let pause = Arc::new(RecordingPause::default());
        let fetcher = fetcher_for(api.clone(), pause.clone(), 5, 10);

        let request = PageRequest::first(&window(), 10);
        let records = fetcher.fetch_with_retry(&request).await.unwrap();

        assert_eq!(records, page);
        assert_eq!(api.requests().len(), 4);
        let delays = pause.delays();
        assert_eq!(
            delays,
            vec![Duration::from_millis(800), Duration::from_millis(1600), Duration::from_millis(3200)]
        );
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_client_errors_are_retried() {
        let page = records_from(json!([{"id": 1}]));
        let api = Arc::new(MockContractsApi::new(vec![
            Err(FetchError::Status { status: 404, body: "not found".to_string() }),
            Ok(page.clone()),
        ]));
        let pause = Arc::new(RecordingPause::default());
        let fetcher = fetcher_for(api.clone(), pause.clone(), 5, 10);

        let records = fetcher.fetch_with_retry(&PageRequest::first(&window(), 10)).await.unwrap();

        assert_eq!(records, page);
        assert_eq!(api.requests().len(), 2);
        assert_eq!(pause.delays(), vec![Duration::from_millis(800)]);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let api = Arc::new(MockContractsApi::new(Vec::new()));
        let pause = Arc::new(RecordingPause::default());
        let fetcher = fetcher_for(api.clone(), pause.clone(), 5, 10);

        let err = fetcher.fetch_all(&window()).await.unwrap_err();

        match err {
            FetchError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 5);
                assert!(matches!(*last, FetchError::Status { status: 500, .. }));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(api.requests().len(), 5);
        // no sleep after the final attempt
        assert_eq!(pause.delays().len(), 4);
    }

    #[tokio::test]
    async fn test_single_attempt_policy_does_not_pause() {
        let api = Arc::new(MockContractsApi::new(vec![Err(transient())]));
        let pause = Arc::new(RecordingPause::default());
        let fetcher = fetcher_for(api.clone(), pause.clone(), 1, 10);

        assert!(fetcher.fetch_all(&window()).await.is_err());
        assert_eq!(api.requests().len(), 1);
        assert!(pause.delays().is_empty());
    }

    #[tokio::test]
    async fn test_stops_on_short_page() {
        let api = Arc::new(MockContractsApi::new(vec![
            Ok(records_from(json!([{"id": 1, "name": "a"}, {"id": 2, "name": "b"}]))),
            Ok(records_from(json!([{"id": 3, "name": "c"}]))),
        ]));
        let pause = Arc::new(RecordingPause::default());
        let fetcher = fetcher_for(api.clone(), pause, 5, 2);

        let records = fetcher.fetch_all(&window()).await.unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[2]["name"], json!("c"));
        let offsets: Vec<usize> = api.requests().iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![0, 2]);
    }

    #[tokio::test]
    async fn test_stops_on_empty_page() {
        let api = Arc::new(MockContractsApi::new(vec![
            Ok(records_from(json!([{"id": 1}, {"id": 2}]))),
            Ok(records_from(json!([{"id": 3}, {"id": 4}]))),
            Ok(Vec::new()),
            Ok(records_from(json!([{"id": 99}]))),
        ]));
        let pause = Arc::new(RecordingPause::default());
        let fetcher = fetcher_for(api.clone(), pause, 5, 2);

        let pages: Vec<FetchResult<Vec<Record>>> = fetcher.pages(&window()).collect().await;

        assert_eq!(pages.len(), 2);
        assert!(pages.iter().all(|p| p.as_ref().map(|r| r.len() == 2).unwrap_or(false)));
        let offsets: Vec<usize> = api.requests().iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![0, 2, 4]);
    }

    #[tokio::test]
    async fn test_zero_page_size_still_advances() {
        let api = Arc::new(MockContractsApi::new(vec![
            Ok(records_from(json!([{"id": 1}]))),
            Ok(records_from(json!([{"id": 2}]))),
            Ok(Vec::new()),
        ]));
        let pause = Arc::new(RecordingPause::default());
        let fetcher = fetcher_for(api.clone(), pause, 5, 0);
        assert_eq!(fetcher.page_size(), 1);

        let records = fetcher.fetch_all(&window()).await.unwrap();

        assert_eq!(records.len(), 2);
        let requests = api.requests();
        assert!(requests.iter().all(|r| r.limit == 1));
        let offsets: Vec<usize> = requests.iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_failure_on_later_page_aborts() {
        let api = Arc::new(MockContractsApi::new(vec![
            Ok(records_from(json!([{"id": 1}, {"id": 2}]))),
        ]));
        let pause = Arc::new(RecordingPause::default());
        let fetcher = fetcher_for(api.clone(), pause, 3, 2);

        let err = fetcher.fetch_all(&window()).await.unwrap_err();

        assert!(matches!(err, FetchError::Exhausted { attempts: 3, .. }));
        assert_eq!(api.requests().len(), 4);
        assert!(api.requests()[1..].iter().all(|r| r.offset == 2));
    }
}

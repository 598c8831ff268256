use crate::domains::contracts::types::{PageRequest, Record};
use crate::errors::{FetchError, FetchResult};
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Trait for the upstream contracts API
#[async_trait]
pub trait ContractsApi: Send + Sync {
    /// Fetch a single page. One attempt, no retry.
    async fn fetch_page(&self, request: &PageRequest) -> FetchResult<Vec<Record>>;
}

/// Socrata (SODA) implementation of the contracts API
pub struct SocrataContractsApi {
    client: Client,
    base_url: String,
}

impl SocrataContractsApi {
    pub fn new(base_url: &str, timeout: Duration, user_agent: &str) -> FetchResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()
            .map_err(|e| FetchError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }
}

#[async_trait]
impl ContractsApi for SocrataContractsApi {
    async fn fetch_page(&self, request: &PageRequest) -> FetchResult<Vec<Record>> {
        debug!("Requesting page offset={} limit={}", request.offset, request.limit);

        let response = self.client.get(&self.base_url)
            .query(&request.query_pairs())
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await
                .unwrap_or_else(|_| "Unable to get error details".to_string());
            return Err(FetchError::Status { status: status.as_u16(), body });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice::<Vec<Record>>(&bytes)
            .map_err(|e| FetchError::Decode(format!("Expected a JSON array of objects: {}", e)))
    }
}

/// Parse a JSON array literal into records
#[cfg(test)]
pub fn records_from(value: serde_json::Value) -> Vec<Record> {
    serde_json::from_value(value).expect("test records must be an array of objects")
}

/// Scripted implementation for testing. Replays the given results in order and
/// fails every call once the script runs out.
#[cfg(test)]
pub struct MockContractsApi {
    script: std::sync::Mutex<std::collections::VecDeque<FetchResult<Vec<Record>>>>,
    requests: std::sync::Mutex<Vec<PageRequest>>,
}

#[cfg(test)]
impl MockContractsApi {
    pub fn new(script: Vec<FetchResult<Vec<Record>>>) -> Self {
        Self {
            script: std::sync::Mutex::new(script.into_iter().collect()),
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Every request seen so far, in order
    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl ContractsApi for MockContractsApi {
    async fn fetch_page(&self, request: &PageRequest) -> FetchResult<Vec<Record>> {
        self.requests.lock().unwrap().push(request.clone());
        self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(FetchError::Status { status: 500, body: "script exhausted".to_string() })
        })
    }
}

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One contract row as returned by the API, field order preserved
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Timestamp field the day window applies to
pub const TIMESTAMP_FIELD: &str = "fecha_de_firma";

/// A single calendar day of contracts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryWindow {
    day: NaiveDate,
}

impl QueryWindow {
    pub fn new(day: NaiveDate) -> Self {
        Self { day }
    }

    /// The day `days_back` days before `today`, or `None` when the offset is
    /// negative or falls outside the calendar
    pub fn days_back_from(today: NaiveDate, days_back: i64) -> Option<Self> {
        let days = u64::try_from(days_back).ok()?;
        today.checked_sub_days(Days::new(days)).map(Self::new)
    }

    /// Parse a `YYYY-MM-DD` string
    pub fn parse(day: &str) -> Result<Self, chrono::ParseError> {
        NaiveDate::parse_from_str(day.trim(), "%Y-%m-%d").map(Self::new)
    }

    pub fn day(&self) -> NaiveDate {
        self.day
    }

    /// Closed interval over the whole day
    pub fn predicate(&self) -> String {
        format!(
            "{field} between '{day}T00:00:00' and '{day}T23:59:59'",
            field = TIMESTAMP_FIELD,
            day = self,
        )
    }

    /// Object key the day's file is published under
    pub fn object_key(&self) -> String {
        format!("contracts/day={day}/contracts_{day}.csv", day = self)
    }
}

impl fmt::Display for QueryWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.day.format("%Y-%m-%d"))
    }
}

/// Parameters of one page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub select: String,
    pub predicate: String,
    pub limit: usize,
    pub offset: usize,
}

impl PageRequest {
    pub fn first(window: &QueryWindow, limit: usize) -> Self {
        Self {
            select: "*".to_string(),
            predicate: window.predicate(),
            limit,
            offset: 0,
        }
    }

    /// The request for the page after this one
    pub fn next(&self) -> Self {
        Self {
            offset: self.offset + self.limit,
            ..self.clone()
        }
    }

    /// Socrata query string pairs
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("$select", self.select.clone()),
            ("$where", self.predicate.clone()),
            ("$limit", self.limit.to_string()),
            ("$offset", self.offset.to_string()),
        ]
    }
}

/// Outcome of one run, handed back to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub day: String,
    pub count: usize,
    pub location: Option<String>,
}

/// Stages of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Init,
    Fetching,
    Writing,
    Skip,
    Publishing,
    Done,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStage::Init => "INIT",
            RunStage::Fetching => "FETCHING",
            RunStage::Writing => "WRITING",
            RunStage::Skip => "SKIP",
            RunStage::Publishing => "PUBLISHING",
            RunStage::Done => "DONE",
        };
        f.write_str(name)
    }
}

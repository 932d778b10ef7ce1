use chrono::NaiveDate;
use thiserror::Error;

use crate::model::DateRange;

/// Failure of a single page request against the remote API.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error while talking to the data service")]
    Transport(#[source] reqwest::Error),

    #[error("malformed response body")]
    Decode(#[source] serde_json::Error),
}

/// Failure of a whole bulk fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid fetch request: {0}")]
    InvalidRequest(String),

    #[error("failed to fetch chunk {chunk} at offset {offset} after {attempts} attempt(s)")]
    Fetch {
        chunk: DateRange,
        offset: u32,
        attempts: u32,
        #[source]
        source: SourceError,
    },

    #[error("next page after offset {offset} in chunk {chunk} would overflow the offset counter")]
    OffsetOverflow { chunk: DateRange, offset: u32 },

    #[error(
        "no data returned for station '{station}' in {range}.\n\
         Hint: check the token, station id, dataset and dates."
    )]
    NoData { station: String, range: DateRange },
}

impl FetchError {
    pub fn is_no_data(&self) -> bool {
        matches!(self, FetchError::NoData { .. })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("start date {start} is after end date {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },

    #[error("chunk plan contains no chunks")]
    Empty,

    #[error("chunk starting {next} does not directly follow chunk ending {previous}")]
    NotContiguous { previous: NaiveDate, next: NaiveDate },
}

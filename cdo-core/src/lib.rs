//! Core library for the `cdo` CLI.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - The [`PageSource`] seam over the NOAA Climate Data Online API
//! - [`BulkFetcher`], which pages through every chunk of a date range
//! - CSV output and CSV splitting
//!
//! It is used by `cdo-cli`, but can also be reused by other binaries or services.

pub mod chunk;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod model;
pub mod output;
pub mod retry;
pub mod source;
pub mod split;

pub use chunk::{ChunkPlan, ChunkStrategy};
pub use config::{Config, RetryConfig};
pub use error::{FetchError, PlanError, SourceError};
pub use fetcher::BulkFetcher;
pub use model::{DateRange, PageRequest, Record, ResultSet};
pub use retry::RetryPolicy;
pub use source::{CdoSource, PageSource, SourceSettings, Units};

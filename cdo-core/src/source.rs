use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fmt::Debug};

use crate::{
    error::SourceError,
    model::{PageRequest, Record},
};

pub mod cdo;

pub use cdo::{CdoSource, SourceSettings};

/// Unit system the service reports values in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Standard,
}

impl Units {
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Metric => "metric",
            Units::Standard => "standard",
        }
    }

    pub const fn all() -> &'static [Units] {
        &[Units::Metric, Units::Standard]
    }
}

impl std::fmt::Display for Units {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Units {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "metric" => Ok(Units::Metric),
            "standard" => Ok(Units::Standard),
            _ => Err(anyhow::anyhow!("Unknown unit system '{value}'. Supported units: metric, standard.")),
        }
    }
}

/// One page of records per call. An empty page means the query is exhausted.
#[async_trait]
pub trait PageSource: Send + Sync + Debug {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<Record>, SourceError>;
}

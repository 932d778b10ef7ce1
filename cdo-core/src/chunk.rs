use std::{convert::TryFrom, fmt};

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{error::PlanError, model::DateRange};

/// How a requested range is cut into independently paginated chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkStrategy {
    /// One chunk covering the whole range; pagination alone covers it.
    #[default]
    WholeRange,
    /// One chunk per calendar month, clipped to the range boundaries.
    Monthly,
}

impl ChunkStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStrategy::WholeRange => "whole-range",
            ChunkStrategy::Monthly => "monthly",
        }
    }

    pub const fn all() -> &'static [ChunkStrategy] {
        &[ChunkStrategy::WholeRange, ChunkStrategy::Monthly]
    }

    pub fn plan(&self, range: DateRange) -> ChunkPlan {
        let chunks = match self {
            ChunkStrategy::WholeRange => vec![range],
            ChunkStrategy::Monthly => monthly_chunks(range),
        };
        ChunkPlan { range, chunks }
    }
}

impl fmt::Display for ChunkStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ChunkStrategy {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "whole-range" | "whole" => Ok(ChunkStrategy::WholeRange),
            "monthly" | "month" => Ok(ChunkStrategy::Monthly),
            _ => Err(anyhow::anyhow!(
                "Unknown chunking strategy '{value}'. Supported strategies: whole-range, monthly."
            )),
        }
    }
}

/// Ordered, contiguous, non-overlapping chunks that exactly cover `range`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    range: DateRange,
    chunks: Vec<DateRange>,
}

impl ChunkPlan {
    /// Builds a plan from explicit chunks, checking that each one starts the day
    /// after the previous one ends.
    pub fn from_chunks(chunks: Vec<DateRange>) -> Result<Self, PlanError> {
        let (first, last) = match (chunks.first(), chunks.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Err(PlanError::Empty),
        };

        for pair in chunks.windows(2) {
            let (previous, next) = (pair[0].end(), pair[1].start());
            if previous.succ_opt() != Some(next) {
                return Err(PlanError::NotContiguous { previous, next });
            }
        }

        let range = DateRange::new(first.start(), last.end())?;
        Ok(Self { range, chunks })
    }

    pub fn range(&self) -> DateRange {
        self.range
    }

    pub fn chunks(&self) -> &[DateRange] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

fn monthly_chunks(range: DateRange) -> Vec<DateRange> {
    let mut chunks = Vec::new();
    let mut start = range.start();

    loop {
        let end = last_day_of_month(start).min(range.end());
        chunks.push(DateRange::new(start, end).unwrap_or(range));

        match end.succ_opt() {
            Some(next) if end < range.end() => start = next,
            _ => break,
        }
    }

    chunks
}

fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1)
        .and_then(|first| first.checked_add_months(Months::new(1)))
        .and_then(|next_first| next_first.pred_opt())
        .unwrap_or(NaiveDate::MAX)
}

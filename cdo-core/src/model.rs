use std::fmt;

use chrono::{Datelike, NaiveDate};

use crate::error::PlanError;

/// One observation row as returned by the data service, in the service's field order.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, PlanError> {
        if start > end {
            return Err(PlanError::InvertedRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// January 1st through December 31st of `year`.
    pub fn year(year: i32) -> Option<Self> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1)?;
        let end = NaiveDate::from_ymd_opt(year, 12, 31)?;
        Some(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Returns the year if the range is exactly one calendar year.
    pub fn whole_year(&self) -> Option<i32> {
        let year = self.start.year();
        (Self::year(year) == Some(*self)).then_some(year)
    }

    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// A single page query. Only `offset` changes while paging through a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub chunk: DateRange,
    pub station_id: String,
    pub offset: u32,
    pub limit: u32,
}

impl PageRequest {
    /// Moves to the next page. Returns `None`, leaving the offset unchanged, when the
    /// next offset does not fit in a `u32`.
    pub fn advance(&mut self) -> Option<u32> {
        self.offset = self.offset.checked_add(self.limit)?;
        Some(self.offset)
    }
}

/// Records accumulated over every page of every chunk, in fetch order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    records: Vec<Record>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, page: Vec<Record>) {
        self.records.extend(page);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Union of every record's field names: the first record's order, then new
    /// names in the order they are first seen.
    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for record in &self.records {
            for key in record.keys() {
                if !names.iter().any(|n| n == key) {
                    names.push(key.clone());
                }
            }
        }
        names
    }

    /// True when some record's field set differs from the first record's.
    pub fn is_heterogeneous(&self) -> bool {
        let Some(first) = self.records.first() else {
            return false;
        };
        self.records.iter().skip(1).any(|r| {
            r.len() != first.len() || r.keys().any(|k| !first.contains_key(k))
        })
    }
}

impl From<Vec<Record>> for ResultSet {
    fn from(records: Vec<Record>) -> Self {
        Self { records }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = DateRange::new(date(2024, 2, 1), date(2024, 1, 31)).unwrap_err();
        assert!(matches!(err, PlanError::InvertedRange { .. }));
    }

    #[test]
    fn single_day_range_is_valid() {
        let range = DateRange::new(date(2024, 3, 3), date(2024, 3, 3)).unwrap();
        assert_eq!(range.num_days(), 1);
        assert_eq!(range.days().collect::<Vec<_>>(), vec![date(2024, 3, 3)]);
    }

    #[test]
    fn whole_year_detection() {
        let leap = DateRange::year(2024).unwrap();
        assert_eq!(leap.num_days(), 366);
        assert_eq!(leap.whole_year(), Some(2024));

        let partial = DateRange::new(date(2024, 1, 1), date(2024, 12, 30)).unwrap();
        assert_eq!(partial.whole_year(), None);
        assert_eq!(partial.to_string(), "2024-01-01..2024-12-30");
    }

    #[test]
    fn page_request_advances_by_limit() {
        let mut req = PageRequest {
            chunk: DateRange::year(2024).unwrap(),
            station_id: "GHCND:USW00094728".into(),
            offset: 1,
            limit: 1000,
        };
        req.advance();
        assert_eq!(req.advance(), Some(2001));
        assert_eq!(req.offset, 2001);
    }

    #[test]
    fn page_request_refuses_to_wrap() {
        let mut req = PageRequest {
            chunk: DateRange::year(2024).unwrap(),
            station_id: "S".into(),
            offset: u32::MAX - 10,
            limit: 1000,
        };
        assert_eq!(req.advance(), None);
        assert_eq!(req.offset, u32::MAX - 10);
    }

    #[test]
    fn field_names_are_union_in_first_seen_order() {
        let set = ResultSet::from(vec![
            record(json!({"date": "2024-01-01", "datatype": "TMAX", "value": 5})),
            record(json!({"date": "2024-01-02", "value": 6, "attributes": ",,S,"})),
        ]);

        assert_eq!(set.field_names(), vec!["date", "datatype", "value", "attributes"]);
        assert!(set.is_heterogeneous());
    }

    #[test]
    fn uniform_records_are_not_heterogeneous() {
        let set = ResultSet::from(vec![
            record(json!({"a": 1, "b": 2})),
            record(json!({"b": 3, "a": 4})),
        ]);
        assert!(!set.is_heterogeneous());
        assert_eq!(set.field_names(), vec!["a", "b"]);
    }
}

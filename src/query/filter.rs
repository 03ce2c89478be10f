use super::QueryFilter;
use crate::api::QueryParams;
use crate::serial::{parse_serial_query, Serial, SerialQueryError};
use chrono::{Duration, Local, NaiveDate};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("Pick a start date, an end date, or both")]
    EmptyDateRange,
    #[error(transparent)]
    Serial(#[from] SerialQueryError),
}

/// The unfiltered list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListFilter;

impl QueryFilter for ListFilter {
    const SORTABLE: bool = false;

    fn apply_params(&self, _params: &mut QueryParams) {}
}

/// Creation-date range; either bound may be open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRangeFilter {
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

impl DateRangeFilter {
    pub fn new(
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Self, FilterError> {
        if start_date.is_none() && end_date.is_none() {
            return Err(FilterError::EmptyDateRange);
        }
        Ok(DateRangeFilter {
            start_date,
            end_date,
        })
    }

    pub fn today() -> Self {
        Self::ending_today(0)
    }

    pub fn last_7_days() -> Self {
        Self::ending_today(6)
    }

    pub fn last_30_days() -> Self {
        Self::ending_today(29)
    }

    /// Inclusive range of `days_back + 1` days ending on `today`
    pub fn ending_on(today: NaiveDate, days_back: i64) -> Self {
        DateRangeFilter {
            start_date: Some(today - Duration::days(days_back)),
            end_date: Some(today),
        }
    }

    fn ending_today(days_back: i64) -> Self {
        Self::ending_on(Local::now().date_naive(), days_back)
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.start_date
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.end_date
    }
}

impl QueryFilter for DateRangeFilter {
    const SORTABLE: bool = true;

    fn apply_params(&self, params: &mut QueryParams) {
        if let Some(start) = self.start_date {
            params.push("startDate", start.format("%Y-%m-%d").to_string());
        }
        if let Some(end) = self.end_date {
            params.push("endDate", end.format("%Y-%m-%d").to_string());
        }
    }
}

/// Exact serial or inclusive serial range
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialFilter {
    Exact(Serial),
    Range { start: Serial, end: Serial },
}

impl SerialFilter {
    /// Parse operator input such as `12`, `1-20` or `20 ~ 1`
    pub fn parse(input: &str) -> Result<Self, FilterError> {
        let query = parse_serial_query(input)?;
        if query.is_exact() {
            Ok(SerialFilter::Exact(query.from))
        } else {
            Ok(SerialFilter::Range {
                start: query.from,
                end: query.to,
            })
        }
    }
}

impl QueryFilter for SerialFilter {
    const SORTABLE: bool = true;

    fn apply_params(&self, params: &mut QueryParams) {
        match self {
            SerialFilter::Exact(serial) => {
                params.push("serial", serial.as_str());
            }
            SerialFilter::Range { start, end } => {
                params
                    .push("startSerial", start.as_str())
                    .push("endSerial", end.as_str());
            }
        }
    }
}

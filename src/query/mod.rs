// # List and search state
//
// One generic state machine (`QueryState<F>`) drives the unfiltered list, the
// date search and the serial search. Each binding differs only in its filter
// type, which decides the query parameters sent to the backend.
//
// - **state**: records, paging, error slot, optimistic edits
// - **filter**: the three filter types
// - **controller**: ties a state to a `QrBackend`

mod controller;
mod filter;
mod state;

pub use controller::QueryController;
pub use filter::{DateRangeFilter, FilterError, ListFilter, SerialFilter};
pub use state::{LoadStatus, Outcome, QueryState};

use crate::api::QueryParams;
use crate::models::QrRecord;

pub type ListQuery = QueryState<ListFilter>;
pub type DateSearch = QueryState<DateRangeFilter>;
pub type SerialSearch = QueryState<SerialFilter>;

/// How the backend numbers its pages. The UI always counts from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageBase {
    #[default]
    Zero,
    One,
}

impl PageBase {
    /// Convert a 1-based UI page into the page sent on the wire
    pub fn wire_page(self, ui_page: u32) -> u32 {
        match self {
            PageBase::Zero => ui_page.saturating_sub(1),
            PageBase::One => ui_page,
        }
    }
}

/// Filter bound to one query state
pub trait QueryFilter: Clone + Send + Sync {
    /// Whether the endpoint honours a `sort` parameter
    const SORTABLE: bool;

    /// Append this filter's parameters
    fn apply_params(&self, params: &mut QueryParams);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Sort order sent as `sort=field,asc|desc`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder {
    pub field: String,
    pub direction: SortDirection,
}

impl SortOrder {
    pub fn asc(field: impl Into<String>) -> Self {
        SortOrder {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        SortOrder {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    pub fn param_value(&self) -> String {
        let dir = match self.direction {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        };
        format!("{},{}", self.field, dir)
    }
}

/// A fetch issued against a query state
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest<F> {
    /// 1-based page
    pub page: u32,
    /// Concatenate onto the current records instead of replacing them
    pub append: bool,
    pub filter: F,
    pub sort: Option<SortOrder>,
}

impl<F> QueryRequest<F> {
    pub fn new(page: u32, filter: F) -> Self {
        QueryRequest {
            page: page.max(1),
            append: false,
            filter,
            sort: None,
        }
    }

    pub fn append(mut self) -> Self {
        self.append = true;
        self
    }

    pub fn sorted(mut self, sort: SortOrder) -> Self {
        self.sort = Some(sort);
        self
    }
}

impl<F: QueryFilter> QueryRequest<F> {
    /// Wire parameters: page, then filter, then sort when the endpoint takes one
    pub fn params(&self, base: PageBase) -> QueryParams {
        let mut params = QueryParams::new();
        params.push("page", base.wire_page(self.page).to_string());
        self.filter.apply_params(&mut params);
        if F::SORTABLE {
            if let Some(sort) = &self.sort {
                params.push("sort", sort.param_value());
            }
        }
        params
    }
}

/// A successful page of results
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPage {
    pub items: Vec<QrRecord>,
    pub page: u32,
    pub total: u64,
    pub next_cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_wire_page() {
        assert_eq!(PageBase::Zero.wire_page(1), 0);
        assert_eq!(PageBase::Zero.wire_page(5), 4);
        assert_eq!(PageBase::Zero.wire_page(0), 0);
        assert_eq!(PageBase::One.wire_page(5), 5);
    }

    #[test]
    fn test_list_sends_only_page() {
        let req = QueryRequest::new(3, ListFilter).sorted(SortOrder::desc("serial"));
        let params = req.params(PageBase::Zero);
        assert_eq!(params.pairs(), &[("page".to_string(), "2".to_string())]);
    }

    #[test]
    fn test_search_params_include_sort() {
        let filter = DateRangeFilter::new(NaiveDate::from_ymd_opt(2025, 9, 1), None).unwrap();
        let req = QueryRequest::new(1, filter).sorted(SortOrder::asc("createdDate"));
        let params = req.params(PageBase::One);
        assert_eq!(params.get("page"), Some("1"));
        assert_eq!(params.get("startDate"), Some("2025-09-01"));
        assert_eq!(params.get("endDate"), None);
        assert_eq!(params.get("sort"), Some("createdDate,asc"));
    }
}

//! Query and page models shared by the source adapters.

use serde::{Deserialize, Serialize};

use super::Record;

/// Search query parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Main search query string
    pub query: String,

    /// Maximum number of records to return (clamped by each adapter)
    pub limit: usize,

    /// Number of records to skip, for offset-paginated sources
    pub offset: usize,

    /// Opaque continuation token, for cursor-paginated sources
    pub cursor: Option<String>,

    /// Year filter (single year, range like "2018-2022", or "2010-" for from, "-2015" for until)
    pub year: Option<String>,

    /// Category/subject filter
    pub category: Option<String>,

    /// Status filter (e.g. trial recruitment status)
    pub status: Option<String>,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            query: String::new(),
            limit: 10,
            offset: 0,
            cursor: None,
            year: None,
            category: None,
            status: None,
        }
    }
}

impl SearchQuery {
    /// Create a new search query
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Set maximum results
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Set offset
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Set continuation cursor
    pub fn cursor(mut self, cursor: Option<String>) -> Self {
        self.cursor = cursor.filter(|c| !c.is_empty());
        self
    }

    /// Set year filter
    pub fn year(mut self, year: impl Into<String>) -> Self {
        self.year = Some(year.into());
        self
    }

    /// Set category filter
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Set status filter
    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

/// One page of records produced by an adapter call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Records in upstream order
    pub records: Vec<Record>,

    /// Token for the next page, if the upstream reports more
    pub cursor: Option<String>,
}

impl Page {
    /// Create a page without continuation
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            cursor: None,
        }
    }

    /// Empty page
    pub fn empty() -> Self {
        Self::default()
    }

    /// Set the continuation cursor
    pub fn cursor(mut self, cursor: Option<String>) -> Self {
        self.cursor = cursor;
        self
    }

    /// Page holding a single record
    pub fn single(record: Record) -> Self {
        Self::new(vec![record])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_query_builder() {
        let query = SearchQuery::new("crispr")
            .limit(25)
            .offset(50)
            .year("2020-2022")
            .category("genomics");

        assert_eq!(query.query, "crispr");
        assert_eq!(query.limit, 25);
        assert_eq!(query.offset, 50);
        assert_eq!(query.year.as_deref(), Some("2020-2022"));
        assert_eq!(query.category.as_deref(), Some("genomics"));
    }

    #[test]
    fn test_empty_cursor_ignored() {
        let query = SearchQuery::new("x").cursor(Some(String::new()));
        assert!(query.cursor.is_none());
    }
}

//! Pagination over a query

use serde::Serialize;

use super::collection::Collection;
use super::error::Result;
use super::query::Query;

pub const DEFAULT_PER_PAGE: u64 = 30;

#[derive(Debug, Clone)]
pub struct Pager {
    query: Query,
    page: u64,
    per_page: u64,
}

/// Page position and totals, as returned to API callers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSummary {
    pub page: u64,
    pub per_page: u64,
    pub total_count: usize,
    pub pages: u64,
}

impl Pager {
    /// Pages are 1-based; zero is read as the first page
    pub fn new(query: Query, page: u64, per_page: u64) -> Self {
        let mut pager = Self {
            query,
            page: page.max(1),
            per_page: per_page.max(1),
        };
        pager.apply();
        pager
    }

    fn apply(&mut self) {
        let query = self.query.clone();
        self.query = query.limit(Some(self.per_page), Some(self.offset()));
    }

    pub fn set_page(&mut self, page: u64) {
        self.page = page.max(1);
        self.apply();
    }

    pub fn set_per_page(&mut self, per_page: u64) {
        self.per_page = per_page.max(1);
        self.apply();
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn per_page(&self) -> u64 {
        self.per_page
    }

    pub fn offset(&self) -> u64 {
        (self.page - 1) * self.per_page
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Records on the current page
    pub fn items(&self) -> Result<&Collection> {
        self.query.execute()
    }

    /// Records across all pages, counted on an unlimited copy of the query
    pub fn total(&self) -> Result<usize> {
        self.query.clone().limit(None, None).count()
    }

    pub fn pages(&self) -> Result<u64> {
        let total = self.total()? as u64;
        Ok(total.div_ceil(self.per_page))
    }

    pub fn has_next(&self) -> Result<bool> {
        Ok(self.page < self.pages()?)
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn summary(&self) -> Result<PageSummary> {
        let total_count = self.total()?;
        Ok(PageSummary {
            page: self.page,
            per_page: self.per_page,
            total_count,
            pages: (total_count as u64).div_ceil(self.per_page),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::adapter::connect;
    use crate::engine::config::DatabaseConfig;
    use crate::engine::log::NullQueryLog;
    use crate::engine::mapper::Mapper;
    use crate::engine::query::SortDirection;
    use crate::engine::schema::{FieldDef, Schema};
    use serde_json::json;
    use std::rc::Rc;

    fn numbers(count: i64) -> Mapper {
        let adapters = connect(&DatabaseConfig::sqlite_memory(), Rc::new(NullQueryLog)).unwrap();
        let schema = Schema::builder("numbers")
            .field(FieldDef::int("id").primary().serial())
            .field(FieldDef::int("n"))
            .build();
        let mapper = Mapper::new(schema, adapters).unwrap();
        mapper.migrate().unwrap();
        for n in 1..=count {
            let mut e = mapper.entity();
            e.set("n", n);
            mapper.save(&mut e).unwrap();
        }
        mapper
    }

    #[test]
    fn test_pages_and_items() {
        let mapper = numbers(7);
        let query = mapper.select().order("n", SortDirection::Asc);
        let mut pager = Pager::new(query, 2, 3);

        assert_eq!(pager.offset(), 3);
        assert_eq!(pager.items().unwrap().pluck("n"), vec![json!(4), json!(5), json!(6)]);
        assert_eq!(pager.total().unwrap(), 7);
        assert_eq!(pager.pages().unwrap(), 3);
        assert!(pager.has_next().unwrap());
        assert!(pager.has_previous());

        pager.set_page(3);
        assert_eq!(pager.items().unwrap().len(), 1);
        assert!(!pager.has_next().unwrap());
    }

    #[test]
    fn test_summary_serializes_camel_case() {
        let mapper = numbers(4);
        let pager = Pager::new(mapper.select(), 0, DEFAULT_PER_PAGE);
        assert_eq!(pager.page(), 1);

        let summary = serde_json::to_value(pager.summary().unwrap()).unwrap();
        assert_eq!(
            summary,
            json!({"page": 1, "perPage": 30, "totalCount": 4, "pages": 1})
        );
    }
}

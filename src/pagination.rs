//! This modules defines the common functionality for paging data.

use serde::Deserialize;

use crate::FamilyId;

/// The config for pagination
#[derive(Debug, Clone)]
pub struct PaginationConfig {
    /// The number of items to return when the request does not specify a limit.
    pub default_limit: u64,
    /// The largest limit a request may ask for, larger values are clamped.
    pub max_limit: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: 100,
            max_limit: 500,
        }
    }
}

impl PaginationConfig {
    /// Resolve the `skip` and `limit` query parameters into a [Paging].
    pub fn paging(&self, skip: Option<u64>, limit: Option<u64>) -> Paging {
        let limit = limit.unwrap_or(self.default_limit).min(self.max_limit);

        Paging {
            offset: i64::try_from(skip.unwrap_or(0)).unwrap_or(i64::MAX),
            limit: i64::try_from(limit).unwrap_or(i64::MAX),
        }
    }
}

/// An offset/limit window over a list, ready to bind to an SQL query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    /// How many rows to skip.
    pub offset: i64,
    /// The maximum number of rows to return.
    pub limit: i64,
}

/// The query parameters for list endpoints that are not scoped by family.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    /// How many items to skip.
    pub skip: Option<u64>,
    /// How many items to return at most.
    pub limit: Option<u64>,
}

impl PageQuery {
    /// The paging window for this query.
    pub fn paging(&self, config: &PaginationConfig) -> Paging {
        config.paging(self.skip, self.limit)
    }
}

/// The query parameters shared by the family-scoped list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Only list items from this family. When absent, the caller's own items
    /// across all their families are listed.
    pub family_id: Option<FamilyId>,
    /// How many items to skip.
    pub skip: Option<u64>,
    /// How many items to return at most.
    pub limit: Option<u64>,
}

impl ListQuery {
    /// The paging window for this query.
    pub fn paging(&self, config: &PaginationConfig) -> Paging {
        config.paging(self.skip, self.limit)
    }
}

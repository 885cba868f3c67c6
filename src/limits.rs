/// Upper bound on cached days; see `AvailabilityCache::put`.
pub const MAX_CACHE_ENTRIES: usize = 512;

/// Page size requested from the upstream events endpoint.
pub const UPSTREAM_PAGE_LIMIT: usize = 1000;

/// Stop paging after this many pages (10k events per day).
pub const MAX_UPSTREAM_PAGES: usize = 10;

/// Longest accepted query-parameter value.
pub const MAX_QUERY_PARAM_LEN: usize = 64;

/// Refresh the upstream bearer token this long before it expires.
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 30;

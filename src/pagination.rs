//! Page number + page size. Offset is always derived, never stored.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PaginationWire")]
pub struct Pagination {
    page: u32,
    limit: u32,
}

/// Untrusted shape; every decoded value goes through the same clamps as
/// `new` and `go_to`.
#[derive(Deserialize)]
struct PaginationWire {
    #[serde(default)]
    page: i64,
    #[serde(default)]
    limit: u32,
}

impl From<PaginationWire> for Pagination {
    fn from(w: PaginationWire) -> Self {
        Pagination::new(w.limit).go_to(w.page)
    }
}

impl Pagination {
    /// Page 1 of size `limit` (clamped to at least 1).
    pub fn new(limit: u32) -> Self {
        Self { page: 1, limit: limit.max(1) }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// `(page - 1) * limit`
    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.limit as u64
    }

    /// Jump to `page`, clamped to at least 1. No upper bound: a page past the
    /// end of the data is an empty page, not an error.
    pub fn go_to(&self, page: i64) -> Self {
        let page = page.clamp(1, u32::MAX as i64) as u32;
        Self { page, limit: self.limit }
    }

    pub fn next(&self) -> Self {
        self.go_to(self.page as i64 + 1)
    }

    pub fn prev(&self) -> Self {
        self.go_to(self.page as i64 - 1)
    }

    pub fn reset(&self) -> Self {
        Self { page: 1, limit: self.limit }
    }

    /// New page size; the page goes back to 1 since old page numbers
    /// refer to a differently sized slicing.
    pub fn with_limit(&self, limit: u32) -> Self {
        Self::new(limit)
    }

    /// Number of pages needed for `count` records (0 for an empty set).
    pub fn total_pages(&self, count: u64) -> u64 {
        count.div_ceil(self.limit as u64)
    }

    /// Whether a further page could exist given a known total.
    pub fn has_next(&self, count: u64) -> bool {
        (self.page as u64) < self.total_pages(count)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(20)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_third_page() {
        let p = Pagination::new(20).go_to(3);
        assert_eq!(p.offset(), 40);
    }

    #[test]
    fn test_offset_matches_formula() {
        for limit in [1u32, 7, 20, 100] {
            for page in 1..50i64 {
                let p = Pagination::new(limit).go_to(page);
                assert_eq!(p.offset(), (page as u64 - 1) * limit as u64);
            }
        }
    }

    #[test]
    fn test_go_to_clamps_low() {
        let p = Pagination::new(10);
        assert_eq!(p.go_to(0).page(), 1);
        assert_eq!(p.go_to(-5).page(), 1);
        assert_eq!(p.prev().page(), 1);
    }

    #[test]
    fn test_reset_keeps_limit() {
        let p = Pagination::new(15).go_to(9).reset();
        assert_eq!(p.page(), 1);
        assert_eq!(p.limit(), 15);
    }

    #[test]
    fn test_zero_limit_clamped() {
        assert_eq!(Pagination::new(0).limit(), 1);
    }

    #[test]
    fn test_total_pages() {
        let p = Pagination::new(20);
        assert_eq!(p.total_pages(0), 0);
        assert_eq!(p.total_pages(20), 1);
        assert_eq!(p.total_pages(41), 3);
        assert!(p.has_next(41));
        assert!(!p.go_to(3).has_next(41));
    }

    #[test]
    fn test_total_pages_huge_count() {
        let p = Pagination::new(20);
        assert_eq!(p.total_pages(u64::MAX), u64::MAX / 20 + 1);
        assert!(p.has_next(u64::MAX));
        assert_eq!(Pagination::new(1).total_pages(u64::MAX), u64::MAX);
    }

    #[test]
    fn test_decoded_state_is_clamped() {
        let p: Pagination = serde_json::from_value(serde_json::json!({"page": 0, "limit": 0})).unwrap();
        assert_eq!((p.page(), p.limit()), (1, 1));
        assert_eq!(p.offset(), 0);
        assert_eq!(p.total_pages(5), 5);

        let p: Pagination = serde_json::from_value(serde_json::json!({"page": -4})).unwrap();
        assert_eq!(p.page(), 1);

        let p: Pagination = serde_json::from_value(serde_json::json!({"page": 3, "limit": 20})).unwrap();
        assert_eq!(p.offset(), 40);
        assert_eq!(serde_json::from_value::<Pagination>(serde_json::to_value(p).unwrap()).unwrap(), p);
    }
}

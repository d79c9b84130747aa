//! Roster Types - Pure type definitions
//!
//! Entities, request bodies and response shapes shared by the repository
//! port and the HTTP server. No async runtime dependencies.

pub mod group;
pub mod user;

pub use group::*;
pub use user::*;

use serde::{Deserialize, Serialize};

/// System-assigned user identity
pub type UserId = i64;

/// System-assigned group identity
pub type GroupId = i64;

/// Default page size for listings
pub const DEFAULT_LIMIT: u32 = 10;

/// Offset/limit window over an id-ordered listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub skip: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

impl Default for Page {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Page {
    pub fn new(skip: u32, limit: u32) -> Self {
        Self { skip, limit }
    }

    /// Slice an already ordered sequence to this window
    pub fn apply<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.skip as usize)
            .take(self.limit as usize)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_defaults_from_empty_query() {
        let page: Page = serde_json::from_str("{}").unwrap();
        assert_eq!(page, Page::new(0, 10));
    }

    #[test]
    fn test_page_apply_out_of_range() {
        let page = Page::new(5, 10);
        assert!(page.apply(vec![1, 2, 3]).is_empty());

        let page = Page::new(1, 1);
        assert_eq!(page.apply(vec![1, 2, 3]), vec![2]);
    }
}

//! Paged node storage.
//!
//! - Page-based node storage with configurable page size
//! - LRU cache for hot pages; dirty pages are written before eviction
//! - Lazy loading of nodes on demand (never loads all pages at once)
//! - Free-page chain and continuation pages for oversized nodes

pub mod cache;
pub mod constants;
pub mod header;
pub mod page_file;
pub mod store;

pub use cache::PageCache;
pub use constants::{DEFAULT_CACHE_PAGES, DEFAULT_PAGE_SIZE};
pub use header::{FileHeader, FileMeta, PageKind, PageRecord, TreeHeader};
pub use page_file::{PageFile, PageFileStats, PageNode};
pub use store::{FilePageStore, MemoryPageStore, PageStore};

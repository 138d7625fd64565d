//! LRU cache for decoded pages.
//!
//! The cache holds the only live copy of every page it contains. Callers get
//! clones out of the page file, never references into the cache. Eviction is
//! driven by the page file so that dirty pages can be written before they
//! leave memory.

use std::num::NonZeroUsize;

use lru::LruCache;

use crate::types::PageId;

/// A cached page with its data and dirty flag
pub struct CachedPage<N> {
    pub node: N,
    pub dirty: bool,
}

/// LRU cache of decoded nodes, bounded by a page count.
pub struct PageCache<N> {
    pages: LruCache<PageId, CachedPage<N>>,
    /// `None` means unbounded
    max_pages: Option<NonZeroUsize>,
}

impl<N> PageCache<N> {
    /// Create a new page cache; a capacity of 0 never evicts.
    pub fn new(max_pages: usize) -> Self {
        Self {
            pages: LruCache::unbounded(),
            max_pages: NonZeroUsize::new(max_pages),
        }
    }

    /// Get a page, marking it most recently used.
    pub fn get(&mut self, page_id: PageId) -> Option<&N> {
        self.pages.get(&page_id).map(|cached| &cached.node)
    }

    /// Get a mutable reference to a page, marking it dirty
    pub fn get_mut(&mut self, page_id: PageId) -> Option<&mut N> {
        self.pages.get_mut(&page_id).map(|cached| {
            cached.dirty = true;
            &mut cached.node
        })
    }

    /// Insert or replace a page. A page that was already dirty stays dirty.
    pub fn insert(&mut self, page_id: PageId, node: N, dirty: bool) {
        let was_dirty = self
            .pages
            .peek(&page_id)
            .map(|cached| cached.dirty)
            .unwrap_or(false);
        self.pages.put(
            page_id,
            CachedPage {
                node,
                dirty: dirty || was_dirty,
            },
        );
    }

    /// True when one more insert would exceed the capacity.
    pub fn needs_eviction(&self) -> bool {
        match self.max_pages {
            Some(max) => self.pages.len() >= max.get(),
            None => false,
        }
    }

    /// Remove the least recently used page (returns page_id, node, dirty flag)
    pub fn evict_oldest(&mut self) -> Option<(PageId, N, bool)> {
        self.pages
            .pop_lru()
            .map(|(page_id, cached)| (page_id, cached.node, cached.dirty))
    }

    /// Ids of all dirty pages, ascending.
    pub fn dirty_pages(&self) -> Vec<PageId> {
        let mut ids: Vec<PageId> = self
            .pages
            .iter()
            .filter(|(_, cached)| cached.dirty)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Looks at a page without touching the LRU order.
    pub fn peek(&self, page_id: PageId) -> Option<&N> {
        self.pages.peek(&page_id).map(|cached| &cached.node)
    }

    pub fn mark_clean(&mut self, page_id: PageId) {
        if let Some(cached) = self.pages.peek_mut(&page_id) {
            cached.dirty = false;
        }
    }

    pub fn remove(&mut self, page_id: PageId) -> Option<(N, bool)> {
        self.pages.pop(&page_id).map(|c| (c.node, c.dirty))
    }

    /// Drop every cached page, returning them with their dirty flags.
    pub fn clear(&mut self) -> Vec<(PageId, N, bool)> {
        let mut result = Vec::with_capacity(self.pages.len());
        while let Some((id, cached)) = self.pages.pop_lru() {
            result.push((id, cached.node, cached.dirty));
        }
        result
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn contains(&self, page_id: PageId) -> bool {
        self.pages.contains(&page_id)
    }
}

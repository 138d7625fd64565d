//! The page file: page-id allocation, LRU caching and page encoding on top
//! of a [`PageStore`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, error, info};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::cache::PageCache;
use super::constants::RECORD_OVERHEAD;
use super::header::{FileMeta, PageKind, PageRecord};
use super::store::PageStore;
use crate::errors::{IndexError, IndexResult};
use crate::types::PageId;

/// Internal statistics tracking
struct PageFileStatistics {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    page_reads: AtomicU64,
    page_writes: AtomicU64,
}

impl PageFileStatistics {
    fn new() -> Self {
        Self {
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            page_reads: AtomicU64::new(0),
            page_writes: AtomicU64::new(0),
        }
    }
}

/// Anything that can live in a page: cloned out of the cache, bincode on disk.
pub trait PageNode: Clone + Serialize + DeserializeOwned {}

impl<T: Clone + Serialize + DeserializeOwned> PageNode for T {}

/// A snapshot of page file counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageFileStats {
    pub cached_pages: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub page_reads: u64,
    pub page_writes: u64,
    pub allocated_pages: u64,
    pub free_pages: u64,
}

/// Paged node storage with an LRU cache.
///
/// All methods take `&self`; the cache, metadata and store are guarded by
/// their own locks. Lock order is cache, chains, meta, store.
pub struct PageFile<N: PageNode> {
    store: Box<dyn PageStore>,
    cache: RwLock<PageCache<N>>,
    meta: RwLock<FileMeta>,
    /// Continuation pages of every node page seen since open.
    chains: RwLock<HashMap<PageId, Vec<PageId>>>,
    stats: PageFileStatistics,
    closed: RwLock<bool>,
}

impl<N: PageNode> PageFile<N> {
    /// Starts a fresh page file on `store`.
    pub fn create(store: Box<dyn PageStore>, cache_pages: usize) -> IndexResult<Self> {
        let reserved = store.read_meta()?.map(|m| m.reserved_pages).unwrap_or(0);
        let meta = FileMeta::new(reserved);
        store.write_meta(&meta)?;
        Ok(Self::with_meta(store, cache_pages, meta))
    }

    /// Opens the page file already present on `store`.
    ///
    /// This does NOT load any node. Only the metadata is read.
    pub fn open(store: Box<dyn PageStore>, cache_pages: usize) -> IndexResult<Self> {
        let meta = match store.read_meta()? {
            Some(meta) => meta,
            None => {
                error!("Store holds no page file metadata");
                return Err(IndexError::Corrupted("missing file metadata".into()));
            }
        };
        info!(
            "Opened page file: {} pages, {} free",
            meta.next_page_id, meta.free_page_count
        );
        Ok(Self::with_meta(store, cache_pages, meta))
    }

    fn with_meta(store: Box<dyn PageStore>, cache_pages: usize, meta: FileMeta) -> Self {
        Self {
            store,
            cache: RwLock::new(PageCache::new(cache_pages)),
            meta: RwLock::new(meta),
            chains: RwLock::new(HashMap::new()),
            stats: PageFileStatistics::new(),
            closed: RwLock::new(false),
        }
    }

    fn check_closed(&self) -> IndexResult<()> {
        if *self.closed.read() {
            Err(IndexError::Closed)
        } else {
            Ok(())
        }
    }

    fn check_range(&self, page_id: PageId) -> IndexResult<()> {
        let next_page_id = self.meta.read().next_page_id;
        if page_id >= next_page_id {
            error!(
                "Page {} requested beyond allocated range {}",
                page_id, next_page_id
            );
            return Err(IndexError::PageOutOfRange {
                page_id,
                next_page_id,
            });
        }
        Ok(())
    }

    pub fn page_size(&self) -> usize {
        self.store.page_size()
    }

    /// Bytes of encoded node that fit into a single page.
    pub fn payload_capacity(&self) -> usize {
        self.store.page_size().saturating_sub(RECORD_OVERHEAD)
    }

    pub fn is_persistent(&self) -> bool {
        self.store.is_persistent()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.read()
    }

    /// Read a node - first checks the cache, then decodes from the store.
    pub fn read_page(&self, page_id: PageId) -> IndexResult<N> {
        self.check_closed()?;
        self.check_range(page_id)?;
        {
            let mut cache = self.cache.write();
            if let Some(node) = cache.get(page_id) {
                self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(node.clone());
            }
        }

        self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);
        let node = self.load_node(page_id)?;
        self.cache_node(page_id, node.clone(), false)?;
        Ok(node)
    }

    /// Write a node to the cache (marked dirty for later flush)
    pub fn write_page(&self, page_id: PageId, node: N) -> IndexResult<()> {
        self.check_closed()?;
        self.check_range(page_id)?;
        self.cache_node(page_id, node, true)
    }

    /// Allocate a page id, reusing the head of the free chain if any.
    pub fn allocate_page(&self) -> IndexResult<PageId> {
        self.check_closed()?;
        self.allocate_page_id()
    }

    /// Return a page (and its continuation pages) to the free chain.
    pub fn free_page(&self, page_id: PageId) -> IndexResult<()> {
        self.check_closed()?;
        self.check_range(page_id)?;
        self.cache.write().remove(page_id);
        let chain = self.existing_chain(page_id)?;
        self.chains.write().remove(&page_id);
        for id in chain.into_iter().chain(std::iter::once(page_id)) {
            self.push_free(id)?;
        }
        Ok(())
    }

    /// Write all dirty pages and the metadata, then sync the store.
    pub fn flush(&self) -> IndexResult<()> {
        self.check_closed()?;
        {
            let mut cache = self.cache.write();
            let dirty = cache.dirty_pages();
            let count = dirty.len();
            for page_id in dirty {
                let node = match cache.peek(page_id) {
                    Some(node) => node,
                    None => continue,
                };
                self.write_node_to_store(page_id, node)?;
                cache.mark_clean(page_id);
            }
            if count > 0 {
                debug!("Flushed {} dirty pages", count);
            }
        }
        let meta = self.meta.read().clone();
        self.store.write_meta(&meta)?;
        self.store.sync()
    }

    /// Flush and release the cache. Further operations fail with `Closed`.
    pub fn close(&self) -> IndexResult<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.flush()?;
        self.cache.write().clear();
        *self.closed.write() = true;
        info!("Closed page file");
        Ok(())
    }

    /// Stores an opaque tree header inside the file metadata.
    pub fn set_tree_header<T: Serialize>(&self, header: &T) -> IndexResult<()> {
        let bytes = bincode::serde::encode_to_vec(header, bincode::config::legacy())?;
        self.meta.write().tree_header = bytes;
        Ok(())
    }

    /// Decodes the tree header; `None` if no tree was ever written.
    pub fn tree_header<T: DeserializeOwned>(&self) -> IndexResult<Option<T>> {
        let meta = self.meta.read();
        if meta.tree_header.is_empty() {
            return Ok(None);
        }
        let (header, _) =
            bincode::serde::decode_from_slice(&meta.tree_header, bincode::config::legacy())?;
        Ok(Some(header))
    }

    pub fn next_page_id(&self) -> PageId {
        self.meta.read().next_page_id
    }

    pub fn free_page_count(&self) -> u64 {
        self.meta.read().free_page_count
    }

    pub fn stats(&self) -> PageFileStats {
        let cached_pages = self.cache.read().len() as u64;
        let meta = self.meta.read();
        PageFileStats {
            cached_pages,
            cache_hits: self.stats.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.stats.cache_misses.load(Ordering::Relaxed),
            page_reads: self.stats.page_reads.load(Ordering::Relaxed),
            page_writes: self.stats.page_writes.load(Ordering::Relaxed),
            allocated_pages: meta.next_page_id,
            free_pages: meta.free_page_count,
        }
    }

    /// Add a node to the cache, writing evicted dirty pages to the store.
    fn cache_node(&self, page_id: PageId, node: N, dirty: bool) -> IndexResult<()> {
        let mut cache = self.cache.write();
        if !cache.contains(page_id) {
            while cache.needs_eviction() {
                match cache.evict_oldest() {
                    Some((evict_id, evict_node, true)) => {
                        self.write_node_to_store(evict_id, &evict_node)?;
                    }
                    Some(_) => {}
                    None => break,
                }
            }
        }
        cache.insert(page_id, node, dirty);
        Ok(())
    }

    fn read_record(&self, page_id: PageId) -> IndexResult<Option<PageRecord>> {
        match self.store.read_slot(page_id)? {
            Some(bytes) => {
                self.stats.page_reads.fetch_add(1, Ordering::Relaxed);
                PageRecord::decode(page_id, &bytes).map(Some)
            }
            None => Ok(None),
        }
    }

    fn write_record(&self, page_id: PageId, record: &PageRecord) -> IndexResult<()> {
        let bytes = record.encode(self.store.page_size())?;
        self.store.write_slot(page_id, &bytes)?;
        self.stats.page_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Decodes a node from its first page and all continuation pages.
    fn load_node(&self, page_id: PageId) -> IndexResult<N> {
        let head = match self.read_record(page_id)? {
            Some(record) => record,
            None => {
                error!("Page {} was allocated but never written", page_id);
                return Err(IndexError::Corrupted(format!(
                    "page {} was never written",
                    page_id
                )));
            }
        };
        if head.kind != PageKind::Node {
            error!("Page {} holds a {:?} record", page_id, head.kind);
            return Err(IndexError::Corrupted(format!(
                "page {} is not a node page ({:?})",
                page_id, head.kind
            )));
        }

        let limit = self.next_page_id() as usize;
        let mut payload = head.payload;
        let mut chain = Vec::new();
        let mut next = head.next;
        while let Some(cont_id) = next {
            if chain.len() >= limit {
                error!("Continuation chain of page {} loops", page_id);
                return Err(IndexError::Corrupted(format!(
                    "continuation chain of page {} loops",
                    page_id
                )));
            }
            let record = match self.read_record(cont_id)? {
                Some(record) if record.kind == PageKind::Continuation => record,
                _ => {
                    error!("Page {} has a broken continuation {}", page_id, cont_id);
                    return Err(IndexError::Corrupted(format!(
                        "page {} has a broken continuation {}",
                        page_id, cont_id
                    )));
                }
            };
            payload.try_reserve(record.payload.len())?;
            payload.extend_from_slice(&record.payload);
            chain.push(cont_id);
            next = record.next;
        }
        self.chains.write().insert(page_id, chain);

        let (node, _) = bincode::serde::decode_from_slice(&payload, bincode::config::legacy())
            .map_err(|e| {
                error!("Node on page {} is undecodable: {}", page_id, e);
                IndexError::Corrupted(format!("node on page {} is undecodable: {}", page_id, e))
            })?;
        Ok(node)
    }

    /// Encodes a node into its page, growing or shrinking its continuation
    /// chain as needed.
    fn write_node_to_store(&self, page_id: PageId, node: &N) -> IndexResult<()> {
        let payload = bincode::serde::encode_to_vec(node, bincode::config::legacy())?;
        let chunk_size = self.payload_capacity().max(1);
        let mut chunks: Vec<&[u8]> = payload.chunks(chunk_size).collect();
        if chunks.is_empty() {
            chunks.push(&[]);
        }
        let needed = chunks.len() - 1;

        let mut chain = self.existing_chain(page_id)?;
        while chain.len() < needed {
            chain.push(self.allocate_page_id()?);
        }
        for extra in chain.split_off(needed) {
            self.push_free(extra)?;
        }
        if needed > 0 {
            debug!("Page {} spans {} continuation pages", page_id, needed);
        }

        let head = PageRecord::new(PageKind::Node, chain.first().copied(), chunks[0].to_vec());
        self.write_record(page_id, &head)?;
        for (i, cont_id) in chain.iter().enumerate() {
            let record = PageRecord::new(
                PageKind::Continuation,
                chain.get(i + 1).copied(),
                chunks[i + 1].to_vec(),
            );
            self.write_record(*cont_id, &record)?;
        }
        self.chains.write().insert(page_id, chain);
        Ok(())
    }

    /// The continuation pages currently owned by `page_id`.
    fn existing_chain(&self, page_id: PageId) -> IndexResult<Vec<PageId>> {
        if let Some(chain) = self.chains.read().get(&page_id) {
            return Ok(chain.clone());
        }
        let mut chain = Vec::new();
        let head = match self.read_record(page_id)? {
            Some(record) if record.kind == PageKind::Node => record,
            _ => return Ok(chain),
        };
        let limit = self.next_page_id() as usize;
        let mut next = head.next;
        while let Some(cont_id) = next {
            if chain.len() >= limit {
                return Err(IndexError::Corrupted(format!(
                    "continuation chain of page {} loops",
                    page_id
                )));
            }
            chain.push(cont_id);
            next = match self.read_record(cont_id)? {
                Some(record) if record.kind == PageKind::Continuation => record.next,
                _ => None,
            };
        }
        Ok(chain)
    }

    fn allocate_page_id(&self) -> IndexResult<PageId> {
        let mut meta = self.meta.write();
        if let Some(head) = meta.free_list_head {
            let record = match self.store.read_slot(head)? {
                Some(bytes) => PageRecord::decode(head, &bytes)?,
                None => {
                    error!("Free chain points at unwritten page {}", head);
                    return Err(IndexError::Corrupted(format!(
                        "free chain points at unwritten page {}",
                        head
                    )));
                }
            };
            if record.kind != PageKind::Free {
                error!("Free chain points at {:?} page {}", record.kind, head);
                return Err(IndexError::Corrupted(format!(
                    "free chain points at live page {}",
                    head
                )));
            }
            meta.free_list_head = record.next;
            meta.free_page_count = meta.free_page_count.saturating_sub(1);
            return Ok(head);
        }

        let page_id = meta.next_page_id;
        meta.next_page_id += 1;
        Ok(page_id)
    }

    fn push_free(&self, page_id: PageId) -> IndexResult<()> {
        let mut meta = self.meta.write();
        let record = PageRecord::free(meta.free_list_head);
        self.write_record(page_id, &record)?;
        meta.free_list_head = Some(page_id);
        meta.free_page_count += 1;
        Ok(())
    }
}

impl<N: PageNode> Drop for PageFile<N> {
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }
        // Best-effort flush of dirty pages
        if let Err(e) = self.flush() {
            error!("Failed to flush page file on drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::store::{FilePageStore, MemoryPageStore};
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestNode {
        values: Vec<u64>,
    }

    fn node(n: u64) -> TestNode {
        TestNode {
            values: (0..n).collect(),
        }
    }

    fn memory_file(cache_pages: usize) -> PageFile<TestNode> {
        let store = MemoryPageStore::new(256).unwrap();
        PageFile::create(Box::new(store), cache_pages).unwrap()
    }

    #[test]
    fn test_allocate_sequential_ids() {
        let pf = memory_file(4);
        assert_eq!(pf.allocate_page().unwrap(), 0);
        assert_eq!(pf.allocate_page().unwrap(), 1);
        assert_eq!(pf.next_page_id(), 2);
    }

    #[test]
    fn test_read_out_of_range() {
        let pf = memory_file(4);
        assert!(matches!(
            pf.read_page(3),
            Err(IndexError::PageOutOfRange {
                page_id: 3,
                next_page_id: 0
            })
        ));
    }

    #[test]
    fn test_eviction_writes_dirty_pages() {
        let pf = memory_file(2);
        let ids: Vec<_> = (0..5).map(|_| pf.allocate_page().unwrap()).collect();
        for (i, id) in ids.iter().enumerate() {
            pf.write_page(*id, node(i as u64)).unwrap();
        }
        assert!(pf.stats().cached_pages <= 2);
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(pf.read_page(*id).unwrap(), node(i as u64));
        }
        let stats = pf.stats();
        assert!(stats.cache_misses >= 3);
        assert!(stats.page_writes >= 3);
    }

    #[test]
    fn test_large_node_uses_continuation_pages() {
        let pf = memory_file(1);
        let id = pf.allocate_page().unwrap();
        let big = node(100);
        pf.write_page(id, big.clone()).unwrap();
        pf.flush().unwrap();
        // 100 u64 values need several 256-byte pages
        assert!(pf.next_page_id() > 3);

        let other = pf.allocate_page().unwrap();
        pf.write_page(other, node(1)).unwrap();
        assert_eq!(pf.read_page(id).unwrap(), big);

        // shrinking the node returns its continuation pages
        pf.write_page(id, node(2)).unwrap();
        pf.flush().unwrap();
        assert!(pf.free_page_count() >= 3);
        assert_eq!(pf.read_page(id).unwrap(), node(2));
    }

    #[test]
    fn test_free_pages_are_reused() {
        let pf = memory_file(4);
        let a = pf.allocate_page().unwrap();
        let b = pf.allocate_page().unwrap();
        pf.write_page(a, node(1)).unwrap();
        pf.write_page(b, node(2)).unwrap();
        pf.free_page(a).unwrap();
        pf.free_page(b).unwrap();
        assert_eq!(pf.free_page_count(), 2);

        assert_eq!(pf.allocate_page().unwrap(), b);
        assert_eq!(pf.allocate_page().unwrap(), a);
        assert_eq!(pf.allocate_page().unwrap(), 2);
        assert_eq!(pf.free_page_count(), 0);
    }

    #[test]
    fn test_reading_free_page_is_corruption() {
        let pf = memory_file(4);
        let a = pf.allocate_page().unwrap();
        pf.write_page(a, node(1)).unwrap();
        pf.free_page(a).unwrap();
        assert!(matches!(pf.read_page(a), Err(IndexError::Corrupted(_))));
    }

    #[test]
    fn test_closed_page_file_errors() {
        let pf = memory_file(4);
        let a = pf.allocate_page().unwrap();
        pf.write_page(a, node(1)).unwrap();
        pf.close().unwrap();
        assert!(pf.is_closed());
        assert!(matches!(pf.read_page(a), Err(IndexError::Closed)));
        assert!(matches!(pf.allocate_page(), Err(IndexError::Closed)));
        assert!(pf.close().is_ok());
    }

    #[test]
    fn test_persistence_across_close_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nodes.pages");
        let ids;
        {
            let store = FilePageStore::create(&path, 256, 1).unwrap();
            let pf: PageFile<TestNode> = PageFile::create(Box::new(store), 2).unwrap();
            ids = (0..6).map(|_| pf.allocate_page().unwrap()).collect::<Vec<_>>();
            for (i, id) in ids.iter().enumerate() {
                pf.write_page(*id, node(i as u64 * 10)).unwrap();
            }
            pf.set_tree_header(&42u32).unwrap();
            pf.close().unwrap();
        }

        let store = FilePageStore::open(&path).unwrap();
        let pf: PageFile<TestNode> = PageFile::open(Box::new(store), 2).unwrap();
        assert_eq!(pf.tree_header::<u32>().unwrap(), Some(42));
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(pf.read_page(*id).unwrap(), node(i as u64 * 10));
        }
    }

    #[test]
    fn test_drop_flushes_dirty_pages() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("drop.pages");
        {
            let store = FilePageStore::create(&path, 256, 0).unwrap();
            let pf: PageFile<TestNode> = PageFile::create(Box::new(store), 8).unwrap();
            let id = pf.allocate_page().unwrap();
            pf.write_page(id, node(3)).unwrap();
        }
        let store = FilePageStore::open(&path).unwrap();
        let pf: PageFile<TestNode> = PageFile::open(Box::new(store), 8).unwrap();
        assert_eq!(pf.read_page(0).unwrap(), node(3));
    }
}

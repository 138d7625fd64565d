//! Backing stores for page files.
//!
//! A store reads and writes whole page slots as raw bytes. It knows nothing
//! about nodes; encoding, checksums and caching live in the page file.
//! Each `read_slot` call results in exactly one seek and read operation.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, error};
use parking_lot::RwLock;

use super::constants::{MIN_PAGE_SIZE, RAW_HEADER_LEN};
use super::header::{FileHeader, FileMeta};
use crate::errors::{IndexError, IndexResult};
use crate::types::PageId;

/// Raw page-slot storage.
pub trait PageStore: Send + Sync {
    fn page_size(&self) -> usize;

    /// Reads one slot; `None` if the slot was never written.
    fn read_slot(&self, page_id: PageId) -> IndexResult<Option<Vec<u8>>>;

    /// Writes one slot. `bytes` must be exactly one page long.
    fn write_slot(&self, page_id: PageId, bytes: &[u8]) -> IndexResult<()>;

    /// Reads the file metadata; `None` for a store that never had any.
    fn read_meta(&self) -> IndexResult<Option<FileMeta>>;

    fn write_meta(&self, meta: &FileMeta) -> IndexResult<()>;

    /// Makes written data durable.
    fn sync(&self) -> IndexResult<()>;

    fn is_persistent(&self) -> bool;
}

fn check_slot_len(page_size: usize, bytes: &[u8]) -> IndexResult<()> {
    if bytes.len() != page_size {
        return Err(IndexError::InvalidOperation(format!(
            "slot write of {} bytes into {}-byte page",
            bytes.len(),
            page_size
        )));
    }
    Ok(())
}

// ============================================================================
// In-memory store
// ============================================================================

/// Keeps encoded pages in a map. Pages still go through the same encoding
/// as on disk.
pub struct MemoryPageStore {
    page_size: usize,
    slots: RwLock<HashMap<PageId, Vec<u8>>>,
    meta: RwLock<Option<FileMeta>>,
}

impl MemoryPageStore {
    pub fn new(page_size: usize) -> IndexResult<Self> {
        if page_size < MIN_PAGE_SIZE {
            return Err(IndexError::InvalidConfig(format!(
                "page size {} below minimum {}",
                page_size, MIN_PAGE_SIZE
            )));
        }
        Ok(Self {
            page_size,
            slots: RwLock::new(HashMap::new()),
            meta: RwLock::new(None),
        })
    }

    /// Number of slots written so far.
    pub fn slot_count(&self) -> usize {
        self.slots.read().len()
    }
}

impl PageStore for MemoryPageStore {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn read_slot(&self, page_id: PageId) -> IndexResult<Option<Vec<u8>>> {
        Ok(self.slots.read().get(&page_id).cloned())
    }

    fn write_slot(&self, page_id: PageId, bytes: &[u8]) -> IndexResult<()> {
        check_slot_len(self.page_size, bytes)?;
        self.slots.write().insert(page_id, bytes.to_vec());
        Ok(())
    }

    fn read_meta(&self) -> IndexResult<Option<FileMeta>> {
        Ok(self.meta.read().clone())
    }

    fn write_meta(&self, meta: &FileMeta) -> IndexResult<()> {
        *self.meta.write() = Some(meta.clone());
        Ok(())
    }

    fn sync(&self) -> IndexResult<()> {
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        false
    }
}

// ============================================================================
// File store
// ============================================================================

/// A page file on disk.
///
/// Layout: the raw header, then the metadata filling the rest of slot 0 and
/// `reserved_pages` further slots, then data page `i` at
/// `(1 + reserved_pages + i) * page_size`.
pub struct FilePageStore {
    file: RwLock<File>,
    path: PathBuf,
    page_size: usize,
    reserved_pages: u32,
}

impl FilePageStore {
    /// Create a new page file, truncating anything at `path`.
    pub fn create(path: &Path, page_size: usize, reserved_pages: u32) -> IndexResult<Self> {
        if page_size < MIN_PAGE_SIZE {
            return Err(IndexError::InvalidConfig(format!(
                "page size {} below minimum {}",
                page_size, MIN_PAGE_SIZE
            )));
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let store = Self {
            file: RwLock::new(file),
            path: path.to_path_buf(),
            page_size,
            reserved_pages,
        };
        store.write_raw_header()?;
        store.write_meta(&FileMeta::new(reserved_pages))?;
        debug!("Created page file {:?} (page size {})", path, page_size);
        Ok(store)
    }

    /// Open an existing page file. Only the header is read.
    pub fn open(path: &Path) -> IndexResult<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let mut raw = [0u8; RAW_HEADER_LEN + 4];
        file.seek(SeekFrom::Start(0))?;
        if let Err(e) = file.read_exact(&mut raw) {
            error!("Page file {:?} is too short for a header", path);
            return Err(IndexError::Corrupted(format!("unreadable header: {}", e)));
        }
        let header = FileHeader::from_bytes(&raw[..RAW_HEADER_LEN])?;
        header.validate()?;

        let mut word = [0u8; 4];
        word.copy_from_slice(&raw[RAW_HEADER_LEN..]);
        let reserved_pages = u32::from_le_bytes(word);

        Ok(Self {
            file: RwLock::new(file),
            path: path.to_path_buf(),
            page_size: header.page_size as usize,
            reserved_pages,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn meta_region_len(&self) -> usize {
        (1 + self.reserved_pages as usize) * self.page_size - RAW_HEADER_LEN
    }

    fn slot_offset(&self, page_id: PageId) -> u64 {
        (1 + self.reserved_pages as u64 + page_id) * self.page_size as u64
    }

    fn write_raw_header(&self) -> IndexResult<()> {
        let header = FileHeader::new(self.page_size)?;
        let mut file = self.file.write();
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header.to_bytes())?;
        Ok(())
    }
}

impl PageStore for FilePageStore {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn read_slot(&self, page_id: PageId) -> IndexResult<Option<Vec<u8>>> {
        let offset = self.slot_offset(page_id);
        let mut file = self.file.write();
        let len = file.metadata()?.len();
        if offset + self.page_size as u64 > len {
            return Ok(None);
        }
        file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; self.page_size];
        file.read_exact(&mut buffer)?;
        Ok(Some(buffer))
    }

    fn write_slot(&self, page_id: PageId, bytes: &[u8]) -> IndexResult<()> {
        check_slot_len(self.page_size, bytes)?;
        let offset = self.slot_offset(page_id);
        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(bytes)?;
        Ok(())
    }

    fn read_meta(&self) -> IndexResult<Option<FileMeta>> {
        let mut buffer = vec![0u8; self.meta_region_len()];
        {
            let mut file = self.file.write();
            file.seek(SeekFrom::Start(RAW_HEADER_LEN as u64))?;
            file.read_exact(&mut buffer)?;
        }
        let (meta, _): (FileMeta, usize) =
            bincode::serde::decode_from_slice(&buffer, bincode::config::legacy()).map_err(|e| {
                error!("File metadata of {:?} is undecodable: {}", self.path, e);
                IndexError::Corrupted(format!("undecodable file metadata: {}", e))
            })?;
        Ok(Some(meta))
    }

    fn write_meta(&self, meta: &FileMeta) -> IndexResult<()> {
        let mut bytes = bincode::serde::encode_to_vec(meta, bincode::config::legacy())?;
        let region = self.meta_region_len();
        if bytes.len() > region {
            return Err(IndexError::Serialization(format!(
                "file metadata of {} bytes does not fit into {} reserved pages",
                bytes.len(),
                self.reserved_pages
            )));
        }
        bytes.resize(region, 0);
        let mut file = self.file.write();
        file.seek(SeekFrom::Start(RAW_HEADER_LEN as u64))?;
        file.write_all(&bytes)?;
        Ok(())
    }

    fn sync(&self) -> IndexResult<()> {
        self.file.write().sync_all()?;
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        true
    }
}

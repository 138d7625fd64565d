//! On-disk headers and page records.
//!
//! A page file starts with a fixed 8-byte raw header followed by the
//! bincode-encoded [`FileMeta`]. Every data page slot holds one
//! [`PageRecord`] padded to the page size.

use log::error;
use serde::{Deserialize, Serialize};

use super::constants::{MAGIC_MASK, MAGIC_VERSION, MIN_PAGE_SIZE, RAW_HEADER_LEN};
use crate::errors::{IndexError, IndexResult};
use crate::types::{IndexKind, PageId};

// ============================================================================
// Raw File Header
// ============================================================================

/// The fixed `{magic_version, page_size}` prefix of a page file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub magic_version: u32,
    pub page_size: u32,
}

impl FileHeader {
    pub fn new(page_size: usize) -> IndexResult<Self> {
        let page_size = u32::try_from(page_size).map_err(|_| {
            IndexError::InvalidInput(format!("page size {} does not fit the file header", page_size))
        })?;
        Ok(Self {
            magic_version: MAGIC_VERSION,
            page_size,
        })
    }

    pub fn to_bytes(&self) -> [u8; RAW_HEADER_LEN] {
        let mut bytes = [0u8; RAW_HEADER_LEN];
        bytes[..4].copy_from_slice(&self.magic_version.to_le_bytes());
        bytes[4..].copy_from_slice(&self.page_size.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> IndexResult<Self> {
        if bytes.len() < RAW_HEADER_LEN {
            return Err(IndexError::Corrupted(format!(
                "file header truncated to {} bytes",
                bytes.len()
            )));
        }
        let mut word = [0u8; 4];
        word.copy_from_slice(&bytes[..4]);
        let magic_version = u32::from_le_bytes(word);
        word.copy_from_slice(&bytes[4..8]);
        let page_size = u32::from_le_bytes(word);
        Ok(Self {
            magic_version,
            page_size,
        })
    }

    /// Checks magic, version and page size.
    pub fn validate(&self) -> IndexResult<()> {
        if self.magic_version & MAGIC_MASK != MAGIC_VERSION & MAGIC_MASK {
            error!("Bad page file magic {:#x}", self.magic_version);
            return Err(IndexError::Corrupted(format!(
                "invalid file format (bad magic {:#x})",
                self.magic_version
            )));
        }
        if self.magic_version != MAGIC_VERSION {
            error!("Unsupported page file version {:#x}", self.magic_version);
            return Err(IndexError::UnsupportedVersion {
                found: self.magic_version,
                expected: MAGIC_VERSION,
            });
        }
        if (self.page_size as usize) < MIN_PAGE_SIZE {
            error!("Page size {} in header is below minimum", self.page_size);
            return Err(IndexError::Corrupted(format!(
                "page size {} below minimum {}",
                self.page_size, MIN_PAGE_SIZE
            )));
        }
        Ok(())
    }
}

// ============================================================================
// File Metadata
// ============================================================================

/// Allocator state and tree header, stored after the raw header.
///
/// `reserved_pages` must stay the first field: stores read it before they
/// know how large the metadata region is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    pub reserved_pages: u32,
    pub next_page_id: PageId,
    pub free_list_head: Option<PageId>,
    pub free_page_count: u64,
    pub tree_header: Vec<u8>,
}

impl FileMeta {
    pub fn new(reserved_pages: u32) -> Self {
        Self {
            reserved_pages,
            next_page_id: 0,
            free_list_head: None,
            free_page_count: 0,
            tree_header: Vec::new(),
        }
    }
}

/// Tree-level metadata persisted alongside the allocator state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeHeader {
    pub kind: IndexKind,
    /// Zero for metric trees and for spatial trees that never saw a point.
    pub dimensionality: usize,
    pub leaf_capacity: usize,
    pub directory_capacity: usize,
    pub leaf_minimum: usize,
    pub directory_minimum: usize,
    pub root: Option<PageId>,
    /// Number of levels; a lone root leaf has height 1.
    pub height: usize,
    pub entry_count: u64,
    /// Neighbor count whose distances a metric tree keeps; 0 for none.
    pub k_max: usize,
}

impl TreeHeader {
    pub fn empty(kind: IndexKind) -> Self {
        Self {
            kind,
            dimensionality: 0,
            leaf_capacity: 0,
            directory_capacity: 0,
            leaf_minimum: 0,
            directory_minimum: 0,
            root: None,
            height: 0,
            entry_count: 0,
            k_max: 0,
        }
    }
}

// ============================================================================
// Page Records
// ============================================================================

/// What a data page slot currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageKind {
    /// First page of an encoded node.
    Node,
    /// Overflow of a node too large for a single page.
    Continuation,
    /// Member of the free chain.
    Free,
}

/// A page slot's content wrapped with a CRC32 checksum of the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub checksum: u32,
    pub kind: PageKind,
    /// Next continuation page, or the next free page for free records.
    pub next: Option<PageId>,
    pub payload: Vec<u8>,
}

impl PageRecord {
    pub fn new(kind: PageKind, next: Option<PageId>, payload: Vec<u8>) -> Self {
        Self {
            checksum: crc32fast::hash(&payload),
            kind,
            next,
            payload,
        }
    }

    pub fn free(next: Option<PageId>) -> Self {
        Self::new(PageKind::Free, next, Vec::new())
    }

    /// Encodes the record and pads it to `page_size`.
    pub fn encode(&self, page_size: usize) -> IndexResult<Vec<u8>> {
        let mut bytes = bincode::serde::encode_to_vec(self, bincode::config::legacy())?;
        if bytes.len() > page_size {
            return Err(IndexError::Serialization(format!(
                "page record too large: {} bytes (max {})",
                bytes.len(),
                page_size
            )));
        }
        bytes.resize(page_size, 0);
        Ok(bytes)
    }

    /// Decodes a record for `page_id` and verifies its checksum.
    pub fn decode(page_id: PageId, bytes: &[u8]) -> IndexResult<Self> {
        let (record, _): (PageRecord, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::legacy()).map_err(|e| {
                error!("Page {} is undecodable: {}", page_id, e);
                IndexError::Corrupted(format!("page {} is undecodable: {}", page_id, e))
            })?;
        let expected = crc32fast::hash(&record.payload);
        if expected != record.checksum {
            error!("Checksum mismatch on page {}", page_id);
            return Err(IndexError::Corrupted(format!(
                "page {} checksum mismatch (expected: {:x}, got: {:x})",
                page_id, expected, record.checksum
            )));
        }
        Ok(record)
    }
}

//! Error types shared by the page file, the trees and the query engines.

use std::collections::TryReserveError;
use std::io;
use thiserror::Error;

use crate::types::{ObjectId, PageId};

/// Errors that can occur in index operations
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The backing store does not hold a valid page file, or a page failed
    /// its checksum. Never retried.
    #[error("Corrupted page file: {0}")]
    Corrupted(String),

    #[error("Unsupported page file version {found:#x} (expected {expected:#x})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Page {page_id} is outside the allocated range (next page id {next_page_id})")]
    PageOutOfRange { page_id: PageId, next_page_id: PageId },

    /// A split strategy produced a partition that is empty, too small, or
    /// does not cover its input exactly once.
    #[error("Invalid split: {0}")]
    InvalidSplit(String),

    #[error("Dimensionality mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Object {0} not found in relation")]
    ObjectNotFound(ObjectId),

    #[error("Distance computation failed: {0}")]
    Distance(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Index is closed")]
    Closed,
}

impl From<TryReserveError> for IndexError {
    fn from(err: TryReserveError) -> Self {
        IndexError::ResourceExhausted(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for IndexError {
    fn from(err: bincode::error::EncodeError) -> Self {
        IndexError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for IndexError {
    fn from(err: bincode::error::DecodeError) -> Self {
        IndexError::Corrupted(format!("undecodable record: {}", err))
    }
}

impl IndexError {
    /// Returns true for errors that indicate a damaged page file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IndexError::Corrupted(_)
                | IndexError::UnsupportedVersion { .. }
                | IndexError::PageOutOfRange { .. }
                | IndexError::InvalidSplit(_)
        )
    }
}

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;

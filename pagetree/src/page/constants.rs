//! Constants for the paged storage layer.

/// Default page size (4KB)
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Smallest page size accepted by the page file
pub const MIN_PAGE_SIZE: usize = 128;

/// Default cache size in number of pages (4MB with 4KB pages)
pub const DEFAULT_CACHE_PAGES: usize = 1024;

/// Magic number and format version packed into one word: "PT" in the high
/// half, the format version in the low half.
pub const MAGIC_VERSION: u32 = 0x5054_0001;

/// Mask selecting the magic half of [`MAGIC_VERSION`]
pub const MAGIC_MASK: u32 = 0xFFFF_0000;

/// Size of the raw `{magic_version, page_size}` header
pub const RAW_HEADER_LEN: usize = 8;

/// Bytes a page record spends on its own framing (checksum, kind tag,
/// continuation pointer and payload length), rounded up.
pub const RECORD_OVERHEAD: usize = 32;

/// Default fraction of the maximum fill that every non-root node keeps
pub const DEFAULT_MIN_FILL: f64 = 0.5;

/// Capacities below this are accepted but logged as suspicious
pub const SMALL_CAPACITY_WARNING: usize = 10;

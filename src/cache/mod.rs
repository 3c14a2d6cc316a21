//! Time-bounded cache with ETag fingerprints
//!
//! Stores the most recent successful fetch per (spreadsheet_id, gid) with
//! a content fingerprint for conditional responses and a TTL expiry.

pub mod etag;
pub mod store;

pub use etag::compute_etag;
pub use store::{CacheEntry, SheetCache};

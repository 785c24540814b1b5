//! Response caching for offline reads.
//!
//! This module provides a request layer that:
//! - Snapshots successful JSON reads under a caller-chosen cache key
//! - Serves those snapshots while the network is unavailable, within a TTL
//! - Degrades every other failure into a synthetic 503 response
//!
//! Expired snapshots are never purged; they are simply ignored.

mod layer;
mod types;

pub use layer::CachedClient;
pub use types::{ApiResponse, CacheEntry, RequestBody, RequestOptions};

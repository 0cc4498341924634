//! The layered, copy-on-write symbolic heap (§1, §3, §4.3–§4.5): per-
//! allocation byte-interval stores ([`store`]), the per-block map from
//! allocation to store ([`block_store`]), and the cross-predecessor
//! merge that stitches block-exit stores into a block-entry store
//! ([`merge`]).

pub mod block_store;
pub mod interval;
pub mod merge;
pub mod store;

pub use block_store::{should_commit, BStore, BlockStatus};
pub use merge::merge_block_stores;
pub use store::{HStore, MultiStore};

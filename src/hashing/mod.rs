//! Content hashing and duplicate removal
//!
//! # Components
//!
//! - `HashAlgorithm`: the digests the engine can compute
//! - `HashEngine`: hashes files, reusing stored digests by `(path, size)`
//! - `Deduplicator`: keeps one copy per digest group per retention policy

mod algorithm;
mod dedup;
mod engine;

pub use algorithm::{digest_file, HashAlgorithm};
pub use dedup::{select_survivor, DedupReport, Deduplicator, Removal};
pub use engine::{FileMeta, HashEngine, HashStats};

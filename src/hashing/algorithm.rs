//! Digest algorithms
//!
//! xxh128 is always computed when hashing is on; sha256 and blake3 are
//! opt-in extras stored next to it.

use crate::config::DupeCleanupConfig;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::hash::Hasher as _;
use std::io::{self, Read};
use std::path::Path;
use twox_hash::xxh3::{Hash128, HasherExt};

const READ_BUFFER_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Xxh128,
    Sha256,
    Blake3,
}

impl HashAlgorithm {
    /// The algorithm computed whenever hashing is enabled
    pub const DEFAULT: HashAlgorithm = HashAlgorithm::Xxh128;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Xxh128 => "xxh128",
            Self::Sha256 => "sha256",
            Self::Blake3 => "blake3",
        }
    }

    /// Default algorithm first, then the enabled extras
    pub fn enabled(config: &DupeCleanupConfig) -> Vec<HashAlgorithm> {
        let mut algorithms = vec![Self::DEFAULT];
        if config.add_sha256_hash {
            algorithms.push(Self::Sha256);
        }
        if config.add_blake3_hash {
            algorithms.push(Self::Blake3);
        }
        algorithms
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Streaming state of one algorithm
enum FileHasher {
    Xxh128(Hash128),
    Sha256(Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl FileHasher {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Xxh128 => Self::Xxh128(Hash128::default()),
            HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            HashAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Xxh128(h) => h.write(data),
            Self::Sha256(h) => h.update(data),
            Self::Blake3(h) => {
                h.update(data);
            }
        }
    }

    fn finish(self) -> String {
        match self {
            Self::Xxh128(h) => format!("{:032x}", h.finish_ext()),
            Self::Sha256(h) => hex::encode(h.finalize()),
            Self::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

/// Computes the hex digest of a file
///
/// Blocking; callers on the async runtime go through `spawn_blocking`.
pub fn digest_file(path: &Path, algorithm: HashAlgorithm) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = FileHasher::new(algorithm);
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hasher.finish())
}

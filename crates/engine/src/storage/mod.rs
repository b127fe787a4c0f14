mod atomic_io;
mod hashing;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use atomic_io::{read_json, write_bytes_atomic, write_json_atomic, write_text_atomic};
pub use hashing::{sha256_hex, to_hex_lower};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode JSON for {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode JSON from {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

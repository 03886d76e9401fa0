//! Streaming content digests for golden-file comparison.

use crate::domain::HarnessError;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

pub const DIGEST_CHUNK_BYTES: usize = 4096;
pub const DIGEST_ALGORITHM: &str = "sha256";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDigest {
    pub hex: String,
    pub bytes: u64,
}

/// Hashes a file in fixed-size chunks without loading it whole.
pub fn digest_file(path: impl AsRef<Path>) -> Result<FileDigest, DigestError> {
    let path = path.as_ref();
    let mut reader = open(path)?;
    digest_reader(&mut reader).map_err(|source| DigestError::Read {
        path: path.to_path_buf(),
        source,
    })
}

pub fn digest_reader(reader: &mut impl Read) -> io::Result<FileDigest> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; DIGEST_CHUNK_BYTES];
    let mut bytes = 0u64;
    loop {
        let read = fill(reader, &mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        bytes += read as u64;
    }
    Ok(FileDigest {
        hex: hex::encode(hasher.finalize()),
        bytes,
    })
}

/// Offset of the first differing byte, or `None` when the contents are equal.
/// A strict prefix diverges at the shorter length.
pub fn first_divergence(
    left: impl AsRef<Path>,
    right: impl AsRef<Path>,
) -> Result<Option<u64>, DigestError> {
    let left = left.as_ref();
    let right = right.as_ref();
    let mut left_reader = open(left)?;
    let mut right_reader = open(right)?;
    let mut left_buffer = [0u8; DIGEST_CHUNK_BYTES];
    let mut right_buffer = [0u8; DIGEST_CHUNK_BYTES];
    let mut offset = 0u64;

    loop {
        let left_read = fill(&mut left_reader, &mut left_buffer).map_err(|source| {
            DigestError::Read {
                path: left.to_path_buf(),
                source,
            }
        })?;
        let right_read = fill(&mut right_reader, &mut right_buffer).map_err(|source| {
            DigestError::Read {
                path: right.to_path_buf(),
                source,
            }
        })?;

        let common = left_read.min(right_read);
        if let Some(position) = left_buffer[..common]
            .iter()
            .zip(&right_buffer[..common])
            .position(|(left_byte, right_byte)| left_byte != right_byte)
        {
            return Ok(Some(offset + position as u64));
        }
        if left_read != right_read {
            return Ok(Some(offset + common as u64));
        }
        if left_read == 0 {
            return Ok(None);
        }
        offset += common as u64;
    }
}

fn open(path: &Path) -> Result<File, DigestError> {
    File::open(path).map_err(|source| DigestError::Open {
        path: path.to_path_buf(),
        source,
    })
}

// Reads until the buffer is full or the reader is exhausted.
fn fill(reader: &mut impl Read, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        }
    }
    Ok(filled)
}

#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    #[error("failed to open '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        source: io::Error,
    },
    #[error("failed to read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: io::Error,
    },
}

impl DigestError {
    pub fn path(&self) -> &Path {
        match self {
            Self::Open { path, .. } | Self::Read { path, .. } => path,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Open { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

impl From<DigestError> for HarnessError {
    fn from(error: DigestError) -> Self {
        HarnessError::io_system("IO.DIGEST", error.to_string())
    }
}

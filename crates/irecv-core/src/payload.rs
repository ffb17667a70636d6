//! Payload staging: files are read fully into memory before a transfer.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use tracing::info;

use crate::error::{IrecvError, Result};

/// An immutable payload held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    data: Vec<u8>,
}

impl Payload {
    /// Read `path` into memory.
    ///
    /// Missing files are `FileNotFound`; a buffer that cannot be reserved is
    /// `AllocationFailure`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => IrecvError::FileNotFound {
                path: path.to_path_buf(),
            },
            _ => IrecvError::Io(e),
        })?;

        let size = file.metadata()?.len();
        let mut data = Vec::new();
        usize::try_from(size)
            .ok()
            .and_then(|len| data.try_reserve_exact(len).ok())
            .ok_or(IrecvError::AllocationFailure { size })?;
        file.read_to_end(&mut data)?;

        info!(path = %path.display(), bytes = data.len(), "Payload loaded");
        Ok(Self { data })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

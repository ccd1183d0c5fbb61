use std::fs::File;
use std::path::Path;

use bytes::Bytes;
use memmap2::Mmap;
use tessera_error::TesseraResult;

use crate::ByteBuffer;

impl From<Mmap> for ByteBuffer {
    fn from(value: Mmap) -> Self {
        ByteBuffer::from(Bytes::from_owner(value))
    }
}

impl ByteBuffer {
    /// Memory-map the file at `path` read-only.
    ///
    /// Empty files cannot be mapped on every platform, so they yield an empty buffer instead.
    pub fn map_file(path: impl AsRef<Path>) -> TesseraResult<Self> {
        let file = File::open(path.as_ref())?;
        if file.metadata()?.len() == 0 {
            return Ok(Self::empty());
        }
        // SAFETY: segment files are immutable once sealed, nothing truncates them while mapped.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self::from(mmap))
    }
}

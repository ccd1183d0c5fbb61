use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tessera_buffer::ByteBuffer;
use tessera_error::{TesseraResult, tessera_err};

use crate::ReadMode;

/// The kinds of per-column files a segment directory may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexType {
    Dictionary,
    SortedForward,
    UnsortedForward,
    MultiValueForward,
    RawForward,
    InvertedIndex,
}

impl IndexType {
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Dictionary => "dict",
            Self::SortedForward => "sv.sorted.fwd",
            Self::UnsortedForward => "sv.unsorted.fwd",
            Self::MultiValueForward => "mv.fwd",
            Self::RawForward => "sv.raw.fwd",
            Self::InvertedIndex => "bitmap.inv",
        }
    }
}

pub fn index_file_name(column: &str, index_type: IndexType) -> String {
    format!("{}.{}", column, index_type.extension())
}

/// Read access to the files of one segment directory.
#[derive(Debug, Clone)]
pub struct SegmentDirectory {
    path: PathBuf,
    read_mode: ReadMode,
}

impl SegmentDirectory {
    pub fn new(path: impl Into<PathBuf>, read_mode: ReadMode) -> Self {
        Self {
            path: path.into(),
            read_mode,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_index(&self, column: &str, index_type: IndexType) -> bool {
        self.path.join(index_file_name(column, index_type)).is_file()
    }

    /// Load an index file, failing with an I/O error if it does not exist.
    pub fn index_buffer(&self, column: &str, index_type: IndexType) -> TesseraResult<ByteBuffer> {
        self.file_buffer(&index_file_name(column, index_type))
    }

    pub fn file_buffer(&self, name: &str) -> TesseraResult<ByteBuffer> {
        let path = self.path.join(name);
        let result = match self.read_mode {
            ReadMode::Mmap => ByteBuffer::map_file(&path),
            ReadMode::Heap => ByteBuffer::read_file(&path),
        };
        result.map_err(|e| e.with_context(format!("reading {}", path.display())))
    }
}

/// Write an index file into a segment directory being created.
pub fn write_index(
    dir: &Path,
    column: &str,
    index_type: IndexType,
    bytes: &[u8],
) -> TesseraResult<()> {
    let path = dir.join(index_file_name(column, index_type));
    fs::write(&path, bytes)
        .map_err(|e| tessera_err!(IOError: e).with_context(format!("writing {}", path.display())))
}

/// Create `dir` if missing, failing if it exists and already holds files.
pub fn prepare_output_dir(dir: &Path) -> TesseraResult<()> {
    match fs::read_dir(dir) {
        Ok(mut entries) => {
            if entries.next().is_some() {
                return Err(tessera_err!(
                    InvalidArgument: "output directory {} is not empty",
                    dir.display()
                ));
            }
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(fs::create_dir_all(dir)?),
        Err(e) => Err(e.into()),
    }
}

use roaring::RoaringBitmap;
use tessera_chunk::ChunkReader;
use tessera_error::{TesseraResult, tessera_bail};
use tessera_fixedbit::{FixedBitMultiValueReader, FixedBitSingleValueReader};

use crate::index::{BitmapInvertedIndexReader, SortedIndexReader};

/// Per-document storage of a column.
#[derive(Debug, Clone)]
pub enum ForwardIndex {
    /// Single-value dictIds of a sorted column, shared with its inverted index.
    Sorted(SortedIndexReader),
    /// Single-value fixed-bit dictIds.
    FixedBitSingle(FixedBitSingleValueReader),
    /// Multi-value fixed-bit dictIds.
    FixedBitMulti(FixedBitMultiValueReader),
    /// Raw chunk-compressed values.
    Raw(ChunkReader),
}

impl ForwardIndex {
    pub fn is_single_value(&self) -> bool {
        !matches!(self, Self::FixedBitMulti(_))
    }

    pub fn is_dictionary_encoded(&self) -> bool {
        !matches!(self, Self::Raw(_))
    }

    pub fn as_raw(&self) -> Option<&ChunkReader> {
        match self {
            Self::Raw(reader) => Some(reader),
            _ => None,
        }
    }

    pub fn as_multi_value(&self) -> Option<&FixedBitMultiValueReader> {
        match self {
            Self::FixedBitMulti(reader) => Some(reader),
            _ => None,
        }
    }

    /// DictIds of single-value documents, written to the front of `out`.
    pub fn read_dict_ids(&self, doc_ids: &[u32], out: &mut [u32]) -> TesseraResult<()> {
        match self {
            Self::Sorted(reader) => reader.read_dict_ids(doc_ids, out),
            Self::FixedBitSingle(reader) => reader.read_dict_ids(doc_ids, out),
            Self::FixedBitMulti(_) => {
                tessera_bail!(InvalidState: "single-value read from a multi-value forward index")
            }
            Self::Raw(_) => tessera_bail!(InvalidState: "dictId read from a raw forward index"),
        }
    }

    /// DictIds of one multi-value document, returning how many were written.
    pub fn read_mv_dict_ids(&self, doc_id: u32, out: &mut [u32]) -> TesseraResult<usize> {
        match self {
            Self::FixedBitMulti(reader) => reader.read_dict_ids(doc_id, out),
            _ => tessera_bail!(InvalidState: "multi-value read from a single-value forward index"),
        }
    }
}

/// Maps a dictId to the documents holding it.
#[derive(Debug, Clone)]
pub enum InvertedIndex {
    Bitmap(BitmapInvertedIndexReader),
    Sorted(SortedIndexReader),
}

impl InvertedIndex {
    pub fn doc_ids(&self, dict_id: u32) -> TesseraResult<RoaringBitmap> {
        match self {
            Self::Bitmap(reader) => reader.doc_ids(dict_id),
            Self::Sorted(reader) => {
                let mut bitmap = RoaringBitmap::new();
                bitmap.insert_range(reader.doc_range(dict_id)?);
                Ok(bitmap)
            }
        }
    }
}

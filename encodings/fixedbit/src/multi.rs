use arrow_buffer::bit_iterator::BitIndexIterator;
use tessera_buffer::ByteBuffer;
use tessera_error::{TesseraResult, tessera_bail, tessera_err};

use crate::{BitPacker, BitUnpacker, MAX_FILE_SIZE, packed_len};

/// Target number of values per chunk of a multi-value forward index.
pub const PREFERRED_VALUES_PER_CHUNK: usize = 2048;

const HEADER_ENTRY_SIZE: usize = 4;

/// Region sizes of a multi-value fixed-bit file, derived from column metadata alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiValueLayout {
    pub num_docs: usize,
    pub total_values: usize,
    pub bits: u8,
    pub docs_per_chunk: usize,
    pub num_chunks: usize,
}

impl MultiValueLayout {
    pub fn try_new(num_docs: usize, total_values: usize, bits: u8) -> TesseraResult<Self> {
        if num_docs == 0 {
            tessera_bail!("multi-value column must contain at least one document");
        }
        if total_values < num_docs {
            tessera_bail!(
                "multi-value column has {} values for {} documents, every document needs one",
                total_values,
                num_docs
            );
        }
        let avg_values_per_doc = total_values as f64 / num_docs as f64;
        let docs_per_chunk = ((PREFERRED_VALUES_PER_CHUNK as f64 / avg_values_per_doc).ceil()
            as usize)
            .max(1);
        let layout = Self {
            num_docs,
            total_values,
            bits,
            docs_per_chunk,
            num_chunks: num_docs.div_ceil(docs_per_chunk),
        };
        let size = layout.total_size() as u64;
        if size >= MAX_FILE_SIZE {
            tessera_bail!(
                Capacity: "multi-value forward index of {} bytes exceeds the {} byte file limit",
                size,
                MAX_FILE_SIZE
            );
        }
        Ok(layout)
    }

    pub fn header_size(&self) -> usize {
        self.num_chunks * HEADER_ENTRY_SIZE
    }

    pub fn bitmap_size(&self) -> usize {
        self.total_values.div_ceil(8)
    }

    pub fn raw_size(&self) -> usize {
        packed_len(self.total_values, self.bits)
    }

    pub fn total_size(&self) -> usize {
        self.header_size() + self.bitmap_size() + self.raw_size()
    }
}

/// Writes a multi-value fixed-bit forward index: chunk header, document-start bitmap and packed
/// values, in that order.
pub struct FixedBitMultiValueWriter {
    layout: MultiValueLayout,
    header: Vec<u8>,
    bitmap: Vec<u8>,
    values: BitPacker,
    docs_written: usize,
}

impl FixedBitMultiValueWriter {
    pub fn try_new(num_docs: usize, total_values: usize, bits: u8) -> TesseraResult<Self> {
        let layout = MultiValueLayout::try_new(num_docs, total_values, bits)?;
        log::debug!(
            "multi-value writer: {} docs, {} values, {} docs per chunk, {} chunks",
            num_docs,
            total_values,
            layout.docs_per_chunk,
            layout.num_chunks
        );
        Ok(Self {
            header: Vec::with_capacity(layout.header_size()),
            bitmap: vec![0u8; layout.bitmap_size()],
            values: BitPacker::with_capacity(bits, total_values)?,
            layout,
            docs_written: 0,
        })
    }

    pub fn layout(&self) -> &MultiValueLayout {
        &self.layout
    }

    /// Append the next document's dictIds.
    pub fn push(&mut self, dict_ids: &[u32]) -> TesseraResult<()> {
        if dict_ids.is_empty() {
            tessera_bail!("document {} has no values", self.docs_written);
        }
        if self.docs_written == self.layout.num_docs {
            tessera_bail!(AssertionFailed: "all {} documents already written", self.layout.num_docs);
        }
        let start = self.values.len();
        if start + dict_ids.len() > self.layout.total_values {
            tessera_bail!(
                AssertionFailed: "document {} overflows the declared {} values",
                self.docs_written,
                self.layout.total_values
            );
        }
        if self.docs_written % self.layout.docs_per_chunk == 0 {
            self.header
                .extend_from_slice(&u32::try_from(start)?.to_le_bytes());
        }
        self.bitmap[start / 8] |= 1 << (start % 8);
        for id in dict_ids {
            self.values.push(*id)?;
        }
        self.docs_written += 1;
        Ok(())
    }

    pub fn finish(self) -> TesseraResult<Vec<u8>> {
        if self.docs_written != self.layout.num_docs || self.values.len() != self.layout.total_values
        {
            tessera_bail!(
                AssertionFailed: "expected {} documents with {} values, wrote {} with {}",
                self.layout.num_docs,
                self.layout.total_values,
                self.docs_written,
                self.values.len()
            );
        }
        let mut out = self.header;
        out.reserve_exact(self.layout.total_size() - out.len());
        out.extend_from_slice(&self.bitmap);
        out.extend_from_slice(&self.values.finish());
        Ok(out)
    }
}

/// Random access to the values of a multi-value fixed-bit forward index.
///
/// Locating document `d` reads the header entry of its chunk, then walks the document-start
/// bitmap from the chunk's first value, so the cost is bounded by the chunk size.
#[derive(Debug, Clone)]
pub struct FixedBitMultiValueReader {
    layout: MultiValueLayout,
    header: ByteBuffer,
    bitmap: ByteBuffer,
    values: BitUnpacker,
}

impl FixedBitMultiValueReader {
    pub fn try_new(
        buffer: ByteBuffer,
        num_docs: usize,
        total_values: usize,
        bits: u8,
    ) -> TesseraResult<Self> {
        let layout = MultiValueLayout::try_new(num_docs, total_values, bits)?;
        if buffer.len() < layout.total_size() {
            tessera_bail!(
                InvalidSerde: "multi-value forward index truncated: expected {} bytes, found {}",
                layout.total_size(),
                buffer.len()
            );
        }
        let (header, rest) = buffer.split_at(layout.header_size())?;
        let (bitmap, raw) = rest.split_at(layout.bitmap_size())?;
        Ok(Self {
            layout,
            header,
            bitmap,
            values: BitUnpacker::try_new(raw, bits, total_values)?,
        })
    }

    pub fn layout(&self) -> &MultiValueLayout {
        &self.layout
    }

    pub fn num_docs(&self) -> usize {
        self.layout.num_docs
    }

    /// The `[start, end)` value range of `doc_id`.
    pub fn value_range(&self, doc_id: u32) -> TesseraResult<(usize, usize)> {
        let doc = doc_id as usize;
        if doc >= self.layout.num_docs {
            return Err(tessera_err!(OutOfBounds: doc, 0, self.layout.num_docs));
        }
        let chunk = doc / self.layout.docs_per_chunk;
        let chunk_start = self.header.u32_le(chunk * HEADER_ENTRY_SIZE)? as usize;
        let skip = doc - chunk * self.layout.docs_per_chunk;

        let total = self.layout.total_values;
        if chunk_start >= total {
            tessera_bail!(InvalidSerde: "chunk {} starts at {} past {} values", chunk, chunk_start, total);
        }
        let mut starts = BitIndexIterator::new(self.bitmap.as_slice(), chunk_start, total - chunk_start);
        let start = starts
            .nth(skip)
            .map(|i| chunk_start + i)
            .ok_or_else(|| tessera_err!(InvalidSerde: "document start bit missing for doc {}", doc))?;
        let end = starts.next().map_or(total, |i| chunk_start + i);
        Ok((start, end))
    }

    pub fn num_values(&self, doc_id: u32) -> TesseraResult<usize> {
        self.value_range(doc_id).map(|(s, e)| e - s)
    }

    /// Copy `doc_id`'s dictIds into the front of `out`, returning how many were written.
    pub fn read_dict_ids(&self, doc_id: u32, out: &mut [u32]) -> TesseraResult<usize> {
        let (start, end) = self.value_range(doc_id)?;
        let len = end - start;
        if out.len() < len {
            tessera_bail!(
                AssertionFailed: "output buffer of {} too small for {} values of doc {}",
                out.len(),
                len,
                doc_id
            );
        }
        self.values.get_range(start, &mut out[..len])?;
        Ok(len)
    }

    pub fn dict_ids(&self, doc_id: u32) -> TesseraResult<Vec<u32>> {
        let (start, end) = self.value_range(doc_id)?;
        let mut out = vec![0u32; end - start];
        self.values.get_range(start, &mut out)?;
        Ok(out)
    }
}

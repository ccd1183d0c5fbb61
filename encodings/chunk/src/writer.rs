use tessera_dtype::{DataType, Value};
use tessera_error::{TesseraResult, tessera_bail};

use crate::{ChunkCompressionType, ChunkHeader};

const MAX_FILE_SIZE: u64 = 1 << 31;

/// Builds a chunk-compressed raw forward index in memory.
///
/// Nothing is returned until [`ChunkWriter::finish`] has validated the document count and the
/// final file size, so callers never persist a partial index.
pub struct ChunkWriter {
    header: ChunkHeader,
    chunk: Vec<u8>,
    var_offsets: Vec<u32>,
    docs_in_chunk: usize,
    docs_written: usize,
    chunk_offsets: Vec<u64>,
    data: Vec<u8>,
}

impl ChunkWriter {
    pub fn try_new(
        data_type: DataType,
        compression: ChunkCompressionType,
        num_docs: usize,
        docs_per_chunk: usize,
    ) -> TesseraResult<Self> {
        if docs_per_chunk == 0 {
            tessera_bail!("docs per chunk must be positive");
        }
        let num_chunks = num_docs.div_ceil(docs_per_chunk);
        let entry_size = data_type.byte_width().unwrap_or(0);
        Ok(Self {
            header: ChunkHeader {
                compression,
                data_type,
                num_chunks: u32::try_from(num_chunks)?,
                docs_per_chunk: u32::try_from(docs_per_chunk)?,
                num_docs: u32::try_from(num_docs)?,
                entry_size: u32::try_from(entry_size)?,
            },
            chunk: Vec::new(),
            var_offsets: Vec::with_capacity(docs_per_chunk + 1),
            docs_in_chunk: 0,
            docs_written: 0,
            chunk_offsets: Vec::with_capacity(num_chunks),
            data: Vec::new(),
        })
    }

    pub fn data_type(&self) -> DataType {
        self.header.data_type
    }

    /// Append the next document's value, which must already have the column's type.
    pub fn push(&mut self, value: &Value) -> TesseraResult<()> {
        if value.data_type() != self.header.data_type {
            tessera_bail!(MismatchedTypes: self.header.data_type, value.data_type());
        }
        if self.docs_written == self.header.num_docs as usize {
            tessera_bail!(AssertionFailed: "all {} documents already written", self.header.num_docs);
        }
        if self.header.entry_size == 0 {
            self.var_offsets.push(u32::try_from(self.chunk.len())?);
        }
        value.write_le(&mut self.chunk);
        self.docs_in_chunk += 1;
        self.docs_written += 1;
        if self.docs_in_chunk == self.header.docs_per_chunk as usize {
            self.flush_chunk()?;
        }
        Ok(())
    }

    fn flush_chunk(&mut self) -> TesseraResult<()> {
        if self.docs_in_chunk == 0 {
            return Ok(());
        }
        let compressed = if self.header.entry_size == 0 {
            self.var_offsets.push(u32::try_from(self.chunk.len())?);
            let mut framed = Vec::with_capacity(self.var_offsets.len() * 4 + self.chunk.len());
            for offset in &self.var_offsets {
                framed.extend_from_slice(&offset.to_le_bytes());
            }
            framed.extend_from_slice(&self.chunk);
            self.var_offsets.clear();
            self.header.compression.compress(&framed)?
        } else {
            self.header.compression.compress(&self.chunk)?
        };
        self.chunk_offsets.push(self.data.len() as u64);
        self.data.extend_from_slice(&compressed);
        self.chunk.clear();
        self.docs_in_chunk = 0;
        Ok(())
    }

    pub fn finish(mut self) -> TesseraResult<Vec<u8>> {
        self.flush_chunk()?;
        if self.docs_written != self.header.num_docs as usize {
            tessera_bail!(
                AssertionFailed: "expected {} documents, {} written",
                self.header.num_docs,
                self.docs_written
            );
        }
        let prefix = self.header.prefix_len();
        let size = (prefix + self.data.len()) as u64;
        if size >= MAX_FILE_SIZE {
            tessera_bail!(
                Capacity: "raw forward index of {} bytes exceeds the {} byte file limit",
                size,
                MAX_FILE_SIZE
            );
        }
        log::debug!(
            "chunk writer: {} docs in {} {} chunks, {} bytes",
            self.docs_written,
            self.header.num_chunks,
            self.header.compression,
            size
        );

        let mut out = Vec::with_capacity(prefix + self.data.len());
        self.header.write(&mut out);
        let end = self.data.len() as u64;
        for offset in self.chunk_offsets.iter().copied().chain([end]) {
            out.extend_from_slice(&(offset + prefix as u64).to_le_bytes());
        }
        out.extend_from_slice(&self.data);
        Ok(out)
    }
}

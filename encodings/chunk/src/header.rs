use tessera_buffer::ByteBuffer;
use tessera_dtype::DataType;
use tessera_error::{TesseraResult, tessera_bail, tessera_err};

use crate::ChunkCompressionType;

pub const CHUNK_FORMAT_VERSION: u32 = 1;

/// Fixed-size prefix of a chunk-compressed file, followed by one u64 byte offset per chunk and
/// the end offset of the last chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub compression: ChunkCompressionType,
    pub data_type: DataType,
    pub num_chunks: u32,
    pub docs_per_chunk: u32,
    pub num_docs: u32,
    /// Bytes per entry for fixed-width types, zero for variable-width types.
    pub entry_size: u32,
}

impl ChunkHeader {
    pub const SIZE: usize = 24;

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&CHUNK_FORMAT_VERSION.to_le_bytes());
        out.push(self.compression.into());
        out.push(self.data_type.into());
        out.extend_from_slice(&[0u8; 2]);
        out.extend_from_slice(&self.num_chunks.to_le_bytes());
        out.extend_from_slice(&self.docs_per_chunk.to_le_bytes());
        out.extend_from_slice(&self.num_docs.to_le_bytes());
        out.extend_from_slice(&self.entry_size.to_le_bytes());
    }

    pub fn read(buffer: &ByteBuffer) -> TesseraResult<Self> {
        if buffer.len() < Self::SIZE {
            tessera_bail!(InvalidSerde: "chunk file of {} bytes has no header", buffer.len());
        }
        let version = buffer.u32_le(0)?;
        if version != CHUNK_FORMAT_VERSION {
            tessera_bail!(InvalidSerde: "unsupported chunk format version {}", version);
        }
        let compression = ChunkCompressionType::try_from(buffer[4])
            .map_err(|_| tessera_err!(InvalidSerde: "unknown chunk compression {}", buffer[4]))?;
        let data_type = DataType::try_from(buffer[5])
            .map_err(|_| tessera_err!(InvalidSerde: "unknown data type {}", buffer[5]))?;
        let header = Self {
            compression,
            data_type,
            num_chunks: buffer.u32_le(8)?,
            docs_per_chunk: buffer.u32_le(12)?,
            num_docs: buffer.u32_le(16)?,
            entry_size: buffer.u32_le(20)?,
        };
        if header.docs_per_chunk == 0 {
            tessera_bail!(InvalidSerde: "chunk file declares zero documents per chunk");
        }
        if header.num_docs.div_ceil(header.docs_per_chunk) != header.num_chunks {
            tessera_bail!(
                InvalidSerde: "{} chunks cannot hold {} documents at {} per chunk",
                header.num_chunks,
                header.num_docs,
                header.docs_per_chunk
            );
        }
        Ok(header)
    }

    /// Byte length of the header plus the chunk offset table.
    pub fn prefix_len(&self) -> usize {
        Self::SIZE + (self.num_chunks as usize + 1) * 8
    }
}

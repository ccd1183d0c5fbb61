use std::sync::atomic::{AtomicU64, Ordering};

use tessera_buffer::ByteBuffer;
use tessera_dtype::{DataType, Value};
use tessera_error::{TesseraResult, tessera_bail, tessera_err};

use crate::ChunkHeader;

static NEXT_READER_ID: AtomicU64 = AtomicU64::new(0);

/// Scratch state holding the most recently decompressed chunk and the reader it came from.
///
/// Readers are immutable and shared between queries; each query owns its contexts. A context
/// passed to a different reader decompresses afresh.
#[derive(Debug, Default)]
pub struct ChunkReaderContext {
    cached: Option<(u64, usize)>,
    chunk: Vec<u8>,
}

impl ChunkReaderContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Random access over a chunk-compressed raw forward index.
#[derive(Debug, Clone)]
pub struct ChunkReader {
    /// Identifies the file contents in [`ChunkReaderContext`]; clones share it.
    id: u64,
    header: ChunkHeader,
    chunk_ranges: Vec<(usize, usize)>,
    buffer: ByteBuffer,
}

impl ChunkReader {
    pub fn try_new(buffer: ByteBuffer) -> TesseraResult<Self> {
        let header = ChunkHeader::read(&buffer)?;
        if buffer.len() < header.prefix_len() {
            tessera_bail!(
                InvalidSerde: "chunk offset table truncated: expected {} bytes, found {}",
                header.prefix_len(),
                buffer.len()
            );
        }
        let num_chunks = header.num_chunks as usize;
        let mut offsets = Vec::with_capacity(num_chunks + 1);
        for i in 0..=num_chunks {
            offsets.push(usize::try_from(
                buffer.u64_le(ChunkHeader::SIZE + i * 8)?,
            )?);
        }
        if offsets.last() != Some(&buffer.len()) {
            tessera_bail!(
                InvalidSerde: "chunk data ends at {}, file holds {} bytes",
                offsets.last().copied().unwrap_or_default(),
                buffer.len()
            );
        }
        let mut chunk_ranges = Vec::with_capacity(num_chunks);
        for (i, window) in offsets.windows(2).enumerate() {
            let (start, end) = (window[0], window[1]);
            if start < header.prefix_len() || start > end {
                tessera_bail!(InvalidSerde: "chunk {} has invalid range {}..{}", i, start, end);
            }
            chunk_ranges.push((start, end));
        }
        Ok(Self {
            id: NEXT_READER_ID.fetch_add(1, Ordering::Relaxed),
            header,
            chunk_ranges,
            buffer,
        })
    }

    pub fn data_type(&self) -> DataType {
        self.header.data_type
    }

    pub fn num_docs(&self) -> usize {
        self.header.num_docs as usize
    }

    pub fn header(&self) -> &ChunkHeader {
        &self.header
    }

    fn load_chunk(&self, chunk_id: usize, ctx: &mut ChunkReaderContext) -> TesseraResult<()> {
        if ctx.cached == Some((self.id, chunk_id)) {
            return Ok(());
        }
        ctx.cached = None;
        let (start, end) = self.chunk_ranges[chunk_id];
        self.header
            .compression
            .decompress_into(&self.buffer[start..end], &mut ctx.chunk)?;
        ctx.cached = Some((self.id, chunk_id));
        Ok(())
    }

    /// Run `f` over the encoded bytes of `doc_id`'s value.
    pub fn with_value_bytes<R>(
        &self,
        doc_id: u32,
        ctx: &mut ChunkReaderContext,
        f: impl FnOnce(&[u8]) -> R,
    ) -> TesseraResult<R> {
        let doc = doc_id as usize;
        if doc >= self.num_docs() {
            return Err(tessera_err!(OutOfBounds: doc, 0, self.num_docs()));
        }
        let docs_per_chunk = self.header.docs_per_chunk as usize;
        let chunk_id = doc / docs_per_chunk;
        let row = doc % docs_per_chunk;
        self.load_chunk(chunk_id, ctx)?;

        let chunk = ctx.chunk.as_slice();
        let range = if self.header.entry_size > 0 {
            let width = self.header.entry_size as usize;
            row * width..(row + 1) * width
        } else {
            let docs_in_chunk = docs_per_chunk.min(self.num_docs() - chunk_id * docs_per_chunk);
            let payload = (docs_in_chunk + 1) * 4;
            let read = |i: usize| -> TesseraResult<usize> {
                chunk
                    .get(i * 4..i * 4 + 4)
                    .and_then(|b| <[u8; 4]>::try_from(b).ok())
                    .map(|b| u32::from_le_bytes(b) as usize)
                    .ok_or_else(|| tessera_err!(InvalidSerde: "chunk {} offsets truncated", chunk_id))
            };
            payload + read(row)?..payload + read(row + 1)?
        };
        chunk
            .get(range.clone())
            .map(f)
            .ok_or_else(|| {
                tessera_err!(
                    InvalidSerde: "value of doc {} at {}..{} lies outside chunk {}",
                    doc_id,
                    range.start,
                    range.end,
                    chunk_id
                )
            })
    }

    pub fn get(&self, doc_id: u32, ctx: &mut ChunkReaderContext) -> TesseraResult<Value> {
        let dtype = self.header.data_type;
        self.with_value_bytes(doc_id, ctx, |bytes| Value::from_le_bytes(dtype, bytes))?
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;
    use tessera_buffer::ByteBuffer;
    use tessera_dtype::{DataType, Value};

    use crate::{ChunkCompressionType, ChunkReader, ChunkReaderContext, ChunkWriter};

    fn values(dtype: DataType, n: usize) -> Vec<Value> {
        (0..n)
            .map(|i| match dtype {
                DataType::Int => Value::Int(i as i32 * 7 - 300),
                DataType::Long => Value::Long((i as i64) << 33),
                DataType::Float => Value::Float(i as f32 / 4.0),
                DataType::Double => Value::Double(i as f64 * -1.5),
                DataType::String => Value::String("x".repeat(i % 13)),
                DataType::Bytes => Value::Bytes(vec![i as u8; i % 5]),
            })
            .collect()
    }

    fn write(values: &[Value], dtype: DataType, codec: ChunkCompressionType) -> ByteBuffer {
        let mut writer = ChunkWriter::try_new(dtype, codec, values.len(), 64).unwrap();
        for v in values {
            writer.push(v).unwrap();
        }
        ByteBuffer::from(writer.finish().unwrap())
    }

    #[rstest]
    fn round_trip(
        #[values(
            ChunkCompressionType::PassThrough,
            ChunkCompressionType::Lz4,
            ChunkCompressionType::Zstd
        )]
        codec: ChunkCompressionType,
        #[values(
            DataType::Int,
            DataType::Long,
            DataType::Float,
            DataType::Double,
            DataType::String,
            DataType::Bytes
        )]
        dtype: DataType,
    ) {
        let expected = values(dtype, 300);
        let reader = ChunkReader::try_new(write(&expected, dtype, codec)).unwrap();
        assert_eq!(reader.num_docs(), 300);
        let mut ctx = ChunkReaderContext::new();
        for (doc, v) in expected.iter().enumerate() {
            assert_eq!(&reader.get(doc as u32, &mut ctx).unwrap(), v);
        }
        // backwards access forces chunk reloads through the same context
        for doc in (0..300u32).rev().step_by(37) {
            assert_eq!(reader.get(doc, &mut ctx).unwrap(), expected[doc as usize]);
        }
    }

    #[test]
    fn context_shared_between_readers() {
        let ints = values(DataType::Int, 10);
        let thousands: Vec<Value> = (0..10).map(|i| Value::Int(i * 1000)).collect();
        let first = ChunkReader::try_new(write(&ints, DataType::Int, ChunkCompressionType::Lz4)).unwrap();
        let second = ChunkReader::try_new(write(&thousands, DataType::Int, ChunkCompressionType::Lz4)).unwrap();
        let mut ctx = ChunkReaderContext::new();
        for doc in 0..10u32 {
            assert_eq!(first.get(doc, &mut ctx).unwrap(), ints[doc as usize]);
            assert_eq!(second.get(doc, &mut ctx).unwrap(), thousands[doc as usize]);
        }
        assert_eq!(first.clone().get(4, &mut ctx).unwrap(), ints[4]);
    }

    #[test]
    fn wrong_type_rejected() {
        let mut writer =
            ChunkWriter::try_new(DataType::Int, ChunkCompressionType::Lz4, 1, 8).unwrap();
        assert!(writer.push(&Value::Long(1)).is_err());
    }

    #[test]
    fn missing_documents_rejected() {
        let mut writer =
            ChunkWriter::try_new(DataType::Int, ChunkCompressionType::Lz4, 2, 8).unwrap();
        writer.push(&Value::Int(1)).unwrap();
        assert!(writer.finish().is_err());
    }

    #[test]
    fn truncated_file_rejected() {
        let buffer = write(&values(DataType::Long, 10), DataType::Long, ChunkCompressionType::PassThrough);
        let truncated = buffer.slice(0..30).unwrap();
        assert!(ChunkReader::try_new(truncated).is_err());
    }

    #[test]
    fn out_of_range_doc() {
        let buffer = write(&values(DataType::Int, 3), DataType::Int, ChunkCompressionType::Lz4);
        let reader = ChunkReader::try_new(buffer).unwrap();
        assert!(reader.get(3, &mut ChunkReaderContext::new()).is_err());
    }
}

use roaring::RoaringBitmap;
use tessera_buffer::ByteBuffer;
use tessera_error::{TesseraResult, tessera_bail, tessera_err};

/// Accumulates per-dictId document bitmaps while a segment is written.
#[derive(Debug)]
pub struct InvertedIndexWriter {
    bitmaps: Vec<RoaringBitmap>,
}

impl InvertedIndexWriter {
    pub fn new(cardinality: usize) -> Self {
        Self {
            bitmaps: vec![RoaringBitmap::new(); cardinality],
        }
    }

    pub fn add(&mut self, dict_id: u32, doc_id: u32) -> TesseraResult<()> {
        let cardinality = self.bitmaps.len();
        self.bitmaps
            .get_mut(dict_id as usize)
            .ok_or_else(|| tessera_err!(OutOfBounds: dict_id as usize, 0, cardinality))?
            .insert(doc_id);
        Ok(())
    }

    /// Layout: `cardinality + 1` u32 byte offsets, then the portable roaring serializations.
    pub fn finish(self) -> TesseraResult<Vec<u8>> {
        let header_len = (self.bitmaps.len() + 1) * 4;
        let mut payload = Vec::new();
        let mut offsets = Vec::with_capacity(self.bitmaps.len() + 1);
        for bitmap in &self.bitmaps {
            offsets.push(u32::try_from(header_len + payload.len())?);
            bitmap.serialize_into(&mut payload)?;
        }
        offsets.push(u32::try_from(header_len + payload.len())?);
        let mut out = Vec::with_capacity(header_len + payload.len());
        for offset in offsets {
            out.extend_from_slice(&offset.to_le_bytes());
        }
        out.extend_from_slice(&payload);
        Ok(out)
    }
}

/// Maps a dictId to the bitmap of documents holding it.
#[derive(Debug, Clone)]
pub struct BitmapInvertedIndexReader {
    cardinality: usize,
    buffer: ByteBuffer,
}

impl BitmapInvertedIndexReader {
    pub fn try_new(buffer: ByteBuffer, cardinality: usize) -> TesseraResult<Self> {
        let header_len = (cardinality + 1) * 4;
        if buffer.len() < header_len {
            tessera_bail!(
                InvalidSerde: "inverted index header truncated: expected {} bytes, found {}",
                header_len,
                buffer.len()
            );
        }
        let mut previous = header_len;
        for i in 0..=cardinality {
            let offset = buffer.u32_le(i * 4)? as usize;
            if offset < previous || offset > buffer.len() {
                tessera_bail!(InvalidSerde: "inverted index offset {} of dictId {} is invalid", offset, i);
            }
            previous = offset;
        }
        if previous != buffer.len() {
            tessera_bail!(
                InvalidSerde: "inverted index holds {} bytes, offsets cover {}",
                buffer.len(),
                previous
            );
        }
        Ok(Self { cardinality, buffer })
    }

    pub fn cardinality(&self) -> usize {
        self.cardinality
    }

    pub fn doc_ids(&self, dict_id: u32) -> TesseraResult<RoaringBitmap> {
        let id = dict_id as usize;
        if id >= self.cardinality {
            return Err(tessera_err!(OutOfBounds: id, 0, self.cardinality));
        }
        let start = self.buffer.u32_le(id * 4)? as usize;
        let end = self.buffer.u32_le(id * 4 + 4)? as usize;
        RoaringBitmap::deserialize_from(&self.buffer[start..end])
            .map_err(|e| tessera_err!(InvalidSerde: "bitmap of dictId {} is corrupt: {}", id, e))
    }
}

#[cfg(test)]
mod test {
    use roaring::RoaringBitmap;
    use tessera_buffer::ByteBuffer;

    use crate::index::{BitmapInvertedIndexReader, InvertedIndexWriter};

    #[test]
    fn round_trip() {
        let ids = [1u32, 1, 0, 0, 0, 2];
        let mut writer = InvertedIndexWriter::new(3);
        for (doc, id) in ids.iter().enumerate() {
            writer.add(*id, doc as u32).unwrap();
        }
        let reader =
            BitmapInvertedIndexReader::try_new(ByteBuffer::from(writer.finish().unwrap()), 3).unwrap();
        assert_eq!(reader.doc_ids(0).unwrap(), RoaringBitmap::from_iter([2u32, 3, 4]));
        assert_eq!(reader.doc_ids(1).unwrap(), RoaringBitmap::from_iter([0u32, 1]));
        assert_eq!(reader.doc_ids(2).unwrap(), RoaringBitmap::from_iter([5u32]));
        assert!(reader.doc_ids(3).is_err());
    }

    #[test]
    fn truncated_rejected() {
        let mut writer = InvertedIndexWriter::new(2);
        writer.add(0, 0).unwrap();
        writer.add(1, 1).unwrap();
        let mut bytes = writer.finish().unwrap();
        bytes.truncate(bytes.len() - 1);
        assert!(BitmapInvertedIndexReader::try_new(ByteBuffer::from(bytes), 2).is_err());
    }

    #[test]
    fn unknown_dict_id_rejected() {
        let mut writer = InvertedIndexWriter::new(1);
        assert!(writer.add(1, 0).is_err());
    }
}

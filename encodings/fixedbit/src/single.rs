use tessera_buffer::ByteBuffer;
use tessera_error::{TesseraResult, tessera_bail};

use crate::{BitPacker, BitUnpacker, MAX_FILE_SIZE, packed_len};

/// Writes one packed dictId per document.
pub struct FixedBitSingleValueWriter {
    num_docs: usize,
    packer: BitPacker,
}

impl FixedBitSingleValueWriter {
    pub fn try_new(num_docs: usize, bits: u8) -> TesseraResult<Self> {
        let size = packed_len(num_docs, bits) as u64;
        if size >= MAX_FILE_SIZE {
            tessera_bail!(
                Capacity: "single-value forward index of {} bytes exceeds the {} byte file limit",
                size,
                MAX_FILE_SIZE
            );
        }
        Ok(Self {
            num_docs,
            packer: BitPacker::with_capacity(bits, num_docs)?,
        })
    }

    pub fn push(&mut self, dict_id: u32) -> TesseraResult<()> {
        if self.packer.len() == self.num_docs {
            tessera_bail!(AssertionFailed: "all {} documents already written", self.num_docs);
        }
        self.packer.push(dict_id)
    }

    pub fn finish(self) -> TesseraResult<Vec<u8>> {
        if self.packer.len() != self.num_docs {
            tessera_bail!(
                AssertionFailed: "expected {} documents, {} written",
                self.num_docs,
                self.packer.len()
            );
        }
        Ok(self.packer.finish())
    }
}

/// Reads one packed dictId per document.
#[derive(Debug, Clone)]
pub struct FixedBitSingleValueReader {
    values: BitUnpacker,
}

impl FixedBitSingleValueReader {
    pub fn try_new(buffer: ByteBuffer, num_docs: usize, bits: u8) -> TesseraResult<Self> {
        Ok(Self {
            values: BitUnpacker::try_new(buffer, bits, num_docs)?,
        })
    }

    pub fn num_docs(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn get(&self, doc_id: u32) -> TesseraResult<u32> {
        self.values.get(doc_id as usize)
    }

    /// Read the dictIds of `doc_ids` into the front of `out`.
    pub fn read_dict_ids(&self, doc_ids: &[u32], out: &mut [u32]) -> TesseraResult<()> {
        if out.len() < doc_ids.len() {
            tessera_bail!(
                AssertionFailed: "output buffer of {} too small for {} documents",
                out.len(),
                doc_ids.len()
            );
        }
        for (slot, doc_id) in out.iter_mut().zip(doc_ids) {
            *slot = self.values.get(*doc_id as usize)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use tessera_buffer::ByteBuffer;

    use crate::{FixedBitSingleValueReader, FixedBitSingleValueWriter};

    #[test]
    fn round_trip() {
        let dict_ids = [0u32, 3, 1, 2, 3, 3, 0];
        let mut writer = FixedBitSingleValueWriter::try_new(dict_ids.len(), 2).unwrap();
        for id in dict_ids {
            writer.push(id).unwrap();
        }
        let bytes = writer.finish().unwrap();
        assert_eq!(bytes.len(), 2);

        let reader = FixedBitSingleValueReader::try_new(ByteBuffer::from(bytes), 7, 2).unwrap();
        let mut out = [0u32; 3];
        reader.read_dict_ids(&[6, 1, 4], &mut out).unwrap();
        assert_eq!(out, [0, 3, 3]);
        assert_eq!(reader.get(2).unwrap(), 1);
        assert!(reader.get(7).is_err());
    }

    #[test]
    fn document_count_enforced() {
        let mut writer = FixedBitSingleValueWriter::try_new(2, 1).unwrap();
        writer.push(1).unwrap();
        assert!(FixedBitSingleValueWriter::finish(writer).is_err());

        let mut writer = FixedBitSingleValueWriter::try_new(1, 1).unwrap();
        writer.push(1).unwrap();
        assert!(writer.push(0).is_err());
    }

    #[test]
    fn capacity_checked_up_front() {
        assert!(FixedBitSingleValueWriter::try_new(1 << 31, 8).is_err());
    }
}

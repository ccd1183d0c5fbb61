use std::ops::Range;

use tessera_buffer::ByteBuffer;
use tessera_error::{TesseraResult, tessera_bail, tessera_err};

/// Writes the sorted index of a column whose documents are ordered by dictId.
///
/// Each dictId owns a `[start, end)` pair of u32 document ids.
pub fn write_sorted_index(dict_ids: &[u32], cardinality: usize) -> TesseraResult<Vec<u8>> {
    let mut ranges = vec![(0u32, 0u32); cardinality];
    let mut seen = vec![false; cardinality];
    let mut previous: Option<u32> = None;
    for (doc, id) in dict_ids.iter().enumerate() {
        let doc = u32::try_from(doc)?;
        if previous.is_some_and(|p| p > *id) {
            tessera_bail!(AssertionFailed: "doc {} breaks dictId order of a sorted column", doc);
        }
        let slot = ranges
            .get_mut(*id as usize)
            .ok_or_else(|| tessera_err!(OutOfBounds: *id as usize, 0, cardinality))?;
        if !seen[*id as usize] {
            seen[*id as usize] = true;
            slot.0 = doc;
        }
        slot.1 = doc + 1;
        previous = Some(*id);
    }
    if let Some(missing) = seen.iter().position(|s| !s) {
        tessera_bail!(AssertionFailed: "dictId {} has no documents", missing);
    }
    let mut out = Vec::with_capacity(cardinality * 8);
    for (start, end) in ranges {
        out.extend_from_slice(&start.to_le_bytes());
        out.extend_from_slice(&end.to_le_bytes());
    }
    Ok(out)
}

/// Forward and inverted index in one for sorted single-value columns.
#[derive(Debug, Clone)]
pub struct SortedIndexReader {
    cardinality: usize,
    num_docs: usize,
    ranges: ByteBuffer,
}

impl SortedIndexReader {
    pub fn try_new(ranges: ByteBuffer, cardinality: usize, num_docs: usize) -> TesseraResult<Self> {
        if ranges.len() != cardinality * 8 {
            tessera_bail!(
                InvalidSerde: "sorted index of cardinality {} needs {} bytes, found {}",
                cardinality,
                cardinality * 8,
                ranges.len()
            );
        }
        let reader = Self {
            cardinality,
            num_docs,
            ranges,
        };
        let mut expected_start = 0;
        for id in 0..cardinality as u32 {
            let range = reader.doc_range(id)?;
            if range.start != expected_start || range.end <= range.start {
                tessera_bail!(InvalidSerde: "sorted index range {}..{} of dictId {} is not contiguous", range.start, range.end, id);
            }
            expected_start = range.end;
        }
        if expected_start as usize != num_docs {
            tessera_bail!(InvalidSerde: "sorted index covers {} of {} documents", expected_start, num_docs);
        }
        Ok(reader)
    }

    pub fn cardinality(&self) -> usize {
        self.cardinality
    }

    /// Documents holding `dict_id`.
    pub fn doc_range(&self, dict_id: u32) -> TesseraResult<Range<u32>> {
        let id = dict_id as usize;
        if id >= self.cardinality {
            return Err(tessera_err!(OutOfBounds: id, 0, self.cardinality));
        }
        Ok(self.ranges.u32_le(id * 8)?..self.ranges.u32_le(id * 8 + 4)?)
    }

    /// The dictId of `doc_id`, by binary search over the range ends.
    pub fn dict_id(&self, doc_id: u32) -> TesseraResult<u32> {
        if doc_id as usize >= self.num_docs {
            return Err(tessera_err!(OutOfBounds: doc_id as usize, 0, self.num_docs));
        }
        let (mut low, mut high) = (0usize, self.cardinality);
        while low < high {
            let mid = low + (high - low) / 2;
            if self.ranges.u32_le(mid * 8 + 4)? <= doc_id {
                low = mid + 1;
            } else {
                high = mid;
            }
        }
        Ok(low as u32)
    }

    /// Read dictIds of ascending `doc_ids`, walking forward from the previous match.
    pub fn read_dict_ids(&self, doc_ids: &[u32], out: &mut [u32]) -> TesseraResult<()> {
        if out.len() < doc_ids.len() {
            tessera_bail!(
                AssertionFailed: "output buffer of {} too small for {} documents",
                out.len(),
                doc_ids.len()
            );
        }
        let mut current: Option<(u32, Range<u32>)> = None;
        for (slot, doc) in out.iter_mut().zip(doc_ids) {
            let cached = current
                .as_ref()
                .filter(|(_, range)| range.contains(doc))
                .map(|(id, _)| *id);
            *slot = match cached {
                Some(id) => id,
                None => {
                    let id = self.dict_id(*doc)?;
                    current = Some((id, self.doc_range(id)?));
                    id
                }
            };
        }
        Ok(())
    }
}

use std::cmp::Ordering;
use std::ops::{Bound, Range};
use std::sync::OnceLock;

use num_traits::NumCast;
use rustc_hash::{FxBuildHasher, FxHashMap};
use tessera_buffer::ByteBuffer;
use tessera_dtype::{DataType, Value, numeric_from_le_bytes};
use tessera_error::{TesseraResult, tessera_bail, tessera_err};

#[derive(Debug, Clone)]
enum DictStorage {
    Fixed { values: ByteBuffer, width: usize },
    Var { offsets: ByteBuffer, data: ByteBuffer },
}

/// Read-only mapping between dense dictIds and the distinct values of a column.
///
/// Fixed-width values are stored little-endian back to back. Strings and bytes store
/// `cardinality + 1` u32 offsets followed by the concatenated payload.
#[derive(Debug)]
pub struct Dictionary {
    data_type: DataType,
    cardinality: usize,
    is_sorted: bool,
    storage: DictStorage,
    lookup: OnceLock<FxHashMap<Value, u32>>,
}

impl Dictionary {
    pub fn try_new(
        buffer: ByteBuffer,
        data_type: DataType,
        cardinality: usize,
        is_sorted: bool,
    ) -> TesseraResult<Self> {
        let storage = match data_type.byte_width() {
            Some(width) => {
                let expected = width * cardinality;
                if buffer.len() != expected {
                    tessera_bail!(
                        InvalidSerde: "dictionary of {} {} values needs {} bytes, found {}",
                        cardinality,
                        data_type,
                        expected,
                        buffer.len()
                    );
                }
                DictStorage::Fixed {
                    values: buffer,
                    width,
                }
            }
            None => {
                let (offsets, data) = buffer.split_at((cardinality + 1) * 4)?;
                let mut previous = 0;
                for i in 0..=cardinality {
                    let offset = offsets.u32_le(i * 4)? as usize;
                    if offset < previous || offset > data.len() {
                        tessera_bail!(InvalidSerde: "dictionary offset {} of entry {} is invalid", offset, i);
                    }
                    previous = offset;
                }
                if previous != data.len() {
                    tessera_bail!(
                        InvalidSerde: "dictionary payload holds {} bytes, offsets cover {}",
                        data.len(),
                        previous
                    );
                }
                DictStorage::Var { offsets, data }
            }
        };
        Ok(Self {
            data_type,
            cardinality,
            is_sorted,
            storage,
            lookup: OnceLock::new(),
        })
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn len(&self) -> usize {
        self.cardinality
    }

    pub fn is_empty(&self) -> bool {
        self.cardinality == 0
    }

    pub fn is_sorted(&self) -> bool {
        self.is_sorted
    }

    fn bytes(&self, dict_id: u32) -> TesseraResult<&[u8]> {
        let id = dict_id as usize;
        if id >= self.cardinality {
            return Err(tessera_err!(OutOfBounds: id, 0, self.cardinality));
        }
        match &self.storage {
            DictStorage::Fixed { values, width } => Ok(&values[id * width..(id + 1) * width]),
            DictStorage::Var { offsets, data } => {
                let start = offsets.u32_le(id * 4)? as usize;
                let end = offsets.u32_le((id + 1) * 4)? as usize;
                Ok(&data[start..end])
            }
        }
    }

    /// The value of `dict_id`.
    pub fn get(&self, dict_id: u32) -> TesseraResult<Value> {
        Value::from_le_bytes(self.data_type, self.bytes(dict_id)?)
    }

    /// The numeric value of `dict_id` converted to `T`.
    pub fn get_numeric<T: NumCast>(&self, dict_id: u32) -> TesseraResult<T> {
        numeric_from_le_bytes(self.data_type, self.bytes(dict_id)?)
    }

    /// Raw bytes of a string or bytes dictionary entry.
    pub fn get_bytes(&self, dict_id: u32) -> TesseraResult<Vec<u8>> {
        match self.storage {
            DictStorage::Var { .. } => Ok(self.bytes(dict_id)?.to_vec()),
            DictStorage::Fixed { .. } => tessera_bail!(MismatchedTypes: "STRING or BYTES", self.data_type),
        }
    }

    pub fn read_values(&self, dict_ids: &[u32], out: &mut Vec<Value>) -> TesseraResult<()> {
        out.clear();
        for id in dict_ids {
            out.push(self.get(*id)?);
        }
        Ok(())
    }

    fn compare_at(&self, dict_id: u32, value: &Value) -> TesseraResult<Ordering> {
        match (&self.storage, value.as_bytes()) {
            (DictStorage::Var { .. }, Some(bytes)) => Ok(self.bytes(dict_id)?.cmp(bytes)),
            _ => Ok(self.get(dict_id)?.cmp(value)),
        }
    }

    fn coerce(&self, value: &Value) -> Option<Value> {
        value.cast(self.data_type).ok()
    }

    /// Binary search a sorted dictionary: `Ok(id)` if present, `Err(insertion point)` if not.
    pub fn insertion_index_of(&self, value: &Value) -> TesseraResult<Result<u32, u32>> {
        if !self.is_sorted {
            tessera_bail!(InvalidState: "insertion index requires a sorted dictionary");
        }
        let value = self.coerce(value).ok_or_else(|| {
            tessera_err!(MismatchedTypes: self.data_type, value.data_type())
        })?;
        let (mut low, mut high) = (0usize, self.cardinality);
        while low < high {
            let mid = low + (high - low) / 2;
            match self.compare_at(mid as u32, &value)? {
                Ordering::Less => low = mid + 1,
                Ordering::Greater => high = mid,
                Ordering::Equal => return Ok(Ok(mid as u32)),
            }
        }
        Ok(Err(low as u32))
    }

    /// The dictId of `value`, or `None` if it is absent or cannot be represented in this type.
    ///
    /// Sorted dictionaries use binary search; unsorted ones build a hash lookup on first use.
    pub fn index_of(&self, value: &Value) -> TesseraResult<Option<u32>> {
        let Some(value) = self.coerce(value) else {
            return Ok(None);
        };
        if self.is_sorted {
            return Ok(self.insertion_index_of(&value)?.ok());
        }
        if let Some(lookup) = self.lookup.get() {
            return Ok(lookup.get(&value).copied());
        }
        let mut lookup = FxHashMap::with_capacity_and_hasher(self.cardinality, FxBuildHasher);
        for id in 0..self.cardinality as u32 {
            lookup.insert(self.get(id)?, id);
        }
        Ok(self.lookup.get_or_init(|| lookup).get(&value).copied())
    }

    /// The contiguous range of dictIds whose values fall within the bounds.
    pub fn dict_id_range(&self, lower: Bound<&Value>, upper: Bound<&Value>) -> TesseraResult<Range<u32>> {
        let start = match lower {
            Bound::Unbounded => 0,
            Bound::Included(v) => match self.insertion_index_of(v)? {
                Ok(id) | Err(id) => id,
            },
            Bound::Excluded(v) => match self.insertion_index_of(v)? {
                Ok(id) => id + 1,
                Err(id) => id,
            },
        };
        let end = match upper {
            Bound::Unbounded => self.cardinality as u32,
            Bound::Included(v) => match self.insertion_index_of(v)? {
                Ok(id) => id + 1,
                Err(id) => id,
            },
            Bound::Excluded(v) => match self.insertion_index_of(v)? {
                Ok(id) | Err(id) => id,
            },
        };
        Ok(start..end.max(start))
    }

    pub fn min_value(&self) -> TesseraResult<Option<Value>> {
        self.extreme(Ordering::Less)
    }

    pub fn max_value(&self) -> TesseraResult<Option<Value>> {
        self.extreme(Ordering::Greater)
    }

    fn extreme(&self, wanted: Ordering) -> TesseraResult<Option<Value>> {
        if self.cardinality == 0 {
            return Ok(None);
        }
        if self.is_sorted {
            let id = if wanted == Ordering::Less { 0 } else { self.cardinality - 1 };
            return self.get(id as u32).map(Some);
        }
        let mut best = self.get(0)?;
        for id in 1..self.cardinality as u32 {
            let v = self.get(id)?;
            if v.cmp(&best) == wanted {
                best = v;
            }
        }
        Ok(Some(best))
    }
}

/// Collects the distinct values of a column while rows are ingested.
#[derive(Debug)]
pub struct DictionaryBuilder {
    data_type: DataType,
    lookup: FxHashMap<Value, u32>,
    values: Vec<Value>,
}

/// A finished dictionary plus the mapping from ingestion-order ids to final dictIds.
#[derive(Debug)]
pub struct SealedDictionary {
    pub values: Vec<Value>,
    pub remap: Vec<u32>,
    pub is_sorted: bool,
}

impl DictionaryBuilder {
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            lookup: FxHashMap::with_hasher(FxBuildHasher),
            values: Vec::new(),
        }
    }

    /// Return the provisional id of `value`, adding it if unseen.
    pub fn index(&mut self, value: &Value) -> TesseraResult<u32> {
        if value.data_type() != self.data_type {
            tessera_bail!(MismatchedTypes: self.data_type, value.data_type());
        }
        if let Some(id) = self.lookup.get(value) {
            return Ok(*id);
        }
        let id = u32::try_from(self.values.len())?;
        self.lookup.insert(value.clone(), id);
        self.values.push(value.clone());
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn seal(self, sort: bool) -> SealedDictionary {
        if !sort {
            let remap = (0..self.values.len() as u32).collect();
            let is_sorted = self.values.is_sorted();
            return SealedDictionary {
                values: self.values,
                remap,
                is_sorted,
            };
        }
        let mut order: Vec<u32> = (0..self.values.len() as u32).collect();
        order.sort_by(|a, b| self.values[*a as usize].cmp(&self.values[*b as usize]));
        let mut remap = vec![0u32; order.len()];
        for (new_id, old_id) in order.iter().enumerate() {
            remap[*old_id as usize] = new_id as u32;
        }
        let mut slots: Vec<Option<Value>> = self.values.into_iter().map(Some).collect();
        let values = order
            .iter()
            .filter_map(|old| slots[*old as usize].take())
            .collect();
        SealedDictionary {
            values,
            remap,
            is_sorted: true,
        }
    }
}

impl SealedDictionary {
    /// Serialize the dictionary values in dictId order.
    pub fn to_bytes(&self, data_type: DataType) -> TesseraResult<Vec<u8>> {
        let mut out = Vec::new();
        if data_type.byte_width().is_some() {
            for v in &self.values {
                v.write_le(&mut out);
            }
            return Ok(out);
        }
        let mut payload = Vec::new();
        let mut offsets = Vec::with_capacity(self.values.len() + 1);
        for v in &self.values {
            offsets.push(u32::try_from(payload.len())?);
            v.write_le(&mut payload);
        }
        offsets.push(u32::try_from(payload.len())?);
        for offset in offsets {
            out.extend_from_slice(&offset.to_le_bytes());
        }
        out.extend_from_slice(&payload);
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use std::ops::Bound;

    use rand::Rng;
    use rstest::rstest;
    use tessera_buffer::ByteBuffer;
    use tessera_dtype::{DataType, Value};

    use crate::{Dictionary, DictionaryBuilder};

    fn build(values: &[Value], dtype: DataType, sort: bool) -> (Dictionary, Vec<u32>) {
        let mut builder = DictionaryBuilder::new(dtype);
        let ids: Vec<u32> = values.iter().map(|v| builder.index(v).unwrap()).collect();
        let sealed = builder.seal(sort);
        let ids = ids.iter().map(|id| sealed.remap[*id as usize]).collect();
        let bytes = sealed.to_bytes(dtype).unwrap();
        let dict = Dictionary::try_new(
            ByteBuffer::from(bytes),
            dtype,
            sealed.values.len(),
            sealed.is_sorted,
        )
        .unwrap();
        (dict, ids)
    }

    fn strings(values: &[&str]) -> Vec<Value> {
        values.iter().map(|s| Value::from(*s)).collect()
    }

    #[rstest]
    #[case(true)]
    #[case(false)]
    fn bijection(#[case] sort: bool) {
        let mut rng = rand::rng();
        let values: Vec<Value> = (0..500)
            .map(|_| Value::Long(rng.random_range(-50..50)))
            .collect();
        let (dict, ids) = build(&values, DataType::Long, sort);
        for (v, id) in values.iter().zip(&ids) {
            assert_eq!(&dict.get(*id).unwrap(), v);
            assert_eq!(dict.index_of(v).unwrap(), Some(*id));
        }
        if sort {
            assert!(dict.is_sorted());
            for i in 1..dict.len() as u32 {
                assert!(dict.get(i - 1).unwrap() <= dict.get(i).unwrap());
            }
        }
        assert_eq!(dict.index_of(&Value::Long(1000)).unwrap(), None);
    }

    #[test]
    fn string_dictionary() {
        let values = strings(&["Rahul", "Zackie", "Rahul", "Amy", ""]);
        let (dict, ids) = build(&values, DataType::String, true);
        assert_eq!(dict.len(), 4);
        assert_eq!(ids, vec![2, 3, 2, 1, 0]);
        assert_eq!(dict.get(0).unwrap(), Value::from(""));
        assert_eq!(dict.index_of(&Value::from("Zackie")).unwrap(), Some(3));
        assert_eq!(dict.insertion_index_of(&Value::from("Bob")).unwrap(), Err(2));
        assert_eq!(dict.get_bytes(1).unwrap(), b"Amy".to_vec());
    }

    #[test]
    fn unsorted_dictionary_keeps_insertion_order() {
        let values = strings(&["IN", "CH", "US", "CH"]);
        let (dict, ids) = build(&values, DataType::String, false);
        assert!(!dict.is_sorted());
        assert_eq!(ids, vec![0, 1, 2, 1]);
        assert_eq!(dict.index_of(&Value::from("US")).unwrap(), Some(2));
        assert!(dict.insertion_index_of(&Value::from("US")).is_err());
        assert_eq!(dict.min_value().unwrap(), Some(Value::from("CH")));
        assert_eq!(dict.max_value().unwrap(), Some(Value::from("US")));
    }

    #[rstest]
    #[case(Bound::Included(2), Bound::Included(6), 1..4)]
    #[case(Bound::Excluded(2), Bound::Excluded(6), 2..3)]
    #[case(Bound::Included(3), Bound::Unbounded, 2..5)]
    #[case(Bound::Unbounded, Bound::Excluded(1), 0..0)]
    #[case(Bound::Excluded(9), Bound::Unbounded, 5..5)]
    fn ranges(#[case] lower: Bound<i32>, #[case] upper: Bound<i32>, #[case] expected: std::ops::Range<u32>) {
        // values 1, 2, 4, 6, 8
        let values: Vec<Value> = [8, 1, 4, 2, 6].into_iter().map(Value::Int).collect();
        let (dict, _) = build(&values, DataType::Int, true);
        let lower = lower.map(Value::Int);
        let upper = upper.map(Value::Int);
        assert_eq!(
            dict.dict_id_range(lower.as_ref(), upper.as_ref()).unwrap(),
            expected
        );
    }

    #[test]
    fn numeric_lookup_coerces_type() {
        let values: Vec<Value> = [3, 5].into_iter().map(Value::Int).collect();
        let (dict, _) = build(&values, DataType::Int, true);
        assert_eq!(dict.index_of(&Value::Long(5)).unwrap(), Some(1));
        assert_eq!(dict.index_of(&Value::from("5")).unwrap(), None);
        assert_eq!(dict.get_numeric::<f64>(0).unwrap(), 3.0);
    }

    #[test]
    fn truncated_dictionary_rejected() {
        assert!(Dictionary::try_new(ByteBuffer::from(vec![0u8; 7]), DataType::Long, 1, true).is_err());
        let bad_offsets = [0u32, 5].iter().flat_map(|o| o.to_le_bytes()).collect::<Vec<_>>();
        assert!(Dictionary::try_new(ByteBuffer::from(bad_offsets), DataType::String, 1, true).is_err());
    }

    #[test]
    fn type_mismatch_on_build() {
        let mut builder = DictionaryBuilder::new(DataType::Int);
        assert!(builder.index(&Value::Long(1)).is_err());
    }
}

use num_traits::NumCast;
use rustc_hash::FxHashMap;
use tessera_chunk::ChunkReaderContext;
use tessera_dtype::{DataType, Value, numeric_from_le_bytes};
use tessera_error::{TesseraResult, tessera_bail, tessera_err};

use crate::{ColumnIndexContainer, Dictionary, ImmutableSegment};

/// Largest batch of documents a single fetch call accepts.
pub const MAX_DOC_PER_CALL: usize = 10_000;

/// Batched, typed reads of column values for a list of documents.
///
/// Each query creates its own fetcher; the scratch buffers and chunk reader contexts it owns
/// are reused across calls and never shared.
pub struct DataFetcher<'a> {
    segment: &'a ImmutableSegment,
    dict_ids: Vec<u32>,
    mv_dict_ids: Vec<u32>,
    chunk_contexts: FxHashMap<String, ChunkReaderContext>,
}

impl<'a> DataFetcher<'a> {
    pub fn new(segment: &'a ImmutableSegment) -> Self {
        let max_multi_values = segment
            .metadata()
            .columns
            .iter()
            .filter(|c| !c.is_single_value)
            .map(|c| c.max_number_of_multi_values)
            .max()
            .unwrap_or(0);
        Self {
            segment,
            dict_ids: vec![0; MAX_DOC_PER_CALL],
            mv_dict_ids: vec![0; max_multi_values],
            chunk_contexts: FxHashMap::default(),
        }
    }

    pub fn segment(&self) -> &'a ImmutableSegment {
        self.segment
    }

    fn column(&self, column: &str, single_value: bool) -> TesseraResult<&'a ColumnIndexContainer> {
        let container = self.segment.column(column)?;
        if container.is_single_value() != single_value {
            tessera_bail!(
                InvalidState: "column {} is {}",
                column,
                if single_value { "multi-value" } else { "single-value" }
            );
        }
        Ok(container)
    }

    fn check_batch(doc_ids: &[u32]) -> TesseraResult<()> {
        if doc_ids.len() > MAX_DOC_PER_CALL {
            tessera_bail!(
                "fetch of {} documents exceeds the {} documents per call",
                doc_ids.len(),
                MAX_DOC_PER_CALL
            );
        }
        Ok(())
    }

    /// DictIds of a single-value dictionary column.
    pub fn fetch_dict_ids(&mut self, column: &str, doc_ids: &[u32], out: &mut [u32]) -> TesseraResult<()> {
        Self::check_batch(doc_ids)?;
        self.column(column, true)?
            .forward_index()
            .read_dict_ids(doc_ids, out)
    }

    fn fetch_single<T>(
        &mut self,
        column: &str,
        doc_ids: &[u32],
        from_dict: impl Fn(&Dictionary, u32) -> TesseraResult<T>,
        from_raw: impl Fn(DataType, &[u8]) -> TesseraResult<T>,
        mut emit: impl FnMut(usize, T),
    ) -> TesseraResult<()> {
        Self::check_batch(doc_ids)?;
        let container = self.column(column, true)?;
        match container.dictionary() {
            Some(dictionary) => {
                let ids = &mut self.dict_ids[..doc_ids.len()];
                container.forward_index().read_dict_ids(doc_ids, ids)?;
                for (i, id) in ids.iter().enumerate() {
                    emit(i, from_dict(dictionary, *id)?);
                }
            }
            None => {
                let reader = container
                    .forward_index()
                    .as_raw()
                    .ok_or_else(|| tessera_err!(InvalidState: "column {} has no raw index", column))?;
                let dtype = reader.data_type();
                let ctx = self.chunk_contexts.entry(column.to_string()).or_default();
                for (i, doc) in doc_ids.iter().enumerate() {
                    emit(i, reader.with_value_bytes(*doc, ctx, |b| from_raw(dtype, b))??);
                }
            }
        }
        Ok(())
    }

    fn fetch_numeric<T: NumCast>(&mut self, column: &str, doc_ids: &[u32], out: &mut [T]) -> TesseraResult<()> {
        if out.len() < doc_ids.len() {
            tessera_bail!(AssertionFailed: "output of {} too small for {} documents", out.len(), doc_ids.len());
        }
        self.fetch_single(
            column,
            doc_ids,
            |dict, id| dict.get_numeric::<T>(id),
            numeric_from_le_bytes::<T>,
            |i, v| out[i] = v,
        )
    }

    pub fn fetch_int_values(&mut self, column: &str, doc_ids: &[u32], out: &mut [i32]) -> TesseraResult<()> {
        self.fetch_numeric(column, doc_ids, out)
    }

    pub fn fetch_long_values(&mut self, column: &str, doc_ids: &[u32], out: &mut [i64]) -> TesseraResult<()> {
        self.fetch_numeric(column, doc_ids, out)
    }

    pub fn fetch_float_values(&mut self, column: &str, doc_ids: &[u32], out: &mut [f32]) -> TesseraResult<()> {
        self.fetch_numeric(column, doc_ids, out)
    }

    pub fn fetch_double_values(&mut self, column: &str, doc_ids: &[u32], out: &mut [f64]) -> TesseraResult<()> {
        self.fetch_numeric(column, doc_ids, out)
    }

    /// Values of any single-value column, replacing the contents of `out`.
    pub fn fetch_values(&mut self, column: &str, doc_ids: &[u32], out: &mut Vec<Value>) -> TesseraResult<()> {
        out.clear();
        self.fetch_single(column, doc_ids, Dictionary::get, Value::from_le_bytes, |_, v| {
            out.push(v)
        })
    }

    pub fn fetch_string_values(&mut self, column: &str, doc_ids: &[u32], out: &mut Vec<String>) -> TesseraResult<()> {
        out.clear();
        let to_string = |v: Value| match v {
            Value::String(s) => Ok(s),
            other => Err(tessera_err!(MismatchedTypes: "STRING", other.data_type())),
        };
        self.fetch_single(
            column,
            doc_ids,
            |dict, id| dict.get(id).and_then(to_string),
            |dtype, b| Value::from_le_bytes(dtype, b).and_then(to_string),
            |_, v| out.push(v),
        )
    }

    pub fn fetch_bytes_values(&mut self, column: &str, doc_ids: &[u32], out: &mut Vec<Vec<u8>>) -> TesseraResult<()> {
        out.clear();
        self.fetch_single(
            column,
            doc_ids,
            |dict, id| dict.get_bytes(id),
            |dtype, b| match dtype {
                DataType::String | DataType::Bytes => Ok(b.to_vec()),
                other => Err(tessera_err!(MismatchedTypes: "STRING or BYTES", other)),
            },
            |_, v| out.push(v),
        )
    }

    fn fetch_multi<T>(
        &mut self,
        column: &str,
        doc_ids: &[u32],
        from_dict: impl Fn(&Dictionary, u32) -> TesseraResult<T>,
        out: &mut Vec<Vec<T>>,
    ) -> TesseraResult<()> {
        Self::check_batch(doc_ids)?;
        out.clear();
        let container = self.column(column, false)?;
        let dictionary = container.require_dictionary()?;
        for doc in doc_ids {
            let n = container
                .forward_index()
                .read_mv_dict_ids(*doc, &mut self.mv_dict_ids)?;
            let values = self.mv_dict_ids[..n]
                .iter()
                .map(|id| from_dict(dictionary, *id))
                .collect::<TesseraResult<Vec<_>>>()?;
            out.push(values);
        }
        Ok(())
    }

    /// DictIds of a multi-value column, one vector per document.
    pub fn fetch_dict_ids_mv(&mut self, column: &str, doc_ids: &[u32], out: &mut Vec<Vec<u32>>) -> TesseraResult<()> {
        self.fetch_multi(column, doc_ids, |_, id| Ok(id), out)
    }

    pub fn fetch_values_mv(&mut self, column: &str, doc_ids: &[u32], out: &mut Vec<Vec<Value>>) -> TesseraResult<()> {
        self.fetch_multi(column, doc_ids, Dictionary::get, out)
    }

    pub fn fetch_int_values_mv(&mut self, column: &str, doc_ids: &[u32], out: &mut Vec<Vec<i32>>) -> TesseraResult<()> {
        self.fetch_multi(column, doc_ids, Dictionary::get_numeric::<i32>, out)
    }

    pub fn fetch_long_values_mv(&mut self, column: &str, doc_ids: &[u32], out: &mut Vec<Vec<i64>>) -> TesseraResult<()> {
        self.fetch_multi(column, doc_ids, Dictionary::get_numeric::<i64>, out)
    }

    pub fn fetch_float_values_mv(&mut self, column: &str, doc_ids: &[u32], out: &mut Vec<Vec<f32>>) -> TesseraResult<()> {
        self.fetch_multi(column, doc_ids, Dictionary::get_numeric::<f32>, out)
    }

    pub fn fetch_double_values_mv(&mut self, column: &str, doc_ids: &[u32], out: &mut Vec<Vec<f64>>) -> TesseraResult<()> {
        self.fetch_multi(column, doc_ids, Dictionary::get_numeric::<f64>, out)
    }

    pub fn fetch_string_values_mv(&mut self, column: &str, doc_ids: &[u32], out: &mut Vec<Vec<String>>) -> TesseraResult<()> {
        self.fetch_multi(
            column,
            doc_ids,
            |dict, id| match dict.get(id)? {
                Value::String(s) => Ok(s),
                other => Err(tessera_err!(MismatchedTypes: "STRING", other.data_type())),
            },
            out,
        )
    }

    /// Number of values of each multi-value document.
    pub fn fetch_num_values_mv(&mut self, column: &str, doc_ids: &[u32], out: &mut [usize]) -> TesseraResult<()> {
        Self::check_batch(doc_ids)?;
        let container = self.column(column, false)?;
        let reader = container
            .forward_index()
            .as_multi_value()
            .ok_or_else(|| tessera_err!(InvalidState: "column {} has no multi-value index", column))?;
        for (slot, doc) in out.iter_mut().zip(doc_ids) {
            *slot = reader.num_values(*doc)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;
    use tessera_dtype::Value;

    use crate::test_harness::{ROWS, config, employee_segment};
    use crate::{DataFetcher, IndexLoadingConfig, MAX_DOC_PER_CALL, ReadMode};

    #[rstest]
    #[case(ReadMode::Mmap)]
    #[case(ReadMode::Heap)]
    fn typed_single_value_reads(#[case] mode: ReadMode) {
        let dir = tempfile::tempdir().unwrap();
        let segment = employee_segment(dir.path(), config(), &IndexLoadingConfig::default().with_read_mode(mode));
        let mut fetcher = DataFetcher::new(&segment);
        let docs = [0u32, 2, 3, 5];

        let mut salaries = [0i32; 4];
        fetcher.fetch_int_values("salary", &docs, &mut salaries).unwrap();
        assert_eq!(salaries, [3, 2, 8, 1]);

        let mut as_double = [0f64; 4];
        fetcher.fetch_double_values("salary", &docs, &mut as_double).unwrap();
        assert_eq!(as_double, [3.0, 2.0, 8.0, 1.0]);

        let mut bonus = [0f64; 4];
        fetcher.fetch_double_values("bonus", &docs, &mut bonus).unwrap();
        assert_eq!(bonus, [0.5, 2.5, 3.5, 5.5]);

        let mut names = Vec::new();
        fetcher.fetch_string_values("name", &docs, &mut names).unwrap();
        assert_eq!(names, ["Rahul", "Rahul", "Zackie", "Zackie"]);

        let mut countries = Vec::new();
        fetcher.fetch_values("country", &docs, &mut countries).unwrap();
        let expected: Vec<Value> = docs.iter().map(|d| Value::from(ROWS[*d as usize].1)).collect();
        assert_eq!(countries, expected);

        let mut ids = [0u32; 4];
        fetcher.fetch_dict_ids("country", &docs, &mut ids).unwrap();
        let dictionary = segment.column("country").unwrap().dictionary().unwrap();
        for (id, value) in ids.iter().zip(&expected) {
            assert_eq!(&dictionary.get(*id).unwrap(), value);
        }
    }

    #[test]
    fn multi_value_reads() {
        let dir = tempfile::tempdir().unwrap();
        let segment = employee_segment(dir.path(), config(), &IndexLoadingConfig::default());
        let mut fetcher = DataFetcher::new(&segment);
        let docs: Vec<u32> = (0..ROWS.len() as u32).collect();

        let mut tags = Vec::new();
        fetcher.fetch_int_values_mv("tags", &docs, &mut tags).unwrap();
        let expected: Vec<Vec<i32>> = ROWS.iter().map(|r| r.5.to_vec()).collect();
        assert_eq!(tags, expected);

        let mut counts = vec![0usize; docs.len()];
        fetcher.fetch_num_values_mv("tags", &docs, &mut counts).unwrap();
        assert_eq!(counts, [2, 1, 3, 1, 1, 2]);

        let mut as_strings = Vec::new();
        assert!(fetcher.fetch_string_values_mv("tags", &docs, &mut as_strings).is_err());
    }

    #[test]
    fn misuse_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let segment = employee_segment(dir.path(), config(), &IndexLoadingConfig::default());
        let mut fetcher = DataFetcher::new(&segment);
        let mut ints = vec![0i32; MAX_DOC_PER_CALL + 1];
        let too_many = vec![0u32; MAX_DOC_PER_CALL + 1];
        assert!(fetcher.fetch_int_values("salary", &too_many, &mut ints).is_err());
        assert!(fetcher.fetch_int_values("tags", &[0], &mut ints).is_err());
        assert!(fetcher.fetch_int_values("name", &[0], &mut ints).is_err());
        assert!(fetcher.fetch_dict_ids("bonus", &[0], &mut [0]).is_err());
        assert!(fetcher.fetch_int_values("salary", &[6], &mut ints).is_err());
    }
}

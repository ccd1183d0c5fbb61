use std::path::Path;

use rustc_hash::FxHashMap;
use tessera_chunk::ChunkWriter;
use tessera_dtype::Value;
use tessera_error::{TesseraResult, tessera_bail};
use tessera_fixedbit::{FixedBitMultiValueWriter, FixedBitSingleValueWriter, num_bits_per_value};

use crate::index::{InvertedIndexWriter, write_sorted_index};
use crate::{
    ColumnMetadata, DictionaryBuilder, FieldSpec, IndexType, Schema, SegmentGeneratorConfig,
    SegmentMetadata, prepare_output_dir, write_index,
};

/// The value of one field of an ingested row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Single(Value),
    Multi(Vec<Value>),
}

macro_rules! single_field_from {
    ($($T:ty),*) => {
        $(
            impl From<$T> for FieldValue {
                fn from(value: $T) -> Self {
                    FieldValue::Single(value.into())
                }
            }
        )*
    };
}

single_field_from!(Value, i32, i64, f32, f64, String, &str, Vec<u8>);

impl FieldValue {
    pub fn multi<T: Into<Value>>(values: impl IntoIterator<Item = T>) -> Self {
        FieldValue::Multi(values.into_iter().map(Into::into).collect())
    }
}

/// A row to ingest, keyed by column name.
#[derive(Debug, Clone, Default)]
pub struct GenericRow {
    fields: FxHashMap<String, FieldValue>,
}

impl GenericRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.put(column, value);
        self
    }

    pub fn put(&mut self, column: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields.get(column)
    }
}

#[derive(Debug)]
enum ColumnCollector {
    Dictionary {
        builder: DictionaryBuilder,
        ids: Vec<u32>,
        lengths: Vec<usize>,
    },
    Raw {
        values: Vec<Value>,
    },
}

/// Builds an immutable segment from rows.
///
/// All index files are encoded in memory and validated before the first byte reaches disk.
#[derive(Debug)]
pub struct SegmentCreator {
    schema: Schema,
    config: SegmentGeneratorConfig,
    columns: Vec<ColumnCollector>,
    num_docs: usize,
}

impl SegmentCreator {
    pub fn try_new(schema: Schema, config: SegmentGeneratorConfig) -> TesseraResult<Self> {
        config.validate(&schema)?;
        let columns = schema
            .fields
            .iter()
            .map(|f| {
                if config.has_dictionary(&f.name) {
                    ColumnCollector::Dictionary {
                        builder: DictionaryBuilder::new(f.data_type),
                        ids: Vec::new(),
                        lengths: Vec::new(),
                    }
                } else {
                    ColumnCollector::Raw { values: Vec::new() }
                }
            })
            .collect();
        Ok(Self {
            schema,
            config,
            columns,
            num_docs: 0,
        })
    }

    pub fn index_row(&mut self, row: &GenericRow) -> TesseraResult<()> {
        for (field, collector) in self.schema.fields.iter().zip(self.columns.iter_mut()) {
            let Some(value) = row.get(&field.name) else {
                tessera_bail!("row {} is missing column {}", self.num_docs, field.name);
            };
            Self::collect(field, collector, value)
                .map_err(|e| e.with_context(format!("row {} column {}", self.num_docs, field.name)))?;
        }
        self.num_docs += 1;
        Ok(())
    }

    fn collect(field: &FieldSpec, collector: &mut ColumnCollector, value: &FieldValue) -> TesseraResult<()> {
        match (value, field.single_value) {
            (FieldValue::Single(v), true) => {
                let v = v.cast(field.data_type)?;
                match collector {
                    ColumnCollector::Dictionary { builder, ids, lengths } => {
                        ids.push(builder.index(&v)?);
                        lengths.push(1);
                    }
                    ColumnCollector::Raw { values } => values.push(v),
                }
            }
            (FieldValue::Multi(vs), false) => {
                if vs.is_empty() {
                    tessera_bail!("multi-value field has no values");
                }
                let ColumnCollector::Dictionary { builder, ids, lengths } = collector else {
                    tessera_bail!(InvalidState: "multi-value column without dictionary");
                };
                for v in vs {
                    ids.push(builder.index(&v.cast(field.data_type)?)?);
                }
                lengths.push(vs.len());
            }
            (FieldValue::Single(_), false) => tessera_bail!("expected multiple values, got one"),
            (FieldValue::Multi(_), true) => tessera_bail!("expected a single value, got many"),
        }
        Ok(())
    }

    pub fn num_docs(&self) -> usize {
        self.num_docs
    }

    /// Encode every column and write the segment into `out_dir`, which must be empty or absent.
    pub fn build(self, out_dir: &Path) -> TesseraResult<SegmentMetadata> {
        if self.num_docs == 0 {
            tessera_bail!("segment {} has no documents", self.config.segment_name);
        }
        let mut files: Vec<(String, IndexType, Vec<u8>)> = Vec::new();
        let mut columns = Vec::with_capacity(self.columns.len());
        for (field, collector) in self.schema.fields.iter().zip(self.columns) {
            let metadata = match collector {
                ColumnCollector::Dictionary { builder, ids, lengths } => encode_dictionary_column(
                    field,
                    &self.config,
                    self.num_docs,
                    builder,
                    ids,
                    &lengths,
                    &mut files,
                ),
                ColumnCollector::Raw { values } => {
                    encode_raw_column(field, &self.config, values, &mut files)
                }
            }
            .map_err(|e| e.with_context(format!("building column {}", field.name)))?;
            columns.push(metadata);
        }

        prepare_output_dir(out_dir)?;
        for (column, index_type, bytes) in &files {
            write_index(out_dir, column, *index_type, bytes)?;
        }
        let metadata = SegmentMetadata {
            segment_name: self.config.segment_name.clone(),
            total_docs: self.num_docs,
            columns,
        };
        metadata.write(out_dir)?;
        log::info!(
            "created segment {} with {} docs and {} files in {}",
            metadata.segment_name,
            metadata.total_docs,
            files.len(),
            out_dir.display()
        );
        Ok(metadata)
    }
}

fn encode_dictionary_column(
    field: &FieldSpec,
    config: &SegmentGeneratorConfig,
    num_docs: usize,
    builder: DictionaryBuilder,
    ids: Vec<u32>,
    lengths: &[usize],
    files: &mut Vec<(String, IndexType, Vec<u8>)>,
) -> TesseraResult<ColumnMetadata> {
    let sealed = builder.seal(config.sort_dictionaries);
    let cardinality = sealed.values.len();
    let bits = num_bits_per_value(cardinality);
    let ids: Vec<u32> = ids.iter().map(|id| sealed.remap[*id as usize]).collect();
    files.push((
        field.name.clone(),
        IndexType::Dictionary,
        sealed.to_bytes(field.data_type)?,
    ));

    let is_sorted = field.single_value && sealed.is_sorted && ids.is_sorted();
    if is_sorted {
        files.push((
            field.name.clone(),
            IndexType::SortedForward,
            write_sorted_index(&ids, cardinality)?,
        ));
    } else if field.single_value {
        let mut writer = FixedBitSingleValueWriter::try_new(num_docs, bits)?;
        for id in &ids {
            writer.push(*id)?;
        }
        files.push((field.name.clone(), IndexType::UnsortedForward, writer.finish()?));
    } else {
        let mut writer = FixedBitMultiValueWriter::try_new(num_docs, ids.len(), bits)?;
        let mut start = 0;
        for len in lengths {
            writer.push(&ids[start..start + len])?;
            start += len;
        }
        files.push((field.name.clone(), IndexType::MultiValueForward, writer.finish()?));
    }

    let has_inverted_index = config.has_inverted_index(&field.name) && !is_sorted;
    if has_inverted_index {
        let mut writer = InvertedIndexWriter::new(cardinality);
        let mut start = 0;
        for (doc, len) in lengths.iter().enumerate() {
            for id in &ids[start..start + len] {
                writer.add(*id, u32::try_from(doc)?)?;
            }
            start += len;
        }
        files.push((field.name.clone(), IndexType::InvertedIndex, writer.finish()?));
    }

    Ok(ColumnMetadata {
        name: field.name.clone(),
        data_type: field.data_type,
        cardinality,
        is_sorted,
        is_single_value: field.single_value,
        bits_per_element: bits,
        has_dictionary: true,
        dictionary_sorted: sealed.is_sorted,
        has_inverted_index,
        max_number_of_multi_values: if field.single_value {
            0
        } else {
            lengths.iter().copied().max().unwrap_or(0)
        },
        total_number_of_entries: ids.len(),
        total_docs: num_docs,
        compression: None,
        min_value: sealed.values.iter().min().cloned(),
        max_value: sealed.values.iter().max().cloned(),
    })
}

fn encode_raw_column(
    field: &FieldSpec,
    config: &SegmentGeneratorConfig,
    values: Vec<Value>,
    files: &mut Vec<(String, IndexType, Vec<u8>)>,
) -> TesseraResult<ColumnMetadata> {
    let num_docs = values.len();
    let mut writer = ChunkWriter::try_new(
        field.data_type,
        config.raw_compression,
        num_docs,
        config.raw_docs_per_chunk,
    )?;
    for v in &values {
        writer.push(v)?;
    }
    files.push((field.name.clone(), IndexType::RawForward, writer.finish()?));
    Ok(ColumnMetadata {
        name: field.name.clone(),
        data_type: field.data_type,
        cardinality: 0,
        is_sorted: false,
        is_single_value: true,
        bits_per_element: 0,
        has_dictionary: false,
        dictionary_sorted: false,
        has_inverted_index: false,
        max_number_of_multi_values: 0,
        total_number_of_entries: num_docs,
        total_docs: num_docs,
        compression: Some(config.raw_compression),
        min_value: values.iter().min().cloned(),
        max_value: values.iter().max().cloned(),
    })
}

#[cfg(test)]
mod test {
    use tessera_dtype::DataType;

    use crate::{FieldSpec, FieldValue, GenericRow, Schema, SegmentCreator, SegmentGeneratorConfig};

    fn schema() -> Schema {
        Schema::new(vec![
            FieldSpec::single("country", DataType::String),
            FieldSpec::multi("tags", DataType::Int),
        ])
        .unwrap()
    }

    #[test]
    fn missing_column_rejected() {
        let mut creator = SegmentCreator::try_new(schema(), SegmentGeneratorConfig::default()).unwrap();
        assert!(creator.index_row(&GenericRow::new().with("country", "IN")).is_err());
    }

    #[test]
    fn arity_mismatch_rejected() {
        let mut creator = SegmentCreator::try_new(schema(), SegmentGeneratorConfig::default()).unwrap();
        let row = GenericRow::new()
            .with("country", FieldValue::multi(["IN", "US"]))
            .with("tags", FieldValue::multi([1]));
        assert!(creator.index_row(&row).is_err());
        let row = GenericRow::new()
            .with("country", "IN")
            .with("tags", FieldValue::multi(Vec::<i32>::new()));
        assert!(creator.index_row(&row).is_err());
    }

    #[test]
    fn empty_segment_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let creator = SegmentCreator::try_new(schema(), SegmentGeneratorConfig::default()).unwrap();
        assert!(creator.build(&dir.path().join("seg")).is_err());
        assert!(!dir.path().join("seg").exists());
    }

    #[test]
    fn uncastable_value_rejected() {
        let mut creator = SegmentCreator::try_new(schema(), SegmentGeneratorConfig::default()).unwrap();
        let row = GenericRow::new()
            .with("country", "IN")
            .with("tags", FieldValue::multi(["x"]));
        assert!(creator.index_row(&row).is_err());
    }
}

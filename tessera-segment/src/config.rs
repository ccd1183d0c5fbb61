use serde::{Deserialize, Serialize};
use tessera_chunk::{ChunkCompressionType, DEFAULT_DOCS_PER_CHUNK};
use tessera_dtype::DataType;
use tessera_error::{TesseraResult, tessera_bail};

/// How index files are brought into memory.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadMode {
    /// Memory-map every index file.
    #[default]
    Mmap,
    /// Read every index file onto the heap.
    Heap,
}

/// Options applied when loading a segment.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IndexLoadingConfig {
    pub read_mode: ReadMode,
    /// Columns whose inverted index is loaded. `None` loads every inverted index present.
    pub inverted_index_columns: Option<Vec<String>>,
}

impl IndexLoadingConfig {
    pub fn with_read_mode(mut self, read_mode: ReadMode) -> Self {
        self.read_mode = read_mode;
        self
    }

    pub fn with_inverted_index_columns(mut self, columns: Vec<String>) -> Self {
        self.inverted_index_columns = Some(columns);
        self
    }

    pub fn loads_inverted_index(&self, column: &str) -> bool {
        self.inverted_index_columns
            .as_ref()
            .is_none_or(|cols| cols.iter().any(|c| c == column))
    }
}

/// A column declared in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    pub name: String,
    pub data_type: DataType,
    #[serde(default = "single_value_default")]
    pub single_value: bool,
}

fn single_value_default() -> bool {
    true
}

impl FieldSpec {
    pub fn single(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            single_value: true,
        }
    }

    pub fn multi(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            single_value: false,
        }
    }
}

/// Ordered set of columns of a segment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new(fields: Vec<FieldSpec>) -> TesseraResult<Self> {
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name == field.name) {
                tessera_bail!("duplicate column {} in schema", field.name);
            }
        }
        Ok(Self { fields })
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Options controlling how a segment is written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SegmentGeneratorConfig {
    pub segment_name: String,
    /// Columns stored raw in chunk-compressed form instead of dictionary encoded.
    pub no_dictionary_columns: Vec<String>,
    pub inverted_index_columns: Vec<String>,
    pub raw_compression: ChunkCompressionType,
    pub raw_docs_per_chunk: usize,
    /// Sort dictionary values; unsorted dictionaries keep first-seen order.
    pub sort_dictionaries: bool,
}

impl Default for SegmentGeneratorConfig {
    fn default() -> Self {
        Self {
            segment_name: "segment".to_string(),
            no_dictionary_columns: Vec::new(),
            inverted_index_columns: Vec::new(),
            raw_compression: ChunkCompressionType::default(),
            raw_docs_per_chunk: DEFAULT_DOCS_PER_CHUNK,
            sort_dictionaries: true,
        }
    }
}

impl SegmentGeneratorConfig {
    pub fn new(segment_name: impl Into<String>) -> Self {
        Self {
            segment_name: segment_name.into(),
            ..Default::default()
        }
    }

    pub fn with_no_dictionary_columns(mut self, columns: Vec<String>) -> Self {
        self.no_dictionary_columns = columns;
        self
    }

    pub fn with_inverted_index_columns(mut self, columns: Vec<String>) -> Self {
        self.inverted_index_columns = columns;
        self
    }

    pub fn with_raw_compression(mut self, compression: ChunkCompressionType) -> Self {
        self.raw_compression = compression;
        self
    }

    pub fn with_raw_docs_per_chunk(mut self, docs_per_chunk: usize) -> Self {
        self.raw_docs_per_chunk = docs_per_chunk;
        self
    }

    pub fn with_sort_dictionaries(mut self, sort: bool) -> Self {
        self.sort_dictionaries = sort;
        self
    }

    pub fn has_dictionary(&self, column: &str) -> bool {
        !self.no_dictionary_columns.iter().any(|c| c == column)
    }

    pub fn has_inverted_index(&self, column: &str) -> bool {
        self.inverted_index_columns.iter().any(|c| c == column)
    }

    pub fn validate(&self, schema: &Schema) -> TesseraResult<()> {
        if self.raw_docs_per_chunk == 0 {
            tessera_bail!("raw docs per chunk must be positive");
        }
        for column in &self.no_dictionary_columns {
            let Some(field) = schema.field(column) else {
                tessera_bail!("no-dictionary column {} is not in the schema", column);
            };
            if !field.single_value {
                tessera_bail!("multi-value column {} requires a dictionary", column);
            }
            if self.has_inverted_index(column) {
                tessera_bail!("inverted index on {} requires a dictionary", column);
            }
        }
        for column in &self.inverted_index_columns {
            if schema.field(column).is_none() {
                tessera_bail!("inverted index column {} is not in the schema", column);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use tessera_dtype::DataType;

    use crate::{FieldSpec, IndexLoadingConfig, ReadMode, Schema, SegmentGeneratorConfig};

    #[test]
    fn loading_config_from_json() {
        let config: IndexLoadingConfig =
            serde_json::from_str(r#"{"readMode": "heap", "invertedIndexColumns": ["a"]}"#).unwrap();
        assert_eq!(config.read_mode, ReadMode::Heap);
        assert!(config.loads_inverted_index("a"));
        assert!(!config.loads_inverted_index("b"));
        assert!(IndexLoadingConfig::default().loads_inverted_index("b"));
    }

    #[test]
    fn duplicate_schema_column() {
        let fields = vec![
            FieldSpec::single("a", DataType::Int),
            FieldSpec::single("a", DataType::Long),
        ];
        assert!(Schema::new(fields).is_err());
    }

    #[test]
    fn raw_multi_value_rejected() {
        let schema = Schema::new(vec![FieldSpec::multi("tags", DataType::String)]).unwrap();
        let config = SegmentGeneratorConfig::new("s").with_no_dictionary_columns(vec!["tags".into()]);
        assert!(config.validate(&schema).is_err());
    }

    #[test]
    fn unknown_inverted_column_rejected() {
        let schema = Schema::new(vec![FieldSpec::single("a", DataType::Int)]).unwrap();
        let config = SegmentGeneratorConfig::new("s").with_inverted_index_columns(vec!["b".into()]);
        assert!(config.validate(&schema).is_err());
    }
}

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tessera_chunk::ChunkCompressionType;
use tessera_dtype::{DataType, Value};
use tessera_error::{TesseraResult, tessera_bail, tessera_err};
use tessera_fixedbit::{check_bit_width, num_bits_per_value};

pub const METADATA_FILE_NAME: &str = "metadata.json";

fn default_true() -> bool {
    true
}

/// Everything a reader needs to know about one column before touching its index files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMetadata {
    pub name: String,
    pub data_type: DataType,
    pub cardinality: usize,
    /// Documents are ordered by this column's dictIds, which enables the sorted index.
    pub is_sorted: bool,
    pub is_single_value: bool,
    pub bits_per_element: u8,
    pub has_dictionary: bool,
    #[serde(default = "default_true")]
    pub dictionary_sorted: bool,
    #[serde(default)]
    pub has_inverted_index: bool,
    pub max_number_of_multi_values: usize,
    pub total_number_of_entries: usize,
    pub total_docs: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<ChunkCompressionType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<Value>,
}

impl ColumnMetadata {
    /// Reject metadata that no index layout can be built from.
    pub fn validate(&self) -> TesseraResult<()> {
        let fail = |msg: String| tessera_err!("column {}: {}", self.name, msg);
        if self.has_dictionary {
            check_bit_width(self.bits_per_element).map_err(|e| e.with_context(self.name.clone()))?;
            if self.cardinality == 0 {
                return Err(fail("dictionary-encoded column has zero cardinality".into()));
            }
            let required = num_bits_per_value(self.cardinality);
            if self.bits_per_element < required {
                return Err(fail(format!(
                    "{} bits per element cannot address {} dictionary entries, need {}",
                    self.bits_per_element, self.cardinality, required
                )));
            }
        } else {
            if !self.is_single_value {
                return Err(fail("multi-value columns must be dictionary encoded".into()));
            }
            if self.compression.is_none() {
                return Err(fail("raw column is missing its chunk compression".into()));
            }
        }
        if self.is_single_value && self.total_number_of_entries != self.total_docs {
            return Err(fail(format!(
                "single-value column has {} entries for {} docs",
                self.total_number_of_entries, self.total_docs
            )));
        }
        if !self.is_single_value && self.total_number_of_entries < self.total_docs {
            return Err(fail(format!(
                "multi-value column has {} entries for {} docs",
                self.total_number_of_entries, self.total_docs
            )));
        }
        if self.is_sorted && !(self.has_dictionary && self.is_single_value) {
            return Err(fail("only single-value dictionary columns can be sorted".into()));
        }
        Ok(())
    }
}

/// Segment-level metadata persisted as `metadata.json` in the segment directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentMetadata {
    pub segment_name: String,
    pub total_docs: usize,
    pub columns: Vec<ColumnMetadata>,
}

impl SegmentMetadata {
    pub fn column(&self, name: &str) -> TesseraResult<&ColumnMetadata> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| tessera_err!("segment {} has no column {}", self.segment_name, name))
    }

    pub fn read(dir: &Path) -> TesseraResult<Self> {
        let path = dir.join(METADATA_FILE_NAME);
        let bytes = fs::read(&path)
            .map_err(|e| tessera_err!(IOError: e).with_context(format!("{}", path.display())))?;
        let metadata: Self = serde_json::from_slice(&bytes)?;
        for column in &metadata.columns {
            column.validate()?;
            if column.total_docs != metadata.total_docs {
                tessera_bail!(
                    "column {} has {} docs, segment has {}",
                    column.name,
                    column.total_docs,
                    metadata.total_docs
                );
            }
        }
        Ok(metadata)
    }

    pub fn write(&self, dir: &Path) -> TesseraResult<()> {
        let json = serde_json::to_vec_pretty(self)?;
        fs::write(dir.join(METADATA_FILE_NAME), json)?;
        Ok(())
    }
}

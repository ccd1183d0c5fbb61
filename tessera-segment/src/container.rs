use tessera_chunk::ChunkReader;
use tessera_error::{TesseraResult, tessera_bail};
use tessera_fixedbit::{FixedBitMultiValueReader, FixedBitSingleValueReader};

use crate::index::{
    BitmapInvertedIndexReader, ForwardIndex, InvertedIndex, SortedIndexReader,
};
use crate::{ColumnMetadata, Dictionary, IndexLoadingConfig, IndexType, SegmentDirectory};

/// Dictionary, forward index and optional inverted index of one column.
///
/// A container is only ever returned fully initialized; any missing, truncated or inconsistent
/// region fails the load.
#[derive(Debug)]
pub struct ColumnIndexContainer {
    metadata: ColumnMetadata,
    dictionary: Option<Dictionary>,
    forward: ForwardIndex,
    inverted: Option<InvertedIndex>,
}

impl ColumnIndexContainer {
    pub fn load(
        dir: &SegmentDirectory,
        metadata: &ColumnMetadata,
        config: &IndexLoadingConfig,
    ) -> TesseraResult<Self> {
        Self::load_inner(dir, metadata, config)
            .map_err(|e| e.with_context(format!("loading column {}", metadata.name)))
    }

    fn load_inner(
        dir: &SegmentDirectory,
        metadata: &ColumnMetadata,
        config: &IndexLoadingConfig,
    ) -> TesseraResult<Self> {
        metadata.validate()?;
        let column = metadata.name.as_str();

        if !metadata.has_dictionary {
            let reader = ChunkReader::try_new(dir.index_buffer(column, IndexType::RawForward)?)?;
            if reader.data_type() != metadata.data_type || reader.num_docs() != metadata.total_docs {
                tessera_bail!(
                    InvalidSerde: "raw index holds {} {} docs, metadata declares {} {} docs",
                    reader.num_docs(),
                    reader.data_type(),
                    metadata.total_docs,
                    metadata.data_type
                );
            }
            return Ok(Self {
                metadata: metadata.clone(),
                dictionary: None,
                forward: ForwardIndex::Raw(reader),
                inverted: None,
            });
        }

        let dictionary = Dictionary::try_new(
            dir.index_buffer(column, IndexType::Dictionary)?,
            metadata.data_type,
            metadata.cardinality,
            metadata.dictionary_sorted,
        )?;

        let (forward, sorted_inverted) = if metadata.is_single_value {
            if metadata.is_sorted {
                let sorted = SortedIndexReader::try_new(
                    dir.index_buffer(column, IndexType::SortedForward)?,
                    metadata.cardinality,
                    metadata.total_docs,
                )?;
                (ForwardIndex::Sorted(sorted.clone()), Some(InvertedIndex::Sorted(sorted)))
            } else {
                let reader = FixedBitSingleValueReader::try_new(
                    dir.index_buffer(column, IndexType::UnsortedForward)?,
                    metadata.total_docs,
                    metadata.bits_per_element,
                )?;
                (ForwardIndex::FixedBitSingle(reader), None)
            }
        } else {
            let reader = FixedBitMultiValueReader::try_new(
                dir.index_buffer(column, IndexType::MultiValueForward)?,
                metadata.total_docs,
                metadata.total_number_of_entries,
                metadata.bits_per_element,
            )?;
            (ForwardIndex::FixedBitMulti(reader), None)
        };

        let inverted = match sorted_inverted {
            Some(sorted) => Some(sorted),
            None if metadata.has_inverted_index && config.loads_inverted_index(column) => {
                Some(InvertedIndex::Bitmap(BitmapInvertedIndexReader::try_new(
                    dir.index_buffer(column, IndexType::InvertedIndex)?,
                    metadata.cardinality,
                )?))
            }
            None => None,
        };

        log::debug!(
            "loaded column {} (dictionary: {}, sorted: {}, single value: {}, inverted: {})",
            column,
            metadata.cardinality,
            metadata.is_sorted,
            metadata.is_single_value,
            inverted.is_some()
        );
        Ok(Self {
            metadata: metadata.clone(),
            dictionary: Some(dictionary),
            forward,
            inverted,
        })
    }

    pub fn metadata(&self) -> &ColumnMetadata {
        &self.metadata
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn dictionary(&self) -> Option<&Dictionary> {
        self.dictionary.as_ref()
    }

    /// The dictionary, failing for raw columns.
    pub fn require_dictionary(&self) -> TesseraResult<&Dictionary> {
        match &self.dictionary {
            Some(d) => Ok(d),
            None => tessera_bail!(InvalidState: "column {} has no dictionary", self.metadata.name),
        }
    }

    pub fn forward_index(&self) -> &ForwardIndex {
        &self.forward
    }

    pub fn inverted_index(&self) -> Option<&InvertedIndex> {
        self.inverted.as_ref()
    }

    pub fn is_single_value(&self) -> bool {
        self.metadata.is_single_value
    }
}

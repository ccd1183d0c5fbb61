use std::path::Path;

use rustc_hash::FxHashMap;
use tessera_error::{TesseraResult, tessera_err};

use crate::{ColumnIndexContainer, IndexLoadingConfig, SegmentDirectory, SegmentMetadata};

/// A loaded, read-only segment. Shareable between any number of concurrent queries.
#[derive(Debug)]
pub struct ImmutableSegment {
    metadata: SegmentMetadata,
    directory: SegmentDirectory,
    columns: FxHashMap<String, ColumnIndexContainer>,
}

impl ImmutableSegment {
    /// Load every column of the segment in `dir`; any column failure fails the whole load.
    pub fn load(dir: impl AsRef<Path>, config: &IndexLoadingConfig) -> TesseraResult<Self> {
        let dir = dir.as_ref();
        let metadata = SegmentMetadata::read(dir)?;
        let directory = SegmentDirectory::new(dir, config.read_mode);
        let mut columns = FxHashMap::default();
        for column in &metadata.columns {
            let container = ColumnIndexContainer::load(&directory, column, config)?;
            columns.insert(column.name.clone(), container);
        }
        log::info!(
            "loaded segment {} ({} docs, {} columns) from {}",
            metadata.segment_name,
            metadata.total_docs,
            columns.len(),
            dir.display()
        );
        Ok(Self {
            metadata,
            directory,
            columns,
        })
    }

    pub fn name(&self) -> &str {
        &self.metadata.segment_name
    }

    pub fn num_docs(&self) -> usize {
        self.metadata.total_docs
    }

    pub fn metadata(&self) -> &SegmentMetadata {
        &self.metadata
    }

    pub fn directory(&self) -> &SegmentDirectory {
        &self.directory
    }

    pub fn column(&self, name: &str) -> TesseraResult<&ColumnIndexContainer> {
        self.columns
            .get(name)
            .ok_or_else(|| tessera_err!("segment {} has no column {}", self.name(), name))
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.metadata.columns.iter().map(|c| c.name.as_str())
    }
}

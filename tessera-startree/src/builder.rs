use std::cmp::Ordering;
use std::ops::Range;

use itertools::Itertools;
use tessera_aggregate::AggregationFunction;
use tessera_dtype::Value;
use tessera_error::{TesseraResult, tessera_err};
use tessera_segment::{DataFetcher, ImmutableSegment, MAX_DOC_PER_CALL};

use crate::{STAR_COLUMN, STAR_VALUE, StarTree, StarTreeConfig, StarTreeNode};

/// Builds a [`StarTree`] over one segment.
///
/// [`StarTreeBuilder::new`] validates the configuration and [`StarTreeBuilder::build`] consumes
/// the builder, so a tree is built at most once per builder.
pub struct StarTreeBuilder<'a> {
    segment: &'a ImmutableSegment,
    config: StarTreeConfig,
    skip_star: Vec<bool>,
    functions: Vec<AggregationFunction>,
}

/// Columns in tree order plus the arena under construction.
struct Building {
    dimensions: Vec<Vec<u32>>,
    metrics: Vec<Option<Vec<f64>>>,
    nodes: Vec<StarTreeNode>,
    aggregates: Vec<f64>,
}

impl<'a> StarTreeBuilder<'a> {
    pub fn new(segment: &'a ImmutableSegment, config: StarTreeConfig) -> TesseraResult<Self> {
        config
            .validate(segment.metadata())
            .map_err(|e| e.with_context(format!("star-tree config for segment {}", segment.name())))?;
        let skip_star = config
            .dimensions_split_order
            .iter()
            .map(|d| config.skip_star_node_creation.contains(d))
            .collect();
        let functions = config
            .function_column_pairs
            .iter()
            .map(|pair| AggregationFunction::new(pair.function, pair.column.clone()))
            .collect();
        Ok(Self {
            segment,
            config,
            skip_star,
            functions,
        })
    }

    pub fn build(self) -> TesseraResult<StarTree> {
        let num_docs = u32::try_from(self.segment.num_docs())?;
        let mut fetcher = DataFetcher::new(self.segment);
        let all_docs: Vec<u32> = (0..num_docs).collect();

        let mut dimensions = Vec::with_capacity(self.config.dimensions_split_order.len());
        for dimension in &self.config.dimensions_split_order {
            let mut dict_ids = vec![0; all_docs.len()];
            for (docs, out) in all_docs
                .chunks(MAX_DOC_PER_CALL)
                .zip(dict_ids.chunks_mut(MAX_DOC_PER_CALL))
            {
                fetcher.fetch_dict_ids(dimension, docs, out)?;
            }
            dimensions.push(dict_ids);
        }

        let doc_ids = sort_by_split_order(all_docs, &dimensions);
        if doc_ids.iter().enumerate().any(|(pos, doc)| *doc as usize != pos) {
            log::debug!(
                "segment {} is not sorted on the split order, building over a permutation",
                self.segment.name()
            );
        }
        let dimensions = dimensions
            .iter()
            .map(|column| doc_ids.iter().map(|doc| column[*doc as usize]).collect())
            .collect();

        let mut metrics = Vec::with_capacity(self.functions.len());
        for function in &self.functions {
            if function.column() == STAR_COLUMN {
                metrics.push(None);
                continue;
            }
            let mut values = vec![0.0; doc_ids.len()];
            for (docs, out) in doc_ids
                .chunks(MAX_DOC_PER_CALL)
                .zip(values.chunks_mut(MAX_DOC_PER_CALL))
            {
                fetcher.fetch_double_values(function.column(), docs, out)?;
            }
            metrics.push(Some(values));
        }

        let mut building = Building {
            dimensions,
            metrics,
            nodes: Vec::new(),
            aggregates: Vec::new(),
        };
        let root = StarTreeNode::new(-1, STAR_VALUE, 0..num_docs);
        let record = self.aggregate_range(&building, root.doc_range())?;
        building.push(root, &record);
        self.split(&mut building, 0, 0)
            .map_err(|e| e.with_context(format!("building star-tree for segment {}", self.segment.name())))?;

        log::info!(
            "built star-tree over {} documents of segment {} with {} nodes",
            num_docs,
            self.segment.name(),
            building.nodes.len()
        );
        StarTree::try_new(
            self.config.dimensions_split_order,
            self.config.function_column_pairs,
            doc_ids,
            building.nodes,
            building.aggregates,
        )
    }

    fn split(&self, building: &mut Building, node_id: usize, level: usize) -> TesseraResult<()> {
        let node = building.nodes[node_id];
        if level == self.config.dimensions_split_order.len() || node.num_docs() <= self.config.max_leaf_records {
            return Ok(());
        }

        let runs: Vec<(u32, u32)> = building.dimensions[level][node.doc_range()]
            .iter()
            .chunk_by(|dict_id| **dict_id)
            .into_iter()
            .map(|(dict_id, run)| (dict_id, run.count() as u32))
            .collect();

        let first_child = building.nodes.len();
        let dimension_id = level as i32;
        let mut start = node.start_doc;
        for (dict_id, len) in runs {
            let value = i32::try_from(dict_id)?;
            let child = StarTreeNode::new(dimension_id, value, start..start + len);
            let record = self.aggregate_range(building, child.doc_range())?;
            building.push(child, &record);
            start += len;
        }
        if !self.skip_star[level] {
            let parent = building.record(node_id).to_vec();
            building.push(StarTreeNode::new(dimension_id, STAR_VALUE, node.start_doc..node.end_doc), &parent);
        }
        let end = building.nodes.len();
        let parent = &mut building.nodes[node_id];
        parent.first_child = u32::try_from(first_child)?;
        parent.num_children = u32::try_from(end - first_child)?;

        for child in first_child..end {
            self.split(building, child, level + 1)?;
        }
        Ok(())
    }

    fn aggregate_range(&self, building: &Building, range: Range<usize>) -> TesseraResult<Vec<f64>> {
        self.functions
            .iter()
            .zip(&building.metrics)
            .map(|(function, values)| {
                let Some(values) = values else {
                    return Ok(range.len() as f64);
                };
                let mut acc = function.init();
                for value in &values[range.clone()] {
                    function.aggregate(&mut acc, &Value::Double(*value))?;
                }
                function
                    .extract_final_result(&acc)?
                    .as_f64()
                    .ok_or_else(|| tessera_err!(MismatchedTypes: "numeric", function.function_type()))
            })
            .collect()
    }
}

impl Building {
    fn push(&mut self, node: StarTreeNode, record: &[f64]) {
        self.nodes.push(node);
        self.aggregates.extend_from_slice(record);
    }

    fn record(&self, node_id: usize) -> &[f64] {
        let width = self.metrics.len();
        &self.aggregates[node_id * width..(node_id + 1) * width]
    }
}

/// Document ids ordered by the dictIds of each split dimension in turn; ties keep doc order.
fn sort_by_split_order(mut doc_ids: Vec<u32>, dimensions: &[Vec<u32>]) -> Vec<u32> {
    doc_ids.sort_by(|a, b| {
        dimensions
            .iter()
            .map(|column| column[*a as usize].cmp(&column[*b as usize]))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    });
    doc_ids
}

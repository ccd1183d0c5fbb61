use std::fs;
use std::ops::Range;
use std::path::Path;

use bytes::BufMut;
use tessera_buffer::ByteBuffer;
use tessera_error::{TesseraResult, tessera_bail, tessera_err};
use tessera_segment::SegmentDirectory;

use crate::FunctionColumnPair;

/// File holding the serialized star-tree inside the segment directory.
pub const STAR_TREE_FILE: &str = "star_tree.idx";
/// Dimension value of a star node, and of the root.
pub const STAR_VALUE: i32 = -1;

/// The current version of the star-tree file format.
pub const VERSION: u16 = 1;
/// The magic bytes closing every star-tree file.
pub const MAGIC_BYTES: [u8; 4] = *b"TSTR";
/// Version, two reserved bytes and the magic bytes.
pub const EOF_SIZE: usize = 8;

const NODE_SIZE: usize = 24;

/// A node of the star-tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StarTreeNode {
    /// Position in the split order of the dimension this node fixes; `-1` for the root.
    pub dimension_id: i32,
    /// DictId of the fixed value, or [`STAR_VALUE`] when the node spans every value.
    pub dimension_value: i32,
    pub start_doc: u32,
    pub end_doc: u32,
    pub first_child: u32,
    pub num_children: u32,
}

impl StarTreeNode {
    pub(crate) fn new(dimension_id: i32, dimension_value: i32, docs: Range<u32>) -> Self {
        Self {
            dimension_id,
            dimension_value,
            start_doc: docs.start,
            end_doc: docs.end,
            first_child: 0,
            num_children: 0,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.num_children == 0
    }

    pub fn is_star(&self) -> bool {
        self.dimension_id >= 0 && self.dimension_value == STAR_VALUE
    }

    pub fn num_docs(&self) -> usize {
        (self.end_doc - self.start_doc) as usize
    }

    pub fn doc_range(&self) -> Range<usize> {
        self.start_doc as usize..self.end_doc as usize
    }

    /// Arena indices of the children.
    pub fn children(&self) -> Range<usize> {
        let first = self.first_child as usize;
        first..first + self.num_children as usize
    }
}

/// A sealed star-tree: the node arena, the document order node ranges refer to, and one
/// pre-aggregated value per node and function column pair.
#[derive(Debug, Clone, PartialEq)]
pub struct StarTree {
    dimensions: Vec<String>,
    function_column_pairs: Vec<FunctionColumnPair>,
    doc_ids: Vec<u32>,
    nodes: Vec<StarTreeNode>,
    aggregates: Vec<f64>,
}

impl StarTree {
    pub(crate) fn try_new(
        dimensions: Vec<String>,
        function_column_pairs: Vec<FunctionColumnPair>,
        doc_ids: Vec<u32>,
        nodes: Vec<StarTreeNode>,
        aggregates: Vec<f64>,
    ) -> TesseraResult<Self> {
        if nodes.is_empty() {
            tessera_bail!(InvalidSerde: "star-tree has no root");
        }
        if aggregates.len() != nodes.len() * function_column_pairs.len() {
            tessera_bail!(
                InvalidSerde: "{} aggregates for {} nodes of {} pairs",
                aggregates.len(),
                nodes.len(),
                function_column_pairs.len()
            );
        }
        for (id, node) in nodes.iter().enumerate() {
            if node.start_doc > node.end_doc || node.end_doc as usize > doc_ids.len() {
                tessera_bail!(
                    InvalidSerde: "node {} covers {}..{} of {} documents",
                    id,
                    node.start_doc,
                    node.end_doc,
                    doc_ids.len()
                );
            }
            let children_end = u64::from(node.first_child) + u64::from(node.num_children);
            if !node.is_leaf() && (node.first_child as usize <= id || children_end > nodes.len() as u64) {
                tessera_bail!(InvalidSerde: "node {} has invalid children {}..{}", id, node.first_child, children_end);
            }
            if node.dimension_id >= dimensions.len() as i32 {
                tessera_bail!(InvalidSerde: "node {} splits on unknown dimension {}", id, node.dimension_id);
            }
        }
        Ok(Self {
            dimensions,
            function_column_pairs,
            doc_ids,
            nodes,
            aggregates,
        })
    }

    pub fn dimensions(&self) -> &[String] {
        &self.dimensions
    }

    pub fn function_column_pairs(&self) -> &[FunctionColumnPair] {
        &self.function_column_pairs
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_docs(&self) -> usize {
        self.doc_ids.len()
    }

    pub fn root(&self) -> &StarTreeNode {
        &self.nodes[0]
    }

    pub fn nodes(&self) -> &[StarTreeNode] {
        &self.nodes
    }

    pub fn node(&self, node_id: usize) -> TesseraResult<&StarTreeNode> {
        self.nodes
            .get(node_id)
            .ok_or_else(|| tessera_err!(OutOfBounds: node_id, 0, self.nodes.len()))
    }

    /// Ids of the children of `node_id` fixing `dict_id`.
    ///
    /// Below a star node documents are not ordered by the next dimension, so one value may be
    /// split over several children.
    pub fn children_with_value(&self, node_id: usize, dict_id: u32) -> TesseraResult<Vec<usize>> {
        let node = self.node(node_id)?;
        Ok(node
            .children()
            .filter(|&child| i64::from(self.nodes[child].dimension_value) == i64::from(dict_id))
            .collect())
    }

    pub fn star_child(&self, node_id: usize) -> TesseraResult<Option<usize>> {
        let node = self.node(node_id)?;
        Ok(node.children().find(|&child| self.nodes[child].is_star()))
    }

    /// Segment document ids covered by a node.
    pub fn doc_ids(&self, node_id: usize) -> TesseraResult<&[u32]> {
        Ok(&self.doc_ids[self.node(node_id)?.doc_range()])
    }

    pub fn pair_index(&self, pair: &FunctionColumnPair) -> Option<usize> {
        self.function_column_pairs.iter().position(|p| p == pair)
    }

    /// One value per function column pair.
    pub fn aggregated_record(&self, node_id: usize) -> TesseraResult<&[f64]> {
        self.node(node_id)?;
        let width = self.function_column_pairs.len();
        Ok(&self.aggregates[node_id * width..(node_id + 1) * width])
    }

    pub fn aggregate(&self, node_id: usize, pair: &FunctionColumnPair) -> TesseraResult<f64> {
        let index = self
            .pair_index(pair)
            .ok_or_else(|| tessera_err!("star-tree does not pre-aggregate {}", pair))?;
        Ok(self.aggregated_record(node_id)?[index])
    }

    pub fn to_bytes(&self) -> TesseraResult<Vec<u8>> {
        let mut out = Vec::new();
        let put_str = |out: &mut Vec<u8>, s: &str| -> TesseraResult<()> {
            out.put_u32_le(u32::try_from(s.len())?);
            out.put_slice(s.as_bytes());
            Ok(())
        };
        out.put_u32_le(u32::try_from(self.dimensions.len())?);
        for dimension in &self.dimensions {
            put_str(&mut out, dimension)?;
        }
        out.put_u32_le(u32::try_from(self.function_column_pairs.len())?);
        for pair in &self.function_column_pairs {
            put_str(&mut out, &pair.to_string())?;
        }
        out.put_u32_le(u32::try_from(self.doc_ids.len())?);
        for doc_id in &self.doc_ids {
            out.put_u32_le(*doc_id);
        }
        out.put_u32_le(u32::try_from(self.nodes.len())?);
        for node in &self.nodes {
            out.put_i32_le(node.dimension_id);
            out.put_i32_le(node.dimension_value);
            out.put_u32_le(node.start_doc);
            out.put_u32_le(node.end_doc);
            out.put_u32_le(node.first_child);
            out.put_u32_le(node.num_children);
        }
        for value in &self.aggregates {
            out.put_f64_le(*value);
        }
        out.put_u16_le(VERSION);
        out.put_u16_le(0);
        out.put_slice(&MAGIC_BYTES);
        Ok(out)
    }

    pub fn from_buffer(buffer: &ByteBuffer) -> TesseraResult<Self> {
        if buffer.len() < EOF_SIZE {
            tessera_bail!(InvalidSerde: "star-tree file of {} bytes is truncated", buffer.len());
        }
        let eof = buffer.len() - EOF_SIZE;
        if buffer[eof + 4..] != MAGIC_BYTES {
            tessera_bail!(InvalidSerde: "star-tree file has invalid magic bytes");
        }
        let version = u16::from_le_bytes([buffer[eof], buffer[eof + 1]]);
        if version != VERSION {
            tessera_bail!(InvalidSerde: "unsupported star-tree version {}", version);
        }

        let mut reader = Reader {
            buffer: buffer.slice(0..eof)?,
            pos: 0,
        };
        let dimensions = (0..reader.u32()?)
            .map(|_| reader.string())
            .collect::<TesseraResult<Vec<_>>>()?;
        let function_column_pairs = (0..reader.u32()?)
            .map(|_| reader.string()?.parse())
            .collect::<TesseraResult<Vec<FunctionColumnPair>>>()?;
        let num_docs = reader.u32()? as usize;
        let doc_ids = reader.u32s(num_docs)?;
        let num_nodes = reader.u32()? as usize;
        reader.require(num_nodes * NODE_SIZE)?;
        let mut nodes = Vec::with_capacity(num_nodes);
        for _ in 0..num_nodes {
            nodes.push(StarTreeNode {
                dimension_id: reader.i32()?,
                dimension_value: reader.i32()?,
                start_doc: reader.u32()?,
                end_doc: reader.u32()?,
                first_child: reader.u32()?,
                num_children: reader.u32()?,
            });
        }
        let num_aggregates = num_nodes * function_column_pairs.len();
        reader.require(num_aggregates * 8)?;
        let aggregates = (0..num_aggregates)
            .map(|_| reader.f64())
            .collect::<TesseraResult<Vec<_>>>()?;
        if reader.pos != reader.buffer.len() {
            tessera_bail!(
                InvalidSerde: "{} trailing bytes after star-tree",
                reader.buffer.len() - reader.pos
            );
        }
        Self::try_new(dimensions, function_column_pairs, doc_ids, nodes, aggregates)
    }

    /// Write the tree into the segment directory at `dir`.
    pub fn write(&self, dir: &Path) -> TesseraResult<()> {
        let path = dir.join(STAR_TREE_FILE);
        fs::write(&path, self.to_bytes()?)
            .map_err(|e| tessera_err!(IOError: e).with_context(format!("writing {}", path.display())))?;
        log::debug!("wrote star-tree with {} nodes to {}", self.num_nodes(), path.display());
        Ok(())
    }

    pub fn load(directory: &SegmentDirectory) -> TesseraResult<Self> {
        let buffer = directory.file_buffer(STAR_TREE_FILE)?;
        Self::from_buffer(&buffer).map_err(|e| {
            e.with_context(format!(
                "loading star-tree from {}",
                directory.path().display()
            ))
        })
    }
}

struct Reader {
    buffer: ByteBuffer,
    pos: usize,
}

impl Reader {
    fn require(&self, len: usize) -> TesseraResult<()> {
        if self.buffer.len() - self.pos < len {
            tessera_bail!(
                InvalidSerde: "star-tree file truncated: {} bytes needed at {} of {}",
                len,
                self.pos,
                self.buffer.len()
            );
        }
        Ok(())
    }

    fn array<const N: usize>(&mut self) -> TesseraResult<[u8; N]> {
        self.require(N)?;
        let bytes = self.buffer.array_at::<N>(self.pos)?;
        self.pos += N;
        Ok(bytes)
    }

    fn u32(&mut self) -> TesseraResult<u32> {
        self.array().map(u32::from_le_bytes)
    }

    fn i32(&mut self) -> TesseraResult<i32> {
        self.array().map(i32::from_le_bytes)
    }

    fn f64(&mut self) -> TesseraResult<f64> {
        self.array().map(f64::from_le_bytes)
    }

    fn u32s(&mut self, len: usize) -> TesseraResult<Vec<u32>> {
        self.require(len * 4)?;
        (0..len).map(|_| self.u32()).collect()
    }

    fn string(&mut self) -> TesseraResult<String> {
        let len = self.u32()? as usize;
        self.require(len)?;
        let bytes = self.buffer.slice(self.pos..self.pos + len)?;
        self.pos += len;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| tessera_err!(InvalidSerde: "star-tree string is not UTF-8: {}", e))
    }
}

#[cfg(test)]
mod test {
    use tessera_aggregate::AggregationFunctionType;
    use tessera_buffer::ByteBuffer;
    use tessera_segment::{ReadMode, SegmentDirectory};

    use crate::{FunctionColumnPair, STAR_VALUE, StarTree, StarTreeNode};

    fn small_tree() -> StarTree {
        let mut root = StarTreeNode::new(-1, STAR_VALUE, 0..3);
        root.first_child = 1;
        root.num_children = 3;
        StarTree::try_new(
            vec!["country".to_string()],
            vec![FunctionColumnPair::new(AggregationFunctionType::Sum, "salary")],
            vec![2, 0, 1],
            vec![
                root,
                StarTreeNode::new(0, 0, 0..1),
                StarTreeNode::new(0, 1, 1..3),
                StarTreeNode::new(0, STAR_VALUE, 0..3),
            ],
            vec![10.0, 2.0, 8.0, 10.0],
        )
        .unwrap()
    }

    #[test]
    fn round_trip_through_directory() {
        let dir = tempfile::tempdir().unwrap();
        let tree = small_tree();
        tree.write(dir.path()).unwrap();
        for read_mode in [ReadMode::Mmap, ReadMode::Heap] {
            let loaded = StarTree::load(&SegmentDirectory::new(dir.path(), read_mode)).unwrap();
            assert_eq!(loaded, tree);
        }
    }

    #[test]
    fn lookups() {
        let tree = small_tree();
        assert_eq!(tree.children_with_value(0, 1).unwrap(), [2]);
        assert_eq!(tree.star_child(0).unwrap(), Some(3));
        assert_eq!(tree.doc_ids(2).unwrap(), [0, 1]);
        let sum = FunctionColumnPair::new(AggregationFunctionType::Sum, "salary");
        assert_eq!(tree.aggregate(2, &sum).unwrap(), 8.0);
        assert!(tree.aggregate(2, &FunctionColumnPair::count_star()).is_err());
    }

    #[test]
    fn truncation_rejected() {
        let bytes = small_tree().to_bytes().unwrap();
        for len in [0, 7, bytes.len() - 9, bytes.len() - 1] {
            assert!(StarTree::from_buffer(&ByteBuffer::copy_from(&bytes[..len])).is_err());
        }
        let mut body_cut = bytes[..20].to_vec();
        body_cut.extend_from_slice(&bytes[bytes.len() - 8..]);
        assert!(StarTree::from_buffer(&ByteBuffer::copy_from(&body_cut)).is_err());
    }

    #[test]
    fn corrupt_children_rejected() {
        let mut tree = small_tree();
        tree.nodes[0].first_child = u32::MAX;
        tree.nodes[0].num_children = 2;
        let bytes = tree.to_bytes().unwrap();
        assert!(StarTree::from_buffer(&ByteBuffer::copy_from(&bytes)).is_err());
        assert!(StarTree::try_new(tree.dimensions, tree.function_column_pairs, tree.doc_ids, tree.nodes, tree.aggregates).is_err());
    }

    #[test]
    fn missing_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(StarTree::load(&SegmentDirectory::new(dir.path(), ReadMode::Heap)).is_err());
    }
}

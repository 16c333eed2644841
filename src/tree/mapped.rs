use crate::core::config::Similarity;
use crate::core::error::Result;
use crate::tree::codec::{decode_records, reconstruct_shape, Children, NodeRecord};
use crate::vector::codec::read_vector;
use crate::vector::term_vector::TermVector;

/// Read-only tree over serialized records. The shape is rebuilt once; node
/// vectors stay in the vector stream and are decoded only when a search
/// visits them.
#[derive(Debug, Clone)]
pub struct MappedTree {
    records: Vec<NodeRecord>,
    shape: Vec<Children>,
}

impl MappedTree {
    pub fn parse(tree_bytes: &[u8]) -> Result<Self> {
        let records = decode_records(tree_bytes)?;
        let shape = reconstruct_shape(&records)?;
        Ok(MappedTree { records, shape })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.len() <= 1
    }

    pub fn record(&self, index: usize) -> &NodeRecord {
        &self.records[index]
    }

    pub fn vector(&self, vector_stream: &[u8], index: usize) -> Result<TermVector> {
        let record = &self.records[index];
        read_vector(vector_stream, record.vector_offset, record.component_count)
    }

    /// Same walk as `VectorTree::closest_match`; returns the record index
    /// of the best node and its score
    pub fn closest_match(
        &self,
        vector_stream: &[u8],
        query: &TermVector,
        similarity: &Similarity,
    ) -> Result<(usize, f32)> {
        let mut best = 0usize;
        let mut highscore = 0.0f32;
        let mut cursor = Some(0u32);

        while let Some(index) = cursor {
            let index = index as usize;
            let angle = query.cos_angle(&self.vector(vector_stream, index)?).unwrap_or(0.0);
            if angle > highscore {
                highscore = angle;
                best = index;
            }

            let children = self.shape[index];
            cursor = if angle > similarity.fold_angle { children.left } else { children.right };
        }

        Ok((best, highscore))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use crate::core::types::DocId;
    use crate::storage::postings::{read_postings, PostingsWriter};
    use crate::tree::node::VectorTree;
    use crate::vector::codec::VectorWriter;

    #[test]
    fn test_mapped_search_matches_materialized_tree() {
        let sim = Similarity::default();
        let words = ["cat", "cats", "dog", "horse", "house", "mouse", "moose", "category"];
        let mut tree = VectorTree::new();
        for (i, word) in words.iter().enumerate() {
            tree.insert(TermVector::from_text(word), DocId(i as u64), &sim).unwrap();
        }

        let mut vectors = VectorWriter::new(Vec::new(), 0);
        let mut postings = PostingsWriter::new(Cursor::new(Vec::new())).unwrap();
        tree.flush_payload(&mut vectors, &mut postings).unwrap();
        let mut bytes = Vec::new();
        tree.serialize_tree(&mut bytes).unwrap();

        let mapped = MappedTree::parse(&bytes).unwrap();
        assert_eq!(mapped.len(), tree.len());
        let postings = postings.stream.into_inner();

        for (i, word) in words.iter().enumerate() {
            let query = TermVector::from_text(word);
            let (index, score) = mapped.closest_match(&vectors.writer, &query, &sim).unwrap();
            let (node, expected) = tree.closest_match(&query, &sim);

            assert_eq!(score, expected);
            assert_eq!(mapped.record(index).postings_offset, tree.node(node).postings_offset);
            assert_eq!(mapped.vector(&vectors.writer, index).unwrap(), query);
            assert_eq!(read_postings(&postings, mapped.record(index).postings_offset).unwrap(), vec![i as u64]);
        }
    }

    #[test]
    fn test_root_only_tree() {
        let mut tree = VectorTree::new();
        let mut vectors = VectorWriter::new(Vec::new(), 0);
        let mut postings = PostingsWriter::new(Cursor::new(Vec::new())).unwrap();
        tree.flush_payload(&mut vectors, &mut postings).unwrap();
        let mut bytes = Vec::new();
        tree.serialize_tree(&mut bytes).unwrap();

        let mapped = MappedTree::parse(&bytes).unwrap();
        assert!(mapped.is_empty());
        let (index, score) = mapped
            .closest_match(&vectors.writer, &TermVector::from_text("cat"), &Similarity::default())
            .unwrap();
        assert_eq!((index, score), (0, 0.0));
    }
}

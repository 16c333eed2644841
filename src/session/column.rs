use crate::core::config::{LoadingStrategy, Similarity};
use crate::core::error::Result;
use crate::core::types::KeyId;
use crate::tree::mapped::MappedTree;
use crate::tree::node::VectorTree;
use crate::vector::term_vector::TermVector;

/// Best node found for a query term
#[derive(Debug, Clone, PartialEq)]
pub struct TermMatch {
    pub score: f32,
    pub postings_offset: i64,
    pub term: String,
}

enum ColumnTree {
    Mapped(MappedTree),
    Deserialized(VectorTree),
}

/// One key's tree inside a published segment
pub struct ColumnReader {
    pub key_id: KeyId,
    tree: ColumnTree,
}

impl ColumnReader {
    pub fn open(key_id: KeyId, tree_bytes: &[u8], vectors: &[u8], strategy: LoadingStrategy) -> Result<Self> {
        let tree = match strategy {
            LoadingStrategy::Mapped => ColumnTree::Mapped(MappedTree::parse(tree_bytes)?),
            LoadingStrategy::Deserialized => ColumnTree::Deserialized(VectorTree::deserialize(tree_bytes, vectors)?),
        };
        Ok(ColumnReader { key_id, tree })
    }

    /// Node count including the root
    pub fn len(&self) -> usize {
        match &self.tree {
            ColumnTree::Mapped(tree) => tree.len(),
            ColumnTree::Deserialized(tree) => tree.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    /// `vectors` is the vector section of the segment the column came from
    pub fn closest_match(&self, vectors: &[u8], query: &TermVector, similarity: &Similarity) -> Result<TermMatch> {
        match &self.tree {
            ColumnTree::Mapped(tree) => {
                let (index, score) = tree.closest_match(vectors, query, similarity)?;
                Ok(TermMatch {
                    score,
                    postings_offset: tree.record(index).postings_offset,
                    term: tree.vector(vectors, index)?.label(),
                })
            }
            ColumnTree::Deserialized(tree) => {
                let (id, score) = tree.closest_match(query, similarity);
                let node = tree.node(id);
                Ok(TermMatch {
                    score,
                    postings_offset: node.postings_offset,
                    term: node.vector.label(),
                })
            }
        }
    }

    /// Composes a vector over matched terms: each component key is the
    /// postings offset of a term's closest node, which identifies the term
    /// within the segment. Terms with no match at all are left out.
    pub fn create_document_vector<'a, I>(&self, vectors: &[u8], terms: I, similarity: &Similarity) -> Result<TermVector>
    where
        I: IntoIterator<Item = &'a TermVector>,
    {
        let mut document = TermVector::new();
        for term in terms {
            let hit = self.closest_match(vectors, term, similarity)?;
            if hit.score > 0.0 {
                document.increment(hit.postings_offset);
            }
        }
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use crate::core::types::DocId;
    use crate::storage::postings::PostingsWriter;
    use crate::vector::codec::VectorWriter;

    fn column_bytes(words: &[&str]) -> (Vec<u8>, Vec<u8>) {
        let sim = Similarity::default();
        let mut tree = VectorTree::new();
        for (i, word) in words.iter().enumerate() {
            tree.insert(TermVector::from_text(word), DocId(i as u64), &sim).unwrap();
        }
        let mut vectors = VectorWriter::new(Vec::new(), 0);
        let mut postings = PostingsWriter::new(Cursor::new(Vec::new())).unwrap();
        tree.flush_payload(&mut vectors, &mut postings).unwrap();
        let mut bytes = Vec::new();
        tree.serialize_tree(&mut bytes).unwrap();
        (bytes, vectors.writer)
    }

    #[test]
    fn test_strategies_agree() {
        let sim = Similarity::default();
        let (tree, vectors) = column_bytes(&["cat", "cats", "dog"]);
        let mapped = ColumnReader::open(KeyId(0), &tree, &vectors, LoadingStrategy::Mapped).unwrap();
        let loaded = ColumnReader::open(KeyId(0), &tree, &vectors, LoadingStrategy::Deserialized).unwrap();
        assert_eq!(mapped.len(), 4);

        for word in ["cat", "cats", "dog", "bird"] {
            let query = TermVector::from_text(word);
            assert_eq!(
                mapped.closest_match(&vectors, &query, &sim).unwrap(),
                loaded.closest_match(&vectors, &query, &sim).unwrap()
            );
        }

        let hit = mapped.closest_match(&vectors, &TermVector::from_text("tac"), &sim).unwrap();
        assert_eq!(hit.term, "act");
        assert!((hit.score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_document_vector_counts_terms() {
        let sim = Similarity::default();
        let (tree, vectors) = column_bytes(&["cat", "dog"]);
        let column = ColumnReader::open(KeyId(0), &tree, &vectors, LoadingStrategy::Mapped).unwrap();

        let cat = TermVector::from_text("cat");
        let dog = TermVector::from_text("dog");
        let cat_hit = column.closest_match(&vectors, &cat, &sim).unwrap();
        let dog_hit = column.closest_match(&vectors, &dog, &sim).unwrap();

        let doc = column.create_document_vector(&vectors, [&cat, &dog, &cat], &sim).unwrap();
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.get(cat_hit.postings_offset), Some(2));
        assert_eq!(doc.get(dog_hit.postings_offset), Some(1));
    }
}

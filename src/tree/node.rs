use std::fmt::Write as _;
use roaring::RoaringTreemap;
use crate::core::config::Similarity;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::DocId;
use crate::vector::term_vector::TermVector;

/// Stable handle of a node inside a `VectorTree` arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Offset value of a payload that has not been written yet
pub const UNSET_OFFSET: i64 = -1;

#[derive(Debug, Clone)]
pub struct Node {
    pub vector: TermVector,
    pub angle: f32,                  // Angle to the parent when attached, diagnostic only
    pub vector_offset: i64,
    pub postings_offset: i64,
    pub doc_ids: RoaringTreemap,     // Documents not yet written to the postings store
    pub left: Option<NodeId>,
    pub right: Option<NodeId>,
    pub parent: Option<NodeId>,      // Back-reference, not ownership
}

impl Node {
    pub fn new(vector: TermVector) -> Self {
        Node {
            vector,
            angle: 0.0,
            vector_offset: UNSET_OFFSET,
            postings_offset: UNSET_OFFSET,
            doc_ids: RoaringTreemap::new(),
            left: None,
            right: None,
            parent: None,
        }
    }

    /// Payload offsets are assigned once the node has been flushed
    pub fn is_durable(&self) -> bool {
        self.vector_offset >= 0
    }
}

/// Binary tree of term vectors, balanced by the cosine angle between a node
/// and its parent rather than by key order. Similar terms (angle above the
/// fold angle) go left, dissimilar terms go right; terms at or above the
/// identical angle are merged into the existing node.
///
/// Nodes live in an arena; `NodeId(0)` is the root sentinel, which carries an
/// empty vector and never scores as a match.
#[derive(Debug, Clone)]
pub struct VectorTree {
    pub(crate) nodes: Vec<Node>,
}

impl Default for VectorTree {
    fn default() -> Self {
        VectorTree::new()
    }
}

impl VectorTree {
    pub const ROOT: NodeId = NodeId(0);

    pub fn new() -> Self {
        VectorTree {
            nodes: vec![Node::new(TermVector::new())],
        }
    }

    pub fn root(&self) -> NodeId {
        Self::ROOT
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// Number of nodes including the root sentinel
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the tree holds no term besides the root
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    fn angle_to(&self, id: NodeId, query: &TermVector) -> f32 {
        query.cos_angle(&self.node(id).vector).unwrap_or(0.0)
    }

    /// Walks from the root following the fold rule and returns the node that
    /// scored highest on the way, with its score. The score may be low;
    /// callers decide whether it is usable.
    pub fn closest_match(&self, query: &TermVector, similarity: &Similarity) -> (NodeId, f32) {
        let mut best = Self::ROOT;
        let mut highscore = 0.0f32;
        let mut cursor = Some(Self::ROOT);

        while let Some(id) = cursor {
            let angle = self.angle_to(id, query);
            if angle > highscore {
                highscore = angle;
                best = id;
            }

            let node = self.node(id);
            cursor = if angle > similarity.fold_angle { node.left } else { node.right };
        }

        (best, highscore)
    }

    /// Indexes one occurrence of a term for `doc_id`. Descent starts at the
    /// closest match, which lies on the same fold path a walk from the root
    /// would take. Returns the node that now holds the document.
    pub fn insert(&mut self, vector: TermVector, doc_id: DocId, similarity: &Similarity) -> Result<NodeId> {
        if vector.is_empty() {
            return Err(Error::new(ErrorKind::InvalidArgument, "cannot index an empty term vector".to_string()));
        }

        let (start, _) = self.closest_match(&vector, similarity);
        let mut doc_ids = RoaringTreemap::new();
        doc_ids.insert(doc_id.0);
        Ok(self.insert_from(start, vector, doc_ids, similarity))
    }

    /// Attaches a term below `start`, or merges its documents into the first
    /// node on the path that is identical to it.
    pub fn insert_from(
        &mut self,
        start: NodeId,
        vector: TermVector,
        doc_ids: RoaringTreemap,
        similarity: &Similarity,
    ) -> NodeId {
        let mut cursor = start;

        loop {
            let angle = self.angle_to(cursor, &vector);

            if angle >= similarity.identical_angle {
                self.node_mut(cursor).doc_ids |= doc_ids;
                return cursor;
            }

            let go_left = angle > similarity.fold_angle;
            let next = if go_left { self.node(cursor).left } else { self.node(cursor).right };

            match next {
                Some(child) => cursor = child,
                None => {
                    let id = NodeId(self.nodes.len() as u32);
                    let mut node = Node::new(vector);
                    node.angle = angle;
                    node.doc_ids = doc_ids;
                    node.parent = Some(cursor);
                    self.nodes.push(node);

                    let parent = self.node_mut(cursor);
                    if go_left {
                        parent.left = Some(id);
                    } else {
                        parent.right = Some(id);
                    }
                    return id;
                }
            }
        }
    }

    pub fn root_of(&self, id: NodeId) -> NodeId {
        let mut cursor = id;
        while let Some(parent) = self.node(cursor).parent {
            cursor = parent;
        }
        cursor
    }

    /// Node ids in pre-order (node, left subtree, right subtree)
    pub fn iter(&self) -> PreOrder<'_> {
        PreOrder {
            tree: self,
            stack: vec![Self::ROOT],
        }
    }

    /// Number of left hops below `id`
    pub fn depth(&self, id: NodeId) -> usize {
        let mut count = 0;
        let mut cursor = self.node(id).left;
        while let Some(node) = cursor {
            count += 1;
            cursor = self.node(node).left;
        }
        count
    }

    /// (max left depth, width) measured along the right spine below the root
    pub fn size(&self) -> (usize, usize) {
        let mut depth = 0;
        let mut width = 0;
        let mut cursor = self.node(Self::ROOT).right;

        while let Some(id) = cursor {
            depth = depth.max(self.depth(id));
            width += 1;
            cursor = self.node(id).right;
        }

        (depth, width)
    }

    /// Indented rendering: left children one level deeper, right children at
    /// the parent's level
    pub fn visualize(&self) -> String {
        let mut output = String::new();
        let mut stack = vec![(Self::ROOT, 0usize)];

        while let Some((id, indent)) = stack.pop() {
            let node = self.node(id);
            let _ = writeln!(output, "{}.{} ({})", "\t".repeat(indent), node.vector.label(), node.angle);

            if let Some(right) = node.right {
                stack.push((right, indent));
            }
            if let Some(left) = node.left {
                stack.push((left, indent + 1));
            }
        }

        output
    }
}

pub struct PreOrder<'a> {
    tree: &'a VectorTree,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        let node = self.tree.node(id);
        if let Some(right) = node.right {
            self.stack.push(right);
        }
        if let Some(left) = node.left {
            self.stack.push(left);
        }
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim() -> Similarity {
        Similarity::default()
    }

    fn add(tree: &mut VectorTree, term: &str, doc: u64) -> NodeId {
        tree.insert(TermVector::from_text(term), DocId(doc), &sim()).unwrap()
    }

    fn ids(tree: &VectorTree, id: NodeId) -> Vec<u64> {
        tree.node(id).doc_ids.iter().collect()
    }

    #[test]
    fn test_first_term_goes_right_of_root() {
        let mut tree = VectorTree::new();
        let cat = add(&mut tree, "cat", 0);

        assert_eq!(tree.node(VectorTree::ROOT).right, Some(cat));
        assert_eq!(tree.node(cat).parent, Some(VectorTree::ROOT));
        assert!(!tree.is_empty());
    }

    #[test]
    fn test_similar_term_goes_left() {
        let mut tree = VectorTree::new();
        let cat = add(&mut tree, "cat", 0);
        let cats = add(&mut tree, "cats", 1);

        assert_ne!(cat, cats);
        assert_eq!(tree.node(cat).left, Some(cats));
        assert!((tree.node(cats).angle - 0.8660254).abs() < 1e-5);
        assert_eq!(ids(&tree, cat), vec![0]);
        assert_eq!(ids(&tree, cats), vec![1]);
    }

    #[test]
    fn test_dissimilar_term_goes_right() {
        let mut tree = VectorTree::new();
        let cat = add(&mut tree, "cat", 0);
        let dog = add(&mut tree, "dog", 1);
        assert_eq!(tree.node(cat).right, Some(dog));
    }

    #[test]
    fn test_identical_term_merges() {
        let mut tree = VectorTree::new();
        let first = add(&mut tree, "cat", 0);
        let second = add(&mut tree, "cat", 1);
        // Anagrams share a vector
        let third = add(&mut tree, "act", 2);

        assert_eq!(first, second);
        assert_eq!(first, third);
        assert_eq!(tree.len(), 2);
        assert_eq!(ids(&tree, first), vec![0, 1, 2]);
    }

    #[test]
    fn test_closest_match_scores() {
        let mut tree = VectorTree::new();
        let cat = add(&mut tree, "cat", 0);
        let cats = add(&mut tree, "cats", 1);

        let (hit, score) = tree.closest_match(&TermVector::from_text("cat"), &sim());
        assert_eq!(hit, cat);
        assert!((score - 1.0).abs() < 1e-6);

        let (hit, score) = tree.closest_match(&TermVector::from_text("cats"), &sim());
        assert_eq!(hit, cats);
        assert!((score - 1.0).abs() < 1e-6);

        let (_, score) = tree.closest_match(&TermVector::from_text("dog"), &sim());
        assert!(score < 0.5);
    }

    #[test]
    fn test_closest_match_on_empty_tree() {
        let tree = VectorTree::new();
        let (hit, score) = tree.closest_match(&TermVector::from_text("cat"), &sim());
        assert_eq!(hit, VectorTree::ROOT);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_inserted_term_is_found() {
        let words = ["search", "engine", "index", "vector", "tree", "angle", "postings",
            "segment", "session", "searching", "indexes", "trees", "zebra", "quartz"];
        let mut tree = VectorTree::new();
        for (i, word) in words.iter().enumerate() {
            add(&mut tree, word, i as u64);
        }

        for word in words {
            let (_, score) = tree.closest_match(&TermVector::from_text(word), &sim());
            assert!(score >= sim().identical_angle, "{} scored {}", word, score);
        }
    }

    #[test]
    fn test_empty_vector_rejected() {
        let mut tree = VectorTree::new();
        let err = tree.insert(TermVector::new(), DocId(0), &sim()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_root_of_and_preorder() {
        let mut tree = VectorTree::new();
        let cat = add(&mut tree, "cat", 0);
        let cats = add(&mut tree, "cats", 1);
        let dog = add(&mut tree, "dog", 2);

        assert_eq!(tree.root_of(cats), VectorTree::ROOT);
        let order: Vec<NodeId> = tree.iter().collect();
        assert_eq!(order, vec![VectorTree::ROOT, cat, cats, dog]);
        assert_eq!(tree.size(), (1, 2));
        assert!(tree.visualize().contains(".act"));
    }

    #[test]
    fn test_skewed_tree_does_not_recurse() {
        // Disjoint single-character terms all fold right into one long spine
        let mut tree = VectorTree::new();
        for i in 0..3_000u32 {
            let c = char::from_u32(0x4E00 + i).unwrap();
            add(&mut tree, &c.to_string(), i as u64);
        }

        assert_eq!(tree.len(), 3_001);
        assert_eq!(tree.size(), (0, 3_000));
        assert_eq!(tree.iter().count(), 3_001);
    }
}

use std::io::{Read, Seek, Write};
use crate::core::error::{Error, ErrorKind, Result};
use crate::storage::postings::PostingsWriter;
use crate::tree::node::{Node, NodeId, VectorTree};
use crate::vector::codec::{read_vector, VectorWriter};

/// angle f32 | vector offset i64 | postings offset i64 | component count i32 | terminator u8
pub const NODE_RECORD_SIZE: usize = 4 + 8 + 8 + 4 + 1;

/// Child-presence code closing every node record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Terminator {
    Both = 0,
    LeftOnly = 1,
    RightOnly = 2,
    Leaf = 3,
}

impl Terminator {
    pub fn of(left: bool, right: bool) -> Self {
        match (left, right) {
            (true, true) => Terminator::Both,
            (true, false) => Terminator::LeftOnly,
            (false, true) => Terminator::RightOnly,
            (false, false) => Terminator::Leaf,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(Terminator::Both),
            1 => Ok(Terminator::LeftOnly),
            2 => Ok(Terminator::RightOnly),
            3 => Ok(Terminator::Leaf),
            other => Err(Error::malformed(format!("invalid terminator {}", other))),
        }
    }

    pub fn has_left(self) -> bool {
        matches!(self, Terminator::Both | Terminator::LeftOnly)
    }

    pub fn has_right(self) -> bool {
        matches!(self, Terminator::Both | Terminator::RightOnly)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeRecord {
    pub angle: f32,
    pub vector_offset: i64,
    pub postings_offset: i64,
    pub component_count: i32,
    pub terminator: Terminator,
}

impl NodeRecord {
    pub fn to_bytes(&self) -> [u8; NODE_RECORD_SIZE] {
        let mut buf = [0u8; NODE_RECORD_SIZE];
        buf[0..4].copy_from_slice(&self.angle.to_le_bytes());
        buf[4..12].copy_from_slice(&self.vector_offset.to_le_bytes());
        buf[12..20].copy_from_slice(&self.postings_offset.to_le_bytes());
        buf[20..24].copy_from_slice(&self.component_count.to_le_bytes());
        buf[24] = self.terminator as u8;
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < NODE_RECORD_SIZE {
            return Err(Error::malformed(format!("node record of {} bytes", buf.len())));
        }

        let mut angle = [0u8; 4];
        angle.copy_from_slice(&buf[0..4]);
        let mut vector_offset = [0u8; 8];
        vector_offset.copy_from_slice(&buf[4..12]);
        let mut postings_offset = [0u8; 8];
        postings_offset.copy_from_slice(&buf[12..20]);
        let mut component_count = [0u8; 4];
        component_count.copy_from_slice(&buf[20..24]);

        Ok(NodeRecord {
            angle: f32::from_le_bytes(angle),
            vector_offset: i64::from_le_bytes(vector_offset),
            postings_offset: i64::from_le_bytes(postings_offset),
            component_count: i32::from_le_bytes(component_count),
            terminator: Terminator::from_byte(buf[24])?,
        })
    }
}

/// Children of one record, as indexes into the pre-order record list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Children {
    pub left: Option<u32>,
    pub right: Option<u32>,
}

/// Splits a tree stream into records; a tree always holds at least the root
pub fn decode_records(bytes: &[u8]) -> Result<Vec<NodeRecord>> {
    if bytes.is_empty() || bytes.len() % NODE_RECORD_SIZE != 0 {
        return Err(Error::malformed(format!(
            "tree stream of {} bytes is not a whole number of records",
            bytes.len()
        )));
    }

    bytes.chunks_exact(NODE_RECORD_SIZE).map(NodeRecord::from_bytes).collect()
}

/// Rebuilds the tree shape from the pre-order terminator sequence alone.
///
/// The record following a node with a left child is that child. After a
/// right-only node the next record is its right child. After a leaf, the next
/// record is the right child of the nearest pending node with both children.
pub fn reconstruct_shape(records: &[NodeRecord]) -> Result<Vec<Children>> {
    let mut shape = vec![Children::default(); records.len()];
    let mut pending: Vec<u32> = Vec::new();
    // Where the next record attaches: (parent, is_left)
    let mut slot: Option<(u32, bool)> = None;

    for (index, record) in records.iter().enumerate() {
        let index = index as u32;

        if index > 0 {
            let (parent, is_left) = slot.ok_or_else(|| {
                Error::malformed(format!("record {} follows a complete tree", index))
            })?;
            let children = &mut shape[parent as usize];
            if is_left {
                children.left = Some(index);
            } else {
                children.right = Some(index);
            }
        }

        slot = match record.terminator {
            Terminator::Both => {
                pending.push(index);
                Some((index, true))
            }
            Terminator::LeftOnly => Some((index, true)),
            Terminator::RightOnly => Some((index, false)),
            Terminator::Leaf => pending.pop().map(|parent| (parent, false)),
        };
    }

    if slot.is_some() {
        return Err(Error::malformed("tree stream ends before every child was read"));
    }

    Ok(shape)
}

/// Counters reported by a payload flush
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub new_nodes: usize,
    pub extended_nodes: usize,
    pub doc_ids_written: u64,
}

impl VectorTree {
    /// Writes postings and vectors for every node that needs it and assigns
    /// their offsets. Pending document ids are written exactly once and then
    /// cleared; a durable node only gets its postings list extended.
    pub fn flush_payload<W: Write, S: Read + Write + Seek>(
        &mut self,
        vectors: &mut VectorWriter<W>,
        postings: &mut PostingsWriter<S>,
    ) -> Result<FlushStats> {
        let mut stats = FlushStats::default();
        let order: Vec<NodeId> = self.iter().collect();

        for id in order {
            let is_root = id == Self::ROOT;
            let node = self.node_mut(id);

            if !node.is_durable() {
                if is_root {
                    node.postings_offset = postings.allocate_page()?;
                } else {
                    if node.doc_ids.is_empty() {
                        return Err(Error::new(
                            ErrorKind::InvalidState,
                            format!("node {} has no documents to flush", node.vector.label()),
                        ));
                    }
                    let ids: Vec<u64> = node.doc_ids.iter().collect();
                    node.postings_offset = postings.write(&ids)?;
                    node.doc_ids.clear();
                    stats.doc_ids_written += ids.len() as u64;
                }
                node.vector_offset = vectors.append(&node.vector)?;
                stats.new_nodes += 1;
            } else if !is_root && !node.doc_ids.is_empty() {
                let ids: Vec<u64> = node.doc_ids.iter().collect();
                postings.append(node.postings_offset, &ids)?;
                node.doc_ids.clear();
                stats.doc_ids_written += ids.len() as u64;
                stats.extended_nodes += 1;
            }
        }

        Ok(stats)
    }

    /// Writes one fixed-size record per node in pre-order. Every node must
    /// have been flushed. Returns the number of bytes written.
    pub fn serialize_tree<W: Write>(&self, writer: &mut W) -> Result<u64> {
        let mut written = 0u64;

        for id in self.iter() {
            let node = self.node(id);
            if node.vector_offset < 0 || node.postings_offset < 0 {
                return Err(Error::missing_offset(format!(
                    "node {} serialized before its payload was flushed",
                    node.vector.label()
                )));
            }

            let record = NodeRecord {
                angle: node.angle,
                vector_offset: node.vector_offset,
                postings_offset: node.postings_offset,
                component_count: node.vector.len() as i32,
                terminator: Terminator::of(node.left.is_some(), node.right.is_some()),
            };
            writer.write_all(&record.to_bytes())?;
            written += NODE_RECORD_SIZE as u64;
        }

        Ok(written)
    }

    /// Materializes a tree from its record stream and the vector stream the
    /// records point into. Nodes come back durable, with no pending ids.
    pub fn deserialize(tree_bytes: &[u8], vector_stream: &[u8]) -> Result<VectorTree> {
        let records = decode_records(tree_bytes)?;
        let shape = reconstruct_shape(&records)?;

        let mut nodes = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            if index > 0 && record.postings_offset < 0 {
                return Err(Error::missing_offset(format!("record {} has no postings", index)));
            }

            let mut node = Node::new(read_vector(vector_stream, record.vector_offset, record.component_count)?);
            node.angle = record.angle;
            node.vector_offset = record.vector_offset;
            node.postings_offset = record.postings_offset;
            node.left = shape[index].left.map(NodeId);
            node.right = shape[index].right.map(NodeId);
            nodes.push(node);
        }

        for (index, children) in shape.iter().enumerate() {
            let parent = Some(NodeId(index as u32));
            for child in [children.left, children.right].into_iter().flatten() {
                nodes[child as usize].parent = parent;
            }
        }

        Ok(VectorTree { nodes })
    }
}

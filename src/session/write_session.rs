use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::mem;
use std::sync::Arc;
use std::time::Instant;
use chrono::Utc;
use tracing::{info, warn};
use xxhash_rust::xxh3::xxh3_64;
use crate::analysis::tokenizer::Tokenizer;
use crate::core::error::Result;
use crate::core::types::{Document, FieldValue, KeyId, ValueId};
use crate::session::factory::Collection;
use crate::storage::doc_store::{read_doc_bytes, DocIndexReader, DocIndexWriter, DocWriter, DOC_INDEX_RECORD_SIZE};
use crate::storage::file_lock::FileLock;
use crate::storage::layout::{truncate_to_records, write_atomic};
use crate::storage::postings::PostingsWriter;
use crate::storage::segment::{ColumnPage, Section, SegmentInfo};
use crate::storage::value_store::{ValueIndexWriter, ValueWriter, VALUE_INDEX_RECORD_SIZE};
use crate::tree::node::VectorTree;
use crate::vector::codec::VectorWriter;
use crate::vector::term_vector::TermVector;

/// Ingests documents into a collection and publishes a new segment on close.
///
/// The session owns the collection's trees until it is closed or dropped.
/// Dropping it without `close` discards everything not yet flushed; published
/// segments are never touched.
pub struct WriteSession {
    collection: Arc<Collection>,
    trees: BTreeMap<KeyId, VectorTree>,
    dirty: BTreeSet<KeyId>,
    values: ValueWriter<BufWriter<File>>,
    value_index: ValueIndexWriter<BufWriter<File>>,
    docs: DocWriter<BufWriter<File>>,
    doc_index: DocIndexWriter<BufWriter<File>>,
    postings: PostingsWriter<File>,
    vectors: VectorWriter<BufWriter<File>>,
    doc_count: usize,
    closed: bool,
    _lock: FileLock,
}

impl WriteSession {
    pub fn open(collection: Arc<Collection>) -> Result<Self> {
        let layout = &collection.layout;
        let lock = FileLock::acquire(&layout.lock_path())?;

        // Appends interrupted before a crash leave partial index records
        truncate_to_records(&layout.value_index_path(), VALUE_INDEX_RECORD_SIZE)?;
        truncate_to_records(&layout.doc_index_path(), DOC_INDEX_RECORD_SIZE)?;

        let (values, values_len) = collection.create_append_stream(&layout.values_path())?;
        let (value_index, value_index_len) = collection.create_append_stream(&layout.value_index_path())?;
        let (docs, docs_len) = collection.create_append_stream(&layout.docs_path())?;
        let (doc_index, doc_index_len) = collection.create_append_stream(&layout.doc_index_path())?;
        let (vectors, vectors_len) = collection.create_append_stream(&layout.vectors_path())?;
        let postings = PostingsWriter::new(collection.create_read_write_stream(&layout.postings_path())?)?;

        let values = ValueWriter::new(values, values_len);
        let value_index = ValueIndexWriter::new(value_index, value_index_len)?;
        let docs = DocWriter::new(docs, docs_len);
        let doc_index = DocIndexWriter::new(doc_index, doc_index_len)?;
        let vectors = VectorWriter::new(vectors, vectors_len);

        // Last, so a failure above leaves the trees available
        let trees = collection.checkout_trees()?;

        Ok(WriteSession {
            collection,
            trees,
            dirty: BTreeSet::new(),
            values,
            value_index,
            docs,
            doc_index,
            postings,
            vectors,
            doc_count: 0,
            closed: false,
            _lock: lock,
        })
    }

    /// Indexes and stores `documents`, returning how many were written.
    ///
    /// A document whose field types conflict with the registered key types
    /// is rejected before any of its bytes are written.
    pub fn write(&mut self, documents: &[Document], tokenizer: &dyn Tokenizer) -> Result<usize> {
        let similarity = self.collection.config().similarity;
        let mut written = 0;

        for document in documents {
            for (name, value) in &document.fields {
                self.collection.check_key(name, value.data_type())?;
            }

            let doc_id = self.doc_index.next_doc_id();
            let mut map = Vec::with_capacity(document.fields.len());

            for (name, value) in &document.fields {
                let key_id = self.collection.get_or_create_key(name, value.data_type())?;
                let tree = self.trees.entry(key_id).or_default();

                if let FieldValue::Text(text) = value {
                    for token in tokenizer.tokenize(text) {
                        let vector = TermVector::from_text(&token);
                        if vector.is_empty() {
                            continue;
                        }
                        tree.insert(vector, doc_id, &similarity)?;
                    }
                }

                let entry = self.values.append(value)?;
                let value_id = ValueId(self.value_index.append(&entry)?);
                map.push((key_id, value_id));
                self.dirty.insert(key_id);
            }

            let address = self.docs.append(&map)?;
            self.doc_index.append(&address)?;
            // Stored documents count even if a later one in the batch fails
            self.doc_count += 1;
            written += 1;
        }

        Ok(written)
    }

    /// Flushes every dirty tree and store, then publishes a new segment
    /// version. Returns `None` if nothing was written in this session.
    pub fn close(mut self) -> Result<Option<SegmentInfo>> {
        let started = Instant::now();

        self.values.flush()?;
        self.value_index.flush()?;
        self.docs.flush()?;
        self.doc_index.flush()?;

        let dirty: Vec<KeyId> = self.dirty.iter().copied().collect();
        for key_id in dirty {
            self.flush_column(key_id)?;
        }

        for file in [
            self.values.writer.get_ref(),
            self.value_index.writer.get_ref(),
            self.docs.writer.get_ref(),
            self.doc_index.writer.get_ref(),
        ] {
            file.sync_data()?;
        }

        let segment = if self.doc_count > 0 {
            Some(self.publish()?)
        } else {
            None
        };

        info!(
            collection = self.collection.id,
            docs = self.doc_count,
            columns = self.dirty.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "closed write session"
        );

        self.closed = true;
        let trees = mem::take(&mut self.trees);
        self.collection.checkin_trees(Some(trees));
        Ok(segment)
    }

    /// Postings and vectors are durable before the column file that points
    /// at them is replaced
    fn flush_column(&mut self, key_id: KeyId) -> Result<()> {
        let started = Instant::now();
        let tree = self.trees.entry(key_id).or_default();

        let stats = tree.flush_payload(&mut self.vectors, &mut self.postings)?;
        self.vectors.flush()?;
        self.vectors.writer.get_ref().sync_data()?;
        self.postings.sync()?;

        let mut bytes = Vec::new();
        tree.serialize_tree(&mut bytes)?;
        write_atomic(&self.collection.layout.column_path(key_id), &bytes)?;

        let (depth, width) = tree.size();
        info!(
            collection = self.collection.id,
            key_id = key_id.0,
            nodes = tree.len(),
            new_nodes = stats.new_nodes,
            extended = stats.extended_nodes,
            depth,
            width,
            elapsed_us = started.elapsed().as_micros() as u64,
            "flushed column"
        );
        Ok(())
    }

    /// Writes the compound file, then the descriptor that makes it visible
    fn publish(&mut self) -> Result<SegmentInfo> {
        let layout = &self.collection.layout;
        let version = layout.next_version()?;
        let keys = self.collection.keys();

        let docs = fs::read(layout.docs_path())?;
        let doc_index = fs::read(layout.doc_index_path())?;
        let addresses = DocIndexReader::new(&doc_index);

        let path = layout.compound_path(version);
        let mut rdb = BufWriter::with_capacity(self.collection.config().write_buffer_size, File::create(&path)?);
        let mut position = 0u64;

        let mut columns = Vec::with_capacity(self.trees.len());
        for (key_id, tree) in &self.trees {
            let length = tree.serialize_tree(&mut rdb)?;
            columns.push(ColumnPage {
                key_id: *key_id,
                offset: position,
                length,
            });
            position += length;
        }

        // Every segment carries full copies of the vector and postings stores
        let length = io::copy(&mut File::open(layout.vectors_path())?, &mut rdb)?;
        let vector_section = Section { offset: position, length };
        position += length;

        let length = io::copy(&mut File::open(layout.postings_path())?, &mut rdb)?;
        let postings_section = Section { offset: position, length };
        position += length;

        let doc_hash_offset = position;
        for doc in 0..addresses.len() {
            let address = addresses.get(doc.into())?;
            let hash = xxh3_64(read_doc_bytes(&docs, &address)?);
            rdb.write_all(&hash.to_le_bytes())?;
            position += 8;
        }

        let doc_address_offset = position;
        let address_bytes = addresses.len() as usize * DOC_INDEX_RECORD_SIZE;
        rdb.write_all(&doc_index[..address_bytes])?;

        rdb.flush()?;
        rdb.get_ref().sync_all()?;

        let info = SegmentInfo {
            version,
            created_at: Utc::now(),
            doc_count: addresses.len(),
            keys,
            columns,
            vectors: vector_section,
            postings: postings_section,
            doc_hash_offset,
            doc_address_offset,
        };
        info.save(&layout.segment_info_path(version))?;

        info!(
            collection = self.collection.id,
            version,
            docs = info.doc_count,
            columns = info.columns.len(),
            vector_bytes = info.vectors.length,
            postings_bytes = info.postings.length,
            "published segment"
        );
        Ok(info)
    }
}

impl Drop for WriteSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if self.doc_count > 0 {
            warn!(
                collection = self.collection.id,
                docs = self.doc_count,
                "write session dropped without close, unflushed work discarded"
            );
        }
        // The trees may hold ids that were never flushed
        self.collection.checkin_trees(None);
    }
}

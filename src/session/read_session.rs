use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::sync::Arc;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use tracing::debug;
use xxhash_rust::xxh3::xxh3_64;
use crate::analysis::tokenizer::Tokenizer;
use crate::core::config::{Config, VersionSelect};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{DocId, StoredDocument};
use crate::mmap::MmapFile;
use crate::session::column::{ColumnReader, TermMatch};
use crate::storage::doc_store::{decode_doc_map, read_doc_bytes, DocIndexReader, DOC_INDEX_RECORD_SIZE};
use crate::storage::layout::CollectionLayout;
use crate::storage::postings::read_postings;
use crate::storage::segment::SegmentInfo;
use crate::storage::value_store::{read_value, ValueIndexReader};
use crate::vector::term_vector::TermVector;

/// Opens read sessions over the published segments of one collection
pub struct ReadSessionFactory {
    config: Config,
    layout: CollectionLayout,
}

impl ReadSessionFactory {
    pub fn open(config: Config, collection_id: u64) -> Result<Self> {
        let layout = CollectionLayout::new(&config.data_dir, collection_id)?;
        Ok(ReadSessionFactory { config, layout })
    }

    pub fn versions(&self) -> Result<Vec<u64>> {
        self.layout.versions()
    }

    /// Opens the version picked by `Config::version_select`
    pub fn open_default(&self) -> Result<ReadSession> {
        let versions = self.versions()?;
        let version = match self.config.version_select {
            VersionSelect::Oldest => versions.first(),
            VersionSelect::Latest => versions.last(),
        };

        match version {
            Some(version) => self.open_read_session(*version),
            None => Err(Error::new(
                ErrorKind::NotFound,
                format!("collection {} has no published segment", self.layout.collection_id),
            )),
        }
    }

    pub fn open_read_session(&self, version: u64) -> Result<ReadSession> {
        let info = SegmentInfo::load(&self.layout.segment_info_path(version))?;
        ReadSession::open(self.config.clone(), &self.layout, info)
    }
}

/// Document matched by a query, with the summed score of its matching terms
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub doc_id: DocId,
    pub score: f32,
    pub document: StoredDocument,
}

/// Immutable view of one published segment. Safe to share across threads.
pub struct ReadSession {
    pub info: SegmentInfo,
    config: Config,
    compound: MmapFile,
    docs: MmapFile,
    values: MmapFile,
    value_index: MmapFile,
    columns: RwLock<HashMap<String, Option<Arc<ColumnReader>>>>,
    postings_cache: Mutex<LruCache<i64, Arc<Vec<u64>>>>,
}

impl ReadSession {
    fn open(config: Config, layout: &CollectionLayout, info: SegmentInfo) -> Result<Self> {
        let compound = MmapFile::open_read_only(layout.compound_path(info.version))?;
        // Segment sections must all lie inside the compound file
        info.vectors.slice(compound.data())?;
        info.postings.slice(compound.data())?;
        let tail = info.doc_address_offset as usize + info.doc_count as usize * DOC_INDEX_RECORD_SIZE;
        if info.doc_hash_offset as usize + info.doc_count as usize * 8 > compound.len || tail > compound.len {
            return Err(Error::malformed(format!(
                "segment {} document sections exceed compound file",
                info.version
            )));
        }

        let cache_size = NonZeroUsize::new(config.postings_cache_size).unwrap_or(NonZeroUsize::MIN);
        debug!(
            collection = layout.collection_id,
            version = info.version,
            docs = info.doc_count,
            columns = info.columns.len(),
            "opened read session"
        );

        Ok(ReadSession {
            docs: MmapFile::open_or_empty(layout.docs_path())?,
            values: MmapFile::open_or_empty(layout.values_path())?,
            value_index: MmapFile::open_or_empty(layout.value_index_path())?,
            compound,
            info,
            config,
            columns: RwLock::new(HashMap::new()),
            postings_cache: Mutex::new(LruCache::new(cache_size)),
        })
    }

    fn vectors(&self) -> Result<&[u8]> {
        self.info.vectors.slice(self.compound.data())
    }

    /// The tree of `field`, or `None` when the segment has no such column
    pub fn column(&self, field: &str) -> Result<Option<Arc<ColumnReader>>> {
        if let Some(column) = self.columns.read().get(field) {
            return Ok(column.clone());
        }

        let column = match self.info.key_id(field).and_then(|key_id| self.info.column(key_id)) {
            Some(page) => {
                let start = page.offset as usize;
                let bytes = self
                    .compound
                    .data()
                    .get(start..start + page.length as usize)
                    .ok_or_else(|| Error::malformed(format!("column {} beyond compound file", field)))?;
                Some(Arc::new(ColumnReader::open(page.key_id, bytes, self.vectors()?, self.config.column_loading)?))
            }
            None => None,
        };

        self.columns.write().insert(field.to_string(), column.clone());
        Ok(column)
    }

    /// Closest indexed term of `field`, however weak the match
    pub fn closest_term(&self, field: &str, term: &str) -> Result<Option<TermMatch>> {
        let query = TermVector::from_text(term);
        if query.is_empty() {
            return Ok(None);
        }
        match self.column(field)? {
            Some(column) => Ok(Some(column.closest_match(self.vectors()?, &query, &self.config.similarity)?)),
            None => Ok(None),
        }
    }

    pub fn postings(&self, offset: i64) -> Result<Arc<Vec<u64>>> {
        if let Some(ids) = self.postings_cache.lock().get(&offset) {
            return Ok(Arc::clone(ids));
        }

        let section = self.info.postings.slice(self.compound.data())?;
        let ids = Arc::new(read_postings(section, offset)?);
        self.postings_cache.lock().put(offset, Arc::clone(&ids));
        Ok(ids)
    }

    pub fn read_document(&self, doc_id: DocId) -> Result<StoredDocument> {
        if doc_id.0 >= self.info.doc_count {
            return Err(Error::new(
                ErrorKind::NotFound,
                format!("document {} not in segment {}", doc_id.0, self.info.version),
            ));
        }

        let data = self.compound.data();
        let start = self.info.doc_address_offset as usize;
        let addresses = DocIndexReader::new(&data[start..start + self.info.doc_count as usize * DOC_INDEX_RECORD_SIZE]);
        let address = addresses.get(doc_id)?;
        let bytes = read_doc_bytes(self.docs.data(), &address)?;

        let hash_at = self.info.doc_hash_offset as usize + doc_id.0 as usize * 8;
        let mut expected = [0u8; 8];
        expected.copy_from_slice(&data[hash_at..hash_at + 8]);
        if xxh3_64(bytes) != u64::from_le_bytes(expected) {
            return Err(Error::malformed(format!("document {} does not match its hash", doc_id.0)));
        }

        let value_index = ValueIndexReader::new(self.value_index.data());
        let mut fields = Vec::new();
        for (key_id, value_id) in decode_doc_map(bytes)? {
            let key = self
                .info
                .keys
                .get(key_id.0 as usize)
                .ok_or_else(|| Error::malformed(format!("document {} names unknown key {}", doc_id.0, key_id.0)))?;
            let value = read_value(self.values.data(), &value_index.get(value_id.0)?)?;
            fields.push((key.name.clone(), value));
        }

        Ok(StoredDocument { id: doc_id, fields })
    }

    /// Documents matching the tokens of `text` in `field`. Tokens whose
    /// closest term scores below `match_threshold` contribute nothing.
    pub fn query(&self, field: &str, text: &str, tokenizer: &dyn Tokenizer) -> Result<Vec<ScoredDocument>> {
        let mut scores: BTreeMap<u64, f32> = BTreeMap::new();

        for token in tokenizer.tokenize(text) {
            let hit = match self.closest_term(field, &token)? {
                Some(hit) if hit.score >= self.config.match_threshold => hit,
                _ => continue,
            };
            for id in self.postings(hit.postings_offset)?.iter() {
                *scores.entry(*id).or_insert(0.0) += hit.score;
            }
        }

        let mut results = scores
            .into_iter()
            .map(|(id, score)| {
                Ok(ScoredDocument {
                    doc_id: DocId(id),
                    score,
                    document: self.read_document(DocId(id))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        // Highest score first, then by document id
        results.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.doc_id.cmp(&b.doc_id)));
        Ok(results)
    }

    /// Runs independent queries in parallel
    pub fn query_many(&self, queries: &[(&str, &str)], tokenizer: &dyn Tokenizer) -> Result<Vec<Vec<ScoredDocument>>> {
        queries
            .par_iter()
            .map(|(field, text)| self.query(field, text, tokenizer))
            .collect()
    }
}

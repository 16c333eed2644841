pub mod core;
pub mod vector;
pub mod tree;
pub mod storage;
pub mod mmap;
pub mod analysis;
pub mod session;

pub use crate::core::config::{Config, LoadingStrategy, Similarity, VersionSelect};
pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::core::types::{collection_id, DataType, DocId, Document, FieldValue, KeyId, StoredDocument};
pub use crate::session::{ReadSession, ReadSessionFactory, ScoredDocument, SessionFactory, WriteSession};

/*
┌──────────────────────────────────── VECDEX ARCHITECTURE ────────────────────────────────────┐
│                                                                                              │
│  SessionFactory ── per data dir                                                              │
│   └─ Collection (Arc, one per collection id)                                                 │
│       • registry: Mutex<KeyRegistry>     key hash → KeyId, .key/.kix appends                 │
│       • trees: Mutex<TreeSlot>           BTreeMap<KeyId, VectorTree>, one holder at a time   │
│                                                                                              │
│  WriteSession                                                                                │
│   write(docs) ─ tokenize ─ TermVector::from_text ─ VectorTree::insert                        │
│               ─ .val/.vix value ─ .docs/.dix key/value map                                   │
│   close()     ─ per dirty key: flush_payload (.pos, .vec) ─ sync ─ <cid>.<kid>.ix            │
│               ─ <version>.rdb ─ <version>.ix (visible from here on)                          │
│                                                                                              │
│  ReadSessionFactory ─ <version>.ix ─ ReadSession (mmap of .rdb)                              │
│   query(field, text) ─ ColumnReader::closest_match ─ postings ─ read_document                │
│                                                                                              │
│  <version>.rdb:                                                                              │
│   [column trees][vector snapshot][postings snapshot][doc hashes][doc addresses]              │
│                                                                                              │
│  VectorTree node record (25 bytes, pre-order):                                               │
│   angle f32 | vector offset i64 | postings offset i64 | components i32 | terminator u8       │
│   terminator: 0 both children, 1 left only, 2 right only, 3 leaf                             │
│                                                                                              │
└──────────────────────────────────────────────────────────────────────────────────────────────┘
*/

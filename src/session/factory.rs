use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;
use parking_lot::{Mutex, RwLock};
use tracing::debug;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{key_hash, DataType, FieldValue, KeyId};
use crate::session::read_session::ReadSessionFactory;
use crate::session::write_session::WriteSession;
use crate::storage::layout::{truncate_to_records, CollectionLayout};
use crate::storage::segment::KeyInfo;
use crate::storage::value_store::{read_bytes, ValueIndexReader, ValueIndexWriter, ValueWriter, VALUE_INDEX_RECORD_SIZE};
use crate::tree::node::VectorTree;

/// Entry point for all sessions under one data directory.
///
/// Collections are opened once and shared: every session of a collection sees
/// the same key registry and the same in-memory trees.
pub struct SessionFactory {
    config: Config,
    collections: RwLock<HashMap<u64, Arc<Collection>>>,
}

impl SessionFactory {
    pub fn new(config: Config) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;
        Ok(SessionFactory {
            config,
            collections: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn collection(&self, collection_id: u64) -> Result<Arc<Collection>> {
        if let Some(collection) = self.collections.read().get(&collection_id) {
            return Ok(Arc::clone(collection));
        }

        let mut collections = self.collections.write();
        if let Some(collection) = collections.get(&collection_id) {
            return Ok(Arc::clone(collection));
        }
        let collection = Arc::new(Collection::open(&self.config, collection_id)?);
        collections.insert(collection_id, Arc::clone(&collection));
        Ok(collection)
    }

    /// Fails with `InvalidState` while another write session of the
    /// collection is open
    pub fn open_write_session(&self, collection_id: u64) -> Result<WriteSession> {
        WriteSession::open(self.collection(collection_id)?)
    }

    pub fn read_session_factory(&self, collection_id: u64) -> Result<ReadSessionFactory> {
        ReadSessionFactory::open(self.config.clone(), collection_id)
    }

    pub fn get_or_create_key(&self, collection_id: u64, name: &str, data_type: DataType) -> Result<KeyId> {
        self.collection(collection_id)?.get_or_create_key(name, data_type)
    }

    pub fn key_id(&self, collection_id: u64, key_hash: u64) -> Result<Option<KeyId>> {
        Ok(self.collection(collection_id)?.key_id(key_hash))
    }
}

/// Field names of a collection and their persisted form
struct KeyRegistry {
    ids: HashMap<u64, KeyId>,
    keys: Vec<KeyInfo>,
    names: ValueWriter<File>,
    index: ValueIndexWriter<File>,
}

#[derive(Default)]
struct TreeSlot {
    trees: Option<BTreeMap<KeyId, VectorTree>>,   // None until loaded, or after a failed session
    checked_out: bool,
}

pub struct Collection {
    pub id: u64,
    pub layout: CollectionLayout,
    config: Config,
    registry: Mutex<KeyRegistry>,
    trees: Mutex<TreeSlot>,
}

impl Collection {
    fn open(config: &Config, collection_id: u64) -> Result<Self> {
        let layout = CollectionLayout::new(&config.data_dir, collection_id)?;
        let registry = KeyRegistry::load(&layout)?;
        debug!(collection = collection_id, keys = registry.keys.len(), "opened collection");

        Ok(Collection {
            id: collection_id,
            layout,
            config: config.clone(),
            registry: Mutex::new(registry),
            trees: Mutex::new(TreeSlot::default()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn key_id(&self, key_hash: u64) -> Option<KeyId> {
        self.registry.lock().ids.get(&key_hash).copied()
    }

    /// Registered keys, indexed by key id
    pub fn keys(&self) -> Vec<KeyInfo> {
        self.registry.lock().keys.clone()
    }

    /// Checks that `name` may hold a value of `data_type` without registering it
    pub fn check_key(&self, name: &str, data_type: DataType) -> Result<()> {
        let registry = self.registry.lock();
        match registry.ids.get(&key_hash(name)) {
            Some(id) => registry.verify(*id, name, data_type),
            None => Ok(()),
        }
    }

    /// Returns the id of `name`, registering it on first use. Allocation and
    /// the key index append happen under one lock, so two writers can never
    /// hand out the same id.
    pub fn get_or_create_key(&self, name: &str, data_type: DataType) -> Result<KeyId> {
        let hash = key_hash(name);
        let mut registry = self.registry.lock();

        if let Some(id) = registry.ids.get(&hash).copied() {
            registry.verify(id, name, data_type)?;
            return Ok(id);
        }

        let id = KeyId(registry.keys.len() as u32);
        let mut entry = registry.names.append(&FieldValue::Text(name.to_string()))?;
        entry.data_type = data_type;
        let record = registry.index.append(&entry)?;
        if record != id.0 as u64 {
            return Err(Error::new(
                ErrorKind::KeyRegistrationConflict,
                format!("key {} got index record {} for id {}", name, record, id.0),
            ));
        }
        registry.names.flush()?;
        registry.index.flush()?;

        registry.ids.insert(hash, id);
        registry.keys.push(KeyInfo {
            name: name.to_string(),
            data_type,
        });
        debug!(collection = self.id, key = name, key_id = id.0, ?data_type, "registered key");
        Ok(id)
    }

    /// Hands the in-memory trees to a write session. Only one session can
    /// hold them at a time.
    pub fn checkout_trees(&self) -> Result<BTreeMap<KeyId, VectorTree>> {
        let mut slot = self.trees.lock();
        if slot.checked_out {
            return Err(Error::new(
                ErrorKind::InvalidState,
                format!("collection {} already has an open write session", self.id),
            ));
        }

        let trees = match slot.trees.take() {
            Some(trees) => trees,
            None => self.load_trees()?,
        };
        slot.checked_out = true;
        Ok(trees)
    }

    /// Returns trees after a session; `None` drops them so the next session
    /// reloads the last flushed state from disk
    pub fn checkin_trees(&self, trees: Option<BTreeMap<KeyId, VectorTree>>) {
        let mut slot = self.trees.lock();
        slot.trees = trees;
        slot.checked_out = false;
    }

    fn load_trees(&self) -> Result<BTreeMap<KeyId, VectorTree>> {
        let vectors = read_or_empty(&self.layout.vectors_path())?;
        let key_count = self.registry.lock().keys.len() as u32;

        let mut trees = BTreeMap::new();
        for key_id in (0..key_count).map(KeyId) {
            let path = self.layout.column_path(key_id);
            if !path.exists() {
                continue;
            }
            let tree = VectorTree::deserialize(&fs::read(&path)?, &vectors)?;
            debug!(collection = self.id, key_id = key_id.0, nodes = tree.len(), "loaded column");
            trees.insert(key_id, tree);
        }
        Ok(trees)
    }

    /// Buffered append-only stream and the current length of its file
    pub fn create_append_stream(&self, path: &Path) -> Result<(BufWriter<File>, u64)> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();
        Ok((BufWriter::with_capacity(self.config.write_buffer_size, file), len))
    }

    /// Unbuffered stream for stores that are patched in place
    pub fn create_read_write_stream(&self, path: &Path) -> Result<File> {
        Ok(OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?)
    }
}

impl KeyRegistry {
    fn load(layout: &CollectionLayout) -> Result<Self> {
        truncate_to_records(&layout.key_index_path(), VALUE_INDEX_RECORD_SIZE)?;
        let names_bytes = read_or_empty(&layout.keys_path())?;
        let index_bytes = read_or_empty(&layout.key_index_path())?;

        let mut ids = HashMap::new();
        let mut keys = Vec::new();
        for (i, entry) in ValueIndexReader::new(&index_bytes).iter().enumerate() {
            let entry = entry?;
            let name = String::from_utf8(read_bytes(&names_bytes, &entry)?.to_vec())
                .map_err(|_| Error::malformed(format!("key {} is not valid UTF-8", i)))?;
            if ids.insert(key_hash(&name), KeyId(i as u32)).is_some() {
                return Err(Error::new(
                    ErrorKind::KeyRegistrationConflict,
                    format!("key {} is registered twice", name),
                ));
            }
            keys.push(KeyInfo {
                name,
                data_type: entry.data_type,
            });
        }

        let append = |path: &Path| OpenOptions::new().create(true).append(true).open(path);
        let names = append(layout.keys_path().as_path())?;
        let index = append(layout.key_index_path().as_path())?;

        Ok(KeyRegistry {
            ids,
            keys,
            names: ValueWriter::new(names, names_bytes.len() as u64),
            index: ValueIndexWriter::new(index, index_bytes.len() as u64)?,
        })
    }

    fn verify(&self, id: KeyId, name: &str, data_type: DataType) -> Result<()> {
        let key = &self.keys[id.0 as usize];
        if key.name != name {
            return Err(Error::new(
                ErrorKind::KeyRegistrationConflict,
                format!("keys {} and {} share a hash", key.name, name),
            ));
        }
        if key.data_type != data_type {
            return Err(Error::new(
                ErrorKind::KeyTypeConflict,
                format!("key {} holds {:?} values, got {:?}", name, key.data_type, data_type),
            ));
        }
        Ok(())
    }
}

pub(crate) fn read_or_empty(path: &Path) -> Result<Vec<u8>> {
    match fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(err.into()),
    }
}

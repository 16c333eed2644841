use std::path::PathBuf;

/// Angle at or above which two term vectors are treated as the same term
pub const IDENTICAL_ANGLE: f32 = 0.98;

/// Angle above which a term descends into the left ("similar") subtree
pub const FOLD_ANGLE: f32 = 0.5;

/// Decision thresholds for tree descent and term merging
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    pub identical_angle: f32,
    pub fold_angle: f32,
}

impl Default for Similarity {
    fn default() -> Self {
        Similarity {
            identical_angle: IDENTICAL_ANGLE,
            fold_angle: FOLD_ANGLE,
        }
    }
}

/// Which published segment version a read session pins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSelect {
    Oldest,
    Latest,
}

/// How a read session loads a column tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadingStrategy {
    /// Walk the tree records in place, decoding vectors on demand
    Mapped,
    /// Materialize the whole tree into memory on first use
    Deserialized,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub similarity: Similarity,
    pub match_threshold: f32,           // Minimum closest-match score for a query hit
    pub write_buffer_size: usize,       // BufWriter capacity for append streams
    pub version_select: VersionSelect,
    pub column_loading: LoadingStrategy,
    pub postings_cache_size: usize,     // LRU entries per read session
}

impl Config {
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Config {
            data_dir: data_dir.into(),
            ..Config::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("./data"),
            similarity: Similarity::default(),
            match_threshold: 0.75,
            write_buffer_size: 64 * 1024,
            version_select: VersionSelect::Latest,
            column_loading: LoadingStrategy::Mapped,
            postings_cache_size: 1024,
        }
    }
}

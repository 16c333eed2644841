pub mod mmap_file;

pub use mmap_file::MmapFile;

pub mod layout;
pub mod file_lock;
pub mod postings;
pub mod value_store;
pub mod doc_store;
pub mod segment;

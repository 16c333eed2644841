pub mod term_vector;
pub mod codec;

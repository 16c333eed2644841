pub mod tokenizer;

pub use tokenizer::{LatinTokenizer, StandardTokenizer, Tokenizer};

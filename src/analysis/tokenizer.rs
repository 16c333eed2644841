use unicode_segmentation::UnicodeSegmentation;

/// Splits field text into the terms that get indexed
pub trait Tokenizer: Send + Sync {
    /// Content type this tokenizer handles, `*` for any
    fn content_type(&self) -> &str;

    /// Applied to the whole text before splitting
    fn normalize(&self, text: &str) -> String;

    fn tokenize(&self, text: &str) -> Vec<String>;
}

/// Lower-cases and splits on punctuation and whitespace
#[derive(Debug, Clone, Default)]
pub struct LatinTokenizer;

const DELIMITERS: &[char] = &[
    '.', ',', '?', '!', ':', ';', '\\', '/', '\n', '\r', '\t', '(', ')', '[', ']', '"', '`', '´',
    '-', '=', '&', '\'', ' ',
];

impl Tokenizer for LatinTokenizer {
    fn content_type(&self) -> &str {
        "*"
    }

    fn normalize(&self, text: &str) -> String {
        text.to_lowercase()
    }

    fn tokenize(&self, text: &str) -> Vec<String> {
        self.normalize(text)
            .split(DELIMITERS)
            .filter(|token| !token.trim().is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Standard Unicode tokenizer
#[derive(Debug, Clone)]
pub struct StandardTokenizer {
    pub lowercase: bool,
    pub max_token_length: usize,
}

impl Default for StandardTokenizer {
    fn default() -> Self {
        StandardTokenizer {
            lowercase: true,
            max_token_length: 255,
        }
    }
}

impl Tokenizer for StandardTokenizer {
    fn content_type(&self) -> &str {
        "text/plain"
    }

    fn normalize(&self, text: &str) -> String {
        if self.lowercase {
            text.to_lowercase()
        } else {
            text.to_string()
        }
    }

    fn tokenize(&self, text: &str) -> Vec<String> {
        self.normalize(text)
            .unicode_words()
            .filter(|word| word.len() <= self.max_token_length)
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin_splits_on_delimiters() {
        let tokens = LatinTokenizer.tokenize("The Cat's (tiny) hat-stand; 2 x\tDogs!");
        assert_eq!(tokens, vec!["the", "cat", "s", "tiny", "hat", "stand", "2", "x", "dogs"]);
    }

    #[test]
    fn test_latin_empty_text() {
        assert!(LatinTokenizer.tokenize("  ... ").is_empty());
    }

    #[test]
    fn test_standard_uses_word_boundaries() {
        let tokenizer = StandardTokenizer::default();
        assert_eq!(tokenizer.tokenize("Hello, Wörld! can't"), vec!["hello", "wörld", "can't"]);

        let short = StandardTokenizer { lowercase: false, max_token_length: 3 };
        assert_eq!(short.tokenize("Big elephant"), vec!["Big"]);
    }
}

use std::collections::BTreeMap;

/// Sparse frequency vector keyed by character code point (or term id for
/// composed vectors). Keys are kept in ascending order, which the codec and
/// the dot product rely on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermVector {
    components: BTreeMap<i64, i32>,
}

impl TermVector {
    pub fn new() -> Self {
        TermVector {
            components: BTreeMap::new(),
        }
    }

    /// Counts each code point of `text`, saturating at `i32::MAX`
    pub fn from_text(text: &str) -> Self {
        let mut vec = TermVector::new();
        for c in text.chars() {
            vec.increment(c as i64);
        }
        vec
    }

    pub fn from_components<I: IntoIterator<Item = (i64, i32)>>(components: I) -> Self {
        TermVector {
            components: components.into_iter().collect(),
        }
    }

    pub fn increment(&mut self, key: i64) {
        let count = self.components.entry(key).or_insert(0);
        *count = count.saturating_add(1);
    }

    pub fn insert(&mut self, key: i64, count: i32) {
        self.components.insert(key, count);
    }

    pub fn get(&self, key: i64) -> Option<i32> {
        self.components.get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Components in ascending key order
    pub fn iter(&self) -> impl Iterator<Item = (i64, i32)> + '_ {
        self.components.iter().map(|(k, v)| (*k, *v))
    }

    /// Iterates the shorter vector and probes the longer one by key
    pub fn dot(&self, other: &TermVector) -> i64 {
        let (source, target) = if self.len() < other.len() {
            (self, other)
        } else {
            (other, self)
        };

        source
            .components
            .iter()
            .filter_map(|(key, a)| target.components.get(key).map(|b| *a as i64 * *b as i64))
            .sum()
    }

    pub fn dot_self(&self) -> i64 {
        self.components.values().map(|v| *v as i64 * *v as i64).sum()
    }

    pub fn magnitude(&self) -> f64 {
        (self.dot_self() as f64).sqrt()
    }

    /// Cosine of the angle between two vectors, 1.0 meaning same direction.
    /// `None` when either vector is empty.
    pub fn cos_angle(&self, other: &TermVector) -> Option<f32> {
        if self.is_empty() || other.is_empty() {
            return None;
        }

        let dot = self.dot(other) as f64;
        let denom = self.magnitude() * other.magnitude();
        if denom == 0.0 {
            return None;
        }

        Some((dot / denom) as f32)
    }

    /// Component-wise sum, saturating
    pub fn add(&self, other: &TermVector) -> TermVector {
        let mut result = self.components.clone();
        for (key, value) in &other.components {
            let count = result.entry(*key).or_insert(0);
            *count = count.saturating_add(*value);
        }
        TermVector { components: result }
    }

    /// Structural union of keys, every component weighted 1
    pub fn merge(&self, other: &TermVector) -> TermVector {
        TermVector {
            components: self
                .components
                .keys()
                .chain(other.components.keys())
                .map(|key| (*key, 1))
                .collect(),
        }
    }

    /// Component-wise difference floored at zero; zeroed components are dropped
    pub fn subtract(&self, other: &TermVector) -> TermVector {
        TermVector {
            components: self
                .components
                .iter()
                .filter_map(|(key, value)| {
                    let remaining = value.saturating_sub(other.get(*key).unwrap_or(0));
                    (remaining > 0).then_some((*key, remaining))
                })
                .collect(),
        }
    }

    /// Renders code-point keys back to characters, for diagnostics
    pub fn label(&self) -> String {
        self.components
            .keys()
            .map(|key| {
                u32::try_from(*key)
                    .ok()
                    .and_then(char::from_u32)
                    .unwrap_or(char::REPLACEMENT_CHARACTER)
            })
            .collect()
    }
}

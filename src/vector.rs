//! String and sparse feature vectors.

/// One extracted feature: a template type, a string value and an optional
/// weight.
#[derive(Debug, Clone, PartialEq)]
pub struct StringFeature {
    pub kind: String,
    pub value: String,
    pub weight: f32,
}

/// Ordered sequence of features extracted from one annotation instance.
///
/// Insertion order is significant (it drives id assignment during
/// compaction); duplicate types are allowed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringFeatureVector {
    features: Vec<StringFeature>,
}

impl StringFeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: &str, value: &str) {
        self.push_weighted(kind, value, 1.0);
    }

    pub fn push_weighted(&mut self, kind: &str, value: &str, weight: f32) {
        self.features.push(StringFeature {
            kind: kind.to_string(),
            value: value.to_string(),
            weight,
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &StringFeature> {
        self.features.iter()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Ordered sequence of (feature id, weight) pairs.
///
/// Ids are stable only relative to the model whose feature map produced
/// them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseFeatureVector {
    entries: Vec<(u32, f32)>,
}

impl SparseFeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: u32, weight: f32) {
        self.entries.push((id, weight));
    }

    pub fn iter(&self) -> impl Iterator<Item = &(u32, f32)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_and_duplicates() {
        let mut v = StringFeatureVector::new();
        v.push("w", "cat");
        v.push("w", "cat");
        v.push_weighted("d", "2", 0.5);
        let collected: Vec<_> = v.iter().map(|f| (f.kind.as_str(), f.value.as_str())).collect();
        assert_eq!(vec![("w", "cat"), ("w", "cat"), ("d", "2")], collected);
        assert_eq!(3, v.len());
    }
}

//! Accumulation of training instances and index compaction.

use hashbrown::HashMap;

use crate::model::{feature_key, FeatureMap, LabelMap};
use crate::vector::StringFeatureVector;

/// A counter that remembers first-seen order.
#[derive(Debug, Default)]
struct Counter {
    counts: HashMap<String, u32>,
    order: Vec<String>,
}

impl Counter {
    fn add(&mut self, key: &str) {
        if let Some(count) = self.counts.get_mut(key) {
            *count += 1;
        } else {
            self.counts.insert(key.to_string(), 1);
            self.order.push(key.to_string());
        }
    }

    /// Keys with count strictly greater than `cutoff`, in first-seen order.
    fn survivors(&self, cutoff: u32) -> Vec<String> {
        self.order
            .iter()
            .filter(|key| self.counts[key.as_str()] > cutoff)
            .cloned()
            .collect()
    }
}

/// A collection of (label, string vector) instances plus occurrence counts.
#[derive(Debug, Default)]
pub struct TrainingSpace {
    instances: Vec<(String, StringFeatureVector)>,
    labels: Counter,
    features: Counter,
}

impl TrainingSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one training instance and updates the occurrence counts.
    pub fn add_instance(&mut self, label: &str, vector: StringFeatureVector) {
        self.labels.add(label);
        for f in vector.iter() {
            self.features.add(&feature_key(&f.kind, &f.value));
        }
        self.instances.push((label.to_string(), vector));
    }

    pub fn instances(&self) -> &[(String, StringFeatureVector)] {
        &self.instances
    }

    pub fn num_instances(&self) -> usize {
        self.instances.len()
    }

    /// Drops labels/features with count <= cutoff and assigns contiguous ids
    /// in first-seen order among the survivors.
    ///
    /// Deterministic for a fixed instance order.
    pub fn compact(&self, label_cutoff: u32, feature_cutoff: u32) -> (LabelMap, FeatureMap) {
        let labels = LabelMap::from_labels(self.labels.survivors(label_cutoff));
        let features = FeatureMap::from_keys(self.features.survivors(feature_cutoff));
        (labels, features)
    }
}

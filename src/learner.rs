//! Online learning: adaptive-rate hinge and logistic updates.

use tracing::info;

use crate::errors::{GondolaError, Result};
use crate::model::Model;
use crate::space::TrainingSpace;
use crate::vector::SparseFeatureVector;

/// The weight update rule.
#[derive(Debug, Clone, Copy)]
pub enum UpdateRule {
    /// Margin-based hinge update: change weights only when the best wrong
    /// label comes within `margin` of the true label.
    Hinge { margin: f32 },

    /// Gradient of the log-loss over the candidate label set.
    Logistic,
}

impl Default for UpdateRule {
    fn default() -> Self {
        Self::Hinge { margin: 1.0 }
    }
}

/// Online trainer with a per-feature adaptive learning rate.
///
/// Every weight cell keeps a running sum of squared gradients in the model;
/// the effective step for a cell is `base_rate / sqrt(sum + epsilon)`.
/// Updates are strictly sequential per instance.
pub struct OnlineTrainer {
    rule: UpdateRule,
    base_rate: f32,
    epsilon: f32,
}

impl OnlineTrainer {
    pub fn new(rule: UpdateRule, base_rate: f32) -> Self {
        Self {
            rule,
            base_rate,
            epsilon: 1e-6,
        }
    }

    /// Applies one online update.
    ///
    /// `candidates` restricts the labels competing with `gold`; an empty
    /// slice means all labels.
    ///
    /// # Errors
    ///
    /// [`GondolaError::InvalidArgument`] if the model has no gradient state
    /// (a stripped decode-only model) or `gold` is out of range.
    pub fn update(
        &self,
        model: &mut Model,
        gold: u32,
        vector: &SparseFeatureVector,
        candidates: &[u32],
    ) -> Result<()> {
        if model.gradients.is_none() {
            return Err(GondolaError::invalid_argument(
                "model",
                "gradient state was stripped; the model is decode-only",
            ));
        }
        if gold as usize >= model.num_labels() {
            return Err(GondolaError::invalid_argument(
                "gold",
                format!("label {gold} out of range"),
            ));
        }
        if model.weights.is_binary() {
            match self.rule {
                UpdateRule::Hinge { margin } => self.update_binary_hinge(model, gold, vector, margin),
                UpdateRule::Logistic => self.update_binary_logistic(model, gold, vector),
            }
        } else {
            match self.rule {
                UpdateRule::Hinge { margin } => {
                    self.update_hinge(model, gold, vector, candidates, margin)
                }
                UpdateRule::Logistic => self.update_logistic(model, gold, vector, candidates),
            }
        }
        Ok(())
    }

    /// Runs `passes` sequential passes over the training space, logging the
    /// per-pass accuracy. Instances whose label was dropped by the cutoff
    /// are skipped.
    pub fn run_passes(&self, model: &mut Model, space: &TrainingSpace, passes: usize) -> Result<f64> {
        let mut accuracy = 0.0;
        for pass in 1..=passes {
            let mut correct = 0usize;
            let mut total = 0usize;
            for (label, vector) in space.instances() {
                let Some(gold) = model.label_id(label) else {
                    continue;
                };
                let sparse = model.to_sparse(vector);
                if model.predict_best(&sparse).map(|(id, _)| id) == Some(gold) {
                    correct += 1;
                }
                total += 1;
                self.update(model, gold, &sparse, &[])?;
            }
            accuracy = if total == 0 {
                0.0
            } else {
                correct as f64 / total as f64
            };
            info!(pass, total, accuracy, "training pass finished");
        }
        Ok(accuracy)
    }

    #[inline]
    fn step(&self, accumulated: f32) -> f32 {
        self.base_rate / (accumulated + self.epsilon).sqrt()
    }

    fn update_hinge(
        &self,
        model: &mut Model,
        gold: u32,
        vector: &SparseFeatureVector,
        candidates: &[u32],
        margin: f32,
    ) {
        let scores = model.weights.scores(vector);
        let wrong = best_wrong(&scores, gold, candidates);
        let Some(wrong) = wrong else { return };
        if scores[gold as usize] - scores[wrong as usize] >= margin {
            return;
        }
        let gradients = model.gradients.as_mut().unwrap();
        for &(fid, w) in vector.iter() {
            if fid >= model.weights.num_features() {
                continue;
            }
            let up = model.weights.idx(gold, fid);
            gradients[up] += w * w;
            let delta = self.step(gradients[up]) * w;
            model.weights.add(up, delta);

            let down = model.weights.idx(wrong, fid);
            gradients[down] += w * w;
            let delta = self.step(gradients[down]) * w;
            model.weights.add(down, -delta);
        }
    }

    fn update_logistic(
        &self,
        model: &mut Model,
        gold: u32,
        vector: &SparseFeatureVector,
        candidates: &[u32],
    ) {
        let scores = model.weights.scores(vector);
        let labels: Vec<u32> = if candidates.is_empty() {
            (0..scores.len() as u32).collect()
        } else {
            candidates.to_vec()
        };
        if !labels.contains(&gold) {
            return;
        }
        // softmax over the candidate set, stabilized by the max score
        let max = labels
            .iter()
            .map(|&l| scores[l as usize])
            .fold(f32::NEG_INFINITY, f32::max);
        let mut probs: Vec<f32> = labels
            .iter()
            .map(|&l| (scores[l as usize] - max).exp())
            .collect();
        let z: f32 = probs.iter().sum();
        for p in probs.iter_mut() {
            *p /= z;
        }
        let gradients = model.gradients.as_mut().unwrap();
        for (&label, &p) in labels.iter().zip(&probs) {
            let residual = if label == gold { p - 1.0 } else { p };
            for &(fid, w) in vector.iter() {
                if fid >= model.weights.num_features() {
                    continue;
                }
                let g = residual * w;
                let i = model.weights.idx(label, fid);
                gradients[i] += g * g;
                let delta = self.step(gradients[i]) * g;
                model.weights.add(i, -delta);
            }
        }
    }

    fn update_binary_hinge(
        &self,
        model: &mut Model,
        gold: u32,
        vector: &SparseFeatureVector,
        margin: f32,
    ) {
        let y = if gold == 1 { 1.0 } else { -1.0 };
        let dot = model.weights.scores(vector)[1];
        if y * dot >= margin {
            return;
        }
        let gradients = model.gradients.as_mut().unwrap();
        for &(fid, w) in vector.iter() {
            if fid >= model.weights.num_features() {
                continue;
            }
            let i = fid as usize;
            gradients[i] += w * w;
            let delta = self.step(gradients[i]) * y * w;
            model.weights.add(i, delta);
        }
    }

    fn update_binary_logistic(&self, model: &mut Model, gold: u32, vector: &SparseFeatureVector) {
        let dot = model.weights.scores(vector)[1];
        let p = 1.0 / (1.0 + (-dot).exp());
        let residual = p - if gold == 1 { 1.0 } else { 0.0 };
        let gradients = model.gradients.as_mut().unwrap();
        for &(fid, w) in vector.iter() {
            if fid >= model.weights.num_features() {
                continue;
            }
            let g = residual * w;
            let i = fid as usize;
            gradients[i] += g * g;
            let delta = self.step(gradients[i]) * g;
            model.weights.add(i, -delta);
        }
    }
}

/// Best-scoring label other than `gold`, restricted to `candidates` when
/// non-empty. Ties break toward the lower label id.
fn best_wrong(scores: &[f32], gold: u32, candidates: &[u32]) -> Option<u32> {
    let mut best: Option<(u32, f32)> = None;
    let iter: Box<dyn Iterator<Item = u32>> = if candidates.is_empty() {
        Box::new(0..scores.len() as u32)
    } else {
        Box::new(candidates.iter().copied())
    };
    for label in iter {
        if label == gold || label as usize >= scores.len() {
            continue;
        }
        let score = scores[label as usize];
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((label, score));
        }
    }
    best.map(|(l, _)| l)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FeatureMap, LabelMap, Lexica};
    use crate::template::TemplateSet;
    use crate::vector::StringFeatureVector;

    fn toy_model(labels: &[&str], features: &[(&str, &str)]) -> Model {
        let labels = LabelMap::from_labels(labels.iter().map(|s| s.to_string()).collect());
        let keys = features
            .iter()
            .map(|(k, v)| crate::model::feature_key(k, v))
            .collect();
        Model::new(
            TemplateSet::compile("w0 = i[0].form\n").unwrap(),
            labels,
            FeatureMap::from_keys(keys),
            Lexica::default(),
        )
    }

    fn sparse(model: &Model, pairs: &[(&str, &str)]) -> SparseFeatureVector {
        let mut v = StringFeatureVector::new();
        for (k, val) in pairs {
            v.push(k, val);
        }
        model.to_sparse(&v)
    }

    #[test]
    fn test_hinge_update_moves_gold_up() {
        let mut model = toy_model(&["A", "B", "C"], &[("w", "x"), ("w", "y")]);
        let trainer = OnlineTrainer::new(UpdateRule::Hinge { margin: 1.0 }, 0.1);
        let v = sparse(&model, &[("w", "x")]);
        trainer.update(&mut model, 0, &v, &[]).unwrap();
        let ranked = model.predict_all(&v);
        assert_eq!(0, ranked[0].0);
        assert!(ranked[0].1 > 0.0);
    }

    #[test]
    fn test_hinge_no_update_when_margin_satisfied() {
        let mut model = toy_model(&["A", "B", "C"], &[("w", "x")]);
        let trainer = OnlineTrainer::new(UpdateRule::Hinge { margin: 0.5 }, 0.1);
        let v = sparse(&model, &[("w", "x")]);
        // push A far above the margin first
        for _ in 0..30 {
            trainer.update(&mut model, 0, &v, &[]).unwrap();
        }
        let before = model.predict_all(&v);
        assert!(before[0].1 - before[1].1 >= 0.5);
        trainer.update(&mut model, 0, &v, &[]).unwrap();
        let after = model.predict_all(&v);
        assert_eq!(before, after);
    }

    #[test]
    fn test_adaptive_rate_shrinks_steps() {
        let mut model = toy_model(&["A", "B", "C"], &[("w", "x")]);
        let trainer = OnlineTrainer::new(UpdateRule::Hinge { margin: 100.0 }, 0.1);
        let v = sparse(&model, &[("w", "x")]);
        trainer.update(&mut model, 0, &v, &[]).unwrap();
        let s1 = model.predict_all(&v)[0].1;
        trainer.update(&mut model, 0, &v, &[]).unwrap();
        let s2 = model.predict_all(&v)[0].1;
        // the second step is smaller than the first
        assert!(s2 - s1 < s1);
        assert!(s2 > s1);
    }

    #[test]
    fn test_logistic_update_improves_gold() {
        let mut model = toy_model(&["A", "B", "C"], &[("w", "x")]);
        let trainer = OnlineTrainer::new(UpdateRule::Logistic, 0.5);
        let v = sparse(&model, &[("w", "x")]);
        for _ in 0..20 {
            trainer.update(&mut model, 2, &v, &[]).unwrap();
        }
        assert_eq!(2, model.predict_all(&v)[0].0);
    }

    #[test]
    fn test_binary_symmetric_updates() {
        let mut model = toy_model(&["neg", "pos"], &[("w", "x")]);
        let trainer = OnlineTrainer::new(UpdateRule::Hinge { margin: 1.0 }, 0.5);
        let v = sparse(&model, &[("w", "x")]);
        trainer.update(&mut model, 1, &v, &[]).unwrap();
        let up = model.predict_all(&v);
        assert_eq!(1, up[0].0);
        assert!((up[0].1 + up[1].1).abs() < 1e-6);
        trainer.update(&mut model, 0, &v, &[]).unwrap();
        trainer.update(&mut model, 0, &v, &[]).unwrap();
        assert_eq!(0, model.predict_all(&v)[0].0);
    }

    #[test]
    fn test_binary_logistic_symmetric_updates() {
        let mut model = toy_model(&["neg", "pos"], &[("w", "x")]);
        let trainer = OnlineTrainer::new(UpdateRule::Logistic, 0.5);
        let v = sparse(&model, &[("w", "x")]);
        trainer.update(&mut model, 1, &v, &[]).unwrap();
        let up = model.predict_all(&v);
        assert_eq!(1, up[0].0);
        assert!(up[0].1 > 0.0);
        assert!((up[0].1 + up[1].1).abs() < 1e-6);
        // enough negative evidence flips the single weight vector
        for _ in 0..10 {
            trainer.update(&mut model, 0, &v, &[]).unwrap();
        }
        assert_eq!(0, model.predict_all(&v)[0].0);
    }

    #[test]
    fn test_update_rejects_stripped_model() {
        let mut model = toy_model(&["A", "B", "C"], &[("w", "x")]);
        model.strip_training_state();
        let trainer = OnlineTrainer::new(UpdateRule::default(), 0.1);
        let v = sparse(&model, &[("w", "x")]);
        assert!(trainer.update(&mut model, 0, &v, &[]).is_err());
    }

    #[test]
    fn test_candidate_restriction() {
        let mut model = toy_model(&["A", "B", "C"], &[("w", "x")]);
        let trainer = OnlineTrainer::new(UpdateRule::Hinge { margin: 1.0 }, 0.1);
        let v = sparse(&model, &[("w", "x")]);
        // only A and C compete; B's row must stay zero
        trainer.update(&mut model, 0, &v, &[0, 2]).unwrap();
        let scores: Vec<f32> = model.predict_all(&v).into_iter().map(|(_, s)| s).collect();
        assert!(scores.contains(&0.0));
    }
}

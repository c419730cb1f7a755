//! Model data: label/feature maps, the weight matrix, auxiliary lexica and
//! the versioned persistence schema.

use std::io::{Read, Write};

use bincode::{
    de::Decoder,
    enc::Encoder,
    error::{DecodeError, EncodeError},
    Decode, Encode,
};
use hashbrown::HashMap;

use crate::errors::{GondolaError, Result};
use crate::state::TransitionState;
use crate::template::TemplateSet;
use crate::utils::SerializableHashMap;
use crate::vector::{SparseFeatureVector, StringFeatureVector};

const MODEL_MAGIC: u64 = 0x676f_6e64_6f6c_6131; // "gondola1"
const SCHEMA_VERSION: u32 = 1;

// Separator between feature type and value inside map keys. The unit
// separator cannot appear in template names.
const KEY_SEP: char = '\u{1}';

pub(crate) fn feature_key(kind: &str, value: &str) -> String {
    let mut key = String::with_capacity(kind.len() + value.len() + 1);
    key.push_str(kind);
    key.push(KEY_SEP);
    key.push_str(value);
    key
}

/// Label string -> contiguous id, assigned in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct LabelMap {
    labels: Vec<String>,
    ids: HashMap<String, u32>,
}

impl LabelMap {
    pub fn from_labels(labels: Vec<String>) -> Self {
        let ids = labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.clone(), i as u32))
            .collect();
        Self { labels, ids }
    }

    pub fn get(&self, label: &str) -> Option<u32> {
        self.ids.get(label).copied()
    }

    pub fn label(&self, id: u32) -> Option<&str> {
        self.labels.get(id as usize).map(String::as_str)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl Encode for LabelMap {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        Encode::encode(&self.labels, encoder)
    }
}

impl Decode for LabelMap {
    fn decode<D: Decoder>(decoder: &mut D) -> Result<Self, DecodeError> {
        let labels: Vec<String> = Decode::decode(decoder)?;
        Ok(Self::from_labels(labels))
    }
}

/// (feature type, value) -> contiguous id, assigned in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct FeatureMap {
    keys: Vec<String>,
    ids: HashMap<String, u32>,
}

impl FeatureMap {
    pub fn from_keys(keys: Vec<String>) -> Self {
        let ids = keys
            .iter()
            .enumerate()
            .map(|(i, k)| (k.clone(), i as u32))
            .collect();
        Self { keys, ids }
    }

    pub fn get(&self, kind: &str, value: &str) -> Option<u32> {
        self.ids.get(&feature_key(kind, value)).copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Encode for FeatureMap {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        Encode::encode(&self.keys, encoder)
    }
}

impl Decode for FeatureMap {
    fn decode<D: Decoder>(decoder: &mut D) -> Result<Self, DecodeError> {
        let keys: Vec<String> = Decode::decode(decoder)?;
        Ok(Self::from_keys(keys))
    }
}

/// Dense weight matrix of shape `[num_labels x num_features]`.
///
/// Two-class models store a single row; the scores of the two labels are the
/// dot product and its negation.
#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct WeightMatrix {
    num_labels: u32,
    num_features: u32,
    data: Vec<f32>,
}

impl WeightMatrix {
    pub fn zeros(num_labels: u32, num_features: u32) -> Self {
        let rows = if num_labels == 2 { 1 } else { num_labels };
        Self {
            num_labels,
            num_features,
            data: vec![0.0; rows as usize * num_features as usize],
        }
    }

    pub fn num_labels(&self) -> u32 {
        self.num_labels
    }

    pub fn num_features(&self) -> u32 {
        self.num_features
    }

    pub fn is_binary(&self) -> bool {
        self.num_labels == 2
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    /// Flat index of a weight cell. For binary matrices the single row is
    /// addressed with `label` 0.
    #[inline]
    pub(crate) fn idx(&self, label: u32, feature: u32) -> usize {
        label as usize * self.num_features as usize + feature as usize
    }

    #[inline]
    pub(crate) fn get(&self, idx: usize) -> f32 {
        self.data[idx]
    }

    #[inline]
    pub(crate) fn add(&mut self, idx: usize, delta: f32) {
        self.data[idx] += delta;
    }

    /// Per-label dot products with the sparse vector.
    pub fn scores(&self, vector: &SparseFeatureVector) -> Vec<f32> {
        if self.is_binary() {
            let mut y = 0.0;
            for &(fid, w) in vector.iter() {
                if fid < self.num_features {
                    y += self.data[fid as usize] * w;
                }
            }
            vec![-y, y]
        } else {
            let mut ys = vec![0.0; self.num_labels as usize];
            for &(fid, w) in vector.iter() {
                if fid >= self.num_features {
                    continue;
                }
                for (label, y) in ys.iter_mut().enumerate() {
                    *y += self.data[self.idx(label as u32, fid)] * w;
                }
            }
            ys
        }
    }

    fn validate(&self, num_labels: usize, num_features: usize) -> Result<()> {
        if self.num_labels as usize != num_labels || self.num_features as usize != num_features {
            return Err(GondolaError::invalid_model(format!(
                "weight matrix is {}x{} but the maps define {}x{}",
                self.num_labels, self.num_features, num_labels, num_features,
            )));
        }
        let rows = if self.num_labels == 2 {
            1
        } else {
            self.num_labels as usize
        };
        if self.data.len() != rows * num_features {
            return Err(GondolaError::invalid_model(format!(
                "weight matrix holds {} cells, expected {}",
                self.data.len(),
                rows * num_features,
            )));
        }
        Ok(())
    }
}

/// Auxiliary lexica derived from training data and bundled with the model.
#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct Lexica {
    /// Lowercase form -> occurrence count over the training data.
    pub(crate) form_counts: SerializableHashMap<String, u32>,

    /// Lowercase form -> ambiguity class (sorted tag alternatives joined
    /// with '_'), kept for frequent forms only.
    pub(crate) classes: SerializableHashMap<String, String>,
}

impl Lexica {
    pub fn form_count(&self, form: &str) -> u32 {
        self.form_counts.get(form).copied().unwrap_or(0)
    }

    pub fn ambiguity_class(&self, form: &str) -> Option<&str> {
        self.classes.get(form).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// A trained (or in-training) model.
#[derive(Debug)]
pub struct Model {
    pub(crate) templates: TemplateSet,
    pub(crate) labels: LabelMap,
    pub(crate) features: FeatureMap,
    pub(crate) weights: WeightMatrix,

    /// AdaGrad squared-gradient accumulators, same shape as the weights.
    /// `None` for production decode models.
    pub(crate) gradients: Option<Vec<f32>>,

    pub(crate) lexica: Lexica,
}

impl Model {
    /// Creates a zero-weight model over compacted maps, ready for online
    /// training.
    pub fn new(templates: TemplateSet, labels: LabelMap, features: FeatureMap, lexica: Lexica) -> Self {
        let weights = WeightMatrix::zeros(labels.len() as u32, features.len() as u32);
        let gradients = Some(vec![0.0; weights.len()]);
        Self {
            templates,
            labels,
            features,
            weights,
            gradients,
            lexica,
        }
    }

    pub fn templates(&self) -> &TemplateSet {
        &self.templates
    }

    pub fn lexica(&self) -> &Lexica {
        &self.lexica
    }

    pub fn num_labels(&self) -> usize {
        self.labels.len()
    }

    pub fn num_features(&self) -> usize {
        self.features.len()
    }

    pub fn label(&self, id: u32) -> Option<&str> {
        self.labels.label(id)
    }

    pub fn label_id(&self, label: &str) -> Option<u32> {
        self.labels.get(label)
    }

    /// Extracts the feature vector for a state configuration using the
    /// model's templates and lexica.
    pub fn extract<S>(&self, state: &S) -> StringFeatureVector
    where
        S: TransitionState,
    {
        self.templates.extract(state, &self.lexica)
    }

    /// Maps a string vector into this model's feature space.
    ///
    /// Unknown (type, value) pairs are dropped silently; the feature map is
    /// never mutated here. Weights are carried through unchanged.
    pub fn to_sparse(&self, vector: &StringFeatureVector) -> SparseFeatureVector {
        let mut sparse = SparseFeatureVector::new();
        for f in vector.iter() {
            if let Some(id) = self.features.get(&f.kind, &f.value) {
                sparse.push(id, f.weight);
            }
        }
        sparse
    }

    /// Every label's score, sorted descending; ties broken by label id
    /// ascending.
    pub fn predict_all(&self, vector: &SparseFeatureVector) -> Vec<(u32, f32)> {
        let mut ranked: Vec<(u32, f32)> = self
            .weights
            .scores(vector)
            .into_iter()
            .enumerate()
            .map(|(id, score)| (id as u32, score))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(core::cmp::Ordering::Equal));
        ranked
    }

    /// The single best label and its score.
    pub fn predict_best(&self, vector: &SparseFeatureVector) -> Option<(u32, f32)> {
        self.predict_all(vector).into_iter().next()
    }

    /// Drops the training-only gradient state, leaving a decode-only model.
    pub fn strip_training_state(&mut self) {
        self.gradients = None;
    }

    /// Writes the model as a fixed, versioned sequence of records.
    ///
    /// # Errors
    ///
    /// When `wtr` generates an error, it will be returned as is.
    pub fn write<W>(&self, wtr: &mut W) -> Result<()>
    where
        W: Write,
    {
        let config = bincode::config::standard();
        bincode::encode_into_std_write(MODEL_MAGIC, wtr, config)?;
        bincode::encode_into_std_write(SCHEMA_VERSION, wtr, config)?;
        bincode::encode_into_std_write(&self.templates, wtr, config)?;
        bincode::encode_into_std_write(&self.labels, wtr, config)?;
        bincode::encode_into_std_write(&self.features, wtr, config)?;
        bincode::encode_into_std_write(&self.weights, wtr, config)?;
        bincode::encode_into_std_write(&self.gradients, wtr, config)?;
        bincode::encode_into_std_write(&self.lexica, wtr, config)?;
        Ok(())
    }

    /// Reads a model back, in exactly the order written.
    ///
    /// # Errors
    ///
    /// [`GondolaError::InvalidModel`] on a magic/version mismatch or when
    /// the weight matrix disagrees with the map sizes; decoding errors are
    /// returned as is.
    pub fn read<R>(rdr: &mut R) -> Result<Self>
    where
        R: Read,
    {
        let config = bincode::config::standard();
        let magic: u64 = bincode::decode_from_std_read(rdr, config)?;
        if magic != MODEL_MAGIC {
            return Err(GondolaError::invalid_model("unrecognized model header"));
        }
        let version: u32 = bincode::decode_from_std_read(rdr, config)?;
        if version != SCHEMA_VERSION {
            return Err(GondolaError::invalid_model(format!(
                "unsupported schema version {version}, expected {SCHEMA_VERSION}"
            )));
        }
        let templates: TemplateSet = bincode::decode_from_std_read(rdr, config)?;
        let labels: LabelMap = bincode::decode_from_std_read(rdr, config)?;
        let features: FeatureMap = bincode::decode_from_std_read(rdr, config)?;
        let weights: WeightMatrix = bincode::decode_from_std_read(rdr, config)?;
        let gradients: Option<Vec<f32>> = bincode::decode_from_std_read(rdr, config)?;
        let lexica: Lexica = bincode::decode_from_std_read(rdr, config)?;

        weights.validate(labels.len(), features.len())?;
        if let Some(g) = &gradients {
            if g.len() != weights.len() {
                return Err(GondolaError::invalid_model(format!(
                    "gradient state holds {} cells, expected {}",
                    g.len(),
                    weights.len(),
                )));
            }
        }
        Ok(Self {
            templates,
            labels,
            features,
            weights,
            gradients,
            lexica,
        })
    }
}

//! Phase orchestration: collect, train, bootstrap, develop and decode for
//! the three statistical components.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use bincode::{Decode, Encode};
use tracing::{info, warn};

use crate::beam::BeamDecoder;
use crate::errors::{GondolaError, Result};
use crate::model::Model;
use crate::parser::ParseState;
use crate::srl::RoleState;
use crate::state::TransitionState;
use crate::tagger::TagState;
use crate::template::Source;
use crate::tree::DependencyTree;

#[cfg(feature = "train")]
use crate::beam::oracle_instances;
#[cfg(feature = "train")]
use crate::learner::{OnlineTrainer, UpdateRule};
#[cfg(feature = "train")]
use crate::model::Lexica;
#[cfg(feature = "train")]
use crate::space::TrainingSpace;
#[cfg(feature = "train")]
use crate::template::TemplateSet;
#[cfg(feature = "train")]
use hashbrown::HashMap;

/// The statistical component a pipeline stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum Task {
    Tagger,
    Parser,
    RoleLabeler,
}

impl Task {
    fn decode_state(self, tree: DependencyTree) -> AnyState {
        match self {
            Self::Tagger => AnyState::Tag(TagState::new(tree)),
            Self::Parser => AnyState::Parse(ParseState::new(tree)),
            Self::RoleLabeler => AnyState::Role(RoleState::new(tree)),
        }
    }

    #[cfg(feature = "train")]
    fn gold_state(self, gold: DependencyTree) -> AnyState {
        match self {
            Self::Tagger => AnyState::Tag(TagState::with_gold(gold)),
            Self::Parser => AnyState::Parse(ParseState::with_gold(gold)),
            Self::RoleLabeler => AnyState::Role(RoleState::with_gold(gold)),
        }
    }

    /// Whether a gold tree carries the annotation this task learns from.
    /// The arc-eager oracle additionally requires a projective tree.
    #[cfg(feature = "train")]
    fn gold_is_usable(self, tree: &DependencyTree) -> bool {
        match self {
            Self::Tagger => tree.nodes().iter().skip(1).all(|n| n.pos.is_some()),
            Self::Parser => tree.is_fully_attached() && tree.is_projective(),
            Self::RoleLabeler => !tree.predicates().is_empty(),
        }
    }
}

/// One annotation state of any task, so the pipeline can drive the decoder
/// without being generic itself.
#[derive(Debug, Clone)]
enum AnyState {
    Tag(TagState),
    Parse(ParseState),
    Role(RoleState),
}

impl TransitionState for AnyState {
    fn tree(&self) -> &DependencyTree {
        match self {
            Self::Tag(s) => s.tree(),
            Self::Parse(s) => s.tree(),
            Self::Role(s) => s.tree(),
        }
    }

    fn focus(&self) -> Option<usize> {
        match self {
            Self::Tag(s) => s.focus(),
            Self::Parse(s) => s.focus(),
            Self::Role(s) => s.focus(),
        }
    }

    fn resolve(&self, source: Source, offset: i32) -> Option<usize> {
        match self {
            Self::Tag(s) => s.resolve(source, offset),
            Self::Parse(s) => s.resolve(source, offset),
            Self::Role(s) => s.resolve(source, offset),
        }
    }

    fn is_terminal(&self) -> bool {
        match self {
            Self::Tag(s) => s.is_terminal(),
            Self::Parse(s) => s.is_terminal(),
            Self::Role(s) => s.is_terminal(),
        }
    }

    fn is_legal(&self, label: &str) -> bool {
        match self {
            Self::Tag(s) => s.is_legal(label),
            Self::Parse(s) => s.is_legal(label),
            Self::Role(s) => s.is_legal(label),
        }
    }

    fn apply(&mut self, label: &str) -> Result<()> {
        match self {
            Self::Tag(s) => s.apply(label),
            Self::Parse(s) => s.apply(label),
            Self::Role(s) => s.apply(label),
        }
    }

    fn oracle(&self) -> Option<String> {
        match self {
            Self::Tag(s) => s.oracle(),
            Self::Parse(s) => s.oracle(),
            Self::Role(s) => s.oracle(),
        }
    }

    fn finalize(self) -> DependencyTree {
        match self {
            Self::Tag(s) => s.finalize(),
            Self::Parse(s) => s.finalize(),
            Self::Role(s) => s.finalize(),
        }
    }

    fn signature(&self) -> String {
        match self {
            Self::Tag(s) => s.signature(),
            Self::Parse(s) => s.signature(),
            Self::Role(s) => s.signature(),
        }
    }
}

/// Decode-time settings, persisted alongside the model.
#[derive(Debug, Clone, Encode, Decode)]
pub struct PipelineConfig {
    pub beam_width: usize,
    pub beam_margin: f32,
    pub unique_only: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            beam_width: 8,
            beam_margin: 1.0,
            unique_only: true,
        }
    }
}

/// Training-time settings.
#[cfg(feature = "train")]
#[cfg_attr(docsrs, doc(cfg(feature = "train")))]
#[derive(Debug, Clone)]
pub struct TrainConfig {
    /// Labels with a training count at most this value are dropped.
    pub label_cutoff: u32,

    /// Features with a training count at most this value are dropped.
    pub feature_cutoff: u32,

    /// Number of sequential passes over the oracle instances.
    pub passes: usize,

    /// Number of corrective re-decoding rounds after the oracle passes.
    pub bootstrap_rounds: usize,

    pub rule: UpdateRule,
    pub base_rate: f32,

    /// Forms with a training count at most this value get no ambiguity
    /// class.
    pub lexicon_cutoff: u32,
}

#[cfg(feature = "train")]
impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            label_cutoff: 0,
            feature_cutoff: 0,
            passes: 10,
            bootstrap_rounds: 2,
            rule: UpdateRule::default(),
            base_rate: 0.1,
            lexicon_cutoff: 1,
        }
    }
}

/// A component that annotates trees in place, so that components chain.
pub trait Processor {
    /// Annotates `tree` in place.
    ///
    /// # Errors
    ///
    /// Propagates decoding errors; on error the tree contents are
    /// unspecified.
    fn process(&self, tree: &mut DependencyTree) -> Result<()>;
}

/// A named provider of dependency trees for batch processing.
pub trait TreeSource {
    fn name(&self) -> &str;

    /// # Errors
    ///
    /// Any error is reported per source by [`process_batch`]; it never
    /// aborts the whole batch.
    fn trees(&mut self) -> Result<Vec<DependencyTree>>;
}

/// Outcome of a batch run: the processed trees plus which sources failed.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub trees: Vec<DependencyTree>,
    pub failures: Vec<(String, GondolaError)>,
    pub cancelled: bool,
}

/// Runs `processor` over every tree of every source.
///
/// A failing source is skipped and recorded; the batch continues with the
/// next source. The cancellation flag is checked between sentences, never
/// inside a sentence.
pub fn process_batch<P>(
    processor: &P,
    sources: &mut [Box<dyn TreeSource>],
    cancel: &AtomicBool,
) -> BatchReport
where
    P: Processor,
{
    let mut report = BatchReport::default();
    'sources: for source in sources.iter_mut() {
        let trees = match source.trees() {
            Ok(trees) => trees,
            Err(e) => {
                warn!(source = source.name(), error = %e, "source failed to load");
                report.failures.push((source.name().to_string(), e));
                continue;
            }
        };
        for mut tree in trees {
            if cancel.load(Ordering::Relaxed) {
                report.cancelled = true;
                break 'sources;
            }
            if let Err(e) = processor.process(&mut tree) {
                warn!(source = source.name(), error = %e, "source failed to decode");
                report.failures.push((source.name().to_string(), e));
                continue 'sources;
            }
            report.trees.push(tree);
        }
    }
    report
}

/// Development-set scores. Attachment counts are filled by the parser,
/// role counts by the role labeler, token counts by both it and the tagger.
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluation {
    pub tokens: usize,
    pub labeled_correct: usize,
    pub unlabeled_correct: usize,
    pub predicted_roles: usize,
    pub gold_roles: usize,
    pub correct_roles: usize,
}

impl Evaluation {
    pub fn accuracy(&self) -> f64 {
        ratio(self.labeled_correct, self.tokens)
    }

    pub fn unlabeled_accuracy(&self) -> f64 {
        ratio(self.unlabeled_correct, self.tokens)
    }

    pub fn precision(&self) -> f64 {
        ratio(self.correct_roles, self.predicted_roles)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.correct_roles, self.gold_roles)
    }

    pub fn f1(&self) -> f64 {
        let p = self.precision();
        let r = self.recall();
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    fn record(&mut self, task: Task, gold: &DependencyTree, system: &DependencyTree) {
        match task {
            Task::Tagger => {
                for (g, s) in gold.nodes().iter().zip(system.nodes()).skip(1) {
                    self.tokens += 1;
                    if g.pos == s.pos {
                        self.labeled_correct += 1;
                        self.unlabeled_correct += 1;
                    }
                }
            }
            Task::Parser => {
                for (g, s) in gold.nodes().iter().zip(system.nodes()).skip(1) {
                    self.tokens += 1;
                    if g.head == s.head {
                        self.unlabeled_correct += 1;
                        if g.deprel == s.deprel {
                            self.labeled_correct += 1;
                        }
                    }
                }
            }
            Task::RoleLabeler => {
                self.gold_roles += gold.roles().len();
                self.predicted_roles += system.roles().len();
                self.correct_roles += system
                    .roles()
                    .iter()
                    .filter(|&r| gold.roles().contains(r))
                    .count();
            }
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// A trained statistical component: a model, a task and decode settings.
pub struct Pipeline {
    task: Task,
    config: PipelineConfig,
    decoder: BeamDecoder,
    model: Model,
}

impl Pipeline {
    /// Wraps a trained model.
    ///
    /// # Errors
    ///
    /// [`GondolaError::InvalidArgument`] when the beam settings are
    /// rejected by [`BeamDecoder::new`].
    pub fn new(task: Task, config: PipelineConfig, model: Model) -> Result<Self> {
        let decoder = BeamDecoder::new(config.beam_width, config.beam_margin, config.unique_only)?;
        Ok(Self {
            task,
            config,
            decoder,
            model,
        })
    }

    pub fn task(&self) -> Task {
        self.task
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Collects the frequency lexica from gold data: lowercase form counts
    /// and, for forms with a count above `cutoff`, the ambiguity class
    /// (sorted distinct tags joined with `_`).
    #[cfg(feature = "train")]
    #[cfg_attr(docsrs, doc(cfg(feature = "train")))]
    pub fn collect(trees: &[DependencyTree], cutoff: u32) -> Lexica {
        let mut counts: HashMap<String, u32> = HashMap::new();
        let mut tags: HashMap<String, Vec<String>> = HashMap::new();
        for tree in trees {
            for node in tree.nodes().iter().skip(1) {
                let form = node.form.to_lowercase();
                *counts.entry(form.clone()).or_insert(0) += 1;
                if let Some(pos) = &node.pos {
                    tags.entry(form).or_default().push(pos.clone());
                }
            }
        }
        let mut lexica = Lexica::default();
        for (form, alternatives) in tags {
            if counts[&form] <= cutoff {
                continue;
            }
            let mut alternatives = alternatives;
            alternatives.sort();
            alternatives.dedup();
            lexica.classes.insert(form, alternatives.join("_"));
        }
        lexica.form_counts.extend(counts);
        info!(
            forms = lexica.form_counts.len(),
            classes = lexica.classes.len(),
            "lexica collected"
        );
        lexica
    }

    /// Trains a component from scratch: collect, oracle-path instance
    /// extraction, compaction, online passes and bootstrap rounds.
    ///
    /// Gold trees missing the required annotation (or non-projective trees
    /// for the parser) are skipped with a warning.
    ///
    /// # Errors
    ///
    /// [`GondolaError::InvalidArgument`] when no label survives the
    /// cutoffs; update errors are propagated as is.
    #[cfg(feature = "train")]
    #[cfg_attr(docsrs, doc(cfg(feature = "train")))]
    pub fn train(
        task: Task,
        templates: TemplateSet,
        config: PipelineConfig,
        train: &TrainConfig,
        trees: &[DependencyTree],
    ) -> Result<Self> {
        let lexica = Self::collect(trees, train.lexicon_cutoff);
        let mut space = TrainingSpace::new();
        let mut skipped = 0usize;
        for tree in trees {
            if !task.gold_is_usable(tree) {
                skipped += 1;
                continue;
            }
            let state = task.gold_state(tree.clone());
            for (label, vector) in oracle_instances(&templates, &lexica, state)? {
                space.add_instance(&label, vector);
            }
        }
        if skipped > 0 {
            warn!(skipped, task = ?task, "gold trees skipped");
        }
        let (labels, features) = space.compact(train.label_cutoff, train.feature_cutoff);
        if labels.is_empty() {
            return Err(GondolaError::invalid_argument(
                "trees",
                "no label survived the cutoffs; nothing to train",
            ));
        }
        let mut model = Model::new(templates, labels, features, lexica);
        let trainer = OnlineTrainer::new(train.rule, train.base_rate);
        let accuracy = trainer.run_passes(&mut model, &space, train.passes)?;
        info!(
            task = ?task,
            instances = space.num_instances(),
            labels = model.num_labels(),
            features = model.num_features(),
            accuracy,
            "training finished"
        );
        let mut pipeline = Self::new(task, config, model)?;
        for round in 1..=train.bootstrap_rounds {
            let mined = pipeline.bootstrap(train, trees)?;
            info!(round, mined, "bootstrap round finished");
        }
        Ok(pipeline)
    }

    /// Re-decodes the gold data with the current model and applies one
    /// update per step where the decoder disagrees with the oracle.
    /// Returns the number of corrective updates.
    #[cfg(feature = "train")]
    #[cfg_attr(docsrs, doc(cfg(feature = "train")))]
    pub fn bootstrap(&mut self, train: &TrainConfig, trees: &[DependencyTree]) -> Result<usize> {
        let trainer = OnlineTrainer::new(train.rule, train.base_rate);
        let mut mined_total = 0usize;
        for tree in trees {
            if !self.task.gold_is_usable(tree) {
                continue;
            }
            let state = self.task.gold_state(tree.clone());
            for (label, vector) in self.decoder.mine_corrective(&self.model, state)? {
                // labels dropped by the cutoff cannot be learned
                let Some(gold) = self.model.label_id(&label) else {
                    continue;
                };
                let sparse = self.model.to_sparse(&vector);
                trainer.update(&mut self.model, gold, &sparse, &[])?;
                mined_total += 1;
            }
        }
        Ok(mined_total)
    }

    /// Decodes held-out gold data and scores the output. No updates.
    pub fn develop(&self, trees: &[DependencyTree]) -> Result<Evaluation> {
        let mut evaluation = Evaluation::default();
        for gold in trees {
            let mut system = self.input_view(gold);
            self.process(&mut system)?;
            evaluation.record(self.task, gold, &system);
        }
        info!(
            task = ?self.task,
            accuracy = evaluation.accuracy(),
            f1 = evaluation.f1(),
            "development evaluation finished"
        );
        Ok(evaluation)
    }

    /// The decode-time view of a gold tree: the annotation this task
    /// produces is removed, everything upstream of it is kept.
    fn input_view(&self, gold: &DependencyTree) -> DependencyTree {
        match self.task {
            Task::Tagger => gold.stripped(),
            Task::Parser => {
                let mut tree = gold.stripped();
                for (node, gold_node) in tree.nodes.iter_mut().zip(gold.nodes()) {
                    node.pos = gold_node.pos.clone();
                    node.cpos = gold_node.cpos.clone();
                }
                tree
            }
            Task::RoleLabeler => gold.clone(),
        }
    }

    /// Writes the task, the decode settings and the full model (gradient
    /// state included when still active), reloadable with [`Self::load`].
    ///
    /// # Errors
    ///
    /// When `wtr` generates an error, it will be returned as is.
    pub fn save<W>(&self, wtr: &mut W) -> Result<()>
    where
        W: Write,
    {
        let config = bincode::config::standard();
        bincode::encode_into_std_write(self.task, wtr, config)?;
        bincode::encode_into_std_write(&self.config, wtr, config)?;
        self.model.write(wtr)
    }

    /// # Errors
    ///
    /// Model validation and decoding errors are returned as is.
    pub fn load<R>(rdr: &mut R) -> Result<Self>
    where
        R: Read,
    {
        let config = bincode::config::standard();
        let task: Task = bincode::decode_from_std_read(rdr, config)?;
        let pipeline_config: PipelineConfig = bincode::decode_from_std_read(rdr, config)?;
        let model = Model::read(rdr)?;
        Self::new(task, pipeline_config, model)
    }
}

impl Processor for Pipeline {
    fn process(&self, tree: &mut DependencyTree) -> Result<()> {
        let state = self.task.decode_state(tree.clone());
        let best = self
            .decoder
            .decode(&self.model, state)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                GondolaError::invalid_argument("tree", "decoding produced no result")
            })?;
        *tree = best.state.finalize();
        Ok(())
    }
}

/// Decodes independent sentences on a fixed set of worker threads sharing
/// one read-only pipeline.
#[cfg(feature = "multithreading")]
#[cfg_attr(docsrs, doc(cfg(feature = "multithreading")))]
pub struct DecodePool {
    task_tx: crossbeam_channel::Sender<(usize, DependencyTree)>,
    result_rx: crossbeam_channel::Receiver<(usize, Result<DependencyTree>)>,
}

#[cfg(feature = "multithreading")]
impl DecodePool {
    /// Spawns `n_threads` workers over a shared pipeline. The workers exit
    /// when the pool is dropped.
    pub fn new(pipeline: std::sync::Arc<Pipeline>, n_threads: usize) -> Self {
        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        let (task_tx, task_rx) = crossbeam_channel::unbounded::<(usize, DependencyTree)>();
        for _ in 0..n_threads {
            let pipeline = std::sync::Arc::clone(&pipeline);
            let result_tx = result_tx.clone();
            let task_rx = task_rx.clone();
            std::thread::spawn(move || {
                for (i, mut tree) in task_rx {
                    let result = pipeline.process(&mut tree).map(|()| tree);
                    if result_tx.send((i, result)).is_err() {
                        break;
                    }
                }
            });
        }
        Self { task_tx, result_rx }
    }

    /// Decodes a batch, preserving input order.
    ///
    /// # Errors
    ///
    /// The first per-sentence error is returned after all workers finished
    /// the batch.
    pub fn process_all(&self, trees: Vec<DependencyTree>) -> Result<Vec<DependencyTree>> {
        let n = trees.len();
        for (i, tree) in trees.into_iter().enumerate() {
            self.task_tx.send((i, tree)).map_err(|_| {
                GondolaError::invalid_argument("trees", "the worker threads terminated")
            })?;
        }
        let mut slots: Vec<Option<DependencyTree>> = (0..n).map(|_| None).collect();
        let mut first_err = None;
        for _ in 0..n {
            match self.result_rx.recv() {
                Ok((i, Ok(tree))) => slots[i] = Some(tree),
                Ok((_, Err(e))) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
                Err(_) => {
                    return Err(GondolaError::invalid_argument(
                        "trees",
                        "the worker threads terminated",
                    ));
                }
            }
        }
        if let Some(e) = first_err {
            return Err(e);
        }
        slots
            .into_iter()
            .map(|slot| {
                slot.ok_or_else(|| {
                    GondolaError::invalid_argument("trees", "a decode result went missing")
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged(forms_tags: &[(&str, &str)]) -> DependencyTree {
        let mut tree = DependencyTree::from_forms(forms_tags.iter().map(|(f, _)| *f));
        for (id, (_, tag)) in forms_tags.iter().enumerate() {
            tree.node_mut(id + 1).unwrap().pos = Some((*tag).to_string());
        }
        tree
    }

    #[cfg(feature = "train")]
    fn tag_corpus() -> Vec<DependencyTree> {
        vec![
            tagged(&[("the", "DT"), ("cat", "NN"), ("sat", "VB")]),
            tagged(&[("a", "DT"), ("dog", "NN"), ("ran", "VB")]),
            tagged(&[("the", "DT"), ("dog", "NN"), ("sat", "VB")]),
        ]
    }

    #[cfg(feature = "train")]
    fn tag_pipeline() -> Pipeline {
        let templates = TemplateSet::compile("w0 = i[0].form\n").unwrap();
        Pipeline::train(
            Task::Tagger,
            templates,
            PipelineConfig::default(),
            &TrainConfig {
                passes: 10,
                bootstrap_rounds: 1,
                ..TrainConfig::default()
            },
            &tag_corpus(),
        )
        .unwrap()
    }

    #[cfg(feature = "train")]
    #[test]
    fn test_collect_counts_and_classes() {
        let mut trees = tag_corpus();
        // "sat" additionally seen as a noun, so its class is ambiguous
        trees.push(tagged(&[("sat", "NN")]));
        let lexica = Pipeline::collect(&trees, 0);
        assert_eq!(2, lexica.form_count("the"));
        assert_eq!(1, lexica.form_count("a"));
        assert_eq!(Some("DT"), lexica.ambiguity_class("the"));
        assert_eq!(Some("NN_VB"), lexica.ambiguity_class("sat"));
        assert_eq!(None, lexica.ambiguity_class("unseen"));
    }

    #[cfg(feature = "train")]
    #[test]
    fn test_collect_cutoff_limits_classes() {
        let lexica = Pipeline::collect(&tag_corpus(), 1);
        // "a" occurs once, below the cutoff
        assert_eq!(None, lexica.ambiguity_class("a"));
        assert_eq!(Some("DT"), lexica.ambiguity_class("the"));
        // counts are kept for every form
        assert_eq!(1, lexica.form_count("a"));
    }

    #[cfg(feature = "train")]
    #[test]
    fn test_tagger_fits_training_data() {
        let pipeline = tag_pipeline();
        let evaluation = pipeline.develop(&tag_corpus()).unwrap();
        assert_eq!(9, evaluation.tokens);
        assert!((evaluation.accuracy() - 1.0).abs() < f64::EPSILON);
    }

    #[cfg(feature = "train")]
    #[test]
    fn test_parser_fits_training_data() {
        let mut gold = tagged(&[("the", "DT"), ("cat", "NN"), ("sat", "VB")]);
        gold.attach(1, 2, "det").unwrap();
        gold.attach(2, 3, "nsubj").unwrap();
        gold.attach(3, 0, "root").unwrap();
        let templates =
            TemplateSet::compile("s0 = s[0].form\nb0 = b[0].form\nsb = s[0].form + b[0].form\n")
                .unwrap();
        let pipeline = Pipeline::train(
            Task::Parser,
            templates,
            PipelineConfig::default(),
            &TrainConfig {
                passes: 15,
                bootstrap_rounds: 0,
                ..TrainConfig::default()
            },
            std::slice::from_ref(&gold),
        )
        .unwrap();
        let evaluation = pipeline.develop(std::slice::from_ref(&gold)).unwrap();
        assert!((evaluation.accuracy() - 1.0).abs() < f64::EPSILON);
        assert!((evaluation.unlabeled_accuracy() - 1.0).abs() < f64::EPSILON);
    }

    #[cfg(feature = "train")]
    #[test]
    fn test_role_labeler_fits_training_data() {
        let mut gold = tagged(&[("cats", "NN"), ("chase", "VB"), ("mice", "NN")]);
        gold.attach(1, 2, "nsubj").unwrap();
        gold.attach(3, 2, "obj").unwrap();
        gold.attach(2, 0, "root").unwrap();
        gold.add_predicate(2).unwrap();
        gold.add_role(2, 1, "A0".into()).unwrap();
        gold.add_role(2, 3, "A1".into()).unwrap();
        let templates = TemplateSet::compile("pa = p[0].form + a[0].form\n").unwrap();
        let pipeline = Pipeline::train(
            Task::RoleLabeler,
            templates,
            PipelineConfig::default(),
            &TrainConfig {
                passes: 10,
                bootstrap_rounds: 0,
                ..TrainConfig::default()
            },
            std::slice::from_ref(&gold),
        )
        .unwrap();
        let evaluation = pipeline.develop(std::slice::from_ref(&gold)).unwrap();
        assert_eq!(2, evaluation.gold_roles);
        assert!((evaluation.f1() - 1.0).abs() < f64::EPSILON);
    }

    #[cfg(feature = "train")]
    #[test]
    fn test_train_skips_unusable_gold() {
        let mut trees = tag_corpus();
        // untagged tree: unusable for the tagger, silently skipped
        trees.push(DependencyTree::from_forms(["x", "y"]));
        let templates = TemplateSet::compile("w0 = i[0].form\n").unwrap();
        let pipeline = Pipeline::train(
            Task::Tagger,
            templates,
            PipelineConfig::default(),
            &TrainConfig::default(),
            &trees,
        )
        .unwrap();
        assert!(pipeline.model().num_labels() > 0);
    }

    #[cfg(feature = "train")]
    #[test]
    fn test_save_load_roundtrip() {
        let pipeline = tag_pipeline();
        let mut buf = vec![];
        pipeline.save(&mut buf).unwrap();
        let restored = Pipeline::load(&mut buf.as_slice()).unwrap();
        assert_eq!(pipeline.task(), restored.task());
        let mut a = tagged(&[("the", "X"), ("dog", "X")]).stripped();
        let mut b = a.clone();
        pipeline.process(&mut a).unwrap();
        restored.process(&mut b).unwrap();
        for id in 1..a.len() {
            assert_eq!(a.node(id).unwrap().pos, b.node(id).unwrap().pos);
        }
    }

    struct VecSource {
        name: String,
        trees: Result<Vec<DependencyTree>>,
    }

    impl TreeSource for VecSource {
        fn name(&self) -> &str {
            &self.name
        }

        fn trees(&mut self) -> Result<Vec<DependencyTree>> {
            std::mem::replace(
                &mut self.trees,
                Err(GondolaError::invalid_argument("source", "already consumed")),
            )
        }
    }

    /// Tags everything "X"; fails on the form "bad".
    struct FixedTagger;

    impl Processor for FixedTagger {
        fn process(&self, tree: &mut DependencyTree) -> Result<()> {
            for id in 1..tree.len() {
                let node = tree.node_mut(id).unwrap();
                if node.form == "bad" {
                    return Err(GondolaError::invalid_argument("tree", "bad token"));
                }
                node.pos = Some("X".into());
            }
            Ok(())
        }
    }

    #[test]
    fn test_batch_isolates_source_failures() {
        let mut sources: Vec<Box<dyn TreeSource>> = vec![
            Box::new(VecSource {
                name: "good".into(),
                trees: Ok(vec![
                    DependencyTree::from_forms(["a"]),
                    DependencyTree::from_forms(["b"]),
                ]),
            }),
            Box::new(VecSource {
                name: "broken".into(),
                trees: Err(GondolaError::invalid_argument("source", "unreadable")),
            }),
            Box::new(VecSource {
                name: "poison".into(),
                trees: Ok(vec![
                    DependencyTree::from_forms(["bad"]),
                    DependencyTree::from_forms(["fine"]),
                ]),
            }),
        ];
        let cancel = AtomicBool::new(false);
        let report = process_batch(&FixedTagger, &mut sources, &cancel);
        assert_eq!(2, report.trees.len());
        assert!(!report.cancelled);
        let failed: Vec<&str> = report.failures.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(vec!["broken", "poison"], failed);
    }

    #[test]
    fn test_batch_honors_cancellation() {
        let mut sources: Vec<Box<dyn TreeSource>> = vec![Box::new(VecSource {
            name: "good".into(),
            trees: Ok(vec![DependencyTree::from_forms(["a"])]),
        })];
        let cancel = AtomicBool::new(true);
        let report = process_batch(&FixedTagger, &mut sources, &cancel);
        assert!(report.cancelled);
        assert!(report.trees.is_empty());
    }

    #[cfg(all(feature = "train", feature = "multithreading"))]
    #[test]
    fn test_decode_pool_preserves_order() {
        let pipeline = std::sync::Arc::new(tag_pipeline());
        let pool = DecodePool::new(std::sync::Arc::clone(&pipeline), 2);
        let trees: Vec<DependencyTree> = (0..8)
            .map(|i| {
                if i % 2 == 0 {
                    DependencyTree::from_forms(["the", "cat"])
                } else {
                    DependencyTree::from_forms(["a", "dog", "ran"])
                }
            })
            .collect();
        let expected: Vec<usize> = trees.iter().map(DependencyTree::len).collect();
        let decoded = pool.process_all(trees).unwrap();
        let got: Vec<usize> = decoded.iter().map(DependencyTree::len).collect();
        assert_eq!(expected, got);
        for tree in &decoded {
            for id in 1..tree.len() {
                assert!(tree.node(id).unwrap().pos.is_some());
            }
        }
    }
}

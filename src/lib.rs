#![cfg_attr(docsrs, feature(doc_cfg))]

//! # Gondola
//!
//! Gondola is a trainable transition-based statistical annotation engine for
//! dependency trees: a part-of-speech tagger, an arc-eager dependency parser
//! and a semantic role labeler sharing one feature template engine, one
//! online learner and one beam-search decoder.
//!
//! ## Examples
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! use gondola::{DependencyTree, Pipeline, Processor};
//!
//! let mut f = BufReader::new(File::open("tagger.bin").unwrap());
//! let pipeline = Pipeline::load(&mut f).unwrap();
//!
//! let mut tree = DependencyTree::from_forms(["the", "cat", "sat"]);
//! pipeline.process(&mut tree).unwrap();
//! for node in tree.nodes().iter().skip(1) {
//!     println!("{}\t{}", node.form, node.pos.as_deref().unwrap_or("_"));
//! }
//! ```
//!
//! Training requires **crate feature** `train`. For more details, see
//! [`Pipeline::train`].

mod utils;

mod beam;
mod errors;
mod model;
mod parser;
mod pipeline;
mod srl;
mod state;
mod tagger;
mod template;
mod tree;
mod vector;

#[cfg(feature = "train")]
mod learner;
#[cfg(feature = "train")]
mod space;

pub use beam::{BeamDecoder, BeamEntry};
pub use errors::{GondolaError, Result};
pub use model::{FeatureMap, LabelMap, Lexica, Model, WeightMatrix};
pub use parser::ParseState;
pub use pipeline::{
    process_batch, BatchReport, Evaluation, Pipeline, PipelineConfig, Processor, Task, TreeSource,
};
pub use srl::{RoleState, NO_ROLE};
pub use state::TransitionState;
pub use tagger::TagState;
pub use template::{FeatureTemplate, Field, Relation, Source, TemplateSet, ABSENT};
pub use tree::{DependencyNode, DependencyTree, RoleArc};
pub use vector::{SparseFeatureVector, StringFeature, StringFeatureVector};

#[cfg(feature = "multithreading")]
pub use pipeline::DecodePool;

#[cfg(feature = "train")]
pub use beam::oracle_instances;
#[cfg(feature = "train")]
pub use learner::{OnlineTrainer, UpdateRule};
#[cfg(feature = "train")]
pub use pipeline::TrainConfig;
#[cfg(feature = "train")]
pub use space::TrainingSpace;

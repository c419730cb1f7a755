//! The feature template engine.
//!
//! Templates are written one per line in a small declarative language and
//! compiled up front; an unknown source, relation or field symbol fails the
//! whole compilation. Example:
//!
//! ```text
//! # unigram surface features
//! w0 = i[0].form
//! bg = i[-1].form + i[0].form
//! hp = s[0]:hd.pos
//! *q = b[0]:lmd.lemma     <- '*' marks a boolean-only template
//! -x = i[2].pos           <- '-' compiles the template invisible
//! ```

use bincode::{Decode, Encode};

use crate::errors::{GondolaError, Result};
use crate::model::Lexica;
use crate::state::TransitionState;
use crate::tree::DependencyTree;
use crate::utils::bucket;
use crate::vector::StringFeatureVector;

/// Sentinel emitted for an absent token or field value.
pub const ABSENT: &str = "#NULL#";

/// Where a feature token is anchored in the annotation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum Source {
    /// Input sequence, relative to the state focus.
    Input,
    /// Parser stack, offset is the depth from the top.
    Stack,
    /// Parser buffer, offset from the front.
    Buffer,
    /// Current predicate of the role labeler.
    Predicate,
    /// Current candidate argument of the role labeler.
    Argument,
}

/// A relation followed from the anchored node before reading the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum Relation {
    Head,
    GrandHead,
    LeftmostDependent,
    RightmostDependent,
    LeftNearestDependent,
    RightNearestDependent,
    LeftNearestSibling,
    RightNearestSibling,
}

/// The node field a token reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum Field {
    Form,
    LowercaseForm,
    Lemma,
    Pos,
    CoarsePos,
    Deprel,
    Distance,
    LeftValency,
    RightValency,
    AmbiguityClass,
}

/// One token of a feature template.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct FeatureToken {
    pub source: Source,
    pub offset: i32,
    pub relations: Vec<Relation>,
    pub field: Field,
}

/// A compiled feature template. Immutable once compiled.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct FeatureTemplate {
    /// Feature type tag; becomes the `kind` of every emitted feature.
    pub name: String,
    pub tokens: Vec<FeatureToken>,
    /// Boolean-only templates are skipped when any token is absent.
    pub boolean: bool,
    /// Invisible templates are kept but never extracted.
    pub visible: bool,
}

/// An ordered set of compiled templates.
#[derive(Debug, Clone, Default, PartialEq, Encode, Decode)]
pub struct TemplateSet {
    templates: Vec<FeatureTemplate>,
}

impl TemplateSet {
    /// Compiles a template source.
    ///
    /// # Errors
    ///
    /// [`GondolaError::InvalidTemplate`] on the first malformed line; no
    /// partial set is ever returned.
    pub fn compile(src: &str) -> Result<Self> {
        let mut templates = vec![];
        for (lineno, raw) in src.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            templates.push(parse_template(line, lineno + 1)?);
        }
        if templates.is_empty() {
            return Err(GondolaError::invalid_template(0, "no templates defined"));
        }
        Ok(Self { templates })
    }

    pub fn templates(&self) -> &[FeatureTemplate] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Extracts the feature vector for the current configuration of `state`.
    pub fn extract<S>(&self, state: &S, lexica: &Lexica) -> StringFeatureVector
    where
        S: TransitionState,
    {
        let mut vector = StringFeatureVector::new();
        let mut value = String::new();
        'template: for template in &self.templates {
            if !template.visible {
                continue;
            }
            value.clear();
            for (i, token) in template.tokens.iter().enumerate() {
                if i > 0 {
                    value.push('+');
                }
                match token_value(token, state, lexica) {
                    Some(v) => value.push_str(&v),
                    None if template.boolean => continue 'template,
                    None => value.push_str(ABSENT),
                }
            }
            vector.push(&template.name, &value);
        }
        vector
    }
}

fn follow(tree: &DependencyTree, relation: Relation, id: usize) -> Option<usize> {
    match relation {
        Relation::Head => tree.head_of(id),
        Relation::GrandHead => tree.grand_head_of(id),
        Relation::LeftmostDependent => tree.leftmost_dependent(id),
        Relation::RightmostDependent => tree.rightmost_dependent(id),
        Relation::LeftNearestDependent => tree.left_nearest_dependent(id),
        Relation::RightNearestDependent => tree.right_nearest_dependent(id),
        Relation::LeftNearestSibling => tree.left_nearest_sibling(id),
        Relation::RightNearestSibling => tree.right_nearest_sibling(id),
    }
}

fn token_value<S>(token: &FeatureToken, state: &S, lexica: &Lexica) -> Option<String>
where
    S: TransitionState,
{
    let mut id = state.resolve(token.source, token.offset)?;
    let tree = state.tree();
    for &relation in &token.relations {
        id = follow(tree, relation, id)?;
    }
    let node = tree.node(id)?;
    match token.field {
        Field::Form => Some(node.form.clone()),
        Field::LowercaseForm => Some(node.form.to_lowercase()),
        Field::Lemma => node.lemma.clone(),
        Field::Pos => node.pos.clone(),
        Field::CoarsePos => node.cpos.clone(),
        Field::Deprel => node.deprel.clone(),
        Field::Distance => {
            let focus = state.focus()?;
            Some(bucket(focus.abs_diff(id)).to_string())
        }
        Field::LeftValency => Some(bucket(tree.left_valency(id)).to_string()),
        Field::RightValency => Some(bucket(tree.right_valency(id)).to_string()),
        Field::AmbiguityClass => lexica
            .ambiguity_class(&node.form.to_lowercase())
            .map(str::to_string),
    }
}

fn parse_template(line: &str, lineno: usize) -> Result<FeatureTemplate> {
    let mut rest = line;
    let mut visible = true;
    let mut boolean = false;
    loop {
        if let Some(r) = rest.strip_prefix('-') {
            visible = false;
            rest = r;
        } else if let Some(r) = rest.strip_prefix('*') {
            boolean = true;
            rest = r;
        } else {
            break;
        }
    }
    let (name, rhs) = rest
        .split_once('=')
        .ok_or_else(|| GondolaError::invalid_template(lineno, "missing '='"))?;
    let name = name.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err(GondolaError::invalid_template(
            lineno,
            format!("invalid template name {name:?}"),
        ));
    }
    let mut tokens = vec![];
    for part in rhs.split('+') {
        tokens.push(parse_token(part.trim(), lineno)?);
    }
    Ok(FeatureTemplate {
        name: name.to_string(),
        tokens,
        boolean,
        visible,
    })
}

fn parse_token(part: &str, lineno: usize) -> Result<FeatureToken> {
    let open = part
        .find('[')
        .ok_or_else(|| GondolaError::invalid_template(lineno, format!("missing '[' in {part:?}")))?;
    let close = part
        .find(']')
        .ok_or_else(|| GondolaError::invalid_template(lineno, format!("missing ']' in {part:?}")))?;
    if close < open {
        return Err(GondolaError::invalid_template(
            lineno,
            format!("malformed offset in {part:?}"),
        ));
    }
    let source = match &part[..open] {
        "i" => Source::Input,
        "s" => Source::Stack,
        "b" => Source::Buffer,
        "p" => Source::Predicate,
        "a" => Source::Argument,
        other => {
            return Err(GondolaError::invalid_template(
                lineno,
                format!("unknown source {other:?}"),
            ))
        }
    };
    let offset: i32 = part[open + 1..close].parse().map_err(|_| {
        GondolaError::invalid_template(lineno, format!("invalid offset in {part:?}"))
    })?;
    let tail = &part[close + 1..];
    let (relation_part, field_name) = match tail.rfind('.') {
        Some(dot) => (&tail[..dot], &tail[dot + 1..]),
        None => {
            return Err(GondolaError::invalid_template(
                lineno,
                format!("missing field in {part:?}"),
            ))
        }
    };
    let mut relations = vec![];
    for rel in relation_part.split(':').filter(|s| !s.is_empty()) {
        relations.push(match rel {
            "hd" => Relation::Head,
            "hd2" => Relation::GrandHead,
            "lmd" => Relation::LeftmostDependent,
            "rmd" => Relation::RightmostDependent,
            "lnd" => Relation::LeftNearestDependent,
            "rnd" => Relation::RightNearestDependent,
            "lns" => Relation::LeftNearestSibling,
            "rns" => Relation::RightNearestSibling,
            other => {
                return Err(GondolaError::invalid_template(
                    lineno,
                    format!("unknown relation {other:?}"),
                ))
            }
        });
    }
    let field = match field_name {
        "form" => Field::Form,
        "lform" => Field::LowercaseForm,
        "lemma" => Field::Lemma,
        "pos" => Field::Pos,
        "cpos" => Field::CoarsePos,
        "deprel" => Field::Deprel,
        "dist" => Field::Distance,
        "lval" => Field::LeftValency,
        "rval" => Field::RightValency,
        "ambi" => Field::AmbiguityClass,
        other => {
            return Err(GondolaError::invalid_template(
                lineno,
                format!("unknown field {other:?}"),
            ))
        }
    };
    Ok(FeatureToken {
        source,
        offset,
        relations,
        field,
    })
}

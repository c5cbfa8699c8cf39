//! Loop transformations over the iteration tree.
//!
//! Every transformation kind is a struct implementing [`Transform`]:
//! candidate enumeration from the tree shape, precondition checks, rendering
//! of the backend/legality/canonical strings, and the in-place tree mutation.
//! [`Transformation`] closes the set of kinds into one sum type so the
//! schedule can dispatch with an exhaustive match.
//!
//! Targets are resolved to loop names when a transformation is constructed,
//! and the list of concerned statements (`comps`) is derived from the tree at
//! that point, so two transformations built against the same tree state
//! compare equal exactly when they would do the same thing.

pub mod fusion;
pub mod interchange;
pub mod matrix;
pub mod parallelization;
pub mod reversal;
pub mod skewing;
pub mod tiling;
pub mod unrolling;
mod action;

pub use action::Transformation;
pub use fusion::{Distribution, Fusion};
pub use interchange::Interchange;
pub use matrix::MatrixTransform;
pub use parallelization::Parallelization;
pub use reversal::Reversal;
pub use skewing::Skewing;
pub use tiling::{Tiling2D, Tiling3D};
pub use unrolling::Unrolling;

use crate::tree::{CandidateSections, IterationTree};
use crate::utils::errors::{TransformError, TreeError};
use indexmap::IndexMap;
use std::fmt;

/// Candidate loop pairs, per root.
pub type PairCandidates = IndexMap<String, Vec<(String, String)>>;

/// Candidate loop triples, per root.
pub type TripleCandidates = IndexMap<String, Vec<(String, String, String)>>;

/// Transformation pass trait.
pub trait Transform {
    /// Shape of the candidate structure returned by [`Transform::candidates`].
    type Candidates;

    /// Kind tag of the implementor.
    const KIND: TransformKind;

    /// Targets this kind could be applied to, from the tree shape alone.
    fn candidates(tree: &IterationTree) -> Self::Candidates;

    /// Statements concerned by this transformation.
    fn comps(&self) -> &[String];

    /// Check preconditions against the current tree.
    fn verify_conditions(&self, tree: &IterationTree) -> Result<(), TransformError>;

    /// Render backend, legality and canonical strings. Never mutates.
    fn render(&self, tree: &IterationTree) -> Result<Rendering, TransformError>;

    /// Mutate the tree. Called at most once, after a successful verification.
    fn transform_tree(&self, tree: &mut IterationTree) -> Result<(), TransformError>;

    /// Get transformation name.
    fn name(&self) -> &'static str {
        Self::KIND.name()
    }
}

/// The ten transformation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum TransformKind {
    Interchange,
    Reversal,
    Skewing,
    Tiling2D,
    Tiling3D,
    Unrolling,
    Fusion,
    Distribution,
    Parallelization,
    Matrix,
}

impl TransformKind {
    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            TransformKind::Interchange => "Interchange",
            TransformKind::Reversal => "Reversal",
            TransformKind::Skewing => "Skewing",
            TransformKind::Tiling2D => "Tiling2D",
            TransformKind::Tiling3D => "Tiling3D",
            TransformKind::Unrolling => "Unrolling",
            TransformKind::Fusion => "Fusion",
            TransformKind::Distribution => "Distribution",
            TransformKind::Parallelization => "Parallelization",
            TransformKind::Matrix => "MatrixTransform",
        }
    }

    /// Tag opening the canonical token.
    pub fn tag(self) -> &'static str {
        match self {
            TransformKind::Interchange => "I",
            TransformKind::Reversal => "R",
            TransformKind::Skewing => "S",
            TransformKind::Tiling2D => "T2",
            TransformKind::Tiling3D => "T3",
            TransformKind::Unrolling => "U",
            TransformKind::Fusion => "F",
            TransformKind::Distribution => "D",
            TransformKind::Parallelization => "P",
            TransformKind::Matrix => "M",
        }
    }

    /// Kind opening a canonical token, if the tag is known.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let kind = match tag {
            "I" => TransformKind::Interchange,
            "R" => TransformKind::Reversal,
            "S" => TransformKind::Skewing,
            "T2" => TransformKind::Tiling2D,
            "T3" => TransformKind::Tiling3D,
            "U" => TransformKind::Unrolling,
            "F" => TransformKind::Fusion,
            "D" => TransformKind::Distribution,
            "P" => TransformKind::Parallelization,
            "M" => TransformKind::Matrix,
            _ => return None,
        };
        Some(kind)
    }

    /// Fusion and distribution compute their chained `then` levels from the
    /// mutated tree, so the engine renders them after mutation.
    pub fn renders_after_mutation(self) -> bool {
        matches!(self, TransformKind::Fusion | TransformKind::Distribution)
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a transformation names a loop.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IteratorId {
    /// Loop name
    Name(String),
    /// The loop enclosing `comp` at `level`
    Computation { comp: String, level: usize },
}

impl IteratorId {
    /// Resolve to a loop name against the current tree.
    pub fn resolve(&self, tree: &IterationTree) -> Result<String, TreeError> {
        match self {
            IteratorId::Name(name) => tree.iterator(name).map(|node| node.name.clone()),
            IteratorId::Computation { comp, level } => tree
                .get_iterator_of_computation(comp, Some(*level))
                .map(|node| node.name.clone()),
        }
    }
}

impl From<&str> for IteratorId {
    fn from(name: &str) -> Self {
        IteratorId::Name(name.to_string())
    }
}

impl From<String> for IteratorId {
    fn from(name: String) -> Self {
        IteratorId::Name(name)
    }
}

impl From<&String> for IteratorId {
    fn from(name: &String) -> Self {
        IteratorId::Name(name.clone())
    }
}

impl From<(&str, usize)> for IteratorId {
    fn from((comp, level): (&str, usize)) -> Self {
        IteratorId::Computation { comp: comp.to_string(), level }
    }
}

/// Strings produced when a transformation is applied.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Rendering {
    /// Backend scheduling code
    pub backend: String,
    /// Legality-check snippet handed to the oracle
    pub legality: String,
    /// Canonical token
    pub canonical: String,
}

impl Rendering {
    /// Rendering whose legality snippet is the backend code itself.
    pub fn plain(backend: String, canonical: String) -> Self {
        Self { legality: backend.clone(), backend, canonical }
    }
}

/// Resolve a target, reporting failures as malformed parameters.
pub(crate) fn resolve(kind: TransformKind, tree: &IterationTree, id: IteratorId) -> Result<String, TransformError> {
    id.resolve(tree)
        .map_err(|err| TransformError::malformed(kind.name(), err.to_string()))
}

pub(crate) fn cannot_apply(kind: TransformKind) -> impl Fn(TreeError) -> TransformError {
    move |err| TransformError::cannot_apply(kind.name(), err.to_string())
}

pub(crate) fn internal(kind: TransformKind) -> impl Fn(TreeError) -> TransformError {
    move |err| TransformError::internal(kind.name(), err.to_string())
}

/// Reject a target whose subtree holds no statement: its canonical token
/// would have nothing to resolve levels through.
pub(crate) fn require_statements(kind: TransformKind, comps: &[String], target: &str) -> Result<(), TransformError> {
    if comps.is_empty() {
        return Err(TransformError::cannot_apply(
            kind.name(),
            format!("`{target}` holds no statement"),
        ));
    }
    Ok(())
}

/// `['a', 'b']`
pub(crate) fn format_names<S: AsRef<str>>(names: &[S]) -> String {
    let quoted: Vec<String> = names.iter().map(|n| format!("'{}'", n.as_ref())).collect();
    format!("[{}]", quoted.join(", "))
}

/// One line of backend code per statement.
pub(crate) fn per_statement(comps: &[String], line: impl Fn(&str) -> String) -> String {
    comps.iter().map(|comp| line(comp)).collect()
}

/// `{&a, &b}`
pub(crate) fn statement_refs(comps: &[String]) -> String {
    let refs: Vec<String> = comps.iter().map(|c| format!("&{c}")).collect();
    format!("{{{}}}", refs.join(", "))
}

/// Whole-program ordering code: every statement chained with `then` at the
/// level of its innermost loop shared with the previous statement.
pub(crate) fn then_chain(tree: &IterationTree) -> Result<String, TreeError> {
    let levels = tree.shared_loop_levels()?;
    let comps = tree.computations();
    let Some(first) = comps.first() else {
        return Ok("clear_implicit_function_sched_graph();\n".to_string());
    };
    let mut code = format!("clear_implicit_function_sched_graph();\n    {first}");
    for (comp, level) in comps.iter().skip(1).zip(levels) {
        code.push_str(&format!(".then({comp},{level})"));
    }
    code.push_str(";\n");
    Ok(code)
}

/// All pairs drawn from one section, outer loop first.
pub(crate) fn section_combinations(sections: &CandidateSections) -> PairCandidates {
    sections
        .iter()
        .map(|(root, sections)| {
            let mut pairs = Vec::new();
            for section in sections {
                for (idx, outer) in section.iter().enumerate() {
                    for inner in &section[idx + 1..] {
                        pairs.push((outer.clone(), inner.clone()));
                    }
                }
            }
            (root.clone(), pairs)
        })
        .collect()
}

/// Pairs of directly nested loops drawn from one section.
pub(crate) fn successive_pairs(sections: &CandidateSections) -> PairCandidates {
    sections
        .iter()
        .map(|(root, sections)| {
            let pairs = sections
                .iter()
                .flat_map(|section| section.windows(2).map(|w| (w[0].clone(), w[1].clone())))
                .collect();
            (root.clone(), pairs)
        })
        .collect()
}

/// Triples of directly nested loops drawn from one section.
pub(crate) fn successive_triples(sections: &CandidateSections) -> TripleCandidates {
    sections
        .iter()
        .map(|(root, sections)| {
            let triples = sections
                .iter()
                .flat_map(|section| {
                    section
                        .windows(3)
                        .map(|w| (w[0].clone(), w[1].clone(), w[2].clone()))
                })
                .collect();
            (root.clone(), triples)
        })
        .collect()
}

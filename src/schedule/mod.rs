//! Schedules: ordered sequences of transformations over one tree.
//!
//! A [`Schedule`] owns a private clone of its source tree and applies each
//! added transformation to it right away, so the tree always reflects the
//! transformations recorded so far. Schedules built from the same source
//! share the source through an [`Arc`] and never observe each other's
//! edits.
//!
//! # Example
//!
//! ```
//! use looptree::prelude::*;
//!
//! let tree = TreeBuilder::new()
//!     .root("i0", 0, 64)
//!     .iterator("i1", "i0", 0, 64)
//!     .computation("comp00", "i1")
//!     .build()
//!     .unwrap();
//! let mut schedule = Schedule::new(tree);
//! let interchange = Interchange::new("i0", "i1", schedule.tree()).unwrap();
//! schedule.add(interchange).unwrap();
//! let tiling = Tiling2D::new("i1", "i0", [16, 16], schedule.tree()).unwrap();
//! schedule.add(tiling).unwrap();
//! assert_eq!(
//!     schedule.to_canonical_string(),
//!     "I(L0,L1,comps=['comp00'])|T2(L0,L1,16,16,comps=['comp00'])"
//! );
//! ```

pub mod canonical;
mod config;

pub use canonical::CanonicalToken;
pub use config::ScheduleConfig;

use crate::oracle::LegalityOracle;
use crate::tree::IterationTree;
use crate::transform::{
    Distribution, Fusion, Interchange, IteratorId, MatrixTransform, Parallelization, Rendering,
    Reversal, Skewing, Tiling2D, Tiling3D, TransformKind, Transformation, Unrolling,
};
use crate::utils::errors::{OracleError, ScheduleError, TransformError};
use anyhow::anyhow;
use log::{debug, warn};
use std::fmt;
use std::sync::Arc;

/// Cached answer of the legality oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Legality {
    /// Not asked yet, or changed since
    #[default]
    Unknown,
    /// Oracle accepted the schedule
    Legal,
    /// Oracle rejected the schedule
    Illegal,
}

/// A transformation together with the strings it rendered when applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTransformation {
    /// The applied transformation
    pub transformation: Transformation,
    /// Strings rendered at application time
    pub rendering: Rendering,
}

/// Ordered sequence of transformations applied to a private tree.
#[derive(Debug, Clone)]
pub struct Schedule {
    source: Arc<IterationTree>,
    tree: IterationTree,
    entries: Vec<ScheduledTransformation>,
    legality: Legality,
    config: ScheduleConfig,
}

impl Schedule {
    /// Create an empty schedule over a clone of `source`.
    pub fn new(source: impl Into<Arc<IterationTree>>) -> Self {
        Self::with_config(source, ScheduleConfig::default())
    }

    /// Empty schedule with explicit settings.
    pub fn with_config(source: impl Into<Arc<IterationTree>>, config: ScheduleConfig) -> Self {
        let source = source.into();
        let tree = IterationTree::clone(&source);
        Self {
            source,
            tree,
            entries: Vec::new(),
            legality: Legality::Unknown,
            config,
        }
    }

    /// The tree with every transformation applied.
    pub fn tree(&self) -> &IterationTree {
        &self.tree
    }

    /// The tree the schedule started from.
    pub fn source(&self) -> &Arc<IterationTree> {
        &self.source
    }

    /// Settings in use.
    pub fn config(&self) -> ScheduleConfig {
        self.config
    }

    /// Cached legality verdict.
    pub fn legality(&self) -> Legality {
        self.legality
    }

    /// Recorded transformations with their renderings.
    pub fn entries(&self) -> &[ScheduledTransformation] {
        &self.entries
    }

    /// Transformations in application order.
    pub fn transformations(&self) -> impl Iterator<Item = &Transformation> {
        self.entries.iter().map(|entry| &entry.transformation)
    }

    /// Number of recorded transformations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no transformation has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Verify, render and apply a transformation, then record it.
    ///
    /// Returns `Ok(false)` when an equal transformation is already recorded
    /// and duplicates are skipped. On a verification failure nothing changes.
    pub fn add(&mut self, transformation: impl Into<Transformation>) -> Result<bool, TransformError> {
        let transformation = transformation.into();
        if self.config.skip_duplicates && self.transformations().any(|t| *t == transformation) {
            debug!("skipping duplicate {}", transformation.kind());
            return Ok(false);
        }
        let rendering = transformation.apply(&mut self.tree)?;
        if self.config.validate_invariants {
            self.tree.validate().map_err(|err| {
                TransformError::internal(transformation.kind().name(), err.to_string())
            })?;
        }
        debug!("applied {}", rendering.canonical);
        self.entries.push(ScheduledTransformation { transformation, rendering });
        self.legality = Legality::Unknown;
        Ok(true)
    }

    /// Forget the last transformation.
    ///
    /// The tree keeps its mutation: undo is not supported, callers that need
    /// to roll back copy the schedule beforehand.
    pub fn pop(&mut self) -> Option<Transformation> {
        let entry = self.entries.pop()?;
        self.legality = Legality::Unknown;
        Some(entry.transformation)
    }

    /// Independent schedule obtained by replaying every transformation on a
    /// fresh clone of the source.
    pub fn copy(&self) -> Result<Schedule, TransformError> {
        let mut copy = Schedule::with_config(Arc::clone(&self.source), self.config);
        for transformation in self.transformations() {
            copy.add(transformation.clone())?;
        }
        copy.legality = self.legality;
        Ok(copy)
    }

    /// `|`-joined canonical tokens.
    pub fn to_canonical_string(&self) -> String {
        let tokens: Vec<&str> = self.entries.iter().map(|e| e.rendering.canonical.as_str()).collect();
        tokens.join("|")
    }

    /// Rebuild a schedule from its canonical string.
    ///
    /// Tokens are applied left to right; each one is resolved against the
    /// tree as left by the tokens before it.
    pub fn from_canonical_string(
        source: impl Into<Arc<IterationTree>>,
        text: &str,
    ) -> Result<Schedule, ScheduleError> {
        let tokens = canonical::parse(text)?;
        let mut schedule = Schedule::new(source);
        for token in &tokens {
            let transformation = token.resolve(&schedule.tree)?;
            schedule.add(transformation)?;
        }
        Ok(schedule)
    }

    /// Backend code of every transformation, in order.
    pub fn optimization_code(&self) -> String {
        self.entries.iter().map(|e| e.rendering.backend.as_str()).collect()
    }

    /// Legality-check code of every transformation, in order.
    pub fn legality_code(&self) -> String {
        self.entries.iter().map(|e| e.rendering.legality.as_str()).collect()
    }

    /// Ask the oracle whether the schedule is legal, caching the answer
    /// until the schedule changes. A crash leaves the cache untouched.
    pub fn is_legal<O: LegalityOracle + ?Sized>(&mut self, oracle: &O) -> Result<bool, OracleError> {
        match self.legality {
            Legality::Legal => return Ok(true),
            Legality::Illegal => return Ok(false),
            Legality::Unknown => {}
        }
        match oracle.check(self) {
            Ok(legal) => {
                self.legality = if legal { Legality::Legal } else { Legality::Illegal };
                debug!("schedule `{}` is {}", self, if legal { "legal" } else { "illegal" });
                Ok(legal)
            }
            Err(cause) => Err(self.crashed(cause)),
        }
    }

    /// Execution time samples measured by the oracle.
    pub fn execution_times<O: LegalityOracle + ?Sized>(
        &self,
        oracle: &O,
        n_samples: usize,
    ) -> Result<Vec<f64>, OracleError> {
        match oracle.run(self, n_samples) {
            Ok(times) if times.is_empty() => Err(self.crashed(anyhow!("no execution time returned"))),
            Ok(times) => Ok(times),
            Err(cause) => Err(self.crashed(cause)),
        }
    }

    fn crashed(&self, cause: anyhow::Error) -> OracleError {
        let schedule = self.to_canonical_string();
        warn!("oracle crashed on `{}`: {}", schedule, cause);
        OracleError::ExecutionCrashed { schedule, cause }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical_string())
    }
}

impl CanonicalToken {
    /// Rebuild the transformation this token describes against `tree`.
    ///
    /// Levels are resolved through the first listed statement: `L<n>` names
    /// the loop enclosing it at depth `n`.
    pub fn resolve(&self, tree: &IterationTree) -> Result<Transformation, TransformError> {
        let comp = self.comps.first().map(String::as_str).unwrap_or_default();
        let at = |idx: usize| IteratorId::from((comp, self.levels.get(idx).copied().unwrap_or_default()));
        let param = |idx: usize| self.params.get(idx).copied().unwrap_or_default();

        let transformation = match self.kind {
            TransformKind::Interchange => Interchange::new(at(0), at(1), tree)?.into(),
            TransformKind::Reversal => Reversal::new(at(0), tree)?.into(),
            TransformKind::Skewing => Skewing::new(at(0), at(1), (param(0), param(1)), tree)?.into(),
            TransformKind::Tiling2D => Tiling2D::new(at(0), at(1), [param(0), param(1)], tree)?.into(),
            TransformKind::Tiling3D => {
                Tiling3D::new(at(0), at(1), at(2), [param(0), param(1), param(2)], tree)?.into()
            }
            TransformKind::Unrolling => Unrolling::new(at(0), param(0), tree)?.into(),
            TransformKind::Fusion => {
                let first = at(0).resolve(tree).map_err(|err| {
                    TransformError::malformed(TransformKind::Fusion.name(), err.to_string())
                })?;
                let second = self.second_fused_loop(tree, &first)?;
                Fusion::new(first, second, tree)?.into()
            }
            TransformKind::Distribution if self.groups.is_empty() => Distribution::new(at(0), tree)?.into(),
            TransformKind::Distribution => Distribution::with_groups(at(0), self.groups.clone(), tree)?.into(),
            TransformKind::Parallelization => Parallelization::new(at(0), tree)?.into(),
            TransformKind::Matrix => MatrixTransform::new(&self.matrix, self.comps.clone(), tree)?.into(),
        };
        Ok(transformation)
    }

    /// The loop at the token's level enclosing the first listed statement
    /// that `first` does not enclose.
    fn second_fused_loop(&self, tree: &IterationTree, first: &str) -> Result<String, TransformError> {
        let level = self.levels.first().copied().unwrap_or_default();
        for comp in &self.comps {
            let node = tree
                .get_iterator_of_computation(comp, Some(level))
                .map_err(|err| TransformError::malformed(TransformKind::Fusion.name(), err.to_string()))?;
            if node.name != first {
                return Ok(node.name.clone());
            }
        }
        Err(TransformError::malformed(
            TransformKind::Fusion.name(),
            format!("every listed statement is under `{first}`"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::samples;
    use crate::utils::errors::TransformErrorKind;

    struct FixedOracle {
        verdict: Option<bool>,
        calls: std::cell::Cell<usize>,
    }

    impl LegalityOracle for FixedOracle {
        fn check(&self, _schedule: &Schedule) -> anyhow::Result<bool> {
            self.calls.set(self.calls.get() + 1);
            self.verdict.ok_or_else(|| anyhow!("compiler exited with status 1"))
        }

        fn run(&self, _schedule: &Schedule, n_samples: usize) -> anyhow::Result<Vec<f64>> {
            match self.verdict {
                Some(true) => Ok(vec![1.5; n_samples]),
                Some(false) => Ok(Vec::new()),
                None => Err(anyhow!("segmentation fault")),
            }
        }
    }

    fn make_test_oracle(verdict: Option<bool>) -> FixedOracle {
        FixedOracle { verdict, calls: std::cell::Cell::new(0) }
    }

    #[test]
    fn test_add_skips_duplicates() {
        let mut schedule = Schedule::new(samples::perfect_nest(&[32, 32]).unwrap());
        let t = Parallelization::new("i0", schedule.tree()).unwrap();
        assert!(schedule.add(t.clone()).unwrap());
        assert!(!schedule.add(t.clone()).unwrap());
        assert_eq!(schedule.len(), 1);

        let mut schedule = Schedule::with_config(
            samples::perfect_nest(&[32, 32]).unwrap(),
            ScheduleConfig::default().with_skip_duplicates(false),
        );
        schedule.add(t.clone()).unwrap();
        schedule.add(t).unwrap();
        assert_eq!(schedule.len(), 2);
    }

    #[test]
    fn test_add_failure_leaves_schedule_unchanged() {
        let mut schedule = Schedule::new(samples::unroll_nest().unwrap());
        let t = Unrolling::new("i1", 32, schedule.tree()).unwrap();
        let err = schedule.add(t).unwrap_err();
        assert_eq!(err.kind, TransformErrorKind::CannotApply);
        assert!(schedule.is_empty());
        assert_eq!(schedule.tree(), schedule.source().as_ref());
    }

    #[test]
    fn test_schedules_are_isolated() {
        let source = Arc::new(samples::perfect_nest(&[16, 16]).unwrap());
        let mut a = Schedule::new(Arc::clone(&source));
        let b = Schedule::new(Arc::clone(&source));
        a.add(Reversal::new("i0", a.tree()).unwrap()).unwrap();
        assert_ne!(a.tree(), b.tree());
        assert_eq!(b.tree(), source.as_ref());
    }

    #[test]
    fn test_copy_replays() {
        let mut schedule = Schedule::new(samples::unroll_nest().unwrap());
        schedule.add(Unrolling::new("i0", 155, schedule.tree()).unwrap()).unwrap();
        let mut copy = schedule.copy().unwrap();
        assert_eq!(copy.tree(), schedule.tree());
        assert_eq!(copy.to_canonical_string(), schedule.to_canonical_string());

        copy.add(Parallelization::new("i0", copy.tree()).unwrap()).unwrap();
        assert_eq!(schedule.len(), 1);
        assert_eq!(copy.len(), 2);
    }

    #[test]
    fn test_pop_keeps_tree() {
        let mut schedule = Schedule::new(samples::perfect_nest(&[16, 16]).unwrap());
        schedule.add(Reversal::new("i1", schedule.tree()).unwrap()).unwrap();
        let reversed = schedule.tree().clone();
        assert!(matches!(schedule.pop(), Some(Transformation::Reversal(_))));
        assert!(schedule.is_empty());
        assert_eq!(schedule.tree(), &reversed);
        assert!(schedule.pop().is_none());
    }

    #[test]
    fn test_codes() {
        let mut schedule = Schedule::new(samples::perfect_nest(&[16, 16]).unwrap());
        schedule.add(Parallelization::new("i0", schedule.tree()).unwrap()).unwrap();
        schedule.add(Unrolling::new("i1", 4, schedule.tree()).unwrap()).unwrap();
        assert_eq!(
            schedule.optimization_code(),
            "comp00.tag_parallel_level(0);\ncomp00.unroll(1,4);\n"
        );
        assert!(schedule.legality_code().starts_with("is_legal &= loop_parallelization_is_legal(0, {&comp00});"));
        assert_eq!(schedule.to_string(), "P(L0,comps=['comp00'])|U(L1,4,comps=['comp00'])");
    }

    #[test]
    fn test_legality_cache() {
        let mut schedule = Schedule::new(samples::perfect_nest(&[16, 16]).unwrap());
        let oracle = make_test_oracle(Some(true));
        assert!(schedule.is_legal(&oracle).unwrap());
        assert!(schedule.is_legal(&oracle).unwrap());
        assert_eq!(oracle.calls.get(), 1);
        assert_eq!(schedule.legality(), Legality::Legal);

        schedule.add(Reversal::new("i0", schedule.tree()).unwrap()).unwrap();
        assert_eq!(schedule.legality(), Legality::Unknown);
        assert!(schedule.is_legal(&oracle).unwrap());
        assert_eq!(oracle.calls.get(), 2);
    }

    #[test]
    fn test_oracle_crash_is_not_illegal() {
        let mut schedule = Schedule::new(samples::perfect_nest(&[16, 16]).unwrap());
        schedule.add(Reversal::new("i0", schedule.tree()).unwrap()).unwrap();
        let oracle = make_test_oracle(None);
        let OracleError::ExecutionCrashed { schedule: text, .. } = schedule.is_legal(&oracle).unwrap_err();
        assert_eq!(text, "R(L0,comps=['comp00'])");
        assert_eq!(schedule.legality(), Legality::Unknown);
        assert!(schedule.execution_times(&oracle, 3).is_err());
    }

    #[test]
    fn test_execution_times() {
        let schedule = Schedule::new(samples::perfect_nest(&[16, 16]).unwrap());
        assert_eq!(schedule.execution_times(&make_test_oracle(Some(true)), 2).unwrap(), vec![1.5, 1.5]);
        assert!(schedule.execution_times(&make_test_oracle(Some(false)), 2).is_err());
    }

    #[test]
    fn test_round_trip_fusion_token() {
        let source = Arc::new(samples::multiple_roots().unwrap());
        let mut schedule = Schedule::new(Arc::clone(&source));
        schedule.add(Fusion::new("i_0", "i_2", schedule.tree()).unwrap()).unwrap();
        let text = schedule.to_canonical_string();
        assert_eq!(text, "F(L0,comps=['x_temp', 'w'])");

        let parsed = Schedule::from_canonical_string(source, &text).unwrap();
        assert_eq!(parsed.transformations().collect::<Vec<_>>(), schedule.transformations().collect::<Vec<_>>());
        assert_eq!(parsed.tree(), schedule.tree());
    }

    #[test]
    fn test_from_canonical_string_errors() {
        let tree = samples::perfect_nest(&[16, 16]).unwrap();
        assert!(matches!(
            Schedule::from_canonical_string(tree.clone(), "R(L0,comps=['comp00'"),
            Err(ScheduleError::Parse(_))
        ));
        assert!(matches!(
            Schedule::from_canonical_string(tree.clone(), "R(L5,comps=['comp00'])"),
            Err(ScheduleError::Transform(_))
        ));
        assert!(matches!(
            Schedule::from_canonical_string(tree, "U(L1,64,comps=['comp00'])"),
            Err(ScheduleError::Transform(err)) if err.is_recoverable()
        ));
    }
}

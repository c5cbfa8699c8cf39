//! The closed set of transformation kinds.

use crate::tree::IterationTree;
use crate::transform::{
    Distribution, Fusion, Interchange, MatrixTransform, Parallelization, Rendering, Reversal,
    Skewing, Tiling2D, Tiling3D, Transform, TransformKind, Unrolling,
};
use crate::utils::errors::{TransformError, TransformErrorKind};
use log::error;

/// One transformation of any kind.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Transformation {
    Interchange(Interchange),
    Reversal(Reversal),
    Skewing(Skewing),
    Tiling2D(Tiling2D),
    Tiling3D(Tiling3D),
    Unrolling(Unrolling),
    Fusion(Fusion),
    Distribution(Distribution),
    Parallelization(Parallelization),
    Matrix(MatrixTransform),
}

macro_rules! dispatch {
    ($value:expr, $t:ident => $body:expr) => {
        match $value {
            Transformation::Interchange($t) => $body,
            Transformation::Reversal($t) => $body,
            Transformation::Skewing($t) => $body,
            Transformation::Tiling2D($t) => $body,
            Transformation::Tiling3D($t) => $body,
            Transformation::Unrolling($t) => $body,
            Transformation::Fusion($t) => $body,
            Transformation::Distribution($t) => $body,
            Transformation::Parallelization($t) => $body,
            Transformation::Matrix($t) => $body,
        }
    };
}

macro_rules! impl_from {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Transformation {
                fn from(t: $ty) -> Self {
                    Transformation::$variant(t)
                }
            }
        )*
    };
}

impl_from!(
    Interchange(Interchange),
    Reversal(Reversal),
    Skewing(Skewing),
    Tiling2D(Tiling2D),
    Tiling3D(Tiling3D),
    Unrolling(Unrolling),
    Fusion(Fusion),
    Distribution(Distribution),
    Parallelization(Parallelization),
    Matrix(MatrixTransform),
);

impl Transformation {
    /// Kind tag of the wrapped transformation.
    pub fn kind(&self) -> TransformKind {
        fn kind_of<T: Transform>(_: &T) -> TransformKind {
            T::KIND
        }
        dispatch!(self, t => kind_of(t))
    }

    /// Statements concerned by this transformation.
    pub fn comps(&self) -> &[String] {
        dispatch!(self, t => t.comps())
    }

    /// See [`Transform::verify_conditions`].
    pub fn verify_conditions(&self, tree: &IterationTree) -> Result<(), TransformError> {
        dispatch!(self, t => t.verify_conditions(tree))
    }

    /// See [`Transform::render`].
    pub fn render(&self, tree: &IterationTree) -> Result<Rendering, TransformError> {
        dispatch!(self, t => t.render(tree))
    }

    /// See [`Transform::transform_tree`].
    pub fn transform_tree(&self, tree: &mut IterationTree) -> Result<(), TransformError> {
        dispatch!(self, t => t.transform_tree(tree))
    }

    /// Verify, render and mutate, rendering after the mutation for the kinds
    /// whose code depends on the resulting statement order.
    ///
    /// Once verification passed, any failure is reported as
    /// [`TransformErrorKind::Internal`].
    pub fn apply(&self, tree: &mut IterationTree) -> Result<Rendering, TransformError> {
        self.verify_conditions(tree)?;
        if self.kind().renders_after_mutation() {
            self.mutate(tree)?;
            self.render(tree).map_err(|err| self.defect(err))
        } else {
            let rendering = self.render(tree).map_err(|err| self.defect(err))?;
            self.mutate(tree)?;
            Ok(rendering)
        }
    }

    fn mutate(&self, tree: &mut IterationTree) -> Result<(), TransformError> {
        self.transform_tree(tree).map_err(|err| self.defect(err))
    }

    fn defect(&self, err: TransformError) -> TransformError {
        error!("{} failed after verification: {}", self.kind(), err.message);
        match err.kind {
            TransformErrorKind::Internal => err,
            _ => TransformError::internal(self.kind().name(), err.message),
        }
    }
}

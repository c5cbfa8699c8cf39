//! Generic matrix transformation.
//!
//! A square integer matrix remapping the loop coordinates of one statement.
//! The matrix is handed to the backend as is: the tree is left untouched and
//! no candidates are proposed.

use crate::tree::IterationTree;
use crate::transform::{format_names, Rendering, Transform, TransformKind};
use crate::utils::errors::TransformError;
use crate::utils::matrix::TransformMatrix;

/// Matrix transformation of a single statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixTransform {
    /// Coordinate remapping
    pub matrix: TransformMatrix,
    comps: Vec<String>,
}

impl MatrixTransform {
    /// Create from row-major coefficients.
    pub fn new(params: &[i64], comps: Vec<String>, tree: &IterationTree) -> Result<Self, TransformError> {
        let matrix = TransformMatrix::from_flat(params).ok_or_else(|| {
            TransformError::malformed(
                Self::KIND.name(),
                format!("{} coefficients do not form a square matrix", params.len()),
            )
        })?;
        Self::from_matrix(matrix, comps, tree)
    }

    /// Create from an already built matrix.
    pub fn from_matrix(
        matrix: TransformMatrix,
        comps: Vec<String>,
        tree: &IterationTree,
    ) -> Result<Self, TransformError> {
        let [comp] = comps.as_slice() else {
            return Err(TransformError::malformed(
                Self::KIND.name(),
                format!("a matrix transformation targets exactly one statement, got {}", comps.len()),
            ));
        };
        if !tree.contains_computation(comp) {
            return Err(TransformError::malformed(Self::KIND.name(), format!("unknown statement `{comp}`")));
        }
        Ok(Self { matrix, comps })
    }
}

impl Transform for MatrixTransform {
    type Candidates = ();
    const KIND: TransformKind = TransformKind::Matrix;

    fn candidates(_tree: &IterationTree) -> Self::Candidates {}

    fn comps(&self) -> &[String] {
        &self.comps
    }

    fn verify_conditions(&self, tree: &IterationTree) -> Result<(), TransformError> {
        match self.comps.iter().find(|comp| !tree.contains_computation(comp)) {
            Some(comp) => Err(TransformError::cannot_apply(
                Self::KIND.name(),
                format!("statement `{comp}` no longer exists"),
            )),
            None => Ok(()),
        }
    }

    fn render(&self, _tree: &IterationTree) -> Result<Rendering, TransformError> {
        let matrix = &self.matrix;
        let backend: String = self
            .comps
            .iter()
            .map(|comp| format!("{comp}.matrix_transform({matrix});\n"))
            .collect();
        let coefficients: Vec<String> = matrix.to_flat().iter().map(i64::to_string).collect();
        let canonical = format!(
            "M([{}],comps={})",
            coefficients.join(", "),
            format_names(&self.comps)
        );
        Ok(Rendering::plain(backend, canonical))
    }

    fn transform_tree(&self, _tree: &mut IterationTree) -> Result<(), TransformError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::samples;

    #[test]
    fn test_matrix_render() {
        let tree = samples::perfect_nest(&[8, 8]).unwrap();
        let t = MatrixTransform::new(&[0, 1, 1, 0], vec!["comp00".to_string()], &tree).unwrap();
        t.verify_conditions(&tree).unwrap();
        let rendering = t.render(&tree).unwrap();
        assert_eq!(rendering.backend, "comp00.matrix_transform({{0,1},{1,0}});\n");
        assert_eq!(rendering.canonical, "M([0, 1, 1, 0],comps=['comp00'])");
    }

    #[test]
    fn test_matrix_leaves_tree_unchanged() {
        let original = samples::perfect_nest(&[8, 8]).unwrap();
        let mut tree = original.clone();
        let t = MatrixTransform::from_matrix(TransformMatrix::from_flat(&[1, 0, 0, 1]).unwrap(), vec!["comp00".to_string()], &tree).unwrap();
        t.transform_tree(&mut tree).unwrap();
        assert_eq!(tree, original);
    }

    #[test]
    fn test_matrix_rejects_bad_parameters() {
        let tree = samples::nested_sections().unwrap();
        let one = vec!["comp01".to_string()];
        assert!(!MatrixTransform::new(&[1, 0, 0], one.clone(), &tree).unwrap_err().is_recoverable());
        assert!(MatrixTransform::new(&[], one, &tree).is_err());
        let two = vec!["comp01".to_string(), "comp03".to_string()];
        assert!(MatrixTransform::new(&[1], two, &tree).is_err());
        assert!(MatrixTransform::new(&[1], vec!["nope".to_string()], &tree).is_err());
    }
}

//! Small sample programs shared by the unit tests.
//!
//! Each function returns a freshly built tree.

use crate::tree::{IterationTree, TreeBuilder};
use crate::utils::errors::TreeError;

/// Branching nest with statements at three depths.
///
/// ```text
/// root ── i (comp01)
///      └─ j ── k ── l (comp03)
///                └─ m (comp04)
/// ```
pub fn nested_sections() -> Result<IterationTree, TreeError> {
    TreeBuilder::new()
        .root("root", 0, 10)
        .iterator("i", "root", 0, 10)
        .iterator("j", "root", 0, 10)
        .iterator("k", "j", 0, 10)
        .iterator("l", "k", 0, 10)
        .iterator("m", "k", 0, 10)
        .computation("comp01", "i")
        .computation("comp03", "l")
        .computation("comp04", "m")
        .build()
}

/// Four root nests, one statement each.
///
/// ```text
/// i   ── j   (A_hat)
/// i_0 ── j_0 (x_temp)
/// i_1        (x)
/// i_2 ── j_1 (w)
/// ```
pub fn multiple_roots() -> Result<IterationTree, TreeError> {
    TreeBuilder::new()
        .root("i", 0, 64)
        .iterator("j", "i", 0, 64)
        .root("i_0", 0, 64)
        .iterator("j_0", "i_0", 0, 64)
        .root("i_1", 0, 64)
        .root("i_2", 0, 64)
        .iterator("j_1", "i_2", 0, 64)
        .computation("A_hat", "j")
        .computation("x_temp", "j_0")
        .computation("x", "i_1")
        .computation("w", "j_1")
        .build()
}

/// Two-deep nest with a long outer loop, for unrolling.
///
/// ```text
/// i0 [0, 768) ── i1 [0, 16) (comp00)
/// ```
pub fn unroll_nest() -> Result<IterationTree, TreeError> {
    TreeBuilder::new()
        .root("i0", 0, 768)
        .iterator("i1", "i0", 0, 16)
        .computation("comp00", "i1")
        .build()
}

/// Node holding three statements and a child loop, for distribution.
///
/// ```text
/// root ── i (comp01)
///      └─ j (comp05, comp06, comp07) ── k (comp08, comp09)
/// ```
pub fn distributable() -> Result<IterationTree, TreeError> {
    TreeBuilder::new()
        .root("root", 0, 10)
        .iterator("i", "root", 0, 10)
        .iterator("j", "root", 0, 256)
        .iterator("k", "j", 0, 10)
        .computation("comp01", "i")
        .computation("comp05", "j")
        .computation("comp06", "j")
        .computation("comp07", "j")
        .computation("comp08", "k")
        .computation("comp09", "k")
        .build()
}

/// Perfect nest `i0 -> i1 -> ... ` with one statement in the innermost loop.
pub fn perfect_nest(extents: &[i64]) -> Result<IterationTree, TreeError> {
    let mut builder = TreeBuilder::new();
    for (depth, extent) in extents.iter().enumerate() {
        let name = format!("i{depth}");
        builder = if depth == 0 {
            builder.root(&name, 0, *extent)
        } else {
            builder.iterator(&name, &format!("i{}", depth - 1), 0, *extent)
        };
    }
    let innermost = format!("i{}", extents.len().saturating_sub(1));
    builder.computation("comp00", &innermost).build()
}

/// Triangular nest whose inner bound depends on the outer loop.
///
/// ```text
/// i [0, N) ── j [0, i) (tri)
/// ```
pub fn triangular() -> Result<IterationTree, TreeError> {
    TreeBuilder::new()
        .root("i", 0, "N")
        .iterator("j", "i", 0, "i")
        .computation("tri", "j")
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_nest_shape() {
        let tree = perfect_nest(&[32, 64, 128]).unwrap();
        assert_eq!(tree.roots(), &["i0"]);
        assert_eq!(tree.iterator("i2").unwrap().computations_list, vec!["comp00"]);
        assert_eq!(tree.iterator("i1").unwrap().extent(), Some(64));
    }

    #[test]
    fn test_multiple_roots_order() {
        let tree = multiple_roots().unwrap();
        assert_eq!(tree.roots(), &["i", "i_0", "i_1", "i_2"]);
        assert_eq!(tree.computations(), &["A_hat", "x_temp", "x", "w"]);
    }
}

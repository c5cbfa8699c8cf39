//! Square integer matrices describing affine loop remappings.
//!
//! Coefficients are stored in a `nalgebra` matrix. The only validation is
//! squareness; the backend owns the meaning of the coefficients.

use nalgebra::DMatrix;
use num_integer::Roots;
use std::fmt;

/// A square matrix with integer entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformMatrix {
    data: DMatrix<i64>,
}

impl TransformMatrix {
    /// Build from row-major coefficients. Returns `None` unless their count
    /// is a non-zero perfect square.
    pub fn from_flat(values: &[i64]) -> Option<Self> {
        let n = values.len().sqrt();
        if n == 0 || n * n != values.len() {
            return None;
        }
        Some(Self { data: DMatrix::from_row_slice(n, n, values) })
    }

    /// Number of rows (and columns).
    pub fn size(&self) -> usize {
        self.data.nrows()
    }

    /// Row-major coefficients.
    pub fn to_flat(&self) -> Vec<i64> {
        let n = self.size();
        (0..n).flat_map(|i| (0..n).map(move |j| (i, j))).map(|ij| self.data[ij]).collect()
    }
}

/// Brace-nested rows, `{{1,0},{0,1}}`.
impl fmt::Display for TransformMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.size();
        write!(f, "{{")?;
        for i in 0..n {
            if i > 0 {
                write!(f, ",")?;
            }
            let row: Vec<String> = (0..n).map(|j| self.data[(i, j)].to_string()).collect();
            write!(f, "{{{}}}", row.join(","))?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_flat() {
        let m = TransformMatrix::from_flat(&[1, 2, 3, 4]).unwrap();
        assert_eq!(m.size(), 2);
        assert_eq!(m.to_flat(), vec![1, 2, 3, 4]);
        assert!(TransformMatrix::from_flat(&[1, 2, 3]).is_none());
        assert!(TransformMatrix::from_flat(&[]).is_none());
    }

    #[test]
    fn test_display() {
        let identity = TransformMatrix::from_flat(&[1, 0, 0, 1]).unwrap();
        assert_eq!(identity.to_string(), "{{1,0},{0,1}}");
        let m = TransformMatrix::from_flat(&[0, -1, 1, 0]).unwrap();
        assert_eq!(m.to_string(), "{{0,-1},{1,0}}");
    }
}

//! # looptree - Iteration Trees and Loop Transformations
//!
//! A model of the loop-nest structure of a numerical program plus an engine
//! that rewrites it, meant to sit under a schedule search:
//! - Iteration tree of loops, bounds and statements with a global statement order
//! - Ten structural transformations (interchange, reversal, skewing, tiling,
//!   unrolling, fusion, distribution, parallelization, matrix)
//! - Schedules with a canonical string form that round-trips
//! - A boundary trait for the external legality/execution oracle
//!
//! ## Architecture
//!
//! ```text
//! loader → IterationTree → Schedule::add(Transformation) → canonical string / backend code → oracle
//! ```
//!
//! ## Example
//!
//! ```rust
//! use looptree::prelude::*;
//!
//! let tree = TreeBuilder::new()
//!     .root("i", 0, 1024)
//!     .iterator("j", "i", 0, 1024)
//!     .computation("C", "j")
//!     .build()?;
//!
//! let mut schedule = Schedule::new(tree);
//! let tiling = Tiling2D::new("i", "j", [32, 32], schedule.tree())?;
//! schedule.add(tiling)?;
//! let parallel = Parallelization::new(("C", 0), schedule.tree())?;
//! schedule.add(parallel)?;
//!
//! let text = schedule.to_canonical_string();
//! assert_eq!(text, "T2(L0,L1,32,32,comps=['C'])|P(L0,comps=['C'])");
//! let replayed = Schedule::from_canonical_string(schedule.source().clone(), &text)?;
//! assert_eq!(replayed.tree(), schedule.tree());
//! # Ok::<(), looptree::LoopTreeError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod oracle;
pub mod schedule;
pub mod transform;
pub mod tree;
pub mod utils;

pub use utils::errors::{LoopTreeError, LoopTreeResult};

// Re-export commonly used types
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::oracle::LegalityOracle;
    pub use crate::schedule::{Legality, Schedule, ScheduleConfig};
    pub use crate::transform::{
        Distribution, Fusion, Interchange, IteratorId, MatrixTransform, Parallelization, Rendering,
        Reversal, Skewing, Tiling2D, Tiling3D, Transform, TransformKind, Transformation, Unrolling,
    };
    pub use crate::tree::{Bound, IterationTree, IteratorNode, TreeBuilder};
    pub use crate::utils::errors::*;
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Atom selection language.
//!
//! A compact VMD-style query language over the topology: `name CA and
//! resid 1-50`, `resname TIP3 or water`, `not hydrogen`, `charge < -0.5`,
//! `within 0.5 of resname LIG`. Selections evaluate against topology
//! attributes only; the one exception is `within`, which measures distances
//! in the current frame and therefore must be re-evaluated per frame.
//!
//! # Examples
//!
//! ```ignore
//! let indices = select(&topology, "name CA and resid 1-50")?;
//! let near = select_with_positions(&topology, "within 0.5 of resname LIG", &frame.positions)?;
//! ```

pub mod ast;
pub mod error;
pub mod eval;
pub mod keywords;
pub mod parser;
pub mod token;

pub use error::SelectionError;
pub use eval::SelectionContext;

use crate::topology::Topology;

/// Select atoms by expression, topology attributes only.
pub fn select(
    topology: &Topology,
    expression: &str,
) -> std::result::Result<Vec<usize>, SelectionError> {
    SelectionContext::new(topology).eval_str(expression)
}

/// Select atoms by expression with frame positions available, as `within`
/// requires.
pub fn select_with_positions(
    topology: &Topology,
    expression: &str,
    positions: &[f32],
) -> std::result::Result<Vec<usize>, SelectionError> {
    SelectionContext::with_positions(topology, positions).eval_str(expression)
}

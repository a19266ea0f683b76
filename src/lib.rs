//! A trajectory I/O and frame-streaming core for molecular dynamics data.
//!
//! trajan reads heterogeneous binary and text trajectory formats behind one
//! reader contract and exposes them as a lazy, seekable sequence of frames
//! bound to a static topology:
//!
//! - [`Frame`] — one snapshot: positions (nm), optional velocities and
//!   forces, the simulation box, time and step.
//! - [`FormatReader`] implementations for XTC, TRR, DCD, and XYZ, resolved
//!   through the [`Registry`] by extension and magic bytes.
//! - [`TrajectoryStream`] — concatenates files, seeks by global frame index,
//!   discovers frame counts lazily and memoizes them.
//! - [`Topology`] — atoms, residues, segments, bonds, with angles and
//!   dihedrals derived on demand; parsed from PSF.
//! - [`Universe`] — the bound pair of topology and stream, with
//!   `goto`/`current_frame`/`select`.
//!
//! ```no_run
//! use trajan::{ReadConfig, Universe};
//!
//! # fn main() -> trajan::Result<()> {
//! let mut universe = Universe::open(
//!     "protein.psf".as_ref(),
//!     &["equilibration.xtc".into(), "production.xtc".into()],
//!     ReadConfig::default(),
//! )?;
//! let calphas = universe.select("name CA and protein")?;
//! let frame = universe.goto(100)?;
//! let first = frame.position(calphas[0]).unwrap();
//! println!("first C-alpha sits at {first}");
//! # Ok(())
//! # }
//! ```
//!
//! All decoding converts to one canonical precision (`f32`) regardless of
//! the on-disk width. A stream is a single-writer resource: nothing in here
//! locks, and sharing one across threads requires external serialization.
//! Independent universes over the same files are fine; they hold independent
//! handles.

pub mod config;
pub mod error;
pub mod formats;
pub mod frame;
pub mod select;
pub mod stream;
pub mod topology;
pub mod universe;

pub use crate::config::ReadConfig;
pub use crate::error::{Result, SelectionError, TrajError};
pub use crate::formats::{Format, FormatReader, Registry};
pub use crate::frame::{BoxVec, Frame};
pub use crate::stream::{StreamState, TrajectoryStream};
pub use crate::topology::{psf, Topology, TopologyBuilder};
pub use crate::universe::Universe;

//! The top-level handle binding one topology to one trajectory.

use std::path::{Path, PathBuf};

use crate::config::ReadConfig;
use crate::error::{Result, TrajError};
use crate::frame::Frame;
use crate::select::{self, SelectionContext};
use crate::stream::TrajectoryStream;
use crate::topology::{psf, Topology};

/// One topology bound to one (possibly multi-file) trajectory stream.
///
/// The atom counts of both sides are validated at construction; there is no
/// partially constructed Universe. The Universe owns the current frame:
/// [`Universe::goto`] and [`Universe::next_frame`] decode into it, and
/// [`Universe::current_frame`] lazily loads frame 0 on first use.
#[derive(Debug)]
pub struct Universe {
    topology: Topology,
    stream: TrajectoryStream,
    frame: Frame,
    loaded: bool,
}

impl Universe {
    /// Bind an already-parsed topology to trajectory files.
    pub fn new(topology: Topology, files: Vec<PathBuf>, config: ReadConfig) -> Result<Self> {
        let mut stream = TrajectoryStream::new(files, config.clone());
        let trajectory_atoms = stream.n_atoms()?;
        if topology.n_atoms() != trajectory_atoms {
            return Err(TrajError::TopologyMismatch {
                topology: topology.n_atoms(),
                trajectory: trajectory_atoms,
            });
        }
        if topology.n_atoms() == 0 && !config.allow_empty {
            return Err(TrajError::EmptySystem {
                path: PathBuf::from("<topology>"),
            });
        }
        Ok(Self {
            topology,
            stream,
            frame: Frame::default(),
            loaded: false,
        })
    }

    /// Parse a PSF topology and bind it to trajectory files.
    pub fn open(
        topology: &Path,
        trajectories: &[PathBuf],
        config: ReadConfig,
    ) -> Result<Self> {
        let topology = psf::parse(topology)?;
        Self::new(topology, trajectories.to_vec(), config)
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn n_atoms(&self) -> usize {
        self.topology.n_atoms()
    }

    /// Total frames across all trajectory files. Formats that do not store a
    /// count are scanned once; the sum is memoized.
    pub fn frame_count(&mut self) -> Result<usize> {
        self.stream.frame_count()
    }

    /// Jump the cursor to `index` and decode that frame.
    pub fn goto(&mut self, index: usize) -> Result<&Frame> {
        self.stream.seek(index)?;
        if !self.stream.advance(&mut self.frame)? {
            // seek validated the index, so the frame must decode
            return Err(TrajError::IndexOutOfRange {
                index,
                len: self.stream.frame_count()?,
            });
        }
        self.loaded = true;
        Ok(&self.frame)
    }

    /// The decoded snapshot at the cursor, loading frame 0 on first use.
    pub fn current_frame(&mut self) -> Result<&Frame> {
        if !self.loaded {
            self.goto(0)?;
        }
        Ok(&self.frame)
    }

    /// Advance to the next frame, `Ok(None)` once the stream is exhausted.
    pub fn next_frame(&mut self) -> Result<Option<&Frame>> {
        if self.stream.advance(&mut self.frame)? {
            self.loaded = true;
            Ok(Some(&self.frame))
        } else {
            Ok(None)
        }
    }

    /// Evaluate an atom selection, returning sorted atom indices.
    ///
    /// Attribute-only selections depend on nothing but the topology.
    /// Positional selections (`within`) measure the current frame and must
    /// be re-evaluated after the cursor moves; calling this without a loaded
    /// frame fails for them.
    pub fn select(&self, expression: &str) -> Result<Vec<usize>> {
        let context = if self.loaded {
            SelectionContext::with_positions(&self.topology, &self.frame.positions)
        } else {
            SelectionContext::new(&self.topology)
        };
        Ok(context.eval_str(expression)?)
    }

    /// Evaluate an attribute-only selection, ignoring any loaded frame.
    pub fn select_static(&self, expression: &str) -> Result<Vec<usize>> {
        Ok(select::select(&self.topology, expression)?)
    }

    /// Release the trajectory readers. The topology stays available; frame
    /// access after closing fails.
    pub fn close(&mut self) {
        self.stream.close();
    }
}

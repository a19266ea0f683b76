//! The per-frame coordinate buffer.

use glam::{Mat3, Vec3};

/// The simulation box, stored as three column vectors.
pub type BoxVec = Mat3;

/// One simulation snapshot.
///
/// Positions are stored as a flat array of `x y z` triplets in nanometers,
/// `positions.len() == 3 * n_atoms`. Velocities and forces are optional and,
/// when present, have the same length as `positions`.
///
/// A `Frame` is owned by whichever stream most recently decoded into it and
/// is overwritten on the next advance. Callers that need a snapshot to
/// persist across reads should clone it.
#[derive(Debug, Default, Clone)]
pub struct Frame {
    /// Simulation step counter as recorded in the file.
    pub step: u64,
    /// Time in picoseconds.
    pub time: f32,
    pub boxvec: BoxVec,
    /// Quantization precision the positions were stored with, if the format
    /// records one (XTC does, others leave the default).
    pub precision: f32,
    /// Global frame index within the stream that produced this frame.
    pub index: usize,
    pub positions: Vec<f32>,
    pub velocities: Option<Vec<f32>>,
    pub forces: Option<Vec<f32>>,
}

impl Frame {
    /// Number of atoms held by this frame.
    pub fn n_atoms(&self) -> usize {
        self.positions.len() / 3
    }

    /// Iterate over positions as [`Vec3`]s.
    pub fn coords(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.positions
            .chunks_exact(3)
            .map(|c| Vec3::new(c[0], c[1], c[2]))
    }

    /// Iterate over velocities as [`Vec3`]s, if the frame carries them.
    pub fn velocity_coords(&self) -> Option<impl Iterator<Item = Vec3> + '_> {
        self.velocities
            .as_deref()
            .map(|v| v.chunks_exact(3).map(|c| Vec3::new(c[0], c[1], c[2])))
    }

    /// Iterate over forces as [`Vec3`]s, if the frame carries them.
    pub fn force_coords(&self) -> Option<impl Iterator<Item = Vec3> + '_> {
        self.forces
            .as_deref()
            .map(|f| f.chunks_exact(3).map(|c| Vec3::new(c[0], c[1], c[2])))
    }

    /// Position of one atom.
    ///
    /// Returns `None` when `index` is beyond the frame's atom count.
    pub fn position(&self, index: usize) -> Option<Vec3> {
        let c = self.positions.get(index * 3..index * 3 + 3)?;
        Some(Vec3::new(c[0], c[1], c[2]))
    }

    /// Resize the position buffer for `n_atoms` and drop any stale velocity
    /// and force arrays. Readers call this before decoding into the frame.
    pub(crate) fn reset(&mut self, n_atoms: usize) {
        self.positions.clear();
        self.positions.resize(n_atoms * 3, 0.0);
        self.velocities = None;
        self.forces = None;
    }

    /// Like [`Frame::reset`], but also prepares velocity and force buffers as
    /// requested by the decoded header.
    pub(crate) fn reset_with(&mut self, n_atoms: usize, velocities: bool, forces: bool) {
        self.reset(n_atoms);
        if velocities {
            self.velocities = Some(vec![0.0; n_atoms * 3]);
        }
        if forces {
            self.forces = Some(vec![0.0; n_atoms * 3]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coords_chunks_positions() {
        let frame = Frame {
            positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            ..Frame::default()
        };
        assert_eq!(frame.n_atoms(), 3);
        let coords: Vec<Vec3> = frame.coords().collect();
        assert_eq!(coords[1], Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(frame.position(2), Some(Vec3::new(0.0, 1.0, 0.0)));
        assert_eq!(frame.position(3), None);
    }

    #[test]
    fn reset_discards_extras() {
        let mut frame = Frame::default();
        frame.reset_with(2, true, false);
        assert_eq!(frame.positions.len(), 6);
        assert!(frame.velocities.is_some());
        assert!(frame.forces.is_none());

        frame.reset(4);
        assert_eq!(frame.positions.len(), 12);
        assert!(frame.velocities.is_none());
    }
}

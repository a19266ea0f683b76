//! Shared helpers for the integration tests: self-cleaning temp files and
//! synthetic frames. Trajectories are generated by the crate's own writers
//! instead of committed binary fixtures.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use trajan::Frame;

/// Monotonic counter making every temp path unique within the process, so
/// tests that request the same logical name do not collide when run in
/// parallel (one test's `Drop` would otherwise delete another's file).
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// A temp-dir path that removes itself when dropped.
pub struct TempFile(pub PathBuf);

impl TempFile {
    pub fn new(name: &str) -> Self {
        let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let mut path = std::env::temp_dir();
        path.push(format!("trajan-test-{}-{}-{}", std::process::id(), seq, name));
        Self(path)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        std::fs::remove_file(&self.0).ok();
    }
}

/// A deterministic, frame-dependent position cloud.
pub fn sample_positions(n_atoms: usize, index: usize) -> Vec<f32> {
    (0..n_atoms * 3)
        .map(|i| ((i + 7 * index) as f32 * 0.61).sin() * 3.0 + i as f32 * 0.01)
        .collect()
}

pub fn sample_frame(n_atoms: usize, index: usize) -> Frame {
    Frame {
        index,
        step: index as u64 * 50,
        time: index as f32 * 2.0,
        boxvec: trajan::BoxVec::from_diagonal(glam::Vec3::splat(8.0)),
        positions: sample_positions(n_atoms, index),
        ..Frame::default()
    }
}

pub fn assert_close(a: &[f32], b: &[f32], tolerance: f32, context: &str) {
    assert_eq!(a.len(), b.len(), "{context}: length mismatch");
    for (i, (x, y)) in a.iter().zip(b).enumerate() {
        assert!(
            (x - y).abs() <= tolerance,
            "{context}: element {i} differs: {x} vs {y} (tolerance {tolerance})"
        );
    }
}

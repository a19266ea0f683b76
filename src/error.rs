//! Error handling for the trajan library.
//!
//! One crate-wide error enum covers registry dispatch, header validation,
//! per-frame decoding, seeking, and topology binding. End of iteration is not
//! an error: readers and streams signal it by returning `Ok(None)` or
//! `Ok(false)` from their advance calls.

use std::path::PathBuf;

use thiserror::Error;

pub use crate::select::SelectionError;

/// A specialized `Result` type for trajectory operations.
pub type Result<T> = std::result::Result<T, TrajError>;

/// Error types for trajectory and topology operations.
///
/// Variants carry enough context (file path, byte offset, frame index) for
/// diagnosis; nothing is swallowed internally.
#[derive(Error, Debug)]
pub enum TrajError {
    /// I/O error from the underlying file, map, or stream.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// Compression/decompression error from niffler.
    #[error("compression error")]
    Niffler(#[from] niffler::Error),

    /// The registry could not match any reader to the file.
    #[error("no reader matches {path:?} (unrecognized extension and magic bytes)")]
    UnsupportedFormat { path: PathBuf },

    /// The file header failed validation.
    ///
    /// Fatal to `open`; a reader is never handed out in a partially
    /// initialized state.
    #[error("corrupt {format} header in {path:?}: {detail}")]
    CorruptHeader {
        path: PathBuf,
        format: &'static str,
        detail: String,
    },

    /// The header parsed but declares a format revision this reader does not
    /// understand.
    #[error("unsupported {format} version in {path:?}: found {found}")]
    UnsupportedVersion {
        path: PathBuf,
        format: &'static str,
        found: i64,
    },

    /// A frame payload failed to parse (truncated file, invalid field).
    ///
    /// Aborts the current read but leaves the reader open so callers may
    /// retry, seek elsewhere, or close.
    #[error("failed to decode frame {frame} of {path:?} near byte {offset}: {detail}")]
    Decode {
        path: PathBuf,
        frame: usize,
        offset: u64,
        detail: String,
    },

    /// Backward or random seek on a forward-only source.
    #[error("seeking is not supported by the forward-only reader for {path:?}")]
    SeekUnsupported { path: PathBuf },

    /// Seek or goto beyond the known frame count.
    #[error("frame index {index} out of range (the trajectory holds {len} frames)")]
    IndexOutOfRange { index: usize, len: usize },

    /// Atom-count disagreement at bind time, or between concatenated files.
    #[error("topology binds {topology} atoms but trajectory frames carry {trajectory}")]
    TopologyMismatch { topology: usize, trajectory: usize },

    /// A zero-atom system was rejected by configuration.
    #[error("{path:?} declares zero atoms (set ReadConfig::allow_empty to permit)")]
    EmptySystem { path: PathBuf },

    /// The topology file failed to parse.
    #[error("failed to parse topology {path:?} at line {line}: {detail}")]
    TopologyParse {
        path: PathBuf,
        line: usize,
        detail: String,
    },

    /// A frame buffer cannot be written in the requested format.
    #[error("cannot encode frame in {format} format: {detail}")]
    Encode {
        format: &'static str,
        detail: String,
    },

    /// An atom selection expression failed to parse or evaluate.
    #[error(transparent)]
    Selection(#[from] SelectionError),
}

impl TrajError {
    /// True for the variants that indicate a malformed or unrecognized file,
    /// as opposed to I/O failures or caller mistakes.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            TrajError::UnsupportedFormat { .. }
                | TrajError::CorruptHeader { .. }
                | TrajError::UnsupportedVersion { .. }
                | TrajError::Decode { .. }
        )
    }
}

//! Format readers and the dispatch machinery around them.
//!
//! Every on-disk trajectory format implements [`FormatReader`]: parse the
//! header at `open` time, decode frames on demand, seek when the layout
//! allows it. The [`registry`] maps paths to the right reader variant.

use std::path::Path;

use crate::error::Result;
use crate::frame::Frame;

pub mod dcd;
pub mod registry;
pub mod source;
pub mod trr;
pub mod xdr;
pub mod xtc;
pub mod xyz;

pub use registry::{Format, Registry};
pub use source::ByteSource;

/// The uniform per-format reader contract.
///
/// A reader is fully initialized when `open` returns: header validated, atom
/// count known. Header failures never hand out a partially constructed
/// reader. Frame decode failures abort the current call but leave the reader
/// open for retries or seeks. Dropping a reader releases its byte source;
/// there is no separate close call to forget.
pub trait FormatReader: Send + std::fmt::Debug {
    /// The file this reader decodes.
    fn path(&self) -> &Path;

    /// Atoms per frame, fixed by the header for the life of the reader.
    fn n_atoms(&self) -> usize;

    /// Total frame count if already known, without doing any work.
    ///
    /// Headers that store the count (DCD) know it up front; others learn it
    /// from [`FormatReader::n_frames`] and remember.
    fn n_frames_hint(&self) -> Option<usize>;

    /// Total frame count, discovered by a one-time sequential scan when the
    /// header does not store it. Memoized; repeated calls are cheap.
    fn n_frames(&mut self) -> Result<usize>;

    /// Decode the next frame into `frame` and advance the cursor.
    ///
    /// Returns `Ok(false)` at end of stream, in which case `frame` contents
    /// are unspecified. `frame.index` is set to the local frame index.
    fn read_frame(&mut self, frame: &mut Frame) -> Result<bool>;

    /// Position the cursor so the next [`FormatReader::read_frame`] decodes
    /// frame `index`.
    ///
    /// Fails with `IndexOutOfRange` past the end and with `SeekUnsupported`
    /// on forward-only sources.
    fn seek_frame(&mut self, index: usize) -> Result<()>;

    /// Whether this reader can seek at all.
    fn supports_random_access(&self) -> bool;

    /// Rewind to frame 0. Equivalent to `seek_frame(0)`.
    fn rewind(&mut self) -> Result<()> {
        self.seek_frame(0)
    }
}

/// Open `path` as the given format, bypassing the registry.
pub fn open_as(path: &Path, format: Format, config: &crate::ReadConfig) -> Result<Box<dyn FormatReader>> {
    match format {
        Format::Xtc => Ok(Box::new(xtc::XtcReader::open(path, config)?)),
        Format::Trr => Ok(Box::new(trr::TrrReader::open(path, config)?)),
        Format::Dcd => Ok(Box::new(dcd::DcdReader::open(path, config)?)),
        Format::Xyz => Ok(Box::new(xyz::XyzReader::open(path, config)?)),
    }
}

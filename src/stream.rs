//! The lazy, seekable frame stream.
//!
//! A [`TrajectoryStream`] strings one or more files of a single trajectory
//! into one sequence of frames. Files share an atom count (checked when each
//! is first opened) and are opened lazily: nothing touches the disk until
//! the first access, and crossing a file boundary closes the finished reader
//! before opening the next.
//!
//! States run `Unopened → Open → Closed`, with `Closed` terminal. Within
//! `Open`, exhaustion is the cursor sitting at the total frame count;
//! `advance` returns `Ok(false)` there, and seeks or `rewind` leave it.
//! Per-file frame counts are discovered at most once and memoized, so the
//! global-to-local index mapping costs one cumulative sum.

use std::io;
use std::path::PathBuf;

use crate::config::ReadConfig;
use crate::error::{Result, TrajError};
use crate::formats::{FormatReader, Registry};
use crate::frame::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Unopened,
    Open,
    Closed,
}

#[derive(Debug)]
pub struct TrajectoryStream {
    files: Vec<PathBuf>,
    registry: Registry,
    config: ReadConfig,
    state: StreamState,
    /// Atoms per frame, fixed by the first file opened.
    n_atoms: Option<usize>,
    /// The open reader and which file it reads.
    current: Option<(usize, Box<dyn FormatReader>)>,
    /// Global index of the current file's first frame.
    base: usize,
    /// Global index of the next frame `advance` will produce.
    cursor: usize,
    /// Per-file frame counts, discovered lazily.
    counts: Vec<Option<usize>>,
    /// Memoized total across all files.
    total: Option<usize>,
}

impl TrajectoryStream {
    /// A stream over `files` using the built-in formats.
    pub fn new(files: Vec<PathBuf>, config: ReadConfig) -> Self {
        Self::with_registry(files, config, Registry::with_defaults())
    }

    pub fn with_registry(files: Vec<PathBuf>, config: ReadConfig, registry: Registry) -> Self {
        let counts = vec![None; files.len()];
        Self {
            files,
            registry,
            config,
            state: StreamState::Unopened,
            n_atoms: None,
            current: None,
            base: 0,
            cursor: 0,
            counts,
            total: None,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Global index of the next frame `advance` will produce.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// True once the cursor has moved past the last frame.
    pub fn exhausted(&self) -> bool {
        self.state == StreamState::Open && self.total == Some(self.cursor)
    }

    fn closed_err(&self) -> TrajError {
        TrajError::Io(io::Error::new(
            io::ErrorKind::NotConnected,
            "the stream has been closed",
        ))
    }

    /// Open `ordinal`, closing whatever was open before, and check that its
    /// atom count agrees with the rest of the stream.
    fn open_file(&mut self, ordinal: usize) -> Result<()> {
        // Dropping the previous reader releases its byte source.
        self.current = None;
        let reader = self.registry.open(&self.files[ordinal], &self.config)?;
        match self.n_atoms {
            None => self.n_atoms = Some(reader.n_atoms()),
            Some(expected) if expected != reader.n_atoms() => {
                return Err(TrajError::TopologyMismatch {
                    topology: expected,
                    trajectory: reader.n_atoms(),
                });
            }
            Some(_) => {}
        }
        if let Some(hint) = reader.n_frames_hint() {
            self.counts[ordinal] = Some(hint);
        }
        self.current = Some((ordinal, reader));
        self.state = StreamState::Open;
        Ok(())
    }

    fn ensure_open(&mut self) -> Result<()> {
        match self.state {
            StreamState::Closed => Err(self.closed_err()),
            StreamState::Open => Ok(()),
            StreamState::Unopened => {
                if self.files.is_empty() {
                    return Err(TrajError::UnsupportedFormat {
                        path: PathBuf::from("<no trajectory files>"),
                    });
                }
                self.open_file(0)?;
                self.base = 0;
                self.cursor = 0;
                Ok(())
            }
        }
    }

    /// Atoms per frame. Opens the first file if nothing is open yet.
    pub fn n_atoms(&mut self) -> Result<usize> {
        if self.n_atoms.is_none() {
            self.ensure_open()?;
        }
        Ok(self.n_atoms.unwrap())
    }

    /// Frame count of one file, discovered at most once.
    fn file_count(&mut self, ordinal: usize) -> Result<usize> {
        if let Some(count) = self.counts[ordinal] {
            return Ok(count);
        }
        if let Some((current, reader)) = self.current.as_mut() {
            if *current == ordinal {
                let count = reader.n_frames()?;
                self.counts[ordinal] = Some(count);
                return Ok(count);
            }
        }
        let mut reader = self.registry.open(&self.files[ordinal], &self.config)?;
        let count = reader.n_frames()?;
        self.counts[ordinal] = Some(count);
        Ok(count)
    }

    /// Total frames across all files. May trigger one scan per file; the
    /// result is memoized.
    pub fn frame_count(&mut self) -> Result<usize> {
        if self.state == StreamState::Closed {
            return Err(self.closed_err());
        }
        if let Some(total) = self.total {
            return Ok(total);
        }
        let mut total = 0;
        for ordinal in 0..self.files.len() {
            total += self.file_count(ordinal)?;
        }
        self.total = Some(total);
        Ok(total)
    }

    /// Decode the next frame. `Ok(false)` at the end of the last file.
    ///
    /// A decode failure aborts this call but leaves the stream open, so the
    /// caller may retry, seek elsewhere, or close.
    pub fn advance(&mut self, frame: &mut Frame) -> Result<bool> {
        self.ensure_open()?;
        if self.current.is_none() {
            // A failed open at a file boundary left no reader behind;
            // re-resolve the cursor so the caller's retry can proceed.
            match self.seek(self.cursor) {
                Ok(()) => {}
                Err(TrajError::IndexOutOfRange { .. }) => return Ok(false),
                Err(err) => return Err(err),
            }
        }
        loop {
            let (ordinal, reader) = self.current.as_mut().expect("open stream has a reader");
            let ordinal = *ordinal;
            if reader.read_frame(frame)? {
                frame.index = self.cursor;
                self.cursor += 1;
                return Ok(true);
            }

            // This file is done; its count is now exact.
            self.counts[ordinal] = Some(self.cursor - self.base);
            if ordinal + 1 < self.files.len() {
                self.open_file(ordinal + 1)?;
                self.base = self.cursor;
            } else {
                self.total = Some(self.cursor);
                return Ok(false);
            }
        }
    }

    /// Position the cursor on global frame `index`.
    ///
    /// Maps the global index to (file ordinal, local index) via the
    /// cumulative per-file counts, discovering counts as needed.
    pub fn seek(&mut self, index: usize) -> Result<()> {
        if self.state == StreamState::Closed {
            return Err(self.closed_err());
        }
        let mut acc = 0;
        for ordinal in 0..self.files.len() {
            let count = self.file_count(ordinal)?;
            if index < acc + count {
                let already_open = matches!(&self.current, Some((current, _)) if *current == ordinal);
                if !already_open {
                    self.open_file(ordinal)?;
                }
                let (_, reader) = self.current.as_mut().expect("just opened");
                reader.seek_frame(index - acc)?;
                self.base = acc;
                self.cursor = index;
                self.state = StreamState::Open;
                return Ok(());
            }
            acc += count;
        }
        self.total = Some(acc);
        Err(TrajError::IndexOutOfRange { index, len: acc })
    }

    /// Back to frame 0, the one valid continuation besides `close` once the
    /// stream is exhausted.
    pub fn rewind(&mut self) -> Result<()> {
        self.seek(0)
    }

    /// Release the open reader. Terminal and idempotent.
    pub fn close(&mut self) {
        self.current = None;
        self.state = StreamState::Closed;
    }
}

impl Drop for TrajectoryStream {
    fn drop(&mut self) {
        self.close();
    }
}

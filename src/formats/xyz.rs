//! XYZ text trajectories.
//!
//! Each frame is an atom-count line, a comment line, and one `name x y z`
//! line per atom. Plain files support random access through a lazily built
//! index of frame start offsets; gzip/zstd files stream through niffler and
//! are forward-only, so seeks on them fail with `SeekUnsupported`.
//!
//! XYZ carries no box information; frames read from it have a zero box.

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::ReadConfig;
use crate::error::{Result, TrajError};
use crate::formats::registry::is_compressed_path;
use crate::formats::source::ByteSource;
use crate::formats::FormatReader;
use crate::frame::{BoxVec, Frame};

#[derive(Debug)]
pub struct XyzReader {
    path: PathBuf,
    source: ByteSource,
    n_atoms: usize,
    cursor: usize,
    offsets: Option<Box<[u64]>>,
    /// Atom count consumed while probing a forward-only source.
    pending: Option<usize>,
}

fn next_line(source: &mut ByteSource) -> io::Result<Option<String>> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match source.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => {
                if byte[0] == b'\n' {
                    break;
                }
                buf.push(byte[0]);
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    if buf.is_empty() && byte[0] != b'\n' {
        return Ok(None);
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

/// Read lines until a non-blank one appears, `None` at end of input.
fn next_content_line(source: &mut ByteSource) -> io::Result<Option<(u64, String)>> {
    loop {
        let at = source.position();
        match next_line(source)? {
            None => return Ok(None),
            Some(line) if line.trim().is_empty() => continue,
            Some(line) => return Ok(Some((at, line))),
        }
    }
}

/// Pull a `key= value` float out of a comment line.
fn comment_field(comment: &str, key: &str) -> Option<f64> {
    let mut tokens = comment.split_whitespace().peekable();
    while let Some(token) = tokens.next() {
        if let Some(rest) = token.strip_prefix(key) {
            let value = if rest.is_empty() {
                tokens.next()?
            } else {
                rest
            };
            return value.parse().ok();
        }
    }
    None
}

impl XyzReader {
    pub fn open(path: &Path, config: &ReadConfig) -> Result<Self> {
        let source = if is_compressed_path(path) {
            ByteSource::open_compressed(path)?
        } else {
            ByteSource::open(path, config)?
        };
        Self::from_source(path.to_path_buf(), source, config)
    }

    pub(crate) fn from_source(
        path: PathBuf,
        mut source: ByteSource,
        config: &ReadConfig,
    ) -> Result<Self> {
        let line = next_content_line(&mut source)?;
        let n_atoms = match line {
            Some((_, line)) => {
                line.trim()
                    .parse::<usize>()
                    .map_err(|_| TrajError::CorruptHeader {
                        path: path.clone(),
                        format: "XYZ",
                        detail: format!("first line {line:?} is not an atom count"),
                    })?
            }
            None => {
                return Err(TrajError::CorruptHeader {
                    path,
                    format: "XYZ",
                    detail: "empty file".to_string(),
                })
            }
        };
        if n_atoms == 0 && !config.allow_empty {
            return Err(TrajError::EmptySystem { path });
        }

        let pending = if source.seekable() {
            source.seek(SeekFrom::Start(0))?;
            None
        } else {
            Some(n_atoms)
        };

        Ok(Self {
            path,
            source,
            n_atoms,
            cursor: 0,
            offsets: None,
            pending,
        })
    }

    fn decode_err(&mut self, detail: impl Into<String>) -> TrajError {
        TrajError::Decode {
            path: self.path.clone(),
            frame: self.cursor,
            offset: self.source.position(),
            detail: detail.into(),
        }
    }

    fn ensure_offsets(&mut self) -> Result<&[u64]> {
        if self.offsets.is_none() {
            if !self.source.seekable() {
                return Err(TrajError::SeekUnsupported {
                    path: self.path.clone(),
                });
            }
            let saved = self.source.position();
            self.source.seek(SeekFrom::Start(0))?;

            let mut offsets = Vec::new();
            loop {
                let Some((start, line)) = next_content_line(&mut self.source)? else {
                    break;
                };
                let n_atoms: usize = match line.trim().parse() {
                    Ok(count) => count,
                    Err(_) => {
                        self.source.seek(SeekFrom::Start(saved))?;
                        return Err(self.decode_err(format!(
                            "expected an atom count at byte {start}, found {line:?}"
                        )));
                    }
                };
                for _ in 0..n_atoms + 1 {
                    if next_line(&mut self.source)?.is_none() {
                        self.source.seek(SeekFrom::Start(saved))?;
                        return Err(self.decode_err("file ends mid-frame"));
                    }
                }
                offsets.push(start);
            }

            self.source.seek(SeekFrom::Start(saved))?;
            self.offsets = Some(offsets.into_boxed_slice());
        }
        Ok(self.offsets.as_deref().unwrap())
    }
}

impl FormatReader for XyzReader {
    fn path(&self) -> &Path {
        &self.path
    }

    fn n_atoms(&self) -> usize {
        self.n_atoms
    }

    fn n_frames_hint(&self) -> Option<usize> {
        self.offsets.as_ref().map(|offsets| offsets.len())
    }

    fn n_frames(&mut self) -> Result<usize> {
        Ok(self.ensure_offsets()?.len())
    }

    fn read_frame(&mut self, frame: &mut Frame) -> Result<bool> {
        let n_atoms = match self.pending.take() {
            Some(count) => count,
            None => match next_content_line(&mut self.source)? {
                None => return Ok(false),
                Some((_, line)) => match line.trim().parse::<usize>() {
                    Ok(count) => count,
                    Err(_) => {
                        return Err(
                            self.decode_err(format!("expected an atom count, found {line:?}"))
                        )
                    }
                },
            },
        };
        if n_atoms != self.n_atoms {
            return Err(self.decode_err(format!(
                "frame atom count {n_atoms} disagrees with first-frame count {}",
                self.n_atoms
            )));
        }

        let comment = next_line(&mut self.source)?
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))
            .map_err(|err| self.decode_err(err.to_string()))?;

        frame.reset(n_atoms);
        for atom in 0..n_atoms {
            let line = match next_line(&mut self.source)? {
                Some(line) => line,
                None => return Err(self.decode_err(format!("file ends at atom {atom}"))),
            };
            let mut fields = line.split_whitespace();
            let _name = fields.next();
            for axis in 0..3 {
                let field = fields
                    .next()
                    .ok_or_else(|| format!("atom line {line:?} has too few coordinates"))
                    .and_then(|field| {
                        field
                            .parse::<f32>()
                            .map_err(|_| format!("bad coordinate {field:?}"))
                    });
                match field {
                    Ok(value) => frame.positions[atom * 3 + axis] = value,
                    Err(detail) => return Err(self.decode_err(detail)),
                }
            }
        }

        frame.boxvec = BoxVec::ZERO;
        frame.precision = 0.0;
        frame.time = comment_field(&comment, "time=").unwrap_or(0.0) as f32;
        frame.step = comment_field(&comment, "step=").unwrap_or(0.0) as u64;
        frame.index = self.cursor;
        self.cursor += 1;
        Ok(true)
    }

    fn seek_frame(&mut self, index: usize) -> Result<()> {
        let len = self.ensure_offsets()?.len();
        if index >= len {
            return Err(TrajError::IndexOutOfRange { index, len });
        }
        let offset = self.offsets.as_deref().unwrap()[index];
        self.source.seek(SeekFrom::Start(offset))?;
        self.pending = None;
        self.cursor = index;
        Ok(())
    }

    fn supports_random_access(&self) -> bool {
        self.source.seekable()
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

pub struct XyzWriter<W: Write> {
    out: W,
}

impl XyzWriter<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> XyzWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Write one frame, using `names` for the atom column where provided.
    pub fn write_frame_named(&mut self, frame: &Frame, names: Option<&[String]>) -> Result<()> {
        writeln!(self.out, "{}", frame.n_atoms())?;
        writeln!(
            self.out,
            "frame {} time= {} step= {}",
            frame.index, frame.time, frame.step
        )?;
        for (atom, coord) in frame.positions.chunks_exact(3).enumerate() {
            let name = names
                .and_then(|names| names.get(atom))
                .map(String::as_str)
                .unwrap_or("X");
            writeln!(self.out, "{} {} {} {}", name, coord[0], coord[1], coord[2])?;
        }
        Ok(())
    }

    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.write_frame_named(frame, None)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

//! Byte sources backing the format readers.
//!
//! A [`ByteSource`] is either a buffered file, a memory map, or a
//! decompression stream. The first two support seeking; the stream variant is
//! forward-only and reports `Unsupported` from [`Seek`] calls, which the
//! format layer surfaces as [`SeekUnsupported`](crate::TrajError::SeekUnsupported).

use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;

use crate::config::ReadConfig;
use crate::error::Result;

/// A memory map viewed as a byte slice, cheap to clone.
#[derive(Clone)]
pub struct MapBytes(Arc<Mmap>);

impl AsRef<[u8]> for MapBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

pub enum ByteSource {
    File(BufReader<File>),
    Map(Cursor<MapBytes>),
    /// An owned in-memory buffer, seekable like a file.
    Mem(Cursor<Vec<u8>>),
    /// A forward-only decompression stream plus the number of bytes consumed
    /// so far, kept for error context.
    Stream(Box<dyn Read + Send>, u64),
}

impl std::fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ByteSource::File(_) => f.write_str("ByteSource::File"),
            ByteSource::Map(_) => f.write_str("ByteSource::Map"),
            ByteSource::Mem(_) => f.write_str("ByteSource::Mem"),
            ByteSource::Stream(_, consumed) => {
                write!(f, "ByteSource::Stream({consumed})")
            }
        }
    }
}

impl ByteSource {
    /// Open a plain file, memory-mapped when the configuration asks for it.
    pub fn open(path: &Path, config: &ReadConfig) -> Result<Self> {
        let file = File::open(path)?;
        if config.mmap {
            let map = unsafe { Mmap::map(&file)? };
            Ok(ByteSource::Map(Cursor::new(MapBytes(Arc::new(map)))))
        } else {
            Ok(ByteSource::File(BufReader::new(file)))
        }
    }

    /// Open a compressed file through niffler. The resulting source is
    /// forward-only.
    pub fn open_compressed(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let (reader, _format) = niffler::send::get_reader(Box::new(BufReader::new(file)))?;
        Ok(ByteSource::Stream(reader, 0))
    }

    /// Wrap an owned buffer, mainly for readers over already-loaded data.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        ByteSource::Mem(Cursor::new(bytes))
    }

    /// Whether this source supports random access.
    pub fn seekable(&self) -> bool {
        !matches!(self, ByteSource::Stream(..))
    }

    /// Current byte position, best-effort for streams.
    pub fn position(&mut self) -> u64 {
        match self {
            ByteSource::File(reader) => reader.stream_position().unwrap_or(0),
            ByteSource::Map(cursor) => cursor.position(),
            ByteSource::Mem(cursor) => cursor.position(),
            ByteSource::Stream(_, consumed) => *consumed,
        }
    }
}

impl Read for ByteSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ByteSource::File(reader) => reader.read(buf),
            ByteSource::Map(cursor) => cursor.read(buf),
            ByteSource::Mem(cursor) => cursor.read(buf),
            ByteSource::Stream(reader, consumed) => {
                let n = reader.read(buf)?;
                *consumed += n as u64;
                Ok(n)
            }
        }
    }
}

impl Seek for ByteSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            ByteSource::File(reader) => reader.seek(pos),
            ByteSource::Map(cursor) => cursor.seek(pos),
            ByteSource::Mem(cursor) => cursor.seek(pos),
            ByteSource::Stream(..) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "forward-only source",
            )),
        }
    }
}

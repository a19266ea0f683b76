//! GROMACS TRR trajectories.
//!
//! TRR is the full-precision XDR format: magic 1993, a version string, a
//! header of block byte-sizes, then box, position, velocity, and force
//! blocks. The real width (f32 or f64) is fixed by the block sizes at
//! header-parse time; doubles are narrowed to the canonical `f32` on read.
//!
//! Every frame repeats the full header, so the offset index is built by
//! hopping from header to header, like the XTC scanner.

use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::ReadConfig;
use crate::error::{Result, TrajError};
use crate::formats::registry::is_compressed_path;
use crate::formats::source::ByteSource;
use crate::formats::xdr;
use crate::formats::FormatReader;
use crate::frame::{BoxVec, Frame};

pub const MAGIC: i32 = 1993;

/// The version tag GROMACS writes into every frame header.
const VERSION: &[u8] = b"GMX_trn_file";

/// Per-frame header: block sizes in bytes, counts, and timestamps.
#[derive(Debug, Clone, Default)]
struct TrnHeader {
    box_size: usize,
    vir_size: usize,
    pres_size: usize,
    x_size: usize,
    v_size: usize,
    f_size: usize,
    natoms: usize,
    step: i32,
    time: f32,
    lambda: f32,
    /// True when the reals in this frame are 8 bytes wide.
    double: bool,
}

impl TrnHeader {
    fn body_bytes(&self) -> u64 {
        (self.box_size + self.vir_size + self.pres_size + self.x_size + self.v_size + self.f_size)
            as u64
    }
}

fn read_header(source: &mut ByteSource, path: &Path) -> Result<Option<TrnHeader>> {
    let magic = match xdr::read_i32(source) {
        Ok(magic) => magic,
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    if magic != MAGIC {
        return Err(TrajError::CorruptHeader {
            path: path.to_path_buf(),
            format: "TRR",
            detail: format!("bad magic number {magic:#x}, expected {MAGIC:#x}"),
        });
    }

    let corrupt = |detail: String| TrajError::CorruptHeader {
        path: path.to_path_buf(),
        format: "TRR",
        detail,
    };

    let slen = xdr::read_i32(source)?;
    if slen != VERSION.len() as i32 + 1 {
        return Err(corrupt(format!("unexpected version tag length {slen}")));
    }
    let mut tag = Vec::new();
    xdr::read_opaque(source, &mut tag)?;
    if !tag.starts_with(VERSION) {
        return Err(TrajError::UnsupportedVersion {
            path: path.to_path_buf(),
            format: "TRR",
            found: slen as i64,
        });
    }

    let mut sizes = [0i32; 13];
    for value in &mut sizes {
        *value = xdr::read_i32(source)?;
    }
    let [ir_size, e_size, box_size, vir_size, pres_size, top_size, sym_size, x_size, v_size, f_size, natoms, step, _nre] =
        sizes;
    if ir_size != 0 || e_size != 0 || top_size != 0 || sym_size != 0 {
        return Err(corrupt(
            "legacy input-record blocks are not part of trajectory frames".to_string(),
        ));
    }
    if natoms < 0 {
        return Err(corrupt(format!("negative atom count {natoms}")));
    }
    let natoms = natoms as usize;
    if sizes[2..10].iter().any(|&size| size < 0) {
        return Err(corrupt("negative block size".to_string()));
    }

    // The real width follows from the block sizes, box first.
    let real_size = if box_size > 0 {
        box_size as usize / 9
    } else if x_size > 0 && natoms > 0 {
        x_size as usize / (3 * natoms)
    } else {
        4
    };
    let double = match real_size {
        4 => false,
        8 => true,
        other => {
            return Err(corrupt(format!("implied real width of {other} bytes")));
        }
    };

    let mut times = [0.0f32; 2];
    xdr::read_reals(source, &mut times, double)?;

    Ok(Some(TrnHeader {
        box_size: box_size as usize,
        vir_size: vir_size as usize,
        pres_size: pres_size as usize,
        x_size: x_size as usize,
        v_size: v_size as usize,
        f_size: f_size as usize,
        natoms,
        step,
        time: times[0],
        lambda: times[1],
        double,
    }))
}

#[derive(Debug)]
pub struct TrrReader {
    path: PathBuf,
    source: ByteSource,
    n_atoms: usize,
    cursor: usize,
    offsets: Option<Box<[u64]>>,
    /// Header consumed while probing a forward-only source.
    pending: Option<TrnHeader>,
}

impl TrrReader {
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
        let too_short = |path: &Path| TrajError::CorruptHeader {
            path: path.to_path_buf(),
            format: "TRR",
            detail: "file too short for a frame header".to_string(),
        };
        let header = read_header(&mut source, &path)
            .map_err(|err| match err {
                TrajError::Io(inner) if inner.kind() == io::ErrorKind::UnexpectedEof => {
                    too_short(&path)
                }
                other => other,
            })?
            .ok_or_else(|| too_short(&path))?;
        if header.natoms == 0 && !config.allow_empty {
            return Err(TrajError::EmptySystem { path });
        }

        let n_atoms = header.natoms;
        let pending = if source.seekable() {
            source.seek(SeekFrom::Start(0))?;
            None
        } else {
            Some(header)
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
                let start = self.source.position();
                let header = match read_header(&mut self.source, &self.path) {
                    Ok(Some(header)) => header,
                    Ok(None) => break,
                    Err(err) => {
                        self.source.seek(SeekFrom::Start(saved))?;
                        return Err(err);
                    }
                };
                self.source
                    .seek(SeekFrom::Current(header.body_bytes() as i64))?;
                offsets.push(start);
            }

            self.source.seek(SeekFrom::Start(saved))?;
            self.offsets = Some(offsets.into_boxed_slice());
        }
        Ok(self.offsets.as_deref().unwrap())
    }

    fn read_frame_body(&mut self, header: &TrnHeader, frame: &mut Frame) -> io::Result<()> {
        let double = header.double;
        frame.reset_with(header.natoms, header.v_size > 0, header.f_size > 0);

        if header.box_size > 0 {
            let mut boxbuf = [0.0f32; 9];
            xdr::read_reals(&mut self.source, &mut boxbuf, double)?;
            frame.boxvec = BoxVec::from_cols_array(&boxbuf);
        } else {
            frame.boxvec = BoxVec::ZERO;
        }
        // Virial and pressure tensors are not part of the frame buffer.
        let mut discard = [0.0f32; 9];
        if header.vir_size > 0 {
            xdr::read_reals(&mut self.source, &mut discard, double)?;
        }
        if header.pres_size > 0 {
            xdr::read_reals(&mut self.source, &mut discard, double)?;
        }

        if header.x_size > 0 {
            xdr::read_reals(&mut self.source, &mut frame.positions, double)?;
        }
        if let Some(velocities) = frame.velocities.as_mut() {
            xdr::read_reals(&mut self.source, velocities, double)?;
        }
        if let Some(forces) = frame.forces.as_mut() {
            xdr::read_reals(&mut self.source, forces, double)?;
        }

        frame.step = header.step.max(0) as u64;
        frame.time = header.time;
        frame.precision = 0.0;
        Ok(())
    }
}

impl FormatReader for TrrReader {
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
        let header = match self.pending.take() {
            Some(header) => header,
            None => {
                let path = self.path.clone();
                match read_header(&mut self.source, &path)? {
                    Some(header) => header,
                    None => return Ok(false),
                }
            }
        };
        if header.natoms != self.n_atoms {
            return Err(self.decode_err(format!(
                "frame atom count {} disagrees with header count {}",
                header.natoms, self.n_atoms
            )));
        }
        if header.x_size == 0 {
            return Err(self.decode_err("frame carries no position block"));
        }

        self.read_frame_body(&header, frame)
            .map_err(|err| self.decode_err(err.to_string()))?;
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

/// Writes single-precision TRR frames.
pub struct TrrWriter<W: Write> {
    out: W,
}

impl TrrWriter<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> TrrWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let natoms = frame.n_atoms();
        let step: i32 = frame.step.try_into().map_err(|_| TrajError::Encode {
            format: "TRR",
            detail: format!("step {} does not fit the format's 32-bit field", frame.step),
        })?;
        let coord_bytes = natoms * 3 * 4;

        xdr::write_i32(&mut self.out, MAGIC)?;
        xdr::write_i32(&mut self.out, VERSION.len() as i32 + 1)?;
        let mut tag = VERSION.to_vec();
        tag.push(0);
        xdr::write_opaque(&mut self.out, &tag)?;

        let v_size = frame.velocities.as_ref().map_or(0, |_| coord_bytes);
        let f_size = frame.forces.as_ref().map_or(0, |_| coord_bytes);
        let sizes = [
            0,                 // ir_size
            0,                 // e_size
            36,                // box_size
            0,                 // vir_size
            0,                 // pres_size
            0,                 // top_size
            0,                 // sym_size
            coord_bytes as i32, // x_size
            v_size as i32,
            f_size as i32,
            natoms as i32,
            step,
            0, // nre
        ];
        for value in sizes {
            xdr::write_i32(&mut self.out, value)?;
        }
        xdr::write_f32(&mut self.out, frame.time)?;
        xdr::write_f32(&mut self.out, 0.0)?; // lambda

        xdr::write_f32s(&mut self.out, &frame.boxvec.to_cols_array())?;
        xdr::write_f32s(&mut self.out, &frame.positions)?;
        if let Some(velocities) = frame.velocities.as_deref() {
            xdr::write_f32s(&mut self.out, velocities)?;
        }
        if let Some(forces) = frame.forces.as_deref() {
            xdr::write_f32s(&mut self.out, forces)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

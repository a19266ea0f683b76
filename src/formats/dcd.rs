//! CHARMM/NAMD/X-PLOR DCD trajectories.
//!
//! DCD wraps everything in Fortran record blocks: a 4-byte length, the
//! payload, and the length again. The first block is an 84-byte header
//! opening with the `CORD` magic; endianness is detected from that first
//! length marker. Coordinates are stored as three per-axis f32 blocks in
//! Angstrom and converted to nanometers on read.
//!
//! Every frame has the same byte size, so random access is a single
//! computed seek.

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use glam::Vec3;

use crate::config::ReadConfig;
use crate::error::{Result, TrajError};
use crate::formats::registry::is_compressed_path;
use crate::formats::source::ByteSource;
use crate::formats::FormatReader;
use crate::frame::{BoxVec, Frame};

pub const MAGIC: &[u8; 4] = b"CORD";

/// Angstrom to nanometer conversion factor.
pub const ANGSTROM_TO_NM: f32 = 0.1;

#[derive(Debug, Clone)]
struct DcdHeader {
    n_frames: usize,
    n_atoms: usize,
    start_step: i32,
    step_interval: i32,
    /// Integration timestep in AKMA units, converted to ps on read.
    timestep: f32,
    has_unit_cell: bool,
    big_endian: bool,
    first_frame_offset: u64,
    frame_size: u64,
}

/// AKMA time unit in picoseconds.
const AKMA_PS: f32 = 0.048_888_21;

fn read_exact_bytes<R: Read>(reader: &mut R, n: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; n];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn get_i32(buf: [u8; 4], big_endian: bool) -> i32 {
    if big_endian {
        i32::from_be_bytes(buf)
    } else {
        i32::from_le_bytes(buf)
    }
}

fn read_i32<R: Read>(reader: &mut R, big_endian: bool) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(get_i32(buf, big_endian))
}

fn read_f32<R: Read>(reader: &mut R, big_endian: bool) -> io::Result<f32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(if big_endian {
        f32::from_be_bytes(buf)
    } else {
        f32::from_le_bytes(buf)
    })
}

fn read_f64<R: Read>(reader: &mut R, big_endian: bool) -> io::Result<f64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(if big_endian {
        f64::from_be_bytes(buf)
    } else {
        f64::from_le_bytes(buf)
    })
}

fn parse_header(source: &mut ByteSource, path: &Path) -> Result<DcdHeader> {
    let corrupt = |detail: String| TrajError::CorruptHeader {
        path: path.to_path_buf(),
        format: "DCD",
        detail,
    };

    // The first record marker must be 84 in one of the two byte orders; that
    // fixes the endianness for the whole file. No seek needed: the probe
    // bytes are the marker itself.
    let mut marker = [0u8; 4];
    source
        .read_exact(&mut marker)
        .map_err(|_| corrupt("file too short for a header".to_string()))?;
    let big_endian = if get_i32(marker, false) == 84 {
        false
    } else if get_i32(marker, true) == 84 {
        true
    } else {
        return Err(corrupt(format!(
            "first block size is {} (LE) / {} (BE), expected 84",
            get_i32(marker, false),
            get_i32(marker, true)
        )));
    };

    let mut magic = [0u8; 4];
    source.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(corrupt(format!("bad magic {magic:?}, expected {MAGIC:?}")));
    }

    let n_frames = read_i32(source, big_endian)?;
    if n_frames < 0 {
        return Err(corrupt(format!("negative frame count {n_frames}")));
    }
    let start_step = read_i32(source, big_endian)?;
    let step_interval = read_i32(source, big_endian)?;
    // n_steps + four unused slots + n_fixed
    let mut fixed = 0;
    for slot in 0..6 {
        let value = read_i32(source, big_endian)?;
        if slot == 5 {
            fixed = value;
        }
    }
    if fixed != 0 {
        return Err(TrajError::UnsupportedVersion {
            path: path.to_path_buf(),
            format: "DCD (fixed-atom)",
            found: fixed as i64,
        });
    }
    let timestep = read_f32(source, big_endian)?;
    let has_unit_cell = read_i32(source, big_endian)? != 0;

    // Eight reserved slots, then the CHARMM version field. A nonzero flag in
    // the fifth reserved slot marks 64-bit coordinate blocks, which this
    // reader does not decode.
    let reserved = read_exact_bytes(source, 32)?;
    let charmm_version = read_i32(source, big_endian)?;
    if charmm_version != 0 && reserved[16..20] != [0, 0, 0, 0] {
        return Err(TrajError::UnsupportedVersion {
            path: path.to_path_buf(),
            format: "DCD (64-bit coordinates)",
            found: charmm_version as i64,
        });
    }

    let block1_end = read_i32(source, big_endian)?;
    if block1_end != 84 {
        return Err(corrupt(format!("header block closes with {block1_end}")));
    }

    // Title block: a count of 80-character records.
    let block2_size = read_i32(source, big_endian)?;
    if block2_size < 4 {
        return Err(corrupt(format!("invalid title block size {block2_size}")));
    }
    let n_titles = read_i32(source, big_endian)?;
    if n_titles < 0 || 4 + n_titles as i64 * 80 > block2_size as i64 {
        return Err(corrupt(format!(
            "title block of {block2_size} bytes cannot hold {n_titles} titles"
        )));
    }
    let remaining = block2_size as usize - 4;
    read_exact_bytes(source, remaining)?;
    let _block2_end = read_i32(source, big_endian)?;

    // Atom count block.
    let _block3_size = read_i32(source, big_endian)?;
    let n_atoms = read_i32(source, big_endian)?;
    if n_atoms < 0 {
        return Err(corrupt(format!("negative atom count {n_atoms}")));
    }
    let _block3_end = read_i32(source, big_endian)?;

    let first_frame_offset = source.position();
    let n_atoms = n_atoms as usize;
    let coord_block = 8 + n_atoms as u64 * 4;
    let cell_block = if has_unit_cell { 8 + 48 } else { 0 };
    let frame_size = cell_block + 3 * coord_block;

    Ok(DcdHeader {
        n_frames: n_frames as usize,
        n_atoms,
        start_step,
        step_interval,
        timestep,
        has_unit_cell,
        big_endian,
        first_frame_offset,
        frame_size,
    })
}

/// Convert box lengths (nm) and angles to the box matrix.
///
/// Angles may be stored in degrees or, CHARMM-style, as cosines; values
/// within [-1, 1] are treated as cosines.
fn box_from_lengths_angles(lengths: [f32; 3], angles: [f32; 3]) -> BoxVec {
    let [a, b, c] = lengths;
    let cos = angles.map(|angle| {
        if angle.abs() <= 1.0 {
            angle
        } else {
            angle.to_radians().cos()
        }
    });
    let [cos_alpha, cos_beta, cos_gamma] = cos;
    let sin_gamma = (1.0 - cos_gamma * cos_gamma).max(0.0).sqrt();

    let bx = b * cos_gamma;
    let by = b * sin_gamma;
    let cx = c * cos_beta;
    let cy = if sin_gamma > 0.0 {
        c * (cos_alpha - cos_beta * cos_gamma) / sin_gamma
    } else {
        0.0
    };
    let cz = (c * c - cx * cx - cy * cy).max(0.0).sqrt();

    BoxVec::from_cols(
        Vec3::new(a, 0.0, 0.0),
        Vec3::new(bx, by, 0.0),
        Vec3::new(cx, cy, cz),
    )
}

/// Recover lengths (nm) and angles (degrees) from the box matrix.
fn lengths_angles_from_box(boxvec: &BoxVec) -> ([f32; 3], [f32; 3]) {
    let a = boxvec.col(0);
    let b = boxvec.col(1);
    let c = boxvec.col(2);
    let la = a.length();
    let lb = b.length();
    let lc = c.length();
    let angle = |u: Vec3, v: Vec3, lu: f32, lv: f32| {
        if lu == 0.0 || lv == 0.0 {
            90.0
        } else {
            (u.dot(v) / (lu * lv)).clamp(-1.0, 1.0).acos().to_degrees()
        }
    };
    (
        [la, lb, lc],
        [
            angle(b, c, lb, lc),
            angle(a, c, la, lc),
            angle(a, b, la, lb),
        ],
    )
}

#[derive(Debug)]
pub struct DcdReader {
    path: PathBuf,
    source: ByteSource,
    header: DcdHeader,
    cursor: usize,
    /// Per-axis staging buffer for the x/y/z coordinate blocks.
    axis: Vec<f32>,
}

impl DcdReader {
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
        let mut header = parse_header(&mut source, &path).map_err(|err| match err {
            TrajError::Io(inner) if inner.kind() == io::ErrorKind::UnexpectedEof => {
                TrajError::CorruptHeader {
                    path: path.clone(),
                    format: "DCD",
                    detail: "file ends inside the header".to_string(),
                }
            }
            other => other,
        })?;
        if header.n_atoms == 0 && !config.allow_empty {
            return Err(TrajError::EmptySystem { path });
        }

        // Appended files sometimes leave the header count at zero; the fixed
        // frame size lets the length fill it in.
        if header.n_frames == 0 && source.seekable() && header.frame_size > 0 {
            let end = source.seek(SeekFrom::End(0))?;
            header.n_frames = ((end - header.first_frame_offset) / header.frame_size) as usize;
            source.seek(SeekFrom::Start(header.first_frame_offset))?;
        }

        Ok(Self {
            path,
            source,
            header,
            cursor: 0,
            axis: Vec::new(),
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

    fn read_block_marker(&mut self, expected: i32) -> io::Result<()> {
        let marker = read_i32(&mut self.source, self.header.big_endian)?;
        if marker != expected {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("record marker {marker}, expected {expected}"),
            ));
        }
        Ok(())
    }

    fn read_frame_body(&mut self, frame: &mut Frame) -> io::Result<()> {
        let big_endian = self.header.big_endian;
        let n_atoms = self.header.n_atoms;

        frame.reset(n_atoms);
        if self.header.has_unit_cell {
            self.read_block_marker(48)?;
            let a = read_f64(&mut self.source, big_endian)? as f32;
            let gamma = read_f64(&mut self.source, big_endian)? as f32;
            let b = read_f64(&mut self.source, big_endian)? as f32;
            let beta = read_f64(&mut self.source, big_endian)? as f32;
            let alpha = read_f64(&mut self.source, big_endian)? as f32;
            let c = read_f64(&mut self.source, big_endian)? as f32;
            self.read_block_marker(48)?;
            frame.boxvec = box_from_lengths_angles(
                [a * ANGSTROM_TO_NM, b * ANGSTROM_TO_NM, c * ANGSTROM_TO_NM],
                [alpha, beta, gamma],
            );
        } else {
            frame.boxvec = BoxVec::ZERO;
        }

        let block = (n_atoms * 4) as i32;
        for axis in 0..3 {
            self.read_block_marker(block)?;
            self.axis.resize(n_atoms, 0.0);
            for value in self.axis.iter_mut() {
                *value = read_f32(&mut self.source, big_endian)?;
            }
            self.read_block_marker(block)?;
            for (atom, &value) in self.axis.iter().enumerate() {
                frame.positions[atom * 3 + axis] = value * ANGSTROM_TO_NM;
            }
        }

        let step = self.header.start_step as i64
            + self.cursor as i64 * self.header.step_interval as i64;
        frame.step = step.max(0) as u64;
        frame.time = step as f32 * self.header.timestep * AKMA_PS;
        frame.precision = 0.0;
        Ok(())
    }
}

impl FormatReader for DcdReader {
    fn path(&self) -> &Path {
        &self.path
    }

    fn n_atoms(&self) -> usize {
        self.header.n_atoms
    }

    fn n_frames_hint(&self) -> Option<usize> {
        Some(self.header.n_frames)
    }

    fn n_frames(&mut self) -> Result<usize> {
        Ok(self.header.n_frames)
    }

    fn read_frame(&mut self, frame: &mut Frame) -> Result<bool> {
        if self.cursor >= self.header.n_frames {
            return Ok(false);
        }
        self.read_frame_body(frame)
            .map_err(|err| self.decode_err(err.to_string()))?;
        frame.index = self.cursor;
        self.cursor += 1;
        Ok(true)
    }

    fn seek_frame(&mut self, index: usize) -> Result<()> {
        let len = self.header.n_frames;
        if index >= len {
            return Err(TrajError::IndexOutOfRange { index, len });
        }
        if !self.source.seekable() {
            return Err(TrajError::SeekUnsupported {
                path: self.path.clone(),
            });
        }
        let offset = self.header.first_frame_offset + index as u64 * self.header.frame_size;
        self.source.seek(SeekFrom::Start(offset))?;
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

/// Writes native-endian DCD with a unit cell block per frame.
///
/// The frame count lands in the header, so the writer patches it on
/// [`DcdWriter::finish`]; an unfinished file keeps a zero count, which the
/// reader recovers from the file length.
pub struct DcdWriter {
    out: BufWriter<File>,
    n_atoms: Option<usize>,
    n_frames: usize,
}

impl DcdWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            out: BufWriter::new(file),
            n_atoms: None,
            n_frames: 0,
        })
    }

    fn write_i32(&mut self, value: i32) -> io::Result<()> {
        self.out.write_all(&value.to_le_bytes())
    }

    fn write_header(&mut self, n_atoms: usize) -> Result<()> {
        self.write_i32(84)?;
        self.out.write_all(MAGIC)?;
        self.write_i32(0)?; // frame count, patched in finish()
        self.write_i32(0)?; // start step
        self.write_i32(1)?; // step interval
        for _ in 0..6 {
            self.write_i32(0)?;
        }
        self.out.write_all(&1.0f32.to_le_bytes())?; // timestep
        self.write_i32(1)?; // unit cell present
        self.out.write_all(&[0u8; 32])?;
        self.write_i32(24)?; // CHARMM version
        self.write_i32(84)?;

        let title = format!("{:<80}", "written by trajan");
        self.write_i32(4 + 80)?;
        self.write_i32(1)?;
        self.out.write_all(title.as_bytes())?;
        self.write_i32(4 + 80)?;

        self.write_i32(4)?;
        self.write_i32(n_atoms as i32)?;
        self.write_i32(4)?;
        Ok(())
    }

    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let n_atoms = frame.n_atoms();
        match self.n_atoms {
            None => {
                self.write_header(n_atoms)?;
                self.n_atoms = Some(n_atoms);
            }
            Some(expected) if expected != n_atoms => {
                return Err(TrajError::Encode {
                    format: "DCD",
                    detail: format!(
                        "frame has {n_atoms} atoms but the file was started with {expected}"
                    ),
                });
            }
            Some(_) => {}
        }

        // Lengths go back to Angstrom, angles stay in degrees, stored in the
        // CHARMM slot order a, gamma, b, beta, alpha, c.
        let ([a, b, c], [alpha, beta, gamma]) = lengths_angles_from_box(&frame.boxvec);
        let cell = [
            (a / ANGSTROM_TO_NM) as f64,
            gamma as f64,
            (b / ANGSTROM_TO_NM) as f64,
            beta as f64,
            alpha as f64,
            (c / ANGSTROM_TO_NM) as f64,
        ];
        self.write_i32(48)?;
        for value in cell {
            self.out.write_all(&value.to_le_bytes())?;
        }
        self.write_i32(48)?;

        let block = (n_atoms * 4) as i32;
        for axis in 0..3 {
            self.write_i32(block)?;
            for atom in 0..n_atoms {
                let value = frame.positions[atom * 3 + axis] / ANGSTROM_TO_NM;
                self.out.write_all(&value.to_le_bytes())?;
            }
            self.write_i32(block)?;
        }

        self.n_frames += 1;
        Ok(())
    }

    /// Patch the frame count into the header and flush.
    pub fn finish(mut self) -> Result<()> {
        self.out.flush()?;
        let mut file = self.out.into_inner().map_err(|err| err.into_error())?;
        // Frame count sits 8 bytes in: marker + magic.
        file.seek(SeekFrom::Start(8))?;
        file.write_all(&(self.n_frames as i32).to_le_bytes())?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_conversion_roundtrip_orthorhombic() {
        let boxvec = box_from_lengths_angles([4.0, 5.0, 6.0], [90.0, 90.0, 90.0]);
        assert!((boxvec.col(0).x - 4.0).abs() < 1e-5);
        assert!((boxvec.col(1).y - 5.0).abs() < 1e-5);
        assert!((boxvec.col(2).z - 6.0).abs() < 1e-5);

        let (lengths, angles) = lengths_angles_from_box(&boxvec);
        for (got, want) in lengths.iter().zip([4.0, 5.0, 6.0]) {
            assert!((got - want).abs() < 1e-4);
        }
        for angle in angles {
            assert!((angle - 90.0).abs() < 1e-3);
        }
    }

    #[test]
    fn box_conversion_roundtrip_triclinic() {
        let boxvec = box_from_lengths_angles([3.0, 4.0, 5.0], [80.0, 95.0, 110.0]);
        let (lengths, angles) = lengths_angles_from_box(&boxvec);
        for (got, want) in lengths.iter().zip([3.0, 4.0, 5.0]) {
            assert!((got - want).abs() < 1e-4, "length {got} vs {want}");
        }
        for (got, want) in angles.iter().zip([80.0, 95.0, 110.0]) {
            assert!((got - want).abs() < 1e-2, "angle {got} vs {want}");
        }
    }

    #[test]
    fn cosine_stored_angles_are_recognized() {
        let deg = box_from_lengths_angles([2.0, 2.0, 2.0], [90.0, 90.0, 90.0]);
        let cos = box_from_lengths_angles([2.0, 2.0, 2.0], [0.0, 0.0, 0.0]);
        assert!((deg.col(1).y - cos.col(1).y).abs() < 1e-5);
    }
}

//! GROMACS XTC trajectories.
//!
//! XTC is XDR-encoded and big-endian: a magic number (1995), the atom count,
//! step and time, the simulation box, then positions. Systems of nine atoms
//! or fewer store plain floats; larger systems quantize positions to
//! integers and pack them into a bit stream whose integer ranges adapt as
//! the stream progresses.
//!
//! Random access works through a lazily built offset index: one cheap
//! header-hopping scan records where every frame starts, and seeks reuse the
//! cached index from then on.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::ReadConfig;
use crate::error::{Result, TrajError};
use crate::formats::registry::is_compressed_path;
use crate::formats::source::ByteSource;
use crate::formats::xdr;
use crate::formats::FormatReader;
use crate::frame::{BoxVec, Frame};

pub const MAGIC: i32 = 1995;

/// Atom count at or below which positions are stored uncompressed.
pub const UNCOMPRESSED_LIMIT: usize = 9;

/// The table of representable integer ranges used by the adaptive coder.
#[rustfmt::skip]
pub const MAGICINTS: [i32; 73] = [
    0,        0,        0,       0,       0,       0,       0,       0,       0,       8,
    10,       12,       16,      20,      25,      32,      40,      50,      64,      80,
    101,      128,      161,     203,     256,     322,     406,     512,     645,     812,
    1024,     1290,     1625,    2048,    2580,    3250,    4096,    5060,    6501,    8192,
    10321,    13003,    16384,   20642,   26007,   32768,   41285,   52015,   65536,   82570,
    104031,   131072,   165140,  208063,  262144,  330280,  416127,  524287,  660561,  832255,
    1048576,  1321122,  1664510, 2097152, 2642245, 3329021, 4194304, 5284491, 6658042, 8388607,
    10568983, 13316085, 16777216
];

/// First index in [`MAGICINTS`] holding a nonzero range.
pub const FIRSTIDX: usize = 9;

#[derive(Debug)]
pub struct XtcReader {
    path: PathBuf,
    source: ByteSource,
    n_atoms: usize,
    /// Local index of the next frame to decode.
    cursor: usize,
    /// Byte offset of every frame start; built once on demand.
    offsets: Option<Box<[u64]>>,
    /// Magic and atom count consumed while probing a forward-only source.
    peeked: Option<(i32, i32)>,
    scratch: Vec<u8>,
}

impl XtcReader {
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
        let magic = xdr::read_i32(&mut source).map_err(|err| corrupt(&path, err))?;
        if magic != MAGIC {
            return Err(TrajError::CorruptHeader {
                path,
                format: "XTC",
                detail: format!("bad magic number {magic:#x}, expected {MAGIC:#x}"),
            });
        }
        let natoms = xdr::read_i32(&mut source).map_err(|err| corrupt(&path, err))?;
        if natoms < 0 {
            return Err(TrajError::CorruptHeader {
                path,
                format: "XTC",
                detail: format!("negative atom count {natoms}"),
            });
        }
        if natoms == 0 && !config.allow_empty {
            return Err(TrajError::EmptySystem { path });
        }

        let peeked = if source.seekable() {
            source.seek(SeekFrom::Start(0))?;
            None
        } else {
            Some((magic, natoms))
        };

        Ok(Self {
            path,
            source,
            n_atoms: natoms as usize,
            cursor: 0,
            offsets: None,
            peeked,
            scratch: Vec::new(),
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

    /// Build (or return) the frame-offset index by hopping over headers.
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
                let magic = match xdr::read_i32(&mut self.source) {
                    Ok(magic) => magic,
                    Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => break,
                    Err(err) => return Err(err.into()),
                };
                if magic != MAGIC {
                    self.source.seek(SeekFrom::Start(saved))?;
                    return Err(self.decode_err(format!(
                        "expected frame magic at byte {start}, found {magic:#x}"
                    )));
                }
                let natoms = xdr::read_i32(&mut self.source)?;
                // step + time + box + repeated atom count
                self.source.seek(SeekFrom::Current(8 + 36 + 4))?;
                if natoms as usize <= UNCOMPRESSED_LIMIT {
                    self.source
                        .seek(SeekFrom::Current(natoms as i64 * 3 * 4))?;
                } else {
                    // precision + minint + maxint + smallidx
                    self.source.seek(SeekFrom::Current(4 + 12 + 12 + 4))?;
                    let nbytes = xdr::read_u32(&mut self.source)? as usize;
                    self.source
                        .seek(SeekFrom::Current((nbytes + xdr::padding(nbytes)) as i64))?;
                }
                offsets.push(start);
            }

            self.source.seek(SeekFrom::Start(saved))?;
            self.offsets = Some(offsets.into_boxed_slice());
        }
        Ok(self.offsets.as_deref().unwrap())
    }
}

impl FormatReader for XtcReader {
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
        let (magic, natoms) = match self.peeked.take() {
            Some(pair) => pair,
            None => {
                let magic = match xdr::read_i32(&mut self.source) {
                    Ok(magic) => magic,
                    Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                        return Ok(false)
                    }
                    Err(err) => return Err(err.into()),
                };
                let natoms = match xdr::read_i32(&mut self.source) {
                    Ok(natoms) => natoms,
                    Err(err) => return Err(self.decode_err(err.to_string())),
                };
                (magic, natoms)
            }
        };
        if magic != MAGIC {
            return Err(self.decode_err(format!("bad frame magic {magic:#x}")));
        }
        if natoms as usize != self.n_atoms {
            return Err(self.decode_err(format!(
                "frame atom count {natoms} disagrees with header count {}",
                self.n_atoms
            )));
        }

        self.read_frame_body(frame)
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
        self.peeked = None;
        self.cursor = index;
        Ok(())
    }

    fn supports_random_access(&self) -> bool {
        self.source.seekable()
    }
}

impl XtcReader {
    fn read_frame_body(&mut self, frame: &mut Frame) -> std::io::Result<()> {
        let invalid = |detail: String| std::io::Error::new(std::io::ErrorKind::InvalidData, detail);

        let step = xdr::read_i32(&mut self.source)?;
        if step < 0 {
            return Err(invalid(format!("negative step {step}")));
        }
        let time = xdr::read_f32(&mut self.source)?;

        let mut boxbuf = [0.0f32; 9];
        xdr::read_f32s(&mut self.source, &mut boxbuf)?;
        let boxvec = BoxVec::from_cols_array(&boxbuf);

        let natoms_repeated = xdr::read_i32(&mut self.source)?;
        if natoms_repeated as usize != self.n_atoms {
            return Err(invalid(format!(
                "repeated atom count {natoms_repeated} disagrees with {}",
                self.n_atoms
            )));
        }

        frame.reset(self.n_atoms);
        if self.n_atoms <= UNCOMPRESSED_LIMIT {
            xdr::read_f32s(&mut self.source, &mut frame.positions)?;
            frame.precision = 0.0;
        } else {
            let precision = xdr::read_f32(&mut self.source)?;
            if !(precision.is_finite() && precision > 0.0) {
                return Err(invalid(format!("invalid precision {precision}")));
            }

            let mut minint = [0i32; 3];
            let mut maxint = [0i32; 3];
            for value in &mut minint {
                *value = xdr::read_i32(&mut self.source)?;
            }
            for value in &mut maxint {
                *value = xdr::read_i32(&mut self.source)?;
            }
            let smallidx = xdr::read_u32(&mut self.source)? as usize;
            if !(1..MAGICINTS.len()).contains(&smallidx) {
                return Err(invalid(format!("invalid small-integer index {smallidx}")));
            }

            let mut scratch = std::mem::take(&mut self.scratch);
            let read = xdr::read_opaque(&mut self.source, &mut scratch);
            let decoded = read.and_then(|_| {
                decode_positions(
                    &scratch,
                    &mut frame.positions,
                    precision,
                    minint,
                    maxint,
                    smallidx,
                )
                .map_err(invalid)
            });
            self.scratch = scratch;
            decoded?;
            frame.precision = precision;
        }

        frame.step = step as u64;
        frame.time = time;
        frame.boxvec = boxvec;
        Ok(())
    }
}

fn corrupt(path: &Path, err: std::io::Error) -> TrajError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        TrajError::CorruptHeader {
            path: path.to_path_buf(),
            format: "XTC",
            detail: "file too short for a frame header".to_string(),
        }
    } else {
        TrajError::Io(err)
    }
}

// ---------------------------------------------------------------------------
// Bit-level decoding
// ---------------------------------------------------------------------------

#[derive(Default)]
struct DecodeState {
    count: usize,
    lastbits: usize,
    lastbyte: u8,
    overrun: bool,
}

impl DecodeState {
    fn next_byte(&mut self, buf: &[u8]) -> u32 {
        let byte = match buf.get(self.count) {
            Some(&byte) => byte as u32,
            None => {
                self.overrun = true;
                0
            }
        };
        self.count += 1;
        byte
    }
}

/// Pull `nbits` bits (most significant first) off the stream.
fn decodebits(buf: &[u8], state: &mut DecodeState, mut nbits: usize) -> u32 {
    let mask = if nbits >= 32 {
        u32::MAX
    } else {
        (1u32 << nbits) - 1
    };

    // The shift register wraps at 32 bits, reproducing the reference
    // decoder's unsigned arithmetic.
    let mut lastbyte = state.lastbyte as u64;
    let mut lastbits = state.lastbits;
    let mut num = 0u32;

    while nbits >= 8 {
        lastbyte = ((lastbyte << 8) | state.next_byte(buf) as u64) & 0xffff_ffff;
        num |= ((lastbyte >> lastbits) as u32) << (nbits - 8);
        nbits -= 8;
    }
    if nbits > 0 {
        if lastbits < nbits {
            lastbits += 8;
            lastbyte = ((lastbyte << 8) | state.next_byte(buf) as u64) & 0xffff_ffff;
        }
        lastbits -= nbits;
        num |= (lastbyte >> lastbits) as u32 & mask;
    }

    state.lastbits = lastbits;
    state.lastbyte = (lastbyte & 0xff) as u8;
    num & mask
}

/// Unpack three integers that were multiplied together into one `nbits`-wide
/// value. Little-endian byte order with the partial byte on top, mirrored by
/// the encoder below.
fn decodeints(buf: &[u8], state: &mut DecodeState, nbits: u32, sizes: [u32; 3], nums: &mut [i32; 3]) {
    if nbits <= 64 {
        let mut v = 0u64;
        let mut shift = 0u32;
        let mut bits = nbits;
        while bits >= 8 {
            v |= (decodebits(buf, state, 8) as u64) << shift;
            shift += 8;
            bits -= 8;
        }
        if bits > 0 {
            v |= (decodebits(buf, state, bits as usize) as u64) << shift;
        }

        let sz = sizes[2] as u64;
        let sy = sizes[1] as u64;
        let szy = sz * sy;
        let x = v / szy;
        let q = v - x * szy;
        let y = q / sz;
        let z = q - y * sz;
        *nums = [x as i32, y as i32, z as i32];
        return;
    }

    // Wider than a u64: long division over little-endian bytes.
    let mut bytes = [0u8; 32];
    let mut nbytes = 0usize;
    let mut bits = nbits;
    while bits >= 8 {
        bytes[nbytes] = decodebits(buf, state, 8) as u8;
        nbytes += 1;
        bits -= 8;
    }
    if bits > 0 {
        bytes[nbytes] = decodebits(buf, state, bits as usize) as u8;
        nbytes += 1;
    }

    for i in (1..3).rev() {
        let mut num = 0u64;
        for k in (0..nbytes).rev() {
            num = (num << 8) | bytes[k] as u64;
            let p = num / sizes[i] as u64;
            bytes[k] = p as u8;
            num -= p * sizes[i] as u64;
        }
        nums[i] = num as i32;
    }
    nums[0] = i32::from_le_bytes(bytes[..4].try_into().unwrap());
}

const fn sizeofint(size: u32) -> u32 {
    let mut n = 1u64;
    let mut nbits = 0;
    while size as u64 >= n && nbits < 32 {
        nbits += 1;
        n <<= 1;
    }
    nbits
}

/// Bits needed to store the product of three ranges.
fn sizeofints(sizes: [u32; 3]) -> u32 {
    let mut nbytes = 1usize;
    let mut bytes = [0u8; 32];
    bytes[0] = 1;
    let mut nbits = 0;

    for size in sizes {
        let mut tmp = 0u32;
        let mut bytecount = 0;
        while bytecount < nbytes {
            tmp += bytes[bytecount] as u32 * size;
            bytes[bytecount] = (tmp & 0xff) as u8;
            tmp >>= 8;
            bytecount += 1;
        }
        while tmp != 0 {
            bytes[bytecount] = (tmp & 0xff) as u8;
            bytecount += 1;
            tmp >>= 8;
        }
        nbytes = bytecount;
    }

    nbytes -= 1;
    let mut num = 1u32;
    while bytes[nbytes] as u32 >= num {
        nbits += 1;
        num *= 2;
    }
    nbytes as u32 * 8 + nbits
}

/// Per-dimension ranges and the combined bit width. A return of 0 flags
/// ranges too large to multiply, in which case each dimension is coded
/// separately with `bitsizeint` bits.
fn calc_sizeint(
    minint: [i32; 3],
    maxint: [i32; 3],
    sizeint: &mut [u32; 3],
    bitsizeint: &mut [u32; 3],
) -> u32 {
    sizeint[0] = (maxint[0].wrapping_sub(minint[0])) as u32 + 1;
    sizeint[1] = (maxint[1].wrapping_sub(minint[1])) as u32 + 1;
    sizeint[2] = (maxint[2].wrapping_sub(minint[2])) as u32 + 1;

    bitsizeint.fill(0);
    if (sizeint[0] | sizeint[1] | sizeint[2]) > 0xffffff {
        bitsizeint[0] = sizeofint(sizeint[0]);
        bitsizeint[1] = sizeofint(sizeint[1]);
        bitsizeint[2] = sizeofint(sizeint[2]);
        return 0;
    }
    sizeofints(*sizeint)
}

/// Decode the adaptive position stream into `positions`.
fn decode_positions(
    buf: &[u8],
    positions: &mut [f32],
    precision: f32,
    minint: [i32; 3],
    maxint: [i32; 3],
    smallidx: usize,
) -> std::result::Result<(), String> {
    let natoms = positions.len() / 3;
    let invprecision = precision.recip();

    if minint.iter().zip(&maxint).any(|(min, max)| min > max) {
        return Err("integer range inverted (minint > maxint)".to_string());
    }
    let mut sizeint = [0u32; 3];
    let mut bitsizeint = [0u32; 3];
    let bitsize = calc_sizeint(minint, maxint, &mut sizeint, &mut bitsizeint);

    let mut smallidx = smallidx;
    let tmpidx = (smallidx - 1).max(FIRSTIDX);
    let mut smaller = MAGICINTS[tmpidx] / 2;
    let mut smallnum = MAGICINTS[smallidx] / 2;
    let mut sizesmall = [MAGICINTS[smallidx] as u32; 3];
    if sizesmall[0] == 0 {
        return Err(format!("small-integer index {smallidx} maps to an empty range"));
    }

    let mut state = DecodeState::default();
    let mut write = 0usize;
    let mut atom = 0usize;
    while atom < natoms {
        let mut coord = [0i32; 3];
        if bitsize == 0 {
            coord[0] = decodebits(buf, &mut state, bitsizeint[0] as usize) as i32;
            coord[1] = decodebits(buf, &mut state, bitsizeint[1] as usize) as i32;
            coord[2] = decodebits(buf, &mut state, bitsizeint[2] as usize) as i32;
        } else {
            decodeints(buf, &mut state, bitsize, sizeint, &mut coord);
        }
        coord[0] += minint[0];
        coord[1] += minint[1];
        coord[2] += minint[2];
        let mut prevcoord = coord;

        let flag = decodebits(buf, &mut state, 1) != 0;
        let mut is_smaller = 0i32;
        let mut run = 0i32;
        if flag {
            run = decodebits(buf, &mut state, 5) as i32;
            is_smaller = run % 3;
            run -= is_smaller;
            is_smaller -= 1;
        }

        if run > 0 {
            let batch = run as usize / 3;
            if write + batch + 1 > natoms {
                return Err(format!(
                    "run of {batch} atoms overruns the {natoms}-atom frame at atom {write}"
                ));
            }
            let mut coord = [0i32; 3];
            for k in (0..run).step_by(3) {
                decodeints(buf, &mut state, smallidx as u32, sizesmall, &mut coord);
                atom += 1;
                coord[0] += prevcoord[0] - smallnum;
                coord[1] += prevcoord[1] - smallnum;
                coord[2] += prevcoord[2] - smallnum;
                if k == 0 {
                    // Waters are stored oxygen-first for compression; the
                    // first small atom swaps back in front of the large one.
                    std::mem::swap(&mut coord, &mut prevcoord);
                    store(positions, write, prevcoord, invprecision);
                    write += 1;
                } else {
                    prevcoord = coord;
                }
                store(positions, write, coord, invprecision);
                write += 1;
            }
        } else {
            store(positions, write, coord, invprecision);
            write += 1;
        }

        match is_smaller.cmp(&0) {
            std::cmp::Ordering::Less => {
                if smallidx == 0 {
                    return Err("small-integer index underflow".to_string());
                }
                smallidx -= 1;
                smallnum = smaller;
                smaller = if smallidx > FIRSTIDX {
                    MAGICINTS[smallidx - 1] / 2
                } else {
                    0
                };
            }
            std::cmp::Ordering::Greater => {
                smallidx += 1;
                if smallidx >= MAGICINTS.len() {
                    return Err("small-integer index overflow".to_string());
                }
                smaller = smallnum;
                smallnum = MAGICINTS[smallidx] / 2;
            }
            std::cmp::Ordering::Equal => {}
        }
        if MAGICINTS[smallidx] == 0 {
            return Err(format!("small-integer index {smallidx} maps to an empty range"));
        }
        sizesmall.fill(MAGICINTS[smallidx] as u32);
        atom += 1;
    }

    if state.overrun {
        return Err("compressed stream ended before all atoms were decoded".to_string());
    }
    Ok(())
}

#[inline]
fn store(positions: &mut [f32], atom: usize, coord: [i32; 3], invprecision: f32) {
    let slot = &mut positions[atom * 3..atom * 3 + 3];
    slot[0] = coord[0] as f32 * invprecision;
    slot[1] = coord[1] as f32 * invprecision;
    slot[2] = coord[2] as f32 * invprecision;
}

// ---------------------------------------------------------------------------
// Bit-level encoding
// ---------------------------------------------------------------------------

#[derive(Default)]
struct EncodeState {
    out: Vec<u8>,
    lastbits: usize,
    lastbyte: u32,
}

impl EncodeState {
    /// Push `nbits` bits of `num`, most significant first.
    fn encodebits(&mut self, mut nbits: usize, num: u32) {
        let mut lastbyte = self.lastbyte as u64;
        let mut lastbits = self.lastbits;

        while nbits >= 8 {
            lastbyte = (lastbyte << 8) | ((num >> (nbits - 8)) & 0xff) as u64;
            self.out.push((lastbyte >> lastbits) as u8);
            nbits -= 8;
        }
        if nbits > 0 {
            lastbyte = (lastbyte << nbits) | (num & ((1 << nbits) - 1)) as u64;
            lastbits += nbits;
            if lastbits >= 8 {
                lastbits -= 8;
                self.out.push((lastbyte >> lastbits) as u8);
            }
        }

        self.lastbits = lastbits;
        self.lastbyte = (lastbyte & 0xff) as u32;
    }

    /// Push an `nbits`-wide value as little-endian bytes with the partial
    /// byte on top, the exact inverse of [`decodeints`]'s accumulation.
    fn encode_value(&mut self, mut nbits: u32, v: u128) {
        let mut shift = 0u32;
        while nbits >= 8 {
            self.encodebits(8, ((v >> shift) & 0xff) as u32);
            shift += 8;
            nbits -= 8;
        }
        if nbits > 0 {
            self.encodebits(nbits as usize, ((v >> shift) & ((1 << nbits) - 1)) as u32);
        }
    }

    fn finish(mut self) -> Vec<u8> {
        if self.lastbits > 0 {
            self.out.push((self.lastbyte << (8 - self.lastbits)) as u8);
        }
        self.out
    }
}

/// Quantize and pack positions. Every atom is written individually with the
/// run flag clear; the format permits this and every conforming decoder
/// takes the `run == 0` branch for it.
fn encode_positions(
    positions: &[f32],
    precision: f32,
) -> std::result::Result<([i32; 3], [i32; 3], usize, Vec<u8>), String> {
    let mut ints = Vec::with_capacity(positions.len());
    for &value in positions {
        let scaled = value * precision;
        if !(-2.0e9..=2.0e9).contains(&scaled) {
            return Err(format!("position {value} overflows the quantized range"));
        }
        ints.push(scaled.round() as i32);
    }

    let mut minint = [i32::MAX; 3];
    let mut maxint = [i32::MIN; 3];
    for coord in ints.chunks_exact(3) {
        for d in 0..3 {
            minint[d] = minint[d].min(coord[d]);
            maxint[d] = maxint[d].max(coord[d]);
        }
    }

    let mut sizeint = [0u32; 3];
    let mut bitsizeint = [0u32; 3];
    let bitsize = calc_sizeint(minint, maxint, &mut sizeint, &mut bitsizeint);

    let smallidx = FIRSTIDX;
    let mut state = EncodeState::default();
    for coord in ints.chunks_exact(3) {
        let rel = [
            (coord[0] - minint[0]) as u32,
            (coord[1] - minint[1]) as u32,
            (coord[2] - minint[2]) as u32,
        ];
        if bitsize == 0 {
            // Huge ranges are coded per dimension as one direct bit value,
            // matching the decoder's plain decodebits path.
            state.encodebits(bitsizeint[0] as usize, rel[0]);
            state.encodebits(bitsizeint[1] as usize, rel[1]);
            state.encodebits(bitsizeint[2] as usize, rel[2]);
        } else {
            let v = (rel[0] as u128 * sizeint[1] as u128 + rel[1] as u128) * sizeint[2] as u128
                + rel[2] as u128;
            state.encode_value(bitsize, v);
        }
        state.encodebits(1, 0);
    }

    Ok((minint, maxint, smallidx, state.finish()))
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

pub struct XtcWriter<W: Write> {
    out: W,
    precision: f32,
}

impl XtcWriter<BufWriter<File>> {
    pub fn create(path: &Path, config: &ReadConfig) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file), config.output_precision))
    }
}

impl<W: Write> XtcWriter<W> {
    pub fn new(out: W, precision: f32) -> Self {
        Self { out, precision }
    }

    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let natoms = frame.n_atoms();
        let step: i32 = frame.step.try_into().map_err(|_| TrajError::Encode {
            format: "XTC",
            detail: format!("step {} does not fit the format's 32-bit field", frame.step),
        })?;

        xdr::write_i32(&mut self.out, MAGIC)?;
        xdr::write_i32(&mut self.out, natoms as i32)?;
        xdr::write_i32(&mut self.out, step)?;
        xdr::write_f32(&mut self.out, frame.time)?;
        xdr::write_f32s(&mut self.out, &frame.boxvec.to_cols_array())?;
        xdr::write_i32(&mut self.out, natoms as i32)?;

        if natoms <= UNCOMPRESSED_LIMIT {
            xdr::write_f32s(&mut self.out, &frame.positions)?;
        } else {
            let (minint, maxint, smallidx, payload) =
                encode_positions(&frame.positions, self.precision).map_err(|detail| {
                    TrajError::Encode {
                        format: "XTC",
                        detail,
                    }
                })?;
            xdr::write_f32(&mut self.out, self.precision)?;
            for value in minint {
                xdr::write_i32(&mut self.out, value)?;
            }
            for value in maxint {
                xdr::write_i32(&mut self.out, value)?;
            }
            xdr::write_u32(&mut self.out, smallidx as u32)?;
            xdr::write_opaque(&mut self.out, &payload)?;
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

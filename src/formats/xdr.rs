//! XDR primitives shared by the GROMACS formats.
//!
//! XDR data is big-endian; opaque byte strings are padded to 32-bit
//! boundaries. These helpers stay on `std::io::Result`, the format readers
//! wrap failures with path and frame context.

use std::io::{self, Read, Write};

/// Number of padding bytes that bring `count` up to a 32-bit boundary.
pub const fn padding(count: usize) -> usize {
    (4 - (count % 4)) % 4
}

pub fn read_i32<R: Read>(file: &mut R) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    file.read_exact(&mut buf)?;
    Ok(i32::from_be_bytes(buf))
}

pub fn read_u32<R: Read>(file: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    file.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

pub fn read_f32<R: Read>(file: &mut R) -> io::Result<f32> {
    let mut buf = [0u8; 4];
    file.read_exact(&mut buf)?;
    Ok(f32::from_be_bytes(buf))
}

pub fn read_f64<R: Read>(file: &mut R) -> io::Result<f64> {
    let mut buf = [0u8; 8];
    file.read_exact(&mut buf)?;
    Ok(f64::from_be_bytes(buf))
}

pub fn read_f32s<R: Read>(file: &mut R, buf: &mut [f32]) -> io::Result<()> {
    for value in buf {
        *value = read_f32(file)?;
    }
    Ok(())
}

/// Read `buf.len()` reals of the width fixed at header-parse time, narrowing
/// doubles to the canonical `f32`.
pub fn read_reals<R: Read>(file: &mut R, buf: &mut [f32], double: bool) -> io::Result<()> {
    if double {
        for value in buf {
            *value = read_f64(file)? as f32;
        }
        Ok(())
    } else {
        read_f32s(file, buf)
    }
}

/// Read an XDR opaque byte string: a `u32` count followed by the data and
/// padding up to the next 32-bit boundary.
pub fn read_opaque<R: Read>(file: &mut R, data: &mut Vec<u8>) -> io::Result<usize> {
    let count = read_u32(file)? as usize;
    data.resize(count + padding(count), 0);
    file.read_exact(data)?;
    data.truncate(count);
    Ok(count)
}

pub fn write_i32<W: Write>(file: &mut W, value: i32) -> io::Result<()> {
    file.write_all(&value.to_be_bytes())
}

pub fn write_u32<W: Write>(file: &mut W, value: u32) -> io::Result<()> {
    file.write_all(&value.to_be_bytes())
}

pub fn write_f32<W: Write>(file: &mut W, value: f32) -> io::Result<()> {
    file.write_all(&value.to_be_bytes())
}

pub fn write_f32s<W: Write>(file: &mut W, values: &[f32]) -> io::Result<()> {
    for &value in values {
        write_f32(file, value)?;
    }
    Ok(())
}

pub fn write_opaque<W: Write>(file: &mut W, data: &[u8]) -> io::Result<()> {
    write_u32(file, data.len() as u32)?;
    file.write_all(data)?;
    file.write_all(&[0u8; 4][..padding(data.len())])
}

//! # Binary Codec
//!
//! Little-endian fixed-width field encoding used by every substrate's
//! `save`/`load`. The layout is explicit (`i32` counts and tags, IEEE-754
//! `f64` reals, booleans as a single byte) so persisted populations are
//! portable across machines. Field order is load-equals-save everywhere.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{XcsfError, XcsfResult};

pub fn write_i32<W: Write>(w: &mut W, v: i32) -> XcsfResult<()> {
    w.write_i32::<LittleEndian>(v)?;
    Ok(())
}

pub fn read_i32<R: Read>(r: &mut R) -> XcsfResult<i32> {
    Ok(r.read_i32::<LittleEndian>()?)
}

pub fn write_f64<W: Write>(w: &mut W, v: f64) -> XcsfResult<()> {
    w.write_f64::<LittleEndian>(v)?;
    Ok(())
}

pub fn read_f64<R: Read>(r: &mut R) -> XcsfResult<f64> {
    Ok(r.read_f64::<LittleEndian>()?)
}

pub fn write_bool<W: Write>(w: &mut W, v: bool) -> XcsfResult<()> {
    w.write_u8(v as u8)?;
    Ok(())
}

pub fn read_bool<R: Read>(r: &mut R) -> XcsfResult<bool> {
    Ok(r.read_u8()? != 0)
}

/// Writes a collection length as an `i32` prefix.
pub fn write_len<W: Write>(w: &mut W, n: usize) -> XcsfResult<()> {
    let v = i32::try_from(n)
        .map_err(|_| XcsfError::serialization(format!("length {n} exceeds i32")))?;
    write_i32(w, v)
}

/// Reads an `i32` length prefix, rejecting negative values.
pub fn read_len<R: Read>(r: &mut R) -> XcsfResult<usize> {
    let v = read_i32(r)?;
    usize::try_from(v)
        .map_err(|_| XcsfError::serialization(format!("invalid length prefix: {v}")))
}

pub fn write_bytes<W: Write>(w: &mut W, vs: &[u8]) -> XcsfResult<()> {
    w.write_all(vs)?;
    Ok(())
}

pub fn read_bytes<R: Read>(r: &mut R, n: usize) -> XcsfResult<Vec<u8>> {
    let mut vs = vec![0u8; n];
    r.read_exact(&mut vs)?;
    Ok(vs)
}

pub fn write_f64_slice<W: Write>(w: &mut W, vs: &[f64]) -> XcsfResult<()> {
    for &v in vs {
        write_f64(w, v)?;
    }
    Ok(())
}

pub fn read_f64_vec<R: Read>(r: &mut R, n: usize) -> XcsfResult<Vec<f64>> {
    let mut vs = Vec::with_capacity(n);
    for _ in 0..n {
        vs.push(read_f64(r)?);
    }
    Ok(vs)
}

pub fn write_i32_slice<W: Write>(w: &mut W, vs: &[i32]) -> XcsfResult<()> {
    for &v in vs {
        write_i32(w, v)?;
    }
    Ok(())
}

pub fn read_i32_vec<R: Read>(r: &mut R, n: usize) -> XcsfResult<Vec<i32>> {
    let mut vs = Vec::with_capacity(n);
    for _ in 0..n {
        vs.push(read_i32(r)?);
    }
    Ok(vs)
}

pub fn write_bool_slice<W: Write>(w: &mut W, vs: &[bool]) -> XcsfResult<()> {
    for &v in vs {
        write_bool(w, v)?;
    }
    Ok(())
}

pub fn read_bool_vec<R: Read>(r: &mut R, n: usize) -> XcsfResult<Vec<bool>> {
    let mut vs = Vec::with_capacity(n);
    for _ in 0..n {
        vs.push(read_bool(r)?);
    }
    Ok(vs)
}

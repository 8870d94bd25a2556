//! Fixed, versioned, little-endian wire types for ghost exchange and restart.
//!
//! Every payload starts with a [`WireHdr`] followed by a [`WireCount`]. Flag
//! payloads then carry one byte per cell; state payloads carry one
//! [`WireKey`] and a fixed number of [`WireF64`] values per cell.

use crate::mesh_error::AmrError;
use crate::topology::tree_key::TreeKey;
use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;
use std::mem::size_of;

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

pub const KIND_SPLIT_FLAGS: u16 = 1;
pub const KIND_CELL_STATE: u16 = 2;
pub const KIND_REDUCE: u16 = 3;
pub const KIND_RESTART: u16 = 4;
pub const KIND_INDICATOR: u16 = 5;

/// All multi-byte integers in these structs are **little-endian** on the wire.
/// We store them pre-LE with `.to_le()` and decode with `.from_le()`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireHdr {
    pub version_le: u16,
    pub kind_le: u16,
    pub reserved_le: u32, // keep zero
}

impl WireHdr {
    pub fn new(kind: u16) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            kind_le: kind.to_le(),
            reserved_le: 0,
        }
    }
    pub fn kind(&self) -> u16 {
        u16::from_le(self.kind_le)
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u32,
}

impl WireCount {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u32).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u32::from_le(self.n_le) as usize
    }
}

/// Tree key of a cell, used to cross-check state payloads.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireKey {
    pub level_le: u32,
    pub coords_le: [u32; 3],
}

impl WireKey {
    pub fn of(key: &TreeKey) -> Self {
        Self {
            level_le: u32::from(key.level).to_le(),
            coords_le: key.coords.map(u32::to_le),
        }
    }
    pub fn get(&self) -> TreeKey {
        TreeKey {
            level: u32::from_le(self.level_le) as u8,
            coords: self.coords_le.map(u32::from_le),
        }
    }
}

#[repr(transparent)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireF64 {
    pub bits_le: u64,
}

impl WireF64 {
    pub fn of(v: f64) -> Self {
        Self {
            bits_le: v.to_bits().to_le(),
        }
    }
    pub fn get(&self) -> f64 {
        f64::from_bits(u64::from_le(self.bits_le))
    }
}

const_assert_eq!(size_of::<WireHdr>(), 8);
const_assert_eq!(size_of::<WireCount>(), 4);
const_assert_eq!(size_of::<WireKey>(), 16);
const_assert_eq!(size_of::<WireF64>(), 8);

/// Append a Pod record to `out`.
pub fn put<T: Pod>(out: &mut Vec<u8>, rec: &T) {
    out.extend_from_slice(bytemuck::bytes_of(rec));
}

/// Read a Pod record at the front of `buf`, advancing it.
pub fn take<T: Pod>(buf: &mut &[u8]) -> Result<T, AmrError> {
    let n = size_of::<T>();
    if buf.len() < n {
        return Err(AmrError::Wire(format!(
            "truncated payload: need {n} bytes, have {}",
            buf.len()
        )));
    }
    let (head, rest) = buf.split_at(n);
    *buf = rest;
    Ok(bytemuck::pod_read_unaligned(head))
}

/// Start a payload of `kind` holding `count` records.
pub fn begin(kind: u16, count: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(size_of::<WireHdr>() + size_of::<WireCount>() + count);
    put(&mut out, &WireHdr::new(kind));
    put(&mut out, &WireCount::new(count));
    out
}

/// Check the header of a payload of `kind` and return its record count.
pub fn open(buf: &mut &[u8], kind: u16) -> Result<usize, AmrError> {
    let hdr: WireHdr = take(buf)?;
    if hdr.version() != WIRE_VERSION {
        return Err(AmrError::Wire(format!(
            "unsupported wire version {} (expected {WIRE_VERSION})",
            hdr.version()
        )));
    }
    if hdr.kind() != kind {
        return Err(AmrError::Wire(format!(
            "unexpected payload kind {} (expected {kind})",
            hdr.kind()
        )));
    }
    Ok(take::<WireCount>(buf)?.get())
}

/// One byte per flag.
pub fn encode_flags(kind: u16, flags: &[bool]) -> Vec<u8> {
    let mut out = begin(kind, flags.len());
    out.extend(flags.iter().map(|&f| u8::from(f)));
    out
}

pub fn decode_flags(mut buf: &[u8], kind: u16) -> Result<Vec<bool>, AmrError> {
    let n = open(&mut buf, kind)?;
    if buf.len() != n {
        return Err(AmrError::Wire(format!(
            "expected {n} flag bytes, got {}",
            buf.len()
        )));
    }
    buf.iter()
        .map(|&b| match b {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(AmrError::Wire(format!("invalid flag byte {other}"))),
        })
        .collect()
}

pub fn put_f64s(out: &mut Vec<u8>, values: &[f64]) {
    let recs: Vec<WireF64> = values.iter().copied().map(WireF64::of).collect();
    out.extend_from_slice(bytemuck::cast_slice(&recs));
}

pub fn take_f64s(buf: &mut &[u8], n: usize) -> Result<Vec<f64>, AmrError> {
    (0..n).map(|_| take::<WireF64>(buf).map(|w| w.get())).collect()
}

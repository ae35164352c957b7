//! Fixed-width cell codecs backing each layer.
//!
//! A [`LayerStorage`] is a flat byte buffer of `cells` fixed-width slots. The
//! slot width is chosen by a [`StorageType`] tag:
//!
//! ```text
//! bit            1 bit   (8 cells per byte, floor(n/8)+1 bytes)
//! int8  uint8    1 byte
//! int16 uint16   2 bytes
//! int32 uint32   4 bytes  float (f32)
//! int64 uint64   8 bytes  double (f64)
//! ```
//!
//! Multi-byte cells are little-endian. Every layer owns two storages: one
//! for values and one for times.

use std::fmt;
use std::str::FromStr;

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::error::{LaminaError, StorageError};

/// Largest integer an `f32` holds exactly.
const F32_EXACT: i64 = 1 << 24;
/// Largest integer an `f64` holds exactly.
const F64_EXACT: i64 = 1 << 53;

/// Codec tag for a layer buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// One bit per cell; any non-zero value reads back as 1.
    Bit,
    /// 32-bit IEEE float.
    Float,
    /// 64-bit IEEE float.
    Double,
    /// Signed 8-bit integer.
    Int8,
    /// Signed 16-bit integer.
    Int16,
    /// Signed 32-bit integer.
    Int32,
    /// Signed 64-bit integer.
    Int64,
    /// Unsigned 8-bit integer.
    Uint8,
    /// Unsigned 16-bit integer.
    Uint16,
    /// Unsigned 32-bit integer.
    Uint32,
    /// Unsigned 64-bit integer.
    Uint64,
}

impl StorageType {
    /// Every supported tag, in declaration order.
    pub const ALL: [Self; 11] = [
        Self::Bit,
        Self::Float,
        Self::Double,
        Self::Int8,
        Self::Int16,
        Self::Int32,
        Self::Int64,
        Self::Uint8,
        Self::Uint16,
        Self::Uint32,
        Self::Uint64,
    ];

    /// Default codec for layer values.
    pub const DEFAULT_VALUE: Self = Self::Float;

    /// Default codec for layer times.
    pub const DEFAULT_TIME: Self = Self::Uint64;

    /// Picks the requested tag, or `default` when none was requested.
    pub fn resolve(requested: Option<Self>, default: Self) -> Self {
        requested.unwrap_or(default)
    }

    /// The lowercase tag used in configuration.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bit => "bit",
            Self::Float => "float",
            Self::Double => "double",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Uint8 => "uint8",
            Self::Uint16 => "uint16",
            Self::Uint32 => "uint32",
            Self::Uint64 => "uint64",
        }
    }

    /// Width of one cell in bytes, or `None` for the bit codec.
    pub const fn byte_width(self) -> Option<usize> {
        match self {
            Self::Bit => None,
            Self::Int8 | Self::Uint8 => Some(1),
            Self::Int16 | Self::Uint16 => Some(2),
            Self::Float | Self::Int32 | Self::Uint32 => Some(4),
            Self::Double | Self::Int64 | Self::Uint64 => Some(8),
        }
    }

    /// Number of bytes needed to store `cells` cells.
    pub const fn buffer_len(self, cells: usize) -> usize {
        match self.byte_width() {
            Some(width) => width * cells,
            None => cells / 8 + 1,
        }
    }

    /// Whether `value` can be stored without leaving the codec's range.
    ///
    /// Integer codecs truncate the fractional part on write, so only the
    /// integral range is checked.
    pub fn can_hold(self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        match self {
            Self::Bit | Self::Double => true,
            Self::Float => value.abs() <= f64::from(f32::MAX),
            Self::Int8 => signed_range(value, 8),
            Self::Int16 => signed_range(value, 16),
            Self::Int32 => signed_range(value, 32),
            Self::Int64 => signed_range(value, 64),
            Self::Uint8 => unsigned_range(value, 8),
            Self::Uint16 => unsigned_range(value, 16),
            Self::Uint32 => unsigned_range(value, 32),
            Self::Uint64 => unsigned_range(value, 64),
        }
    }

    /// Whether the integer `value` round-trips exactly through the codec.
    pub fn can_hold_integer(self, value: i64) -> bool {
        match self {
            Self::Bit => value == 0 || value == 1,
            Self::Float => value.abs() <= F32_EXACT,
            Self::Double => value.abs() <= F64_EXACT,
            Self::Int8 => i8::try_from(value).is_ok(),
            Self::Int16 => i16::try_from(value).is_ok(),
            Self::Int32 => i32::try_from(value).is_ok(),
            Self::Int64 => true,
            Self::Uint8 => u8::try_from(value).is_ok(),
            Self::Uint16 => u16::try_from(value).is_ok(),
            Self::Uint32 => u32::try_from(value).is_ok(),
            Self::Uint64 => value >= 0,
        }
    }
}

fn signed_range(value: f64, bits: i32) -> bool {
    let bound = 2f64.powi(bits - 1);
    value.trunc() >= -bound && value.trunc() < bound
}

fn unsigned_range(value: f64, bits: i32) -> bool {
    value.trunc() >= 0.0 && value.trunc() < 2f64.powi(bits)
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StorageType {
    type Err = LaminaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| StorageError::UnknownType { name: s.to_string() }.into())
    }
}

/// A fixed-size buffer of `cells` slots encoded with one [`StorageType`].
///
/// Callers validate values with [`StorageType::can_hold`] before writing;
/// out-of-range writes saturate instead of wrapping. Indexing past `cells`
/// panics.
#[derive(Debug, Clone)]
pub struct LayerStorage {
    kind: StorageType,
    cells: usize,
    buffer: Vec<u8>,
}

impl LayerStorage {
    /// Allocates a zero-filled buffer for `cells` slots.
    pub fn new(kind: StorageType, cells: usize) -> Self {
        Self {
            kind,
            cells,
            buffer: vec![0; kind.buffer_len(cells)],
        }
    }

    /// The codec tag.
    pub fn kind(&self) -> StorageType {
        self.kind
    }

    /// Number of logical slots.
    pub fn cells(&self) -> usize {
        self.cells
    }

    /// Size of the backing buffer in bytes.
    pub fn byte_len(&self) -> usize {
        self.buffer.len()
    }

    /// Zeroes every slot.
    pub fn clear(&mut self) {
        self.buffer.fill(0);
    }

    /// Reads slot `index` as a float.
    #[allow(clippy::cast_precision_loss)] // 64-bit integer cells may lose precision above 2^53
    pub fn read(&self, index: usize) -> f64 {
        match self.kind {
            StorageType::Bit => f64::from(u8::from(self.bit(index))),
            StorageType::Float => f64::from(LittleEndian::read_f32(self.cell(index))),
            StorageType::Double => LittleEndian::read_f64(self.cell(index)),
            StorageType::Int64 => LittleEndian::read_i64(self.cell(index)) as f64,
            StorageType::Uint64 => LittleEndian::read_u64(self.cell(index)) as f64,
            _ => self.read_integer(index) as f64,
        }
    }

    /// Writes `value` into slot `index`, truncating toward zero for integer
    /// codecs.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // range checked by can_hold; `as` saturates otherwise
    pub fn write(&mut self, index: usize, value: f64) {
        match self.kind {
            StorageType::Bit => self.set_bit(index, value != 0.0),
            StorageType::Float => LittleEndian::write_f32(self.cell_mut(index), value as f32),
            StorageType::Double => LittleEndian::write_f64(self.cell_mut(index), value),
            StorageType::Int8 => self.cell_mut(index)[0] = (value as i8).to_le_bytes()[0],
            StorageType::Int16 => LittleEndian::write_i16(self.cell_mut(index), value as i16),
            StorageType::Int32 => LittleEndian::write_i32(self.cell_mut(index), value as i32),
            StorageType::Int64 => LittleEndian::write_i64(self.cell_mut(index), value as i64),
            StorageType::Uint8 => self.cell_mut(index)[0] = value as u8,
            StorageType::Uint16 => LittleEndian::write_u16(self.cell_mut(index), value as u16),
            StorageType::Uint32 => LittleEndian::write_u32(self.cell_mut(index), value as u32),
            StorageType::Uint64 => LittleEndian::write_u64(self.cell_mut(index), value as u64),
        }
    }

    /// Reads slot `index` as an integer. Float cells are truncated.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)] // exact for values accepted by can_hold_integer
    pub fn read_integer(&self, index: usize) -> i64 {
        match self.kind {
            StorageType::Bit => i64::from(self.bit(index)),
            StorageType::Float => LittleEndian::read_f32(self.cell(index)) as i64,
            StorageType::Double => LittleEndian::read_f64(self.cell(index)) as i64,
            StorageType::Int8 => i64::from(i8::from_le_bytes([self.cell(index)[0]])),
            StorageType::Int16 => i64::from(LittleEndian::read_i16(self.cell(index))),
            StorageType::Int32 => i64::from(LittleEndian::read_i32(self.cell(index))),
            StorageType::Int64 => LittleEndian::read_i64(self.cell(index)),
            StorageType::Uint8 => i64::from(self.cell(index)[0]),
            StorageType::Uint16 => i64::from(LittleEndian::read_u16(self.cell(index))),
            StorageType::Uint32 => i64::from(LittleEndian::read_u32(self.cell(index))),
            StorageType::Uint64 => LittleEndian::read_u64(self.cell(index)) as i64,
        }
    }

    /// Writes an integer into slot `index` without passing through `f64`.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )] // range checked by can_hold_integer
    pub fn write_integer(&mut self, index: usize, value: i64) {
        match self.kind {
            StorageType::Bit => self.set_bit(index, value != 0),
            StorageType::Float => LittleEndian::write_f32(self.cell_mut(index), value as f32),
            StorageType::Double => LittleEndian::write_f64(self.cell_mut(index), value as f64),
            StorageType::Int8 => self.cell_mut(index)[0] = (value as i8).to_le_bytes()[0],
            StorageType::Int16 => LittleEndian::write_i16(self.cell_mut(index), value as i16),
            StorageType::Int32 => LittleEndian::write_i32(self.cell_mut(index), value as i32),
            StorageType::Int64 => LittleEndian::write_i64(self.cell_mut(index), value),
            StorageType::Uint8 => self.cell_mut(index)[0] = value as u8,
            StorageType::Uint16 => LittleEndian::write_u16(self.cell_mut(index), value as u16),
            StorageType::Uint32 => LittleEndian::write_u32(self.cell_mut(index), value as u32),
            StorageType::Uint64 => LittleEndian::write_u64(self.cell_mut(index), value as u64),
        }
    }

    fn cell(&self, index: usize) -> &[u8] {
        let width = self.width();
        &self.buffer[index * width..(index + 1) * width]
    }

    fn cell_mut(&mut self, index: usize) -> &mut [u8] {
        let width = self.width();
        &mut self.buffer[index * width..(index + 1) * width]
    }

    fn width(&self) -> usize {
        self.kind.byte_width().unwrap_or(1)
    }

    fn bit(&self, index: usize) -> bool {
        assert!(index < self.cells, "bit index {index} out of range");
        let (byte_index, bit_index) = bit_position(index);
        self.buffer[byte_index] & (1 << bit_index) != 0
    }

    fn set_bit(&mut self, index: usize, on: bool) {
        assert!(index < self.cells, "bit index {index} out of range");
        let (byte_index, bit_index) = bit_position(index);
        if on {
            self.buffer[byte_index] |= 1 << bit_index;
        } else {
            self.buffer[byte_index] &= !(1 << bit_index);
        }
    }
}

/// Byte and bit offset of a bit-packed cell.
const fn bit_position(index: usize) -> (usize, usize) {
    (index / 8, index % 8)
}

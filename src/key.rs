//! Search key normalisation.
//!
//! Keys are byte strings whose lexicographic order matches the index order.
//! Both the client key builder and the reference engine produce keys
//! through `normalize_segment`, so a key made on a cursor compares directly
//! against the keys of index entries.

use crate::constants::MakeKeyGrbit;
use crate::error::{Error, Result};
use crate::types::{ColumnType, TextEncoding};
use crate::value::decode_text;

const HEADER_NULL: u8 = 0x01;
const HEADER_NULL_HIGH: u8 = 0xFE;
const HEADER_PRESENT: u8 = 0x7F;

/// How one index column is laid out in a normalised key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentFormat {
    pub coltyp: ColumnType,
    pub encoding: TextEncoding,
    pub descending: bool,
    /// Nulls sort after every present value
    pub nulls_high: bool,
}

/// Append the normalised form of one segment to `out`. `data` is the
/// column's stored byte image, `None` for null. With `partial`, text and
/// binary values omit their terminator so the result is a prefix of every
/// longer value.
pub fn normalize_segment(
    format: &SegmentFormat,
    data: Option<&[u8]>,
    partial: bool,
    out: &mut Vec<u8>,
) -> Result<()> {
    let start = out.len();
    match data {
        None => out.push(if format.nulls_high {
            HEADER_NULL_HIGH
        } else {
            HEADER_NULL
        }),
        Some(data) => {
            out.push(HEADER_PRESENT);
            encode_body(format, data, partial, out)?;
        }
    }
    if format.descending {
        for byte in &mut out[start..] {
            *byte = !*byte;
        }
    }
    Ok(())
}

fn encode_body(format: &SegmentFormat, data: &[u8], partial: bool, out: &mut Vec<u8>) -> Result<()> {
    if let Some(size) = format.coltyp.fixed_size() {
        if data.len() != size {
            return Err(Error::InvalidBufferSize);
        }
    }
    match format.coltyp {
        ColumnType::Bit => out.push(u8::from(data[0] != 0)),
        ColumnType::UnsignedByte => out.push(data[0]),
        ColumnType::Short => {
            let v = i16::from_le_bytes([data[0], data[1]]);
            out.extend_from_slice(&((v as u16) ^ 0x8000).to_be_bytes());
        }
        ColumnType::UnsignedShort => {
            out.extend_from_slice(&u16::from_le_bytes([data[0], data[1]]).to_be_bytes())
        }
        ColumnType::Long => {
            let v = i32::from_le_bytes(array(data)?);
            out.extend_from_slice(&((v as u32) ^ (1 << 31)).to_be_bytes());
        }
        ColumnType::UnsignedLong => {
            out.extend_from_slice(&u32::from_le_bytes(array(data)?).to_be_bytes())
        }
        ColumnType::LongLong | ColumnType::Currency => {
            let v = i64::from_le_bytes(array(data)?);
            out.extend_from_slice(&((v as u64) ^ (1 << 63)).to_be_bytes());
        }
        ColumnType::UnsignedLongLong => {
            out.extend_from_slice(&u64::from_le_bytes(array(data)?).to_be_bytes())
        }
        ColumnType::IeeeSingle => {
            let bits = u32::from_le_bytes(array(data)?);
            let bits = if bits >> 31 == 1 { !bits } else { bits ^ (1 << 31) };
            out.extend_from_slice(&bits.to_be_bytes());
        }
        ColumnType::IeeeDouble | ColumnType::DateTime => {
            let bits = u64::from_le_bytes(array(data)?);
            let bits = if bits >> 63 == 1 { !bits } else { bits ^ (1 << 63) };
            out.extend_from_slice(&bits.to_be_bytes());
        }
        ColumnType::Guid => out.extend_from_slice(data),
        ColumnType::Text | ColumnType::LongText => {
            let text = decode_text(data, format.encoding)?;
            escape(text.as_bytes(), partial, out);
        }
        ColumnType::Binary | ColumnType::LongBinary => escape(data, partial, out),
    }
    Ok(())
}

fn array<const N: usize>(data: &[u8]) -> Result<[u8; N]> {
    data.try_into().map_err(|_| Error::InvalidBufferSize)
}

// 0x00 is escaped as 0x00 0xFF and values end with 0x00 0x00, which keeps
// shorter values ordered before their extensions.
fn escape(data: &[u8], partial: bool, out: &mut Vec<u8>) {
    for &byte in data {
        if byte == 0x00 {
            out.extend_from_slice(&[0x00, 0xFF]);
        } else {
            out.push(byte);
        }
    }
    if !partial {
        out.extend_from_slice(&[0x00, 0x00]);
    }
}

/// Accumulates key segments for one cursor's current index
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    segments: Vec<SegmentFormat>,
    key_most: usize,
    key: Vec<u8>,
    next_segment: usize,
    made: bool,
    /// A limit or a normalised key was supplied; no more segments fit
    complete: bool,
}

impl KeyBuilder {
    pub fn new(segments: Vec<SegmentFormat>, key_most: usize) -> Self {
        KeyBuilder {
            segments,
            key_most,
            key: Vec::new(),
            next_segment: 0,
            made: false,
            complete: false,
        }
    }

    pub fn key_most(&self) -> usize {
        self.key_most
    }

    /// Format of the segment the next `make_key` call fills, if any
    pub fn next_format(&self, grbit: MakeKeyGrbit) -> Option<&SegmentFormat> {
        let next = if grbit.contains(MakeKeyGrbit::NEW_KEY) {
            0
        } else {
            self.next_segment
        };
        self.segments.get(next)
    }

    /// Append the next segment. `data` is the column's stored byte image;
    /// an empty slice means null unless `KEY_DATA_ZERO_LENGTH` is given.
    pub fn make_key(&mut self, data: Option<&[u8]>, grbit: MakeKeyGrbit) -> Result<()> {
        if grbit.contains(MakeKeyGrbit::NEW_KEY) {
            self.reset();
        } else if !self.made {
            return Err(Error::KeyNotMade);
        }

        if grbit.contains(MakeKeyGrbit::NORMALIZED_KEY) {
            let data = data.unwrap_or_default();
            if data.len() > self.key_most + 1 {
                return Err(Error::KeyTooLong {
                    actual: data.len(),
                    max: self.key_most,
                });
            }
            self.key = data.to_vec();
            self.made = true;
            self.complete = true;
            return Ok(());
        }

        if self.complete {
            return Err(Error::KeyIsMade);
        }
        let format = self
            .segments
            .get(self.next_segment)
            .copied()
            .ok_or(Error::KeyIsMade)?;

        let data = match data {
            Some(bytes)
                if bytes.is_empty()
                    && (!format.coltyp.is_variable()
                        || !grbit.contains(MakeKeyGrbit::KEY_DATA_ZERO_LENGTH)) =>
            {
                None
            }
            other => other,
        };
        let partial = grbit.intersects(
            MakeKeyGrbit::PARTIAL_COLUMN_START_LIMIT | MakeKeyGrbit::PARTIAL_COLUMN_END_LIMIT,
        );

        let mut segment = Vec::new();
        normalize_segment(&format, data, partial, &mut segment)?;
        let actual = self.key.len() + segment.len();
        if actual > self.key_most {
            return Err(Error::KeyTooLong {
                actual,
                max: self.key_most,
            });
        }

        self.key.extend_from_slice(&segment);
        self.next_segment += 1;
        self.made = true;

        if grbit.intersects(MakeKeyGrbit::LIMITS) {
            self.complete = true;
            if grbit.intersects(
                MakeKeyGrbit::FULL_COLUMN_END_LIMIT | MakeKeyGrbit::PARTIAL_COLUMN_END_LIMIT,
            ) {
                self.key.resize(self.key_most + 1, 0xFF);
            }
        }
        Ok(())
    }

    pub fn is_made(&self) -> bool {
        self.made
    }

    /// The key built so far
    pub fn key(&self) -> Result<&[u8]> {
        if self.made {
            Ok(&self.key)
        } else {
            Err(Error::KeyNotMade)
        }
    }

    pub fn reset(&mut self) {
        self.key.clear();
        self.next_segment = 0;
        self.made = false;
        self.complete = false;
    }
}

//! Typed column codec.
//!
//! Converts between typed values and the flat little-endian byte images the
//! engine stores. Null is carried in the value itself (`TypedValue::Int32(None)`)
//! and is distinct from a present zero-length string or binary value.

use chrono::{DateTime, NaiveDateTime};
use uuid::Uuid;

use crate::constants::{RetrieveColumnGrbit, SetColumnGrbit};
use crate::error::{Error, Result};
use crate::types::{ColumnId, ColumnType, TextEncoding, Warning};

const MILLIS_PER_DAY: i64 = 86_400_000;
/// Milliseconds between 1899-12-30 (OLE Automation epoch) and 1970-01-01
const OA_EPOCH_OFFSET_MILLIS: i64 = 2_209_161_600_000;
/// Valid OLE Automation date range (exclusive), 0100-01-01 .. 10000-01-01
const OA_DATE_MIN: f64 = -657_435.0;
const OA_DATE_MAX: f64 = 2_958_466.0;

/// Type tag of a `TypedValue`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
    DateTime,
    Guid,
    String,
    Binary,
}

impl ValueKind {
    /// Exact byte size of fixed-width kinds
    pub fn size(self) -> Option<usize> {
        match self {
            ValueKind::Bool | ValueKind::Byte => Some(1),
            ValueKind::Int16 | ValueKind::UInt16 => Some(2),
            ValueKind::Int32 | ValueKind::UInt32 | ValueKind::Float => Some(4),
            ValueKind::Int64 | ValueKind::UInt64 | ValueKind::Double | ValueKind::DateTime => {
                Some(8)
            }
            ValueKind::Guid => Some(16),
            ValueKind::String | ValueKind::Binary => None,
        }
    }

    /// Column type a value of this kind is normally stored in
    pub fn column_type(self) -> ColumnType {
        match self {
            ValueKind::Bool => ColumnType::Bit,
            ValueKind::Byte => ColumnType::UnsignedByte,
            ValueKind::Int16 => ColumnType::Short,
            ValueKind::UInt16 => ColumnType::UnsignedShort,
            ValueKind::Int32 => ColumnType::Long,
            ValueKind::UInt32 => ColumnType::UnsignedLong,
            ValueKind::Int64 => ColumnType::LongLong,
            ValueKind::UInt64 => ColumnType::UnsignedLongLong,
            ValueKind::Float => ColumnType::IeeeSingle,
            ValueKind::Double => ColumnType::IeeeDouble,
            ValueKind::DateTime => ColumnType::DateTime,
            ValueKind::Guid => ColumnType::Guid,
            ValueKind::String => ColumnType::LongText,
            ValueKind::Binary => ColumnType::LongBinary,
        }
    }
}

/// A nullable typed column value
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Bool(Option<bool>),
    Byte(Option<u8>),
    Int16(Option<i16>),
    UInt16(Option<u16>),
    Int32(Option<i32>),
    UInt32(Option<u32>),
    Int64(Option<i64>),
    UInt64(Option<u64>),
    Float(Option<f32>),
    Double(Option<f64>),
    DateTime(Option<NaiveDateTime>),
    Guid(Option<Uuid>),
    String(Option<String>),
    Binary(Option<Vec<u8>>),
}

/// Byte image produced by `TypedValue::encode`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub is_null: bool,
}

impl Encoded {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Data pointer for the engine: `None` sets null
    pub fn data(&self) -> Option<&[u8]> {
        if self.is_null {
            None
        } else {
            Some(&self.bytes)
        }
    }

    /// Extra set options needed to store this image faithfully
    pub fn set_grbit(&self) -> SetColumnGrbit {
        if !self.is_null && self.bytes.is_empty() {
            SetColumnGrbit::ZERO_LENGTH
        } else {
            SetColumnGrbit::empty()
        }
    }
}

impl TypedValue {
    /// The null value of a kind
    pub fn null(kind: ValueKind) -> TypedValue {
        match kind {
            ValueKind::Bool => TypedValue::Bool(None),
            ValueKind::Byte => TypedValue::Byte(None),
            ValueKind::Int16 => TypedValue::Int16(None),
            ValueKind::UInt16 => TypedValue::UInt16(None),
            ValueKind::Int32 => TypedValue::Int32(None),
            ValueKind::UInt32 => TypedValue::UInt32(None),
            ValueKind::Int64 => TypedValue::Int64(None),
            ValueKind::UInt64 => TypedValue::UInt64(None),
            ValueKind::Float => TypedValue::Float(None),
            ValueKind::Double => TypedValue::Double(None),
            ValueKind::DateTime => TypedValue::DateTime(None),
            ValueKind::Guid => TypedValue::Guid(None),
            ValueKind::String => TypedValue::String(None),
            ValueKind::Binary => TypedValue::Binary(None),
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            TypedValue::Bool(_) => ValueKind::Bool,
            TypedValue::Byte(_) => ValueKind::Byte,
            TypedValue::Int16(_) => ValueKind::Int16,
            TypedValue::UInt16(_) => ValueKind::UInt16,
            TypedValue::Int32(_) => ValueKind::Int32,
            TypedValue::UInt32(_) => ValueKind::UInt32,
            TypedValue::Int64(_) => ValueKind::Int64,
            TypedValue::UInt64(_) => ValueKind::UInt64,
            TypedValue::Float(_) => ValueKind::Float,
            TypedValue::Double(_) => ValueKind::Double,
            TypedValue::DateTime(_) => ValueKind::DateTime,
            TypedValue::Guid(_) => ValueKind::Guid,
            TypedValue::String(_) => ValueKind::String,
            TypedValue::Binary(_) => ValueKind::Binary,
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            TypedValue::Bool(v) => v.is_none(),
            TypedValue::Byte(v) => v.is_none(),
            TypedValue::Int16(v) => v.is_none(),
            TypedValue::UInt16(v) => v.is_none(),
            TypedValue::Int32(v) => v.is_none(),
            TypedValue::UInt32(v) => v.is_none(),
            TypedValue::Int64(v) => v.is_none(),
            TypedValue::UInt64(v) => v.is_none(),
            TypedValue::Float(v) => v.is_none(),
            TypedValue::Double(v) => v.is_none(),
            TypedValue::DateTime(v) => v.is_none(),
            TypedValue::Guid(v) => v.is_none(),
            TypedValue::String(v) => v.is_none(),
            TypedValue::Binary(v) => v.is_none(),
        }
    }

    /// Byte length of the stored image: 0 for null, the fixed size for
    /// present fixed-width values, the data length otherwise.
    pub fn length(&self) -> usize {
        if self.is_null() {
            return 0;
        }
        match self {
            TypedValue::String(Some(s)) => s.encode_utf16().count() * 2,
            TypedValue::Binary(Some(b)) => b.len(),
            other => other.kind().size().unwrap_or(0),
        }
    }

    pub fn encode(&self) -> Result<Encoded> {
        self.encode_with(TextEncoding::Unicode)
    }

    /// Encode, using `encoding` for string values
    pub fn encode_with(&self, encoding: TextEncoding) -> Result<Encoded> {
        let bytes = match self {
            TypedValue::Bool(Some(v)) => vec![if *v { 0xFF } else { 0x00 }],
            TypedValue::Byte(Some(v)) => vec![*v],
            TypedValue::Int16(Some(v)) => v.to_le_bytes().to_vec(),
            TypedValue::UInt16(Some(v)) => v.to_le_bytes().to_vec(),
            TypedValue::Int32(Some(v)) => v.to_le_bytes().to_vec(),
            TypedValue::UInt32(Some(v)) => v.to_le_bytes().to_vec(),
            TypedValue::Int64(Some(v)) => v.to_le_bytes().to_vec(),
            TypedValue::UInt64(Some(v)) => v.to_le_bytes().to_vec(),
            TypedValue::Float(Some(v)) => v.to_le_bytes().to_vec(),
            TypedValue::Double(Some(v)) => v.to_le_bytes().to_vec(),
            TypedValue::DateTime(Some(v)) => to_oa_date(v)?.to_le_bytes().to_vec(),
            TypedValue::Guid(Some(v)) => v.to_bytes_le().to_vec(),
            TypedValue::String(Some(s)) => encode_text(s, encoding),
            TypedValue::Binary(Some(b)) => b.clone(),
            _ => {
                return Ok(Encoded {
                    bytes: Vec::new(),
                    is_null: true,
                })
            }
        };
        Ok(Encoded {
            bytes,
            is_null: false,
        })
    }

    /// Decode `count` bytes at `offset` of `buffer` as `kind`. A
    /// `ColumnNull` warning yields null whatever the buffer holds.
    pub fn decode(
        kind: ValueKind,
        buffer: &[u8],
        offset: usize,
        count: usize,
        warning: Option<Warning>,
    ) -> Result<TypedValue> {
        Self::decode_with(kind, buffer, offset, count, warning, TextEncoding::Unicode)
    }

    pub fn decode_with(
        kind: ValueKind,
        buffer: &[u8],
        offset: usize,
        count: usize,
        warning: Option<Warning>,
        encoding: TextEncoding,
    ) -> Result<TypedValue> {
        if warning == Some(Warning::ColumnNull) {
            return Ok(TypedValue::null(kind));
        }
        let end = offset
            .checked_add(count)
            .filter(|end| *end <= buffer.len())
            .ok_or(Error::InvalidParameter("decode range outside buffer"))?;
        let data = &buffer[offset..end];

        if let Some(expected) = kind.size() {
            if count != expected {
                return Err(Error::InvalidColumnSize {
                    expected,
                    actual: count,
                });
            }
        }

        let value = match kind {
            ValueKind::Bool => TypedValue::Bool(Some(data[0] != 0)),
            ValueKind::Byte => TypedValue::Byte(Some(data[0])),
            ValueKind::Int16 => TypedValue::Int16(Some(i16::from_le_bytes(fixed(data)?))),
            ValueKind::UInt16 => TypedValue::UInt16(Some(u16::from_le_bytes(fixed(data)?))),
            ValueKind::Int32 => TypedValue::Int32(Some(i32::from_le_bytes(fixed(data)?))),
            ValueKind::UInt32 => TypedValue::UInt32(Some(u32::from_le_bytes(fixed(data)?))),
            ValueKind::Int64 => TypedValue::Int64(Some(i64::from_le_bytes(fixed(data)?))),
            ValueKind::UInt64 => TypedValue::UInt64(Some(u64::from_le_bytes(fixed(data)?))),
            ValueKind::Float => TypedValue::Float(Some(f32::from_le_bytes(fixed(data)?))),
            ValueKind::Double => TypedValue::Double(Some(f64::from_le_bytes(fixed(data)?))),
            ValueKind::DateTime => {
                TypedValue::DateTime(Some(from_oa_date(f64::from_le_bytes(fixed(data)?))?))
            }
            ValueKind::Guid => TypedValue::Guid(Some(Uuid::from_bytes_le(fixed(data)?))),
            ValueKind::String => TypedValue::String(Some(decode_text(data, encoding)?)),
            ValueKind::Binary => TypedValue::Binary(Some(data.to_vec())),
        };
        Ok(value)
    }
}

fn fixed<const N: usize>(data: &[u8]) -> Result<[u8; N]> {
    data.try_into().map_err(|_| Error::InvalidColumnSize {
        expected: N,
        actual: data.len(),
    })
}

/// Encode text for a column of the given encoding
pub fn encode_text(s: &str, encoding: TextEncoding) -> Vec<u8> {
    match encoding {
        TextEncoding::Unicode => s.encode_utf16().flat_map(u16::to_le_bytes).collect(),
        TextEncoding::Ascii => s
            .chars()
            .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
            .collect(),
    }
}

/// Decode text stored with the given encoding
pub fn decode_text(data: &[u8], encoding: TextEncoding) -> Result<String> {
    match encoding {
        TextEncoding::Unicode => {
            if data.len() % 2 != 0 {
                return Err(Error::InvalidColumnSize {
                    expected: data.len() - 1,
                    actual: data.len(),
                });
            }
            let units: Vec<u16> = data
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            Ok(String::from_utf16_lossy(&units))
        }
        TextEncoding::Ascii => Ok(data
            .iter()
            .map(|&b| if b.is_ascii() { b as char } else { '?' })
            .collect()),
    }
}

/// Convert to an OLE Automation date. Precision is one millisecond; any
/// finer part is dropped. Dates before 0100-01-01 or after 9999-12-31 fail
/// with `InvalidParameter`.
pub fn to_oa_date(value: &NaiveDateTime) -> Result<f64> {
    let mut millis = value.and_utc().timestamp_millis() + OA_EPOCH_OFFSET_MILLIS;
    if millis < 0 {
        // Negative dates count whole days backwards but the time of day forwards
        let frac = millis % MILLIS_PER_DAY;
        if frac != 0 {
            millis -= (MILLIS_PER_DAY + frac) * 2;
        }
    }
    let days = millis as f64 / MILLIS_PER_DAY as f64;
    if !(days > OA_DATE_MIN && days < OA_DATE_MAX) {
        return Err(Error::InvalidParameter("OLE Automation date out of range"));
    }
    Ok(days)
}

/// Convert from an OLE Automation date, rounding to milliseconds
pub fn from_oa_date(value: f64) -> Result<NaiveDateTime> {
    if !(value > OA_DATE_MIN && value < OA_DATE_MAX) {
        return Err(Error::InvalidParameter("OLE Automation date out of range"));
    }
    let round = if value >= 0.0 { 0.5 } else { -0.5 };
    let mut millis = (value * MILLIS_PER_DAY as f64 + round) as i64;
    if millis < 0 {
        millis -= (millis % MILLIS_PER_DAY) * 2;
    }
    DateTime::from_timestamp_millis(millis - OA_EPOCH_OFFSET_MILLIS)
        .map(|dt| dt.naive_utc())
        .ok_or(Error::InvalidParameter("OLE Automation date out of range"))
}

/// Rust types that map onto a `TypedValue` variant
pub trait ColumnData: Sized {
    const KIND: ValueKind;

    fn into_value(value: Option<Self>) -> TypedValue;

    /// `None` when `value` is null or of another kind
    fn from_value(value: TypedValue) -> Option<Self>;
}

macro_rules! column_data {
    ($ty:ty, $variant:ident) => {
        impl ColumnData for $ty {
            const KIND: ValueKind = ValueKind::$variant;

            fn into_value(value: Option<Self>) -> TypedValue {
                TypedValue::$variant(value)
            }

            fn from_value(value: TypedValue) -> Option<Self> {
                match value {
                    TypedValue::$variant(v) => v,
                    _ => None,
                }
            }
        }

        impl From<$ty> for TypedValue {
            fn from(value: $ty) -> TypedValue {
                TypedValue::$variant(Some(value))
            }
        }
    };
}

column_data!(bool, Bool);
column_data!(u8, Byte);
column_data!(i16, Int16);
column_data!(u16, UInt16);
column_data!(i32, Int32);
column_data!(u32, UInt32);
column_data!(i64, Int64);
column_data!(u64, UInt64);
column_data!(f32, Float);
column_data!(f64, Double);
column_data!(NaiveDateTime, DateTime);
column_data!(Uuid, Guid);
column_data!(String, String);
column_data!(Vec<u8>, Binary);

impl From<&str> for TypedValue {
    fn from(value: &str) -> TypedValue {
        TypedValue::String(Some(value.to_owned()))
    }
}

impl From<&[u8]> for TypedValue {
    fn from(value: &[u8]) -> TypedValue {
        TypedValue::Binary(Some(value.to_vec()))
    }
}

/// A column id bound to a typed value, used for batched retrieval and
/// batched sets.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnValue {
    pub columnid: ColumnId,
    pub value: TypedValue,
    pub set_grbit: SetColumnGrbit,
    pub retrieve_grbit: RetrieveColumnGrbit,
    /// Multi-valued instance, 1-based; 0 appends on set
    pub itag_sequence: u32,
    pub(crate) warning: Option<Warning>,
}

impl ColumnValue {
    pub fn new(columnid: ColumnId, value: impl Into<TypedValue>) -> Self {
        ColumnValue {
            columnid,
            value: value.into(),
            set_grbit: SetColumnGrbit::empty(),
            retrieve_grbit: RetrieveColumnGrbit::empty(),
            itag_sequence: 1,
            warning: None,
        }
    }

    /// A value slot to be filled by retrieval
    pub fn retrieve(columnid: ColumnId, kind: ValueKind) -> Self {
        ColumnValue::new(columnid, TypedValue::null(kind))
    }

    pub fn itag_sequence(mut self, itag_sequence: u32) -> Self {
        self.itag_sequence = itag_sequence;
        self
    }

    pub fn set_grbit(mut self, grbit: SetColumnGrbit) -> Self {
        self.set_grbit = grbit;
        self
    }

    pub fn retrieve_grbit(mut self, grbit: RetrieveColumnGrbit) -> Self {
        self.retrieve_grbit = grbit;
        self
    }

    pub fn length(&self) -> usize {
        self.value.length()
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    /// Warning the engine reported for the last retrieval into this value
    pub fn warning(&self) -> Option<Warning> {
        self.warning
    }
}

use std::fmt;

use crate::constants::{status, ColumnDefGrbit, IndexCreateGrbit, CP_ASCII, CP_UNICODE};

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl $name {
            /// The invalid handle
            pub const NIL: $name = $name(0);

            pub fn is_nil(self) -> bool {
                self == Self::NIL
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::NIL
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(0x{:x})", stringify!($name), self.0)
            }
        }
    };
}

handle!(
    /// Engine instance handle
    InstanceId
);
handle!(
    /// Session handle
    SessionId
);
handle!(
    /// Open database handle, scoped to a session
    DbId
);
handle!(
    /// Cursor handle on a table
    TableId
);

/// Column identifier within a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ColumnId(pub u32);

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "column {}", self.0)
    }
}

/// Storage type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Bit,
    UnsignedByte,
    Short,
    Long,
    Currency,
    IeeeSingle,
    IeeeDouble,
    DateTime,
    Binary,
    Text,
    LongBinary,
    LongText,
    UnsignedLong,
    LongLong,
    Guid,
    UnsignedShort,
    UnsignedLongLong,
}

impl ColumnType {
    /// Byte size of fixed-width types, `None` for variable types
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            ColumnType::Bit | ColumnType::UnsignedByte => Some(1),
            ColumnType::Short | ColumnType::UnsignedShort => Some(2),
            ColumnType::Long | ColumnType::UnsignedLong | ColumnType::IeeeSingle => Some(4),
            ColumnType::Currency
            | ColumnType::IeeeDouble
            | ColumnType::DateTime
            | ColumnType::LongLong
            | ColumnType::UnsignedLongLong => Some(8),
            ColumnType::Guid => Some(16),
            ColumnType::Binary
            | ColumnType::Text
            | ColumnType::LongBinary
            | ColumnType::LongText => None,
        }
    }

    pub fn is_text(self) -> bool {
        matches!(self, ColumnType::Text | ColumnType::LongText)
    }

    pub fn is_variable(self) -> bool {
        self.fixed_size().is_none()
    }
}

/// Text encoding of a string column or key segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextEncoding {
    /// UTF-16 little-endian code units
    #[default]
    Unicode,
    /// One byte per character, non-ASCII characters become `?`
    Ascii,
}

impl TextEncoding {
    pub fn from_code_page(cp: u16) -> TextEncoding {
        if cp == CP_ASCII {
            TextEncoding::Ascii
        } else {
            TextEncoding::Unicode
        }
    }

    pub fn code_page(self) -> u16 {
        match self {
            TextEncoding::Unicode => CP_UNICODE,
            TextEncoding::Ascii => CP_ASCII,
        }
    }
}

/// Non-fatal status reported alongside a successful call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Warning {
    ColumnNull,
    BufferTruncated,
    DatabaseAttached,
    SeekNotEqual,
    Other(i32),
}

impl Warning {
    pub(crate) fn from_code(code: i32) -> Warning {
        match code {
            status::WRN_COLUMN_NULL => Warning::ColumnNull,
            status::WRN_BUFFER_TRUNCATED => Warning::BufferTruncated,
            status::WRN_DATABASE_ATTACHED => Warning::DatabaseAttached,
            status::WRN_SEEK_NOT_EQUAL => Warning::SeekNotEqual,
            code => Warning::Other(code),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Warning::ColumnNull => status::WRN_COLUMN_NULL,
            Warning::BufferTruncated => status::WRN_BUFFER_TRUNCATED,
            Warning::DatabaseAttached => status::WRN_DATABASE_ATTACHED,
            Warning::SeekNotEqual => status::WRN_SEEK_NOT_EQUAL,
            Warning::Other(code) => code,
        }
    }
}

/// Definition of a new column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub coltyp: ColumnType,
    /// Code page for text columns
    pub cp: u16,
    /// Maximum length in bytes for variable columns, 0 for no limit
    pub max_length: u32,
    pub grbit: ColumnDefGrbit,
    pub default_value: Option<Vec<u8>>,
}

impl ColumnDef {
    pub fn new(coltyp: ColumnType) -> Self {
        ColumnDef {
            coltyp,
            cp: if coltyp.is_text() { CP_UNICODE } else { 0 },
            max_length: 0,
            grbit: ColumnDefGrbit::empty(),
            default_value: None,
        }
    }

    pub fn text(encoding: TextEncoding) -> Self {
        ColumnDef {
            cp: encoding.code_page(),
            ..ColumnDef::new(ColumnType::LongText)
        }
    }

    pub fn grbit(mut self, grbit: ColumnDefGrbit) -> Self {
        self.grbit |= grbit;
        self
    }

    pub fn max_length(mut self, max_length: u32) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn default_value(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

/// Definition of a new index. `key` uses the engine key description syntax,
/// e.g. `"+Id\0-Name\0\0"`.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexCreate {
    pub name: String,
    pub key: String,
    pub grbit: IndexCreateGrbit,
    pub density: u32,
    /// Maximum normalized key size, 0 for the engine default
    pub key_most: u32,
}

impl IndexCreate {
    pub fn new(name: impl Into<String>, key: impl Into<String>, grbit: IndexCreateGrbit) -> Self {
        IndexCreate {
            name: name.into(),
            key: key.into(),
            grbit,
            density: 100,
            key_most: 0,
        }
    }

    pub fn key_most(mut self, key_most: u32) -> Self {
        self.key_most = key_most;
        self
    }
}

/// Column entry of a `TableCreate`
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnCreate {
    pub name: String,
    pub def: ColumnDef,
}

/// Table plus its columns and indexes, created in one call
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableCreate {
    pub name: String,
    pub pages: u32,
    pub density: u32,
    pub columns: Vec<ColumnCreate>,
    pub indexes: Vec<IndexCreate>,
}

impl TableCreate {
    pub fn new(name: impl Into<String>) -> Self {
        TableCreate {
            name: name.into(),
            pages: 1,
            density: 100,
            ..Default::default()
        }
    }

    pub fn column(mut self, name: impl Into<String>, def: ColumnDef) -> Self {
        self.columns.push(ColumnCreate {
            name: name.into(),
            def,
        });
        self
    }

    pub fn index(mut self, index: IndexCreate) -> Self {
        self.indexes.push(index);
        self
    }
}

/// One entry of a batched set submitted to the engine. `data` of `None`
/// sets the column to null.
#[derive(Debug, Clone, Copy)]
pub struct SetColumn<'a> {
    pub columnid: ColumnId,
    pub data: Option<&'a [u8]>,
    pub grbit: crate::constants::SetColumnGrbit,
    pub itag_sequence: u32,
}

/// Parameters forwarded to the engine when an instance starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineParams {
    pub name: String,
    pub max_sessions: u32,
    pub max_cursors: u32,
    pub max_transaction_depth: u32,
    pub max_key_size: u32,
    pub circular_log: bool,
}

/// Information about an open database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DatabaseInfo {
    /// Size cap in pages, 0 when unbounded
    pub max_pages: u32,
    /// Pages currently in use
    pub pages: u32,
    pub read_only: bool,
}

/// Which sessions `flush_transactions` makes durable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushKind {
    AllSessions,
    Session,
}

/// Ordering of column metadata listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnOrder {
    #[default]
    ByName,
    ById,
}

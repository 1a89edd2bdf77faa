use crate::constants::{ColumnDefGrbit, IndexCreateGrbit, MAX_KEY_SEGMENTS};
use crate::error::{Error, Result};
use crate::key::SegmentFormat;
use crate::types::{ColumnId, ColumnOrder, ColumnType, TextEncoding};

/// Column descriptor as reported by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// Column identifier
    pub columnid: ColumnId,
    /// Storage type
    pub coltyp: ColumnType,
    /// Code page for text columns
    pub cp: u16,
    /// Maximum length for variable columns, 0 for no limit
    pub max_length: u32,
    /// Column options
    pub grbit: ColumnDefGrbit,
    /// Value returned when the record has none
    pub default_value: Option<Vec<u8>>,
}

impl ColumnInfo {
    pub fn encoding(&self) -> TextEncoding {
        TextEncoding::from_code_page(self.cp)
    }

    pub fn is_multi_valued(&self) -> bool {
        self.grbit.contains(ColumnDefGrbit::MULTI_VALUED)
    }
}

/// One key column of an index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSegment {
    /// Column name
    pub column_name: String,
    /// Column identifier
    pub columnid: ColumnId,
    /// Storage type of the column
    pub coltyp: ColumnType,
    /// Text encoding of the column
    pub encoding: TextEncoding,
    /// Segment sorts in descending order
    pub descending: bool,
}

/// Index descriptor as reported by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct IndexInfo {
    /// Index name
    pub name: String,
    /// Index options
    pub grbit: IndexCreateGrbit,
    /// Maximum normalized key size
    pub key_most: u32,
    /// Key columns in declaration order
    pub segments: Vec<IndexSegment>,
}

impl IndexInfo {
    pub fn is_primary(&self) -> bool {
        self.grbit.contains(IndexCreateGrbit::PRIMARY)
    }

    pub fn is_unique(&self) -> bool {
        self.grbit
            .intersects(IndexCreateGrbit::UNIQUE | IndexCreateGrbit::PRIMARY)
    }

    pub fn covers(&self, columnid: ColumnId) -> bool {
        self.segments.iter().any(|s| s.columnid == columnid)
    }

    /// Key layout used to normalise search keys for this index
    pub fn segment_formats(&self) -> Vec<SegmentFormat> {
        let nulls_high = self.grbit.contains(IndexCreateGrbit::SORT_NULLS_HIGH);
        self.segments
            .iter()
            .map(|s| SegmentFormat {
                coltyp: s.coltyp,
                encoding: s.encoding,
                descending: s.descending,
                nulls_high,
            })
            .collect()
    }
}

/// Column reference parsed from a key description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyColumn {
    pub name: String,
    pub descending: bool,
}

/// Parse an index key description such as `"+Id\0-Name\0\0"`. Each column
/// is prefixed by `+` (ascending, the default) or `-` (descending) and
/// terminated by a NUL; an empty entry ends the list.
pub fn parse_key_description(key: &str) -> Result<Vec<KeyColumn>> {
    let mut columns = Vec::new();
    for part in key.split('\0') {
        if part.is_empty() {
            break;
        }
        let (descending, name) = match part.as_bytes()[0] {
            b'+' => (false, &part[1..]),
            b'-' => (true, &part[1..]),
            _ => (false, part),
        };
        if name.is_empty() {
            return Err(Error::InvalidIndexDefinition);
        }
        columns.push(KeyColumn {
            name: name.to_owned(),
            descending,
        });
    }
    if columns.is_empty() || columns.len() > MAX_KEY_SEGMENTS {
        return Err(Error::InvalidIndexDefinition);
    }
    Ok(columns)
}

/// Snapshot of a table's schema. Taken on demand and kept until the
/// owner asks for a refresh.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableMetadata {
    /// Columns in column-id order
    columns: Vec<ColumnInfo>,
    /// Indexes in creation order
    indexes: Vec<IndexInfo>,
}

impl TableMetadata {
    pub fn new(mut columns: Vec<ColumnInfo>, indexes: Vec<IndexInfo>) -> Self {
        columns.sort_by_key(|c| c.columnid);
        TableMetadata { columns, indexes }
    }

    /// Columns by name (case-insensitive) or by column id
    pub fn columns(&self, order: ColumnOrder) -> Vec<&ColumnInfo> {
        let mut columns: Vec<&ColumnInfo> = self.columns.iter().collect();
        if order == ColumnOrder::ByName {
            columns.sort_by_cached_key(|c| c.name.to_lowercase());
        }
        columns
    }

    /// Column names are matched case-insensitively
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column_by_id(&self, columnid: ColumnId) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.columnid == columnid)
    }

    pub fn indexes(&self) -> &[IndexInfo] {
        &self.indexes
    }

    pub fn index(&self, name: &str) -> Option<&IndexInfo> {
        self.indexes
            .iter()
            .find(|i| i.name.eq_ignore_ascii_case(name))
    }

    pub fn primary_index(&self) -> Option<&IndexInfo> {
        self.indexes.iter().find(|i| i.is_primary())
    }
}

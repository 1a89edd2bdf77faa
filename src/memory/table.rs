use std::collections::{BTreeMap, HashSet};

use log::debug;

use crate::constants::{
    status::*, ColumnDefGrbit, IndexCreateGrbit, SetColumnGrbit, CP_ASCII, CP_UNICODE,
    MAX_KEY_SIZE_LIMIT,
};
use crate::key::normalize_segment;
use crate::meta::{parse_key_description, ColumnInfo, IndexInfo, IndexSegment};
use crate::types::{ColumnDef, ColumnId, ColumnType, IndexCreate, SessionId, SetColumn};

/// Engine-internal result carrying a native status on failure
pub(crate) type Status<T> = std::result::Result<T, i32>;

/// Column values of one record; multi-valued columns hold several entries
/// and a column without values is null.
pub(crate) type Row = BTreeMap<ColumnId, Vec<Vec<u8>>>;

/// Uncommitted image of a record, `row: None` marks a pending delete
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Pending {
    pub(crate) owner: SessionId,
    pub(crate) row: Option<Row>,
}

/// Storage slot of one record id
#[derive(Debug, Default)]
pub(crate) struct Slot {
    /// Last committed image
    pub(crate) committed: Option<Row>,
    /// Image written inside a still-open transaction
    pub(crate) pending: Option<Pending>,
    /// Commit clock of the last published change
    pub(crate) version: u64,
    /// Sessions holding read locks
    pub(crate) readers: HashSet<SessionId>,
    /// Session holding the write lock
    pub(crate) writer: Option<SessionId>,
}

impl Slot {
    /// Image seen by `viewer`: its own pending image, else the committed one
    pub(crate) fn visible(&self, viewer: SessionId) -> Option<&Row> {
        match &self.pending {
            Some(pending) if pending.owner == viewer => pending.row.as_ref(),
            _ => self.committed.as_ref(),
        }
    }

    /// Another session owns an uncommitted image or a lock on this record
    pub(crate) fn conflicts_with(&self, sesid: SessionId) -> bool {
        self.pending.as_ref().map_or(false, |p| p.owner != sesid)
            || self.writer.map_or(false, |w| w != sesid)
            || self.readers.iter().any(|r| *r != sesid)
    }

    pub(crate) fn is_vacant(&self) -> bool {
        self.committed.is_none()
            && self.pending.is_none()
            && self.writer.is_none()
            && self.readers.is_empty()
    }
}

/// Position of one record in one index. Entries order by key, then record
/// id, then multi-value instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Entry {
    pub(crate) key: Vec<u8>,
    pub(crate) rid: u64,
    pub(crate) itag: u32,
}

/// Schema and records of one table
#[derive(Debug)]
pub(crate) struct Table {
    /// Table name as created
    pub(crate) name: String,
    pub(crate) columns: Vec<ColumnInfo>,
    pub(crate) indexes: Vec<IndexInfo>,
    pub(crate) records: BTreeMap<u64, Slot>,
    next_rid: u64,
    next_columnid: u32,
    /// Last value handed out per autoincrement column
    autoinc: BTreeMap<ColumnId, i64>,
}

impl Table {
    pub(crate) fn new(name: &str) -> Self {
        Table {
            name: name.to_owned(),
            columns: Vec::new(),
            indexes: Vec::new(),
            records: BTreeMap::new(),
            next_rid: 1,
            next_columnid: 1,
            autoinc: BTreeMap::new(),
        }
    }

    pub(crate) fn column(&self, columnid: ColumnId) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.columnid == columnid)
    }

    pub(crate) fn column_by_name(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub(crate) fn index(&self, name: &str) -> Option<&IndexInfo> {
        self.indexes
            .iter()
            .find(|i| i.name.eq_ignore_ascii_case(name))
    }

    pub(crate) fn primary_index(&self) -> Option<&IndexInfo> {
        self.indexes.iter().find(|i| i.is_primary())
    }

    pub(crate) fn alloc_rid(&mut self) -> u64 {
        let rid = self.next_rid;
        self.next_rid += 1;
        rid
    }

    /// Next autoincrement value of `columnid`, encoded for `coltyp`. The
    /// counter only advances when the value fits the column type.
    pub(crate) fn next_autoinc(&mut self, columnid: ColumnId, coltyp: ColumnType) -> Status<Vec<u8>> {
        let counter = self.autoinc.entry(columnid).or_insert(0);
        let value = counter
            .checked_add(1)
            .ok_or(ERR_OUT_OF_AUTOINCREMENT_VALUES)?;
        let bytes = match coltyp {
            ColumnType::Long => i32::try_from(value)
                .map_err(|_| ERR_OUT_OF_AUTOINCREMENT_VALUES)?
                .to_le_bytes()
                .to_vec(),
            _ => value.to_le_bytes().to_vec(),
        };
        *counter = value;
        Ok(bytes)
    }

    pub(crate) fn add_column(&mut self, name: &str, def: &ColumnDef) -> Status<ColumnId> {
        if name.is_empty() {
            return Err(ERR_INVALID_PARAMETER);
        }
        if self.column_by_name(name).is_some() {
            return Err(ERR_COLUMN_DUPLICATE);
        }
        if let (Some(size), Some(default)) = (def.coltyp.fixed_size(), &def.default_value) {
            if default.len() != size {
                return Err(ERR_INVALID_PARAMETER);
            }
        }
        if def.grbit.contains(ColumnDefGrbit::AUTOINCREMENT)
            && !matches!(def.coltyp, ColumnType::Long | ColumnType::Currency | ColumnType::LongLong)
        {
            return Err(ERR_INVALID_PARAMETER);
        }
        if def.grbit.contains(ColumnDefGrbit::VERSION) && def.coltyp != ColumnType::Long {
            return Err(ERR_INVALID_PARAMETER);
        }
        let cp = if def.coltyp.is_text() {
            match def.cp {
                0 | CP_UNICODE => CP_UNICODE,
                CP_ASCII => CP_ASCII,
                _ => return Err(ERR_INVALID_PARAMETER),
            }
        } else {
            0
        };

        let columnid = ColumnId(self.next_columnid);
        self.next_columnid += 1;
        self.columns.push(ColumnInfo {
            name: name.to_owned(),
            columnid,
            coltyp: def.coltyp,
            cp,
            max_length: def.max_length,
            grbit: def.grbit,
            default_value: def.default_value.clone(),
        });
        debug!("added column {} ({}) to table {}", name, columnid, self.name);
        Ok(columnid)
    }

    pub(crate) fn delete_column(&mut self, name: &str) -> Status<()> {
        let columnid = self
            .column_by_name(name)
            .map(|c| c.columnid)
            .ok_or(ERR_COLUMN_NOT_FOUND)?;
        if self.indexes.iter().any(|i| i.covers(columnid)) {
            return Err(ERR_COLUMN_IN_USE);
        }
        self.columns.retain(|c| c.columnid != columnid);
        for slot in self.records.values_mut() {
            if let Some(row) = slot.committed.as_mut() {
                row.remove(&columnid);
            }
            if let Some(row) = slot.pending.as_mut().and_then(|p| p.row.as_mut()) {
                row.remove(&columnid);
            }
        }
        debug!("deleted column {} from table {}", name, self.name);
        Ok(())
    }

    /// Resolve an index definition against the table's columns
    pub(crate) fn build_index(&self, create: &IndexCreate, default_key_most: u32) -> Status<IndexInfo> {
        if create.name.is_empty() {
            return Err(ERR_INVALID_PARAMETER);
        }
        if self.index(&create.name).is_some() {
            return Err(ERR_INDEX_DUPLICATE);
        }
        if create.grbit.contains(IndexCreateGrbit::PRIMARY) && self.primary_index().is_some() {
            return Err(ERR_INDEX_HAS_PRIMARY);
        }
        let key_most = if create.key_most == 0 {
            default_key_most
        } else {
            create.key_most
        };
        if key_most as usize > MAX_KEY_SIZE_LIMIT {
            return Err(ERR_INDEX_INVALID_DEF);
        }
        let key_columns = parse_key_description(&create.key).map_err(|_| ERR_INDEX_INVALID_DEF)?;
        let mut segments = Vec::with_capacity(key_columns.len());
        for key_column in key_columns {
            let column = self
                .column_by_name(&key_column.name)
                .ok_or(ERR_COLUMN_NOT_FOUND)?;
            segments.push(IndexSegment {
                column_name: column.name.clone(),
                columnid: column.columnid,
                coltyp: column.coltyp,
                encoding: column.encoding(),
                descending: key_column.descending,
            });
        }
        Ok(IndexInfo {
            name: create.name.clone(),
            grbit: create.grbit,
            key_most,
            segments,
        })
    }

    /// Add a resolved index; unique indexes must hold for committed records
    pub(crate) fn add_index(&mut self, index: IndexInfo) -> Status<()> {
        if index.is_unique() {
            let mut seen = HashSet::new();
            for slot in self.records.values() {
                if let Some(row) = slot.committed.as_ref() {
                    for (key, _) in self.index_keys(&index, row)? {
                        if !seen.insert(key) {
                            return Err(ERR_KEY_DUPLICATE);
                        }
                    }
                }
            }
        }
        debug!("created index {} on table {}", index.name, self.name);
        self.indexes.push(index);
        Ok(())
    }

    pub(crate) fn delete_index(&mut self, name: &str) -> Status<()> {
        let before = self.indexes.len();
        self.indexes.retain(|i| !i.name.eq_ignore_ascii_case(name));
        if self.indexes.len() == before {
            return Err(ERR_INDEX_NOT_FOUND);
        }
        debug!("deleted index {} from table {}", name, self.name);
        Ok(())
    }

    /// Value of a column instance, falling back to the column default
    fn segment_value<'a>(&'a self, row: &'a Row, columnid: ColumnId, itag: usize) -> Option<&'a [u8]> {
        match row.get(&columnid) {
            Some(values) => values.get(itag).map(Vec::as_slice),
            None if itag == 0 => self
                .column(columnid)
                .and_then(|c| c.default_value.as_deref()),
            None => None,
        }
    }

    /// Keys `row` contributes to `index`, each with its multi-value instance.
    /// The first multi-valued key column with several values yields one key
    /// per value.
    pub(crate) fn index_keys(&self, index: &IndexInfo, row: &Row) -> Status<Vec<(Vec<u8>, u32)>> {
        let formats = index.segment_formats();
        let expand = index.segments.iter().position(|s| {
            self.column(s.columnid).map_or(false, ColumnInfo::is_multi_valued)
                && row.get(&s.columnid).map_or(false, |v| v.len() > 1)
        });
        let instances = expand
            .and_then(|i| row.get(&index.segments[i].columnid))
            .map_or(1, Vec::len);

        let mut keys = Vec::with_capacity(instances);
        for instance in 0..instances {
            let mut key = Vec::new();
            let mut nulls = 0;
            for (position, (segment, format)) in index.segments.iter().zip(&formats).enumerate() {
                let itag = if Some(position) == expand { instance } else { 0 };
                let value = self.segment_value(row, segment.columnid, itag);
                if value.is_none() {
                    nulls += 1;
                }
                normalize_segment(format, value, false, &mut key)
                    .map_err(|e| e.code().unwrap_or(ERR_INTERNAL_ERROR))?;
            }
            if nulls == index.segments.len() && index.grbit.contains(IndexCreateGrbit::IGNORE_NULL)
            {
                continue;
            }
            if nulls > 0 && index.grbit.contains(IndexCreateGrbit::IGNORE_ANY_NULL) {
                continue;
            }
            key.truncate(index.key_most as usize);
            keys.push((key, instance as u32 + 1));
        }
        Ok(keys)
    }

    /// Whether any key column of `row` is null
    pub(crate) fn has_null_key(&self, index: &IndexInfo, row: &Row) -> bool {
        index
            .segments
            .iter()
            .any(|s| self.segment_value(row, s.columnid, 0).is_none())
    }

    /// All entries of an index as seen by `viewer`, in index order. `None`
    /// walks the records in record-id order.
    pub(crate) fn entries(&self, index: Option<&IndexInfo>, viewer: SessionId) -> Status<Vec<Entry>> {
        let mut entries = Vec::new();
        for (&rid, slot) in &self.records {
            let Some(row) = slot.visible(viewer) else {
                continue;
            };
            match index {
                Some(index) => {
                    for (key, itag) in self.index_keys(index, row)? {
                        entries.push(Entry { key, rid, itag });
                    }
                }
                None => entries.push(Entry {
                    key: rid.to_be_bytes().to_vec(),
                    rid,
                    itag: 1,
                }),
            }
        }
        entries.sort();
        Ok(entries)
    }

    /// Stored bytes of committed and pending images
    pub(crate) fn size_bytes(&self) -> usize {
        self.records
            .values()
            .map(|slot| {
                slot.committed.as_ref().map_or(0, row_size)
                    + slot
                        .pending
                        .as_ref()
                        .and_then(|p| p.row.as_ref())
                        .map_or(0, row_size)
            })
            .sum()
    }

    /// Apply one column set to a record image
    pub(crate) fn apply_set(&self, row: &mut Row, set: &SetColumn<'_>) -> Status<()> {
        let column = self.column(set.columnid).ok_or(ERR_COLUMN_NOT_FOUND)?;
        let data = match set.data {
            Some(data)
                if data.is_empty() && !set.grbit.contains(SetColumnGrbit::ZERO_LENGTH) =>
            {
                None
            }
            Some(data) if data.is_empty() && column.coltyp.fixed_size().is_some() => None,
            other => other,
        };

        if let Some(data) = data {
            if let Some(size) = column.coltyp.fixed_size() {
                if data.len() != size {
                    return Err(ERR_INVALID_BUFFER_SIZE);
                }
            } else if column.max_length > 0 && data.len() > column.max_length as usize {
                return Err(ERR_INVALID_BUFFER_SIZE);
            }
            if column.coltyp.is_text() && column.cp == CP_UNICODE && data.len() % 2 != 0 {
                return Err(ERR_INVALID_PARAMETER);
            }
        }

        if !column.is_multi_valued() {
            match data {
                None => {
                    row.remove(&set.columnid);
                }
                Some(data) => {
                    let mut value = data.to_vec();
                    if set.grbit.contains(SetColumnGrbit::APPEND_LV) {
                        if let Some(existing) = row.get(&set.columnid).and_then(|v| v.first()) {
                            value = [existing.as_slice(), data].concat();
                        }
                    }
                    row.insert(set.columnid, vec![value]);
                }
            }
            return Ok(());
        }

        let values = row.entry(set.columnid).or_default();
        if let Some(data) = data {
            if set.grbit.contains(SetColumnGrbit::UNIQUE_MULTI_VALUES) {
                let replaced = set.itag_sequence as usize;
                let duplicate = values
                    .iter()
                    .enumerate()
                    .any(|(i, v)| i + 1 != replaced && v.as_slice() == data);
                if duplicate {
                    return Err(ERR_MULTI_VALUED_DUPLICATE);
                }
            }
        }
        let position = set.itag_sequence as usize;
        match data {
            None if position == 0 => {}
            None => {
                if position <= values.len() {
                    values.remove(position - 1);
                }
            }
            Some(data) if position == 0 || position > values.len() => values.push(data.to_vec()),
            Some(data) => {
                let value = &mut values[position - 1];
                if set.grbit.contains(SetColumnGrbit::APPEND_LV) {
                    value.extend_from_slice(data);
                } else {
                    *value = data.to_vec();
                }
            }
        }
        if values.is_empty() {
            row.remove(&set.columnid);
        }
        Ok(())
    }

    /// NOT NULL columns must have a value or a default
    pub(crate) fn check_not_null(&self, row: &Row) -> Status<()> {
        for column in &self.columns {
            if column.grbit.contains(ColumnDefGrbit::NOT_NULL)
                && !row.contains_key(&column.columnid)
                && column.default_value.is_none()
            {
                return Err(ERR_NULL_INVALID);
            }
        }
        Ok(())
    }
}

pub(crate) fn row_size(row: &Row) -> usize {
    const RECORD_OVERHEAD: usize = 16;
    RECORD_OVERHEAD + row.values().flatten().map(Vec::len).sum::<usize>()
}

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use log::{debug, trace, warn};

use crate::adapter::SessionApi;
use crate::constants::{
    GetLockGrbit, MakeKeyGrbit, MoveGrbit, PrepareUpdate, RetrieveColumnGrbit, SeekGrbit,
    SetColumnGrbit, SetCurrentIndexGrbit, SetIndexRangeGrbit, MOVE_FIRST, MOVE_LAST, MOVE_NEXT,
    MOVE_PREVIOUS,
};
use crate::database::Database;
use crate::error::{Error, Result};
use crate::key::KeyBuilder;
use crate::meta::{ColumnInfo, IndexInfo, TableMetadata};
use crate::session::Session;
use crate::types::{ColumnDef, ColumnId, ColumnOrder, IndexCreate, SetColumn, TableId, TextEncoding, Warning};
use crate::value::{ColumnData, ColumnValue, TypedValue, ValueKind};

macro_rules! retrieve_as {
    ($($name:ident => $ty:ty),* $(,)?) => {
        $(
            pub fn $name(&self, columnid: ColumnId) -> Result<Option<$ty>> {
                self.retrieve_column_as::<$ty>(columnid)
            }
        )*
    };
}

/// A cursor over one table: the current index, a position on it, an
/// optional index range, a search key under construction and at most one
/// pending update.
///
/// A cursor is owned by the session of the database it was opened from.
/// Closing or dropping it releases the engine handle; rolling back the
/// transaction level it was opened in closes it too.
pub struct Cursor<'d> {
    /// Database the table belongs to
    db: &'d Database<'d>,
    /// Native cursor handle
    tableid: TableId,
    /// Table name
    table: String,
    /// Handle has been closed
    closed: Cell<bool>,
    /// Search key under construction
    key: RefCell<Option<KeyBuilder>>,
    /// Schema snapshot, fetched on first use
    metadata: RefCell<Option<Rc<TableMetadata>>>,
}

impl<'d> Cursor<'d> {
    pub(crate) fn new(db: &'d Database<'d>, tableid: TableId, table: &str) -> Self {
        db.session().register_cursor(tableid);
        trace!("opened cursor {} on table {}", tableid, table);
        Cursor {
            db,
            tableid,
            table: table.to_owned(),
            closed: Cell::new(false),
            key: RefCell::new(None),
            metadata: RefCell::new(None),
        }
    }

    pub fn tableid(&self) -> TableId {
        self.tableid
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn database(&self) -> &'d Database<'d> {
        self.db
    }

    pub fn session(&self) -> &'d Session<'d> {
        self.db.session()
    }

    fn api(&self) -> &SessionApi {
        self.db.session().api()
    }

    /// False once closed, explicitly or by a rollback
    pub fn is_open(&self) -> bool {
        !self.closed.get() && self.session().is_cursor_open(self.tableid)
    }

    fn check_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(Error::InvalidHandle)
        }
    }

    /// An update was prepared and has been neither saved nor cancelled
    pub fn is_update_pending(&self) -> bool {
        self.session().is_update_pending(self.tableid)
    }

    fn set_update_pending(&self, pending: bool) {
        self.session().set_update_pending(self.tableid, pending);
    }

    // Schema

    /// Cached schema snapshot, fetched on first use
    pub fn metadata(&self) -> Result<Rc<TableMetadata>> {
        if let Some(meta) = self.metadata.borrow().as_ref() {
            return Ok(Rc::clone(meta));
        }
        self.refresh_metadata()
    }

    /// Fetch the schema again, replacing the cached snapshot
    pub fn refresh_metadata(&self) -> Result<Rc<TableMetadata>> {
        self.check_open()?;
        let columns = self.api().get_table_columns(self.tableid)?;
        let indexes = self.api().get_table_indexes(self.tableid)?;
        let meta = Rc::new(TableMetadata::new(columns, indexes));
        *self.metadata.borrow_mut() = Some(Rc::clone(&meta));
        Ok(meta)
    }

    fn invalidate_metadata(&self) {
        *self.metadata.borrow_mut() = None;
    }

    pub fn columns(&self, order: ColumnOrder) -> Result<Vec<ColumnInfo>> {
        let meta = self.metadata()?;
        Ok(meta.columns(order).into_iter().cloned().collect())
    }

    pub fn indexes(&self) -> Result<Vec<IndexInfo>> {
        Ok(self.metadata()?.indexes().to_vec())
    }

    /// Column by name, case-insensitive
    pub fn column(&self, name: &str) -> Result<ColumnInfo> {
        self.metadata()?
            .column(name)
            .cloned()
            .ok_or(Error::ColumnNotFound)
    }

    pub fn column_id(&self, name: &str) -> Result<ColumnId> {
        Ok(self.column(name)?.columnid)
    }

    /// Column from the cached snapshot. Schema changes made through other
    /// handles stay invisible until `refresh_metadata`.
    fn column_info(&self, columnid: ColumnId) -> Result<ColumnInfo> {
        self.metadata()?
            .column_by_id(columnid)
            .cloned()
            .ok_or(Error::ColumnNotFound)
    }

    fn index_info(&self, name: &str) -> Result<IndexInfo> {
        self.metadata()?
            .index(name)
            .cloned()
            .ok_or(Error::IndexNotFound)
    }

    /// Text encoding for values of `columnid`; only text values need a
    /// schema lookup.
    fn encoding_for(&self, columnid: ColumnId, kind: ValueKind) -> Result<TextEncoding> {
        if kind == ValueKind::String {
            Ok(self.column_info(columnid)?.encoding())
        } else {
            Ok(TextEncoding::Unicode)
        }
    }

    pub fn add_column(&self, name: &str, def: &ColumnDef) -> Result<ColumnId> {
        self.check_open()?;
        let columnid = self.api().add_column(self.tableid, name, def)?;
        self.invalidate_metadata();
        debug!("added column {} ({}) to {}", name, columnid, self.table);
        Ok(columnid)
    }

    pub fn delete_column(&self, name: &str) -> Result<()> {
        self.check_open()?;
        self.api().delete_column(self.tableid, name)?;
        self.invalidate_metadata();
        Ok(())
    }

    pub fn create_index(&self, index: &IndexCreate) -> Result<()> {
        self.check_open()?;
        self.api().create_index(self.tableid, index)?;
        self.invalidate_metadata();
        debug!("created index {} on {}", index.name, self.table);
        Ok(())
    }

    pub fn delete_index(&self, name: &str) -> Result<()> {
        self.check_open()?;
        self.api().delete_index(self.tableid, name)?;
        self.invalidate_metadata();
        *self.key.borrow_mut() = None;
        Ok(())
    }

    // Index selection

    /// Switch to the named index, or with `None` to the primary index
    /// (record order when the table has none), and move to its first entry
    pub fn set_current_index(&self, name: Option<&str>) -> Result<()> {
        self.set_current_index_with(name, SetCurrentIndexGrbit::empty(), 1)
    }

    pub fn set_current_index_with(
        &self,
        name: Option<&str>,
        grbit: SetCurrentIndexGrbit,
        itag_sequence: u32,
    ) -> Result<()> {
        self.check_open()?;
        self.api()
            .set_current_index(self.tableid, name, grbit, itag_sequence)?;
        *self.key.borrow_mut() = None;
        Ok(())
    }

    /// Name of the current index, `None` in record order
    pub fn current_index(&self) -> Result<Option<String>> {
        self.check_open()?;
        self.api().get_current_index(self.tableid)
    }

    fn current_index_info(&self) -> Result<IndexInfo> {
        let name = self.current_index()?.ok_or(Error::NoCurrentIndex)?;
        self.index_info(&name)
    }

    // Search keys

    /// Append `value` as the next key segment of the current index. Text
    /// is normalised with the segment column's encoding; an empty
    /// present value is a zero-length segment, not null.
    pub fn make_key(&self, value: impl Into<TypedValue>, grbit: MakeKeyGrbit) -> Result<()> {
        let value = value.into();
        self.with_key_builder(grbit, |builder| {
            let encoding = builder
                .next_format(grbit)
                .map_or(TextEncoding::Unicode, |f| f.encoding);
            let encoded = value.encode_with(encoding)?;
            let mut grbit = grbit;
            if !encoded.is_null && encoded.is_empty() {
                grbit |= MakeKeyGrbit::KEY_DATA_ZERO_LENGTH;
            }
            builder.make_key(encoded.data(), grbit)
        })
    }

    /// Append raw column bytes, or a whole normalised key with
    /// `NORMALIZED_KEY`
    pub fn make_key_bytes(&self, data: &[u8], grbit: MakeKeyGrbit) -> Result<()> {
        self.with_key_builder(grbit, |builder| builder.make_key(Some(data), grbit))
    }

    fn with_key_builder<T>(
        &self,
        grbit: MakeKeyGrbit,
        f: impl FnOnce(&mut KeyBuilder) -> Result<T>,
    ) -> Result<T> {
        self.check_open()?;
        if self.is_update_pending() {
            return Err(Error::UpdateAlreadyPending);
        }
        if grbit.contains(MakeKeyGrbit::NEW_KEY) {
            let index = self.current_index_info()?;
            // A new key sequence ends any index range
            self.api()
                .set_index_range(self.tableid, &[], SetIndexRangeGrbit::REMOVE)?;
            *self.key.borrow_mut() =
                Some(KeyBuilder::new(index.segment_formats(), index.key_most as usize));
        }
        let mut key = self.key.borrow_mut();
        let builder = key.as_mut().ok_or(Error::KeyNotMade)?;
        f(builder)
    }

    /// Take the search key; the builder is cleared on success
    fn take_key(&self) -> Result<Vec<u8>> {
        let mut key = self.key.borrow_mut();
        let bytes = key
            .as_ref()
            .ok_or(Error::KeyNotMade)?
            .key()?
            .to_vec();
        *key = None;
        Ok(bytes)
    }

    /// Position on the index entry matching the search key. An inexact
    /// match under `SEEK_GE`/`SEEK_LE` reports `Warning::SeekNotEqual`.
    pub fn seek(&self, grbit: SeekGrbit) -> Result<Option<Warning>> {
        self.check_open()?;
        if self.is_update_pending() {
            return Err(Error::UpdateAlreadyPending);
        }
        let key = self.take_key()?;
        self.api().seek(self.tableid, &key, grbit)
    }

    /// `seek`, reporting no match as `false`
    pub fn try_seek(&self, grbit: SeekGrbit) -> Result<bool> {
        match self.seek(grbit) {
            Ok(_) => Ok(true),
            Err(Error::RecordNotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Limit navigation from the current entry up to (or down to) the
    /// search key. Fails with `NoCurrentRecord` when the current entry is
    /// already outside the range.
    pub fn set_index_range(&self, grbit: SetIndexRangeGrbit) -> Result<()> {
        self.check_open()?;
        if grbit.contains(SetIndexRangeGrbit::REMOVE) {
            return self.api().set_index_range(self.tableid, &[], grbit);
        }
        let key = self.take_key()?;
        self.api().set_index_range(self.tableid, &key, grbit)
    }

    pub fn try_set_index_range(&self, grbit: SetIndexRangeGrbit) -> Result<bool> {
        match self.set_index_range(grbit) {
            Ok(()) => Ok(true),
            Err(Error::NoCurrentRecord) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn reset_index_range(&self) -> Result<()> {
        self.set_index_range(SetIndexRangeGrbit::REMOVE)
    }

    // Navigation

    /// Move by `rows` entries, or to either end with `MOVE_FIRST` and
    /// `MOVE_LAST`. Any pending update is cancelled.
    pub fn move_to(&self, rows: i32, grbit: MoveGrbit) -> Result<()> {
        self.check_open()?;
        let result = self.api().move_cursor(self.tableid, rows, grbit);
        if matches!(result, Ok(()) | Err(Error::NoCurrentRecord)) {
            self.set_update_pending(false);
        }
        result
    }

    /// `move_to`, reporting running off either end as `false`
    pub fn try_move(&self, rows: i32, grbit: MoveGrbit) -> Result<bool> {
        match self.move_to(rows, grbit) {
            Ok(()) => Ok(true),
            Err(Error::NoCurrentRecord) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn move_first(&self) -> Result<()> {
        self.move_to(MOVE_FIRST, MoveGrbit::empty())
    }

    pub fn move_last(&self) -> Result<()> {
        self.move_to(MOVE_LAST, MoveGrbit::empty())
    }

    pub fn move_next(&self) -> Result<()> {
        self.move_to(MOVE_NEXT, MoveGrbit::empty())
    }

    pub fn move_previous(&self) -> Result<()> {
        self.move_to(MOVE_PREVIOUS, MoveGrbit::empty())
    }

    pub fn try_move_first(&self) -> Result<bool> {
        self.try_move(MOVE_FIRST, MoveGrbit::empty())
    }

    pub fn try_move_last(&self) -> Result<bool> {
        self.try_move(MOVE_LAST, MoveGrbit::empty())
    }

    pub fn try_move_next(&self) -> Result<bool> {
        self.try_move(MOVE_NEXT, MoveGrbit::empty())
    }

    pub fn try_move_previous(&self) -> Result<bool> {
        self.try_move(MOVE_PREVIOUS, MoveGrbit::empty())
    }

    /// Normalised key of the current index entry
    pub fn retrieve_key(&self) -> Result<Vec<u8>> {
        self.check_open()?;
        self.api().retrieve_key(self.tableid)
    }

    /// Opaque, stable identity of the current record
    pub fn bookmark(&self) -> Result<Vec<u8>> {
        self.check_open()?;
        self.api().get_bookmark(self.tableid)
    }

    /// Position on the record a bookmark names. The index range is
    /// dropped and any pending update is cancelled.
    pub fn goto_bookmark(&self, bookmark: &[u8]) -> Result<()> {
        self.check_open()?;
        self.api().goto_bookmark(self.tableid, bookmark)?;
        self.set_update_pending(false);
        Ok(())
    }

    pub fn try_goto_bookmark(&self, bookmark: &[u8]) -> Result<bool> {
        match self.goto_bookmark(bookmark) {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Entries from the current position to the end of the index or
    /// range, counting at most `max` (0 for no limit)
    pub fn index_record_count(&self, max: u32) -> Result<u32> {
        self.check_open()?;
        self.api().index_record_count(self.tableid, max)
    }

    // Retrieval

    /// Raw bytes of a column value, `None` when null. The first read uses
    /// the configured buffer size; a truncated value is read again into a
    /// buffer of the reported size.
    pub fn retrieve_column_with(
        &self,
        columnid: ColumnId,
        grbit: RetrieveColumnGrbit,
        itag_sequence: u32,
    ) -> Result<Option<Vec<u8>>> {
        self.check_open()?;
        let size = self.session().instance().config().retrieve_buffer_size;
        let mut buffer = vec![0u8; size];
        let (actual, warning) =
            self.api()
                .retrieve_column(self.tableid, columnid, &mut buffer, grbit, itag_sequence)?;
        match warning {
            Some(Warning::ColumnNull) => return Ok(None),
            Some(Warning::BufferTruncated) => {
                buffer.resize(actual, 0);
                let (actual, warning) = self.api().retrieve_column(
                    self.tableid,
                    columnid,
                    &mut buffer,
                    grbit,
                    itag_sequence,
                )?;
                if warning == Some(Warning::ColumnNull) {
                    return Ok(None);
                }
                buffer.truncate(actual);
            }
            _ => buffer.truncate(actual),
        }
        Ok(Some(buffer))
    }

    pub fn retrieve_column(&self, columnid: ColumnId) -> Result<Option<Vec<u8>>> {
        self.retrieve_column_with(columnid, RetrieveColumnGrbit::empty(), 1)
    }

    /// Retrieve and decode a column as `T`
    pub fn retrieve_column_as<T: ColumnData>(&self, columnid: ColumnId) -> Result<Option<T>> {
        self.retrieve_column_as_with(columnid, RetrieveColumnGrbit::empty(), 1)
    }

    pub fn retrieve_column_as_with<T: ColumnData>(
        &self,
        columnid: ColumnId,
        grbit: RetrieveColumnGrbit,
        itag_sequence: u32,
    ) -> Result<Option<T>> {
        let value = self.retrieve_typed(T::KIND, columnid, grbit, itag_sequence)?;
        Ok(T::from_value(value))
    }

    fn retrieve_typed(
        &self,
        kind: ValueKind,
        columnid: ColumnId,
        grbit: RetrieveColumnGrbit,
        itag_sequence: u32,
    ) -> Result<TypedValue> {
        match self.retrieve_column_with(columnid, grbit, itag_sequence)? {
            None => Ok(TypedValue::null(kind)),
            Some(data) => {
                let encoding = self.encoding_for(columnid, kind)?;
                TypedValue::decode_with(kind, &data, 0, data.len(), None, encoding)
            }
        }
    }

    retrieve_as! {
        retrieve_column_as_bool => bool,
        retrieve_column_as_byte => u8,
        retrieve_column_as_i16 => i16,
        retrieve_column_as_u16 => u16,
        retrieve_column_as_i32 => i32,
        retrieve_column_as_u32 => u32,
        retrieve_column_as_i64 => i64,
        retrieve_column_as_u64 => u64,
        retrieve_column_as_f32 => f32,
        retrieve_column_as_f64 => f64,
        retrieve_column_as_datetime => chrono::NaiveDateTime,
        retrieve_column_as_guid => uuid::Uuid,
        retrieve_column_as_string => String,
        retrieve_column_as_binary => Vec<u8>,
    }

    /// Fill one value slot; its kind decides the decoding
    pub fn retrieve_column_value(&self, value: &mut ColumnValue) -> Result<()> {
        let kind = value.value.kind();
        value.value =
            self.retrieve_typed(kind, value.columnid, value.retrieve_grbit, value.itag_sequence)?;
        value.warning = value.value.is_null().then_some(Warning::ColumnNull);
        Ok(())
    }

    /// Fill each value slot in order
    pub fn retrieve_columns(&self, values: &mut [ColumnValue]) -> Result<()> {
        for value in values.iter_mut() {
            self.retrieve_column_value(value)?;
        }
        Ok(())
    }

    /// Number of values a multi-valued column holds in the current record
    pub fn count_values(&self, columnid: ColumnId) -> Result<u32> {
        self.check_open()?;
        self.api().count_column_values(self.tableid, columnid)
    }

    // Updates

    pub fn prepare_update(&self, mode: PrepareUpdate) -> Result<()> {
        self.check_open()?;
        self.api().prepare_update(self.tableid, mode)?;
        self.set_update_pending(mode != PrepareUpdate::Cancel);
        Ok(())
    }

    pub fn cancel_update(&self) -> Result<()> {
        self.prepare_update(PrepareUpdate::Cancel)
    }

    /// Prepare an update and return a guard that cancels it unless saved
    pub fn begin_update(&self, mode: PrepareUpdate) -> Result<Update<'_>> {
        self.prepare_update(mode)?;
        Ok(Update {
            cursor: self,
            saved: false,
        })
    }

    pub fn set_column(&self, columnid: ColumnId, value: impl Into<TypedValue>) -> Result<()> {
        self.set_columns(&[ColumnValue::new(columnid, value)])
    }

    pub fn set_column_with(
        &self,
        columnid: ColumnId,
        value: impl Into<TypedValue>,
        grbit: SetColumnGrbit,
        itag_sequence: u32,
    ) -> Result<()> {
        let value = ColumnValue::new(columnid, value)
            .set_grbit(grbit)
            .itag_sequence(itag_sequence);
        self.set_columns(&[value])
    }

    /// Set raw bytes; `None` sets the column to null
    pub fn set_column_bytes(
        &self,
        columnid: ColumnId,
        data: Option<&[u8]>,
        grbit: SetColumnGrbit,
        itag_sequence: u32,
    ) -> Result<()> {
        self.check_open()?;
        let set = SetColumn {
            columnid,
            data,
            grbit,
            itag_sequence,
        };
        self.api().set_columns(self.tableid, &[set])
    }

    /// Set several columns of the pending update in one engine call, in
    /// input order
    pub fn set_columns(&self, values: &[ColumnValue]) -> Result<()> {
        self.check_open()?;
        let mut encoded = Vec::with_capacity(values.len());
        for value in values {
            let encoding = self.encoding_for(value.columnid, value.value.kind())?;
            encoded.push(value.value.encode_with(encoding)?);
        }
        let sets: Vec<SetColumn<'_>> = values
            .iter()
            .zip(&encoded)
            .map(|(value, bytes)| SetColumn {
                columnid: value.columnid,
                data: bytes.data(),
                grbit: value.set_grbit | bytes.set_grbit(),
                itag_sequence: value.itag_sequence,
            })
            .collect();
        self.api().set_columns(self.tableid, &sets)
    }

    /// Save the pending update and return the record's bookmark. The
    /// update is consumed whether or not saving succeeds.
    pub fn update(&self) -> Result<Vec<u8>> {
        self.check_open()?;
        let result = self.api().update(self.tableid);
        if !matches!(result, Err(Error::SessionSharingViolation)) {
            self.set_update_pending(false);
        }
        result
    }

    /// Delete the current record. The cursor stays on the deleted entry
    /// until it moves.
    pub fn delete(&self) -> Result<()> {
        self.check_open()?;
        self.api().delete(self.tableid)
    }

    // Locks

    /// Lock the current record until the outermost transaction ends
    pub fn get_lock(&self, grbit: GetLockGrbit) -> Result<()> {
        self.check_open()?;
        self.api().get_lock(self.tableid, grbit)
    }

    /// `get_lock`, reporting a conflicting lock as `false`
    pub fn try_get_lock(&self, grbit: GetLockGrbit) -> Result<bool> {
        match self.get_lock(grbit) {
            Ok(()) => Ok(true),
            Err(Error::WriteConflict) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Advisory: whether updating the current record now would conflict
    pub fn is_write_conflict_expected(&self) -> Result<bool> {
        self.check_open()?;
        self.api().write_conflict_expected(self.tableid)
    }

    // Lifecycle

    /// Open an independent cursor on the same table, positioned before
    /// the first entry of the primary index
    pub fn dup_cursor(&self) -> Result<Cursor<'d>> {
        self.check_open()?;
        let tableid = self.api().dup_cursor(self.tableid)?;
        Ok(Cursor::new(self.db, tableid, &self.table))
    }

    pub fn close(self) -> Result<()> {
        self.close_handle()
    }

    fn close_handle(&self) -> Result<()> {
        if self.closed.get() {
            return Ok(());
        }
        let session = self.session();
        if session.id().is_nil() || !session.is_cursor_open(self.tableid) {
            self.closed.set(true);
            return Ok(());
        }
        self.api().close_table(self.tableid)?;
        session.unregister_cursor(self.tableid);
        self.closed.set(true);
        trace!("closed cursor {} on table {}", self.tableid, self.table);
        Ok(())
    }
}

impl Drop for Cursor<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.close_handle() {
            warn!("failed to close cursor on {}: {}", self.table, e);
        }
    }
}

impl fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("tableid", &self.tableid)
            .field("table", &self.table)
            .field("open", &self.is_open())
            .finish()
    }
}

/// A prepared update. Dropping the guard without saving cancels it.
#[must_use = "an update is cancelled when dropped"]
pub struct Update<'c> {
    cursor: &'c Cursor<'c>,
    saved: bool,
}

impl<'c> Update<'c> {
    pub fn cursor(&self) -> &'c Cursor<'c> {
        self.cursor
    }

    pub fn set_column(&self, columnid: ColumnId, value: impl Into<TypedValue>) -> Result<()> {
        self.cursor.set_column(columnid, value)
    }

    pub fn set_column_with(
        &self,
        columnid: ColumnId,
        value: impl Into<TypedValue>,
        grbit: SetColumnGrbit,
        itag_sequence: u32,
    ) -> Result<()> {
        self.cursor
            .set_column_with(columnid, value, grbit, itag_sequence)
    }

    pub fn set_columns(&self, values: &[ColumnValue]) -> Result<()> {
        self.cursor.set_columns(values)
    }

    /// Save the record and return its bookmark
    pub fn save(mut self) -> Result<Vec<u8>> {
        self.saved = true;
        self.cursor.update()
    }

    pub fn cancel(mut self) -> Result<()> {
        self.saved = true;
        self.cursor.cancel_update()
    }
}

impl Drop for Update<'_> {
    fn drop(&mut self) {
        if self.saved || !self.cursor.is_open() || !self.cursor.is_update_pending() {
            return;
        }
        if let Err(e) = self.cursor.cancel_update() {
            warn!("failed to cancel update on {}: {}", self.cursor.table, e);
        }
    }
}

impl fmt::Debug for Update<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Update")
            .field("cursor", self.cursor)
            .field("saved", &self.saved)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstanceConfig;
    use crate::constants::{ColumnDefGrbit, IndexCreateGrbit, OpenTableGrbit};
    use crate::env::Instance;
    use crate::types::{ColumnType, TableCreate};

    fn instance() -> Instance {
        Instance::in_memory(InstanceConfig::new("cursor").retrieve_buffer_size(4)).unwrap()
    }

    fn people() -> TableCreate {
        TableCreate::new("people")
            .column("Id", ColumnDef::new(ColumnType::Long).grbit(ColumnDefGrbit::AUTOINCREMENT))
            .column("Name", ColumnDef::text(TextEncoding::Unicode))
            .index(IndexCreate::new("primary", "+Id\0\0", IndexCreateGrbit::PRIMARY))
            .index(IndexCreate::new("by_name", "+Name\0\0", IndexCreateGrbit::empty()))
    }

    #[test]
    fn test_two_phase_retrieve_grows_buffer() {
        let instance = instance();
        let session = instance.begin_session().unwrap();
        let db = session.create_database("cursor.db", 0).unwrap();
        let cursor = db.create_table_column_index(&people()).unwrap();
        let name = cursor.column_id("Name").unwrap();

        cursor.prepare_update(PrepareUpdate::Insert).unwrap();
        cursor.set_column(name, "a name longer than the buffer").unwrap();
        let bookmark = cursor.update().unwrap();
        cursor.goto_bookmark(&bookmark).unwrap();

        assert_eq!(
            cursor.retrieve_column_as_string(name).unwrap().as_deref(),
            Some("a name longer than the buffer")
        );
    }

    #[test]
    fn test_make_key_rejected_while_update_pending() {
        let instance = instance();
        let session = instance.begin_session().unwrap();
        let db = session.create_database("cursor.db", 0).unwrap();
        let cursor = db.create_table_column_index(&people()).unwrap();

        cursor.prepare_update(PrepareUpdate::Insert).unwrap();
        assert_eq!(
            cursor.make_key(1i32, MakeKeyGrbit::NEW_KEY).unwrap_err(),
            Error::UpdateAlreadyPending
        );
        cursor.cancel_update().unwrap();
        assert!(!cursor.is_update_pending());
        cursor.make_key(1i32, MakeKeyGrbit::NEW_KEY).unwrap();
    }

    #[test]
    fn test_seek_without_key() {
        let instance = instance();
        let session = instance.begin_session().unwrap();
        let db = session.create_database("cursor.db", 0).unwrap();
        let cursor = db.create_table_column_index(&people()).unwrap();
        assert_eq!(cursor.seek(SeekGrbit::SEEK_EQ).unwrap_err(), Error::KeyNotMade);
        assert_eq!(
            cursor.make_key(1i32, MakeKeyGrbit::empty()).unwrap_err(),
            Error::KeyNotMade
        );
    }

    #[test]
    fn test_record_order_has_no_key() {
        let instance = instance();
        let session = instance.begin_session().unwrap();
        let db = session.create_database("cursor.db", 0).unwrap();
        let cursor = db.create_table("plain").unwrap();
        cursor
            .add_column("Value", &ColumnDef::new(ColumnType::Long))
            .unwrap();
        cursor.set_current_index(None).unwrap();
        assert_eq!(cursor.current_index().unwrap(), None);
        assert_eq!(
            cursor.make_key(1i32, MakeKeyGrbit::NEW_KEY).unwrap_err(),
            Error::NoCurrentIndex
        );
    }

    #[test]
    fn test_update_guard_cancels_on_drop() {
        let instance = instance();
        let session = instance.begin_session().unwrap();
        let db = session.create_database("cursor.db", 0).unwrap();
        let cursor = db.create_table_column_index(&people()).unwrap();
        let name = cursor.column_id("Name").unwrap();
        {
            let update = cursor.begin_update(PrepareUpdate::Insert).unwrap();
            update.set_column(name, "dropped").unwrap();
        }
        assert!(!cursor.is_update_pending());
        assert!(!cursor.try_move_first().unwrap());

        let update = cursor.begin_update(PrepareUpdate::Insert).unwrap();
        update.set_column(name, "saved").unwrap();
        update.save().unwrap();
        assert!(cursor.try_move_first().unwrap());
    }

    #[test]
    fn test_schema_changes_refresh_metadata() {
        let instance = instance();
        let session = instance.begin_session().unwrap();
        let db = session.create_database("cursor.db", 0).unwrap();
        let cursor = db.create_table_column_index(&people()).unwrap();
        assert_eq!(cursor.columns(ColumnOrder::ById).unwrap().len(), 2);

        let age = cursor
            .add_column("Age", &ColumnDef::new(ColumnType::Short))
            .unwrap();
        assert_eq!(cursor.column_id("age").unwrap(), age);
        assert_eq!(cursor.column_id("Missing").unwrap_err(), Error::ColumnNotFound);

        cursor.delete_column("Age").unwrap();
        assert_eq!(cursor.column_id("Age").unwrap_err(), Error::ColumnNotFound);
        assert_eq!(cursor.indexes().unwrap().len(), 2);
    }

    #[test]
    fn test_close_and_reopen() {
        let instance = instance();
        let session = instance.begin_session().unwrap();
        let db = session.create_database("cursor.db", 0).unwrap();
        db.create_table_column_index(&people()).unwrap().close().unwrap();

        let cursor = db.open_table("people", OpenTableGrbit::empty()).unwrap();
        let dup = cursor.dup_cursor().unwrap();
        assert_ne!(dup.tableid(), cursor.tableid());
        assert_eq!(dup.table_name(), "people");
        assert_eq!(dup.current_index().unwrap().as_deref(), Some("primary"));
        dup.close().unwrap();
        assert!(cursor.is_open());
    }
}

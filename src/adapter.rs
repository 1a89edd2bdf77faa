//! Engine seam.
//!
//! `Engine` is the primitive surface of a storage engine: opaque handles,
//! raw byte buffers, integer option bits, `&mut` out-parameters and an
//! `i32` status per call. `SessionApi` is the only place that interprets
//! those statuses; everything above it sees `Result` and `Warning`.

use std::cell::{Cell, RefCell};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use log::{debug, trace};

use crate::constants::{
    status, AttachGrbit, CommitGrbit, GetLockGrbit, MoveGrbit, OpenTableGrbit, PrepareUpdate,
    RetrieveColumnGrbit, RollbackGrbit, SeekGrbit, SetCurrentIndexGrbit, SetIndexRangeGrbit,
    TransactionGrbit,
};
use crate::error::{status_name, Error, Result};
use crate::meta::{ColumnInfo, IndexInfo};
use crate::types::{
    ColumnDef, ColumnId, DatabaseInfo, DbId, EngineParams, IndexCreate, InstanceId, SessionId,
    SetColumn, TableCreate, TableId, Warning,
};

/// Primitive call surface of an ISAM engine.
///
/// Every method returns a native status: zero for success, a positive
/// warning code, or a negative error code. Results are written through
/// the `&mut` parameters and are only meaningful when the status is not
/// negative.
#[allow(clippy::too_many_arguments)]
pub trait Engine: Send + Sync {
    fn init_instance(&self, params: &EngineParams, instance: &mut InstanceId) -> i32;
    fn term_instance(&self, instance: InstanceId) -> i32;
    fn begin_session(&self, instance: InstanceId, sesid: &mut SessionId) -> i32;
    fn dup_session(&self, sesid: SessionId, new_sesid: &mut SessionId) -> i32;
    fn end_session(&self, sesid: SessionId) -> i32;

    fn begin_transaction(&self, sesid: SessionId, grbit: u32) -> i32;
    fn commit_transaction(&self, sesid: SessionId, grbit: u32) -> i32;
    fn rollback(&self, sesid: SessionId, grbit: u32) -> i32;
    fn flush_transactions(&self, sesid: SessionId, grbit: u32) -> i32;

    fn create_database(
        &self,
        sesid: SessionId,
        path: &str,
        max_pages: u32,
        grbit: u32,
        dbid: &mut DbId,
    ) -> i32;
    fn attach_database(&self, sesid: SessionId, path: &str, max_pages: u32, grbit: u32) -> i32;
    fn detach_database(&self, sesid: SessionId, path: &str) -> i32;
    fn open_database(&self, sesid: SessionId, path: &str, grbit: u32, dbid: &mut DbId) -> i32;
    fn close_database(&self, sesid: SessionId, dbid: DbId) -> i32;
    fn get_database_info(&self, sesid: SessionId, dbid: DbId, info: &mut DatabaseInfo) -> i32;

    fn create_table(
        &self,
        sesid: SessionId,
        dbid: DbId,
        create: &TableCreate,
        tableid: &mut TableId,
    ) -> i32;
    fn open_table(
        &self,
        sesid: SessionId,
        dbid: DbId,
        name: &str,
        grbit: u32,
        tableid: &mut TableId,
    ) -> i32;
    fn delete_table(&self, sesid: SessionId, dbid: DbId, name: &str) -> i32;
    fn get_table_names(&self, sesid: SessionId, dbid: DbId, names: &mut Vec<String>) -> i32;
    fn close_table(&self, sesid: SessionId, tableid: TableId) -> i32;
    fn dup_cursor(&self, sesid: SessionId, tableid: TableId, new_tableid: &mut TableId) -> i32;

    fn add_column(
        &self,
        sesid: SessionId,
        tableid: TableId,
        name: &str,
        def: &ColumnDef,
        columnid: &mut ColumnId,
    ) -> i32;
    fn delete_column(&self, sesid: SessionId, tableid: TableId, name: &str) -> i32;
    fn create_index(&self, sesid: SessionId, tableid: TableId, index: &IndexCreate) -> i32;
    fn delete_index(&self, sesid: SessionId, tableid: TableId, name: &str) -> i32;
    fn get_table_columns(
        &self,
        sesid: SessionId,
        tableid: TableId,
        columns: &mut Vec<ColumnInfo>,
    ) -> i32;
    fn get_table_indexes(
        &self,
        sesid: SessionId,
        tableid: TableId,
        indexes: &mut Vec<IndexInfo>,
    ) -> i32;

    /// `None` selects the primary index, or record order when there is none
    fn set_current_index(
        &self,
        sesid: SessionId,
        tableid: TableId,
        name: Option<&str>,
        grbit: u32,
        itag_sequence: u32,
    ) -> i32;
    /// Writes an empty name when the cursor runs in record order
    fn get_current_index(&self, sesid: SessionId, tableid: TableId, name: &mut String) -> i32;
    fn seek(&self, sesid: SessionId, tableid: TableId, key: &[u8], grbit: u32) -> i32;
    fn set_index_range(&self, sesid: SessionId, tableid: TableId, key: &[u8], grbit: u32) -> i32;
    fn move_cursor(&self, sesid: SessionId, tableid: TableId, rows: i32, grbit: u32) -> i32;
    fn retrieve_key(&self, sesid: SessionId, tableid: TableId, key: &mut Vec<u8>) -> i32;
    fn get_bookmark(&self, sesid: SessionId, tableid: TableId, bookmark: &mut Vec<u8>) -> i32;
    fn goto_bookmark(&self, sesid: SessionId, tableid: TableId, bookmark: &[u8]) -> i32;
    /// Counts entries from the current position to the end of the index
    /// range; `max` of 0 means no limit
    fn index_record_count(
        &self,
        sesid: SessionId,
        tableid: TableId,
        max: u32,
        count: &mut u32,
    ) -> i32;

    /// Copies at most `data.len()` bytes and always reports the full size
    /// through `actual`
    fn retrieve_column(
        &self,
        sesid: SessionId,
        tableid: TableId,
        columnid: ColumnId,
        data: &mut [u8],
        actual: &mut usize,
        grbit: u32,
        itag_sequence: u32,
    ) -> i32;
    fn count_column_values(
        &self,
        sesid: SessionId,
        tableid: TableId,
        columnid: ColumnId,
        count: &mut u32,
    ) -> i32;

    fn prepare_update(&self, sesid: SessionId, tableid: TableId, mode: u32) -> i32;
    /// Applies the whole batch in order, or none of it
    fn set_columns(&self, sesid: SessionId, tableid: TableId, columns: &[SetColumn<'_>]) -> i32;
    fn update(&self, sesid: SessionId, tableid: TableId, bookmark: &mut Vec<u8>) -> i32;
    fn delete(&self, sesid: SessionId, tableid: TableId) -> i32;

    fn get_lock(&self, sesid: SessionId, tableid: TableId, grbit: u32) -> i32;
    /// Advisory: whether updating the current record would conflict now
    fn write_conflict_expected(&self, sesid: SessionId, tableid: TableId, expected: &mut bool)
        -> i32;
}

/// Convert a native status into the error taxonomy
pub(crate) trait IntoResult {
    fn into_result(self, op: &'static str) -> Result<Option<Warning>>;
}

impl IntoResult for i32 {
    fn into_result(self, op: &'static str) -> Result<Option<Warning>> {
        match self {
            status::SUCCESS => Ok(None),
            code if code > 0 => {
                trace!("{} returned warning {} ({})", op, status_name(code), code);
                Ok(Some(Warning::from_code(code)))
            }
            code => {
                debug!("{} failed with {} ({})", op, status_name(code), code);
                Err(Error::from(code))
            }
        }
    }
}

/// Thread-affinity token of a session
#[derive(Debug, Default)]
struct Affinity {
    /// Thread that set an explicit context
    context: Option<ThreadId>,
    /// Thread that owns the open transaction
    owner: Option<ThreadId>,
    /// Transaction nesting depth
    depth: u32,
}

impl Affinity {
    fn check(&self) -> Result<()> {
        let current = thread::current().id();
        match (self.context, self.owner) {
            (Some(context), _) if context != current => Err(Error::SessionSharingViolation),
            (None, Some(owner)) if owner != current => Err(Error::SessionSharingViolation),
            _ => Ok(()),
        }
    }
}

/// Session-scoped adapter over an `Engine`
pub(crate) struct SessionApi {
    engine: Arc<dyn Engine>,
    sesid: Cell<SessionId>,
    affinity: RefCell<Affinity>,
}

impl SessionApi {
    pub(crate) fn new(engine: Arc<dyn Engine>, sesid: SessionId) -> Self {
        SessionApi {
            engine,
            sesid: Cell::new(sesid),
            affinity: RefCell::new(Affinity::default()),
        }
    }

    pub(crate) fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    pub(crate) fn sesid(&self) -> SessionId {
        self.sesid.get()
    }

    pub(crate) fn depth(&self) -> u32 {
        self.affinity.borrow().depth
    }

    fn call<F>(&self, op: &'static str, f: F) -> Result<Option<Warning>>
    where
        F: FnOnce(&dyn Engine, SessionId) -> i32,
    {
        let sesid = self.sesid.get();
        if sesid.is_nil() {
            return Err(Error::InvalidHandle);
        }
        self.affinity.borrow().check()?;
        f(self.engine.as_ref(), sesid).into_result(op)
    }

    pub(crate) fn set_context(&self) -> Result<()> {
        if self.sesid.get().is_nil() {
            return Err(Error::InvalidHandle);
        }
        let mut affinity = self.affinity.borrow_mut();
        if affinity.context.is_some() {
            return Err(Error::SessionContextAlreadySet);
        }
        affinity.context = Some(thread::current().id());
        Ok(())
    }

    pub(crate) fn reset_context(&self) -> Result<()> {
        let current = thread::current().id();
        let mut affinity = self.affinity.borrow_mut();
        if affinity.context != Some(current) {
            return Err(Error::SessionContextNotSetByThisThread);
        }
        affinity.context = None;
        if affinity.depth > 0 {
            affinity.owner = Some(current);
        }
        Ok(())
    }

    pub(crate) fn has_context(&self) -> bool {
        self.affinity.borrow().context.is_some()
    }

    pub(crate) fn dup_session(&self) -> Result<SessionId> {
        let mut new_sesid = SessionId::NIL;
        self.call("dup_session", |e, s| e.dup_session(s, &mut new_sesid))?;
        Ok(new_sesid)
    }

    /// Ends the session; later calls fail with `InvalidHandle`
    pub(crate) fn end_session(&self) -> Result<()> {
        self.call("end_session", |e, s| e.end_session(s))?;
        self.sesid.set(SessionId::NIL);
        *self.affinity.borrow_mut() = Affinity::default();
        Ok(())
    }

    pub(crate) fn begin_transaction(&self, grbit: TransactionGrbit) -> Result<u32> {
        self.call("begin_transaction", |e, s| e.begin_transaction(s, grbit.bits()))?;
        let mut affinity = self.affinity.borrow_mut();
        if affinity.depth == 0 {
            affinity.owner = Some(thread::current().id());
        }
        affinity.depth += 1;
        Ok(affinity.depth)
    }

    pub(crate) fn commit_transaction(&self, grbit: CommitGrbit) -> Result<u32> {
        self.call("commit_transaction", |e, s| e.commit_transaction(s, grbit.bits()))?;
        let mut affinity = self.affinity.borrow_mut();
        affinity.depth = affinity.depth.saturating_sub(1);
        if affinity.depth == 0 {
            affinity.owner = None;
        }
        Ok(affinity.depth)
    }

    pub(crate) fn rollback(&self, grbit: RollbackGrbit) -> Result<u32> {
        self.call("rollback", |e, s| e.rollback(s, grbit.bits()))?;
        let mut affinity = self.affinity.borrow_mut();
        affinity.depth = if grbit.contains(RollbackGrbit::ROLLBACK_ALL) {
            0
        } else {
            affinity.depth.saturating_sub(1)
        };
        if affinity.depth == 0 {
            affinity.owner = None;
        }
        Ok(affinity.depth)
    }

    pub(crate) fn flush_transactions(&self, grbit: CommitGrbit) -> Result<()> {
        self.call("flush_transactions", |e, s| e.flush_transactions(s, grbit.bits()))?;
        Ok(())
    }

    pub(crate) fn create_database(
        &self,
        path: &str,
        max_pages: u32,
        grbit: AttachGrbit,
    ) -> Result<DbId> {
        let mut dbid = DbId::NIL;
        self.call("create_database", |e, s| {
            e.create_database(s, path, max_pages, grbit.bits(), &mut dbid)
        })?;
        Ok(dbid)
    }

    pub(crate) fn attach_database(
        &self,
        path: &str,
        max_pages: u32,
        grbit: AttachGrbit,
    ) -> Result<Option<Warning>> {
        self.call("attach_database", |e, s| {
            e.attach_database(s, path, max_pages, grbit.bits())
        })
    }

    pub(crate) fn detach_database(&self, path: &str) -> Result<()> {
        self.call("detach_database", |e, s| e.detach_database(s, path))?;
        Ok(())
    }

    pub(crate) fn open_database(&self, path: &str, grbit: AttachGrbit) -> Result<DbId> {
        let mut dbid = DbId::NIL;
        self.call("open_database", |e, s| {
            e.open_database(s, path, grbit.bits(), &mut dbid)
        })?;
        Ok(dbid)
    }

    pub(crate) fn close_database(&self, dbid: DbId) -> Result<()> {
        self.call("close_database", |e, s| e.close_database(s, dbid))?;
        Ok(())
    }

    pub(crate) fn get_database_info(&self, dbid: DbId) -> Result<DatabaseInfo> {
        let mut info = DatabaseInfo::default();
        self.call("get_database_info", |e, s| {
            e.get_database_info(s, dbid, &mut info)
        })?;
        Ok(info)
    }

    pub(crate) fn create_table(&self, dbid: DbId, create: &TableCreate) -> Result<TableId> {
        let mut tableid = TableId::NIL;
        self.call("create_table", |e, s| {
            e.create_table(s, dbid, create, &mut tableid)
        })?;
        Ok(tableid)
    }

    pub(crate) fn open_table(
        &self,
        dbid: DbId,
        name: &str,
        grbit: OpenTableGrbit,
    ) -> Result<TableId> {
        let mut tableid = TableId::NIL;
        self.call("open_table", |e, s| {
            e.open_table(s, dbid, name, grbit.bits(), &mut tableid)
        })?;
        Ok(tableid)
    }

    pub(crate) fn delete_table(&self, dbid: DbId, name: &str) -> Result<()> {
        self.call("delete_table", |e, s| e.delete_table(s, dbid, name))?;
        Ok(())
    }

    pub(crate) fn get_table_names(&self, dbid: DbId) -> Result<Vec<String>> {
        let mut names = Vec::new();
        self.call("get_table_names", |e, s| {
            e.get_table_names(s, dbid, &mut names)
        })?;
        Ok(names)
    }

    pub(crate) fn close_table(&self, tableid: TableId) -> Result<()> {
        self.call("close_table", |e, s| e.close_table(s, tableid))?;
        Ok(())
    }

    pub(crate) fn dup_cursor(&self, tableid: TableId) -> Result<TableId> {
        let mut new_tableid = TableId::NIL;
        self.call("dup_cursor", |e, s| e.dup_cursor(s, tableid, &mut new_tableid))?;
        Ok(new_tableid)
    }

    pub(crate) fn add_column(
        &self,
        tableid: TableId,
        name: &str,
        def: &ColumnDef,
    ) -> Result<ColumnId> {
        let mut columnid = ColumnId::default();
        self.call("add_column", |e, s| {
            e.add_column(s, tableid, name, def, &mut columnid)
        })?;
        Ok(columnid)
    }

    pub(crate) fn delete_column(&self, tableid: TableId, name: &str) -> Result<()> {
        self.call("delete_column", |e, s| e.delete_column(s, tableid, name))?;
        Ok(())
    }

    pub(crate) fn create_index(&self, tableid: TableId, index: &IndexCreate) -> Result<()> {
        self.call("create_index", |e, s| e.create_index(s, tableid, index))?;
        Ok(())
    }

    pub(crate) fn delete_index(&self, tableid: TableId, name: &str) -> Result<()> {
        self.call("delete_index", |e, s| e.delete_index(s, tableid, name))?;
        Ok(())
    }

    pub(crate) fn get_table_columns(&self, tableid: TableId) -> Result<Vec<ColumnInfo>> {
        let mut columns = Vec::new();
        self.call("get_table_columns", |e, s| {
            e.get_table_columns(s, tableid, &mut columns)
        })?;
        Ok(columns)
    }

    pub(crate) fn get_table_indexes(&self, tableid: TableId) -> Result<Vec<IndexInfo>> {
        let mut indexes = Vec::new();
        self.call("get_table_indexes", |e, s| {
            e.get_table_indexes(s, tableid, &mut indexes)
        })?;
        Ok(indexes)
    }

    pub(crate) fn set_current_index(
        &self,
        tableid: TableId,
        name: Option<&str>,
        grbit: SetCurrentIndexGrbit,
        itag_sequence: u32,
    ) -> Result<()> {
        self.call("set_current_index", |e, s| {
            e.set_current_index(s, tableid, name, grbit.bits(), itag_sequence)
        })?;
        Ok(())
    }

    pub(crate) fn get_current_index(&self, tableid: TableId) -> Result<Option<String>> {
        let mut name = String::new();
        self.call("get_current_index", |e, s| {
            e.get_current_index(s, tableid, &mut name)
        })?;
        Ok(if name.is_empty() { None } else { Some(name) })
    }

    pub(crate) fn seek(
        &self,
        tableid: TableId,
        key: &[u8],
        grbit: SeekGrbit,
    ) -> Result<Option<Warning>> {
        self.call("seek", |e, s| e.seek(s, tableid, key, grbit.bits()))
    }

    pub(crate) fn set_index_range(
        &self,
        tableid: TableId,
        key: &[u8],
        grbit: SetIndexRangeGrbit,
    ) -> Result<()> {
        self.call("set_index_range", |e, s| {
            e.set_index_range(s, tableid, key, grbit.bits())
        })?;
        Ok(())
    }

    pub(crate) fn move_cursor(&self, tableid: TableId, rows: i32, grbit: MoveGrbit) -> Result<()> {
        self.call("move", |e, s| e.move_cursor(s, tableid, rows, grbit.bits()))?;
        Ok(())
    }

    pub(crate) fn retrieve_key(&self, tableid: TableId) -> Result<Vec<u8>> {
        let mut key = Vec::new();
        self.call("retrieve_key", |e, s| e.retrieve_key(s, tableid, &mut key))?;
        Ok(key)
    }

    pub(crate) fn get_bookmark(&self, tableid: TableId) -> Result<Vec<u8>> {
        let mut bookmark = Vec::new();
        self.call("get_bookmark", |e, s| {
            e.get_bookmark(s, tableid, &mut bookmark)
        })?;
        Ok(bookmark)
    }

    pub(crate) fn goto_bookmark(&self, tableid: TableId, bookmark: &[u8]) -> Result<()> {
        self.call("goto_bookmark", |e, s| e.goto_bookmark(s, tableid, bookmark))?;
        Ok(())
    }

    pub(crate) fn index_record_count(&self, tableid: TableId, max: u32) -> Result<u32> {
        let mut count = 0;
        self.call("index_record_count", |e, s| {
            e.index_record_count(s, tableid, max, &mut count)
        })?;
        Ok(count)
    }

    /// Returns the full size of the value; only `data.len()` bytes are copied
    pub(crate) fn retrieve_column(
        &self,
        tableid: TableId,
        columnid: ColumnId,
        data: &mut [u8],
        grbit: RetrieveColumnGrbit,
        itag_sequence: u32,
    ) -> Result<(usize, Option<Warning>)> {
        let mut actual = 0;
        let warning = self.call("retrieve_column", |e, s| {
            e.retrieve_column(
                s,
                tableid,
                columnid,
                data,
                &mut actual,
                grbit.bits(),
                itag_sequence,
            )
        })?;
        Ok((actual, warning))
    }

    pub(crate) fn count_column_values(&self, tableid: TableId, columnid: ColumnId) -> Result<u32> {
        let mut count = 0;
        self.call("count_column_values", |e, s| {
            e.count_column_values(s, tableid, columnid, &mut count)
        })?;
        Ok(count)
    }

    pub(crate) fn prepare_update(&self, tableid: TableId, mode: PrepareUpdate) -> Result<()> {
        self.call("prepare_update", |e, s| {
            e.prepare_update(s, tableid, mode.bits())
        })?;
        Ok(())
    }

    pub(crate) fn set_columns(&self, tableid: TableId, columns: &[SetColumn<'_>]) -> Result<()> {
        self.call("set_columns", |e, s| e.set_columns(s, tableid, columns))?;
        Ok(())
    }

    pub(crate) fn update(&self, tableid: TableId) -> Result<Vec<u8>> {
        let mut bookmark = Vec::new();
        self.call("update", |e, s| e.update(s, tableid, &mut bookmark))?;
        Ok(bookmark)
    }

    pub(crate) fn delete(&self, tableid: TableId) -> Result<()> {
        self.call("delete", |e, s| e.delete(s, tableid))?;
        Ok(())
    }

    pub(crate) fn get_lock(&self, tableid: TableId, grbit: GetLockGrbit) -> Result<()> {
        self.call("get_lock", |e, s| e.get_lock(s, tableid, grbit.bits()))?;
        Ok(())
    }

    pub(crate) fn write_conflict_expected(&self, tableid: TableId) -> Result<bool> {
        let mut expected = false;
        self.call("write_conflict_expected", |e, s| {
            e.write_conflict_expected(s, tableid, &mut expected)
        })?;
        Ok(expected)
    }
}

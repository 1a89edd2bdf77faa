//! In-process reference engine.
//!
//! `MemoryEngine` implements `Engine` over plain in-memory maps guarded by
//! one mutex. Database files live in an engine-wide namespace keyed by
//! path and outlive the instances that attach them. Records keep a
//! committed image plus at most one uncommitted image owned by a session;
//! readers see their own uncommitted image and otherwise the committed one.

mod cursor;
mod table;

use std::collections::{BTreeMap, HashMap, HashSet};

use log::debug;
use parking_lot::Mutex;

use crate::adapter::Engine;
use crate::constants::{
    status::*, ColumnDefGrbit, CommitGrbit, GetLockGrbit, IndexCreateGrbit, MoveGrbit,
    OpenTableGrbit, PrepareUpdate, RetrieveColumnGrbit, RollbackGrbit, SeekGrbit,
    SetCurrentIndexGrbit, SetIndexRangeGrbit, TransactionGrbit, AttachGrbit, MOVE_FIRST,
    MOVE_LAST, PAGE_SIZE,
};
use crate::meta::{ColumnInfo, IndexInfo};
use crate::types::{
    ColumnDef, ColumnId, ColumnType, DatabaseInfo, DbId, EngineParams, IndexCreate, InstanceId,
    SessionId, SetColumn, TableCreate, TableId,
};

use cursor::{CursorState, IndexRange, Position, PreparedUpdate};
use table::{row_size, Entry, Pending, Row, Slot, Status, Table};

/// A database file
#[derive(Debug, Default)]
struct DatabaseFile {
    /// Size cap in pages, 0 when unbounded
    max_pages: u32,
    /// Attached read-only
    read_only: bool,
    /// Instance the file is attached to
    attached: Option<InstanceId>,
    /// Tables keyed by lower-cased name
    tables: BTreeMap<String, Table>,
}

impl DatabaseFile {
    fn size_bytes(&self) -> usize {
        self.tables.values().map(Table::size_bytes).sum()
    }
}

fn pages_for(bytes: usize) -> u32 {
    bytes.div_ceil(PAGE_SIZE) as u32
}

/// Record reference used by undo entries and locks
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RecordRef {
    path: String,
    table: String,
    rid: u64,
}

/// Restores a record's uncommitted image on rollback
#[derive(Debug, Clone)]
struct Undo {
    record: RecordRef,
    previous: Option<Pending>,
}

#[derive(Debug, Default)]
struct Level {
    undo: Vec<Undo>,
    read_only: bool,
}

#[derive(Debug)]
struct SessionState {
    instance: InstanceId,
    levels: Vec<Level>,
    /// Records locked through `get_lock`
    locks: Vec<RecordRef>,
    /// Lazy commits not yet flushed
    unflushed: u64,
}

impl SessionState {
    fn depth(&self) -> usize {
        self.levels.len()
    }

    fn read_only(&self) -> bool {
        self.levels.last().map_or(false, |l| l.read_only)
    }
}

#[derive(Debug)]
struct OpenDatabase {
    session: SessionId,
    path: String,
    read_only: bool,
}

#[derive(Debug, Default)]
struct State {
    next_handle: u64,
    /// Commit clock; record versions are clock values
    clock: u64,
    files: HashMap<String, DatabaseFile>,
    instances: HashMap<InstanceId, EngineParams>,
    sessions: HashMap<SessionId, SessionState>,
    databases: HashMap<DbId, OpenDatabase>,
    cursors: HashMap<TableId, CursorState>,
}

/// In-memory `Engine` used for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryEngine {
    state: Mutex<State>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lazily committed transactions not yet made durable by a flush
    pub fn unflushed_commits(&self) -> u64 {
        self.state.lock().sessions.values().map(|s| s.unflushed).sum()
    }

    /// Whether a database file exists at `path`
    pub fn database_exists(&self, path: &str) -> bool {
        self.state.lock().files.contains_key(path)
    }

    fn run(&self, f: impl FnOnce(&mut State) -> Status<i32>) -> i32 {
        let mut state = self.state.lock();
        match f(&mut state) {
            Ok(code) | Err(code) => code,
        }
    }
}

fn table_key(name: &str) -> String {
    name.to_lowercase()
}

fn lookup_table<'a>(
    files: &'a HashMap<String, DatabaseFile>,
    path: &str,
    table: &str,
) -> Status<&'a Table> {
    files
        .get(path)
        .and_then(|f| f.tables.get(table))
        .ok_or(ERR_OBJECT_NOT_FOUND)
}

fn lookup_table_mut<'a>(
    files: &'a mut HashMap<String, DatabaseFile>,
    path: &str,
    table: &str,
) -> Status<&'a mut Table> {
    files
        .get_mut(path)
        .and_then(|f| f.tables.get_mut(table))
        .ok_or(ERR_OBJECT_NOT_FOUND)
}

fn current_index<'a>(table: &'a Table, cursor: &CursorState) -> Option<&'a IndexInfo> {
    cursor.index.as_deref().and_then(|name| table.index(name))
}


impl State {
    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn session(&self, sesid: SessionId) -> Status<&SessionState> {
        self.sessions.get(&sesid).ok_or(ERR_INVALID_SESID)
    }

    fn params(&self, sesid: SessionId) -> Status<&EngineParams> {
        let instance = self.session(sesid)?.instance;
        self.instances.get(&instance).ok_or(ERR_INVALID_INSTANCE)
    }

    fn database(&self, sesid: SessionId, dbid: DbId) -> Status<&OpenDatabase> {
        self.session(sesid)?;
        self.databases
            .get(&dbid)
            .filter(|db| db.session == sesid)
            .ok_or(ERR_INVALID_DATABASE_ID)
    }

    fn cursor(&self, sesid: SessionId, tableid: TableId) -> Status<&CursorState> {
        self.session(sesid)?;
        self.cursors
            .get(&tableid)
            .filter(|c| c.session == sesid)
            .ok_or(ERR_INVALID_TABLE_ID)
    }

    fn cursor_mut(&mut self, sesid: SessionId, tableid: TableId) -> Status<&mut CursorState> {
        self.session(sesid)?;
        self.cursors
            .get_mut(&tableid)
            .filter(|c| c.session == sesid)
            .ok_or(ERR_INVALID_TABLE_ID)
    }

    /// Cursor plus the table it is open on
    fn cursor_table(&self, sesid: SessionId, tableid: TableId) -> Status<(&CursorState, &Table)> {
        let cursor = self.cursor(sesid, tableid)?;
        let table = lookup_table(&self.files, &cursor.path, &cursor.table)?;
        Ok((cursor, table))
    }

    /// Whether a session other than `sesid` has a cursor open on the table
    fn used_by_others(&self, sesid: SessionId, path: &str, table: &str) -> bool {
        self.cursors
            .values()
            .any(|c| c.session != sesid && c.path == path && c.table == table)
    }

    /// Entries of the cursor's current index as the cursor's session sees them
    fn entries(&self, sesid: SessionId, tableid: TableId) -> Status<Vec<Entry>> {
        let (cursor, table) = self.cursor_table(sesid, tableid)?;
        table.entries(current_index(table, cursor), sesid)
    }

    // Instances and sessions

    fn init_instance(&mut self, params: &EngineParams) -> Status<InstanceId> {
        if params.max_sessions == 0 || params.max_transaction_depth == 0 {
            return Err(ERR_INVALID_PARAMETER);
        }
        let instance = InstanceId(self.handle());
        self.instances.insert(instance, params.clone());
        debug!("initialised instance {} as {}", params.name, instance);
        Ok(instance)
    }

    fn term_instance(&mut self, instance: InstanceId) -> Status<()> {
        if !self.instances.contains_key(&instance) {
            return Err(ERR_INVALID_INSTANCE);
        }
        let sessions: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.instance == instance)
            .map(|(id, _)| *id)
            .collect();
        for sesid in sessions {
            self.end_session(sesid)?;
        }
        for file in self.files.values_mut() {
            if file.attached == Some(instance) {
                file.attached = None;
            }
        }
        self.instances.remove(&instance);
        debug!("terminated instance {}", instance);
        Ok(())
    }

    fn begin_session(&mut self, instance: InstanceId) -> Status<SessionId> {
        let params = self.instances.get(&instance).ok_or(ERR_INVALID_INSTANCE)?;
        let active = self
            .sessions
            .values()
            .filter(|s| s.instance == instance)
            .count();
        if active >= params.max_sessions as usize {
            return Err(ERR_TOO_MANY_ACTIVE_USERS);
        }
        let sesid = SessionId(self.handle());
        self.sessions.insert(
            sesid,
            SessionState {
                instance,
                levels: Vec::new(),
                locks: Vec::new(),
                unflushed: 0,
            },
        );
        Ok(sesid)
    }

    fn end_session(&mut self, sesid: SessionId) -> Status<()> {
        while self.session(sesid)?.depth() > 0 {
            self.rollback_level(sesid)?;
        }
        self.cursors.retain(|_, c| c.session != sesid);
        self.databases.retain(|_, db| db.session != sesid);
        self.sessions.remove(&sesid);
        Ok(())
    }

    // Transactions

    fn begin_transaction(&mut self, sesid: SessionId, grbit: TransactionGrbit) -> Status<()> {
        let max_depth = self.params(sesid)?.max_transaction_depth as usize;
        let session = self.sessions.get_mut(&sesid).ok_or(ERR_INVALID_SESID)?;
        if session.depth() >= max_depth {
            return Err(ERR_TRANS_TOO_DEEP);
        }
        let read_only = grbit.contains(TransactionGrbit::READ_ONLY) || session.read_only();
        session.levels.push(Level {
            undo: Vec::new(),
            read_only,
        });
        Ok(())
    }

    fn commit_transaction(&mut self, sesid: SessionId, grbit: CommitGrbit) -> Status<()> {
        let session = self.sessions.get_mut(&sesid).ok_or(ERR_INVALID_SESID)?;
        let depth = session.depth();
        let level = session.levels.pop().ok_or(ERR_NOT_IN_TRANSACTION)?;

        for cursor in self.cursors.values_mut().filter(|c| c.session == sesid) {
            if cursor.level == depth {
                cursor.level = depth - 1;
            }
            if let Some(update) = cursor.update.as_mut() {
                if update.level == depth {
                    update.level = depth - 1;
                }
            }
        }

        if let Some(parent) = session.levels.last_mut() {
            parent.undo.extend(level.undo);
            return Ok(());
        }

        if grbit.contains(CommitGrbit::LAZY_FLUSH) {
            session.unflushed += 1;
        }
        for undo in level.undo {
            let Ok(table) = lookup_table_mut(&mut self.files, &undo.record.path, &undo.record.table)
            else {
                continue;
            };
            let Some(slot) = table.records.get_mut(&undo.record.rid) else {
                continue;
            };
            if slot.pending.as_ref().map_or(false, |p| p.owner == sesid) {
                if let Some(pending) = slot.pending.take() {
                    self.clock += 1;
                    slot.committed = pending.row;
                    slot.version = self.clock;
                }
            }
            if slot.is_vacant() {
                table.records.remove(&undo.record.rid);
            }
        }
        self.release_locks(sesid)?;
        Ok(())
    }

    fn rollback(&mut self, sesid: SessionId, grbit: RollbackGrbit) -> Status<()> {
        if self.session(sesid)?.depth() == 0 {
            return Err(ERR_NOT_IN_TRANSACTION);
        }
        if grbit.contains(RollbackGrbit::ROLLBACK_ALL) {
            while self.session(sesid)?.depth() > 0 {
                self.rollback_level(sesid)?;
            }
            Ok(())
        } else {
            self.rollback_level(sesid)
        }
    }

    /// Undo the innermost level and close the cursors opened in it
    fn rollback_level(&mut self, sesid: SessionId) -> Status<()> {
        let session = self.sessions.get_mut(&sesid).ok_or(ERR_INVALID_SESID)?;
        let depth = session.depth();
        let level = session.levels.pop().ok_or(ERR_NOT_IN_TRANSACTION)?;

        for undo in level.undo.into_iter().rev() {
            let Ok(table) = lookup_table_mut(&mut self.files, &undo.record.path, &undo.record.table)
            else {
                continue;
            };
            if let Some(slot) = table.records.get_mut(&undo.record.rid) {
                slot.pending = undo.previous;
                if slot.is_vacant() {
                    table.records.remove(&undo.record.rid);
                }
            }
        }

        let before = self.cursors.len();
        self.cursors
            .retain(|_, c| c.session != sesid || c.level < depth);
        let closed = before - self.cursors.len();
        for cursor in self.cursors.values_mut().filter(|c| c.session == sesid) {
            if cursor.update.as_ref().map_or(false, |u| u.level >= depth) {
                cursor.update = None;
            }
        }
        if closed > 0 {
            debug!("rollback of level {} closed {} cursor(s)", depth, closed);
        }

        if depth == 1 {
            self.release_locks(sesid)?;
        }
        Ok(())
    }

    fn release_locks(&mut self, sesid: SessionId) -> Status<()> {
        let session = self.sessions.get_mut(&sesid).ok_or(ERR_INVALID_SESID)?;
        for record in session.locks.drain(..) {
            let Ok(table) = lookup_table_mut(&mut self.files, &record.path, &record.table) else {
                continue;
            };
            if let Some(slot) = table.records.get_mut(&record.rid) {
                if slot.writer == Some(sesid) {
                    slot.writer = None;
                }
                slot.readers.remove(&sesid);
                if slot.is_vacant() {
                    table.records.remove(&record.rid);
                }
            }
        }
        Ok(())
    }

    fn flush_transactions(&mut self, sesid: SessionId, grbit: CommitGrbit) -> Status<()> {
        self.session(sesid)?;
        if grbit.contains(CommitGrbit::WAIT_ALL_LEVEL0_COMMIT) {
            for session in self.sessions.values_mut() {
                session.unflushed = 0;
            }
        } else if let Some(session) = self.sessions.get_mut(&sesid) {
            session.unflushed = 0;
        }
        Ok(())
    }

    // Databases

    fn create_database(&mut self, sesid: SessionId, path: &str, max_pages: u32) -> Status<DbId> {
        let instance = self.session(sesid)?.instance;
        if path.is_empty() {
            return Err(ERR_INVALID_PARAMETER);
        }
        if self.files.contains_key(path) {
            return Err(ERR_DATABASE_DUPLICATE);
        }
        self.files.insert(
            path.to_owned(),
            DatabaseFile {
                max_pages,
                attached: Some(instance),
                ..Default::default()
            },
        );
        debug!("created database {}", path);
        self.open_database(sesid, path, AttachGrbit::empty())
    }

    fn attach_database(
        &mut self,
        sesid: SessionId,
        path: &str,
        max_pages: u32,
        grbit: AttachGrbit,
    ) -> Status<i32> {
        let instance = self.session(sesid)?.instance;
        let file = self.files.get_mut(path).ok_or(ERR_DATABASE_NOT_FOUND)?;
        match file.attached {
            Some(owner) if owner != instance => Err(ERR_DATABASE_IN_USE),
            Some(_) => Ok(WRN_DATABASE_ATTACHED),
            None => {
                file.attached = Some(instance);
                file.read_only = grbit.contains(AttachGrbit::READ_ONLY);
                if max_pages > 0 {
                    file.max_pages = max_pages;
                }
                debug!("attached database {}", path);
                Ok(SUCCESS)
            }
        }
    }

    fn detach_database(&mut self, sesid: SessionId, path: &str) -> Status<()> {
        let instance = self.session(sesid)?.instance;
        if self.databases.values().any(|db| db.path == path) {
            return Err(ERR_DATABASE_IN_USE);
        }
        let file = self
            .files
            .get_mut(path)
            .filter(|f| f.attached == Some(instance))
            .ok_or(ERR_DATABASE_NOT_FOUND)?;
        file.attached = None;
        debug!("detached database {}", path);
        Ok(())
    }

    fn open_database(&mut self, sesid: SessionId, path: &str, grbit: AttachGrbit) -> Status<DbId> {
        let instance = self.session(sesid)?.instance;
        let file = self
            .files
            .get(path)
            .filter(|f| f.attached == Some(instance))
            .ok_or(ERR_DATABASE_NOT_FOUND)?;
        let read_only = file.read_only || grbit.contains(AttachGrbit::READ_ONLY);
        let dbid = DbId(self.handle());
        self.databases.insert(
            dbid,
            OpenDatabase {
                session: sesid,
                path: path.to_owned(),
                read_only,
            },
        );
        Ok(dbid)
    }

    fn close_database(&mut self, sesid: SessionId, dbid: DbId) -> Status<()> {
        self.database(sesid, dbid)?;
        if self.cursors.values().any(|c| c.dbid == dbid) {
            return Err(ERR_DATABASE_IN_USE);
        }
        self.databases.remove(&dbid);
        Ok(())
    }

    fn database_info(&self, sesid: SessionId, dbid: DbId) -> Status<DatabaseInfo> {
        let db = self.database(sesid, dbid)?;
        let file = self.files.get(&db.path).ok_or(ERR_DATABASE_NOT_FOUND)?;
        Ok(DatabaseInfo {
            max_pages: file.max_pages,
            pages: pages_for(file.size_bytes()),
            read_only: db.read_only,
        })
    }

    // Tables and schema

    fn writable_database(&self, sesid: SessionId, dbid: DbId) -> Status<String> {
        let db = self.database(sesid, dbid)?;
        if db.read_only {
            return Err(ERR_PERMISSION_DENIED);
        }
        Ok(db.path.clone())
    }

    fn create_table(
        &mut self,
        sesid: SessionId,
        dbid: DbId,
        create: &TableCreate,
    ) -> Status<TableId> {
        let path = self.writable_database(sesid, dbid)?;
        let default_key_most = self.params(sesid)?.max_key_size;
        if create.name.is_empty() {
            return Err(ERR_INVALID_PARAMETER);
        }
        let key = table_key(&create.name);
        let file = self.files.get_mut(&path).ok_or(ERR_DATABASE_NOT_FOUND)?;
        if file.tables.contains_key(&key) {
            return Err(ERR_TABLE_DUPLICATE);
        }

        let mut table = Table::new(&create.name);
        for column in &create.columns {
            table.add_column(&column.name, &column.def)?;
        }
        for index in &create.indexes {
            let index = table.build_index(index, default_key_most)?;
            table.add_index(index)?;
        }
        file.tables.insert(key.clone(), table);
        debug!("created table {} in {}", create.name, path);
        self.open_cursor(sesid, dbid, path, key, OpenTableGrbit::empty())
    }

    fn open_table(
        &mut self,
        sesid: SessionId,
        dbid: DbId,
        name: &str,
        grbit: OpenTableGrbit,
    ) -> Status<TableId> {
        let path = self.database(sesid, dbid)?.path.clone();
        let key = table_key(name);
        lookup_table(&self.files, &path, &key)?;
        self.open_cursor(sesid, dbid, path, key, grbit)
    }

    fn open_cursor(
        &mut self,
        sesid: SessionId,
        dbid: DbId,
        path: String,
        table: String,
        grbit: OpenTableGrbit,
    ) -> Status<TableId> {
        let params = self.params(sesid)?;
        let instance = self.session(sesid)?.instance;
        let open = self
            .cursors
            .values()
            .filter(|c| {
                self.sessions
                    .get(&c.session)
                    .map_or(false, |s| s.instance == instance)
            })
            .count();
        if open >= params.max_cursors as usize {
            return Err(ERR_OUT_OF_CURSORS);
        }

        let wants_write = !grbit.contains(OpenTableGrbit::READ_ONLY);
        let others = self
            .cursors
            .values()
            .filter(|c| c.session != sesid && c.path == path && c.table == table);
        for other in others {
            if other.deny.contains(OpenTableGrbit::DENY_READ)
                || (other.deny.contains(OpenTableGrbit::DENY_WRITE) && wants_write)
            {
                return Err(ERR_TABLE_LOCKED);
            }
        }
        let deny = grbit & (OpenTableGrbit::DENY_READ | OpenTableGrbit::DENY_WRITE);
        if !deny.is_empty() && self.used_by_others(sesid, &path, &table) {
            return Err(ERR_TABLE_IN_USE);
        }

        let db_read_only = self.database(sesid, dbid)?.read_only;
        let index = lookup_table(&self.files, &path, &table)?
            .primary_index()
            .map(|i| i.name.clone());
        let level = self.session(sesid)?.depth();
        let tableid = TableId(self.handle());
        self.cursors.insert(
            tableid,
            CursorState {
                session: sesid,
                dbid,
                path,
                table,
                index,
                position: Position::BeforeFirst,
                range: None,
                update: None,
                level,
                read_only: db_read_only || grbit.contains(OpenTableGrbit::READ_ONLY),
                deny,
            },
        );
        Ok(tableid)
    }

    fn delete_table(&mut self, sesid: SessionId, dbid: DbId, name: &str) -> Status<()> {
        let path = self.writable_database(sesid, dbid)?;
        let key = table_key(name);
        lookup_table(&self.files, &path, &key)?;
        if self
            .cursors
            .values()
            .any(|c| c.path == path && c.table == key)
        {
            return Err(ERR_TABLE_IN_USE);
        }
        if let Some(file) = self.files.get_mut(&path) {
            file.tables.remove(&key);
        }
        debug!("deleted table {} from {}", name, path);
        Ok(())
    }

    fn table_names(&self, sesid: SessionId, dbid: DbId) -> Status<Vec<String>> {
        let db = self.database(sesid, dbid)?;
        let file = self.files.get(&db.path).ok_or(ERR_DATABASE_NOT_FOUND)?;
        Ok(file.tables.values().map(|t| t.name.clone()).collect())
    }

    fn close_table(&mut self, sesid: SessionId, tableid: TableId) -> Status<()> {
        self.cursor(sesid, tableid)?;
        self.cursors.remove(&tableid);
        Ok(())
    }

    fn dup_cursor(&mut self, sesid: SessionId, tableid: TableId) -> Status<TableId> {
        let cursor = self.cursor(sesid, tableid)?;
        let (dbid, path, table) = (cursor.dbid, cursor.path.clone(), cursor.table.clone());
        let read_only = cursor.read_only;
        let new_tableid = self.open_cursor(sesid, dbid, path, table, OpenTableGrbit::empty())?;
        if let Some(new_cursor) = self.cursors.get_mut(&new_tableid) {
            new_cursor.read_only = read_only;
        }
        Ok(new_tableid)
    }

    /// Table of a cursor that may change its schema
    fn schema_table(&mut self, sesid: SessionId, tableid: TableId) -> Status<&mut Table> {
        let cursor = self.cursor(sesid, tableid)?;
        if cursor.read_only {
            return Err(ERR_PERMISSION_DENIED);
        }
        let (path, table) = (cursor.path.clone(), cursor.table.clone());
        lookup_table_mut(&mut self.files, &path, &table)
    }

    /// Schema changes that drop structure need the table to themselves
    fn exclusive_schema_table(&mut self, sesid: SessionId, tableid: TableId) -> Status<&mut Table> {
        let cursor = self.cursor(sesid, tableid)?;
        if self.used_by_others(sesid, &cursor.path, &cursor.table) {
            return Err(ERR_TABLE_IN_USE);
        }
        self.schema_table(sesid, tableid)
    }

    fn delete_column(&mut self, sesid: SessionId, tableid: TableId, name: &str) -> Status<()> {
        let table = self.exclusive_schema_table(sesid, tableid)?;
        let columnid = table
            .column_by_name(name)
            .map(|c| c.columnid)
            .ok_or(ERR_COLUMN_NOT_FOUND)?;
        table.delete_column(name)?;
        let cursor = self.cursor(sesid, tableid)?;
        let (path, key) = (cursor.path.clone(), cursor.table.clone());
        for cursor in self
            .cursors
            .values_mut()
            .filter(|c| c.path == path && c.table == key)
        {
            if let Some(update) = cursor.update.as_mut() {
                update.row.remove(&columnid);
            }
        }
        Ok(())
    }

    fn create_index(&mut self, sesid: SessionId, tableid: TableId, create: &IndexCreate) -> Status<()> {
        let default_key_most = self.params(sesid)?.max_key_size;
        let table = self.schema_table(sesid, tableid)?;
        let index = table.build_index(create, default_key_most)?;
        table.add_index(index)
    }

    fn delete_index(&mut self, sesid: SessionId, tableid: TableId, name: &str) -> Status<()> {
        let table = self.exclusive_schema_table(sesid, tableid)?;
        table.delete_index(name)?;
        let primary = table.primary_index().map(|i| i.name.clone());
        let cursor = self.cursor(sesid, tableid)?;
        let (path, key) = (cursor.path.clone(), cursor.table.clone());
        for cursor in self.cursors.values_mut().filter(|c| {
            c.path == path
                && c.table == key
                && c.index.as_deref().map_or(false, |i| i.eq_ignore_ascii_case(name))
        }) {
            cursor.index = primary.clone();
            cursor.position = Position::BeforeFirst;
            cursor.range = None;
        }
        Ok(())
    }

    // Navigation

    fn set_current_index(
        &mut self,
        sesid: SessionId,
        tableid: TableId,
        name: Option<&str>,
        grbit: SetCurrentIndexGrbit,
        itag_sequence: u32,
    ) -> Status<()> {
        let (cursor, table) = self.cursor_table(sesid, tableid)?;
        let index = match name.filter(|n| !n.is_empty()) {
            Some(name) => Some(table.index(name).ok_or(ERR_INDEX_NOT_FOUND)?),
            None => table.primary_index(),
        };
        let entries = table.entries(index, sesid)?;
        let index_name = index.map(|i| i.name.clone());

        let position = if grbit.contains(SetCurrentIndexGrbit::NO_MOVE) {
            let rid = cursor.current()?.rid;
            let itag = itag_sequence.max(1);
            let entry = entries
                .iter()
                .find(|e| e.rid == rid && e.itag == itag)
                .or_else(|| entries.iter().find(|e| e.rid == rid))
                .ok_or(ERR_NO_CURRENT_RECORD)?;
            Position::On(entry.clone())
        } else {
            entries
                .first()
                .map_or(Position::BeforeFirst, |e| Position::On(e.clone()))
        };

        let cursor = self.cursor_mut(sesid, tableid)?;
        cursor.index = index_name;
        cursor.position = position;
        cursor.range = None;
        Ok(())
    }

    fn seek(&mut self, sesid: SessionId, tableid: TableId, key: &[u8], grbit: SeekGrbit) -> Status<i32> {
        let modes = grbit - SeekGrbit::SET_INDEX_RANGE;
        if modes.bits().count_ones() != 1
            || (grbit.contains(SeekGrbit::SET_INDEX_RANGE) && modes != SeekGrbit::SEEK_EQ)
        {
            return Err(ERR_INVALID_GRBIT);
        }
        let (cursor, table) = self.cursor_table(sesid, tableid)?;
        if cursor.update.is_some() {
            return Err(ERR_ALREADY_PREPARED);
        }
        if key.is_empty() {
            return Err(ERR_KEY_NOT_MADE);
        }
        let index = current_index(table, cursor).ok_or(ERR_NO_CURRENT_INDEX)?;
        let key_most = index.key_most as usize;
        let entries = table.entries(Some(index), sesid)?;

        let (position, code) = cursor::seek(&entries, key, modes);
        let range = (code >= 0 && grbit.contains(SeekGrbit::SET_INDEX_RANGE)).then(|| {
            let mut limit = key.to_vec();
            if limit.len() <= key_most {
                limit.resize(key_most + 1, 0xFF);
            }
            IndexRange {
                limit,
                upper: true,
                inclusive: true,
            }
        });

        let cursor = self.cursor_mut(sesid, tableid)?;
        cursor.position = position;
        cursor.range = range;
        if code < 0 {
            Err(code)
        } else {
            Ok(code)
        }
    }

    fn set_index_range(
        &mut self,
        sesid: SessionId,
        tableid: TableId,
        key: &[u8],
        grbit: SetIndexRangeGrbit,
    ) -> Status<()> {
        let cursor = self.cursor_mut(sesid, tableid)?;
        if grbit.contains(SetIndexRangeGrbit::REMOVE) {
            cursor.range = None;
            return Ok(());
        }
        if key.is_empty() {
            return Err(ERR_KEY_NOT_MADE);
        }
        let current = cursor.current()?;
        let range = IndexRange {
            limit: key.to_vec(),
            upper: grbit.contains(SetIndexRangeGrbit::UPPER_LIMIT),
            inclusive: grbit.contains(SetIndexRangeGrbit::INCLUSIVE),
        };
        if !range.contains(&current.key) {
            cursor.range = None;
            return Err(ERR_NO_CURRENT_RECORD);
        }
        if !grbit.contains(SetIndexRangeGrbit::INSTANT_DURATION) {
            cursor.range = Some(range);
        }
        Ok(())
    }

    fn move_cursor(&mut self, sesid: SessionId, tableid: TableId, rows: i32, grbit: MoveGrbit) -> Status<()> {
        let entries = self.entries(sesid, tableid)?;
        let visible = {
            let (cursor, table) = self.cursor_table(sesid, tableid)?;
            cursor.current().ok().map_or(false, |e| {
                table
                    .records
                    .get(&e.rid)
                    .and_then(|s| s.visible(sesid))
                    .is_some()
            })
        };
        let cursor = self.cursor_mut(sesid, tableid)?;
        cursor.update = None;
        let key_ne = grbit.contains(MoveGrbit::MOVE_KEY_NE);

        match rows {
            MOVE_FIRST => {
                cursor.range = None;
                match entries.first() {
                    Some(e) => cursor.position = Position::On(e.clone()),
                    None => {
                        cursor.position = Position::BeforeFirst;
                        return Err(ERR_NO_CURRENT_RECORD);
                    }
                }
            }
            MOVE_LAST => {
                cursor.range = None;
                match entries.last() {
                    Some(e) => cursor.position = Position::On(e.clone()),
                    None => {
                        cursor.position = Position::AfterLast;
                        return Err(ERR_NO_CURRENT_RECORD);
                    }
                }
            }
            0 => {
                if !visible {
                    return Err(ERR_NO_CURRENT_RECORD);
                }
            }
            rows if rows > 0 => {
                for _ in 0..rows {
                    match cursor::next_entry(&entries, &cursor.position, cursor.range.as_ref(), key_ne) {
                        Some(i) => cursor.position = Position::On(entries[i].clone()),
                        None => {
                            cursor.position = Position::AfterLast;
                            cursor.range = None;
                            return Err(ERR_NO_CURRENT_RECORD);
                        }
                    }
                }
            }
            rows => {
                for _ in 0..rows.unsigned_abs() {
                    match cursor::prev_entry(&entries, &cursor.position, cursor.range.as_ref(), key_ne) {
                        Some(i) => cursor.position = Position::On(entries[i].clone()),
                        None => {
                            cursor.position = Position::BeforeFirst;
                            cursor.range = None;
                            return Err(ERR_NO_CURRENT_RECORD);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Record image under the cursor
    fn current_row<'a>(&'a self, sesid: SessionId, tableid: TableId) -> Status<(&'a Entry, &'a Row)> {
        let (cursor, table) = self.cursor_table(sesid, tableid)?;
        let entry = cursor.current()?;
        let row = table
            .records
            .get(&entry.rid)
            .and_then(|s| s.visible(sesid))
            .ok_or(ERR_RECORD_DELETED)?;
        Ok((entry, row))
    }

    fn retrieve_key(&self, sesid: SessionId, tableid: TableId) -> Status<Vec<u8>> {
        let (entry, _) = self.current_row(sesid, tableid)?;
        Ok(entry.key.clone())
    }

    fn bookmark(&self, sesid: SessionId, tableid: TableId) -> Status<Vec<u8>> {
        let (entry, _) = self.current_row(sesid, tableid)?;
        Ok(entry.rid.to_be_bytes().to_vec())
    }

    fn goto_bookmark(&mut self, sesid: SessionId, tableid: TableId, bookmark: &[u8]) -> Status<()> {
        let rid = u64::from_be_bytes(bookmark.try_into().map_err(|_| ERR_INVALID_BOOKMARK)?);
        {
            let (_, table) = self.cursor_table(sesid, tableid)?;
            table
                .records
                .get(&rid)
                .and_then(|s| s.visible(sesid))
                .ok_or(ERR_RECORD_DELETED)?;
        }
        let entries = self.entries(sesid, tableid)?;
        let entry = entries
            .into_iter()
            .find(|e| e.rid == rid)
            .ok_or(ERR_RECORD_NOT_FOUND)?;
        let cursor = self.cursor_mut(sesid, tableid)?;
        cursor.update = None;
        cursor.range = None;
        cursor.position = Position::On(entry);
        Ok(())
    }

    fn index_record_count(&self, sesid: SessionId, tableid: TableId, max: u32) -> Status<u32> {
        let entries = self.entries(sesid, tableid)?;
        let cursor = self.cursor(sesid, tableid)?;
        let start = match &cursor.position {
            Position::BeforeFirst => 0,
            Position::AfterLast => entries.len(),
            Position::On(current) => entries.partition_point(|e| e < current),
            Position::Between(key) => entries.partition_point(|e| e.key.as_slice() <= key.as_slice()),
        };
        let limit = if max == 0 { usize::MAX } else { max as usize };
        let count = entries[start..]
            .iter()
            .take_while(|e| cursor.range.as_ref().map_or(true, |r| r.contains(&e.key)))
            .take(limit)
            .count();
        Ok(count as u32)
    }

    // Columns

    #[allow(clippy::too_many_arguments)]
    fn retrieve_column(
        &self,
        sesid: SessionId,
        tableid: TableId,
        columnid: ColumnId,
        data: &mut [u8],
        actual: &mut usize,
        grbit: RetrieveColumnGrbit,
        itag_sequence: u32,
    ) -> Status<i32> {
        let (cursor, table) = self.cursor_table(sesid, tableid)?;
        let column = table.column(columnid).ok_or(ERR_COLUMN_NOT_FOUND)?;
        if itag_sequence == 0 {
            return Err(ERR_INVALID_PARAMETER);
        }
        let mut itag = itag_sequence as usize;

        let row = if grbit.contains(RetrieveColumnGrbit::RETRIEVE_COPY) {
            &cursor.update.as_ref().ok_or(ERR_UPDATE_NOT_PREPARED)?.row
        } else {
            let (entry, row) = self.current_row(sesid, tableid)?;
            if grbit.contains(RetrieveColumnGrbit::RETRIEVE_FROM_INDEX) {
                let index = current_index(table, cursor).ok_or(ERR_NO_CURRENT_INDEX)?;
                if !index.covers(columnid) {
                    return Err(ERR_BAD_COLUMN_ID);
                }
                if column.is_multi_valued() {
                    itag = entry.itag as usize;
                }
            }
            row
        };

        let value = match row.get(&columnid) {
            Some(values) => values.get(itag - 1).map(Vec::as_slice),
            None if itag == 1 && !grbit.contains(RetrieveColumnGrbit::IGNORE_DEFAULT) => {
                column.default_value.as_deref()
            }
            None => None,
        };
        let Some(value) = value else {
            *actual = 0;
            return Ok(WRN_COLUMN_NULL);
        };
        *actual = value.len();
        let copied = value.len().min(data.len());
        data[..copied].copy_from_slice(&value[..copied]);
        Ok(if copied < value.len() {
            WRN_BUFFER_TRUNCATED
        } else {
            SUCCESS
        })
    }

    fn count_column_values(&self, sesid: SessionId, tableid: TableId, columnid: ColumnId) -> Status<u32> {
        let (cursor, table) = self.cursor_table(sesid, tableid)?;
        table.column(columnid).ok_or(ERR_COLUMN_NOT_FOUND)?;
        let row = match cursor.update.as_ref() {
            Some(update) => &update.row,
            None => self.current_row(sesid, tableid)?.1,
        };
        Ok(row.get(&columnid).map_or(0, |v| v.len() as u32))
    }

    // Updates

    /// Rejects writes through read-only handles, read-only transactions and
    /// tables another session opened for exclusive use
    fn check_writable(&self, sesid: SessionId, tableid: TableId) -> Status<()> {
        let cursor = self.cursor(sesid, tableid)?;
        if cursor.read_only {
            return Err(ERR_PERMISSION_DENIED);
        }
        if self.session(sesid)?.read_only() {
            return Err(ERR_TRANS_READ_ONLY);
        }
        let locked = self.cursors.values().any(|other| {
            other.session != sesid
                && other.on_same_table(cursor)
                && other
                    .deny
                    .intersects(OpenTableGrbit::DENY_READ | OpenTableGrbit::DENY_WRITE)
        });
        if locked {
            return Err(ERR_TABLE_LOCKED);
        }
        Ok(())
    }

    fn prepare_update(&mut self, sesid: SessionId, tableid: TableId, mode: u32) -> Status<()> {
        let mode = PrepareUpdate::from_bits(mode).ok_or(ERR_INVALID_GRBIT)?;
        let cursor = self.cursor(sesid, tableid)?;
        if mode == PrepareUpdate::Cancel {
            let cursor = self.cursor_mut(sesid, tableid)?;
            return match cursor.update.take() {
                Some(_) => Ok(()),
                None => Err(ERR_UPDATE_NOT_PREPARED),
            };
        }
        if cursor.update.is_some() {
            return Err(ERR_ALREADY_PREPARED);
        }
        self.check_writable(sesid, tableid)?;

        let (rid, version, mut row) = match mode {
            PrepareUpdate::Insert => (None, 0, Row::new()),
            _ => {
                let (entry, row) = self.current_row(sesid, tableid)?;
                let (_, table) = self.cursor_table(sesid, tableid)?;
                let version = table.records.get(&entry.rid).map_or(0, |s| s.version);
                if mode == PrepareUpdate::Replace {
                    (Some(entry.rid), version, row.clone())
                } else {
                    (None, 0, row.clone())
                }
            }
        };
        let level = self.session(sesid)?.depth();

        if rid.is_none() {
            let cursor = self.cursor(sesid, tableid)?;
            let (path, key) = (cursor.path.clone(), cursor.table.clone());
            let table = lookup_table_mut(&mut self.files, &path, &key)?;
            let generated: Vec<(ColumnId, ColumnType, ColumnDefGrbit)> = table
                .columns
                .iter()
                .filter(|c| c.grbit.intersects(ColumnDefGrbit::AUTOINCREMENT | ColumnDefGrbit::VERSION))
                .map(|c| (c.columnid, c.coltyp, c.grbit))
                .collect();
            for (columnid, coltyp, grbit) in generated {
                if grbit.contains(ColumnDefGrbit::AUTOINCREMENT) {
                    let value = table.next_autoinc(columnid, coltyp)?;
                    row.insert(columnid, vec![value]);
                } else {
                    row.remove(&columnid);
                }
            }
        }

        let cursor = self.cursor_mut(sesid, tableid)?;
        cursor.update = Some(PreparedUpdate {
            mode,
            rid,
            version,
            row,
            level,
        });
        Ok(())
    }

    fn set_columns(&mut self, sesid: SessionId, tableid: TableId, columns: &[SetColumn<'_>]) -> Status<()> {
        let (cursor, table) = self.cursor_table(sesid, tableid)?;
        let update = cursor.update.as_ref().ok_or(ERR_UPDATE_NOT_PREPARED)?;
        let mut row = update.row.clone();
        for set in columns {
            table.apply_set(&mut row, set)?;
        }
        if let Some(update) = self.cursor_mut(sesid, tableid)?.update.as_mut() {
            update.row = row;
        }
        Ok(())
    }

    fn update(&mut self, sesid: SessionId, tableid: TableId) -> Status<Vec<u8>> {
        let update = self
            .cursor_mut(sesid, tableid)?
            .update
            .take()
            .ok_or(ERR_UPDATE_NOT_PREPARED)?;
        self.check_writable(sesid, tableid)?;

        let cursor = self.cursor(sesid, tableid)?;
        let (path, key) = (cursor.path.clone(), cursor.table.clone());
        let depth = self.session(sesid)?.depth();
        let file = self.files.get(&path).ok_or(ERR_DATABASE_NOT_FOUND)?;
        let table = file.tables.get(&key).ok_or(ERR_OBJECT_NOT_FOUND)?;
        let mut row = update.row;

        table.check_not_null(&row)?;
        for index in &table.indexes {
            let disallow = index
                .grbit
                .intersects(IndexCreateGrbit::PRIMARY | IndexCreateGrbit::DISALLOW_NULL);
            if disallow && table.has_null_key(index, &row) {
                return Err(ERR_NULL_KEY_DISALLOWED);
            }
        }

        let mut old_size = 0;
        if let Some(rid) = update.rid {
            let slot = table.records.get(&rid).ok_or(ERR_RECORD_DELETED)?;
            let old = slot.visible(sesid).ok_or(ERR_RECORD_DELETED)?;
            if slot.conflicts_with(sesid) || slot.version != update.version {
                return Err(ERR_WRITE_CONFLICT);
            }
            if let Some(primary) = table.primary_index() {
                if table.index_keys(primary, old)? != table.index_keys(primary, &row)? {
                    return Err(ERR_RECORD_PRIMARY_CHANGED);
                }
            }
            old_size = row_size(old);
            for column in table
                .columns
                .iter()
                .filter(|c| c.grbit.contains(ColumnDefGrbit::VERSION))
            {
                let previous = old
                    .get(&column.columnid)
                    .and_then(|v| v.first())
                    .and_then(|v| <[u8; 4]>::try_from(v.as_slice()).ok())
                    .map_or(0, i32::from_le_bytes);
                row.insert(column.columnid, vec![previous.wrapping_add(1).to_le_bytes().to_vec()]);
            }
        } else {
            for column in table
                .columns
                .iter()
                .filter(|c| c.grbit.contains(ColumnDefGrbit::VERSION))
            {
                row.insert(column.columnid, vec![1i32.to_le_bytes().to_vec()]);
            }
        }

        for index in table.indexes.iter().filter(|i| i.is_unique()) {
            let keys: HashSet<Vec<u8>> = table
                .index_keys(index, &row)?
                .into_iter()
                .map(|(k, _)| k)
                .collect();
            for (&other_rid, slot) in &table.records {
                if Some(other_rid) == update.rid {
                    continue;
                }
                let foreign = slot
                    .pending
                    .as_ref()
                    .filter(|p| p.owner != sesid)
                    .and_then(|p| p.row.as_ref());
                for image in slot.visible(sesid).into_iter().chain(foreign) {
                    if table
                        .index_keys(index, image)?
                        .iter()
                        .any(|(k, _)| keys.contains(k))
                    {
                        return Err(ERR_KEY_DUPLICATE);
                    }
                }
            }
        }

        if file.max_pages > 0 {
            let total = file.size_bytes() - old_size.min(file.size_bytes()) + row_size(&row);
            if pages_for(total) > file.max_pages {
                return Err(ERR_OUT_OF_DATABASE_SPACE);
            }
        }

        let table = lookup_table_mut(&mut self.files, &path, &key)?;
        let rid = match update.rid {
            Some(rid) => rid,
            None => table.alloc_rid(),
        };
        let slot = table.records.entry(rid).or_insert_with(Slot::default);
        if depth == 0 {
            self.clock += 1;
            slot.committed = Some(row);
            slot.version = self.clock;
        } else {
            let previous = slot.pending.replace(Pending {
                owner: sesid,
                row: Some(row),
            });
            self.push_undo(sesid, RecordRef { path, table: key, rid }, previous)?;
        }
        Ok(rid.to_be_bytes().to_vec())
    }

    fn push_undo(&mut self, sesid: SessionId, record: RecordRef, previous: Option<Pending>) -> Status<()> {
        let session = self.sessions.get_mut(&sesid).ok_or(ERR_INVALID_SESID)?;
        let level = session.levels.last_mut().ok_or(ERR_NOT_IN_TRANSACTION)?;
        level.undo.push(Undo { record, previous });
        Ok(())
    }

    fn delete(&mut self, sesid: SessionId, tableid: TableId) -> Status<()> {
        self.check_writable(sesid, tableid)?;
        let (entry, _) = self.current_row(sesid, tableid)?;
        let rid = entry.rid;
        let cursor = self.cursor(sesid, tableid)?;
        let (path, key) = (cursor.path.clone(), cursor.table.clone());
        let depth = self.session(sesid)?.depth();

        let table = lookup_table_mut(&mut self.files, &path, &key)?;
        let slot = table.records.get_mut(&rid).ok_or(ERR_RECORD_DELETED)?;
        if slot.conflicts_with(sesid) {
            return Err(ERR_WRITE_CONFLICT);
        }
        if depth == 0 {
            self.clock += 1;
            slot.committed = None;
            slot.version = self.clock;
            if slot.is_vacant() {
                table.records.remove(&rid);
            }
        } else {
            let previous = slot.pending.replace(Pending {
                owner: sesid,
                row: None,
            });
            self.push_undo(sesid, RecordRef { path, table: key, rid }, previous)?;
        }
        Ok(())
    }

    // Locks

    fn get_lock(&mut self, sesid: SessionId, tableid: TableId, grbit: GetLockGrbit) -> Status<()> {
        if grbit.is_empty() {
            return Err(ERR_INVALID_GRBIT);
        }
        if self.session(sesid)?.depth() == 0 {
            return Err(ERR_NOT_IN_TRANSACTION);
        }
        let (entry, _) = self.current_row(sesid, tableid)?;
        let rid = entry.rid;
        let cursor = self.cursor(sesid, tableid)?;
        let record = RecordRef {
            path: cursor.path.clone(),
            table: cursor.table.clone(),
            rid,
        };

        let table = lookup_table_mut(&mut self.files, &record.path, &record.table)?;
        let slot = table.records.get_mut(&rid).ok_or(ERR_RECORD_DELETED)?;
        let foreign_pending = slot.pending.as_ref().map_or(false, |p| p.owner != sesid);
        let foreign_writer = slot.writer.map_or(false, |w| w != sesid);
        if foreign_pending || foreign_writer {
            return Err(ERR_WRITE_CONFLICT);
        }
        if grbit.contains(GetLockGrbit::WRITE_LOCK) {
            if slot.readers.iter().any(|r| *r != sesid) {
                return Err(ERR_WRITE_CONFLICT);
            }
            slot.writer = Some(sesid);
        }
        if grbit.contains(GetLockGrbit::READ_LOCK) {
            slot.readers.insert(sesid);
        }
        if let Some(session) = self.sessions.get_mut(&sesid) {
            session.locks.push(record);
        }
        Ok(())
    }

    fn write_conflict_expected(&self, sesid: SessionId, tableid: TableId) -> Status<bool> {
        let (entry, _) = self.current_row(sesid, tableid)?;
        let (cursor, table) = self.cursor_table(sesid, tableid)?;
        let slot = table.records.get(&entry.rid).ok_or(ERR_RECORD_DELETED)?;
        let stale = cursor
            .update
            .as_ref()
            .map_or(false, |u| u.rid == Some(entry.rid) && u.version != slot.version);
        Ok(slot.conflicts_with(sesid) || stale)
    }
}

fn done(result: Status<()>) -> Status<i32> {
    result.map(|_| SUCCESS)
}

impl Engine for MemoryEngine {
    fn init_instance(&self, params: &EngineParams, instance: &mut InstanceId) -> i32 {
        self.run(|state| {
            *instance = state.init_instance(params)?;
            Ok(SUCCESS)
        })
    }

    fn term_instance(&self, instance: InstanceId) -> i32 {
        self.run(|state| done(state.term_instance(instance)))
    }

    fn begin_session(&self, instance: InstanceId, sesid: &mut SessionId) -> i32 {
        self.run(|state| {
            *sesid = state.begin_session(instance)?;
            Ok(SUCCESS)
        })
    }

    fn dup_session(&self, sesid: SessionId, new_sesid: &mut SessionId) -> i32 {
        self.run(|state| {
            let instance = state.session(sesid)?.instance;
            *new_sesid = state.begin_session(instance)?;
            Ok(SUCCESS)
        })
    }

    fn end_session(&self, sesid: SessionId) -> i32 {
        self.run(|state| done(state.end_session(sesid)))
    }

    fn begin_transaction(&self, sesid: SessionId, grbit: u32) -> i32 {
        let grbit = TransactionGrbit::from_bits_truncate(grbit);
        self.run(|state| done(state.begin_transaction(sesid, grbit)))
    }

    fn commit_transaction(&self, sesid: SessionId, grbit: u32) -> i32 {
        let grbit = CommitGrbit::from_bits_truncate(grbit);
        self.run(|state| done(state.commit_transaction(sesid, grbit)))
    }

    fn rollback(&self, sesid: SessionId, grbit: u32) -> i32 {
        let grbit = RollbackGrbit::from_bits_truncate(grbit);
        self.run(|state| done(state.rollback(sesid, grbit)))
    }

    fn flush_transactions(&self, sesid: SessionId, grbit: u32) -> i32 {
        let grbit = CommitGrbit::from_bits_truncate(grbit);
        self.run(|state| done(state.flush_transactions(sesid, grbit)))
    }

    fn create_database(
        &self,
        sesid: SessionId,
        path: &str,
        max_pages: u32,
        _grbit: u32,
        dbid: &mut DbId,
    ) -> i32 {
        self.run(|state| {
            *dbid = state.create_database(sesid, path, max_pages)?;
            Ok(SUCCESS)
        })
    }

    fn attach_database(&self, sesid: SessionId, path: &str, max_pages: u32, grbit: u32) -> i32 {
        let grbit = AttachGrbit::from_bits_truncate(grbit);
        self.run(|state| state.attach_database(sesid, path, max_pages, grbit))
    }

    fn detach_database(&self, sesid: SessionId, path: &str) -> i32 {
        self.run(|state| done(state.detach_database(sesid, path)))
    }

    fn open_database(&self, sesid: SessionId, path: &str, grbit: u32, dbid: &mut DbId) -> i32 {
        let grbit = AttachGrbit::from_bits_truncate(grbit);
        self.run(|state| {
            *dbid = state.open_database(sesid, path, grbit)?;
            Ok(SUCCESS)
        })
    }

    fn close_database(&self, sesid: SessionId, dbid: DbId) -> i32 {
        self.run(|state| done(state.close_database(sesid, dbid)))
    }

    fn get_database_info(&self, sesid: SessionId, dbid: DbId, info: &mut DatabaseInfo) -> i32 {
        self.run(|state| {
            *info = state.database_info(sesid, dbid)?;
            Ok(SUCCESS)
        })
    }

    fn create_table(
        &self,
        sesid: SessionId,
        dbid: DbId,
        create: &TableCreate,
        tableid: &mut TableId,
    ) -> i32 {
        self.run(|state| {
            *tableid = state.create_table(sesid, dbid, create)?;
            Ok(SUCCESS)
        })
    }

    fn open_table(
        &self,
        sesid: SessionId,
        dbid: DbId,
        name: &str,
        grbit: u32,
        tableid: &mut TableId,
    ) -> i32 {
        let grbit = OpenTableGrbit::from_bits_truncate(grbit);
        self.run(|state| {
            *tableid = state.open_table(sesid, dbid, name, grbit)?;
            Ok(SUCCESS)
        })
    }

    fn delete_table(&self, sesid: SessionId, dbid: DbId, name: &str) -> i32 {
        self.run(|state| done(state.delete_table(sesid, dbid, name)))
    }

    fn get_table_names(&self, sesid: SessionId, dbid: DbId, names: &mut Vec<String>) -> i32 {
        self.run(|state| {
            *names = state.table_names(sesid, dbid)?;
            Ok(SUCCESS)
        })
    }

    fn close_table(&self, sesid: SessionId, tableid: TableId) -> i32 {
        self.run(|state| done(state.close_table(sesid, tableid)))
    }

    fn dup_cursor(&self, sesid: SessionId, tableid: TableId, new_tableid: &mut TableId) -> i32 {
        self.run(|state| {
            *new_tableid = state.dup_cursor(sesid, tableid)?;
            Ok(SUCCESS)
        })
    }

    fn add_column(
        &self,
        sesid: SessionId,
        tableid: TableId,
        name: &str,
        def: &ColumnDef,
        columnid: &mut ColumnId,
    ) -> i32 {
        self.run(|state| {
            *columnid = state.schema_table(sesid, tableid)?.add_column(name, def)?;
            Ok(SUCCESS)
        })
    }

    fn delete_column(&self, sesid: SessionId, tableid: TableId, name: &str) -> i32 {
        self.run(|state| done(state.delete_column(sesid, tableid, name)))
    }

    fn create_index(&self, sesid: SessionId, tableid: TableId, index: &IndexCreate) -> i32 {
        self.run(|state| done(state.create_index(sesid, tableid, index)))
    }

    fn delete_index(&self, sesid: SessionId, tableid: TableId, name: &str) -> i32 {
        self.run(|state| done(state.delete_index(sesid, tableid, name)))
    }

    fn get_table_columns(
        &self,
        sesid: SessionId,
        tableid: TableId,
        columns: &mut Vec<ColumnInfo>,
    ) -> i32 {
        self.run(|state| {
            *columns = state.cursor_table(sesid, tableid)?.1.columns.clone();
            Ok(SUCCESS)
        })
    }

    fn get_table_indexes(
        &self,
        sesid: SessionId,
        tableid: TableId,
        indexes: &mut Vec<IndexInfo>,
    ) -> i32 {
        self.run(|state| {
            *indexes = state.cursor_table(sesid, tableid)?.1.indexes.clone();
            Ok(SUCCESS)
        })
    }

    fn set_current_index(
        &self,
        sesid: SessionId,
        tableid: TableId,
        name: Option<&str>,
        grbit: u32,
        itag_sequence: u32,
    ) -> i32 {
        let grbit = SetCurrentIndexGrbit::from_bits_truncate(grbit);
        self.run(|state| {
            done(state.set_current_index(sesid, tableid, name, grbit, itag_sequence))
        })
    }

    fn get_current_index(&self, sesid: SessionId, tableid: TableId, name: &mut String) -> i32 {
        self.run(|state| {
            let (cursor, table) = state.cursor_table(sesid, tableid)?;
            *name = current_index(table, cursor)
                .map(|i| i.name.clone())
                .unwrap_or_default();
            Ok(SUCCESS)
        })
    }

    fn seek(&self, sesid: SessionId, tableid: TableId, key: &[u8], grbit: u32) -> i32 {
        let grbit = SeekGrbit::from_bits_truncate(grbit);
        self.run(|state| state.seek(sesid, tableid, key, grbit))
    }

    fn set_index_range(&self, sesid: SessionId, tableid: TableId, key: &[u8], grbit: u32) -> i32 {
        let grbit = SetIndexRangeGrbit::from_bits_truncate(grbit);
        self.run(|state| done(state.set_index_range(sesid, tableid, key, grbit)))
    }

    fn move_cursor(&self, sesid: SessionId, tableid: TableId, rows: i32, grbit: u32) -> i32 {
        let grbit = MoveGrbit::from_bits_truncate(grbit);
        self.run(|state| done(state.move_cursor(sesid, tableid, rows, grbit)))
    }

    fn retrieve_key(&self, sesid: SessionId, tableid: TableId, key: &mut Vec<u8>) -> i32 {
        self.run(|state| {
            *key = state.retrieve_key(sesid, tableid)?;
            Ok(SUCCESS)
        })
    }

    fn get_bookmark(&self, sesid: SessionId, tableid: TableId, bookmark: &mut Vec<u8>) -> i32 {
        self.run(|state| {
            *bookmark = state.bookmark(sesid, tableid)?;
            Ok(SUCCESS)
        })
    }

    fn goto_bookmark(&self, sesid: SessionId, tableid: TableId, bookmark: &[u8]) -> i32 {
        self.run(|state| done(state.goto_bookmark(sesid, tableid, bookmark)))
    }

    fn index_record_count(&self, sesid: SessionId, tableid: TableId, max: u32, count: &mut u32) -> i32 {
        self.run(|state| {
            *count = state.index_record_count(sesid, tableid, max)?;
            Ok(SUCCESS)
        })
    }

    fn retrieve_column(
        &self,
        sesid: SessionId,
        tableid: TableId,
        columnid: ColumnId,
        data: &mut [u8],
        actual: &mut usize,
        grbit: u32,
        itag_sequence: u32,
    ) -> i32 {
        let grbit = RetrieveColumnGrbit::from_bits_truncate(grbit);
        self.run(|state| {
            state.retrieve_column(sesid, tableid, columnid, data, actual, grbit, itag_sequence)
        })
    }

    fn count_column_values(
        &self,
        sesid: SessionId,
        tableid: TableId,
        columnid: ColumnId,
        count: &mut u32,
    ) -> i32 {
        self.run(|state| {
            *count = state.count_column_values(sesid, tableid, columnid)?;
            Ok(SUCCESS)
        })
    }

    fn prepare_update(&self, sesid: SessionId, tableid: TableId, mode: u32) -> i32 {
        self.run(|state| done(state.prepare_update(sesid, tableid, mode)))
    }

    fn set_columns(&self, sesid: SessionId, tableid: TableId, columns: &[SetColumn<'_>]) -> i32 {
        self.run(|state| done(state.set_columns(sesid, tableid, columns)))
    }

    fn update(&self, sesid: SessionId, tableid: TableId, bookmark: &mut Vec<u8>) -> i32 {
        self.run(|state| {
            *bookmark = state.update(sesid, tableid)?;
            Ok(SUCCESS)
        })
    }

    fn delete(&self, sesid: SessionId, tableid: TableId) -> i32 {
        self.run(|state| done(state.delete(sesid, tableid)))
    }

    fn get_lock(&self, sesid: SessionId, tableid: TableId, grbit: u32) -> i32 {
        let grbit = GetLockGrbit::from_bits_truncate(grbit);
        self.run(|state| done(state.get_lock(sesid, tableid, grbit)))
    }

    fn write_conflict_expected(
        &self,
        sesid: SessionId,
        tableid: TableId,
        expected: &mut bool,
    ) -> i32 {
        self.run(|state| {
            *expected = state.write_conflict_expected(sesid, tableid)?;
            Ok(SUCCESS)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SetColumnGrbit;

    struct Fixture {
        engine: MemoryEngine,
        sesid: SessionId,
        dbid: DbId,
        tableid: TableId,
    }

    fn params() -> EngineParams {
        EngineParams {
            name: "test".to_owned(),
            max_sessions: 4,
            max_cursors: 16,
            max_transaction_depth: 3,
            max_key_size: 255,
            circular_log: false,
        }
    }

    fn fixture() -> Fixture {
        let engine = MemoryEngine::new();
        let mut instance = InstanceId::NIL;
        assert_eq!(engine.init_instance(&params(), &mut instance), SUCCESS);
        let mut sesid = SessionId::NIL;
        assert_eq!(engine.begin_session(instance, &mut sesid), SUCCESS);
        let mut dbid = DbId::NIL;
        assert_eq!(engine.create_database(sesid, "test.db", 0, 0, &mut dbid), SUCCESS);
        let create = TableCreate::new("items")
            .column("Id", ColumnDef::new(ColumnType::Long))
            .index(IndexCreate::new("primary", "+Id\0\0", IndexCreateGrbit::PRIMARY));
        let mut tableid = TableId::NIL;
        assert_eq!(engine.create_table(sesid, dbid, &create, &mut tableid), SUCCESS);
        Fixture {
            engine,
            sesid,
            dbid,
            tableid,
        }
    }

    fn insert(f: &Fixture, sesid: SessionId, tableid: TableId, id: i32) -> i32 {
        let bytes = id.to_le_bytes();
        let set = [SetColumn {
            columnid: ColumnId(1),
            data: Some(&bytes),
            grbit: SetColumnGrbit::empty(),
            itag_sequence: 1,
        }];
        let status = f
            .engine
            .prepare_update(sesid, tableid, PrepareUpdate::Insert.bits());
        if status < 0 {
            return status;
        }
        let status = f.engine.set_columns(sesid, tableid, &set);
        if status < 0 {
            return status;
        }
        let mut bookmark = Vec::new();
        f.engine.update(sesid, tableid, &mut bookmark)
    }

    fn count(f: &Fixture, sesid: SessionId, tableid: TableId) -> u32 {
        let mut count = 0;
        f.engine.move_cursor(sesid, tableid, MOVE_FIRST, 0);
        assert!(f.engine.index_record_count(sesid, tableid, 0, &mut count) >= 0);
        count
    }

    #[test]
    fn test_uncommitted_insert_is_private() {
        let f = fixture();
        let mut other = SessionId::NIL;
        assert_eq!(f.engine.dup_session(f.sesid, &mut other), SUCCESS);
        let mut other_db = DbId::NIL;
        assert_eq!(f.engine.open_database(other, "test.db", 0, &mut other_db), SUCCESS);
        let mut other_table = TableId::NIL;
        assert_eq!(
            f.engine.open_table(other, other_db, "ITEMS", 0, &mut other_table),
            SUCCESS
        );

        assert_eq!(f.engine.begin_transaction(f.sesid, 0), SUCCESS);
        assert_eq!(insert(&f, f.sesid, f.tableid, 1), SUCCESS);
        assert_eq!(count(&f, f.sesid, f.tableid), 1);
        assert_eq!(count(&f, other, other_table), 0);

        assert_eq!(f.engine.commit_transaction(f.sesid, 0), SUCCESS);
        assert_eq!(count(&f, other, other_table), 1);
    }

    #[test]
    fn test_rollback_discards_and_closes_inner_cursors() {
        let f = fixture();
        assert_eq!(f.engine.begin_transaction(f.sesid, 0), SUCCESS);
        let mut inner = TableId::NIL;
        assert_eq!(
            f.engine.open_table(f.sesid, f.dbid, "items", 0, &mut inner),
            SUCCESS
        );
        assert_eq!(insert(&f, f.sesid, inner, 5), SUCCESS);
        assert_eq!(f.engine.rollback(f.sesid, 0), SUCCESS);

        assert_eq!(count(&f, f.sesid, f.tableid), 0);
        assert_eq!(
            f.engine.move_cursor(f.sesid, inner, MOVE_FIRST, 0),
            ERR_INVALID_TABLE_ID
        );
        assert_eq!(f.engine.rollback(f.sesid, 0), ERR_NOT_IN_TRANSACTION);
    }

    #[test]
    fn test_unique_primary_rejects_duplicates() {
        let f = fixture();
        assert_eq!(insert(&f, f.sesid, f.tableid, 7), SUCCESS);
        assert_eq!(insert(&f, f.sesid, f.tableid, 7), ERR_KEY_DUPLICATE);
        assert_eq!(
            f.engine.update(f.sesid, f.tableid, &mut Vec::new()),
            ERR_UPDATE_NOT_PREPARED
        );
    }

    #[test]
    fn test_transaction_depth_is_bounded() {
        let f = fixture();
        for _ in 0..3 {
            assert_eq!(f.engine.begin_transaction(f.sesid, 0), SUCCESS);
        }
        assert_eq!(f.engine.begin_transaction(f.sesid, 0), ERR_TRANS_TOO_DEEP);
        assert_eq!(
            f.engine.rollback(f.sesid, RollbackGrbit::ROLLBACK_ALL.bits()),
            SUCCESS
        );
        assert_eq!(f.engine.commit_transaction(f.sesid, 0), ERR_NOT_IN_TRANSACTION);
    }

    #[test]
    fn test_lazy_commits_until_flush() {
        let f = fixture();
        for id in 0..2 {
            assert_eq!(f.engine.begin_transaction(f.sesid, 0), SUCCESS);
            assert_eq!(insert(&f, f.sesid, f.tableid, id), SUCCESS);
            assert_eq!(
                f.engine
                    .commit_transaction(f.sesid, CommitGrbit::LAZY_FLUSH.bits()),
                SUCCESS
            );
        }
        assert_eq!(f.engine.unflushed_commits(), 2);
        assert_eq!(f.engine.flush_transactions(f.sesid, 0), SUCCESS);
        assert_eq!(f.engine.unflushed_commits(), 0);
    }

    #[test]
    fn test_database_handles_are_checked() {
        let f = fixture();
        assert_eq!(f.engine.close_database(f.sesid, f.dbid), ERR_DATABASE_IN_USE);
        assert_eq!(f.engine.close_table(f.sesid, f.tableid), SUCCESS);
        assert_eq!(f.engine.close_database(f.sesid, f.dbid), SUCCESS);
        assert_eq!(
            f.engine.close_database(f.sesid, f.dbid),
            ERR_INVALID_DATABASE_ID
        );
        let mut dbid = DbId::NIL;
        assert_eq!(
            f.engine.create_database(f.sesid, "test.db", 0, 0, &mut dbid),
            ERR_DATABASE_DUPLICATE
        );
        assert!(f.engine.database_exists("test.db"));
    }
}

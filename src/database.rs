use std::cell::{Cell, RefCell};

use log::{debug, warn};

use crate::constants::OpenTableGrbit;
use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::session::Session;
use crate::types::{DatabaseInfo, DbId, TableCreate};

/// An open database, bound to the session that opened it
#[derive(Debug)]
pub struct Database<'s> {
    /// Session the handle belongs to
    session: &'s Session<'s>,
    /// Native database handle
    dbid: DbId,
    /// Database file path
    path: String,
    /// Opened read-only
    read_only: bool,
    /// Table names, fetched on first use
    table_names: RefCell<Option<Vec<String>>>,
    /// Handle has been closed
    closed: Cell<bool>,
}

impl<'s> Database<'s> {
    pub(crate) fn new(session: &'s Session<'s>, dbid: DbId, path: &str, read_only: bool) -> Self {
        Database {
            session,
            dbid,
            path: path.to_owned(),
            read_only,
            table_names: RefCell::new(None),
            closed: Cell::new(false),
        }
    }

    pub fn id(&self) -> DbId {
        self.dbid
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn session(&self) -> &'s Session<'s> {
        self.session
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.get() {
            Err(Error::InvalidHandle)
        } else {
            Ok(())
        }
    }

    /// Create an empty table and open a cursor on it
    pub fn create_table(&self, name: &str) -> Result<Cursor<'_>> {
        self.create_table_column_index(&TableCreate::new(name))
    }

    /// Create a table together with its columns and indexes in one call
    pub fn create_table_column_index(&self, create: &TableCreate) -> Result<Cursor<'_>> {
        self.check_open()?;
        let tableid = self.session.api().create_table(self.dbid, create)?;
        debug!(
            "created table {} with {} column(s) and {} index(es)",
            create.name,
            create.columns.len(),
            create.indexes.len()
        );
        Ok(Cursor::new(self, tableid, &create.name))
    }

    pub fn open_table(&self, name: &str, grbit: OpenTableGrbit) -> Result<Cursor<'_>> {
        self.check_open()?;
        let tableid = self.session.api().open_table(self.dbid, name, grbit)?;
        Ok(Cursor::new(self, tableid, name))
    }

    /// Delete a table; fails with `TableInUse` while any cursor is open on it
    pub fn delete_table(&self, name: &str) -> Result<()> {
        self.check_open()?;
        self.session.api().delete_table(self.dbid, name)
    }

    /// Table names, sorted case-insensitively. The list is cached on first
    /// use; `refresh_table_names` fetches it again.
    pub fn table_names(&self) -> Result<Vec<String>> {
        self.check_open()?;
        if let Some(names) = self.table_names.borrow().as_ref() {
            return Ok(names.clone());
        }
        self.refresh_table_names()
    }

    pub fn refresh_table_names(&self) -> Result<Vec<String>> {
        self.check_open()?;
        let names = self.session.api().get_table_names(self.dbid)?;
        *self.table_names.borrow_mut() = Some(names.clone());
        Ok(names)
    }

    pub fn info(&self) -> Result<DatabaseInfo> {
        self.check_open()?;
        self.session.api().get_database_info(self.dbid)
    }

    /// Close the handle; fails with `DatabaseInUse` while cursors are open
    pub fn close(self) -> Result<()> {
        self.close_handle()
    }

    fn close_handle(&self) -> Result<()> {
        if self.closed.get() || self.session.id().is_nil() {
            return Ok(());
        }
        self.session.api().close_database(self.dbid)?;
        self.closed.set(true);
        Ok(())
    }
}

impl Drop for Database<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.close_handle() {
            warn!("failed to close database {}: {}", self.path, e);
        }
    }
}

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

use log::{debug, warn};

use crate::adapter::SessionApi;
use crate::constants::{AttachGrbit, CommitGrbit, RollbackGrbit, TransactionGrbit};
use crate::database::Database;
use crate::env::Instance;
use crate::error::Result;
use crate::transaction::Transaction;
use crate::types::{FlushKind, SessionId, TableId, Warning};

/// Bookkeeping for one open cursor, mirroring the engine's rules for
/// cursors and updates across commit and rollback
#[derive(Debug, Clone, Copy)]
struct OpenCursor {
    /// Depth the cursor was opened at
    level: u32,
    /// Depth the pending update was prepared at
    update: Option<u32>,
}

/// A logical connection to an instance.
///
/// A session is `Send` but not `Sync`: it may move between threads, but
/// while a transaction is open only the thread that began it (or the thread
/// holding an explicit context) may use it.
pub struct Session<'i> {
    /// Owning instance
    instance: &'i Instance,
    /// Engine adapter bound to this session
    api: SessionApi,
    /// Open cursors of this session
    cursors: RefCell<HashMap<TableId, OpenCursor>>,
}

impl<'i> Session<'i> {
    pub(crate) fn new(instance: &'i Instance, api: SessionApi) -> Self {
        Session {
            instance,
            api,
            cursors: RefCell::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> SessionId {
        self.api.sesid()
    }

    pub fn instance(&self) -> &'i Instance {
        self.instance
    }

    pub(crate) fn api(&self) -> &SessionApi {
        &self.api
    }

    /// Current transaction nesting depth, 0 outside any transaction
    pub fn transaction_depth(&self) -> u32 {
        self.api.depth()
    }

    /// Enter a new transaction level; returns the new depth
    pub fn begin(&self, grbit: TransactionGrbit) -> Result<u32> {
        let depth = self.api.begin_transaction(grbit)?;
        debug!("session {} began transaction level {}", self.id(), depth);
        Ok(depth)
    }

    /// Commit the innermost level; returns the remaining depth. Only the
    /// outermost commit makes changes durable.
    pub fn commit(&self, grbit: CommitGrbit) -> Result<u32> {
        let depth = self.api.commit_transaction(grbit)?;
        for cursor in self.cursors.borrow_mut().values_mut() {
            cursor.level = cursor.level.min(depth);
            cursor.update = cursor.update.map(|level| level.min(depth));
        }
        debug!("session {} committed to level {}", self.id(), depth);
        Ok(depth)
    }

    /// Roll back the innermost level, or every level with `ROLLBACK_ALL`.
    /// Cursors opened inside the rolled back levels are closed.
    pub fn rollback(&self, grbit: RollbackGrbit) -> Result<u32> {
        let depth = self.api.rollback(grbit)?;
        let mut cursors = self.cursors.borrow_mut();
        let before = cursors.len();
        cursors.retain(|_, cursor| cursor.level <= depth);
        for cursor in cursors.values_mut() {
            if cursor.update.map_or(false, |level| level > depth) {
                cursor.update = None;
            }
        }
        debug!(
            "session {} rolled back to level {}, {} cursor(s) closed",
            self.id(),
            depth,
            before - cursors.len()
        );
        Ok(depth)
    }

    /// Begin a transaction that rolls back unless committed
    pub fn begin_transaction(&self) -> Result<Transaction<'_>> {
        self.begin_transaction_with(TransactionGrbit::empty())
    }

    pub fn begin_transaction_with(&self, grbit: TransactionGrbit) -> Result<Transaction<'_>> {
        let depth = self.begin(grbit)?;
        Ok(Transaction::new(self, depth))
    }

    /// Allow this thread to use the session regardless of which thread
    /// began its transaction. Must be paired with `reset_context`.
    pub fn set_context(&self) -> Result<()> {
        self.api.set_context()
    }

    pub fn reset_context(&self) -> Result<()> {
        self.api.reset_context()
    }

    pub fn has_context(&self) -> bool {
        self.api.has_context()
    }

    /// Make lazily committed transactions durable
    pub fn flush_transactions(&self, kind: FlushKind) -> Result<()> {
        let grbit = match kind {
            FlushKind::AllSessions => CommitGrbit::WAIT_ALL_LEVEL0_COMMIT,
            FlushKind::Session => CommitGrbit::WAIT_LAST_LEVEL0_COMMIT,
        };
        self.api.flush_transactions(grbit)
    }

    /// New session on the same instance, outside any transaction
    pub fn duplicate(&self) -> Result<Session<'i>> {
        let sesid = self.api.dup_session()?;
        Ok(Session::new(
            self.instance,
            SessionApi::new(self.api.engine().clone(), sesid),
        ))
    }

    /// Create a database file, attach it and open it. `max_pages` of 0
    /// leaves the size unbounded.
    pub fn create_database(&self, path: &str, max_pages: u32) -> Result<Database<'_>> {
        let dbid = self
            .api
            .create_database(path, max_pages, AttachGrbit::empty())?;
        Ok(Database::new(self, dbid, path, false))
    }

    /// Attach an existing database file to the instance. Attaching a file
    /// that is already attached reports `Warning::DatabaseAttached`.
    pub fn attach_database(
        &self,
        path: &str,
        max_pages: u32,
        grbit: AttachGrbit,
    ) -> Result<Option<Warning>> {
        self.api.attach_database(path, max_pages, grbit)
    }

    pub fn detach_database(&self, path: &str) -> Result<()> {
        self.api.detach_database(path)
    }

    pub fn open_database(&self, path: &str, grbit: AttachGrbit) -> Result<Database<'_>> {
        let dbid = self.api.open_database(path, grbit)?;
        Ok(Database::new(
            self,
            dbid,
            path,
            grbit.contains(AttachGrbit::READ_ONLY),
        ))
    }

    pub(crate) fn register_cursor(&self, tableid: TableId) {
        let level = self.transaction_depth();
        self.cursors
            .borrow_mut()
            .insert(tableid, OpenCursor { level, update: None });
    }

    pub(crate) fn unregister_cursor(&self, tableid: TableId) {
        self.cursors.borrow_mut().remove(&tableid);
    }

    pub(crate) fn is_cursor_open(&self, tableid: TableId) -> bool {
        self.cursors.borrow().contains_key(&tableid)
    }

    pub(crate) fn set_update_pending(&self, tableid: TableId, pending: bool) {
        let depth = self.transaction_depth();
        if let Some(cursor) = self.cursors.borrow_mut().get_mut(&tableid) {
            cursor.update = pending.then_some(depth);
        }
    }

    pub(crate) fn is_update_pending(&self, tableid: TableId) -> bool {
        self.cursors
            .borrow()
            .get(&tableid)
            .map_or(false, |c| c.update.is_some())
    }

    /// End the session, rolling back any open transaction
    pub fn close(self) -> Result<()> {
        self.end()
    }

    fn end(&self) -> Result<()> {
        if self.id().is_nil() {
            return Ok(());
        }
        self.api.end_session()?;
        self.cursors.borrow_mut().clear();
        Ok(())
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.end() {
            warn!("failed to end session {}: {}", self.id(), e);
        }
    }
}

impl fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("depth", &self.transaction_depth())
            .field("cursors", &self.cursors.borrow().len())
            .finish()
    }
}

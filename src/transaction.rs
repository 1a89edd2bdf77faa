use log::warn;

use crate::constants::{CommitGrbit, RollbackGrbit};
use crate::error::{Error, Result};
use crate::session::Session;

/// One transaction level of a session.
///
/// Dropping the guard without committing rolls the level back, closing any
/// cursors opened inside it. Rolling back a level also rolls back every
/// deeper level still open; committing requires this level to be the
/// innermost one.
#[derive(Debug)]
#[must_use = "a transaction rolls back when dropped"]
pub struct Transaction<'s> {
    /// Session the level belongs to
    session: &'s Session<'s>,
    /// Depth of this level
    depth: u32,
    /// Committed or rolled back explicitly
    finished: bool,
}

impl<'s> Transaction<'s> {
    pub(crate) fn new(session: &'s Session<'s>, depth: u32) -> Self {
        Transaction {
            session,
            depth,
            finished: false,
        }
    }

    /// Nesting depth of this level, 1 for the outermost
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn session(&self) -> &'s Session<'s> {
        self.session
    }

    /// Commit this level. On failure the level stays open and is rolled
    /// back when the guard drops.
    pub fn commit(mut self, grbit: CommitGrbit) -> Result<()> {
        let innermost = self.session.transaction_depth();
        if innermost != self.depth {
            return Err(Error::TransactionNotInnermost {
                depth: self.depth,
                innermost,
            });
        }
        self.session.commit(grbit)?;
        self.finished = true;
        Ok(())
    }

    /// Commit without waiting for durability; a later
    /// `Session::flush_transactions` makes the change durable
    pub fn commit_lazy(self) -> Result<()> {
        self.commit(CommitGrbit::LAZY_FLUSH)
    }

    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.unwind()
    }

    /// Roll back until this level is gone
    fn unwind(&self) -> Result<()> {
        while self.session.transaction_depth() >= self.depth {
            self.session.rollback(RollbackGrbit::empty())?;
        }
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.unwind() {
            warn!(
                "failed to roll back transaction level {} of session {}: {}",
                self.depth,
                self.session.id(),
                e
            );
        }
    }
}

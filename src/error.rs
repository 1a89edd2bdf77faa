use std::collections::HashMap;
use std::result;

use once_cell::sync::Lazy;
use thiserror::Error;

use crate::constants::status::*;

/// Custom result type for ISAM operations
pub type Result<T> = result::Result<T, Error>;

/// Broad classes of failure. Callers decide retry policy from these; the
/// library never retries on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An expected absence (no current record, no match) raised at a call
    /// site that does not expect it. `try_*` variants report these as `false`.
    Absence,
    /// The caller broke an API precondition.
    ClientUsage,
    /// Another session holds an incompatible lock or newer version.
    Concurrency,
    /// The engine reported corruption, exhaustion or a version mismatch.
    EngineFatal,
}

/// Errors surfaced by the ISAM client layer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Cursor is not positioned on a record
    #[error("no current record")]
    NoCurrentRecord,
    /// No index entry matches the search key
    #[error("no matching record found")]
    RecordNotFound,
    /// The record behind a bookmark was deleted
    #[error("record has been deleted")]
    RecordDeleted,

    /// Raw bytes do not have the size the column type requires
    #[error("invalid column size: expected {expected} bytes, got {actual}")]
    InvalidColumnSize { expected: usize, actual: usize },
    /// Buffer size rejected by the engine
    #[error("buffer size does not match the column type")]
    InvalidBufferSize,
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
    #[error("invalid option bits")]
    InvalidGrbit,
    /// Accumulated search key exceeds the index maximum
    #[error("key of {actual} bytes exceeds the index maximum of {max} bytes")]
    KeyTooLong { actual: usize, max: usize },
    #[error("no search key has been made")]
    KeyNotMade,
    /// Every segment of the key has been supplied already
    #[error("search key is already complete")]
    KeyIsMade,
    #[error("an update is already pending on this cursor")]
    UpdateAlreadyPending,
    #[error("no update is prepared on this cursor")]
    UpdateNotPrepared,
    #[error("index not found")]
    IndexNotFound,
    #[error("cursor has no current index with key columns")]
    NoCurrentIndex,
    #[error("column not found")]
    ColumnNotFound,
    #[error("invalid column id")]
    BadColumnId,
    #[error("table or object not found")]
    ObjectNotFound,
    #[error("database not found")]
    DatabaseNotFound,
    #[error("database is already open or attached")]
    DatabaseDuplicate,
    #[error("database is in use")]
    DatabaseInUse,
    #[error("invalid bookmark")]
    InvalidBookmark,
    #[error("table already exists")]
    TableDuplicate,
    #[error("column already exists")]
    ColumnDuplicate,
    /// Column is part of an index
    #[error("column is in use by an index")]
    ColumnInUse,
    #[error("index already exists")]
    IndexDuplicate,
    #[error("table already has a primary index")]
    IndexHasPrimary,
    #[error("invalid index definition")]
    InvalidIndexDefinition,
    /// A NOT NULL column has no value
    #[error("null value not allowed for column")]
    NullInvalid,
    /// A key column of an index that disallows nulls has no value
    #[error("null key segment not allowed by index")]
    NullKeyDisallowed,
    #[error("value already present in multi-valued column")]
    MultiValuedDuplicate,
    /// Insert or replace would create a duplicate key in a unique index
    #[error("duplicate key")]
    KeyDuplicate,
    #[error("primary key may not change on replace")]
    RecordPrimaryChanged,
    #[error("not in a transaction")]
    NotInTransaction,
    #[error("transaction nesting is too deep")]
    TransactionTooDeep,
    #[error("update attempted in a read-only transaction")]
    TransactionReadOnly,
    /// Write through a read-only table or database handle
    #[error("permission denied")]
    PermissionDenied,
    /// A session, database or cursor handle is closed or unknown
    #[error("invalid or closed handle")]
    InvalidHandle,
    /// A transaction guard was finished while a deeper level was still open
    #[error("transaction level {depth} is not the innermost level {innermost}")]
    TransactionNotInnermost { depth: u32, innermost: u32 },
    /// Session used from a thread other than the one owning its transaction
    #[error("session is in use by another thread")]
    SessionSharingViolation,
    #[error("session context is already set")]
    SessionContextAlreadySet,
    #[error("session context was not set by this thread")]
    SessionContextNotSetByThisThread,
    #[error("too many active sessions")]
    TooManySessions,
    #[error("out of cursors")]
    OutOfCursors,
    #[error("database size limit reached")]
    OutOfDatabaseSpace,
    /// An autoincrement column has handed out every value its type holds
    #[error("autoincrement values exhausted")]
    OutOfAutoincrementValues,

    /// Another session changed or locked the record
    #[error("write conflict")]
    WriteConflict,
    #[error("table is exclusively locked")]
    TableLocked,
    #[error("table is in use")]
    TableInUse,

    /// Terminal engine failure carrying the native status code
    #[error("engine failure {name} ({code})")]
    Engine { code: i32, name: &'static str },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NoCurrentRecord | Error::RecordNotFound | Error::RecordDeleted => {
                ErrorKind::Absence
            }
            Error::WriteConflict | Error::TableLocked | Error::TableInUse => ErrorKind::Concurrency,
            Error::Engine { .. } => ErrorKind::EngineFatal,
            _ => ErrorKind::ClientUsage,
        }
    }

    /// Native status code, when the error has one
    pub fn code(&self) -> Option<i32> {
        let code = match self {
            Error::NoCurrentRecord => ERR_NO_CURRENT_RECORD,
            Error::RecordNotFound => ERR_RECORD_NOT_FOUND,
            Error::RecordDeleted => ERR_RECORD_DELETED,
            Error::InvalidBufferSize => ERR_INVALID_BUFFER_SIZE,
            Error::InvalidParameter(_) => ERR_INVALID_PARAMETER,
            Error::InvalidGrbit => ERR_INVALID_GRBIT,
            Error::KeyTooLong { .. } => ERR_KEY_TRUNCATED,
            Error::KeyNotMade => ERR_KEY_NOT_MADE,
            Error::KeyIsMade => ERR_KEY_IS_MADE,
            Error::UpdateAlreadyPending => ERR_ALREADY_PREPARED,
            Error::UpdateNotPrepared => ERR_UPDATE_NOT_PREPARED,
            Error::IndexNotFound => ERR_INDEX_NOT_FOUND,
            Error::NoCurrentIndex => ERR_NO_CURRENT_INDEX,
            Error::ColumnNotFound => ERR_COLUMN_NOT_FOUND,
            Error::BadColumnId => ERR_BAD_COLUMN_ID,
            Error::ObjectNotFound => ERR_OBJECT_NOT_FOUND,
            Error::DatabaseNotFound => ERR_DATABASE_NOT_FOUND,
            Error::DatabaseDuplicate => ERR_DATABASE_DUPLICATE,
            Error::DatabaseInUse => ERR_DATABASE_IN_USE,
            Error::InvalidBookmark => ERR_INVALID_BOOKMARK,
            Error::TableDuplicate => ERR_TABLE_DUPLICATE,
            Error::ColumnDuplicate => ERR_COLUMN_DUPLICATE,
            Error::ColumnInUse => ERR_COLUMN_IN_USE,
            Error::IndexDuplicate => ERR_INDEX_DUPLICATE,
            Error::IndexHasPrimary => ERR_INDEX_HAS_PRIMARY,
            Error::InvalidIndexDefinition => ERR_INDEX_INVALID_DEF,
            Error::NullInvalid => ERR_NULL_INVALID,
            Error::NullKeyDisallowed => ERR_NULL_KEY_DISALLOWED,
            Error::MultiValuedDuplicate => ERR_MULTI_VALUED_DUPLICATE,
            Error::TransactionReadOnly => ERR_TRANS_READ_ONLY,
            Error::PermissionDenied => ERR_PERMISSION_DENIED,
            Error::KeyDuplicate => ERR_KEY_DUPLICATE,
            Error::RecordPrimaryChanged => ERR_RECORD_PRIMARY_CHANGED,
            Error::NotInTransaction => ERR_NOT_IN_TRANSACTION,
            Error::TransactionTooDeep => ERR_TRANS_TOO_DEEP,
            Error::SessionSharingViolation => ERR_SESSION_IN_USE,
            Error::SessionContextAlreadySet => ERR_SESSION_CONTEXT_ALREADY_SET,
            Error::SessionContextNotSetByThisThread => ERR_SESSION_CONTEXT_NOT_SET_BY_THIS_THREAD,
            Error::TooManySessions => ERR_TOO_MANY_ACTIVE_USERS,
            Error::OutOfCursors => ERR_OUT_OF_CURSORS,
            Error::OutOfDatabaseSpace => ERR_OUT_OF_DATABASE_SPACE,
            Error::OutOfAutoincrementValues => ERR_OUT_OF_AUTOINCREMENT_VALUES,
            Error::WriteConflict => ERR_WRITE_CONFLICT,
            Error::TableLocked => ERR_TABLE_LOCKED,
            Error::TableInUse => ERR_TABLE_IN_USE,
            Error::Engine { code, .. } => *code,
            Error::InvalidHandle => return None,
            Error::InvalidColumnSize { .. } => return None,
            Error::TransactionNotInnermost { .. } => return None,
        };
        Some(code)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::Absence
    }
}

impl From<i32> for Error {
    fn from(code: i32) -> Error {
        match code {
            ERR_NO_CURRENT_RECORD => Error::NoCurrentRecord,
            ERR_RECORD_NOT_FOUND => Error::RecordNotFound,
            ERR_RECORD_DELETED => Error::RecordDeleted,
            ERR_INVALID_BUFFER_SIZE => Error::InvalidBufferSize,
            ERR_INVALID_PARAMETER => Error::InvalidParameter("rejected by engine"),
            ERR_INVALID_GRBIT => Error::InvalidGrbit,
            ERR_KEY_TRUNCATED => Error::KeyTooLong { actual: 0, max: 0 },
            ERR_KEY_NOT_MADE => Error::KeyNotMade,
            ERR_KEY_IS_MADE => Error::KeyIsMade,
            ERR_ALREADY_PREPARED => Error::UpdateAlreadyPending,
            ERR_UPDATE_NOT_PREPARED => Error::UpdateNotPrepared,
            ERR_INDEX_NOT_FOUND => Error::IndexNotFound,
            ERR_NO_CURRENT_INDEX => Error::NoCurrentIndex,
            ERR_COLUMN_NOT_FOUND => Error::ColumnNotFound,
            ERR_BAD_COLUMN_ID => Error::BadColumnId,
            ERR_OBJECT_NOT_FOUND => Error::ObjectNotFound,
            ERR_DATABASE_NOT_FOUND => Error::DatabaseNotFound,
            ERR_DATABASE_DUPLICATE => Error::DatabaseDuplicate,
            ERR_DATABASE_IN_USE => Error::DatabaseInUse,
            ERR_INVALID_BOOKMARK => Error::InvalidBookmark,
            ERR_TABLE_DUPLICATE => Error::TableDuplicate,
            ERR_COLUMN_DUPLICATE => Error::ColumnDuplicate,
            ERR_COLUMN_IN_USE => Error::ColumnInUse,
            ERR_INDEX_DUPLICATE => Error::IndexDuplicate,
            ERR_INDEX_HAS_PRIMARY => Error::IndexHasPrimary,
            ERR_INDEX_INVALID_DEF => Error::InvalidIndexDefinition,
            ERR_NULL_INVALID => Error::NullInvalid,
            ERR_NULL_KEY_DISALLOWED => Error::NullKeyDisallowed,
            ERR_MULTI_VALUED_DUPLICATE => Error::MultiValuedDuplicate,
            ERR_TRANS_READ_ONLY => Error::TransactionReadOnly,
            ERR_PERMISSION_DENIED => Error::PermissionDenied,
            ERR_KEY_DUPLICATE => Error::KeyDuplicate,
            ERR_RECORD_PRIMARY_CHANGED => Error::RecordPrimaryChanged,
            ERR_NOT_IN_TRANSACTION => Error::NotInTransaction,
            ERR_TRANS_TOO_DEEP => Error::TransactionTooDeep,
            ERR_INVALID_SESID | ERR_INVALID_TABLE_ID | ERR_INVALID_DATABASE_ID
            | ERR_INVALID_INSTANCE => Error::InvalidHandle,
            ERR_SESSION_IN_USE => Error::SessionSharingViolation,
            ERR_SESSION_CONTEXT_ALREADY_SET => Error::SessionContextAlreadySet,
            ERR_SESSION_CONTEXT_NOT_SET_BY_THIS_THREAD => Error::SessionContextNotSetByThisThread,
            ERR_TOO_MANY_ACTIVE_USERS => Error::TooManySessions,
            ERR_OUT_OF_CURSORS => Error::OutOfCursors,
            ERR_OUT_OF_DATABASE_SPACE => Error::OutOfDatabaseSpace,
            ERR_OUT_OF_AUTOINCREMENT_VALUES => Error::OutOfAutoincrementValues,
            ERR_WRITE_CONFLICT => Error::WriteConflict,
            ERR_TABLE_LOCKED => Error::TableLocked,
            ERR_TABLE_IN_USE => Error::TableInUse,
            code => Error::Engine {
                code,
                name: status_name(code),
            },
        }
    }
}

static STATUS_NAMES: Lazy<HashMap<i32, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (SUCCESS, "Success"),
        (WRN_COLUMN_NULL, "ColumnNull"),
        (WRN_BUFFER_TRUNCATED, "BufferTruncated"),
        (WRN_DATABASE_ATTACHED, "DatabaseAttached"),
        (WRN_SEEK_NOT_EQUAL, "SeekNotEqual"),
        (ERR_INTERNAL_ERROR, "InternalError"),
        (ERR_INVALID_BOOKMARK, "InvalidBookmark"),
        (ERR_KEY_TRUNCATED, "KeyTruncated"),
        (ERR_INVALID_GRBIT, "InvalidGrbit"),
        (ERR_TERM_IN_PROGRESS, "TermInProgress"),
        (ERR_INVALID_PARAMETER, "InvalidParameter"),
        (ERR_INVALID_DATABASE_ID, "InvalidDatabaseId"),
        (ERR_OUT_OF_MEMORY, "OutOfMemory"),
        (ERR_OUT_OF_CURSORS, "OutOfCursors"),
        (ERR_RECORD_DELETED, "RecordDeleted"),
        (ERR_COLUMN_IN_USE, "ColumnInUse"),
        (ERR_INVALID_BUFFER_SIZE, "InvalidBufferSize"),
        (ERR_NULL_KEY_DISALLOWED, "NullKeyDisallowed"),
        (ERR_NOT_IN_TRANSACTION, "NotInTransaction"),
        (ERR_TOO_MANY_ACTIVE_USERS, "TooManyActiveUsers"),
        (ERR_NO_CURRENT_INDEX, "NoCurrentIndex"),
        (ERR_VERSION_STORE_OUT_OF_MEMORY, "VersionStoreOutOfMemory"),
        (ERR_OUT_OF_AUTOINCREMENT_VALUES, "OutOfAutoincrementValues"),
        (ERR_INSTANCE_UNAVAILABLE, "InstanceUnavailable"),
        (ERR_WRITE_CONFLICT, "WriteConflict"),
        (ERR_TRANS_TOO_DEEP, "TransTooDeep"),
        (ERR_INVALID_SESID, "InvalidSesid"),
        (ERR_OUT_OF_DATABASE_SPACE, "OutOfDatabaseSpace"),
        (ERR_INVALID_INSTANCE, "InvalidInstance"),
        (ERR_SESSION_CONTEXT_ALREADY_SET, "SessionContextAlreadySet"),
        (ERR_SESSION_CONTEXT_NOT_SET_BY_THIS_THREAD, "SessionContextNotSetByThisThread"),
        (ERR_SESSION_IN_USE, "SessionInUse"),
        (ERR_DATABASE_DUPLICATE, "DatabaseDuplicate"),
        (ERR_DATABASE_IN_USE, "DatabaseInUse"),
        (ERR_DATABASE_NOT_FOUND, "DatabaseNotFound"),
        (ERR_DATABASE_CORRUPTED, "DatabaseCorrupted"),
        (ERR_DATABASE_INVALID_VERSION, "DatabaseInvalidVersion"),
        (ERR_TABLE_LOCKED, "TableLocked"),
        (ERR_TABLE_DUPLICATE, "TableDuplicate"),
        (ERR_TABLE_IN_USE, "TableInUse"),
        (ERR_OBJECT_NOT_FOUND, "ObjectNotFound"),
        (ERR_INVALID_TABLE_ID, "InvalidTableId"),
        (ERR_INDEX_HAS_PRIMARY, "IndexHasPrimary"),
        (ERR_INDEX_DUPLICATE, "IndexDuplicate"),
        (ERR_INDEX_NOT_FOUND, "IndexNotFound"),
        (ERR_INDEX_INVALID_DEF, "IndexInvalidDef"),
        (ERR_TRANS_READ_ONLY, "TransReadOnly"),
        (ERR_NULL_INVALID, "NullInvalid"),
        (ERR_COLUMN_NOT_FOUND, "ColumnNotFound"),
        (ERR_COLUMN_DUPLICATE, "ColumnDuplicate"),
        (ERR_KEY_IS_MADE, "KeyIsMade"),
        (ERR_BAD_COLUMN_ID, "BadColumnId"),
        (ERR_MULTI_VALUED_DUPLICATE, "MultiValuedDuplicate"),
        (ERR_RECORD_NOT_FOUND, "RecordNotFound"),
        (ERR_NO_CURRENT_RECORD, "NoCurrentRecord"),
        (ERR_RECORD_PRIMARY_CHANGED, "RecordPrimaryChanged"),
        (ERR_KEY_DUPLICATE, "KeyDuplicate"),
        (ERR_ALREADY_PREPARED, "AlreadyPrepared"),
        (ERR_KEY_NOT_MADE, "KeyNotMade"),
        (ERR_UPDATE_NOT_PREPARED, "UpdateNotPrepared"),
        (ERR_DISK_FULL, "DiskFull"),
        (ERR_PERMISSION_DENIED, "PermissionDenied"),
    ])
});

/// Symbolic name of a native status code, for diagnostics
pub fn status_name(code: i32) -> &'static str {
    STATUS_NAMES.get(&code).copied().unwrap_or("Unknown")
}

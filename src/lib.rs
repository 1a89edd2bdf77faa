// src/lib.rs
mod adapter;
mod config;
mod constants;
mod cursor;
mod database;
mod env;
mod error;
mod key;
mod memory;
mod meta;
mod session;
mod transaction;
mod types;
mod value;

pub use adapter::Engine;
pub use config::InstanceConfig;
pub use constants::{
    status, AttachGrbit, ColumnDefGrbit, CommitGrbit, GetLockGrbit, IndexCreateGrbit,
    MakeKeyGrbit, MoveGrbit, OpenTableGrbit, PrepareUpdate, RetrieveColumnGrbit, RollbackGrbit,
    SeekGrbit, SetColumnGrbit, SetCurrentIndexGrbit, SetIndexRangeGrbit, TransactionGrbit,
    CP_ASCII, CP_UNICODE, MOVE_FIRST, MOVE_LAST, MOVE_NEXT, MOVE_PREVIOUS,
};
pub use cursor::{Cursor, Update};
pub use database::Database;
pub use env::Instance;
pub use error::{status_name, Error, ErrorKind, Result};
pub use key::{normalize_segment, KeyBuilder, SegmentFormat};
pub use memory::MemoryEngine;
pub use meta::{
    parse_key_description, ColumnInfo, IndexInfo, IndexSegment, KeyColumn, TableMetadata,
};
pub use session::Session;
pub use transaction::Transaction;
pub use types::{
    ColumnCreate, ColumnDef, ColumnId, ColumnOrder, ColumnType, DatabaseInfo, DbId,
    EngineParams, FlushKind, IndexCreate, InstanceId, SessionId, SetColumn, TableCreate,
    TableId, TextEncoding, Warning,
};
pub use value::{
    decode_text, encode_text, from_oa_date, to_oa_date, ColumnData, ColumnValue, Encoded,
    TypedValue, ValueKind,
};

use bitflags::bitflags;

// Options for building search keys
bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MakeKeyGrbit: u32 {
        /// Start a new key, discarding any partially built one
        const NEW_KEY = 0x01;
        /// The input is a complete normalized key
        const NORMALIZED_KEY = 0x08;
        /// An empty input is a zero-length value rather than null
        const KEY_DATA_ZERO_LENGTH = 0x10;
        const FULL_COLUMN_START_LIMIT = 0x100;
        const FULL_COLUMN_END_LIMIT = 0x200;
        const PARTIAL_COLUMN_START_LIMIT = 0x400;
        const PARTIAL_COLUMN_END_LIMIT = 0x800;
    }
}

impl MakeKeyGrbit {
    pub(crate) const LIMITS: MakeKeyGrbit = MakeKeyGrbit::FULL_COLUMN_START_LIMIT
        .union(MakeKeyGrbit::FULL_COLUMN_END_LIMIT)
        .union(MakeKeyGrbit::PARTIAL_COLUMN_START_LIMIT)
        .union(MakeKeyGrbit::PARTIAL_COLUMN_END_LIMIT);
}

// Seek inequality modes
bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SeekGrbit: u32 {
        const SEEK_EQ = 0x01;
        const SEEK_LT = 0x02;
        const SEEK_LE = 0x04;
        const SEEK_GE = 0x08;
        const SEEK_GT = 0x10;
        /// With SEEK_EQ, restrict later moves to the matching entries
        const SET_INDEX_RANGE = 0x20;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SetIndexRangeGrbit: u32 {
        const INCLUSIVE = 0x01;
        const UPPER_LIMIT = 0x02;
        const INSTANT_DURATION = 0x04;
        const REMOVE = 0x08;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MoveGrbit: u32 {
        /// Move to the next entry with a different key
        const MOVE_KEY_NE = 0x01;
    }
}

/// Row counts with special meaning for `move`
pub const MOVE_FIRST: i32 = i32::MIN;
pub const MOVE_PREVIOUS: i32 = -1;
pub const MOVE_NEXT: i32 = 1;
pub const MOVE_LAST: i32 = i32::MAX;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RetrieveColumnGrbit: u32 {
        /// Read from the pending update's copy buffer
        const RETRIEVE_COPY = 0x01;
        /// Read from the current index entry when the index covers the column
        const RETRIEVE_FROM_INDEX = 0x02;
        const IGNORE_DEFAULT = 0x20;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SetColumnGrbit: u32 {
        const APPEND_LV = 0x01;
        /// Store an empty buffer as a zero-length value instead of null
        const ZERO_LENGTH = 0x20;
        const UNIQUE_MULTI_VALUES = 0x80;
    }
}

/// Modes for `prepare_update`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrepareUpdate {
    Insert,
    Replace,
    InsertCopy,
    Cancel,
}

impl PrepareUpdate {
    pub(crate) fn bits(self) -> u32 {
        match self {
            PrepareUpdate::Insert => 0,
            PrepareUpdate::Replace => 2,
            PrepareUpdate::InsertCopy => 5,
            PrepareUpdate::Cancel => 3,
        }
    }

    pub(crate) fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0 => Some(PrepareUpdate::Insert),
            2 => Some(PrepareUpdate::Replace),
            5 => Some(PrepareUpdate::InsertCopy),
            3 => Some(PrepareUpdate::Cancel),
            _ => None,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TransactionGrbit: u32 {
        const READ_ONLY = 0x01;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CommitGrbit: u32 {
        /// Commit without waiting for the log to reach disk
        const LAZY_FLUSH = 0x01;
        /// Flush all previously committed transactions of every session
        const WAIT_ALL_LEVEL0_COMMIT = 0x08;
        /// Flush only the calling session's committed transactions
        const WAIT_LAST_LEVEL0_COMMIT = 0x02;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RollbackGrbit: u32 {
        /// Roll back every level, not only the innermost
        const ROLLBACK_ALL = 0x01;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AttachGrbit: u32 {
        const READ_ONLY = 0x01;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OpenTableGrbit: u32 {
        const DENY_WRITE = 0x01;
        const DENY_READ = 0x02;
        const READ_ONLY = 0x04;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SetCurrentIndexGrbit: u32 {
        /// Keep the cursor on the same record instead of moving to the first entry
        const NO_MOVE = 0x02;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct GetLockGrbit: u32 {
        const READ_LOCK = 0x01;
        const WRITE_LOCK = 0x02;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ColumnDefGrbit: u32 {
        const NOT_NULL = 0x04;
        const VERSION = 0x08;
        const AUTOINCREMENT = 0x10;
        const MULTI_VALUED = 0x400;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct IndexCreateGrbit: u32 {
        const UNIQUE = 0x01;
        const PRIMARY = 0x02;
        const DISALLOW_NULL = 0x04;
        const IGNORE_NULL = 0x08;
        const IGNORE_ANY_NULL = 0x20;
        const SORT_NULLS_HIGH = 0x400;
    }
}

/// Native status codes returned by an engine. Zero is success, positive
/// values are warnings, negative values are errors.
pub mod status {
    pub const SUCCESS: i32 = 0;

    pub const WRN_COLUMN_NULL: i32 = 1004;
    pub const WRN_BUFFER_TRUNCATED: i32 = 1006;
    pub const WRN_DATABASE_ATTACHED: i32 = 1007;
    pub const WRN_SEEK_NOT_EQUAL: i32 = 1039;

    pub const ERR_INTERNAL_ERROR: i32 = -107;
    pub const ERR_INVALID_BOOKMARK: i32 = -328;
    pub const ERR_KEY_TRUNCATED: i32 = -346;
    pub const ERR_INVALID_GRBIT: i32 = -900;
    pub const ERR_TERM_IN_PROGRESS: i32 = -1000;
    pub const ERR_INVALID_PARAMETER: i32 = -1003;
    pub const ERR_INVALID_DATABASE_ID: i32 = -1010;
    pub const ERR_OUT_OF_MEMORY: i32 = -1011;
    pub const ERR_OUT_OF_CURSORS: i32 = -1013;
    pub const ERR_RECORD_DELETED: i32 = -1017;
    pub const ERR_COLUMN_IN_USE: i32 = -1046;
    pub const ERR_INVALID_BUFFER_SIZE: i32 = -1047;
    pub const ERR_NULL_KEY_DISALLOWED: i32 = -1053;
    pub const ERR_NOT_IN_TRANSACTION: i32 = -1054;
    pub const ERR_TOO_MANY_ACTIVE_USERS: i32 = -1059;
    pub const ERR_NO_CURRENT_INDEX: i32 = -1062;
    pub const ERR_VERSION_STORE_OUT_OF_MEMORY: i32 = -1069;
    pub const ERR_OUT_OF_AUTOINCREMENT_VALUES: i32 = -1076;
    pub const ERR_INSTANCE_UNAVAILABLE: i32 = -1090;
    pub const ERR_WRITE_CONFLICT: i32 = -1102;
    pub const ERR_TRANS_TOO_DEEP: i32 = -1103;
    pub const ERR_INVALID_SESID: i32 = -1104;
    pub const ERR_OUT_OF_DATABASE_SPACE: i32 = -1108;
    pub const ERR_INVALID_INSTANCE: i32 = -1115;
    pub const ERR_SESSION_CONTEXT_ALREADY_SET: i32 = -1121;
    pub const ERR_SESSION_CONTEXT_NOT_SET_BY_THIS_THREAD: i32 = -1122;
    pub const ERR_SESSION_IN_USE: i32 = -1123;
    pub const ERR_DATABASE_DUPLICATE: i32 = -1201;
    pub const ERR_DATABASE_IN_USE: i32 = -1202;
    pub const ERR_DATABASE_NOT_FOUND: i32 = -1203;
    pub const ERR_DATABASE_CORRUPTED: i32 = -1206;
    pub const ERR_DATABASE_INVALID_VERSION: i32 = -1209;
    pub const ERR_TABLE_LOCKED: i32 = -1302;
    pub const ERR_TABLE_DUPLICATE: i32 = -1303;
    pub const ERR_TABLE_IN_USE: i32 = -1304;
    pub const ERR_OBJECT_NOT_FOUND: i32 = -1305;
    pub const ERR_INVALID_TABLE_ID: i32 = -1310;
    pub const ERR_INDEX_HAS_PRIMARY: i32 = -1402;
    pub const ERR_INDEX_DUPLICATE: i32 = -1403;
    pub const ERR_INDEX_NOT_FOUND: i32 = -1404;
    pub const ERR_INDEX_INVALID_DEF: i32 = -1406;
    pub const ERR_TRANS_READ_ONLY: i32 = -1417;
    pub const ERR_NULL_INVALID: i32 = -1504;
    pub const ERR_COLUMN_NOT_FOUND: i32 = -1507;
    pub const ERR_COLUMN_DUPLICATE: i32 = -1508;
    pub const ERR_KEY_IS_MADE: i32 = -1516;
    pub const ERR_BAD_COLUMN_ID: i32 = -1517;
    pub const ERR_MULTI_VALUED_DUPLICATE: i32 = -1525;
    pub const ERR_RECORD_NOT_FOUND: i32 = -1601;
    pub const ERR_NO_CURRENT_RECORD: i32 = -1603;
    pub const ERR_RECORD_PRIMARY_CHANGED: i32 = -1604;
    pub const ERR_KEY_DUPLICATE: i32 = -1605;
    pub const ERR_ALREADY_PREPARED: i32 = -1607;
    pub const ERR_KEY_NOT_MADE: i32 = -1608;
    pub const ERR_UPDATE_NOT_PREPARED: i32 = -1609;
    pub const ERR_DISK_FULL: i32 = -1808;
    pub const ERR_PERMISSION_DENIED: i32 = -1809;
}

/// Code page of Unicode text columns
pub const CP_UNICODE: u16 = 1200;
/// Code page of ASCII text columns
pub const CP_ASCII: u16 = 1252;

/// Default maximum normalized key size of an index
pub const DEFAULT_MAX_KEY_SIZE: usize = 255;
/// Largest `key_most` an index may declare
pub const MAX_KEY_SIZE_LIMIT: usize = 2000;
/// Maximum number of key segments in an index
pub const MAX_KEY_SEGMENTS: usize = 16;
/// Default bound on nested transaction levels
pub const DEFAULT_MAX_TRANSACTION_DEPTH: u32 = 7;
pub const DEFAULT_MAX_SESSIONS: u32 = 64;
pub const DEFAULT_MAX_CURSORS: u32 = 1024;
/// Initial buffer used for variable-size column retrieval
pub const DEFAULT_RETRIEVE_BUFFER_SIZE: usize = 256;
/// Page size used to account database growth
pub const PAGE_SIZE: usize = 4096;

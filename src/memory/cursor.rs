use crate::constants::{status::*, OpenTableGrbit, PrepareUpdate, SeekGrbit};
use crate::types::{DbId, SessionId};

use super::table::{Entry, Row, Status};

/// Where a cursor sits in its current index
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Position {
    BeforeFirst,
    AfterLast,
    /// On an entry; the entry is kept even if its record goes away so that
    /// moves continue from the same place
    On(Entry),
    /// Between entries, after a missed equality seek on this key
    Between(Vec<u8>),
}

/// Single-sided limit on cursor movement
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IndexRange {
    pub(crate) limit: Vec<u8>,
    pub(crate) upper: bool,
    pub(crate) inclusive: bool,
}

impl IndexRange {
    pub(crate) fn contains(&self, key: &[u8]) -> bool {
        let matches = key.starts_with(&self.limit);
        match (self.upper, self.inclusive) {
            (true, true) => matches || key <= self.limit.as_slice(),
            (true, false) => !matches && key < self.limit.as_slice(),
            (false, true) => key >= self.limit.as_slice(),
            (false, false) => !matches && key > self.limit.as_slice(),
        }
    }
}

/// Record image under construction
#[derive(Debug, Clone)]
pub(crate) struct PreparedUpdate {
    pub(crate) mode: PrepareUpdate,
    /// Record being replaced
    pub(crate) rid: Option<u64>,
    /// Record version seen when the update was prepared
    pub(crate) version: u64,
    pub(crate) row: Row,
    /// Transaction level the update was prepared at
    pub(crate) level: usize,
}

/// Engine-side state of an open cursor
#[derive(Debug, Clone)]
pub(crate) struct CursorState {
    pub(crate) session: SessionId,
    pub(crate) dbid: DbId,
    /// Database file path
    pub(crate) path: String,
    /// Table key within the database file
    pub(crate) table: String,
    /// Current index, `None` for record order
    pub(crate) index: Option<String>,
    pub(crate) position: Position,
    pub(crate) range: Option<IndexRange>,
    pub(crate) update: Option<PreparedUpdate>,
    /// Transaction level the cursor was opened at
    pub(crate) level: usize,
    pub(crate) read_only: bool,
    /// Exclusive access requested at open
    pub(crate) deny: OpenTableGrbit,
}

impl CursorState {
    pub(crate) fn on_same_table(&self, other: &CursorState) -> bool {
        self.path == other.path && self.table == other.table
    }

    /// Current entry, if the cursor is on one
    pub(crate) fn current(&self) -> Status<&Entry> {
        match &self.position {
            Position::On(entry) => Ok(entry),
            _ => Err(ERR_NO_CURRENT_RECORD),
        }
    }
}

fn in_range(range: Option<&IndexRange>, entry: &Entry) -> bool {
    range.map_or(true, |r| r.contains(&entry.key))
}

/// Index of the entry after `position`; with `key_ne`, skip entries that
/// share the current key
pub(crate) fn next_entry(
    entries: &[Entry],
    position: &Position,
    range: Option<&IndexRange>,
    key_ne: bool,
) -> Option<usize> {
    let start = match position {
        Position::BeforeFirst => 0,
        Position::AfterLast => return None,
        Position::On(current) if key_ne => entries.partition_point(|e| e.key <= current.key),
        Position::On(current) => entries.partition_point(|e| e <= current),
        Position::Between(key) => entries.partition_point(|e| e.key.as_slice() <= key.as_slice()),
    };
    entries
        .get(start)
        .filter(|e| in_range(range, e))
        .map(|_| start)
}

/// Index of the entry before `position`
pub(crate) fn prev_entry(
    entries: &[Entry],
    position: &Position,
    range: Option<&IndexRange>,
    key_ne: bool,
) -> Option<usize> {
    let end = match position {
        Position::BeforeFirst => return None,
        Position::AfterLast => entries.len(),
        Position::On(current) if key_ne => entries.partition_point(|e| e.key < current.key),
        Position::On(current) => entries.partition_point(|e| e < current),
        Position::Between(key) => entries.partition_point(|e| e.key.as_slice() < key.as_slice()),
    };
    let index = end.checked_sub(1)?;
    entries
        .get(index)
        .filter(|e| in_range(range, e))
        .map(|_| index)
}

/// Result of a seek: where the cursor lands and the status to report
pub(crate) fn seek(entries: &[Entry], key: &[u8], grbit: SeekGrbit) -> (Position, i32) {
    let matches = |e: &Entry| e.key.starts_with(key);
    let found = |index: usize, exact: bool| {
        let code = if exact { SUCCESS } else { WRN_SEEK_NOT_EQUAL };
        (Position::On(entries[index].clone()), code)
    };

    if grbit.contains(SeekGrbit::SEEK_EQ) {
        match entries.iter().position(matches) {
            Some(index) => found(index, true),
            None => (Position::Between(key.to_vec()), ERR_RECORD_NOT_FOUND),
        }
    } else if grbit.contains(SeekGrbit::SEEK_GE) {
        let index = entries.partition_point(|e| e.key.as_slice() < key);
        match entries.get(index) {
            Some(e) => found(index, matches(e)),
            None => (Position::AfterLast, ERR_RECORD_NOT_FOUND),
        }
    } else if grbit.contains(SeekGrbit::SEEK_GT) {
        let index = entries.partition_point(|e| e.key.as_slice() <= key || matches(e));
        match entries.get(index) {
            Some(_) => found(index, true),
            None => (Position::AfterLast, ERR_RECORD_NOT_FOUND),
        }
    } else if grbit.contains(SeekGrbit::SEEK_LE) {
        let end = entries.partition_point(|e| e.key.as_slice() < key || matches(e));
        match end.checked_sub(1) {
            Some(index) => found(index, matches(&entries[index])),
            None => (Position::BeforeFirst, ERR_RECORD_NOT_FOUND),
        }
    } else {
        let end = entries.partition_point(|e| e.key.as_slice() < key && !matches(e));
        match end.checked_sub(1) {
            Some(index) => found(index, true),
            None => (Position::BeforeFirst, ERR_RECORD_NOT_FOUND),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(keys: &[&[u8]]) -> Vec<Entry> {
        keys.iter()
            .enumerate()
            .map(|(i, k)| Entry {
                key: k.to_vec(),
                rid: i as u64 + 1,
                itag: 1,
            })
            .collect()
    }

    fn on(entries: &[Entry], index: usize) -> Position {
        Position::On(entries[index].clone())
    }

    #[test]
    fn test_seek_modes() {
        let e = entries(&[b"b", b"d", b"d", b"f"]);
        assert_eq!(seek(&e, b"d", SeekGrbit::SEEK_EQ), (on(&e, 1), SUCCESS));
        assert_eq!(
            seek(&e, b"c", SeekGrbit::SEEK_EQ),
            (Position::Between(b"c".to_vec()), ERR_RECORD_NOT_FOUND)
        );
        assert_eq!(seek(&e, b"c", SeekGrbit::SEEK_GE), (on(&e, 1), WRN_SEEK_NOT_EQUAL));
        assert_eq!(seek(&e, b"d", SeekGrbit::SEEK_GT), (on(&e, 3), SUCCESS));
        assert_eq!(seek(&e, b"d", SeekGrbit::SEEK_LE), (on(&e, 2), SUCCESS));
        assert_eq!(seek(&e, b"e", SeekGrbit::SEEK_LE), (on(&e, 2), WRN_SEEK_NOT_EQUAL));
        assert_eq!(seek(&e, b"d", SeekGrbit::SEEK_LT), (on(&e, 0), SUCCESS));
        assert_eq!(
            seek(&e, b"a", SeekGrbit::SEEK_LT),
            (Position::BeforeFirst, ERR_RECORD_NOT_FOUND)
        );
        assert_eq!(
            seek(&e, b"g", SeekGrbit::SEEK_GE),
            (Position::AfterLast, ERR_RECORD_NOT_FOUND)
        );
    }

    #[test]
    fn test_moves_and_key_ne() {
        let e = entries(&[b"b", b"d", b"d", b"f"]);
        assert_eq!(next_entry(&e, &Position::BeforeFirst, None, false), Some(0));
        assert_eq!(next_entry(&e, &on(&e, 1), None, false), Some(2));
        assert_eq!(next_entry(&e, &on(&e, 1), None, true), Some(3));
        assert_eq!(prev_entry(&e, &on(&e, 2), None, true), Some(0));
        assert_eq!(next_entry(&e, &on(&e, 3), None, false), None);
        assert_eq!(prev_entry(&e, &Position::AfterLast, None, false), Some(3));
        let between = Position::Between(b"c".to_vec());
        assert_eq!(next_entry(&e, &between, None, false), Some(1));
        assert_eq!(prev_entry(&e, &between, None, false), Some(0));
    }

    #[test]
    fn test_range_limits_moves() {
        let e = entries(&[b"b", b"d", b"f"]);
        let upper = IndexRange {
            limit: b"d".to_vec(),
            upper: true,
            inclusive: true,
        };
        assert_eq!(next_entry(&e, &on(&e, 0), Some(&upper), false), Some(1));
        assert_eq!(next_entry(&e, &on(&e, 1), Some(&upper), false), None);

        let exclusive = IndexRange {
            inclusive: false,
            ..upper
        };
        assert_eq!(next_entry(&e, &on(&e, 0), Some(&exclusive), false), None);
    }
}

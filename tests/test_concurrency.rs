use std::sync::Arc;
use std::thread;

use lumoisam::{
    AttachGrbit, ColumnDef, ColumnId, ColumnType, ColumnValue, CommitGrbit, Cursor, Error,
    ErrorKind, FlushKind, GetLockGrbit, IndexCreate, IndexCreateGrbit, Instance,
    InstanceConfig, MakeKeyGrbit, MemoryEngine, OpenTableGrbit, PrepareUpdate, RollbackGrbit,
    SeekGrbit, Session, TableCreate, TextEncoding, TransactionGrbit,
};

// Common test setup
fn setup_instance(name: &str) -> Instance {
    Instance::in_memory(InstanceConfig::new(name)).unwrap()
}

/// Create the shared database with one record `(1, "Alice")`
fn setup_shared(session: &Session<'_>) {
    let db = session.create_database("shared.db", 0).unwrap();
    let create = TableCreate::new("people")
        .column("Id", ColumnDef::new(ColumnType::Long))
        .column("Name", ColumnDef::text(TextEncoding::Unicode))
        .index(IndexCreate::new("primary", "+Id\0\0", IndexCreateGrbit::PRIMARY));
    let cursor = db.create_table_column_index(&create).unwrap();
    let (id, name) = columns(&cursor);
    cursor.prepare_update(PrepareUpdate::Insert).unwrap();
    cursor
        .set_columns(&[ColumnValue::new(id, 1i32), ColumnValue::new(name, "Alice")])
        .unwrap();
    cursor.update().unwrap();
}

fn columns(cursor: &Cursor<'_>) -> (ColumnId, ColumnId) {
    (
        cursor.column_id("Id").unwrap(),
        cursor.column_id("Name").unwrap(),
    )
}

fn seek_id(cursor: &Cursor<'_>, id: i32) {
    cursor.make_key(id, MakeKeyGrbit::NEW_KEY).unwrap();
    cursor.seek(SeekGrbit::SEEK_EQ).unwrap();
}

fn name_of(cursor: &Cursor<'_>) -> Option<String> {
    let (_, name) = columns(cursor);
    cursor.retrieve_column_as_string(name).unwrap()
}

#[test]
fn test_stale_update_gets_write_conflict() {
    let instance = setup_instance("conflict");
    let session_a = instance.begin_session().unwrap();
    let session_b = instance.begin_session().unwrap();
    setup_shared(&session_a);

    let db_a = session_a.open_database("shared.db", AttachGrbit::empty()).unwrap();
    let db_b = session_b.open_database("shared.db", AttachGrbit::empty()).unwrap();
    let cursor_a = db_a.open_table("people", OpenTableGrbit::empty()).unwrap();
    let cursor_b = db_b.open_table("people", OpenTableGrbit::empty()).unwrap();
    let (_, name) = columns(&cursor_a);

    seek_id(&cursor_b, 1);
    cursor_b.prepare_update(PrepareUpdate::Replace).unwrap();
    assert!(!cursor_b.is_write_conflict_expected().unwrap());

    seek_id(&cursor_a, 1);
    cursor_a.prepare_update(PrepareUpdate::Replace).unwrap();
    cursor_a.set_column(name, "Alicia").unwrap();
    cursor_a.update().unwrap();

    assert!(cursor_b.is_write_conflict_expected().unwrap());
    cursor_b.set_column(name, "Alison").unwrap();
    let err = cursor_b.update().unwrap_err();
    assert_eq!(err, Error::WriteConflict);
    assert_eq!(err.kind(), ErrorKind::Concurrency);
    assert!(!cursor_b.is_update_pending());

    seek_id(&cursor_b, 1);
    assert_eq!(name_of(&cursor_b).as_deref(), Some("Alicia"));
}

#[test]
fn test_uncommitted_changes_stay_private() {
    let instance = setup_instance("isolation");
    let session_a = instance.begin_session().unwrap();
    let session_b = instance.begin_session().unwrap();
    setup_shared(&session_a);

    let db_a = session_a.open_database("shared.db", AttachGrbit::empty()).unwrap();
    let db_b = session_b.open_database("shared.db", AttachGrbit::empty()).unwrap();
    let cursor_a = db_a.open_table("people", OpenTableGrbit::empty()).unwrap();
    let cursor_b = db_b.open_table("people", OpenTableGrbit::empty()).unwrap();
    let (_, name) = columns(&cursor_a);

    let txn = session_a.begin_transaction().unwrap();
    seek_id(&cursor_a, 1);
    cursor_a.prepare_update(PrepareUpdate::Replace).unwrap();
    cursor_a.set_column(name, "Alicia").unwrap();
    cursor_a.update().unwrap();
    assert_eq!(name_of(&cursor_a).as_deref(), Some("Alicia"));

    seek_id(&cursor_b, 1);
    assert_eq!(name_of(&cursor_b).as_deref(), Some("Alice"));
    assert!(cursor_b.is_write_conflict_expected().unwrap());
    cursor_b.prepare_update(PrepareUpdate::Replace).unwrap();
    cursor_b.set_column(name, "Alison").unwrap();
    assert_eq!(cursor_b.update().unwrap_err(), Error::WriteConflict);

    txn.commit(CommitGrbit::empty()).unwrap();
    seek_id(&cursor_b, 1);
    assert_eq!(name_of(&cursor_b).as_deref(), Some("Alicia"));
}

#[test]
fn test_explicit_locks() {
    let instance = setup_instance("locks");
    let session_a = instance.begin_session().unwrap();
    let session_b = instance.begin_session().unwrap();
    setup_shared(&session_a);

    let db_a = session_a.open_database("shared.db", AttachGrbit::empty()).unwrap();
    let db_b = session_b.open_database("shared.db", AttachGrbit::empty()).unwrap();
    let cursor_a = db_a.open_table("people", OpenTableGrbit::empty()).unwrap();
    let cursor_b = db_b.open_table("people", OpenTableGrbit::empty()).unwrap();
    seek_id(&cursor_a, 1);
    seek_id(&cursor_b, 1);

    assert_eq!(
        cursor_a.get_lock(GetLockGrbit::READ_LOCK).unwrap_err(),
        Error::NotInTransaction
    );

    // Read locks are shared
    let txn_a = session_a.begin_transaction().unwrap();
    let txn_b = session_b.begin_transaction().unwrap();
    cursor_a.get_lock(GetLockGrbit::READ_LOCK).unwrap();
    assert!(cursor_b.try_get_lock(GetLockGrbit::READ_LOCK).unwrap());
    assert!(!cursor_b.try_get_lock(GetLockGrbit::WRITE_LOCK).unwrap());
    txn_a.commit(CommitGrbit::empty()).unwrap();
    txn_b.commit(CommitGrbit::empty()).unwrap();

    // Write locks exclude everyone else until the holder's transaction ends
    let txn_a = session_a.begin_transaction().unwrap();
    let txn_b = session_b.begin_transaction().unwrap();
    cursor_a.get_lock(GetLockGrbit::WRITE_LOCK).unwrap();
    assert!(!cursor_b.try_get_lock(GetLockGrbit::READ_LOCK).unwrap());
    assert_eq!(
        cursor_b.get_lock(GetLockGrbit::WRITE_LOCK).unwrap_err(),
        Error::WriteConflict
    );
    assert!(cursor_b.is_write_conflict_expected().unwrap());
    txn_a.rollback().unwrap();
    assert!(cursor_b.try_get_lock(GetLockGrbit::WRITE_LOCK).unwrap());
    txn_b.commit(CommitGrbit::empty()).unwrap();
}

#[test]
fn test_thread_affinity_and_context() {
    let instance = setup_instance("affinity");
    let session = instance.begin_session().unwrap();
    session.begin(TransactionGrbit::empty()).unwrap();

    let session = thread::scope(|scope| {
        scope
            .spawn(move || {
                assert_eq!(
                    session.commit(CommitGrbit::empty()).unwrap_err(),
                    Error::SessionSharingViolation
                );

                session.set_context().unwrap();
                assert_eq!(session.begin(TransactionGrbit::empty()).unwrap(), 2);
                assert_eq!(session.commit(CommitGrbit::empty()).unwrap(), 1);
                session.reset_context().unwrap();
                session
            })
            .join()
            .unwrap()
    });

    // Resetting the context on the worker handed the transaction to it
    assert_eq!(
        session.rollback(RollbackGrbit::empty()).unwrap_err(),
        Error::SessionSharingViolation
    );
    session.set_context().unwrap();
    assert_eq!(session.rollback(RollbackGrbit::empty()).unwrap(), 0);
    session.reset_context().unwrap();

    // Outside a transaction any thread may use the session
    let session = thread::scope(|scope| {
        scope
            .spawn(move || {
                assert_eq!(session.begin(TransactionGrbit::empty()).unwrap(), 1);
                assert_eq!(session.commit(CommitGrbit::empty()).unwrap(), 0);
                session
            })
            .join()
            .unwrap()
    });
    session.close().unwrap();
}

#[test]
fn test_lazy_commits_until_flush() {
    let engine = Arc::new(MemoryEngine::new());
    let instance = Instance::new(engine.clone(), InstanceConfig::new("lazy")).unwrap();
    let session_a = instance.begin_session().unwrap();
    let session_b = instance.begin_session().unwrap();

    for _ in 0..2 {
        session_a.begin_transaction().unwrap().commit_lazy().unwrap();
    }
    session_b.begin_transaction().unwrap().commit_lazy().unwrap();
    assert_eq!(engine.unflushed_commits(), 3);

    session_a.flush_transactions(FlushKind::Session).unwrap();
    assert_eq!(engine.unflushed_commits(), 1);
    session_a.flush_transactions(FlushKind::AllSessions).unwrap();
    assert_eq!(engine.unflushed_commits(), 0);

    // Nested commits stay in the parent level
    let outer = session_a.begin_transaction().unwrap();
    session_a.begin_transaction().unwrap().commit_lazy().unwrap();
    assert_eq!(engine.unflushed_commits(), 0);
    outer.commit_lazy().unwrap();
    assert_eq!(engine.unflushed_commits(), 1);
}

#[test]
fn test_databases_outlive_instances() {
    let engine = Arc::new(MemoryEngine::new());
    {
        let instance = Instance::new(engine.clone(), InstanceConfig::new("first")).unwrap();
        let session = instance.begin_session().unwrap();
        setup_shared(&session);
        session.close().unwrap();
        instance.term().unwrap();
    }
    assert!(engine.database_exists("shared.db"));

    let instance = Instance::new(engine.clone(), InstanceConfig::new("second")).unwrap();
    let session = instance.begin_session().unwrap();
    assert_eq!(
        session
            .open_database("shared.db", AttachGrbit::empty())
            .unwrap_err(),
        Error::DatabaseNotFound
    );
    session
        .attach_database("shared.db", 0, AttachGrbit::READ_ONLY)
        .unwrap();
    let db = session.open_database("shared.db", AttachGrbit::READ_ONLY).unwrap();
    assert!(db.is_read_only());
    let cursor = db.open_table("people", OpenTableGrbit::empty()).unwrap();
    seek_id(&cursor, 1);
    assert_eq!(name_of(&cursor).as_deref(), Some("Alice"));
    assert_eq!(
        cursor.prepare_update(PrepareUpdate::Replace).unwrap_err(),
        Error::PermissionDenied
    );
}

#[test]
fn test_exclusive_table_open() {
    let instance = setup_instance("exclusive");
    let session_a = instance.begin_session().unwrap();
    let session_b = instance.begin_session().unwrap();
    setup_shared(&session_a);

    let db_a = session_a.open_database("shared.db", AttachGrbit::empty()).unwrap();
    let db_b = session_b.open_database("shared.db", AttachGrbit::empty()).unwrap();
    let _cursor_a = db_a.open_table("people", OpenTableGrbit::DENY_WRITE).unwrap();
    assert_eq!(
        db_b.open_table("people", OpenTableGrbit::empty()).unwrap_err(),
        Error::TableLocked
    );

    let cursor_b = db_b.open_table("people", OpenTableGrbit::READ_ONLY).unwrap();
    seek_id(&cursor_b, 1);
    assert_eq!(name_of(&cursor_b).as_deref(), Some("Alice"));
    assert_eq!(
        cursor_b.prepare_update(PrepareUpdate::Replace).unwrap_err(),
        Error::PermissionDenied
    );
}

#[test]
fn test_dup_cursor_navigates_independently() {
    let instance = setup_instance("dup");
    let session = instance.begin_session().unwrap();
    setup_shared(&session);
    let db = session.open_database("shared.db", AttachGrbit::empty()).unwrap();
    let cursor = db.open_table("people", OpenTableGrbit::empty()).unwrap();
    let (id, name) = columns(&cursor);
    cursor.prepare_update(PrepareUpdate::Insert).unwrap();
    cursor
        .set_columns(&[ColumnValue::new(id, 2i32), ColumnValue::new(name, "Bob")])
        .unwrap();
    cursor.update().unwrap();

    seek_id(&cursor, 2);
    let dup = cursor.dup_cursor().unwrap();
    assert_eq!(dup.retrieve_column_as_i32(id).unwrap_err(), Error::NoCurrentRecord);
    dup.move_first().unwrap();
    assert_eq!(dup.retrieve_column_as_i32(id).unwrap(), Some(1));
    assert_eq!(cursor.retrieve_column_as_i32(id).unwrap(), Some(2));
}

use chrono::NaiveDate;
use lumoisam::{
    ColumnDef, ColumnDefGrbit, ColumnId, ColumnOrder, ColumnType, ColumnValue, Cursor, Database,
    Error, ErrorKind, IndexCreate, IndexCreateGrbit, Instance, InstanceConfig, MakeKeyGrbit,
    OpenTableGrbit, PrepareUpdate, RetrieveColumnGrbit, RollbackGrbit, SeekGrbit,
    SetColumnGrbit, SetIndexRangeGrbit, TableCreate, TextEncoding, TransactionGrbit,
    TypedValue, ValueKind, Warning,
};
use uuid::Uuid;

// Common test setup
fn setup_instance(name: &str) -> Instance {
    Instance::in_memory(InstanceConfig::new(name)).unwrap()
}

fn people_table() -> TableCreate {
    TableCreate::new("people")
        .column("Id", ColumnDef::new(ColumnType::Long))
        .column("Name", ColumnDef::text(TextEncoding::Unicode))
        .index(IndexCreate::new("primary", "+Id\0\0", IndexCreateGrbit::PRIMARY))
        .index(IndexCreate::new("by_name", "+Name\0\0", IndexCreateGrbit::empty()))
}

struct People {
    id: ColumnId,
    name: ColumnId,
}

fn open_people<'d>(db: &'d Database<'d>) -> (Cursor<'d>, People) {
    let cursor = db.create_table_column_index(&people_table()).unwrap();
    let columns = People {
        id: cursor.column_id("Id").unwrap(),
        name: cursor.column_id("Name").unwrap(),
    };
    (cursor, columns)
}

fn insert_person(cursor: &Cursor<'_>, columns: &People, id: i32, name: &str) -> Vec<u8> {
    cursor.prepare_update(PrepareUpdate::Insert).unwrap();
    cursor
        .set_columns(&[
            ColumnValue::new(columns.id, id),
            ColumnValue::new(columns.name, name),
        ])
        .unwrap();
    cursor.update().unwrap()
}

fn seek_id(cursor: &Cursor<'_>, id: i32) {
    cursor.make_key(id, MakeKeyGrbit::NEW_KEY).unwrap();
    cursor.seek(SeekGrbit::SEEK_EQ).unwrap();
}

#[test]
fn test_seek_and_retrieve() {
    let instance = setup_instance("seek");
    let session = instance.begin_session().unwrap();
    let db = session.create_database("people.db", 0).unwrap();
    let (cursor, columns) = open_people(&db);

    insert_person(&cursor, &columns, 1, "Alice");

    seek_id(&cursor, 1);
    assert_eq!(
        cursor.retrieve_column_as_string(columns.name).unwrap().as_deref(),
        Some("Alice")
    );
    assert_eq!(cursor.retrieve_column_as_i32(columns.id).unwrap(), Some(1));
    assert!(!cursor.try_move_next().unwrap());
    assert_eq!(cursor.move_next().unwrap_err(), Error::NoCurrentRecord);

    cursor.make_key(2i32, MakeKeyGrbit::NEW_KEY).unwrap();
    assert!(!cursor.try_seek(SeekGrbit::SEEK_EQ).unwrap());
    cursor.make_key(2i32, MakeKeyGrbit::NEW_KEY).unwrap();
    let err = cursor.seek(SeekGrbit::SEEK_EQ).unwrap_err();
    assert_eq!(err, Error::RecordNotFound);
    assert_eq!(err.kind(), ErrorKind::Absence);
}

#[test]
fn test_key_order_navigation() {
    let instance = setup_instance("order");
    let session = instance.begin_session().unwrap();
    let db = session.create_database("people.db", 0).unwrap();
    let (cursor, columns) = open_people(&db);

    for (id, name) in [(5, "eve"), (-2, "bob"), (9, "Zed"), (3, "carol"), (7, "Alice"), (1, "dan")] {
        insert_person(&cursor, &columns, id, name);
    }

    cursor.make_key(4i32, MakeKeyGrbit::NEW_KEY).unwrap();
    assert_eq!(
        cursor.seek(SeekGrbit::SEEK_GE).unwrap(),
        Some(Warning::SeekNotEqual)
    );
    let mut ids = Vec::new();
    loop {
        ids.push(cursor.retrieve_column_as_i32(columns.id).unwrap().unwrap());
        if !cursor.try_move_next().unwrap() {
            break;
        }
    }
    assert_eq!(ids, vec![5, 7, 9]);

    cursor.move_first().unwrap();
    assert_eq!(cursor.retrieve_column_as_i32(columns.id).unwrap(), Some(-2));
    cursor.move_last().unwrap();
    assert_eq!(cursor.retrieve_column_as_i32(columns.id).unwrap(), Some(9));
    cursor.move_previous().unwrap();
    assert_eq!(cursor.retrieve_column_as_i32(columns.id).unwrap(), Some(7));

    cursor.set_current_index(Some("by_name")).unwrap();
    let mut names = vec![cursor.retrieve_column_as_string(columns.name).unwrap().unwrap()];
    while cursor.try_move_next().unwrap() {
        names.push(cursor.retrieve_column_as_string(columns.name).unwrap().unwrap());
    }
    assert_eq!(names, vec!["Alice", "Zed", "bob", "carol", "dan", "eve"]);
}

#[test]
fn test_index_range() {
    let instance = setup_instance("range");
    let session = instance.begin_session().unwrap();
    let db = session.create_database("people.db", 0).unwrap();
    let (cursor, columns) = open_people(&db);
    for id in 1..=9 {
        insert_person(&cursor, &columns, id, &format!("person {}", id));
    }

    cursor.make_key(3i32, MakeKeyGrbit::NEW_KEY).unwrap();
    cursor.seek(SeekGrbit::SEEK_GE).unwrap();
    cursor.make_key(6i32, MakeKeyGrbit::NEW_KEY).unwrap();
    cursor
        .set_index_range(SetIndexRangeGrbit::UPPER_LIMIT | SetIndexRangeGrbit::INCLUSIVE)
        .unwrap();
    assert_eq!(cursor.index_record_count(0).unwrap(), 4);

    let mut ids = vec![cursor.retrieve_column_as_i32(columns.id).unwrap().unwrap()];
    while cursor.try_move_next().unwrap() {
        ids.push(cursor.retrieve_column_as_i32(columns.id).unwrap().unwrap());
    }
    assert_eq!(ids, vec![3, 4, 5, 6]);

    // Running off the range end drops it
    cursor.move_first().unwrap();
    assert_eq!(cursor.index_record_count(0).unwrap(), 9);

    cursor.make_key(8i32, MakeKeyGrbit::NEW_KEY).unwrap();
    cursor.seek(SeekGrbit::SEEK_EQ).unwrap();
    cursor.make_key(6i32, MakeKeyGrbit::NEW_KEY).unwrap();
    assert!(!cursor
        .try_set_index_range(SetIndexRangeGrbit::UPPER_LIMIT | SetIndexRangeGrbit::INCLUSIVE)
        .unwrap());
}

#[test]
fn test_new_key_clears_index_range() {
    let instance = setup_instance("range_reset");
    let session = instance.begin_session().unwrap();
    let db = session.create_database("people.db", 0).unwrap();
    let (cursor, columns) = open_people(&db);
    for id in 1..=5 {
        insert_person(&cursor, &columns, id, &format!("person {}", id));
    }

    seek_id(&cursor, 1);
    cursor.make_key(2i32, MakeKeyGrbit::NEW_KEY).unwrap();
    cursor
        .set_index_range(SetIndexRangeGrbit::UPPER_LIMIT | SetIndexRangeGrbit::INCLUSIVE)
        .unwrap();
    assert_eq!(cursor.index_record_count(0).unwrap(), 2);

    cursor.make_key(1i32, MakeKeyGrbit::NEW_KEY).unwrap();
    assert_eq!(cursor.index_record_count(0).unwrap(), 5);
    let mut ids = vec![cursor.retrieve_column_as_i32(columns.id).unwrap().unwrap()];
    while cursor.try_move_next().unwrap() {
        ids.push(cursor.retrieve_column_as_i32(columns.id).unwrap().unwrap());
    }
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_prefix_seek_on_text() {
    let instance = setup_instance("prefix");
    let session = instance.begin_session().unwrap();
    let db = session.create_database("people.db", 0).unwrap();
    let (cursor, columns) = open_people(&db);
    for (id, name) in [(1, "Anna"), (2, "Andrew"), (3, "Bert"), (4, "Amy")] {
        insert_person(&cursor, &columns, id, name);
    }

    cursor.set_current_index(Some("by_name")).unwrap();
    cursor
        .make_key("An", MakeKeyGrbit::NEW_KEY | MakeKeyGrbit::PARTIAL_COLUMN_START_LIMIT)
        .unwrap();
    cursor.seek(SeekGrbit::SEEK_GE).unwrap();
    cursor
        .make_key("An", MakeKeyGrbit::NEW_KEY | MakeKeyGrbit::PARTIAL_COLUMN_END_LIMIT)
        .unwrap();
    cursor
        .set_index_range(SetIndexRangeGrbit::UPPER_LIMIT | SetIndexRangeGrbit::INCLUSIVE)
        .unwrap();

    let mut names = vec![cursor.retrieve_column_as_string(columns.name).unwrap().unwrap()];
    while cursor.try_move_next().unwrap() {
        names.push(cursor.retrieve_column_as_string(columns.name).unwrap().unwrap());
    }
    assert_eq!(names, vec!["Andrew", "Anna"]);
}

#[test]
fn test_update_then_retrieve_by_bookmark() {
    let instance = setup_instance("bookmark");
    let session = instance.begin_session().unwrap();
    let db = session.create_database("values.db", 0).unwrap();
    let create = TableCreate::new("values")
        .column("Id", ColumnDef::new(ColumnType::Long).grbit(ColumnDefGrbit::AUTOINCREMENT))
        .column("Flag", ColumnDef::new(ColumnType::Bit))
        .column("Small", ColumnDef::new(ColumnType::Short))
        .column("Big", ColumnDef::new(ColumnType::LongLong))
        .column("Ratio", ColumnDef::new(ColumnType::IeeeDouble))
        .column("Key", ColumnDef::new(ColumnType::Guid))
        .column("When", ColumnDef::new(ColumnType::DateTime))
        .column("Label", ColumnDef::text(TextEncoding::Ascii))
        .column("Blob", ColumnDef::new(ColumnType::LongBinary))
        .index(IndexCreate::new("primary", "+Id\0\0", IndexCreateGrbit::PRIMARY));
    let cursor = db.create_table_column_index(&create).unwrap();
    let column = |name: &str| cursor.column_id(name).unwrap();

    let when = NaiveDate::from_ymd_opt(2024, 5, 17)
        .unwrap()
        .and_hms_milli_opt(8, 30, 15, 250)
        .unwrap();
    let guid = Uuid::from_u128(0x0123_4567_89ab_cdef_0011_2233_4455_6677);
    let blob: Vec<u8> = (0..=255u8).cycle().take(1000).collect();

    let update = cursor.begin_update(PrepareUpdate::Insert).unwrap();
    update.set_column(column("Flag"), true).unwrap();
    update.set_column(column("Small"), i16::MIN).unwrap();
    update.set_column(column("Big"), i64::MAX).unwrap();
    update.set_column(column("Ratio"), -0.125f64).unwrap();
    update.set_column(column("Key"), guid).unwrap();
    update.set_column(column("When"), when).unwrap();
    update.set_column(column("Label"), "plain ascii").unwrap();
    update.set_column(column("Blob"), blob.clone()).unwrap();
    let bookmark = update.save().unwrap();

    cursor.move_first().unwrap();
    cursor.move_last().unwrap();
    cursor.goto_bookmark(&bookmark).unwrap();
    assert_eq!(cursor.retrieve_column_as_i32(column("Id")).unwrap(), Some(1));
    assert_eq!(cursor.retrieve_column_as_bool(column("Flag")).unwrap(), Some(true));
    assert_eq!(cursor.retrieve_column_as_i16(column("Small")).unwrap(), Some(i16::MIN));
    assert_eq!(cursor.retrieve_column_as_i64(column("Big")).unwrap(), Some(i64::MAX));
    assert_eq!(cursor.retrieve_column_as_f64(column("Ratio")).unwrap(), Some(-0.125));
    assert_eq!(cursor.retrieve_column_as_guid(column("Key")).unwrap(), Some(guid));
    assert_eq!(cursor.retrieve_column_as_datetime(column("When")).unwrap(), Some(when));
    assert_eq!(
        cursor.retrieve_column_as_string(column("Label")).unwrap().as_deref(),
        Some("plain ascii")
    );
    assert_eq!(cursor.retrieve_column_as_binary(column("Blob")).unwrap(), Some(blob));
    assert_eq!(cursor.bookmark().unwrap(), bookmark);

    cursor.delete().unwrap();
    assert_eq!(cursor.goto_bookmark(&bookmark).unwrap_err(), Error::RecordDeleted);
    assert!(!cursor.try_goto_bookmark(&bookmark).unwrap());
    assert!(!cursor.try_move_first().unwrap());
}

#[test]
fn test_null_and_empty_are_distinct() {
    let instance = setup_instance("nulls");
    let session = instance.begin_session().unwrap();
    let db = session.create_database("nulls.db", 0).unwrap();
    let create = TableCreate::new("notes")
        .column("Id", ColumnDef::new(ColumnType::Long))
        .column("Note", ColumnDef::text(TextEncoding::Unicode))
        .column("Data", ColumnDef::new(ColumnType::LongBinary))
        .index(IndexCreate::new("primary", "+Id\0\0", IndexCreateGrbit::PRIMARY));
    let cursor = db.create_table_column_index(&create).unwrap();
    let id = cursor.column_id("Id").unwrap();
    let note = cursor.column_id("Note").unwrap();
    let data = cursor.column_id("Data").unwrap();

    cursor.prepare_update(PrepareUpdate::Insert).unwrap();
    cursor
        .set_columns(&[
            ColumnValue::new(id, 1i32),
            ColumnValue::new(note, ""),
            ColumnValue::new(data, TypedValue::Binary(None)),
        ])
        .unwrap();
    let bookmark = cursor.update().unwrap();
    cursor.goto_bookmark(&bookmark).unwrap();

    assert_eq!(cursor.retrieve_column_as_string(note).unwrap().as_deref(), Some(""));
    assert_eq!(cursor.retrieve_column(data).unwrap(), None);

    let mut values = [
        ColumnValue::retrieve(note, ValueKind::String),
        ColumnValue::retrieve(data, ValueKind::Binary),
    ];
    cursor.retrieve_columns(&mut values).unwrap();
    assert!(!values[0].is_null());
    assert_eq!(values[0].length(), 0);
    assert_eq!(values[0].value, TypedValue::String(Some(String::new())));
    assert!(values[1].is_null());
    assert_eq!(values[1].warning(), Some(Warning::ColumnNull));
}

#[test]
fn test_multi_valued_columns() {
    let instance = setup_instance("tags");
    let session = instance.begin_session().unwrap();
    let db = session.create_database("tags.db", 0).unwrap();
    let create = TableCreate::new("posts")
        .column("Id", ColumnDef::new(ColumnType::Long))
        .column(
            "Tags",
            ColumnDef::text(TextEncoding::Unicode).grbit(ColumnDefGrbit::MULTI_VALUED),
        )
        .index(IndexCreate::new("primary", "+Id\0\0", IndexCreateGrbit::PRIMARY));
    let cursor = db.create_table_column_index(&create).unwrap();
    let id = cursor.column_id("Id").unwrap();
    let tags = cursor.column_id("Tags").unwrap();
    assert!(cursor.column("tags").unwrap().is_multi_valued());

    cursor.prepare_update(PrepareUpdate::Insert).unwrap();
    cursor
        .set_columns(&[
            ColumnValue::new(id, 1i32),
            ColumnValue::new(tags, "red").itag_sequence(0),
            ColumnValue::new(tags, "blue").itag_sequence(0),
        ])
        .unwrap();
    assert_eq!(
        cursor
            .set_column_with(tags, "red", SetColumnGrbit::UNIQUE_MULTI_VALUES, 0)
            .unwrap_err(),
        Error::MultiValuedDuplicate
    );
    let bookmark = cursor.update().unwrap();
    cursor.goto_bookmark(&bookmark).unwrap();

    assert_eq!(cursor.count_values(tags).unwrap(), 2);
    assert_eq!(
        cursor
            .retrieve_column_as_with::<String>(tags, RetrieveColumnGrbit::empty(), 2)
            .unwrap()
            .as_deref(),
        Some("blue")
    );

    cursor.prepare_update(PrepareUpdate::Replace).unwrap();
    cursor
        .set_column_with(tags, TypedValue::String(None), SetColumnGrbit::empty(), 1)
        .unwrap();
    cursor.update().unwrap();
    seek_id(&cursor, 1);
    assert_eq!(cursor.count_values(tags).unwrap(), 1);
    assert_eq!(
        cursor.retrieve_column_as_string(tags).unwrap().as_deref(),
        Some("blue")
    );
}

#[test]
fn test_unique_indexes_reject_duplicates() {
    let instance = setup_instance("unique");
    let session = instance.begin_session().unwrap();
    let db = session.create_database("people.db", 0).unwrap();
    let (cursor, columns) = open_people(&db);
    cursor
        .create_index(&IndexCreate::new("unique_name", "+Name\0\0", IndexCreateGrbit::UNIQUE))
        .unwrap();

    insert_person(&cursor, &columns, 1, "Alice");

    cursor.prepare_update(PrepareUpdate::Insert).unwrap();
    cursor.set_column(columns.id, 1i32).unwrap();
    cursor.set_column(columns.name, "Bob").unwrap();
    assert_eq!(cursor.update().unwrap_err(), Error::KeyDuplicate);
    assert!(!cursor.is_update_pending());

    cursor.prepare_update(PrepareUpdate::Insert).unwrap();
    cursor.set_column(columns.id, 2i32).unwrap();
    cursor.set_column(columns.name, "Alice").unwrap();
    assert_eq!(cursor.update().unwrap_err(), Error::KeyDuplicate);

    insert_person(&cursor, &columns, 2, "Bob");
    cursor.move_first().unwrap();
    assert_eq!(cursor.index_record_count(0).unwrap(), 2);
}

#[test]
fn test_replace_cannot_change_primary_key() {
    let instance = setup_instance("replace");
    let session = instance.begin_session().unwrap();
    let db = session.create_database("people.db", 0).unwrap();
    let (cursor, columns) = open_people(&db);
    insert_person(&cursor, &columns, 1, "Alice");

    seek_id(&cursor, 1);
    cursor.prepare_update(PrepareUpdate::Replace).unwrap();
    cursor.set_column(columns.id, 2i32).unwrap();
    assert_eq!(cursor.update().unwrap_err(), Error::RecordPrimaryChanged);

    seek_id(&cursor, 1);
    cursor.prepare_update(PrepareUpdate::Replace).unwrap();
    cursor.set_column(columns.name, "Alicia").unwrap();
    cursor.update().unwrap();
    seek_id(&cursor, 1);
    assert_eq!(
        cursor.retrieve_column_as_string(columns.name).unwrap().as_deref(),
        Some("Alicia")
    );

    // Insert-copy takes the current record as a template
    cursor.prepare_update(PrepareUpdate::InsertCopy).unwrap();
    cursor.set_column(columns.id, 2i32).unwrap();
    cursor.update().unwrap();
    seek_id(&cursor, 2);
    assert_eq!(
        cursor.retrieve_column_as_string(columns.name).unwrap().as_deref(),
        Some("Alicia")
    );
}

#[test]
fn test_nested_rollback_restores_and_closes_cursors() {
    let instance = setup_instance("nested");
    let session = instance.begin_session().unwrap();
    let db = session.create_database("people.db", 0).unwrap();
    let (cursor, columns) = open_people(&db);

    let outer = session.begin_transaction().unwrap();
    insert_person(&cursor, &columns, 1, "Alice");

    let inner = session.begin_transaction().unwrap();
    assert_eq!(inner.depth(), 2);
    let scratch = db.open_table("people", OpenTableGrbit::empty()).unwrap();
    seek_id(&scratch, 1);
    scratch.prepare_update(PrepareUpdate::Replace).unwrap();
    scratch.set_column(columns.name, "Bob").unwrap();
    scratch.update().unwrap();
    insert_person(&cursor, &columns, 2, "Carol");
    inner.rollback().unwrap();

    assert!(!scratch.is_open());
    assert_eq!(scratch.move_first().unwrap_err(), Error::InvalidHandle);
    assert!(cursor.is_open());

    seek_id(&cursor, 1);
    assert_eq!(
        cursor.retrieve_column_as_string(columns.name).unwrap().as_deref(),
        Some("Alice")
    );
    cursor.make_key(2i32, MakeKeyGrbit::NEW_KEY).unwrap();
    assert!(!cursor.try_seek(SeekGrbit::SEEK_EQ).unwrap());

    outer.commit(Default::default()).unwrap();
    assert_eq!(session.transaction_depth(), 0);
    seek_id(&cursor, 1);
}

#[test]
fn test_rollback_all_discards_every_level() {
    let instance = setup_instance("rollback_all");
    let session = instance.begin_session().unwrap();
    let db = session.create_database("people.db", 0).unwrap();
    let (cursor, columns) = open_people(&db);

    session.begin(TransactionGrbit::empty()).unwrap();
    insert_person(&cursor, &columns, 1, "Alice");
    session.begin(TransactionGrbit::empty()).unwrap();
    cursor.prepare_update(PrepareUpdate::Insert).unwrap();
    assert_eq!(session.rollback(RollbackGrbit::ROLLBACK_ALL).unwrap(), 0);

    assert!(!cursor.is_update_pending());
    assert!(!cursor.try_move_first().unwrap());
}

#[test]
fn test_read_only_transaction_rejects_updates() {
    let instance = setup_instance("read_only");
    let session = instance.begin_session().unwrap();
    let db = session.create_database("people.db", 0).unwrap();
    let (cursor, columns) = open_people(&db);
    insert_person(&cursor, &columns, 1, "Alice");

    let txn = session
        .begin_transaction_with(TransactionGrbit::READ_ONLY)
        .unwrap();
    seek_id(&cursor, 1);
    assert_eq!(
        cursor.prepare_update(PrepareUpdate::Replace).unwrap_err(),
        Error::TransactionReadOnly
    );
    assert_eq!(cursor.delete().unwrap_err(), Error::TransactionReadOnly);
    txn.commit(Default::default()).unwrap();
}

#[test]
fn test_database_size_limit() {
    let instance = setup_instance("size");
    let session = instance.begin_session().unwrap();
    let db = session.create_database("small.db", 1).unwrap();
    assert_eq!(db.info().unwrap().max_pages, 1);
    let cursor = db.create_table("blobs").unwrap();
    let data = cursor
        .add_column("Data", &ColumnDef::new(ColumnType::LongBinary))
        .unwrap();

    let blob = vec![0xAB; 2000];
    for _ in 0..2 {
        cursor.prepare_update(PrepareUpdate::Insert).unwrap();
        cursor.set_column(data, blob.clone()).unwrap();
        cursor.update().unwrap();
    }
    cursor.prepare_update(PrepareUpdate::Insert).unwrap();
    cursor.set_column(data, blob).unwrap();
    assert_eq!(cursor.update().unwrap_err(), Error::OutOfDatabaseSpace);
    assert!(!cursor.is_update_pending());
    assert_eq!(db.info().unwrap().pages, 1);
}

#[test]
fn test_table_lifecycle() {
    let instance = setup_instance("tables");
    let session = instance.begin_session().unwrap();
    let db = session.create_database("tables.db", 0).unwrap();
    let (cursor, _) = open_people(&db);

    assert_eq!(
        db.create_table("People").unwrap_err(),
        Error::TableDuplicate
    );
    assert_eq!(db.delete_table("people").unwrap_err(), Error::TableInUse);
    let names: Vec<String> = cursor
        .columns(ColumnOrder::ByName)
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["Id", "Name"]);
    cursor.close().unwrap();

    db.delete_table("people").unwrap();
    assert_eq!(
        db.open_table("people", OpenTableGrbit::empty()).unwrap_err(),
        Error::ObjectNotFound
    );
    assert!(db.refresh_table_names().unwrap().is_empty());
}

#[test]
fn test_metadata_snapshot_until_refresh() {
    let instance = setup_instance("metadata");
    let session = instance.begin_session().unwrap();
    let db = session.create_database("people.db", 0).unwrap();
    let (cursor, columns) = open_people(&db);
    assert_eq!(cursor.columns(ColumnOrder::ById).unwrap().len(), 2);

    let other = db.open_table("people", OpenTableGrbit::empty()).unwrap();
    let extra = other
        .add_column("Extra", &ColumnDef::text(TextEncoding::Unicode))
        .unwrap();

    // Changes through another handle stay out of the cached snapshot
    assert_eq!(cursor.columns(ColumnOrder::ById).unwrap().len(), 2);
    assert_eq!(cursor.column_id("Extra").unwrap_err(), Error::ColumnNotFound);
    cursor.prepare_update(PrepareUpdate::Insert).unwrap();
    assert_eq!(
        cursor.set_column(extra, "x").unwrap_err(),
        Error::ColumnNotFound
    );
    assert_eq!(cursor.columns(ColumnOrder::ById).unwrap().len(), 2);
    cursor.cancel_update().unwrap();

    assert_eq!(cursor.refresh_metadata().unwrap().columns(ColumnOrder::ById).len(), 3);
    assert_eq!(cursor.column_id("Extra").unwrap(), extra);
    cursor.prepare_update(PrepareUpdate::Insert).unwrap();
    cursor
        .set_columns(&[
            ColumnValue::new(columns.id, 1i32),
            ColumnValue::new(columns.name, "Alice"),
            ColumnValue::new(extra, "x"),
        ])
        .unwrap();
    cursor.update().unwrap();
    seek_id(&cursor, 1);
    assert_eq!(
        cursor.retrieve_column_as_string(extra).unwrap().as_deref(),
        Some("x")
    );
}

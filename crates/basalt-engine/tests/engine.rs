use basalt_document::{FieldBuffer, Path, Value, ValueType};
use basalt_engine::{
    Engine, EngineError, FieldConstraint, IndexInfo, Sequence, TableHandle, TableInfo,
};
use basalt_store::MemoryStore;

fn engine() -> Engine<MemoryStore> {
    Engine::new(MemoryStore::new()).unwrap()
}

fn pk_table() -> TableInfo {
    let mut fc = FieldConstraint::new(Path::field("id"));
    fc.ty = Some(ValueType::Integer);
    fc.primary_key = true;
    fc.not_null = true;
    TableInfo {
        constraints: vec![fc],
        ..Default::default()
    }
}

fn doc(pairs: &[(&str, Value)]) -> FieldBuffer {
    let mut fb = FieldBuffer::new();
    for (name, value) in pairs {
        fb.add(*name, value.clone());
    }
    fb
}

fn insert_rows(txn: &basalt_engine::Transaction<'_, MemoryStore>, handle: &TableHandle, n: i64) {
    for i in 1..=n {
        txn.insert(
            handle,
            doc(&[
                ("id", Value::Integer(i)),
                ("name", Value::Text(format!("row-{i}"))),
            ]),
        )
        .unwrap();
    }
}

#[test]
fn create_insert_scan_roundtrip() {
    let engine = engine();
    let txn = engine.begin(true).unwrap();
    txn.create_table("items", pk_table()).unwrap();
    let handle = txn.table("items").unwrap();
    insert_rows(&txn, &handle, 3);

    let rows: Vec<_> = txn
        .scan(&handle)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(rows.len(), 3);
    // Primary-key order.
    let names: Vec<Value> = rows
        .iter()
        .map(|(_, d)| d.get("name").unwrap().unwrap())
        .collect();
    assert_eq!(
        names,
        vec![
            Value::Text("row-1".into()),
            Value::Text("row-2".into()),
            Value::Text("row-3".into()),
        ]
    );

    let (pk, _) = &rows[1];
    let fetched = txn.get_record(&handle, pk).unwrap().unwrap();
    assert_eq!(fetched.get("id").unwrap(), Some(Value::Integer(2)));
}

#[test]
fn duplicate_primary_key_rejected() {
    let engine = engine();
    let txn = engine.begin(true).unwrap();
    txn.create_table("t", pk_table()).unwrap();
    let handle = txn.table("t").unwrap();
    txn.insert(&handle, doc(&[("id", Value::Integer(1))])).unwrap();
    let err = txn
        .insert(&handle, doc(&[("id", Value::Integer(1))]))
        .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateKey(_)));
}

#[test]
fn missing_table_and_index_errors() {
    let engine = engine();
    let txn = engine.begin(false).unwrap();
    assert!(matches!(
        txn.table("nope"),
        Err(EngineError::TableNotFound(_))
    ));
    assert!(matches!(
        txn.index("nope"),
        Err(EngineError::IndexNotFound(_))
    ));
}

#[test]
fn rowid_tables_autogenerate_keys() {
    let engine = engine();
    let txn = engine.begin(true).unwrap();
    txn.create_table("logs", TableInfo::default()).unwrap();
    let handle = txn.table("logs").unwrap();
    let (pk1, _) = txn.insert(&handle, doc(&[("m", Value::Text("a".into()))])).unwrap();
    let (pk2, _) = txn.insert(&handle, doc(&[("m", Value::Text("b".into()))])).unwrap();
    assert!(pk1 < pk2);
}

#[test]
fn autoincrement_is_strictly_increasing() {
    let engine = engine();
    let txn = engine.begin(true).unwrap();
    let mut info = pk_table();
    info.sequences.push(Sequence {
        path: Path::field("id"),
        start: 10,
        increment: 5,
        last: None,
    });
    txn.create_table("t", info).unwrap();
    let handle = txn.table("t").unwrap();

    let (_, stored) = txn.insert(&handle, FieldBuffer::new()).unwrap();
    assert_eq!(stored.get("id"), Some(&Value::Integer(10)));
    let (_, stored) = txn.insert(&handle, FieldBuffer::new()).unwrap();
    assert_eq!(stored.get("id"), Some(&Value::Integer(15)));

    // An explicit higher value pushes the sequence forward.
    txn.insert(&handle, doc(&[("id", Value::Integer(100))])).unwrap();
    let (_, stored) = txn.insert(&handle, FieldBuffer::new()).unwrap();
    assert_eq!(stored.get("id"), Some(&Value::Integer(105)));
}

#[test]
fn replace_and_delete_maintain_indexes() {
    let engine = engine();
    let txn = engine.begin(true).unwrap();
    txn.create_table("t", pk_table()).unwrap();
    txn.create_index(IndexInfo {
        name: "ix_name".into(),
        table: "t".into(),
        paths: vec![Path::field("name")],
        unique: false,
    })
    .unwrap();
    let handle = txn.table("t").unwrap();
    insert_rows(&txn, &handle, 2);

    let (pk, _) = txn
        .scan(&handle)
        .unwrap()
        .next()
        .unwrap()
        .unwrap();
    txn.replace(
        &handle,
        &pk,
        doc(&[
            ("id", Value::Integer(1)),
            ("name", Value::Text("renamed".into())),
        ]),
    )
    .unwrap();

    let index = txn.index("ix_name").unwrap();
    let entries: Vec<_> = txn
        .scan_index_eq(&index, &[Value::Text("renamed".into())])
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(entries.len(), 1);
    let stale: Vec<_> = txn
        .scan_index_eq(&index, &[Value::Text("row-1".into())])
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert!(stale.is_empty());

    txn.delete(&handle, &entries[0].pk).unwrap();
    let gone: Vec<_> = txn
        .scan_index_eq(&index, &[Value::Text("renamed".into())])
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert!(gone.is_empty());
    assert!(matches!(
        txn.delete(&handle, &entries[0].pk),
        Err(EngineError::KeyNotFound)
    ));
}

#[test]
fn unique_index_rejects_duplicates() {
    let engine = engine();
    let txn = engine.begin(true).unwrap();
    txn.create_table("t", pk_table()).unwrap();
    txn.create_index(IndexInfo {
        name: "ux".into(),
        table: "t".into(),
        paths: vec![Path::field("email")],
        unique: true,
    })
    .unwrap();
    let handle = txn.table("t").unwrap();
    txn.insert(
        &handle,
        doc(&[
            ("id", Value::Integer(1)),
            ("email", Value::Text("a@x".into())),
        ]),
    )
    .unwrap();
    let err = txn
        .insert(
            &handle,
            doc(&[
                ("id", Value::Integer(2)),
                ("email", Value::Text("a@x".into())),
            ]),
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::UniqueViolation(_)));
}

#[test]
fn index_scans_walk_in_value_order() {
    let engine = engine();
    let txn = engine.begin(true).unwrap();
    txn.create_table("t", pk_table()).unwrap();
    txn.create_index(IndexInfo {
        name: "ix".into(),
        table: "t".into(),
        paths: vec![Path::field("score")],
        unique: false,
    })
    .unwrap();
    let handle = txn.table("t").unwrap();
    for (id, score) in [(1, 30), (2, 10), (3, 20), (4, 20)] {
        txn.insert(
            &handle,
            doc(&[
                ("id", Value::Integer(id)),
                ("score", Value::Integer(score)),
            ]),
        )
        .unwrap();
    }
    // A row without the indexed field is not indexed.
    txn.insert(&handle, doc(&[("id", Value::Integer(5))])).unwrap();

    let index = txn.index("ix").unwrap();
    let resolve = |entries: Vec<basalt_engine::IndexEntry>| -> Vec<i64> {
        entries
            .iter()
            .map(|e| {
                let d = txn.get_record(&handle, &e.pk).unwrap().unwrap();
                match d.get("id").unwrap().unwrap() {
                    Value::Integer(n) => n,
                    other => panic!("unexpected id {other:?}"),
                }
            })
            .collect()
    };

    let all: Vec<_> = txn
        .scan_index(&index, None, false)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(resolve(all), vec![2, 3, 4, 1]);

    // Ascend from a pivot includes equal entries and flags them.
    let from20: Vec<_> = txn
        .scan_index(&index, Some(&[Value::Integer(20)]), false)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert!(from20[0].is_equal && from20[1].is_equal);
    assert!(!from20[2].is_equal);
    assert_eq!(resolve(from20), vec![3, 4, 1]);

    // Descend from a pivot includes equal entries, largest first.
    let down20: Vec<_> = txn
        .scan_index(&index, Some(&[Value::Integer(20)]), true)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(resolve(down20), vec![4, 3, 2]);
}

#[test]
fn rename_table_moves_records_and_indexes() {
    let engine = engine();
    let txn = engine.begin(true).unwrap();
    txn.create_table("old", pk_table()).unwrap();
    txn.create_index(IndexInfo {
        name: "ix".into(),
        table: "old".into(),
        paths: vec![Path::field("name")],
        unique: false,
    })
    .unwrap();
    let handle = txn.table("old").unwrap();
    insert_rows(&txn, &handle, 2);

    txn.rename_table("old", "new").unwrap();
    assert!(matches!(
        txn.table("old"),
        Err(EngineError::TableNotFound(_))
    ));
    let handle = txn.table("new").unwrap();
    assert_eq!(handle.indexes.len(), 1);
    assert_eq!(handle.indexes[0].table, "new");
    let rows: Vec<_> = txn
        .scan(&handle)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(rows.len(), 2);
}

#[test]
fn drop_table_removes_everything() {
    let engine = engine();
    let txn = engine.begin(true).unwrap();
    txn.create_table("t", pk_table()).unwrap();
    txn.create_index(IndexInfo {
        name: "ix".into(),
        table: "t".into(),
        paths: vec![Path::field("name")],
        unique: false,
    })
    .unwrap();
    let handle = txn.table("t").unwrap();
    insert_rows(&txn, &handle, 2);

    txn.drop_table("t").unwrap();
    assert!(matches!(txn.table("t"), Err(EngineError::TableNotFound(_))));
    assert!(matches!(txn.index("ix"), Err(EngineError::IndexNotFound(_))));
}

#[test]
fn create_index_backfills_and_reindex_rebuilds() {
    let engine = engine();
    let txn = engine.begin(true).unwrap();
    txn.create_table("t", pk_table()).unwrap();
    let handle = txn.table("t").unwrap();
    insert_rows(&txn, &handle, 3);

    txn.create_index(IndexInfo {
        name: "ix".into(),
        table: "t".into(),
        paths: vec![Path::field("name")],
        unique: false,
    })
    .unwrap();
    let index = txn.index("ix").unwrap();
    let entries: Vec<_> = txn
        .scan_index(&index, None, false)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(entries.len(), 3);

    txn.reindex(Some("ix")).unwrap();
    let entries: Vec<_> = txn
        .scan_index(&index, None, false)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(entries.len(), 3);

    txn.reindex(None).unwrap();
    assert!(matches!(
        txn.reindex(Some("missing")),
        Err(EngineError::IndexNotFound(_))
    ));
}

#[test]
fn commit_makes_changes_visible() {
    let engine = engine();
    let txn = engine.begin(true).unwrap();
    txn.create_table("t", pk_table()).unwrap();
    let handle = txn.table("t").unwrap();
    insert_rows(&txn, &handle, 1);
    txn.commit().unwrap();

    let reader = engine.begin(false).unwrap();
    let handle = reader.table("t").unwrap();
    let rows: Vec<_> = reader
        .scan(&handle)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn read_only_transaction_rejects_writes() {
    let engine = engine();
    let txn = engine.begin(true).unwrap();
    txn.create_table("t", pk_table()).unwrap();
    txn.commit().unwrap();

    let reader = engine.begin(false).unwrap();
    let handle = reader.table("t").unwrap();
    let err = reader
        .insert(&handle, doc(&[("id", Value::Integer(1))]))
        .unwrap_err();
    assert!(matches!(err, EngineError::TransactionReadOnly));
}

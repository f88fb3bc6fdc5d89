mod common;
use common::*;

use basalt_db::{ConstraintError, Error, Param};
use basalt_document::{Document, FieldBuffer, Value};
use serde_json::json;

#[test]
fn insert_reports_row_count() {
    let db = db();
    exec(&db, "CREATE TABLE t(a INTEGER PRIMARY KEY)");
    let result = exec(&db, "INSERT INTO t VALUES {a: 1}, {a: 2}");
    assert_eq!(result.rows_affected(), 2);
    assert!(result.is_empty());
}

#[test]
fn insert_document_parameter() {
    let db = db();
    exec(&db, "CREATE TABLE t(a INTEGER PRIMARY KEY, b TEXT)");

    let mut fb = FieldBuffer::new();
    fb.add("a", Value::Integer(9));
    fb.add("b", Value::Text("param".into()));
    db.exec(
        "INSERT INTO t VALUES $doc",
        &[Param::named("doc", Value::Document(Document::Buf(fb)))],
    )
    .unwrap();

    assert_eq!(
        query_json(&db, "SELECT * FROM t"),
        vec![json!({"a": 9, "b": "param"})]
    );
}

#[test]
fn insert_returning_projects_stored_documents() {
    let db = db();
    exec(
        &db,
        "CREATE TABLE t(a INTEGER PRIMARY KEY AUTOINCREMENT, b TEXT DEFAULT 'none')",
    );
    let result = exec(&db, "INSERT INTO t VALUES {} RETURNING a, b");
    assert_eq!(rows_json(&result), vec![json!({"a": 1, "b": "none"})]);
}

#[test]
fn insert_select_renames_columns() {
    let db = db();
    exec(&db, "CREATE TABLE src(a INTEGER PRIMARY KEY, b TEXT)");
    exec(&db, "INSERT INTO src(a, b) VALUES (1, 'x'), (2, 'y')");
    exec(&db, "CREATE TABLE dst(k INTEGER PRIMARY KEY, v TEXT)");
    exec(&db, "INSERT INTO dst(k, v) SELECT a, b FROM src");
    assert_eq!(
        query_json(&db, "SELECT * FROM dst ORDER BY k"),
        vec![json!({"k": 1, "v": "x"}), json!({"k": 2, "v": "y"})]
    );
}

#[test]
fn constraint_violations_surface_as_constraint_errors() {
    let db = db();
    exec(
        &db,
        "CREATE TABLE t(a INTEGER PRIMARY KEY, b TEXT NOT NULL, c TEXT UNIQUE)",
    );
    exec(&db, "INSERT INTO t VALUES {a: 1, b: 'x', c: 'u1'}");

    let err = db.exec("INSERT INTO t VALUES {a: 1, b: 'y'}", &[]).unwrap_err();
    assert!(matches!(
        err,
        Error::Constraint(ConstraintError::PrimaryKey(_))
    ));

    let err = db.exec("INSERT INTO t VALUES {a: 2}", &[]).unwrap_err();
    assert!(matches!(err, Error::Constraint(ConstraintError::NotNull(_))));

    let err = db
        .exec("INSERT INTO t VALUES {a: 3, b: 'z', c: 'u1'}", &[])
        .unwrap_err();
    assert!(matches!(err, Error::Constraint(ConstraintError::Unique(_))));
}

#[test]
fn declared_types_coerce_inserted_values() {
    let db = db();
    exec(&db, "CREATE TABLE t(a INTEGER PRIMARY KEY, n INTEGER)");
    exec(&db, "INSERT INTO t VALUES {a: 1, n: '42'}");
    assert_eq!(
        query_json(&db, "SELECT n FROM t"),
        vec![json!({"n": 42})]
    );

    let err = db
        .exec("INSERT INTO t VALUES {a: 2, n: 'nope'}", &[])
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Constraint(ConstraintError::SchemaType(_))
    ));
}

#[test]
fn autoincrement_fills_missing_keys() {
    let db = db();
    exec(
        &db,
        "CREATE TABLE t(a INTEGER PRIMARY KEY AUTOINCREMENT(100, 10))",
    );
    exec(&db, "INSERT INTO t VALUES {}, {}");
    exec(&db, "INSERT INTO t VALUES {a: 500}");
    exec(&db, "INSERT INTO t VALUES {}");
    assert_eq!(
        query_json(&db, "SELECT a FROM t ORDER BY a"),
        vec![
            json!({"a": 100}),
            json!({"a": 110}),
            json!({"a": 500}),
            json!({"a": 510}),
        ]
    );
}

#[test]
fn rowid_tables_accept_documents_without_keys() {
    let db = db();
    exec(&db, "CREATE TABLE logs");
    exec(&db, "INSERT INTO logs VALUES {m: 'a'}, {m: 'b'}");
    assert_eq!(
        query_json(&db, "SELECT m FROM logs"),
        vec![json!({"m": "a"}), json!({"m": "b"})]
    );
    assert_eq!(
        query_json(&db, "SELECT pk() FROM logs LIMIT 1"),
        vec![json!({"pk()": [1]})]
    );
}

#[test]
fn update_set_and_nested_paths() {
    let db = db();
    exec(&db, "CREATE TABLE t(a INTEGER PRIMARY KEY)");
    exec(&db, "INSERT INTO t VALUES {a: 1, info: {city: 'Lyon'}}");

    let result = exec(&db, "UPDATE t SET info.city = 'Paris', seen = true");
    assert_eq!(result.rows_affected(), 1);
    assert_eq!(
        query_json(&db, "SELECT info.city, seen FROM t"),
        vec![json!({"info.city": "Paris", "seen": true})]
    );
}

#[test]
fn update_unset_removes_fields() {
    let db = db();
    exec(&db, "CREATE TABLE t(a INTEGER PRIMARY KEY)");
    exec(&db, "INSERT INTO t VALUES {a: 1, tmp: 'x', keep: 'y'}");
    exec(&db, "UPDATE t UNSET tmp");
    assert_eq!(
        query_json(&db, "SELECT * FROM t"),
        vec![json!({"a": 1, "keep": "y"})]
    );
}

#[test]
fn update_returning_and_where() {
    let db = db();
    seed_accounts(&db);
    let result = exec(
        &db,
        "UPDATE accounts SET balance = balance + 10 WHERE active = true RETURNING id, balance",
    );
    assert_eq!(result.rows_affected(), 2);
    assert_eq!(
        rows_json(&result),
        vec![
            json!({"id": 1, "balance": 160.0}),
            json!({"id": 3, "balance": 160.0}),
        ]
    );
}

#[test]
fn update_of_the_primary_key_moves_the_record() {
    let db = db();
    exec(&db, "CREATE TABLE t(a INTEGER PRIMARY KEY, b TEXT)");
    exec(&db, "INSERT INTO t(a, b) VALUES (1, 'x')");
    exec(&db, "UPDATE t SET a = 5 WHERE a = 1");
    assert_eq!(
        query_json(&db, "SELECT a, b FROM t"),
        vec![json!({"a": 5, "b": "x"})]
    );
}

#[test]
fn delete_with_filter_and_returning() {
    let db = db();
    seed_accounts(&db);
    let result = exec(&db, "DELETE FROM accounts WHERE active = false RETURNING name");
    assert_eq!(result.rows_affected(), 1);
    assert_eq!(rows_json(&result), vec![json!({"name": "bob"})]);
    assert_eq!(
        query_json(&db, "SELECT count(*) FROM accounts"),
        vec![json!({"count(*)": 2})]
    );
}

#[test]
fn mutations_keep_indexes_consistent() {
    let db = db();
    exec(&db, "CREATE TABLE t(a INTEGER PRIMARY KEY, b TEXT)");
    exec(&db, "CREATE INDEX ix ON t(b)");
    exec(&db, "INSERT INTO t(a, b) VALUES (1, 'old'), (2, 'other')");
    exec(&db, "UPDATE t SET b = 'new' WHERE a = 1");
    exec(&db, "DELETE FROM t WHERE a = 2");

    // The scan below goes through the index.
    let plan = exec(&db, "EXPLAIN SELECT a FROM t WHERE b = 'new'");
    let plan = row_json(plan.first().unwrap());
    assert!(plan["plan"].as_str().unwrap().contains("indexScan"));

    assert_eq!(
        query_json(&db, "SELECT a FROM t WHERE b = 'new'"),
        vec![json!({"a": 1})]
    );
    assert_eq!(
        query_json(&db, "SELECT a FROM t WHERE b = 'old'"),
        Vec::<serde_json::Value>::new()
    );
    assert_eq!(
        query_json(&db, "SELECT a FROM t WHERE b = 'other'"),
        Vec::<serde_json::Value>::new()
    );
}

#[test]
fn drop_and_alter_and_reindex_statements() {
    let db = db();
    exec(&db, "CREATE TABLE t(a INTEGER PRIMARY KEY)");
    exec(&db, "CREATE INDEX ix ON t(a)");
    exec(&db, "INSERT INTO t VALUES {a: 1}");

    exec(&db, "ALTER TABLE t RENAME TO u");
    assert_eq!(query_json(&db, "SELECT a FROM u"), vec![json!({"a": 1})]);
    assert!(db.exec("SELECT * FROM t", &[]).is_err());

    exec(&db, "REINDEX u");
    exec(&db, "REINDEX");

    exec(&db, "DROP INDEX ix");
    assert!(db.exec("DROP INDEX ix", &[]).is_err());
    exec(&db, "DROP INDEX IF EXISTS ix");

    exec(&db, "DROP TABLE u");
    assert!(db.exec("DROP TABLE u", &[]).is_err());
    exec(&db, "DROP TABLE IF EXISTS u");
}

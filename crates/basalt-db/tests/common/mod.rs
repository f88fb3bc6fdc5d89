use basalt_db::{Database, ResultSet};
use basalt_document::{Document, FieldBuffer, Value};
use basalt_store::MemoryStore;

pub fn db() -> Database<MemoryStore> {
    Database::new(MemoryStore::new()).unwrap()
}

pub fn exec(db: &Database<MemoryStore>, sql: &str) -> ResultSet {
    db.exec(sql, &[]).unwrap_or_else(|e| panic!("exec failed for {sql:?}: {e}"))
}

pub fn row_json(fb: &FieldBuffer) -> serde_json::Value {
    Value::Document(Document::Buf(fb.clone()))
        .to_json()
        .unwrap()
}

pub fn rows_json(result: &ResultSet) -> Vec<serde_json::Value> {
    result.rows().iter().map(row_json).collect()
}

/// Run a query and render its rows as JSON for comparison.
pub fn query_json(db: &Database<MemoryStore>, sql: &str) -> Vec<serde_json::Value> {
    rows_json(&exec(db, sql))
}

/// A table with three seeded rows used by read tests.
pub fn seed_accounts(db: &Database<MemoryStore>) {
    exec(
        db,
        "CREATE TABLE accounts (id INTEGER PRIMARY KEY, name TEXT, balance DOUBLE, active BOOL)",
    );
    exec(
        db,
        "INSERT INTO accounts (id, name, balance, active) VALUES \
         (1, 'alice', 150.0, true), \
         (2, 'bob', 40.0, false), \
         (3, 'carol', 150.0, true)",
    );
}

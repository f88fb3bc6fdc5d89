//! End-to-end walk-through starting from an empty database.

mod common;
use common::*;

use serde_json::json;

#[test]
fn end_to_end_walkthrough() {
    let db = db();

    // 1. Create, insert, point query.
    exec(&db, "CREATE TABLE t(a INTEGER PRIMARY KEY, b TEXT)");
    exec(&db, "INSERT INTO t(a, b) VALUES (1, 'x'), (2, 'y')");
    assert_eq!(
        query_json(&db, "SELECT * FROM t WHERE a = 2"),
        vec![json!({"a": 2, "b": "y"})]
    );

    // 2. Document-literal insert, descending order over a non-projected field.
    exec(&db, "INSERT INTO t VALUES {a: 3, b: 'z'}");
    assert_eq!(
        query_json(&db, "SELECT b FROM t ORDER BY a DESC"),
        vec![json!({"b": "z"}), json!({"b": "y"}), json!({"b": "x"})]
    );

    // 3. Filtered update.
    exec(&db, "UPDATE t SET b = 'Q' WHERE a >= 2");
    assert_eq!(
        query_json(&db, "SELECT a, b FROM t ORDER BY a"),
        vec![
            json!({"a": 1, "b": "x"}),
            json!({"a": 2, "b": "Q"}),
            json!({"a": 3, "b": "Q"}),
        ]
    );

    // 4. The optimizer picks the fresh index over the sequential scan.
    exec(&db, "CREATE INDEX ix ON t(b)");
    let plan = exec(&db, "EXPLAIN SELECT * FROM t WHERE b = 'Q'");
    let plan = row_json(plan.first().unwrap())["plan"].as_str().unwrap().to_string();
    assert!(plan.contains("indexScan(\"ix\""), "plan was {plan}");
    assert!(!plan.contains("seqScan"), "plan was {plan}");
    assert_eq!(
        query_json(&db, "SELECT a FROM t WHERE b = 'Q'"),
        vec![json!({"a": 2}), json!({"a": 3})]
    );

    // 5. Grouped aggregation: a % 2 splits {1, 3} and {2}.
    assert_eq!(
        query_json(&db, "SELECT count(*) FROM t GROUP BY (a % 2)"),
        vec![json!({"count(*)": 2}), json!({"count(*)": 1})]
    );

    // 6. Aggregating an emptied table still yields one row.
    exec(&db, "DELETE FROM t");
    assert_eq!(
        query_json(&db, "SELECT count(*) FROM t"),
        vec![json!({"count(*)": 0})]
    );
}

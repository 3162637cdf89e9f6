//! Nested transaction and savepoint tests

#![allow(clippy::unwrap_used)]

use crate::error::Error;
use crate::params::Param;
use crate::tests::test_utils::{connect, Vendor};

const CREATE: &str = "CREATE TABLE temptbl(intkey INTEGER, PRIMARY KEY(intkey))";

fn insert(conn: &crate::connection::Connection, key: i32) {
    conn.execute(
        "INSERT INTO temptbl(intkey) VALUES (?)",
        vec![Param::value(key)],
    )
    .unwrap();
}

#[test]
fn commit_persists_the_scope() {
    let (conn, store) = connect(Vendor::Mysql);
    conn.execute(CREATE, Vec::new()).unwrap();

    conn.begin_work().unwrap();
    insert(&conn, 1);
    insert(&conn, 2);
    conn.commit_work().unwrap();
    assert_eq!(store.lock().unwrap().row_count("temptbl"), 2);

    // Depth is back at zero, so a fresh scope starts over.
    conn.begin_work().unwrap();
    insert(&conn, 3);
    conn.rollback_work().unwrap();
    assert_eq!(store.lock().unwrap().row_count("temptbl"), 2);
}

#[test]
fn outer_rollback_discards_an_inner_commit() {
    let (conn, store) = connect(Vendor::Mysql);
    conn.execute(CREATE, Vec::new()).unwrap();

    conn.begin_work().unwrap();
    conn.begin_work().unwrap();
    insert(&conn, 1);
    // Inner commit only releases the savepoint.
    conn.commit_work().unwrap();
    conn.rollback_work().unwrap();
    assert_eq!(store.lock().unwrap().row_count("temptbl"), 0);
}

#[test]
fn inner_rollback_keeps_the_outer_scope() {
    let (conn, store) = connect(Vendor::Mysql);
    conn.execute(CREATE, Vec::new()).unwrap();

    conn.begin_work().unwrap();
    insert(&conn, 1);
    conn.begin_work().unwrap();
    insert(&conn, 2);
    conn.rollback_work().unwrap();
    conn.commit_work().unwrap();

    let store = store.lock().unwrap();
    assert_eq!(store.row_count("temptbl"), 1);
    assert!(store.tables["temptbl"]
        .rows
        .iter()
        .all(|r| r[0] == crate::tests::test_utils::Cell::Val(crate::value::Value::Int(1))));
}

#[test]
fn three_levels_rewind_independently() {
    let (conn, store) = connect(Vendor::Mysql);
    conn.execute(CREATE, Vec::new()).unwrap();

    conn.begin_work().unwrap();
    insert(&conn, 1);
    conn.begin_work().unwrap();
    insert(&conn, 2);
    conn.begin_work().unwrap();
    insert(&conn, 3);
    conn.rollback_work().unwrap(); // drops 3
    conn.commit_work().unwrap(); // keeps 2
    conn.commit_work().unwrap();
    assert_eq!(store.lock().unwrap().row_count("temptbl"), 2);
}

#[test]
fn guard_rolls_back_on_drop() {
    let (conn, store) = connect(Vendor::Mysql);
    conn.execute(CREATE, Vec::new()).unwrap();

    {
        let _tx = conn.transaction().unwrap();
        insert(&conn, 1);
    }
    assert_eq!(store.lock().unwrap().row_count("temptbl"), 0);
}

#[test]
fn guard_commit_is_explicit_and_idempotent() {
    let (conn, store) = connect(Vendor::Mysql);
    conn.execute(CREATE, Vec::new()).unwrap();

    let mut tx = conn.transaction().unwrap();
    insert(&conn, 1);
    tx.commit().unwrap();
    // A closed guard ignores further closes, including its own drop.
    tx.rollback().unwrap();
    tx.commit().unwrap();
    drop(tx);
    assert_eq!(store.lock().unwrap().row_count("temptbl"), 1);
}

/// A commit failure at depth zero leaves transaction state unknowable;
/// the connection is disconnected before the error surfaces.
#[test]
fn failed_outermost_commit_disconnects() {
    let (conn, store) = connect(Vendor::Mysql);
    conn.execute(CREATE, Vec::new()).unwrap();

    conn.begin_work().unwrap();
    insert(&conn, 1);
    store.lock().unwrap().fail_commit = true;
    let err = conn.commit_work().unwrap_err();
    assert!(err.is("40001"), "unexpected error: {err}");
    assert!(matches!(
        conn.prepare("SELECT intkey FROM temptbl"),
        Err(Error::NotConnected)
    ));
}

#[test]
fn options_ride_the_outermost_start() {
    let (conn, store) = connect(Vendor::Mysql);
    conn.execute(CREATE, Vec::new()).unwrap();

    conn.begin_work_with_options("READ ONLY").unwrap();
    conn.rollback_work().unwrap();
    // The memory driver treats trailing options as decoration; the scope
    // itself must still have opened and closed cleanly.
    assert!(store.lock().unwrap().autocommit);
    conn.begin_work().unwrap();
    insert(&conn, 1);
    conn.commit_work().unwrap();
    assert_eq!(store.lock().unwrap().row_count("temptbl"), 1);
}

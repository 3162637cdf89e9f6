//! Blob streaming tests, both directions

#![allow(clippy::unwrap_used)]

use std::cell::{Cell as StdCell, RefCell};
use std::rc::Rc;

use crate::blob::{BlobKind, BlobSink, FetchBlob, InsertBlob, ReadSource};
use crate::connection::Connection;
use crate::error::Error;
use crate::fetch::FetchType;
use crate::params::Param;
use crate::tests::test_utils::{connect, Vendor};
use crate::value::Value;

/// Accumulates one row's chunks; finish hands the row to the shared log.
struct CollectSink {
    buf: Vec<u8>,
    rows: Rc<RefCell<Vec<Vec<u8>>>>,
    finishes: Rc<StdCell<usize>>,
}

impl BlobSink for CollectSink {
    fn chunk(&mut self, data: &[u8]) -> crate::error::Result<()> {
        self.buf.extend_from_slice(data);
        Ok(())
    }

    fn finish(self: Box<Self>) -> crate::error::Result<()> {
        self.rows.borrow_mut().push(self.buf);
        self.finishes.set(self.finishes.get() + 1);
        Ok(())
    }
}

struct Collector {
    rows: Rc<RefCell<Vec<Vec<u8>>>>,
    finishes: Rc<StdCell<usize>>,
}

impl Collector {
    fn new() -> Self {
        Collector {
            rows: Rc::new(RefCell::new(Vec::new())),
            finishes: Rc::new(StdCell::new(0)),
        }
    }

    fn fetch_blob(&self, kind: BlobKind) -> FetchBlob {
        let rows = Rc::clone(&self.rows);
        let finishes = Rc::clone(&self.finishes);
        FetchBlob::new(kind, move |_row| {
            Ok(Box::new(CollectSink {
                buf: Vec::new(),
                rows: Rc::clone(&rows),
                finishes: Rc::clone(&finishes),
            }))
        })
    }
}

fn blob_table(conn: &Connection) {
    conn.execute(
        "CREATE TABLE blobs(id INTEGER, payload BLOB, PRIMARY KEY(id))",
        Vec::new(),
    )
    .unwrap();
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn fetch_payloads(conn: &Connection, kind: BlobKind) -> (Vec<Vec<u8>>, usize) {
    let collector = Collector::new();
    let mut stmt = conn
        .execute("SELECT id, payload FROM blobs ORDER BY id", Vec::new())
        .unwrap();
    stmt.clear_binds(1).unwrap();
    stmt.bind("id", FetchType::Int).unwrap();
    stmt.bind_blob("payload", collector.fetch_blob(kind)).unwrap();
    stmt.fetch_all(|_, _| Ok(())).unwrap();
    drop(stmt);
    let rows = collector.rows.borrow().clone();
    (rows, collector.finishes.get())
}

/// A payload larger than the 4 KiB chunk crosses several put_data and
/// get_data round trips in each direction.
#[test]
fn binary_round_trip_in_chunks() {
    let (conn, _) = connect(Vendor::Mysql);
    blob_table(&conn);
    let data = payload(10_000);
    conn.execute(
        "INSERT INTO blobs(id, payload) VALUES (?, ?)",
        vec![
            Param::value(1),
            Param::from(InsertBlob::from_bytes(BlobKind::Binary, data.clone())),
        ],
    )
    .unwrap();

    let (rows, finishes) = fetch_payloads(&conn, BlobKind::Binary);
    assert_eq!(rows, vec![data]);
    assert_eq!(finishes, 1);
}

#[test]
fn character_round_trip_loses_nothing_to_terminators() {
    let (conn, _) = connect(Vendor::Mysql);
    blob_table(&conn);
    let text: String = "abcdefgh".chars().cycle().take(9_000).collect();
    conn.execute(
        "INSERT INTO blobs(id, payload) VALUES (?, ?)",
        vec![
            Param::value(1),
            Param::from(InsertBlob::from_bytes(
                BlobKind::Character,
                text.clone().into_bytes(),
            )),
        ],
    )
    .unwrap();

    let (rows, finishes) = fetch_payloads(&conn, BlobKind::Character);
    assert_eq!(finishes, 1);
    assert_eq!(String::from_utf8(rows[0].clone()).unwrap(), text);
}

#[test]
fn unknown_length_source_uses_chunked_at_exec() {
    let (conn, _) = connect(Vendor::Mysql);
    blob_table(&conn);
    let data = payload(6_000);
    let mut blob = InsertBlob::new(BlobKind::Binary);
    blob.push_reader(ReadSource(std::io::Cursor::new(data.clone())));
    conn.execute(
        "INSERT INTO blobs(id, payload) VALUES (?, ?)",
        vec![Param::value(1), Param::from(blob)],
    )
    .unwrap();

    let (rows, _) = fetch_payloads(&conn, BlobKind::Binary);
    assert_eq!(rows, vec![data]);
}

/// NULL rows are skipped by the at-exec conversation on the way in and
/// never materialize a sink on the way out.
#[test]
fn null_rows_skip_the_conversation_entirely() {
    let (conn, store) = connect(Vendor::Mysql);
    blob_table(&conn);
    let mut blob = InsertBlob::new(BlobKind::Binary);
    blob.push_bytes(payload(5_000));
    blob.push_null();
    blob.push_bytes(payload(100));
    let (_, statuses) = conn
        .execute_vector(
            "INSERT INTO blobs(id, payload) VALUES (?, ?)",
            3,
            vec![Param::vector([1, 2, 3]), Param::from(blob)],
        )
        .unwrap();
    assert_eq!(statuses, vec![1, 1, 1]);
    assert_eq!(store.lock().unwrap().row_count("blobs"), 3);

    let (rows, finishes) = fetch_payloads(&conn, BlobKind::Binary);
    assert_eq!(finishes, 2);
    assert_eq!(rows, vec![payload(5_000), payload(100)]);
}

#[test]
fn empty_blob_still_closes_its_row() {
    let (conn, _) = connect(Vendor::Mysql);
    blob_table(&conn);
    conn.execute(
        "INSERT INTO blobs(id, payload) VALUES (?, ?)",
        vec![
            Param::value(1),
            Param::from(InsertBlob::from_bytes(BlobKind::Binary, Vec::new())),
        ],
    )
    .unwrap();

    let (rows, finishes) = fetch_payloads(&conn, BlobKind::Binary);
    assert_eq!(rows, vec![Vec::<u8>::new()]);
    assert_eq!(finishes, 1);
}

#[test]
fn declared_length_past_the_indicator_range_is_rejected() {
    let (conn, _) = connect(Vendor::Mysql);
    blob_table(&conn);
    let mut blob = InsertBlob::new(BlobKind::Binary);
    blob.push_sized_reader(
        ReadSource(std::io::Cursor::new(Vec::new())),
        isize::MAX as usize / 2 + 1,
    );
    let err = conn
        .execute(
            "INSERT INTO blobs(id, payload) VALUES (?, ?)",
            vec![Param::value(1), Param::from(blob)],
        )
        .unwrap_err();
    assert!(matches!(err, Error::BlobTooLarge { .. }));
}

/// Two blob parameters in one row interleave their at-exec tokens.
#[test]
fn multiple_blob_parameters_in_one_execute() {
    let (conn, _) = connect(Vendor::Mysql);
    conn.execute(
        "CREATE TABLE pairs(id INTEGER, left_part BLOB, right_part BLOB)",
        Vec::new(),
    )
    .unwrap();
    let left = payload(4_200);
    let right = payload(300);
    conn.execute(
        "INSERT INTO pairs(id, left_part, right_part) VALUES (?, ?, ?)",
        vec![
            Param::value(1),
            Param::from(InsertBlob::from_bytes(BlobKind::Binary, left.clone())),
            Param::from(InsertBlob::from_bytes(BlobKind::Binary, right.clone())),
        ],
    )
    .unwrap();

    let collector = Collector::new();
    let mut stmt = conn
        .execute("SELECT left_part, right_part FROM pairs", Vec::new())
        .unwrap();
    stmt.clear_binds(1).unwrap();
    stmt.bind_blob("left_part", collector.fetch_blob(BlobKind::Binary))
        .unwrap();
    stmt.bind_blob("right_part", collector.fetch_blob(BlobKind::Binary))
        .unwrap();
    assert_eq!(stmt.fetch().unwrap(), 1);
    assert_eq!(*collector.rows.borrow(), vec![left, right]);
}

#[test]
fn blob_bindings_have_no_buffered_values() {
    let (conn, _) = connect(Vendor::Mysql);
    blob_table(&conn);
    conn.execute(
        "INSERT INTO blobs(id, payload) VALUES (?, ?)",
        vec![
            Param::value(1),
            Param::from(InsertBlob::from_bytes(BlobKind::Binary, payload(8))),
        ],
    )
    .unwrap();
    let collector = Collector::new();
    let mut stmt = conn
        .execute("SELECT payload FROM blobs", Vec::new())
        .unwrap();
    stmt.clear_binds(1).unwrap();
    let binding = stmt
        .bind_blob("payload", collector.fetch_blob(BlobKind::Binary))
        .unwrap();
    stmt.fetch().unwrap();
    assert!(matches!(
        stmt.column_values(binding),
        Err(Error::Protocol { .. })
    ));
}

#[test]
fn fetched_null_blob_produces_no_sink() {
    let (conn, _) = connect(Vendor::Mysql);
    blob_table(&conn);
    conn.execute(
        "INSERT INTO blobs(id, payload) VALUES (?, ?)",
        vec![Param::value(1), Param::Value(Value::Null)],
    )
    .unwrap();
    let (rows, finishes) = fetch_payloads(&conn, BlobKind::Binary);
    assert!(rows.is_empty());
    assert_eq!(finishes, 0);
}

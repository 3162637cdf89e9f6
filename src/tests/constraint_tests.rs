//! Constraint AST rendering tests

#![allow(clippy::unwrap_used)]

use crate::constraint::Constraint;
use crate::error::Error;
use crate::value::Value;

fn render(c: &Constraint) -> (String, Vec<Value>) {
    let mut sql = String::new();
    c.render_sql(&mut sql);
    let mut params = Vec::new();
    c.parameters(&mut params);
    (sql, params)
}

#[test]
fn compare_renders_a_placeholder() {
    let (sql, params) = render(&Constraint::cmp("age", ">", 21));
    assert_eq!(sql, "age > ?");
    assert_eq!(params, vec![Value::Int(21)]);
}

#[test]
fn null_equality_rewrites_to_is_null() {
    let (sql, params) = render(&Constraint::cmp("name", "=", Value::Null));
    assert_eq!(sql, "(name IS NULL)");
    assert!(params.is_empty());

    let (sql, params) = render(&Constraint::cmp("name", "!=", Value::Null));
    assert_eq!(sql, "(name IS NOT NULL)");
    assert!(params.is_empty());
}

/// Ordering against NULL has no sensible answer; the rendering is the
/// always-false literal rather than an error.
#[test]
fn null_ordering_renders_always_false() {
    let (sql, params) = render(&Constraint::cmp("age", "<", Value::Null));
    assert_eq!(sql, "1=0");
    assert!(params.is_empty());
}

#[test]
fn list_renders_in_with_one_placeholder_per_value() {
    let c = Constraint::list("id", "=", [1, 2, 3]).unwrap();
    let (sql, params) = render(&c);
    assert_eq!(sql, "id IN (?, ?, ?)");
    assert_eq!(
        params,
        vec![Value::Int(1), Value::Int(2), Value::Int(3)]
    );

    let c = Constraint::list("id", "!=", [7]).unwrap();
    let (sql, _) = render(&c);
    assert_eq!(sql, "id NOT IN (?)");
}

#[test]
fn empty_list_collapses_to_a_literal() {
    let (sql, params) = render(&Constraint::list("id", "=", Vec::<i32>::new()).unwrap());
    assert_eq!(sql, "1=0");
    assert!(params.is_empty());

    let (sql, _) = render(&Constraint::list("id", "!=", Vec::<i32>::new()).unwrap());
    assert_eq!(sql, "id IS NOT NULL");
}

#[test]
fn list_rejects_ordering_operators() {
    assert!(matches!(
        Constraint::list("id", "<", [1]),
        Err(Error::InvalidListOperator { .. })
    ));
}

#[test]
fn containers_render_parenthesized() {
    let c = Constraint::and([
        Constraint::cmp("a", "=", 1),
        Constraint::cmp("b", "!=", 2),
    ]);
    let (sql, params) = render(&c);
    assert_eq!(sql, "(a = ? AND b != ?)");
    assert_eq!(params, vec![Value::Int(1), Value::Int(2)]);

    let c = Constraint::or([Constraint::cmp("a", "=", 1), Constraint::cmp("b", "=", 2)]);
    let (sql, _) = render(&c);
    assert_eq!(sql, "(a = ? OR b = ?)");
}

#[test]
fn empty_containers_have_fixed_renderings() {
    let (sql, _) = render(&Constraint::and([]));
    assert_eq!(sql, "(1=1)");
    let (sql, _) = render(&Constraint::or([]));
    assert_eq!(sql, "1=0");
    let (sql, _) = render(&Constraint::not([]));
    assert_eq!(sql, "NOT (1=1)");
}

#[test]
fn not_negates_an_and_container() {
    let c = Constraint::not([
        Constraint::cmp("a", "=", 1),
        Constraint::cmp("b", "=", 2),
    ]);
    let (sql, _) = render(&c);
    assert_eq!(sql, "NOT (a = ? AND b = ?)");
}

#[test]
fn raw_fragment_renders_verbatim_with_its_params() {
    let c = Constraint::raw("id", "=", "LAST_INSERT_ID()", []);
    let (sql, params) = render(&c);
    assert_eq!(sql, "id = LAST_INSERT_ID()");
    assert!(params.is_empty());

    let c = Constraint::raw(
        "id",
        "=",
        "currval(pg_get_serial_sequence(?, ?))",
        [Value::Text("t".into()), Value::Text("id".into())],
    );
    let (sql, params) = render(&c);
    assert_eq!(sql, "id = currval(pg_get_serial_sequence(?, ?))");
    assert_eq!(params.len(), 2);
}

/// Parameter enumeration tracks rendered placeholder order through nesting.
#[test]
fn parameters_follow_placeholder_order() {
    let c = Constraint::and([
        Constraint::cmp("a", "=", 1),
        Constraint::or([
            Constraint::list("b", "=", [2, 3]).unwrap(),
            Constraint::cmp("c", "=", Value::Null),
        ]),
        Constraint::cmp("d", "!=", 4),
    ]);
    let (sql, params) = render(&c);
    assert_eq!(sql, "(a = ? AND (b IN (?, ?) OR (c IS NULL)) AND d != ?)");
    assert_eq!(
        params,
        vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]
    );
    assert_eq!(sql.matches('?').count(), params.len());
}

#[test]
fn assignments_from_equality_tree() {
    let c = Constraint::and([
        Constraint::cmp("name", "=", "alice"),
        Constraint::cmp("age", "=", Value::Null),
        Constraint::raw("id", "=", "LAST_INSERT_ID()", []),
    ]);
    let mut list = Vec::new();
    c.assignments(&mut list).unwrap();
    assert_eq!(list.len(), 3);

    assert_eq!(list[0].field, "name");
    assert_eq!(list[0].placeholder, "?");
    assert_eq!(list[0].params, vec![Value::Text("alice".into())]);

    // NULL assignments still travel as a bound parameter.
    assert_eq!(list[1].placeholder, "?");
    assert_eq!(list[1].params, vec![Value::Null]);

    // Raw assignments put their fragment where the placeholder goes.
    assert_eq!(list[2].placeholder, "LAST_INSERT_ID()");
    assert!(list[2].params.is_empty());
}

#[test]
fn assignments_reject_non_equality_shapes() {
    let mut list = Vec::new();
    assert!(matches!(
        Constraint::cmp("a", "!=", 1).assignments(&mut list),
        Err(Error::OnlyEqualityAllowed { .. })
    ));
    assert!(matches!(
        Constraint::list("a", "=", [1]).unwrap().assignments(&mut list),
        Err(Error::OnlyEqualityAllowed { .. })
    ));
    assert!(matches!(
        Constraint::or([]).assignments(&mut list),
        Err(Error::OnlyEqualityAllowed { .. })
    ));
}

#[test]
fn all_eq_builds_the_common_shape() {
    let c = Constraint::all_eq([("a", 1), ("b", 2)]);
    let (sql, params) = render(&c);
    assert_eq!(sql, "(a = ? AND b = ?)");
    assert_eq!(params, vec![Value::Int(1), Value::Int(2)]);
}

/// Constraint AST
///
/// Composable predicate nodes that render to parameterized SQL text and,
/// independently, enumerate their bound values in exactly the order the
/// rendered text emits placeholders. Containers keep those two traversals
/// in lockstep, which is what makes strictly positional placeholders safe.
///
/// Comparisons against NULL never produce a placeholder: `=` and `!=`
/// rewrite to `IS NULL` / `IS NOT NULL`, and any other operator renders the
/// always-false literal `1=0`. This is a documented policy that keeps
/// predicate composition total rather than an error.
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::value::Value;

/// One node of the predicate tree. Nodes are immutable once built and
/// cheap to share across repeated executions.
#[derive(Debug, Clone)]
pub struct Constraint(Arc<Node>);

#[derive(Debug)]
enum Node {
    /// `name op ?`, with the NULL rewrites described above.
    Compare {
        name: String,
        operator: String,
        value: Value,
    },
    /// `name IN (?, …)` / `name NOT IN (?, …)` over an ordered value list.
    In {
        name: String,
        negated: bool,
        values: Vec<Value>,
    },
    /// `name op <fragment>` where the fragment is pre-escaped SQL that may
    /// itself contain placeholders, fed by `params` in fragment order.
    Raw {
        name: String,
        operator: String,
        sql: String,
        params: Vec<Value>,
    },
    And(Vec<Constraint>),
    Or(Vec<Constraint>),
    /// `NOT` of an AND container over the children.
    Not(Vec<Constraint>),
}

/// One `field = placeholder` pair produced by assignment-style rendering,
/// used by INSERT and UPDATE assembly.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub field: String,
    pub placeholder: String,
    pub params: Vec<Value>,
}

impl Constraint {
    /// Field comparison. `Value::Null` engages the NULL rewrite policy.
    pub fn cmp(name: impl Into<String>, operator: impl Into<String>, value: impl Into<Value>) -> Self {
        Constraint(Arc::new(Node::Compare {
            name: name.into(),
            operator: operator.into(),
            value: value.into(),
        }))
    }

    /// List membership. Only `=` and `!=` are meaningful for a value list.
    pub fn list<V: Into<Value>>(
        name: impl Into<String>,
        operator: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Result<Self> {
        let negated = match operator {
            "=" => false,
            "!=" => true,
            other => {
                return Err(Error::InvalidListOperator {
                    operator: other.to_string(),
                })
            }
        };
        Ok(Constraint(Arc::new(Node::In {
            name: name.into(),
            negated,
            values: values.into_iter().map(Into::into).collect(),
        })))
    }

    /// Raw pre-escaped SQL fragment with its embedded parameter values.
    pub fn raw(
        name: impl Into<String>,
        operator: impl Into<String>,
        sql: impl Into<String>,
        params: impl IntoIterator<Item = Value>,
    ) -> Self {
        Constraint(Arc::new(Node::Raw {
            name: name.into(),
            operator: operator.into(),
            sql: sql.into(),
            params: params.into_iter().collect(),
        }))
    }

    pub fn and(children: impl IntoIterator<Item = Constraint>) -> Self {
        Constraint(Arc::new(Node::And(children.into_iter().collect())))
    }

    pub fn or(children: impl IntoIterator<Item = Constraint>) -> Self {
        Constraint(Arc::new(Node::Or(children.into_iter().collect())))
    }

    pub fn not(children: impl IntoIterator<Item = Constraint>) -> Self {
        Constraint(Arc::new(Node::Not(children.into_iter().collect())))
    }

    /// WHERE-clause rendering.
    pub fn render_sql(&self, out: &mut String) {
        match &*self.0 {
            Node::Compare {
                name,
                operator,
                value,
            } => {
                if value.is_null() {
                    match operator.as_str() {
                        "=" => {
                            out.push('(');
                            out.push_str(name);
                            out.push_str(" IS NULL)");
                        }
                        "!=" => {
                            out.push('(');
                            out.push_str(name);
                            out.push_str(" IS NOT NULL)");
                        }
                        _ => out.push_str("1=0"),
                    }
                } else {
                    out.push_str(name);
                    out.push(' ');
                    out.push_str(operator);
                    out.push_str(" ?");
                }
            }
            Node::In {
                name,
                negated,
                values,
            } => {
                if values.is_empty() {
                    if *negated {
                        out.push_str(name);
                        out.push_str(" IS NOT NULL");
                    } else {
                        out.push_str("1=0");
                    }
                    return;
                }
                out.push_str(name);
                out.push_str(if *negated { " NOT IN " } else { " IN " });
                let mut sep = "(";
                for _ in values {
                    out.push_str(sep);
                    out.push('?');
                    sep = ", ";
                }
                out.push(')');
            }
            Node::Raw {
                name,
                operator,
                sql,
                ..
            } => {
                out.push_str(name);
                out.push(' ');
                out.push_str(operator);
                out.push(' ');
                out.push_str(sql);
            }
            Node::And(children) => render_container(out, children, " AND ", "(1=1)"),
            Node::Or(children) => render_container(out, children, " OR ", "1=0"),
            Node::Not(children) => {
                out.push_str("NOT ");
                render_container(out, children, " AND ", "(1=1)");
            }
        }
    }

    /// Enumerate bound values in rendered-placeholder order.
    pub fn parameters(&self, out: &mut Vec<Value>) {
        match &*self.0 {
            Node::Compare { value, .. } => {
                if !value.is_null() {
                    out.push(value.clone());
                }
            }
            Node::In { values, .. } => out.extend(values.iter().cloned()),
            Node::Raw { params, .. } => out.extend(params.iter().cloned()),
            Node::And(children) | Node::Or(children) | Node::Not(children) => {
                for c in children {
                    c.parameters(out);
                }
            }
        }
    }

    /// Assignment-style rendering for INSERT/UPDATE. Only `=` comparisons
    /// can become assignments; anything else is a caller error.
    pub fn assignments(&self, out: &mut Vec<Assignment>) -> Result<()> {
        match &*self.0 {
            Node::Compare {
                name,
                operator,
                value,
            } => {
                if operator != "=" {
                    return Err(Error::OnlyEqualityAllowed {
                        operator: operator.clone(),
                    });
                }
                out.push(Assignment {
                    field: name.clone(),
                    placeholder: "?".to_string(),
                    params: if value.is_null() {
                        vec![Value::Null]
                    } else {
                        vec![value.clone()]
                    },
                });
            }
            Node::Raw {
                name,
                operator,
                sql,
                params,
            } => {
                if operator != "=" {
                    return Err(Error::OnlyEqualityAllowed {
                        operator: operator.clone(),
                    });
                }
                out.push(Assignment {
                    field: name.clone(),
                    placeholder: sql.clone(),
                    params: params.clone(),
                });
            }
            Node::And(children) => {
                for c in children {
                    c.assignments(out)?;
                }
            }
            Node::In { .. } | Node::Or(_) | Node::Not(_) => {
                return Err(Error::OnlyEqualityAllowed {
                    operator: "non-assignment constraint".to_string(),
                })
            }
        }
        Ok(())
    }

    /// Convenience for the common `AND(name = value, …)` shape.
    pub fn all_eq<N: Into<String>, V: Into<Value>>(
        pairs: impl IntoIterator<Item = (N, V)>,
    ) -> Self {
        Constraint::and(
            pairs
                .into_iter()
                .map(|(n, v)| Constraint::cmp(n, "=", v)),
        )
    }
}

fn render_container(out: &mut String, children: &[Constraint], join: &str, empty: &str) {
    if children.is_empty() {
        out.push_str(empty);
        return;
    }
    let mut sep = "(";
    for c in children {
        out.push_str(sep);
        sep = join;
        c.render_sql(out);
    }
    out.push(')');
}

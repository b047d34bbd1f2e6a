//! Structured metadata filters.
//!
//! A [`Filter`] is a closed tree of predicate nodes over record fields,
//! addressed by declared field name. Providers translate it into their
//! native filter representation by implementing [`FilterVisitor`]; every
//! node a provider cannot translate falls through to a default method that
//! returns `OperatorNotSupported`, so an unsupported clause is never dropped.

use std::fmt;

use crate::{Error, Value};

/// A boolean filter tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    Eq { field: String, value: Value },
    Ne { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    NotIn { field: String, values: Vec<Value> },
    Range {
        field: String,
        op: RangeOp,
        value: Value,
    },
    /// SQL-style pattern: `%` matches any run, `_` any single character.
    Like { field: String, pattern: String },
    /// Substring of a string field, or element of an array field.
    Contains { field: String, value: Value },
    /// Field is present and not null.
    Exists { field: String },
    Not(Box<Filter>),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RangeOp {
    Gt,
    Ge,
    Lt,
    Le,
}

/// Node kinds, for capability declarations and error messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    In,
    NotIn,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
    Contains,
    Exists,
    Not,
    And,
    Or,
}

impl Operator {
    pub const ALL: &'static [Operator] = &[
        Operator::Eq,
        Operator::Ne,
        Operator::In,
        Operator::NotIn,
        Operator::Gt,
        Operator::Ge,
        Operator::Lt,
        Operator::Le,
        Operator::Like,
        Operator::Contains,
        Operator::Exists,
        Operator::Not,
        Operator::And,
        Operator::Or,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::In => "in",
            Operator::NotIn => "not_in",
            Operator::Gt => "gt",
            Operator::Ge => "ge",
            Operator::Lt => "lt",
            Operator::Le => "le",
            Operator::Like => "like",
            Operator::Contains => "contains",
            Operator::Exists => "exists",
            Operator::Not => "not",
            Operator::And => "and",
            Operator::Or => "or",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl RangeOp {
    pub fn operator(&self) -> Operator {
        match self {
            RangeOp::Gt => Operator::Gt,
            RangeOp::Ge => Operator::Ge,
            RangeOp::Lt => Operator::Lt,
            RangeOp::Le => Operator::Le,
        }
    }

    /// Whether `ordering` (field compared to bound) satisfies this op.
    pub fn holds(&self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            RangeOp::Gt => ordering == Greater,
            RangeOp::Ge => ordering != Less,
            RangeOp::Lt => ordering == Less,
            RangeOp::Le => ordering != Greater,
        }
    }
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Ne {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn is_in<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Filter::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn not_in<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Filter::NotIn {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn range(field: impl Into<String>, op: RangeOp, value: impl Into<Value>) -> Self {
        Filter::Range {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::range(field, RangeOp::Gt, value)
    }

    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::range(field, RangeOp::Ge, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::range(field, RangeOp::Lt, value)
    }

    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::range(field, RangeOp::Le, value)
    }

    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Filter::Like {
            field: field.into(),
            pattern: pattern.into(),
        }
    }

    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Contains {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn exists(field: impl Into<String>) -> Self {
        Filter::Exists {
            field: field.into(),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: Filter) -> Self {
        Filter::Not(Box::new(inner))
    }

    pub fn and(children: impl IntoIterator<Item = Filter>) -> Self {
        Filter::And(children.into_iter().collect())
    }

    pub fn or(children: impl IntoIterator<Item = Filter>) -> Self {
        Filter::Or(children.into_iter().collect())
    }

    pub fn operator(&self) -> Operator {
        match self {
            Filter::Eq { .. } => Operator::Eq,
            Filter::Ne { .. } => Operator::Ne,
            Filter::In { .. } => Operator::In,
            Filter::NotIn { .. } => Operator::NotIn,
            Filter::Range { op, .. } => op.operator(),
            Filter::Like { .. } => Operator::Like,
            Filter::Contains { .. } => Operator::Contains,
            Filter::Exists { .. } => Operator::Exists,
            Filter::Not(_) => Operator::Not,
            Filter::And(_) => Operator::And,
            Filter::Or(_) => Operator::Or,
        }
    }

    /// Every field name referenced anywhere in the tree.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Filter::Eq { field, .. }
            | Filter::Ne { field, .. }
            | Filter::In { field, .. }
            | Filter::NotIn { field, .. }
            | Filter::Range { field, .. }
            | Filter::Like { field, .. }
            | Filter::Contains { field, .. }
            | Filter::Exists { field } => out.push(field),
            Filter::Not(inner) => inner.collect_fields(out),
            Filter::And(children) | Filter::Or(children) => {
                for child in children {
                    child.collect_fields(out);
                }
            }
        }
    }

    /// Structural checks that hold for every provider.
    pub fn validate(&self) -> Result<(), Error> {
        match self {
            Filter::Eq { field, .. }
            | Filter::Ne { field, .. }
            | Filter::Like { field, .. }
            | Filter::Contains { field, .. }
            | Filter::Exists { field } => check_field(field),
            Filter::In { field, values } | Filter::NotIn { field, values } => {
                check_field(field)?;
                if values.is_empty() {
                    return Err(Error::invalid_query(format!(
                        "{} on '{}' needs at least one value",
                        self.operator(),
                        field
                    )));
                }
                Ok(())
            }
            Filter::Range { field, value, .. } => {
                check_field(field)?;
                match value {
                    Value::Null | Value::Array(_) | Value::Map(_) => Err(Error::invalid_query(
                        format!("range bound on '{}' must be a scalar", field),
                    )),
                    _ => Ok(()),
                }
            }
            Filter::Not(inner) => inner.validate(),
            Filter::And(children) | Filter::Or(children) => {
                if children.is_empty() {
                    return Err(Error::invalid_query(format!(
                        "{} needs at least one clause",
                        self.operator()
                    )));
                }
                children.iter().try_for_each(Filter::validate)
            }
        }
    }

    /// Walk the tree bottom-up with a visitor.
    pub fn accept<V: FilterVisitor + ?Sized>(&self, visitor: &mut V) -> Result<V::Output, Error> {
        match self {
            Filter::Eq { field, value } => visitor.visit_eq(field, value),
            Filter::Ne { field, value } => visitor.visit_ne(field, value),
            Filter::In { field, values } => visitor.visit_in(field, values),
            Filter::NotIn { field, values } => visitor.visit_not_in(field, values),
            Filter::Range { field, op, value } => visitor.visit_range(field, *op, value),
            Filter::Like { field, pattern } => visitor.visit_like(field, pattern),
            Filter::Contains { field, value } => visitor.visit_contains(field, value),
            Filter::Exists { field } => visitor.visit_exists(field),
            Filter::Not(inner) => {
                let inner = inner.accept(visitor)?;
                visitor.visit_not(inner)
            }
            Filter::And(children) => {
                let children = children
                    .iter()
                    .map(|c| c.accept(visitor))
                    .collect::<Result<Vec<_>, _>>()?;
                visitor.visit_and(children)
            }
            Filter::Or(children) => {
                let children = children
                    .iter()
                    .map(|c| c.accept(visitor))
                    .collect::<Result<Vec<_>, _>>()?;
                visitor.visit_or(children)
            }
        }
    }
}

fn check_field(field: &str) -> Result<(), Error> {
    if field.is_empty() {
        return Err(Error::invalid_query("filter field name is empty"));
    }
    Ok(())
}

/// Translates a [`Filter`] into a provider-native representation.
///
/// Implement the node kinds the backend can express. The defaults reject the
/// node with `OperatorNotSupported`.
pub trait FilterVisitor {
    type Output;

    fn visit_eq(&mut self, _field: &str, _value: &Value) -> Result<Self::Output, Error> {
        Err(Error::operator_not_supported(Operator::Eq.name()))
    }

    fn visit_ne(&mut self, _field: &str, _value: &Value) -> Result<Self::Output, Error> {
        Err(Error::operator_not_supported(Operator::Ne.name()))
    }

    fn visit_in(&mut self, _field: &str, _values: &[Value]) -> Result<Self::Output, Error> {
        Err(Error::operator_not_supported(Operator::In.name()))
    }

    fn visit_not_in(&mut self, _field: &str, _values: &[Value]) -> Result<Self::Output, Error> {
        Err(Error::operator_not_supported(Operator::NotIn.name()))
    }

    fn visit_range(
        &mut self,
        _field: &str,
        op: RangeOp,
        _value: &Value,
    ) -> Result<Self::Output, Error> {
        Err(Error::operator_not_supported(op.operator().name()))
    }

    fn visit_like(&mut self, _field: &str, _pattern: &str) -> Result<Self::Output, Error> {
        Err(Error::operator_not_supported(Operator::Like.name()))
    }

    fn visit_contains(&mut self, _field: &str, _value: &Value) -> Result<Self::Output, Error> {
        Err(Error::operator_not_supported(Operator::Contains.name()))
    }

    fn visit_exists(&mut self, _field: &str) -> Result<Self::Output, Error> {
        Err(Error::operator_not_supported(Operator::Exists.name()))
    }

    fn visit_not(&mut self, _inner: Self::Output) -> Result<Self::Output, Error> {
        Err(Error::operator_not_supported(Operator::Not.name()))
    }

    fn visit_and(&mut self, _children: Vec<Self::Output>) -> Result<Self::Output, Error> {
        Err(Error::operator_not_supported(Operator::And.name()))
    }

    fn visit_or(&mut self, _children: Vec<Self::Output>) -> Result<Self::Output, Error> {
        Err(Error::operator_not_supported(Operator::Or.name()))
    }
}

/// SQL `LIKE` matching: `%` is any run of characters, `_` exactly one.
pub fn like_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    // Greedy match with backtracking to the last '%'.
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '%')
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Renders only equality and conjunction, like a key-value tag filter.
    struct TagVisitor;

    impl FilterVisitor for TagVisitor {
        type Output = String;

        fn visit_eq(&mut self, field: &str, value: &Value) -> Result<String, Error> {
            Ok(format!("{}={:?}", field, value))
        }

        fn visit_and(&mut self, children: Vec<String>) -> Result<String, Error> {
            Ok(children.join("&"))
        }
    }

    #[test]
    fn visitor_translates_supported_nodes() {
        let filter = Filter::and([Filter::eq("kind", "doc"), Filter::eq("year", 2024)]);
        let out = filter.accept(&mut TagVisitor).unwrap();
        assert_eq!(out, "kind=String(\"doc\")&year=Integer(2024)");
    }

    #[test]
    fn unsupported_node_fails_fast() {
        let filter = Filter::and([Filter::eq("kind", "doc"), Filter::gt("year", 2020)]);
        let err = filter.accept(&mut TagVisitor).unwrap_err();
        match err {
            Error::OperatorNotSupported { operator } => assert_eq!(operator, "gt"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn validate_rejects_empty_clauses() {
        assert!(Filter::And(vec![]).validate().is_err());
        assert!(Filter::is_in("x", Vec::<Value>::new()).validate().is_err());
        assert!(Filter::eq("", 1).validate().is_err());
        assert!(Filter::range("x", RangeOp::Lt, Value::Null).validate().is_err());
        assert!(Filter::or([Filter::exists("x"), Filter::like("y", "a%")])
            .validate()
            .is_ok());
    }

    #[test]
    fn fields_collects_nested_names() {
        let filter = Filter::or([
            Filter::eq("a", 1),
            Filter::not(Filter::and([Filter::exists("b"), Filter::lt("c", 3)])),
        ]);
        assert_eq!(filter.fields(), vec!["a", "b", "c"]);
    }

    #[test]
    fn like_patterns() {
        assert!(like_match("abc", "abc"));
        assert!(like_match("a%", "abc"));
        assert!(like_match("%c", "abc"));
        assert!(like_match("a_c", "abc"));
        assert!(like_match("%b%", "abc"));
        assert!(like_match("%", ""));
        assert!(!like_match("a_", "abc"));
        assert!(!like_match("b%", "abc"));
        assert!(like_match("a%c%e", "abxcyce"));
    }

    #[test]
    fn range_op_holds() {
        use std::cmp::Ordering;
        assert!(RangeOp::Ge.holds(Ordering::Equal));
        assert!(!RangeOp::Gt.holds(Ordering::Equal));
        assert!(RangeOp::Lt.holds(Ordering::Less));
        assert!(!RangeOp::Le.holds(Ordering::Greater));
    }
}

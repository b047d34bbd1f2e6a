//! Declarative relational statements.
//!
//! Statements name fields by their declared names and refer to values through
//! named parameters. Binding a statement against a [`Spec`] and a parameter
//! map validates every reference, swaps field names for storage columns and
//! inlines the parameter values; executors only ever see bound statements.

use std::collections::BTreeMap;

use crate::{Error, FieldKind, Spec, Value};

/// Named statement parameters.
pub type Params = BTreeMap<String, Value>;

/// A relational row, keyed by column.
pub type Row = BTreeMap<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
    /// The parameter must be an array.
    In,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Compare {
        field: String,
        op: CompareOp,
        param: String,
    },
    IsNull {
        field: String,
    },
    IsNotNull {
        field: String,
    },
    All(Vec<Condition>),
    Any(Vec<Condition>),
}

impl Condition {
    pub fn compare(field: impl Into<String>, op: CompareOp, param: impl Into<String>) -> Self {
        Condition::Compare {
            field: field.into(),
            op,
            param: param.into(),
        }
    }

    pub fn eq(field: impl Into<String>, param: impl Into<String>) -> Self {
        Self::compare(field, CompareOp::Eq, param)
    }

    pub fn ne(field: impl Into<String>, param: impl Into<String>) -> Self {
        Self::compare(field, CompareOp::Ne, param)
    }

    pub fn gt(field: impl Into<String>, param: impl Into<String>) -> Self {
        Self::compare(field, CompareOp::Gt, param)
    }

    pub fn ge(field: impl Into<String>, param: impl Into<String>) -> Self {
        Self::compare(field, CompareOp::Ge, param)
    }

    pub fn lt(field: impl Into<String>, param: impl Into<String>) -> Self {
        Self::compare(field, CompareOp::Lt, param)
    }

    pub fn le(field: impl Into<String>, param: impl Into<String>) -> Self {
        Self::compare(field, CompareOp::Le, param)
    }

    pub fn like(field: impl Into<String>, param: impl Into<String>) -> Self {
        Self::compare(field, CompareOp::Like, param)
    }

    pub fn is_in(field: impl Into<String>, param: impl Into<String>) -> Self {
        Self::compare(field, CompareOp::In, param)
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Condition::IsNull {
            field: field.into(),
        }
    }

    pub fn is_not_null(field: impl Into<String>) -> Self {
        Condition::IsNotNull {
            field: field.into(),
        }
    }

    fn bind(&self, spec: &Spec, params: &Params) -> Result<Predicate, Error> {
        match self {
            Condition::Compare { field, op, param } => {
                let column = column_of(spec, field)?;
                let value = params
                    .get(param)
                    .cloned()
                    .ok_or_else(|| Error::invalid_query(format!("missing parameter '{}'", param)))?;
                match (op, &value) {
                    (CompareOp::In, Value::Array(_)) => {}
                    (CompareOp::In, other) => {
                        return Err(Error::invalid_query(format!(
                            "parameter '{}' for IN must be an array, got {}",
                            param,
                            other.kind_name()
                        )))
                    }
                    (CompareOp::Like, Value::String(_)) => {}
                    (CompareOp::Like, other) => {
                        return Err(Error::invalid_query(format!(
                            "parameter '{}' for LIKE must be a string, got {}",
                            param,
                            other.kind_name()
                        )))
                    }
                    _ => {}
                }
                Ok(Predicate::Compare {
                    column,
                    op: *op,
                    value,
                })
            }
            Condition::IsNull { field } => Ok(Predicate::IsNull {
                column: column_of(spec, field)?,
            }),
            Condition::IsNotNull { field } => Ok(Predicate::IsNotNull {
                column: column_of(spec, field)?,
            }),
            Condition::All(children) => Ok(Predicate::All(bind_all(children, spec, params)?)),
            Condition::Any(children) => {
                if children.is_empty() {
                    return Err(Error::invalid_query("ANY group needs at least one condition"));
                }
                Ok(Predicate::Any(bind_all(children, spec, params)?))
            }
        }
    }
}

fn bind_all(conditions: &[Condition], spec: &Spec, params: &Params) -> Result<Vec<Predicate>, Error> {
    conditions.iter().map(|c| c.bind(spec, params)).collect()
}

fn column_of(spec: &Spec, field: &str) -> Result<String, Error> {
    spec.field(field)
        .map(|f| f.column.clone())
        .ok_or_else(|| {
            Error::invalid_query(format!(
                "unknown field '{}' on {}",
                field,
                spec.type_name()
            ))
        })
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Order {
    pub field: String,
    pub direction: Direction,
}

/// A row selection: conditions (all must hold), ordering and paging.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    pub conditions: Vec<Condition>,
    pub order_by: Vec<Order>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by.push(Order {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn bind(&self, spec: &Spec, params: &Params) -> Result<BoundQuery, Error> {
        let order = self
            .order_by
            .iter()
            .map(|o| Ok((column_of(spec, &o.field)?, o.direction)))
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(BoundQuery {
            predicate: Predicate::All(bind_all(&self.conditions, spec, params)?),
            order,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

/// Column assignments applied to every row matching the conditions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Update {
    /// `(field, param)` pairs.
    pub assignments: Vec<(String, String)>,
    pub conditions: Vec<Condition>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, param: impl Into<String>) -> Self {
        self.assignments.push((field.into(), param.into()));
        self
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn bind(&self, spec: &Spec, params: &Params) -> Result<BoundUpdate, Error> {
        if self.assignments.is_empty() {
            return Err(Error::invalid_query("update has no assignments"));
        }
        let key = &spec.primary_key().name;
        let assignments = self
            .assignments
            .iter()
            .map(|(field, param)| {
                if field == key {
                    return Err(Error::invalid_query(format!(
                        "cannot update primary key '{}'",
                        field
                    )));
                }
                let value = params.get(param).cloned().ok_or_else(|| {
                    Error::invalid_query(format!("missing parameter '{}'", param))
                })?;
                Ok((column_of(spec, field)?, value))
            })
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(BoundUpdate {
            assignments,
            predicate: Predicate::All(bind_all(&self.conditions, spec, params)?),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFn {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFn::Count => "COUNT",
            AggregateFn::Sum => "SUM",
            AggregateFn::Avg => "AVG",
            AggregateFn::Min => "MIN",
            AggregateFn::Max => "MAX",
        }
    }
}

/// An aggregate over the rows matching the conditions.
///
/// `Count` without a field counts rows; with a field it counts non-null
/// values. The other functions need a numeric field.
#[derive(Clone, Debug, PartialEq)]
pub struct Aggregate {
    pub func: AggregateFn,
    pub field: Option<String>,
    pub conditions: Vec<Condition>,
}

impl Aggregate {
    pub fn count() -> Self {
        Self {
            func: AggregateFn::Count,
            field: None,
            conditions: Vec::new(),
        }
    }

    pub fn of(func: AggregateFn, field: impl Into<String>) -> Self {
        Self {
            func,
            field: Some(field.into()),
            conditions: Vec::new(),
        }
    }

    pub fn sum(field: impl Into<String>) -> Self {
        Self::of(AggregateFn::Sum, field)
    }

    pub fn avg(field: impl Into<String>) -> Self {
        Self::of(AggregateFn::Avg, field)
    }

    pub fn min(field: impl Into<String>) -> Self {
        Self::of(AggregateFn::Min, field)
    }

    pub fn max(field: impl Into<String>) -> Self {
        Self::of(AggregateFn::Max, field)
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn bind(&self, spec: &Spec, params: &Params) -> Result<BoundAggregate, Error> {
        let column = match (&self.field, self.func) {
            (None, AggregateFn::Count) => None,
            (None, func) => {
                return Err(Error::invalid_query(format!("{} needs a field", func.name())))
            }
            (Some(field), func) => {
                let spec_field = spec.field(field).ok_or_else(|| {
                    Error::invalid_query(format!("unknown field '{}' on {}", field, spec.type_name()))
                })?;
                let numeric = matches!(spec_field.kind, FieldKind::Integer | FieldKind::Float);
                if func != AggregateFn::Count && !numeric {
                    return Err(Error::invalid_query(format!(
                        "{} needs a numeric field, '{}' is {}",
                        func.name(),
                        field,
                        spec_field.kind
                    )));
                }
                Some(spec_field.column.clone())
            }
        };
        Ok(BoundAggregate {
            func: self.func,
            column,
            predicate: Predicate::All(bind_all(&self.conditions, spec, params)?),
        })
    }
}

/// A bound condition: columns resolved, parameters inlined.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Compare {
        column: String,
        op: CompareOp,
        value: Value,
    },
    IsNull {
        column: String,
    },
    IsNotNull {
        column: String,
    },
    /// True when empty.
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoundQuery {
    pub predicate: Predicate,
    pub order: Vec<(String, Direction)>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoundUpdate {
    pub assignments: Vec<(String, Value)>,
    pub predicate: Predicate,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoundAggregate {
    pub func: AggregateFn,
    pub column: Option<String>,
    pub predicate: Predicate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FieldSpec;

    fn order_spec() -> Spec {
        Spec::named("Order")
            .field(FieldSpec::integer("id").primary_key())
            .field(FieldSpec::string("customer").column("customer_id"))
            .field(FieldSpec::float("total"))
            .field(FieldSpec::string("note").nullable())
            .build()
            .unwrap()
    }

    fn params(pairs: &[(&str, Value)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn query_binds_columns_and_values() {
        let query = Query::new()
            .filter(Condition::eq("customer", "who"))
            .filter(Condition::is_null("note"))
            .order_by("total", Direction::Desc)
            .limit(10);

        let bound = query
            .bind(&order_spec(), &params(&[("who", Value::from("c-1"))]))
            .unwrap();

        assert_eq!(
            bound.predicate,
            Predicate::All(vec![
                Predicate::Compare {
                    column: "customer_id".to_string(),
                    op: CompareOp::Eq,
                    value: Value::from("c-1"),
                },
                Predicate::IsNull {
                    column: "note".to_string()
                },
            ])
        );
        assert_eq!(bound.order, vec![("total".to_string(), Direction::Desc)]);
        assert_eq!(bound.limit, Some(10));
    }

    #[test]
    fn unknown_field_is_invalid_query() {
        let err = Query::new()
            .filter(Condition::eq("customer_id", "who"))
            .bind(&order_spec(), &params(&[("who", Value::from("c-1"))]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery { .. }));
    }

    #[test]
    fn missing_param_is_invalid_query() {
        let err = Query::new()
            .filter(Condition::gt("total", "min"))
            .bind(&order_spec(), &Params::new())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery { .. }));
    }

    #[test]
    fn in_requires_array_param() {
        let err = Query::new()
            .filter(Condition::is_in("customer", "ids"))
            .bind(&order_spec(), &params(&[("ids", Value::from("c-1"))]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery { .. }));
    }

    #[test]
    fn update_cannot_touch_primary_key() {
        let err = Update::new()
            .set("id", "new_id")
            .bind(&order_spec(), &params(&[("new_id", Value::Integer(9))]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery { .. }));
    }

    #[test]
    fn aggregate_needs_numeric_field() {
        let spec = order_spec();
        assert!(Aggregate::sum("customer").bind(&spec, &Params::new()).is_err());
        assert!(Aggregate::avg("total").bind(&spec, &Params::new()).is_ok());
        assert!(Aggregate::count().bind(&spec, &Params::new()).is_ok());

        let bound = Aggregate::of(AggregateFn::Count, "customer")
            .bind(&spec, &Params::new())
            .unwrap();
        assert_eq!(bound.column.as_deref(), Some("customer_id"));
    }
}

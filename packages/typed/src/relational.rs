//! Typed relational facade.
//!
//! Records travel as rows keyed by column. Every operation has a `_tx`
//! variant that runs inside a caller-owned transaction; both share one code
//! path parameterized by [`Exec`].

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use stowage_core::provider::{Exec, RelationalExecutor, TableDef};
use stowage_core::{
    Aggregate, Context, Error, FieldKind, Format, Model, Params, Query, Role, Row, Spec, Update,
    Value,
};

use crate::atomic::AtomicTable;
use crate::convert::{from_value, to_value};
use crate::{check_key, hooks};

/// Serialize a record into a row addressed by column.
pub(crate) fn record_to_row<T: Serialize>(spec: &Spec, record: &T) -> Result<Row, Error> {
    let mut map = match to_value(record)? {
        Value::Map(map) => map,
        other => {
            return Err(Error::encode(
                Format::VALUE,
                format!("{} serialized to {}, expected a map", spec.type_name(), other.kind_name()),
            ))
        }
    };
    if let Some(extra) = map.keys().find(|k| spec.field(k).is_none()) {
        return Err(Error::encode(
            Format::VALUE,
            format!("field '{}' is not declared by {}", extra, spec.type_name()),
        ));
    }
    Ok(spec
        .fields()
        .iter()
        .map(|f| (f.column.clone(), map.remove(&f.name).unwrap_or(Value::Null)))
        .collect())
}

/// Rebuild a record from a row addressed by column.
pub(crate) fn row_to_record<T: DeserializeOwned>(spec: &Spec, mut row: Row) -> Result<T, Error> {
    let map: BTreeMap<String, Value> = spec
        .fields()
        .iter()
        .map(|f| (f.name.clone(), row.remove(&f.column).unwrap_or(Value::Null)))
        .collect();
    from_value(Value::Map(map))
}

/// Convert key text to the primary-key column's kind.
pub(crate) fn key_value(spec: &Spec, key: &str) -> Result<Value, Error> {
    check_key(key)?;
    let pk = spec.primary_key();
    let bad = |what: &str| {
        Error::invalid_key(format!(
            "'{}' is not a valid {} for key column '{}'",
            key, what, pk.column
        ))
    };
    match pk.kind {
        FieldKind::String => Ok(Value::String(key.to_string())),
        FieldKind::Integer => key
            .parse::<i64>()
            .map(Value::Integer)
            .or_else(|_| key.parse::<u64>().map(Value::from))
            .map_err(|_| bad("integer")),
        FieldKind::Float => key.parse::<f64>().map(Value::Float).map_err(|_| bad("float")),
        FieldKind::Bool => key.parse::<bool>().map(Value::Bool).map_err(|_| bad("bool")),
        FieldKind::Bytes => Ok(Value::Bytes(key.as_bytes().to_vec())),
        FieldKind::Composite => Err(bad("scalar")),
    }
}

/// Key text of a row, for hook dispatch and logging.
pub(crate) fn row_key(def: &TableDef, row: &Row) -> String {
    match row.get(def.key_column()) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Integer(i)) => i.to_string(),
        Some(Value::UInteger(u)) => u.to_string(),
        Some(Value::Float(f)) => f.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => format!("{:?}", other),
        None => String::new(),
    }
}

/// A table of `T` records executed by `E`.
pub struct Table<T, E: RelationalExecutor> {
    executor: Arc<E>,
    def: TableDef,
    _marker: PhantomData<fn() -> T>,
}

impl<T, E: RelationalExecutor> Clone for Table<T, E> {
    fn clone(&self) -> Self {
        Self {
            executor: Arc::clone(&self.executor),
            def: self.def.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Model, E: RelationalExecutor> Table<T, E> {
    pub fn new(executor: Arc<E>, name: impl Into<String>) -> Result<Self, Error> {
        Ok(Self::with_spec(executor, name, Arc::new(T::spec()?)))
    }

    pub fn with_spec(executor: Arc<E>, name: impl Into<String>, spec: Arc<Spec>) -> Self {
        Self {
            executor,
            def: TableDef::new(name, spec),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn spec(&self) -> &Arc<Spec> {
        &self.def.spec
    }

    pub fn def(&self) -> &TableDef {
        &self.def
    }

    pub fn atomic(&self) -> AtomicTable<T, E> {
        AtomicTable::new(Arc::clone(&self.executor), self.def.clone())
    }

    fn load(&self, ctx: &Context, row: Row) -> Result<T, Error> {
        let key = row_key(&self.def, &row);
        let mut record: T = row_to_record(&self.def.spec, row)?;
        hooks::after_load(ctx, &key, &mut record)?;
        Ok(record)
    }

    async fn get_in(&self, ctx: &Context, exec: Exec<'_, E::Tx>, key: &str) -> Result<T, Error> {
        let key_value = key_value(&self.def.spec, key)?;
        ctx.check()?;
        log::debug!("{}: get {}", self.def.name, key);

        let row = self.executor.get(ctx, exec, &self.def, &key_value).await?;
        self.load(ctx, row)
    }

    async fn set_in(&self, ctx: &Context, exec: Exec<'_, E::Tx>, record: &mut T) -> Result<(), Error> {
        ctx.check()?;
        if T::provides(Role::BeforeSave) {
            let key = row_key(&self.def, &record_to_row(&self.def.spec, record)?);
            hooks::before_save(ctx, &key, record)?;
        }

        let row = record_to_row(&self.def.spec, record)?;
        let key = row_key(&self.def, &row);
        log::debug!("{}: upsert {}", self.def.name, key);

        self.executor.upsert(ctx, exec, &self.def, row).await?;
        hooks::after_save(ctx, &key, record)
    }

    async fn delete_in(&self, ctx: &Context, exec: Exec<'_, E::Tx>, key: &str) -> Result<(), Error> {
        let key_value = key_value(&self.def.spec, key)?;
        ctx.check()?;
        hooks::before_delete::<T>(ctx, key)?;
        log::debug!("{}: delete {}", self.def.name, key);

        self.executor.delete(ctx, exec, &self.def, &key_value).await?;
        hooks::after_delete::<T>(ctx, key)
    }

    async fn exists_in(&self, ctx: &Context, exec: Exec<'_, E::Tx>, key: &str) -> Result<bool, Error> {
        let key_value = key_value(&self.def.spec, key)?;
        ctx.check()?;
        self.executor.exists(ctx, exec, &self.def, &key_value).await
    }

    async fn query_in(
        &self,
        ctx: &Context,
        exec: Exec<'_, E::Tx>,
        query: &Query,
        params: &Params,
    ) -> Result<Vec<T>, Error> {
        let bound = query.bind(&self.def.spec, params)?;
        ctx.check()?;
        log::debug!("{}: query {:?}", self.def.name, bound.predicate);

        let rows = self.executor.query(ctx, exec, &self.def, &bound).await?;
        rows.into_iter().map(|row| self.load(ctx, row)).collect()
    }

    async fn select_in(
        &self,
        ctx: &Context,
        exec: Exec<'_, E::Tx>,
        query: &Query,
        params: &Params,
    ) -> Result<T, Error> {
        let bound = query.bind(&self.def.spec, params)?;
        ctx.check()?;
        let row = self.executor.select(ctx, exec, &self.def, &bound).await?;
        self.load(ctx, row)
    }

    async fn update_in(
        &self,
        ctx: &Context,
        exec: Exec<'_, E::Tx>,
        update: &Update,
        params: &Params,
    ) -> Result<u64, Error> {
        let bound = update.bind(&self.def.spec, params)?;
        ctx.check()?;
        log::debug!("{}: update {} columns", self.def.name, bound.assignments.len());
        self.executor.update(ctx, exec, &self.def, &bound).await
    }

    async fn aggregate_in(
        &self,
        ctx: &Context,
        exec: Exec<'_, E::Tx>,
        aggregate: &Aggregate,
        params: &Params,
    ) -> Result<f64, Error> {
        let bound = aggregate.bind(&self.def.spec, params)?;
        ctx.check()?;
        self.executor.aggregate(ctx, exec, &self.def, &bound).await
    }

    pub async fn get(&self, ctx: &Context, key: &str) -> Result<T, Error> {
        self.get_in(ctx, Exec::Direct, key).await
    }

    /// Upsert keyed by the record's primary-key field; there is no separate
    /// key argument. On primary-key conflict every non-key column is overwritten.
    pub async fn set(&self, ctx: &Context, record: &mut T) -> Result<(), Error> {
        self.set_in(ctx, Exec::Direct, record).await
    }

    pub async fn delete(&self, ctx: &Context, key: &str) -> Result<(), Error> {
        self.delete_in(ctx, Exec::Direct, key).await
    }

    pub async fn exists(&self, ctx: &Context, key: &str) -> Result<bool, Error> {
        self.exists_in(ctx, Exec::Direct, key).await
    }

    pub async fn query(&self, ctx: &Context, query: &Query, params: &Params) -> Result<Vec<T>, Error> {
        self.query_in(ctx, Exec::Direct, query, params).await
    }

    /// The first matching record. `NotFound` if nothing matches.
    pub async fn select(&self, ctx: &Context, query: &Query, params: &Params) -> Result<T, Error> {
        self.select_in(ctx, Exec::Direct, query, params).await
    }

    /// Returns the number of rows affected.
    pub async fn update(&self, ctx: &Context, update: &Update, params: &Params) -> Result<u64, Error> {
        self.update_in(ctx, Exec::Direct, update, params).await
    }

    /// Evaluate an aggregate; `0.0` over no rows.
    pub async fn aggregate(&self, ctx: &Context, aggregate: &Aggregate, params: &Params) -> Result<f64, Error> {
        self.aggregate_in(ctx, Exec::Direct, aggregate, params).await
    }

    /// [`get`](Self::get) inside `tx`, seeing its uncommitted writes.
    pub async fn get_tx(&self, ctx: &Context, tx: &E::Tx, key: &str) -> Result<T, Error> {
        self.get_in(ctx, Exec::Tx(tx), key).await
    }

    /// [`set`](Self::set) inside `tx`. The row key comes from the record.
    pub async fn set_tx(&self, ctx: &Context, tx: &E::Tx, record: &mut T) -> Result<(), Error> {
        self.set_in(ctx, Exec::Tx(tx), record).await
    }

    /// [`delete`](Self::delete) inside `tx`. `NotFound` if the row is absent there.
    pub async fn delete_tx(&self, ctx: &Context, tx: &E::Tx, key: &str) -> Result<(), Error> {
        self.delete_in(ctx, Exec::Tx(tx), key).await
    }

    pub async fn exists_tx(&self, ctx: &Context, tx: &E::Tx, key: &str) -> Result<bool, Error> {
        self.exists_in(ctx, Exec::Tx(tx), key).await
    }

    /// [`query`](Self::query) against the transaction's view of the table.
    pub async fn query_tx(
        &self,
        ctx: &Context,
        tx: &E::Tx,
        query: &Query,
        params: &Params,
    ) -> Result<Vec<T>, Error> {
        self.query_in(ctx, Exec::Tx(tx), query, params).await
    }

    /// [`select`](Self::select) inside `tx`.
    pub async fn select_tx(&self, ctx: &Context, tx: &E::Tx, query: &Query, params: &Params) -> Result<T, Error> {
        self.select_in(ctx, Exec::Tx(tx), query, params).await
    }

    /// [`update`](Self::update) inside `tx`; nothing is visible until commit.
    pub async fn update_tx(
        &self,
        ctx: &Context,
        tx: &E::Tx,
        update: &Update,
        params: &Params,
    ) -> Result<u64, Error> {
        self.update_in(ctx, Exec::Tx(tx), update, params).await
    }

    /// [`aggregate`](Self::aggregate) inside `tx`.
    pub async fn aggregate_tx(
        &self,
        ctx: &Context,
        tx: &E::Tx,
        aggregate: &Aggregate,
        params: &Params,
    ) -> Result<f64, Error> {
        self.aggregate_in(ctx, Exec::Tx(tx), aggregate, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use stowage_core::FieldSpec;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Order {
        id: i64,
        customer: String,
        note: Option<String>,
    }

    fn order_spec() -> Spec {
        Spec::named("Order")
            .field(FieldSpec::integer("id").primary_key())
            .field(FieldSpec::string("customer").column("customer_id"))
            .field(FieldSpec::string("note").nullable())
            .build()
            .unwrap()
    }

    #[test]
    fn rows_are_keyed_by_column() {
        let spec = order_spec();
        let order = Order {
            id: 3,
            customer: "c9".into(),
            note: None,
        };
        let row = record_to_row(&spec, &order).unwrap();
        assert_eq!(row.get("customer_id"), Some(&Value::from("c9")));
        assert_eq!(row.get("note"), Some(&Value::Null));
        assert!(!row.contains_key("customer"));

        let back: Order = row_to_record(&spec, row).unwrap();
        assert_eq!(back, order);
    }

    #[test]
    fn integer_keys_must_parse() {
        let spec = order_spec();
        assert_eq!(key_value(&spec, "42").unwrap(), Value::Integer(42));
        assert!(matches!(key_value(&spec, "forty"), Err(Error::InvalidKey { .. })));
        assert!(matches!(key_value(&spec, ""), Err(Error::InvalidKey { .. })));
    }
}

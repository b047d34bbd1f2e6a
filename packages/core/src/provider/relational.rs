use std::sync::Arc;

use async_trait::async_trait;

use crate::{BoundAggregate, BoundQuery, BoundUpdate, Context, Error, Row, Spec, Value};

/// A table and the Spec of the record type stored in it.
#[derive(Clone, Debug)]
pub struct TableDef {
    pub name: String,
    pub spec: Arc<Spec>,
}

impl TableDef {
    pub fn new(name: impl Into<String>, spec: Arc<Spec>) -> Self {
        Self {
            name: name.into(),
            spec,
        }
    }

    pub fn key_column(&self) -> &str {
        &self.spec.primary_key().column
    }
}

/// Where a statement runs: directly, or inside a caller-owned transaction.
#[derive(Debug)]
pub enum Exec<'a, Tx> {
    Direct,
    Tx(&'a Tx),
}

impl<Tx> Clone for Exec<'_, Tx> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Tx> Copy for Exec<'_, Tx> {}

/// Relational backend contract.
///
/// The same statement shapes and error semantics apply whether a call runs
/// through [`Exec::Direct`] or [`Exec::Tx`]. Executors never begin, commit or
/// roll back a transaction on the caller's behalf.
#[async_trait]
pub trait RelationalExecutor: Send + Sync {
    /// The backend's transaction handle.
    type Tx: Send + Sync;

    /// Fetch the row whose primary key equals `key`. `NotFound` if absent.
    async fn get(
        &self,
        ctx: &Context,
        exec: Exec<'_, Self::Tx>,
        table: &TableDef,
        key: &Value,
    ) -> Result<Row, Error>;

    /// Insert a row; on primary-key conflict overwrite every non-key column.
    async fn upsert(
        &self,
        ctx: &Context,
        exec: Exec<'_, Self::Tx>,
        table: &TableDef,
        row: Row,
    ) -> Result<(), Error>;

    /// Remove the row whose primary key equals `key`. `NotFound` if absent.
    async fn delete(
        &self,
        ctx: &Context,
        exec: Exec<'_, Self::Tx>,
        table: &TableDef,
        key: &Value,
    ) -> Result<(), Error>;

    async fn exists(
        &self,
        ctx: &Context,
        exec: Exec<'_, Self::Tx>,
        table: &TableDef,
        key: &Value,
    ) -> Result<bool, Error>;

    async fn query(
        &self,
        ctx: &Context,
        exec: Exec<'_, Self::Tx>,
        table: &TableDef,
        query: &BoundQuery,
    ) -> Result<Vec<Row>, Error>;

    /// The first row of `query`. `NotFound` if nothing matches.
    async fn select(
        &self,
        ctx: &Context,
        exec: Exec<'_, Self::Tx>,
        table: &TableDef,
        query: &BoundQuery,
    ) -> Result<Row, Error> {
        let mut first = query.clone();
        first.limit = Some(1);
        self.query(ctx, exec, table, &first)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(format!("{}: no matching row", table.name)))
    }

    /// Apply assignments to every matching row; returns rows affected.
    async fn update(
        &self,
        ctx: &Context,
        exec: Exec<'_, Self::Tx>,
        table: &TableDef,
        update: &BoundUpdate,
    ) -> Result<u64, Error>;

    /// Evaluate an aggregate. Empty inputs yield `0.0`.
    async fn aggregate(
        &self,
        ctx: &Context,
        exec: Exec<'_, Self::Tx>,
        table: &TableDef,
        aggregate: &BoundAggregate,
    ) -> Result<f64, Error>;
}

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use stowage_core::provider::{Exec, RelationalExecutor, TableDef};
use stowage_core::{Aggregate, Atom, Context, Error, Model, Params, Query, Row, Spec, Update};

use crate::convert::{atomize, deatomize};
use crate::relational::{key_value, record_to_row, row_to_record};

/// Atom view of a table of `T`.
///
/// Like the typed table, every operation runs either directly or inside a
/// caller-owned transaction.
pub struct AtomicTable<T, E: RelationalExecutor> {
    executor: Arc<E>,
    def: TableDef,
    _marker: PhantomData<fn() -> T>,
}

impl<T, E: RelationalExecutor> Clone for AtomicTable<T, E> {
    fn clone(&self) -> Self {
        Self {
            executor: Arc::clone(&self.executor),
            def: self.def.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Model, E: RelationalExecutor> AtomicTable<T, E> {
    pub fn new(executor: Arc<E>, def: TableDef) -> Self {
        Self {
            executor,
            def,
            _marker: PhantomData,
        }
    }

    pub fn spec(&self) -> &Spec {
        &self.def.spec
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    fn to_atom(&self, row: Row) -> Result<Atom, Error> {
        let record: T = row_to_record(&self.def.spec, row)?;
        atomize(&self.def.spec, &record)
    }

    fn to_row(&self, atom: &Atom) -> Result<Row, Error> {
        let record: T = deatomize(&self.def.spec, atom)?;
        record_to_row(&self.def.spec, &record)
    }

    pub async fn get_in(&self, ctx: &Context, exec: Exec<'_, E::Tx>, key: &str) -> Result<Atom, Error> {
        let key = key_value(&self.def.spec, key)?;
        ctx.check()?;
        let row = self.executor.get(ctx, exec, &self.def, &key).await?;
        self.to_atom(row)
    }

    pub async fn set_in(&self, ctx: &Context, exec: Exec<'_, E::Tx>, atom: &Atom) -> Result<(), Error> {
        ctx.check()?;
        let row = self.to_row(atom)?;
        log::debug!("{}: atomic upsert", self.def.name);
        self.executor.upsert(ctx, exec, &self.def, row).await
    }

    pub async fn delete_in(&self, ctx: &Context, exec: Exec<'_, E::Tx>, key: &str) -> Result<(), Error> {
        let key = key_value(&self.def.spec, key)?;
        ctx.check()?;
        self.executor.delete(ctx, exec, &self.def, &key).await
    }

    pub async fn exists_in(&self, ctx: &Context, exec: Exec<'_, E::Tx>, key: &str) -> Result<bool, Error> {
        let key = key_value(&self.def.spec, key)?;
        ctx.check()?;
        self.executor.exists(ctx, exec, &self.def, &key).await
    }

    pub async fn query_in(
        &self,
        ctx: &Context,
        exec: Exec<'_, E::Tx>,
        query: &Query,
        params: &Params,
    ) -> Result<Vec<Atom>, Error> {
        let bound = query.bind(&self.def.spec, params)?;
        ctx.check()?;
        let rows = self.executor.query(ctx, exec, &self.def, &bound).await?;
        rows.into_iter().map(|row| self.to_atom(row)).collect()
    }

    pub async fn select_in(
        &self,
        ctx: &Context,
        exec: Exec<'_, E::Tx>,
        query: &Query,
        params: &Params,
    ) -> Result<Atom, Error> {
        let bound = query.bind(&self.def.spec, params)?;
        ctx.check()?;
        let row = self.executor.select(ctx, exec, &self.def, &bound).await?;
        self.to_atom(row)
    }

    pub async fn update_in(
        &self,
        ctx: &Context,
        exec: Exec<'_, E::Tx>,
        update: &Update,
        params: &Params,
    ) -> Result<u64, Error> {
        let bound = update.bind(&self.def.spec, params)?;
        ctx.check()?;
        self.executor.update(ctx, exec, &self.def, &bound).await
    }

    pub async fn aggregate_in(
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

    pub async fn get(&self, ctx: &Context, key: &str) -> Result<Atom, Error> {
        self.get_in(ctx, Exec::Direct, key).await
    }

    pub async fn set(&self, ctx: &Context, atom: &Atom) -> Result<(), Error> {
        self.set_in(ctx, Exec::Direct, atom).await
    }

    pub async fn delete(&self, ctx: &Context, key: &str) -> Result<(), Error> {
        self.delete_in(ctx, Exec::Direct, key).await
    }

    pub async fn exists(&self, ctx: &Context, key: &str) -> Result<bool, Error> {
        self.exists_in(ctx, Exec::Direct, key).await
    }

    pub async fn query(&self, ctx: &Context, query: &Query, params: &Params) -> Result<Vec<Atom>, Error> {
        self.query_in(ctx, Exec::Direct, query, params).await
    }

    pub async fn select(&self, ctx: &Context, query: &Query, params: &Params) -> Result<Atom, Error> {
        self.select_in(ctx, Exec::Direct, query, params).await
    }

    pub async fn update(&self, ctx: &Context, update: &Update, params: &Params) -> Result<u64, Error> {
        self.update_in(ctx, Exec::Direct, update, params).await
    }

    pub async fn aggregate(&self, ctx: &Context, aggregate: &Aggregate, params: &Params) -> Result<f64, Error> {
        self.aggregate_in(ctx, Exec::Direct, aggregate, params).await
    }

    /// The `_tx` variants run the same operation inside `tx`.
    pub async fn get_tx(&self, ctx: &Context, tx: &E::Tx, key: &str) -> Result<Atom, Error> {
        self.get_in(ctx, Exec::Tx(tx), key).await
    }

    /// Keyed by the atom's primary-key field.
    pub async fn set_tx(&self, ctx: &Context, tx: &E::Tx, atom: &Atom) -> Result<(), Error> {
        self.set_in(ctx, Exec::Tx(tx), atom).await
    }

    pub async fn delete_tx(&self, ctx: &Context, tx: &E::Tx, key: &str) -> Result<(), Error> {
        self.delete_in(ctx, Exec::Tx(tx), key).await
    }

    pub async fn exists_tx(&self, ctx: &Context, tx: &E::Tx, key: &str) -> Result<bool, Error> {
        self.exists_in(ctx, Exec::Tx(tx), key).await
    }

    pub async fn query_tx(
        &self,
        ctx: &Context,
        tx: &E::Tx,
        query: &Query,
        params: &Params,
    ) -> Result<Vec<Atom>, Error> {
        self.query_in(ctx, Exec::Tx(tx), query, params).await
    }

    pub async fn select_tx(&self, ctx: &Context, tx: &E::Tx, query: &Query, params: &Params) -> Result<Atom, Error> {
        self.select_in(ctx, Exec::Tx(tx), query, params).await
    }

    pub async fn update_tx(
        &self,
        ctx: &Context,
        tx: &E::Tx,
        update: &Update,
        params: &Params,
    ) -> Result<u64, Error> {
        self.update_in(ctx, Exec::Tx(tx), update, params).await
    }

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

/// Object-safe Atom access to a table whose executor uses transaction type
/// `Tx`. Every method takes the [`Exec`] it runs under.
#[async_trait]
pub trait ErasedTable<Tx: Send + Sync>: Send + Sync {
    fn spec(&self) -> &Spec;

    fn name(&self) -> &str;

    async fn get(&self, ctx: &Context, exec: Exec<'_, Tx>, key: &str) -> Result<Atom, Error>;

    async fn set(&self, ctx: &Context, exec: Exec<'_, Tx>, atom: &Atom) -> Result<(), Error>;

    async fn delete(&self, ctx: &Context, exec: Exec<'_, Tx>, key: &str) -> Result<(), Error>;

    async fn exists(&self, ctx: &Context, exec: Exec<'_, Tx>, key: &str) -> Result<bool, Error>;

    async fn query(
        &self,
        ctx: &Context,
        exec: Exec<'_, Tx>,
        query: &Query,
        params: &Params,
    ) -> Result<Vec<Atom>, Error>;
}

#[async_trait]
impl<T: Model, E: RelationalExecutor> ErasedTable<E::Tx> for AtomicTable<T, E> {
    fn spec(&self) -> &Spec {
        AtomicTable::spec(self)
    }

    fn name(&self) -> &str {
        AtomicTable::name(self)
    }

    async fn get(&self, ctx: &Context, exec: Exec<'_, E::Tx>, key: &str) -> Result<Atom, Error> {
        self.get_in(ctx, exec, key).await
    }

    async fn set(&self, ctx: &Context, exec: Exec<'_, E::Tx>, atom: &Atom) -> Result<(), Error> {
        self.set_in(ctx, exec, atom).await
    }

    async fn delete(&self, ctx: &Context, exec: Exec<'_, E::Tx>, key: &str) -> Result<(), Error> {
        self.delete_in(ctx, exec, key).await
    }

    async fn exists(&self, ctx: &Context, exec: Exec<'_, E::Tx>, key: &str) -> Result<bool, Error> {
        self.exists_in(ctx, exec, key).await
    }

    async fn query(
        &self,
        ctx: &Context,
        exec: Exec<'_, E::Tx>,
        query: &Query,
        params: &Params,
    ) -> Result<Vec<Atom>, Error> {
        self.query_in(ctx, exec, query, params).await
    }
}

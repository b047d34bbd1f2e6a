//! In-memory relational executor.
//!
//! Tables are created explicitly from a [`TableDef`]. Rows are kept in
//! insertion order. Transactions work on private copies of the tables they
//! touch and commit optimistically: if another writer changed a table the
//! transaction also wrote, commit fails with `Conflict` and nothing applies.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use stowage_core::provider::{Exec, RelationalExecutor, TableDef};
use stowage_core::{
    like_match, AggregateFn, BoundAggregate, BoundQuery, BoundUpdate, CompareOp, Context,
    Direction, Error, Predicate, Row, Spec, Value,
};

#[derive(Clone)]
struct TableData {
    spec: Arc<Spec>,
    key_column: String,
    rows: Vec<Row>,
    version: u64,
}

impl TableData {
    fn new(spec: Arc<Spec>) -> Self {
        let key_column = spec.primary_key().column.clone();
        Self {
            spec,
            key_column,
            rows: Vec::new(),
            version: 0,
        }
    }

    fn position(&self, key: &Value) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| row.get(&self.key_column).is_some_and(|v| v.loose_eq(key)))
    }

    /// Fill absent columns with null and reject unknown ones.
    fn normalize(&self, mut row: Row) -> Result<Row, Error> {
        if let Some(unknown) = row.keys().find(|c| self.spec.field_by_column(c).is_none()) {
            return Err(Error::Constraint {
                message: format!("unknown column '{}'", unknown),
            });
        }
        Ok(self
            .spec
            .fields()
            .iter()
            .map(|f| (f.column.clone(), row.remove(&f.column).unwrap_or(Value::Null)))
            .collect())
    }

    /// Check `row` as if it replaced the row at `slot`.
    fn check(&self, row: &Row, slot: Option<usize>) -> Result<(), Error> {
        for field in self.spec.fields() {
            let value = row.get(&field.column).unwrap_or(&Value::Null);
            if value.is_null() {
                if field.primary_key || field.not_null || !field.nullable {
                    return Err(Error::Constraint {
                        message: format!("column '{}' may not be null", field.column),
                    });
                }
                continue;
            }
            if field.unique || field.primary_key {
                let clash = self.rows.iter().enumerate().any(|(i, other)| {
                    Some(i) != slot
                        && other
                            .get(&field.column)
                            .is_some_and(|v| v.loose_eq(value))
                });
                if clash {
                    return Err(Error::Duplicate {
                        message: format!("column '{}' already holds {:?}", field.column, value),
                    });
                }
            }
        }
        Ok(())
    }

    fn upsert(&mut self, row: Row) -> Result<(), Error> {
        let row = self.normalize(row)?;
        let key = row.get(&self.key_column).cloned().unwrap_or(Value::Null);
        let slot = self.position(&key);
        self.check(&row, slot)?;
        match slot {
            Some(i) => self.rows[i] = row,
            None => self.rows.push(row),
        }
        self.version += 1;
        Ok(())
    }

    fn matching<'a>(
        &'a self,
        ctx: &'a Context,
        predicate: &'a Predicate,
    ) -> impl Iterator<Item = Result<(usize, &'a Row), Error>> + 'a {
        self.rows.iter().enumerate().filter_map(move |(i, row)| {
            if let Err(e) = ctx.check() {
                return Some(Err(e));
            }
            eval(predicate, row).then_some(Ok((i, row)))
        })
    }
}

fn cell<'r>(row: &'r Row, column: &str) -> &'r Value {
    row.get(column).unwrap_or(&Value::Null)
}

/// Null never satisfies a comparison.
fn eval(predicate: &Predicate, row: &Row) -> bool {
    match predicate {
        Predicate::Compare { column, op, value } => {
            let cell = cell(row, column);
            if cell.is_null() {
                return false;
            }
            match op {
                CompareOp::Eq => cell.loose_eq(value),
                CompareOp::Ne => !cell.loose_eq(value),
                CompareOp::Gt => cell.compare(value) == Some(Ordering::Greater),
                CompareOp::Ge => matches!(cell.compare(value), Some(Ordering::Greater | Ordering::Equal)),
                CompareOp::Lt => cell.compare(value) == Some(Ordering::Less),
                CompareOp::Le => matches!(cell.compare(value), Some(Ordering::Less | Ordering::Equal)),
                CompareOp::Like => match (cell.as_str(), value.as_str()) {
                    (Some(text), Some(pattern)) => like_match(pattern, text),
                    _ => false,
                },
                CompareOp::In => match value {
                    Value::Array(items) => items.iter().any(|x| cell.loose_eq(x)),
                    _ => false,
                },
            }
        }
        Predicate::IsNull { column } => cell(row, column).is_null(),
        Predicate::IsNotNull { column } => !cell(row, column).is_null(),
        Predicate::All(children) => children.iter().all(|p| eval(p, row)),
        Predicate::Any(children) => children.iter().any(|p| eval(p, row)),
    }
}

/// Nulls sort first; incomparable values keep their relative order.
fn order_cells(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.compare(b).unwrap_or(Ordering::Equal),
    }
}

struct TxTable {
    data: TableData,
    base_version: u64,
    dirty: bool,
}

#[derive(Default)]
struct TxState {
    tables: BTreeMap<String, TxTable>,
}

/// A transaction handle from [`MemoryDb::begin`].
///
/// Reads inside the transaction see a snapshot taken the first time each
/// table is touched, plus the transaction's own writes. `commit` and
/// `rollback` take the handle by value, so a finished transaction cannot be
/// used again.
pub struct MemoryTx {
    id: u64,
    state: Mutex<TxState>,
}

impl MemoryTx {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// An in-memory relational executor.
#[derive(Default)]
pub struct MemoryDb {
    tables: RwLock<BTreeMap<String, TableData>>,
    next_tx: AtomicU64,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(&self, def: &TableDef) -> Result<(), Error> {
        let mut tables = self.tables.write();
        if tables.contains_key(&def.name) {
            return Err(Error::TableExists {
                table: def.name.clone(),
            });
        }
        log::debug!("memory db: create table {}", def.name);
        tables.insert(def.name.clone(), TableData::new(Arc::clone(&def.spec)));
        Ok(())
    }

    pub fn drop_table(&self, name: &str) -> Result<(), Error> {
        log::debug!("memory db: drop table {}", name);
        self.tables
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::TableNotFound {
                table: name.to_string(),
            })
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }

    pub fn begin(&self) -> MemoryTx {
        let id = self.next_tx.fetch_add(1, AtomicOrdering::Relaxed) + 1;
        log::debug!("memory db: begin tx {}", id);
        MemoryTx {
            id,
            state: Mutex::new(TxState::default()),
        }
    }

    /// Apply the transaction's writes, or fail with `Conflict` if a table it
    /// wrote changed since it was first read.
    pub fn commit(&self, tx: MemoryTx) -> Result<(), Error> {
        let state = tx.state.into_inner();
        let mut tables = self.tables.write();
        for (name, t) in state.tables.iter().filter(|(_, t)| t.dirty) {
            match tables.get(name) {
                Some(current) if current.version == t.base_version => {}
                Some(_) => {
                    log::debug!("memory db: tx {} conflicts on {}", tx.id, name);
                    return Err(Error::Conflict {
                        message: format!("table '{}' changed during transaction {}", name, tx.id),
                    });
                }
                None => {
                    return Err(Error::TableNotFound {
                        table: name.clone(),
                    })
                }
            }
        }
        for (name, mut t) in state.tables.into_iter().filter(|(_, t)| t.dirty) {
            t.data.version = t.base_version + 1;
            tables.insert(name, t.data);
        }
        log::debug!("memory db: commit tx {}", tx.id);
        Ok(())
    }

    /// Discard the transaction's writes.
    pub fn rollback(&self, tx: MemoryTx) {
        log::debug!("memory db: rollback tx {}", tx.id);
        drop(tx);
    }

    fn read<R>(
        &self,
        exec: Exec<'_, MemoryTx>,
        name: &str,
        f: impl FnOnce(&TableData) -> Result<R, Error>,
    ) -> Result<R, Error> {
        match exec {
            Exec::Direct => {
                let tables = self.tables.read();
                f(tables.get(name).ok_or_else(|| not_found_table(name))?)
            }
            Exec::Tx(tx) => {
                let mut state = tx.state.lock();
                let t = self.tx_table(&mut state, name)?;
                f(&t.data)
            }
        }
    }

    /// Run `f` on a scratch copy; keep the copy only if `f` succeeds.
    fn write<R>(
        &self,
        exec: Exec<'_, MemoryTx>,
        name: &str,
        f: impl FnOnce(&mut TableData) -> Result<R, Error>,
    ) -> Result<R, Error> {
        match exec {
            Exec::Direct => {
                let mut tables = self.tables.write();
                let table = tables.get_mut(name).ok_or_else(|| not_found_table(name))?;
                let mut scratch = table.clone();
                let out = f(&mut scratch)?;
                *table = scratch;
                Ok(out)
            }
            Exec::Tx(tx) => {
                let mut state = tx.state.lock();
                let t = self.tx_table(&mut state, name)?;
                let mut scratch = t.data.clone();
                let out = f(&mut scratch)?;
                t.data = scratch;
                t.dirty = true;
                Ok(out)
            }
        }
    }

    fn tx_table<'s>(&self, state: &'s mut TxState, name: &str) -> Result<&'s mut TxTable, Error> {
        if !state.tables.contains_key(name) {
            let tables = self.tables.read();
            let data = tables.get(name).ok_or_else(|| not_found_table(name))?.clone();
            state.tables.insert(
                name.to_string(),
                TxTable {
                    base_version: data.version,
                    data,
                    dirty: false,
                },
            );
        }
        state
            .tables
            .get_mut(name)
            .ok_or_else(|| not_found_table(name))
    }
}

fn not_found_table(name: &str) -> Error {
    Error::TableNotFound {
        table: name.to_string(),
    }
}

fn row_not_found(table: &str, key: &Value) -> Error {
    let key = match key {
        Value::String(s) => s.clone(),
        Value::Integer(i) => i.to_string(),
        Value::UInteger(u) => u.to_string(),
        other => format!("{:?}", other),
    };
    Error::not_found(format!("{}/{}", table, key))
}

#[async_trait]
impl RelationalExecutor for MemoryDb {
    type Tx = MemoryTx;

    async fn get(&self, ctx: &Context, exec: Exec<'_, MemoryTx>, table: &TableDef, key: &Value) -> Result<Row, Error> {
        ctx.check()?;
        self.read(exec, &table.name, |t| {
            t.position(key)
                .map(|i| t.rows[i].clone())
                .ok_or_else(|| row_not_found(&table.name, key))
        })
    }

    async fn upsert(&self, ctx: &Context, exec: Exec<'_, MemoryTx>, table: &TableDef, row: Row) -> Result<(), Error> {
        ctx.check()?;
        self.write(exec, &table.name, |t| t.upsert(row))
    }

    async fn delete(&self, ctx: &Context, exec: Exec<'_, MemoryTx>, table: &TableDef, key: &Value) -> Result<(), Error> {
        ctx.check()?;
        self.write(exec, &table.name, |t| {
            let i = t.position(key).ok_or_else(|| row_not_found(&table.name, key))?;
            t.rows.remove(i);
            t.version += 1;
            Ok(())
        })
    }

    async fn exists(&self, ctx: &Context, exec: Exec<'_, MemoryTx>, table: &TableDef, key: &Value) -> Result<bool, Error> {
        ctx.check()?;
        self.read(exec, &table.name, |t| Ok(t.position(key).is_some()))
    }

    async fn query(
        &self,
        ctx: &Context,
        exec: Exec<'_, MemoryTx>,
        table: &TableDef,
        query: &BoundQuery,
    ) -> Result<Vec<Row>, Error> {
        ctx.check()?;
        self.read(exec, &table.name, |t| {
            let mut rows = t
                .matching(ctx, &query.predicate)
                .map(|r| r.map(|(_, row)| row))
                .collect::<Result<Vec<_>, Error>>()?;
            rows.sort_by(|a, b| {
                query
                    .order
                    .iter()
                    .map(|(column, direction)| {
                        let ord = order_cells(cell(a, column), cell(b, column));
                        match direction {
                            Direction::Asc => ord,
                            Direction::Desc => ord.reverse(),
                        }
                    })
                    .find(|ord| *ord != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
            let offset = query.offset.unwrap_or(0);
            let limit = query.limit.unwrap_or(usize::MAX);
            Ok(rows.into_iter().skip(offset).take(limit).cloned().collect())
        })
    }

    async fn update(
        &self,
        ctx: &Context,
        exec: Exec<'_, MemoryTx>,
        table: &TableDef,
        update: &BoundUpdate,
    ) -> Result<u64, Error> {
        ctx.check()?;
        self.write(exec, &table.name, |t| {
            let hits = t
                .matching(ctx, &update.predicate)
                .map(|r| r.map(|(i, _)| i))
                .collect::<Result<Vec<_>, Error>>()?;
            for &i in &hits {
                let mut row = t.rows[i].clone();
                for (column, value) in &update.assignments {
                    row.insert(column.clone(), value.clone());
                }
                let row = t.normalize(row)?;
                t.check(&row, Some(i))?;
                t.rows[i] = row;
            }
            if !hits.is_empty() {
                t.version += 1;
            }
            Ok(hits.len() as u64)
        })
    }

    async fn aggregate(
        &self,
        ctx: &Context,
        exec: Exec<'_, MemoryTx>,
        table: &TableDef,
        aggregate: &BoundAggregate,
    ) -> Result<f64, Error> {
        ctx.check()?;
        self.read(exec, &table.name, |t| {
            let rows = t
                .matching(ctx, &aggregate.predicate)
                .map(|r| r.map(|(_, row)| row))
                .collect::<Result<Vec<_>, Error>>()?;
            let column = match (&aggregate.column, aggregate.func) {
                (None, AggregateFn::Count) => return Ok(rows.len() as f64),
                (None, func) => {
                    return Err(Error::invalid_query(format!("{} needs a column", func.name())))
                }
                (Some(column), _) => column,
            };
            let cells: Vec<&Value> = rows
                .iter()
                .map(|row| cell(row, column))
                .filter(|v| !v.is_null())
                .collect();
            if aggregate.func == AggregateFn::Count {
                return Ok(cells.len() as f64);
            }
            let numbers = cells
                .iter()
                .map(|v| {
                    v.as_f64().ok_or_else(|| {
                        Error::invalid_query(format!(
                            "{} over non-numeric column '{}'",
                            aggregate.func.name(),
                            column
                        ))
                    })
                })
                .collect::<Result<Vec<f64>, Error>>()?;
            if numbers.is_empty() {
                return Ok(0.0);
            }
            Ok(match aggregate.func {
                AggregateFn::Count => numbers.len() as f64,
                AggregateFn::Sum => numbers.iter().sum(),
                AggregateFn::Avg => numbers.iter().sum::<f64>() / numbers.len() as f64,
                AggregateFn::Min => numbers.iter().copied().fold(f64::INFINITY, f64::min),
                AggregateFn::Max => numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            })
        })
    }
}

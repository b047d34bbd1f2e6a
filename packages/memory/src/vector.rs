//! In-memory vector index.
//!
//! Brute force: every search scores every stored vector. Filters are
//! compiled once per call into a predicate over the decoded metadata.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use stowage_core::provider::{SearchResult, VectorInfo, VectorProvider, VectorRecord};
use stowage_core::{
    like_match, validate_vector, Codec, Context, Error, Filter, FilterVisitor, Metric, Operator,
    RangeOp, Value,
};

/// Which filtering the index offers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSupport {
    /// Whether metadata-only listing (`filter`) is available.
    pub metadata_filter: bool,
    /// Operators the index can translate. `None` means all of them.
    pub operators: Option<Vec<Operator>>,
}

impl Default for FilterSupport {
    fn default() -> Self {
        Self {
            metadata_filter: true,
            operators: None,
        }
    }
}

impl FilterSupport {
    pub fn allows(&self, op: Operator) -> bool {
        self.operators.as_ref().map_or(true, |ops| ops.contains(&op))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryIndexConfig {
    pub metric: Metric,
    /// Fixed dimension. When unset, the first upsert fixes it.
    pub dimension: Option<usize>,
    pub filter: FilterSupport,
}

type Predicate = Box<dyn Fn(&Value) -> bool + Send + Sync>;

/// Compiles a [`Filter`] into a predicate, refusing operators the index
/// was configured without.
struct Compiler<'a> {
    support: &'a FilterSupport,
}

impl Compiler<'_> {
    fn allow(&self, op: Operator) -> Result<(), Error> {
        if self.support.allows(op) {
            Ok(())
        } else {
            log::debug!("memory index: operator {} not supported", op);
            Err(Error::operator_not_supported(op.name()))
        }
    }
}

fn lookup<'v>(metadata: &'v Value, field: &str) -> Option<&'v Value> {
    metadata.field(field).filter(|v| !v.is_null())
}

impl FilterVisitor for Compiler<'_> {
    type Output = Predicate;

    fn visit_eq(&mut self, field: &str, value: &Value) -> Result<Predicate, Error> {
        self.allow(Operator::Eq)?;
        let (field, value) = (field.to_string(), value.clone());
        Ok(Box::new(move |m| lookup(m, &field).is_some_and(|v| v.loose_eq(&value))))
    }

    fn visit_ne(&mut self, field: &str, value: &Value) -> Result<Predicate, Error> {
        self.allow(Operator::Ne)?;
        let (field, value) = (field.to_string(), value.clone());
        Ok(Box::new(move |m| !lookup(m, &field).is_some_and(|v| v.loose_eq(&value))))
    }

    fn visit_in(&mut self, field: &str, values: &[Value]) -> Result<Predicate, Error> {
        self.allow(Operator::In)?;
        let (field, values) = (field.to_string(), values.to_vec());
        Ok(Box::new(move |m| {
            lookup(m, &field).is_some_and(|v| values.iter().any(|x| v.loose_eq(x)))
        }))
    }

    fn visit_not_in(&mut self, field: &str, values: &[Value]) -> Result<Predicate, Error> {
        self.allow(Operator::NotIn)?;
        let (field, values) = (field.to_string(), values.to_vec());
        Ok(Box::new(move |m| {
            !lookup(m, &field).is_some_and(|v| values.iter().any(|x| v.loose_eq(x)))
        }))
    }

    fn visit_range(&mut self, field: &str, op: RangeOp, value: &Value) -> Result<Predicate, Error> {
        self.allow(op.operator())?;
        let (field, value) = (field.to_string(), value.clone());
        Ok(Box::new(move |m| {
            lookup(m, &field)
                .and_then(|v| v.compare(&value))
                .is_some_and(|ord| op.holds(ord))
        }))
    }

    fn visit_like(&mut self, field: &str, pattern: &str) -> Result<Predicate, Error> {
        self.allow(Operator::Like)?;
        let (field, pattern) = (field.to_string(), pattern.to_string());
        Ok(Box::new(move |m| {
            lookup(m, &field)
                .and_then(Value::as_str)
                .is_some_and(|s| like_match(&pattern, s))
        }))
    }

    fn visit_contains(&mut self, field: &str, value: &Value) -> Result<Predicate, Error> {
        self.allow(Operator::Contains)?;
        let (field, value) = (field.to_string(), value.clone());
        Ok(Box::new(move |m| match (lookup(m, &field), &value) {
            (Some(Value::Array(items)), needle) => items.iter().any(|x| x.loose_eq(needle)),
            (Some(Value::String(s)), Value::String(needle)) => s.contains(needle.as_str()),
            _ => false,
        }))
    }

    fn visit_exists(&mut self, field: &str) -> Result<Predicate, Error> {
        self.allow(Operator::Exists)?;
        let field = field.to_string();
        Ok(Box::new(move |m| lookup(m, &field).is_some()))
    }

    fn visit_not(&mut self, inner: Predicate) -> Result<Predicate, Error> {
        self.allow(Operator::Not)?;
        Ok(Box::new(move |m| !inner(m)))
    }

    fn visit_and(&mut self, children: Vec<Predicate>) -> Result<Predicate, Error> {
        self.allow(Operator::And)?;
        Ok(Box::new(move |m| children.iter().all(|c| c(m))))
    }

    fn visit_or(&mut self, children: Vec<Predicate>) -> Result<Predicate, Error> {
        self.allow(Operator::Or)?;
        Ok(Box::new(move |m| children.iter().any(|c| c(m))))
    }
}

struct Stored {
    /// Insertion order; kept on overwrite so ties stay stable.
    seq: u64,
    vector: Vec<f32>,
    metadata: Bytes,
}

#[derive(Default)]
struct IndexState {
    dimension: Option<usize>,
    next_seq: u64,
    vectors: BTreeMap<String, Stored>,
}

/// A brute-force vector index.
///
/// Results rank by ascending distance; equal distances keep insertion
/// order. Metadata is decoded with the index's codec for filtering, so it
/// must be written with the same codec. Batches are applied under one lock.
pub struct MemoryIndex {
    config: MemoryIndexConfig,
    codec: Arc<dyn Codec>,
    state: RwLock<IndexState>,
}

impl MemoryIndex {
    pub fn new(codec: Arc<dyn Codec>) -> Self {
        Self::with_config(codec, MemoryIndexConfig::default())
    }

    pub fn with_config(codec: Arc<dyn Codec>, config: MemoryIndexConfig) -> Self {
        let state = IndexState {
            dimension: config.dimension,
            ..IndexState::default()
        };
        Self {
            config,
            codec,
            state: RwLock::new(state),
        }
    }

    pub fn config(&self) -> &MemoryIndexConfig {
        &self.config
    }

    /// The fixed dimension, once known.
    pub fn dimension(&self) -> Option<usize> {
        self.state.read().dimension
    }

    fn compile(&self, filter: &Filter) -> Result<Predicate, Error> {
        filter.accept(&mut Compiler {
            support: &self.config.filter,
        })
    }

    fn check_dimension(dimension: Option<usize>, vector: &[f32]) -> Result<(), Error> {
        match dimension {
            Some(expected) if expected != vector.len() => Err(Error::DimensionMismatch {
                expected,
                actual: vector.len(),
            }),
            _ => Ok(()),
        }
    }

    fn insert(state: &mut IndexState, record: VectorRecord) {
        state.dimension.get_or_insert(record.vector.len());
        let seq = match state.vectors.get(&record.id) {
            Some(existing) => existing.seq,
            None => {
                state.next_seq += 1;
                state.next_seq
            }
        };
        state.vectors.insert(
            record.id,
            Stored {
                seq,
                vector: record.vector,
                metadata: record.metadata,
            },
        );
    }

    fn result(id: &str, stored: &Stored, score: f32) -> SearchResult {
        SearchResult {
            vector: stored.vector.clone(),
            info: VectorInfo {
                id: id.to_string(),
                dimension: stored.vector.len(),
                score,
                metadata: stored.metadata.clone(),
            },
        }
    }

    /// Score, filter and rank. `query == None` lists in insertion order.
    fn run(
        &self,
        ctx: &Context,
        query: Option<&[f32]>,
        k: usize,
        predicate: Option<&Predicate>,
    ) -> Result<Vec<SearchResult>, Error> {
        let state = self.state.read();
        if let Some(q) = query {
            validate_vector(q)?;
            Self::check_dimension(state.dimension, q)?;
        }

        let mut scored: Vec<(f32, u64, &String, &Stored)> = Vec::new();
        for (id, stored) in &state.vectors {
            ctx.check()?;
            if let Some(pred) = predicate {
                let metadata = self.codec.decode(&stored.metadata)?;
                if !pred(&metadata) {
                    continue;
                }
            }
            let score = match query {
                Some(q) => self.config.metric.distance(q, &stored.vector)?,
                None => 0.0,
            };
            scored.push((score, stored.seq, id, stored));
        }

        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        if k > 0 {
            scored.truncate(k);
        }
        Ok(scored
            .into_iter()
            .map(|(score, _, id, stored)| Self::result(id, stored, score))
            .collect())
    }
}

#[async_trait]
impl VectorProvider for MemoryIndex {
    async fn upsert(&self, ctx: &Context, id: &str, vector: &[f32], metadata: Bytes) -> Result<(), Error> {
        ctx.check()?;
        validate_vector(vector)?;
        let mut state = self.state.write();
        Self::check_dimension(state.dimension, vector)?;
        Self::insert(
            &mut state,
            VectorRecord {
                id: id.to_string(),
                vector: vector.to_vec(),
                metadata,
            },
        );
        Ok(())
    }

    async fn upsert_batch(&self, ctx: &Context, records: Vec<VectorRecord>) -> Result<(), Error> {
        ctx.check()?;
        let mut state = self.state.write();
        // Validate everything first so a bad record leaves the index untouched.
        let mut dimension = state.dimension;
        for record in &records {
            validate_vector(&record.vector)?;
            Self::check_dimension(dimension, &record.vector)?;
            dimension.get_or_insert(record.vector.len());
        }
        for record in records {
            ctx.check()?;
            Self::insert(&mut state, record);
        }
        Ok(())
    }

    async fn get(&self, ctx: &Context, id: &str) -> Result<(Vec<f32>, VectorInfo), Error> {
        ctx.check()?;
        let state = self.state.read();
        let stored = state.vectors.get(id).ok_or_else(|| Error::not_found(id))?;
        let result = Self::result(id, stored, 0.0);
        Ok((result.vector, result.info))
    }

    async fn delete(&self, ctx: &Context, id: &str) -> Result<(), Error> {
        ctx.check()?;
        self.state
            .write()
            .vectors
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(id))
    }

    async fn delete_batch(&self, ctx: &Context, ids: &[String]) -> Result<(), Error> {
        ctx.check()?;
        let mut state = self.state.write();
        for id in ids {
            state.vectors.remove(id);
        }
        Ok(())
    }

    async fn search(
        &self,
        ctx: &Context,
        vector: &[f32],
        k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<SearchResult>, Error> {
        ctx.check()?;
        let predicate = filter.map(|f| self.compile(f)).transpose()?;
        self.run(ctx, Some(vector), k, predicate.as_ref())
    }

    async fn query(
        &self,
        ctx: &Context,
        vector: &[f32],
        k: usize,
        filter: &Filter,
    ) -> Result<Vec<SearchResult>, Error> {
        ctx.check()?;
        let predicate = self.compile(filter)?;
        self.run(ctx, Some(vector), k, Some(&predicate))
    }

    async fn filter(&self, ctx: &Context, filter: &Filter, limit: usize) -> Result<Vec<SearchResult>, Error> {
        ctx.check()?;
        if !self.config.filter.metadata_filter {
            log::debug!("memory index: metadata-only filtering disabled");
            return Err(Error::FilterNotSupported);
        }
        let predicate = self.compile(filter)?;
        // Without a query vector every score is zero, so ties keep insertion order.
        self.run(ctx, None, limit, Some(&predicate))
    }

    async fn list(&self, ctx: &Context, limit: usize) -> Result<Vec<String>, Error> {
        ctx.check()?;
        let state = self.state.read();
        let mut ids: Vec<(u64, &String)> = state.vectors.iter().map(|(id, s)| (s.seq, id)).collect();
        ids.sort_unstable();
        let take = if limit == 0 { ids.len() } else { limit };
        Ok(ids.into_iter().take(take).map(|(_, id)| id.clone()).collect())
    }

    async fn exists(&self, ctx: &Context, id: &str) -> Result<bool, Error> {
        ctx.check()?;
        Ok(self.state.read().vectors.contains_key(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn meta(pairs: &[(&str, Value)]) -> Value {
        Value::Map(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    fn compile_with(support: &FilterSupport, filter: &Filter) -> Result<Predicate, Error> {
        filter.accept(&mut Compiler { support })
    }

    #[test]
    fn compiled_filters_evaluate() {
        let all = FilterSupport::default();
        let m = meta(&[
            ("genre", "jazz".into()),
            ("year", Value::Integer(1959)),
            ("tags", Value::Array(vec!["modal".into(), "live".into()])),
            ("note", Value::Null),
        ]);

        let cases = [
            (Filter::eq("genre", "jazz"), true),
            (Filter::ne("genre", "jazz"), false),
            (Filter::is_in("year", [1958i64, 1959]), true),
            (Filter::not_in("genre", ["rock"]), true),
            (Filter::ge("year", 1959.0), true),
            (Filter::lt("year", 1959i64), false),
            (Filter::like("genre", "j%z"), true),
            (Filter::contains("tags", "live"), true),
            (Filter::exists("note"), false),
            (Filter::not(Filter::exists("missing")), true),
            (
                Filter::and([Filter::eq("genre", "jazz"), Filter::gt("year", 2000i64)]),
                false,
            ),
            (
                Filter::or([Filter::eq("genre", "rock"), Filter::contains("genre", "az")]),
                true,
            ),
        ];
        for (filter, expected) in cases {
            let pred = compile_with(&all, &filter).unwrap();
            assert_eq!(pred(&m), expected, "{:?}", filter);
        }
    }

    #[test]
    fn unsupported_operator_is_rejected() {
        let support = FilterSupport {
            metadata_filter: true,
            operators: Some(vec![Operator::Eq, Operator::And]),
        };
        assert!(compile_with(&support, &Filter::and([Filter::eq("a", 1i64)])).is_ok());

        let err = compile_with(
            &support,
            &Filter::and([Filter::eq("a", 1i64), Filter::like("b", "x%")]),
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::OperatorNotSupported { operator } if operator == "like"));
    }

    #[test]
    fn config_from_json() {
        let config: MemoryIndexConfig = serde_json::from_str(
            r#"{"metric": "cosine", "dimension": 3, "filter": {"operators": ["eq", "in"]}}"#,
        )
        .unwrap();
        assert_eq!(config.metric, Metric::Cosine);
        assert_eq!(config.dimension, Some(3));
        assert!(config.filter.metadata_filter);
        assert!(config.filter.allows(Operator::In));
        assert!(!config.filter.allows(Operator::Or));
    }
}

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use stowage_core::provider::{SearchResult, VectorProvider, VectorRecord};
use stowage_core::{validate_vector, Atom, Codec, Context, Error, Filter, Model, Spec};

use crate::convert::{atomize, deatomize, from_value, to_value};
use crate::{check_filter, check_key};

/// A vector with its metadata record as an Atom.
#[derive(Clone, Debug, PartialEq)]
pub struct AtomicVector {
    pub id: String,
    pub vector: Vec<f32>,
    pub score: f32,
    pub metadata: Atom,
}

/// Atom view of a vector index whose metadata records are `T`.
pub struct AtomicIndex<T> {
    provider: Arc<dyn VectorProvider>,
    codec: Arc<dyn Codec>,
    spec: Arc<Spec>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for AtomicIndex<T> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            codec: Arc::clone(&self.codec),
            spec: Arc::clone(&self.spec),
            _marker: PhantomData,
        }
    }
}

impl<T: Model> AtomicIndex<T> {
    pub fn new(provider: Arc<dyn VectorProvider>, codec: Arc<dyn Codec>, spec: Arc<Spec>) -> Self {
        Self {
            provider,
            codec,
            spec,
            _marker: PhantomData,
        }
    }

    pub fn spec(&self) -> &Spec {
        &self.spec
    }

    fn record(&self, id: &str, vector: &[f32], metadata: &Atom) -> Result<VectorRecord, Error> {
        check_key(id)?;
        validate_vector(vector)?;
        let record: T = deatomize(&self.spec, metadata)?;
        Ok(VectorRecord {
            id: id.to_string(),
            vector: vector.to_vec(),
            metadata: self.codec.encode(&to_value(&record)?)?,
        })
    }

    fn hydrate(&self, result: SearchResult) -> Result<AtomicVector, Error> {
        let record: T = from_value(self.codec.decode(&result.info.metadata)?)?;
        Ok(AtomicVector {
            id: result.info.id,
            vector: result.vector,
            score: result.info.score,
            metadata: atomize(&self.spec, &record)?,
        })
    }

    /// Fails on the first result whose metadata does not decode.
    fn hydrate_all(&self, results: Vec<SearchResult>) -> Result<Vec<AtomicVector>, Error> {
        results.into_iter().map(|r| self.hydrate(r)).collect()
    }

    pub async fn upsert(&self, ctx: &Context, id: &str, vector: &[f32], metadata: &Atom) -> Result<(), Error> {
        ctx.check()?;
        let record = self.record(id, vector, metadata)?;
        self.provider
            .upsert(ctx, &record.id, &record.vector, record.metadata)
            .await
    }

    pub async fn upsert_batch(&self, ctx: &Context, vectors: &[AtomicVector]) -> Result<(), Error> {
        ctx.check()?;
        let records = vectors
            .iter()
            .map(|v| self.record(&v.id, &v.vector, &v.metadata))
            .collect::<Result<Vec<_>, Error>>()?;
        self.provider.upsert_batch(ctx, records).await
    }

    pub async fn get(&self, ctx: &Context, id: &str) -> Result<AtomicVector, Error> {
        check_key(id)?;
        ctx.check()?;
        let (vector, info) = self.provider.get(ctx, id).await?;
        self.hydrate(SearchResult { vector, info })
    }

    pub async fn delete(&self, ctx: &Context, id: &str) -> Result<(), Error> {
        check_key(id)?;
        ctx.check()?;
        self.provider.delete(ctx, id).await
    }

    pub async fn delete_batch(&self, ctx: &Context, ids: &[String]) -> Result<(), Error> {
        for id in ids {
            check_key(id)?;
        }
        ctx.check()?;
        self.provider.delete_batch(ctx, ids).await
    }

    pub async fn exists(&self, ctx: &Context, id: &str) -> Result<bool, Error> {
        check_key(id)?;
        ctx.check()?;
        self.provider.exists(ctx, id).await
    }

    pub async fn list(&self, ctx: &Context, limit: usize) -> Result<Vec<String>, Error> {
        ctx.check()?;
        self.provider.list(ctx, limit).await
    }

    pub async fn search(
        &self,
        ctx: &Context,
        vector: &[f32],
        k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<AtomicVector>, Error> {
        ctx.check()?;
        validate_vector(vector)?;
        if let Some(filter) = filter {
            check_filter(&self.spec, filter)?;
        }
        let results = self.provider.search(ctx, vector, k, filter).await?;
        self.hydrate_all(results)
    }

    pub async fn query(
        &self,
        ctx: &Context,
        vector: &[f32],
        k: usize,
        filter: &Filter,
    ) -> Result<Vec<AtomicVector>, Error> {
        ctx.check()?;
        validate_vector(vector)?;
        check_filter(&self.spec, filter)?;
        let results = self.provider.query(ctx, vector, k, filter).await?;
        self.hydrate_all(results)
    }

    pub async fn filter(&self, ctx: &Context, filter: &Filter, limit: usize) -> Result<Vec<AtomicVector>, Error> {
        ctx.check()?;
        check_filter(&self.spec, filter)?;
        let results = self.provider.filter(ctx, filter, limit).await?;
        self.hydrate_all(results)
    }
}

/// Object-safe Atom access to a vector index.
#[async_trait]
pub trait ErasedIndex: Send + Sync {
    fn spec(&self) -> &Spec;

    async fn upsert(&self, ctx: &Context, id: &str, vector: &[f32], metadata: &Atom) -> Result<(), Error>;

    async fn get(&self, ctx: &Context, id: &str) -> Result<AtomicVector, Error>;

    async fn delete(&self, ctx: &Context, id: &str) -> Result<(), Error>;

    async fn exists(&self, ctx: &Context, id: &str) -> Result<bool, Error>;

    async fn search(
        &self,
        ctx: &Context,
        vector: &[f32],
        k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<AtomicVector>, Error>;

    async fn query(
        &self,
        ctx: &Context,
        vector: &[f32],
        k: usize,
        filter: &Filter,
    ) -> Result<Vec<AtomicVector>, Error>;

    async fn filter(&self, ctx: &Context, filter: &Filter, limit: usize) -> Result<Vec<AtomicVector>, Error>;
}

#[async_trait]
impl<T: Model> ErasedIndex for AtomicIndex<T> {
    fn spec(&self) -> &Spec {
        AtomicIndex::spec(self)
    }

    async fn upsert(&self, ctx: &Context, id: &str, vector: &[f32], metadata: &Atom) -> Result<(), Error> {
        AtomicIndex::upsert(self, ctx, id, vector, metadata).await
    }

    async fn get(&self, ctx: &Context, id: &str) -> Result<AtomicVector, Error> {
        AtomicIndex::get(self, ctx, id).await
    }

    async fn delete(&self, ctx: &Context, id: &str) -> Result<(), Error> {
        AtomicIndex::delete(self, ctx, id).await
    }

    async fn exists(&self, ctx: &Context, id: &str) -> Result<bool, Error> {
        AtomicIndex::exists(self, ctx, id).await
    }

    async fn search(
        &self,
        ctx: &Context,
        vector: &[f32],
        k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<AtomicVector>, Error> {
        AtomicIndex::search(self, ctx, vector, k, filter).await
    }

    async fn query(
        &self,
        ctx: &Context,
        vector: &[f32],
        k: usize,
        filter: &Filter,
    ) -> Result<Vec<AtomicVector>, Error> {
        AtomicIndex::query(self, ctx, vector, k, filter).await
    }

    async fn filter(&self, ctx: &Context, filter: &Filter, limit: usize) -> Result<Vec<AtomicVector>, Error> {
        AtomicIndex::filter(self, ctx, filter, limit).await
    }
}

//! Typed vector facade.

use std::marker::PhantomData;
use std::sync::Arc;

use stowage_core::provider::{SearchResult, VectorProvider, VectorRecord};
use stowage_core::{validate_vector, Codec, Context, Error, Filter, Model, Spec};

use crate::atomic::AtomicIndex;
use crate::convert::{from_value, to_value};
use crate::{check_filter, check_key, hooks};

/// A vector with its decoded metadata record.
#[derive(Clone, Debug, PartialEq)]
pub struct Vector<T> {
    pub id: String,
    pub vector: Vec<f32>,
    /// Distance to the query vector; zero outside of searches.
    pub score: f32,
    pub metadata: T,
}

impl<T> Vector<T> {
    pub fn new(id: impl Into<String>, vector: Vec<f32>, metadata: T) -> Self {
        Self {
            id: id.into(),
            vector,
            score: 0.0,
            metadata,
        }
    }
}

/// A vector index whose metadata records are `T`.
///
/// Searches rank by ascending distance under the provider's metric. Filters
/// address fields of `T` by their declared names and are checked against
/// `T`'s Spec before the provider sees them.
pub struct Index<T> {
    provider: Arc<dyn VectorProvider>,
    codec: Arc<dyn Codec>,
    spec: Arc<Spec>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Index<T> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            codec: Arc::clone(&self.codec),
            spec: Arc::clone(&self.spec),
            _marker: PhantomData,
        }
    }
}

impl<T: Model> Index<T> {
    pub fn new(provider: Arc<dyn VectorProvider>, codec: Arc<dyn Codec>) -> Result<Self, Error> {
        Ok(Self::with_spec(provider, codec, Arc::new(T::spec()?)))
    }

    pub fn with_spec(provider: Arc<dyn VectorProvider>, codec: Arc<dyn Codec>, spec: Arc<Spec>) -> Self {
        Self {
            provider,
            codec,
            spec,
            _marker: PhantomData,
        }
    }

    pub fn spec(&self) -> &Arc<Spec> {
        &self.spec
    }

    pub fn atomic(&self) -> AtomicIndex<T> {
        AtomicIndex::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.codec),
            Arc::clone(&self.spec),
        )
    }

    fn record(&self, ctx: &Context, id: &str, vector: &[f32], metadata: &mut T) -> Result<VectorRecord, Error> {
        check_key(id)?;
        validate_vector(vector)?;
        hooks::before_save(ctx, id, metadata)?;
        Ok(VectorRecord {
            id: id.to_string(),
            vector: vector.to_vec(),
            metadata: self.codec.encode(&to_value(metadata)?)?,
        })
    }

    fn hydrate(&self, ctx: &Context, result: SearchResult) -> Result<Vector<T>, Error> {
        let mut metadata: T = from_value(self.codec.decode(&result.info.metadata)?)?;
        hooks::after_load(ctx, &result.info.id, &mut metadata)?;
        Ok(Vector {
            id: result.info.id,
            vector: result.vector,
            score: result.info.score,
            metadata,
        })
    }

    fn hydrate_all(&self, ctx: &Context, results: Vec<SearchResult>) -> Result<Vec<Vector<T>>, Error> {
        results
            .into_iter()
            .map(|r| self.hydrate(ctx, r))
            .collect()
    }

    pub async fn upsert(&self, ctx: &Context, id: &str, vector: &[f32], metadata: &mut T) -> Result<(), Error> {
        ctx.check()?;
        let record = self.record(ctx, id, vector, metadata)?;
        log::debug!("{}: upsert {} (dim {})", self.spec.type_name(), id, vector.len());

        self.provider
            .upsert(ctx, &record.id, &record.vector, record.metadata)
            .await?;
        hooks::after_save(ctx, id, metadata)
    }

    /// Upsert many vectors. Every BeforeSave runs before the provider call.
    pub async fn upsert_batch(&self, ctx: &Context, vectors: &mut [Vector<T>]) -> Result<(), Error> {
        ctx.check()?;
        let mut records = Vec::with_capacity(vectors.len());
        for v in vectors.iter_mut() {
            records.push(self.record(ctx, &v.id, &v.vector, &mut v.metadata)?);
        }
        log::debug!("{}: upsert_batch {} vectors", self.spec.type_name(), records.len());

        self.provider.upsert_batch(ctx, records).await?;

        let mut first_err = None;
        for v in vectors.iter() {
            if let Err(e) = hooks::after_save(ctx, &v.id, &v.metadata) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    pub async fn get(&self, ctx: &Context, id: &str) -> Result<Vector<T>, Error> {
        check_key(id)?;
        ctx.check()?;
        let (vector, info) = self.provider.get(ctx, id).await?;
        self.hydrate(ctx, SearchResult { vector, info })
    }

    pub async fn delete(&self, ctx: &Context, id: &str) -> Result<(), Error> {
        check_key(id)?;
        ctx.check()?;
        hooks::before_delete::<T>(ctx, id)?;
        log::debug!("{}: delete {}", self.spec.type_name(), id);

        self.provider.delete(ctx, id).await?;
        hooks::after_delete::<T>(ctx, id)
    }

    pub async fn delete_batch(&self, ctx: &Context, ids: &[String]) -> Result<(), Error> {
        ctx.check()?;
        for id in ids {
            check_key(id)?;
            hooks::before_delete::<T>(ctx, id)?;
        }

        self.provider.delete_batch(ctx, ids).await?;

        let mut first_err = None;
        for id in ids {
            if let Err(e) = hooks::after_delete::<T>(ctx, id) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    pub async fn exists(&self, ctx: &Context, id: &str) -> Result<bool, Error> {
        check_key(id)?;
        ctx.check()?;
        self.provider.exists(ctx, id).await
    }

    /// Stored ids. `limit == 0` returns all.
    pub async fn list(&self, ctx: &Context, limit: usize) -> Result<Vec<String>, Error> {
        ctx.check()?;
        self.provider.list(ctx, limit).await
    }

    /// The `k` nearest vectors, optionally restricted by `filter`. `k == 0`
    /// is unbounded.
    pub async fn search(
        &self,
        ctx: &Context,
        vector: &[f32],
        k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<Vector<T>>, Error> {
        ctx.check()?;
        validate_vector(vector)?;
        if let Some(filter) = filter {
            check_filter(&self.spec, filter)?;
        }
        log::debug!("{}: search k={} filtered={}", self.spec.type_name(), k, filter.is_some());

        let results = self.provider.search(ctx, vector, k, filter).await?;
        self.hydrate_all(ctx, results)
    }

    /// Similarity search with a mandatory structured filter.
    pub async fn query(
        &self,
        ctx: &Context,
        vector: &[f32],
        k: usize,
        filter: &Filter,
    ) -> Result<Vec<Vector<T>>, Error> {
        ctx.check()?;
        validate_vector(vector)?;
        check_filter(&self.spec, filter)?;
        log::debug!("{}: query k={} op={}", self.spec.type_name(), k, filter.operator());

        let results = self.provider.query(ctx, vector, k, filter).await?;
        self.hydrate_all(ctx, results)
    }

    /// Metadata-only listing.
    pub async fn filter(&self, ctx: &Context, filter: &Filter, limit: usize) -> Result<Vec<Vector<T>>, Error> {
        ctx.check()?;
        check_filter(&self.spec, filter)?;

        let results = self.provider.filter(ctx, filter, limit).await?;
        self.hydrate_all(ctx, results)
    }
}

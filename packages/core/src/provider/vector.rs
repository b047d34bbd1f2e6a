use async_trait::async_trait;
use bytes::Bytes;

use crate::{Context, Error, Filter};

/// A vector to upsert, with codec-encoded metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: Bytes,
}

/// Backend-observed attributes of a stored vector.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VectorInfo {
    pub id: String,
    pub dimension: usize,
    /// Distance to the query vector; zero outside of searches.
    pub score: f32,
    pub metadata: Bytes,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SearchResult {
    pub vector: Vec<f32>,
    pub info: VectorInfo,
}

/// Vector index contract.
///
/// Searches rank by ascending distance under the index's metric with a
/// stable tie order. `k == 0` means unbounded. Filters address metadata
/// fields by name; a provider that cannot translate a node must fail with
/// `OperatorNotSupported`, and one without metadata-only listing must fail
/// every [`VectorProvider::filter`] call with `FilterNotSupported`.
#[async_trait]
pub trait VectorProvider: Send + Sync {
    async fn upsert(
        &self,
        ctx: &Context,
        id: &str,
        vector: &[f32],
        metadata: Bytes,
    ) -> Result<(), Error>;

    async fn upsert_batch(&self, ctx: &Context, records: Vec<VectorRecord>) -> Result<(), Error>;

    /// Fetch a vector. `NotFound` if the id is absent.
    async fn get(&self, ctx: &Context, id: &str) -> Result<(Vec<f32>, VectorInfo), Error>;

    /// Remove a vector. `NotFound` if the id is absent.
    async fn delete(&self, ctx: &Context, id: &str) -> Result<(), Error>;

    async fn delete_batch(&self, ctx: &Context, ids: &[String]) -> Result<(), Error>;

    async fn search(
        &self,
        ctx: &Context,
        vector: &[f32],
        k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<SearchResult>, Error>;

    async fn query(
        &self,
        ctx: &Context,
        vector: &[f32],
        k: usize,
        filter: &Filter,
    ) -> Result<Vec<SearchResult>, Error>;

    /// Metadata-only listing, without a similarity component.
    async fn filter(
        &self,
        ctx: &Context,
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<SearchResult>, Error>;

    /// Stored ids. `limit == 0` returns all.
    async fn list(&self, ctx: &Context, limit: usize) -> Result<Vec<String>, Error>;

    async fn exists(&self, ctx: &Context, id: &str) -> Result<bool, Error>;
}

//! Trait defining the contract for CRM record store access.

use async_trait::async_trait;

use crate::errors::CrmError;
use crate::models::{BatchUpdateInput, CrmRecord, SearchRequest, SearchResponse};

/// Trait for talking to the CRM record store.
///
/// Implemented by [`CrmApiClient`](crate::client::CrmApiClient) over HTTP;
/// core services depend on this trait so tests can substitute mocks.
///
/// Batch methods accept at most [`CRM_BATCH_LIMIT`](crate::chunk::CRM_BATCH_LIMIT)
/// ids per call and fail with [`CrmError::BatchTooLarge`] otherwise. Chunking
/// is the caller's responsibility via [`chunk_ids`](crate::chunk::chunk_ids).
#[async_trait]
pub trait CrmApi: Send + Sync {
    /// Search records of an object type with filter groups and pagination.
    async fn search_records(
        &self,
        object_type: &str,
        request: SearchRequest,
    ) -> Result<SearchResponse, CrmError>;

    /// Read a batch of records by id, returning the requested properties.
    async fn batch_read(
        &self,
        object_type: &str,
        ids: &[String],
        properties: &[String],
    ) -> Result<Vec<CrmRecord>, CrmError>;

    /// Update a batch of records, returning the records the CRM reports
    /// as updated. A record missing from the result did not get written.
    async fn batch_update(
        &self,
        object_type: &str,
        inputs: Vec<BatchUpdateInput>,
    ) -> Result<Vec<CrmRecord>, CrmError>;
}

//! Platform adapters and the dispatch that selects one per request.
//!
//! A request goes through three steps: its parameters are validated into a
//! [`QueryPlan`] without touching any backend, the plan is opened into a
//! [`PlatformHandle`] holding a fresh client, and the handle is fetched from
//! and then released. [`fetch_and_release`] runs all three and guarantees the
//! release on every path once a client exists.

pub mod columnar;
pub mod document;
pub mod relational;

use std::time::Instant;

use tracing::{info, warn};

use crate::backend::Backends;
use crate::core::{ConnectionDescriptor, NormalizedResult, Platform, RequestContext, Result};
use columnar::{ColumnarHandle, ColumnarPlan};
use document::{DocumentHandle, DocumentPlan};
use relational::{RelationalHandle, RelationalPlan};

/// Validated parameters for one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPlan {
    Columnar(ColumnarPlan),
    Document(DocumentPlan),
    Relational(RelationalPlan),
}

impl QueryPlan {
    pub fn for_descriptor(descriptor: &ConnectionDescriptor) -> Result<Self> {
        let params = descriptor.params();
        Ok(match descriptor.platform() {
            Platform::Columnar => QueryPlan::Columnar(ColumnarPlan::from_params(params)?),
            Platform::Document => QueryPlan::Document(DocumentPlan::from_params(params)?),
            Platform::Relational => QueryPlan::Relational(RelationalPlan::from_params(params)?),
        })
    }

    pub fn platform(&self) -> Platform {
        match self {
            QueryPlan::Columnar(_) => Platform::Columnar,
            QueryPlan::Document(_) => Platform::Document,
            QueryPlan::Relational(_) => Platform::Relational,
        }
    }

    /// Open a client on the matching backend.
    pub async fn open(self, backends: &Backends, ctx: &RequestContext) -> Result<PlatformHandle> {
        Ok(match self {
            QueryPlan::Columnar(plan) => {
                PlatformHandle::Columnar(plan.open(backends.warehouse.as_ref(), ctx).await?)
            }
            QueryPlan::Document(plan) => {
                PlatformHandle::Document(plan.open(backends.documents.as_ref(), ctx).await?)
            }
            QueryPlan::Relational(plan) => {
                PlatformHandle::Relational(plan.open(backends.sql.as_ref(), ctx).await?)
            }
        })
    }
}

/// An adapter with a live client. Must be released exactly once.
pub enum PlatformHandle {
    Columnar(ColumnarHandle),
    Document(DocumentHandle),
    Relational(RelationalHandle),
}

impl PlatformHandle {
    pub fn platform(&self) -> Platform {
        match self {
            PlatformHandle::Columnar(_) => Platform::Columnar,
            PlatformHandle::Document(_) => Platform::Document,
            PlatformHandle::Relational(_) => Platform::Relational,
        }
    }

    pub fn is_released(&self) -> bool {
        match self {
            PlatformHandle::Columnar(h) => h.is_released(),
            PlatformHandle::Document(h) => h.is_released(),
            PlatformHandle::Relational(h) => h.is_released(),
        }
    }

    pub async fn fetch(&mut self, ctx: &RequestContext) -> Result<NormalizedResult> {
        match self {
            PlatformHandle::Columnar(h) => h.fetch(ctx).await,
            PlatformHandle::Document(h) => h.fetch(ctx).await,
            PlatformHandle::Relational(h) => h.fetch(ctx).await,
        }
    }

    /// Close the client. Calling it again is a no-op.
    pub async fn release(&mut self) -> Result<()> {
        match self {
            PlatformHandle::Columnar(h) => h.release().await,
            PlatformHandle::Document(h) => h.release().await,
            PlatformHandle::Relational(h) => h.release().await,
        }
    }
}

impl Drop for PlatformHandle {
    fn drop(&mut self) {
        if !self.is_released() {
            warn!(
                platform = %self.platform(),
                "platform handle dropped without release"
            );
        }
    }
}

/// Validate `descriptor` and open a client for its platform.
///
/// Validation failures return before any backend is contacted.
pub async fn dispatch(
    descriptor: &ConnectionDescriptor,
    backends: &Backends,
    ctx: &RequestContext,
) -> Result<PlatformHandle> {
    let plan = QueryPlan::for_descriptor(descriptor)?;
    plan.open(backends, ctx).await
}

/// Dispatch, fetch, then release. A release failure is logged and never
/// replaces the fetch outcome.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use datadrive::backend::Backends;
/// use datadrive::backend::memory::{MemoryDocumentStore, MemorySqlConnector, MemoryWarehouse};
/// use datadrive::{ConnectionDescriptor, RequestContext, fetch_and_release};
///
/// # tokio_test::block_on(async {
/// let documents = MemoryDocumentStore::new();
/// let backends = Backends::new(
///     Arc::new(MemoryWarehouse::new()),
///     Arc::new(documents.clone()),
///     Arc::new(MemorySqlConnector::new(Vec::<String>::new())),
/// );
///
/// let descriptor = ConnectionDescriptor::parse("/document/my-project").unwrap();
/// let ctx = RequestContext::with_timeout(Duration::from_secs(5));
/// let result = fetch_and_release(&descriptor, &backends, &ctx).await.unwrap();
///
/// assert!(result.is_empty());
/// assert_eq!(documents.stats().closed(), 1);
/// # });
/// ```
pub async fn fetch_and_release(
    descriptor: &ConnectionDescriptor,
    backends: &Backends,
    ctx: &RequestContext,
) -> Result<NormalizedResult> {
    let started = Instant::now();
    let platform = descriptor.platform();

    let mut handle = dispatch(descriptor, backends, ctx).await?;
    let outcome = handle.fetch(ctx).await;

    if let Err(err) = handle.release().await {
        warn!(%platform, error = %err, "failed to release platform client");
    }

    match &outcome {
        Ok(result) => info!(
            %platform,
            records = result.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fetched"
        ),
        Err(err) => warn!(
            %platform,
            code = err.code(),
            error = %err,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fetch failed"
        ),
    }
    outcome
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::{Value, json};

    use super::*;
    use crate::backend::memory::{MemoryDocumentStore, MemorySqlConnector, MemoryWarehouse};
    use crate::core::{DriveError, Record};

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    struct Fixture {
        warehouse: MemoryWarehouse,
        documents: MemoryDocumentStore,
        backends: Backends,
    }

    fn fixture(warehouse: MemoryWarehouse) -> Fixture {
        let documents = MemoryDocumentStore::new();
        let backends = Backends::new(
            Arc::new(warehouse.clone()),
            Arc::new(documents.clone()),
            Arc::new(MemorySqlConnector::new(Vec::<String>::new())),
        );
        Fixture {
            warehouse,
            documents,
            backends,
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::with_timeout(Duration::from_secs(5))
    }

    #[test]
    fn plans_follow_descriptor_platform() {
        let descriptor = ConnectionDescriptor::parse("/document/proj/users/ada").unwrap();
        let plan = QueryPlan::for_descriptor(&descriptor).unwrap();
        assert_eq!(plan.platform(), Platform::Document);
    }

    #[tokio::test]
    async fn invalid_parameters_never_open_a_client() {
        let fx = fixture(MemoryWarehouse::new());
        let descriptor = ConnectionDescriptor::parse("/columnar/p1/d1").unwrap();

        let err = fetch_and_release(&descriptor, &fx.backends, &ctx()).await.unwrap_err();
        assert!(matches!(err, DriveError::InvalidParameters { .. }));
        assert_eq!(fx.warehouse.stats().opened(), 0);
    }

    #[tokio::test]
    async fn releases_after_successful_fetch() {
        let fx = fixture(MemoryWarehouse::new().with_page_size(1));
        fx.warehouse.insert_table(
            "p1.d1.v1",
            vec![record(json!({"a": 1})), record(json!({"a": 2}))],
        );
        let descriptor = ConnectionDescriptor::parse("/columnar/p1/d1/v1").unwrap();

        let result = fetch_and_release(&descriptor, &fx.backends, &ctx()).await.unwrap();
        assert_eq!(serde_json::to_value(&result).unwrap(), json!([{"a": 1}, {"a": 2}]));
        assert_eq!(fx.warehouse.stats().opened(), 1);
        assert_eq!(fx.warehouse.stats().closed(), 1);
    }

    #[tokio::test]
    async fn releases_after_failed_fetch() {
        let fx = fixture(MemoryWarehouse::new().with_page_size(1).fail_at_page(1));
        fx.warehouse.insert_table(
            "p1.d1.v1",
            vec![record(json!({"a": 1})), record(json!({"a": 2}))],
        );
        let descriptor = ConnectionDescriptor::parse("/columnar/p1/d1/v1").unwrap();

        let err = fetch_and_release(&descriptor, &fx.backends, &ctx()).await.unwrap_err();
        assert!(matches!(err, DriveError::ReadFailure(_)));
        assert_eq!(fx.warehouse.stats().opened(), 1);
        assert_eq!(fx.warehouse.stats().closed(), 1);
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let fx = fixture(MemoryWarehouse::new());
        let descriptor = ConnectionDescriptor::parse("/document/p1/users").unwrap();

        let mut handle = dispatch(&descriptor, &fx.backends, &ctx()).await.unwrap();
        assert!(!handle.is_released());
        handle.release().await.unwrap();
        handle.release().await.unwrap();
        assert!(handle.is_released());
        assert_eq!(fx.documents.stats().closed(), 1);
    }

    #[tokio::test]
    async fn cancelled_request_still_releases() {
        let fx = fixture(MemoryWarehouse::new());
        fx.warehouse.insert_table("p1.d1.v1", vec![record(json!({"a": 1}))]);
        let descriptor = ConnectionDescriptor::parse("/columnar/p1/d1/v1").unwrap();

        let ctx = ctx();
        let mut handle = dispatch(&descriptor, &fx.backends, &ctx).await.unwrap();
        ctx.cancellation_token().cancel();

        let err = handle.fetch(&ctx).await.unwrap_err();
        assert!(matches!(err, DriveError::Cancelled));
        handle.release().await.unwrap();
        assert_eq!(fx.warehouse.stats().closed(), 1);
    }

    #[tokio::test]
    async fn missing_document_is_not_found() {
        let fx = fixture(MemoryWarehouse::new());
        fx.documents.insert("p1", "users/ada", record(json!({"name": "Ada"})));

        let found = ConnectionDescriptor::parse("/document/p1/users/ada").unwrap();
        let result = fetch_and_release(&found, &fx.backends, &ctx()).await.unwrap();
        assert_eq!(serde_json::to_value(&result).unwrap(), json!({"name": "Ada"}));

        let missing = ConnectionDescriptor::parse("/document/p1/users/bob").unwrap();
        let err = fetch_and_release(&missing, &fx.backends, &ctx()).await.unwrap_err();
        assert!(matches!(err, DriveError::NotFound(_)));
        assert_eq!(fx.documents.stats().opened(), 2);
        assert_eq!(fx.documents.stats().closed(), 2);
    }
}

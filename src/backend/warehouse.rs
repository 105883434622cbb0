use async_trait::async_trait;

use crate::core::{Record, Result};

/// Position of the next page of a running warehouse query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    pub job_id: String,
    pub location: Option<String>,
    pub page_token: String,
}

/// One page of decoded rows plus the cursor for the page after it.
#[derive(Debug, Default)]
pub struct RowPage {
    pub rows: Vec<Record>,
    pub next: Option<PageCursor>,
}

/// Opens warehouse clients scoped to a project.
#[async_trait]
pub trait WarehouseConnector: Send + Sync {
    async fn connect(&self, project: &str) -> Result<Box<dyn WarehouseClient>>;
}

/// A connected warehouse client.
#[async_trait]
pub trait WarehouseClient: Send + Sync {
    /// Start `sql` and return its first page of rows.
    async fn query(&self, sql: &str) -> Result<RowPage>;

    async fn next_page(&self, cursor: &PageCursor) -> Result<RowPage>;

    async fn close(self: Box<Self>) -> Result<()>;
}

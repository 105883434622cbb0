use async_trait::async_trait;

use crate::core::{Record, Result};

/// A stored document: its own identifier plus its field map.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Record,
}

#[derive(Debug, Default)]
pub struct DocumentPage {
    pub documents: Vec<Document>,
    pub next_page_token: Option<String>,
}

/// Opens document-store clients scoped to a project.
#[async_trait]
pub trait DocumentConnector: Send + Sync {
    async fn connect(&self, project: &str) -> Result<Box<dyn DocumentClient>>;
}

#[async_trait]
pub trait DocumentClient: Send + Sync {
    /// Fetch one document by its full slash-separated path.
    async fn get(&self, path: &str) -> Result<Option<Document>>;

    /// List the documents directly under `collection`. An empty collection
    /// path lists the documents of every top-level collection.
    async fn list(&self, collection: &str, page_token: Option<&str>) -> Result<DocumentPage>;

    async fn close(self: Box<Self>) -> Result<()>;
}

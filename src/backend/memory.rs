//! In-memory backends.
//!
//! Used by the integration tests and for running the service locally without
//! cloud credentials. Each store counts the clients it hands out and how many
//! of them were closed, so callers can check the release discipline.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use sqlx::Connection;
use sqlx::sqlite::SqliteConnection;

use super::docstore::{Document, DocumentClient, DocumentConnector, DocumentPage};
use super::sql::{ConnectionTarget, SqlConnector, SqlSession, SqlxSession};
use super::warehouse::{PageCursor, RowPage, WarehouseClient, WarehouseConnector};
use crate::core::{DriveError, Record, Result};

/// Client open/close counters shared between a store and its clients.
#[derive(Debug, Default)]
pub struct ClientStats {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl ClientStats {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    fn open(&self) {
        self.opened.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Warehouse
// ---------------------------------------------------------------------------

#[derive(Default)]
struct WarehouseState {
    tables: HashMap<String, Vec<Record>>,
    queries: Vec<String>,
}

/// Warehouse holding whole tables keyed by `project.dataset.view`.
///
/// Understands exactly the statements the columnar adapter issues:
/// ``SELECT * FROM `project.dataset.view` ``.
#[derive(Clone)]
pub struct MemoryWarehouse {
    state: Arc<RwLock<WarehouseState>>,
    stats: Arc<ClientStats>,
    page_size: usize,
    fail_at_page: Option<usize>,
}

impl Default for MemoryWarehouse {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(WarehouseState::default())),
            stats: Arc::new(ClientStats::default()),
            page_size: 100,
            fail_at_page: None,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Make the read of page `page` (0-based) fail.
    pub fn fail_at_page(mut self, page: usize) -> Self {
        self.fail_at_page = Some(page);
        self
    }

    pub fn insert_table(&self, path: &str, rows: Vec<Record>) {
        if let Ok(mut state) = self.state.write() {
            state.tables.insert(path.to_string(), rows);
        }
    }

    pub fn executed_queries(&self) -> Vec<String> {
        self.state
            .read()
            .map(|state| state.queries.clone())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> Arc<ClientStats> {
        Arc::clone(&self.stats)
    }

    fn page(&self, table: &str, index: usize) -> Result<RowPage> {
        if self.fail_at_page == Some(index) {
            return Err(DriveError::read_failure(format!(
                "injected failure reading page {index} of {table}"
            )));
        }

        let state = self
            .state
            .read()
            .map_err(|_| DriveError::read_failure("warehouse state poisoned"))?;
        let rows = state
            .tables
            .get(table)
            .ok_or_else(|| DriveError::read_failure(format!("table {table} not found")))?;

        let start = index * self.page_size;
        let end = (start + self.page_size).min(rows.len());
        let next = (end < rows.len()).then(|| PageCursor {
            job_id: table.to_string(),
            location: None,
            page_token: (index + 1).to_string(),
        });

        Ok(RowPage {
            rows: rows.get(start..end).map(<[Record]>::to_vec).unwrap_or_default(),
            next,
        })
    }
}

#[async_trait]
impl WarehouseConnector for MemoryWarehouse {
    async fn connect(&self, _project: &str) -> Result<Box<dyn WarehouseClient>> {
        self.stats.open();
        Ok(Box::new(MemoryWarehouseClient {
            warehouse: self.clone(),
        }))
    }
}

struct MemoryWarehouseClient {
    warehouse: MemoryWarehouse,
}

#[async_trait]
impl WarehouseClient for MemoryWarehouseClient {
    async fn query(&self, sql: &str) -> Result<RowPage> {
        if let Ok(mut state) = self.warehouse.state.write() {
            state.queries.push(sql.to_string());
        }

        let table = sql
            .strip_prefix("SELECT * FROM `")
            .and_then(|rest| rest.strip_suffix('`'))
            .ok_or_else(|| DriveError::read_failure(format!("unsupported statement: {sql}")))?;
        self.warehouse.page(table, 0)
    }

    async fn next_page(&self, cursor: &PageCursor) -> Result<RowPage> {
        let index = cursor
            .page_token
            .parse::<usize>()
            .map_err(|_| DriveError::read_failure("invalid page token"))?;
        self.warehouse.page(&cursor.job_id, index)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.warehouse.stats.close();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Document store
// ---------------------------------------------------------------------------

/// Document store holding documents by project and full document path.
#[derive(Clone)]
pub struct MemoryDocumentStore {
    projects: Arc<RwLock<HashMap<String, BTreeMap<String, Record>>>>,
    stats: Arc<ClientStats>,
    page_size: usize,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            projects: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(ClientStats::default()),
            page_size: 100,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Store `fields` at `path` (`collection/doc[/collection/doc...]`).
    pub fn insert(&self, project: &str, path: &str, fields: Record) {
        if let Ok(mut projects) = self.projects.write() {
            projects
                .entry(project.to_string())
                .or_default()
                .insert(path.to_string(), fields);
        }
    }

    pub fn stats(&self) -> Arc<ClientStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl DocumentConnector for MemoryDocumentStore {
    async fn connect(&self, project: &str) -> Result<Box<dyn DocumentClient>> {
        self.stats.open();
        Ok(Box::new(MemoryDocumentClient {
            store: self.clone(),
            project: project.to_string(),
        }))
    }
}

struct MemoryDocumentClient {
    store: MemoryDocumentStore,
    project: String,
}

impl MemoryDocumentClient {
    fn documents(&self) -> Result<BTreeMap<String, Record>> {
        let projects = self
            .store
            .projects
            .read()
            .map_err(|_| DriveError::read_failure("document store state poisoned"))?;
        Ok(projects.get(&self.project).cloned().unwrap_or_default())
    }
}

fn parent_and_id(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((parent, id)) => (parent, id),
        None => ("", path),
    }
}

#[async_trait]
impl DocumentClient for MemoryDocumentClient {
    async fn get(&self, path: &str) -> Result<Option<Document>> {
        Ok(self.documents()?.remove(path).map(|fields| Document {
            id: parent_and_id(path).1.to_string(),
            fields,
        }))
    }

    async fn list(&self, collection: &str, page_token: Option<&str>) -> Result<DocumentPage> {
        let offset = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| DriveError::read_failure("invalid page token"))?,
            None => 0,
        };

        let matching: Vec<Document> = self
            .documents()?
            .into_iter()
            .filter(|(path, _)| {
                let (parent, _) = parent_and_id(path);
                if collection.is_empty() {
                    !parent.is_empty() && !parent.contains('/')
                } else {
                    parent == collection
                }
            })
            .map(|(path, fields)| Document {
                id: parent_and_id(&path).1.to_string(),
                fields,
            })
            .collect();

        let end = (offset + self.store.page_size).min(matching.len());
        let next_page_token = (end < matching.len()).then(|| end.to_string());
        let documents = matching.into_iter().skip(offset).take(end.saturating_sub(offset)).collect();

        Ok(DocumentPage {
            documents,
            next_page_token,
        })
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.store.stats.close();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Relational
// ---------------------------------------------------------------------------

/// Opens a fresh in-memory SQLite database per session and runs the seed
/// statements on it, whatever the requested target.
#[derive(Clone)]
pub struct MemorySqlConnector {
    seed: Arc<Vec<String>>,
    stats: Arc<ClientStats>,
    targets: Arc<RwLock<Vec<ConnectionTarget>>>,
}

impl MemorySqlConnector {
    pub fn new<I, S>(seed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            seed: Arc::new(seed.into_iter().map(Into::into).collect()),
            stats: Arc::new(ClientStats::default()),
            targets: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn stats(&self) -> Arc<ClientStats> {
        Arc::clone(&self.stats)
    }

    /// Targets sessions were opened for, in order.
    pub fn opened_targets(&self) -> Vec<ConnectionTarget> {
        self.targets
            .read()
            .map(|targets| targets.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SqlConnector for MemorySqlConnector {
    async fn open(&self, target: &ConnectionTarget) -> Result<Box<dyn SqlSession>> {
        let mut conn = SqliteConnection::connect("sqlite::memory:")
            .await
            .map_err(|e| DriveError::unavailable(format!("cannot open sqlite: {e}")))?;

        for statement in self.seed.iter() {
            sqlx::query(statement)
                .execute(&mut conn)
                .await
                .map_err(|e| DriveError::unavailable(format!("seed statement failed: {e}")))?;
        }

        if let Ok(mut targets) = self.targets.write() {
            targets.push(target.clone());
        }
        self.stats.open();

        Ok(Box::new(CountingSession {
            inner: Box::new(SqlxSession::Sqlite(conn)),
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct CountingSession {
    inner: Box<SqlxSession>,
    stats: Arc<ClientStats>,
}

#[async_trait]
impl SqlSession for CountingSession {
    async fn select_all(&mut self, sql: &str) -> Result<super::sql::SqlRows> {
        self.inner.select_all(sql).await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.stats.close();
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[tokio::test]
    async fn warehouse_pages_through_table() {
        let warehouse = MemoryWarehouse::new().with_page_size(2);
        warehouse.insert_table(
            "p.d.v",
            (0..5).map(|i| record(json!({ "i": i }))).collect(),
        );

        let client = warehouse.connect("p").await.unwrap();
        let mut page = client.query("SELECT * FROM `p.d.v`").await.unwrap();
        let mut total = page.rows.len();
        while let Some(cursor) = page.next.take() {
            page = client.next_page(&cursor).await.unwrap();
            total += page.rows.len();
        }
        assert_eq!(total, 5);

        client.close().await.unwrap();
        assert_eq!(warehouse.stats().opened(), 1);
        assert_eq!(warehouse.stats().closed(), 1);
    }

    #[tokio::test]
    async fn document_listing_only_returns_direct_children() {
        let store = MemoryDocumentStore::new();
        store.insert("p", "users/ada", record(json!({"n": 1})));
        store.insert("p", "users/bob", record(json!({"n": 2})));
        store.insert("p", "users/ada/posts/p1", record(json!({"n": 3})));

        let client = store.connect("p").await.unwrap();
        let users = client.list("users", None).await.unwrap();
        let ids: Vec<_> = users.documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["ada", "bob"]);

        let posts = client.list("users/ada/posts", None).await.unwrap();
        assert_eq!(posts.documents.len(), 1);

        let root = client.list("", None).await.unwrap();
        assert_eq!(root.documents.len(), 2);
    }

    #[tokio::test]
    async fn document_listing_is_paged() {
        let store = MemoryDocumentStore::new().with_page_size(2);
        for id in ["a", "b", "c"] {
            store.insert("p", &format!("items/{id}"), Record::new());
        }

        let client = store.connect("p").await.unwrap();
        let first = client.list("items", None).await.unwrap();
        assert_eq!(first.documents.len(), 2);
        let token = first.next_page_token.expect("second page");
        let second = client.list("items", Some(&token)).await.unwrap();
        assert_eq!(second.documents.len(), 1);
        assert!(second.next_page_token.is_none());
    }
}

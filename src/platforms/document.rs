//! Document store adapter: `/document/<project>/<collection>/<document>/...`.
//!
//! The store names things by alternating collection and document segments,
//! so the parity of the path after the project decides what is addressed:
//! an even number of segments ends on a document, an odd number on a
//! collection. An empty path lists the top-level collections' documents.

use serde_json::Value;
use tracing::debug;

use crate::backend::docstore::{DocumentClient, DocumentConnector};
use crate::core::ident;
use crate::core::{DriveError, NormalizedResult, Platform, RequestContext, Result};

const PLATFORM: Platform = Platform::Document;

/// Field added to every record of a collection read.
pub const DOC_ID_FIELD: &str = "docid";

fn invalid(reason: impl Into<String>) -> DriveError {
    DriveError::invalid_parameters(PLATFORM.token(), PLATFORM.path_shape(), reason)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPlan {
    project: String,
    segments: Vec<String>,
}

impl DocumentPlan {
    pub fn from_params(params: &[String]) -> Result<Self> {
        let Some((project, segments)) = params.split_first() else {
            return Err(invalid("expected at least 1 parameter, got 0"));
        };

        if !ident::is_project_id(project) {
            return Err(invalid(format!("{project:?} is not a valid project id")));
        }
        if let Some(bad) = segments
            .iter()
            .find(|s| matches!(s.as_str(), "" | "." | "..") || s.contains('/'))
        {
            return Err(invalid(format!("{bad:?} is not a valid path segment")));
        }

        Ok(Self {
            project: project.clone(),
            segments: segments.to_vec(),
        })
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn is_single_document(&self) -> bool {
        !self.segments.is_empty() && self.segments.len() % 2 == 0
    }

    pub fn item_path(&self) -> String {
        self.segments.join("/")
    }

    pub async fn open(
        self,
        connector: &dyn DocumentConnector,
        ctx: &RequestContext,
    ) -> Result<DocumentHandle> {
        let client = ctx.run(connector.connect(&self.project)).await?;
        Ok(DocumentHandle {
            client: Some(client),
            is_single_document: self.is_single_document(),
            item_path: self.item_path(),
            project: self.project,
        })
    }
}

pub struct DocumentHandle {
    client: Option<Box<dyn DocumentClient>>,
    project: String,
    item_path: String,
    is_single_document: bool,
}

impl DocumentHandle {
    pub fn is_single_document(&self) -> bool {
        self.is_single_document
    }

    pub fn item_path(&self) -> &str {
        &self.item_path
    }

    pub fn is_released(&self) -> bool {
        self.client.is_none()
    }

    pub async fn fetch(&mut self, ctx: &RequestContext) -> Result<NormalizedResult> {
        let client = self
            .client
            .as_deref()
            .ok_or_else(|| DriveError::read_failure("document client already released"))?;

        if self.is_single_document {
            let document = ctx.run(client.get(&self.item_path)).await?.ok_or_else(|| {
                DriveError::not_found(format!(
                    "document {} does not exist in project {}",
                    self.item_path, self.project
                ))
            })?;
            return Ok(NormalizedResult::Document(document.fields));
        }

        let mut records = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = ctx
                .run(client.list(&self.item_path, page_token.as_deref()))
                .await?;

            records.extend(page.documents.into_iter().map(|document| {
                let mut fields = document.fields;
                fields.insert(DOC_ID_FIELD.to_string(), Value::String(document.id));
                fields
            }));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(documents = records.len(), collection = %self.item_path, "collection drained");
        Ok(NormalizedResult::Records(records))
    }

    pub async fn release(&mut self) -> Result<()> {
        match self.client.take() {
            Some(client) => client.close().await,
            None => Ok(()),
        }
    }
}

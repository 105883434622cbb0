//! Firestore over its REST API (`documents.get`, `documents.list` and
//! `documents.listCollectionIds`).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Number, Value, json};

use super::auth::TokenSource;
use super::docstore::{Document, DocumentClient, DocumentConnector, DocumentPage};
use super::google_error_message;
use crate::core::{DriveError, Record, Result};

pub struct FirestoreConnector {
    http: reqwest::Client,
    endpoint: String,
    database: String,
    tokens: TokenSource,
    page_size: u32,
}

impl FirestoreConnector {
    pub fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        database: impl Into<String>,
        tokens: TokenSource,
        page_size: u32,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            database: database.into(),
            tokens,
            page_size,
        }
    }

    /// Point at a local emulator (`host:port`), which speaks plain HTTP.
    pub fn emulator(http: reqwest::Client, host: &str, database: impl Into<String>, page_size: u32) -> Self {
        Self::new(
            http,
            format!("http://{host}/v1"),
            database,
            TokenSource::Emulator,
            page_size,
        )
    }
}

#[async_trait]
impl DocumentConnector for FirestoreConnector {
    async fn connect(&self, project: &str) -> Result<Box<dyn DocumentClient>> {
        let token = self.tokens.access_token(&self.http).await?;
        Ok(Box::new(FirestoreClient {
            http: self.http.clone(),
            documents_url: format!(
                "{}/projects/{}/databases/{}/documents",
                self.endpoint,
                urlencoding::encode(project),
                urlencoding::encode(&self.database)
            ),
            token,
            page_size: self.page_size,
        }))
    }
}

struct FirestoreClient {
    http: reqwest::Client,
    documents_url: String,
    token: String,
    page_size: u32,
}

#[derive(Debug, Deserialize)]
struct FirestoreDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<FirestoreDocument>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListCollectionIdsResponse {
    #[serde(default)]
    collection_ids: Vec<String>,
    next_page_token: Option<String>,
}

/// A Firestore typed value as the REST API encodes it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
enum TypedValue {
    NullValue(Value),
    BooleanValue(bool),
    IntegerValue(String),
    DoubleValue(Value),
    TimestampValue(String),
    StringValue(String),
    BytesValue(String),
    ReferenceValue(String),
    GeoPointValue(GeoPoint),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

#[derive(Debug, Deserialize)]
struct GeoPoint {
    #[serde(default)]
    latitude: f64,
    #[serde(default)]
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct ArrayValue {
    #[serde(default)]
    values: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct MapValue {
    #[serde(default)]
    fields: Map<String, Value>,
}

impl FirestoreClient {
    fn url_for(&self, path: &str) -> String {
        let encoded = path
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/{}", self.documents_url, encoded)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| DriveError::read_failure(format!("firestore request failed: {e}")))
    }

    async fn list_page(&self, collection: &str, page_token: Option<&str>) -> Result<DocumentPage> {
        let mut params = vec![("pageSize", self.page_size.to_string())];
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        let response = self
            .send(self.http.get(self.url_for(collection)).query(&params))
            .await?;
        if !response.status().is_success() {
            return Err(error_for(response).await);
        }

        let listing: ListDocumentsResponse = response
            .json()
            .await
            .map_err(|e| DriveError::read_failure(format!("invalid firestore listing: {e}")))?;

        let documents = listing
            .documents
            .into_iter()
            .map(decode_document)
            .collect::<Result<Vec<_>>>()?;

        Ok(DocumentPage {
            documents,
            next_page_token: listing.next_page_token.filter(|token| !token.is_empty()),
        })
    }

    /// Ids of the top-level collections, across all pages.
    async fn collection_ids(&self) -> Result<Vec<String>> {
        let url = format!("{}:listCollectionIds", self.documents_url);
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut body = json!({ "pageSize": self.page_size });
            if let Some(token) = &page_token {
                body["pageToken"] = Value::String(token.clone());
            }

            let response = self.send(self.http.post(&url).json(&body)).await?;
            if !response.status().is_success() {
                return Err(error_for(response).await);
            }
            let listing: ListCollectionIdsResponse = response.json().await.map_err(|e| {
                DriveError::read_failure(format!("invalid firestore collection listing: {e}"))
            })?;

            ids.extend(listing.collection_ids);
            match listing.next_page_token.filter(|token| !token.is_empty()) {
                Some(next) => page_token = Some(next),
                None => return Ok(ids),
            }
        }
    }
}

async fn error_for(response: reqwest::Response) -> DriveError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    DriveError::read_failure(format!(
        "firestore returned {status}: {}",
        google_error_message(&body)
    ))
}

#[async_trait]
impl DocumentClient for FirestoreClient {
    async fn get(&self, path: &str) -> Result<Option<Document>> {
        let response = self.send(self.http.get(self.url_for(path))).await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(error_for(response).await);
        }

        let document: FirestoreDocument = response
            .json()
            .await
            .map_err(|e| DriveError::read_failure(format!("invalid firestore document: {e}")))?;
        decode_document(document).map(Some)
    }

    async fn list(&self, collection: &str, page_token: Option<&str>) -> Result<DocumentPage> {
        if !collection.is_empty() {
            return self.list_page(collection, page_token).await;
        }

        // The root has no documents of its own. Its listing is the documents
        // of every top-level collection, drained into one page.
        let mut documents = Vec::new();
        for id in self.collection_ids().await? {
            let mut token: Option<String> = None;
            loop {
                let page = self.list_page(&id, token.as_deref()).await?;
                documents.extend(page.documents);
                match page.next_page_token {
                    Some(next) => token = Some(next),
                    None => break,
                }
            }
        }
        Ok(DocumentPage {
            documents,
            next_page_token: None,
        })
    }

    /// The REST client is stateless; there is no connection to close.
    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

fn decode_document(document: FirestoreDocument) -> Result<Document> {
    let id = document
        .name
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();
    Ok(Document {
        id,
        fields: decode_fields(document.fields)?,
    })
}

fn decode_fields(fields: Map<String, Value>) -> Result<Record> {
    fields
        .into_iter()
        .map(|(name, value)| decode_value(value).map(|decoded| (name, decoded)))
        .collect()
}

fn decode_value(raw: Value) -> Result<Value> {
    let typed: TypedValue = serde_json::from_value(raw)
        .map_err(|e| DriveError::read_failure(format!("unrecognised firestore value: {e}")))?;

    Ok(match typed {
        TypedValue::NullValue(_) => Value::Null,
        TypedValue::BooleanValue(b) => Value::Bool(b),
        TypedValue::IntegerValue(text) => match text.parse::<i64>() {
            Ok(n) => Value::Number(n.into()),
            Err(_) => Value::String(text),
        },
        // Non-finite doubles arrive as the strings "NaN" / "Infinity" and stay strings.
        TypedValue::DoubleValue(value) => match value.as_f64().and_then(Number::from_f64) {
            Some(n) => Value::Number(n),
            None => value,
        },
        TypedValue::TimestampValue(s)
        | TypedValue::StringValue(s)
        | TypedValue::BytesValue(s)
        | TypedValue::ReferenceValue(s) => Value::String(s),
        TypedValue::GeoPointValue(point) => {
            json!({"latitude": point.latitude, "longitude": point.longitude})
        }
        TypedValue::ArrayValue(array) => Value::Array(
            array
                .values
                .into_iter()
                .map(decode_value)
                .collect::<Result<Vec<_>>>()?,
        ),
        TypedValue::MapValue(map) => Value::Object(decode_fields(map.fields)?),
    })
}

//! REST client for the facts-collection similarity service.
//!
//! Routes (all `POST`, JSON bodies):
//! - `/api/facts/collections/{name}`: create
//! - `/api/facts/collections/{name}/documents`: `{id, text, meta}`
//! - `/api/facts/collections/{name}/search`: `{query, top_k, where}`
//! - `/api/facts/collections/{name}/update`: `{ids, metadatas}`
//!
//! Search answers in the column layout of a vector store query (one row per
//! query text); only the first row is read.

use std::time::Duration;

use async_trait::async_trait;
use interview_orchestration::index::{IndexResult, Metadata};
use interview_orchestration::{
    Condition, IndexDocument, IndexError, IndexHit, MetadataFilter, SimilarityIndex,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Vec<Vec<Option<String>>>,
    #[serde(default)]
    metadatas: Vec<Vec<Option<Map<String, Value>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    ok: Option<bool>,
    #[serde(default)]
    error: Option<String>,
}

pub struct HttpSimilarityIndex {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSimilarityIndex {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, collection: &str, suffix: &str) -> String {
        format!("{}/api/facts/collections/{}{}", self.base_url, collection, suffix)
    }

    async fn post(&self, collection: &str, url: String, body: &Value) -> IndexResult<Value> {
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| IndexError::Request(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(IndexError::CollectionNotFound(collection.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IndexError::Request(format!("{}: {}", status, body)));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| IndexError::Parse(e.to_string()))?;
        if value.get("ok") == Some(&Value::Bool(false)) {
            let reason = value
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("request rejected");
            return Err(IndexError::Request(reason.to_string()));
        }
        Ok(value)
    }
}

#[async_trait]
impl SimilarityIndex for HttpSimilarityIndex {
    async fn create_collection(&self, collection: &str) -> IndexResult<()> {
        self.post(collection, self.url(collection, ""), &json!({}))
            .await
            .map(|_| ())
    }

    async fn add(&self, collection: &str, document: IndexDocument) -> IndexResult<()> {
        let body = json!({
            "id": document.id,
            "text": document.text,
            "meta": document.metadata,
        });
        self.post(collection, self.url(collection, "/documents"), &body)
            .await
            .map(|_| ())
    }

    async fn search(
        &self,
        collection: &str,
        query: &str,
        top_k: usize,
        filter: &MetadataFilter,
    ) -> IndexResult<Vec<IndexHit>> {
        let mut body = json!({ "query": query, "top_k": top_k });
        if let Some(clause) = where_clause(filter) {
            body["where"] = clause;
        }
        let value = self
            .post(collection, self.url(collection, "/search"), &body)
            .await?;
        let hits = parse_hits(value)?;
        debug!(collection, hits = hits.len(), "Similarity search completed");
        Ok(hits)
    }

    async fn update_metadata(
        &self,
        collection: &str,
        ids: &[String],
        metadata: &Metadata,
    ) -> IndexResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let body = json!({
            "ids": ids,
            "metadatas": vec![metadata; ids.len()],
        });
        self.post(collection, self.url(collection, "/update"), &body)
            .await
            .map(|_| ())
    }
}

/// Translate a filter into the store's `where` syntax. A single condition
/// is sent bare; several are wrapped in `$and`.
pub fn where_clause(filter: &MetadataFilter) -> Option<Value> {
    let mut clauses: Vec<Value> = filter
        .conditions
        .iter()
        .map(|(field, condition)| {
            let (op, value) = match condition {
                Condition::Eq(v) => ("$eq", v),
                Condition::Ne(v) => ("$ne", v),
            };
            json!({ field.as_str(): { op: value } })
        })
        .collect();

    match clauses.len() {
        0 => None,
        1 => clauses.pop(),
        _ => Some(json!({ "$and": clauses })),
    }
}

/// Decode a search response into hits. Distances become similarities via
/// `1 - distance`, clamped to `[0, 1]`.
pub fn parse_hits(value: Value) -> IndexResult<Vec<IndexHit>> {
    let response: QueryResponse =
        serde_json::from_value(value).map_err(|e| IndexError::Parse(e.to_string()))?;
    if response.ok == Some(false) {
        return Err(IndexError::Request(
            response.error.unwrap_or_else(|| "search rejected".to_string()),
        ));
    }

    let ids = response.ids.into_iter().next().unwrap_or_default();
    let documents = response.documents.into_iter().next().unwrap_or_default();
    let metadatas = response.metadatas.into_iter().next().unwrap_or_default();
    let distances = response
        .distances
        .and_then(|d| d.into_iter().next())
        .unwrap_or_default();

    let hits = ids
        .into_iter()
        .enumerate()
        .map(|(i, id)| IndexHit {
            id,
            text: documents.get(i).cloned().flatten().unwrap_or_default(),
            metadata: metadatas
                .get(i)
                .cloned()
                .flatten()
                .map(stringify_metadata)
                .unwrap_or_default(),
            score: distances
                .get(i)
                .map(|d| (1.0 - d).clamp(0.0, 1.0))
                .unwrap_or(0.0),
        })
        .collect();
    Ok(hits)
}

fn stringify_metadata(raw: Map<String, Value>) -> Metadata {
    raw.into_iter()
        .filter_map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                Value::Null => return None,
                other => other.to_string(),
            };
            Some((key, value))
        })
        .collect()
}

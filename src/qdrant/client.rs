//! `VectorIndex` backend talking to Qdrant over its REST API.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};

use crate::qdrant::payload::{CHUNK_ID_FIELD, build_point, chunk_id, point_id, scored_record};
use crate::qdrant::types::{
    CountResponse, QdrantError, QueryResponse, QueryResponseResult, ScrollResponse,
};
use crate::store::{ScoredRecord, StoreError, VectorIndex, VectorRecord};

const SCROLL_PAGE_SIZE: usize = 512;

/// Qdrant collection used as a vector index.
pub struct QdrantIndex {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) collection: String,
    pub(crate) vector_size: usize,
}

impl QdrantIndex {
    /// Build a client without touching the network.
    pub fn new(
        url: &str,
        api_key: Option<String>,
        collection: &str,
        vector_size: usize,
        timeout: Duration,
    ) -> Result<Self, QdrantError> {
        let client = Client::builder()
            .user_agent("docqa/0.1")
            .timeout(timeout)
            .build()?;
        let base_url = normalize_base_url(url).map_err(QdrantError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            collection,
            has_api_key = api_key.as_deref().is_some_and(|value| !value.is_empty()),
            "Initialized Qdrant HTTP client"
        );
        Ok(Self {
            client,
            base_url,
            api_key,
            collection: collection.to_string(),
            vector_size,
        })
    }

    /// Build a client and make sure the collection and its payload indexes exist.
    pub async fn connect(
        url: &str,
        api_key: Option<String>,
        collection: &str,
        vector_size: usize,
        timeout: Duration,
    ) -> Result<Self, QdrantError> {
        let index = Self::new(url, api_key, collection, vector_size, timeout)?;
        index.ensure_collection().await?;
        index.ensure_payload_indexes().await?;
        Ok(index)
    }

    /// Create the collection with cosine distance when it is missing.
    pub async fn ensure_collection(&self) -> Result<(), QdrantError> {
        if self.collection_exists().await? {
            return Ok(());
        }

        tracing::info!(
            collection = %self.collection,
            vector_size = self.vector_size,
            "Creating collection"
        );
        let body = json!({
            "vectors": {
                "size": self.vector_size,
                "distance": "Cosine"
            }
        });
        let response = self
            .request(Method::PUT, &format!("collections/{}", self.collection))
            .json(&body)
            .send()
            .await?;
        self.ensure_success(response).await
    }

    /// Ensure keyword indexes on the chunk id and source payload fields.
    pub async fn ensure_payload_indexes(&self) -> Result<(), QdrantError> {
        for field in [CHUNK_ID_FIELD, "source"] {
            let body = json!({
                "field_name": field,
                "field_schema": "keyword",
            });
            let response = self
                .request(Method::PUT, &format!("collections/{}/index", self.collection))
                .json(&body)
                .send()
                .await?;

            if response.status().is_success() || response.status() == StatusCode::CONFLICT {
                tracing::debug!(collection = %self.collection, field, "Payload index ensured");
            } else {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::warn!(collection = %self.collection, field, error = %error, "Failed to ensure payload index");
            }
        }
        Ok(())
    }

    async fn collection_exists(&self) -> Result<bool, QdrantError> {
        let response = self
            .request(Method::GET, &format!("collections/{}", self.collection))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::error!(collection = %self.collection, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    async fn scroll_chunk_ids(&self) -> Result<HashSet<String>, QdrantError> {
        let mut offset: Option<Value> = None;
        let mut ids = HashSet::new();

        loop {
            let mut body = json!({
                "with_payload": [CHUNK_ID_FIELD],
                "with_vector": false,
                "limit": SCROLL_PAGE_SIZE,
            });
            if let (Some(next), Some(object)) = (offset.take(), body.as_object_mut()) {
                object.insert("offset".into(), next);
            }

            let response = self
                .request(
                    Method::POST,
                    &format!("collections/{}/points/scroll", self.collection),
                )
                .json(&body)
                .send()
                .await?;
            let response = self.checked(response).await?;

            let ScrollResponse { result } = response.json().await?;
            ids.extend(
                result
                    .points
                    .iter()
                    .filter_map(|point| point.payload.as_ref())
                    .filter_map(|payload| chunk_id(payload).map(str::to_string)),
            );

            match result.next_page_offset {
                Some(Value::Null) | None => break,
                Some(next) => offset = Some(next),
            }
        }

        Ok(ids)
    }

    async fn exact_count(&self) -> Result<usize, QdrantError> {
        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/count", self.collection),
            )
            .json(&json!({ "exact": true }))
            .send()
            .await?;
        let response = self.checked(response).await?;
        let CountResponse { result } = response.json().await?;
        Ok(result.count)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn checked(&self, response: reqwest::Response) -> Result<reqwest::Response, QdrantError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(collection = %self.collection, error = %error, "Qdrant request failed");
            Err(error)
        }
    }

    async fn ensure_success(&self, response: reqwest::Response) -> Result<(), QdrantError> {
        self.checked(response).await.map(|_| ())
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn ids(&self) -> Result<HashSet<String>, StoreError> {
        Ok(self.scroll_chunk_ids().await?)
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        if let Some(record) = records.iter().find(|r| r.vector.len() != self.vector_size) {
            return Err(StoreError::DimensionMismatch {
                expected: self.vector_size,
                actual: record.vector.len(),
            });
        }

        let points: Vec<Value> = records.iter().map(build_point).collect();
        let response = self
            .request(
                Method::PUT,
                &format!("collections/{}/points", self.collection),
            )
            .query(&[("wait", true)])
            .json(&json!({ "points": points }))
            .send()
            .await
            .map_err(QdrantError::from)?;
        self.ensure_success(response).await?;
        tracing::debug!(collection = %self.collection, points = records.len(), "Points upserted");
        Ok(records.len())
    }

    async fn delete(&self, ids: &[String]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let before = self.exact_count().await?;
        let points: Vec<String> = ids.iter().map(|id| point_id(id)).collect();
        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/delete", self.collection),
            )
            .query(&[("wait", true)])
            .json(&json!({ "points": points }))
            .send()
            .await
            .map_err(QdrantError::from)?;
        self.ensure_success(response).await?;
        let after = self.exact_count().await?;
        let removed = before.saturating_sub(after);
        tracing::info!(collection = %self.collection, removed, "Points deleted");
        Ok(removed)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.exact_count().await?)
    }

    async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredRecord>, StoreError> {
        let body = json!({
            "query": vector,
            "limit": limit,
            "with_payload": true,
        });
        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/query", self.collection),
            )
            .json(&body)
            .send()
            .await
            .map_err(QdrantError::from)?;
        let response = self.checked(response).await?;

        let payload: QueryResponse = response.json().await.map_err(QdrantError::from)?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };
        points
            .into_iter()
            .map(|point| scored_record(point.score, point.payload))
            .collect()
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::record;
    use httpmock::{
        Method::{GET, POST, PUT},
        MockServer,
    };

    fn index(server: &MockServer) -> QdrantIndex {
        QdrantIndex::new(
            &server.base_url(),
            Some("qdrant-key".into()),
            "docs",
            2,
            Duration::from_secs(5),
        )
        .expect("client")
    }

    #[tokio::test]
    async fn creates_missing_collection_with_cosine_distance() {
        let server = MockServer::start_async().await;
        let exists = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/collections/docs")
                    .header("api-key", "qdrant-key");
                then.status(404);
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/docs").json_body(json!({
                    "vectors": { "size": 2, "distance": "Cosine" }
                }));
                then.status(200).json_body(json!({ "result": true, "status": "ok" }));
            })
            .await;

        index(&server).ensure_collection().await.expect("ensure");
        exists.assert_async().await;
        create.assert_async().await;
    }

    #[tokio::test]
    async fn upsert_uses_deterministic_point_ids() {
        let server = MockServer::start_async().await;
        let expected_id = point_id("a");
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/docs/points")
                    .query_param("wait", "true")
                    .body_contains(&expected_id)
                    .body_contains("\"chunk_id\":\"a\"");
                then.status(200)
                    .json_body(json!({ "result": { "status": "completed" }, "status": "ok" }));
            })
            .await;

        let written = index(&server)
            .upsert(vec![record("a", vec![1.0, 0.0], 0)])
            .await
            .expect("upsert");
        mock.assert_async().await;
        assert_eq!(written, 1);
    }

    #[tokio::test]
    async fn upsert_rejects_wrong_dimension_without_request() {
        let server = MockServer::start_async().await;
        let err = index(&server)
            .upsert(vec![record("a", vec![1.0, 0.0, 0.0], 0)])
            .await
            .expect_err("dimension");
        assert!(matches!(err, StoreError::DimensionMismatch { expected: 2, actual: 3 }));
    }

    #[tokio::test]
    async fn ids_follow_scroll_pagination() {
        let server = MockServer::start_async().await;
        let second = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/docs/points/scroll")
                    .body_contains("\"offset\":\"page-2\"");
                then.status(200).json_body(json!({
                    "result": {
                        "points": [{ "id": "p3", "payload": { "chunk_id": "c" } }],
                        "next_page_offset": null
                    }
                }));
            })
            .await;
        let first = server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/docs/points/scroll");
                then.status(200).json_body(json!({
                    "result": {
                        "points": [
                            { "id": "p1", "payload": { "chunk_id": "a" } },
                            { "id": "p2", "payload": { "chunk_id": "b" } }
                        ],
                        "next_page_offset": "page-2"
                    }
                }));
            })
            .await;

        let ids = index(&server).ids().await.expect("ids");
        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(ids.len(), 3);
        assert!(ids.contains("a") && ids.contains("b") && ids.contains("c"));
    }

    #[tokio::test]
    async fn query_rebuilds_records_from_payloads() {
        let server = MockServer::start_async().await;
        let point = build_point(&record("guide.md:None:0", vec![1.0, 0.0], 0));
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/docs/points/query");
                then.status(200).json_body(json!({
                    "status": "ok",
                    "time": 0.0,
                    "result": {
                        "points": [
                            { "id": point["id"], "score": 0.42, "payload": point["payload"] }
                        ]
                    }
                }));
            })
            .await;

        let hits = index(&server).query(&[1.0, 0.0], 5).await.expect("query");
        mock.assert_async().await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "guide.md:None:0");
        assert!((hits[0].score - 0.42).abs() < f32::EPSILON);
        assert_eq!(hits[0].metadata.page, None);
    }

    #[tokio::test]
    async fn unexpected_status_surfaces_as_store_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/docs/points/count");
                then.status(503).body("unavailable");
            })
            .await;

        let err = index(&server).count().await.expect_err("unavailable");
        assert!(matches!(
            err,
            StoreError::Qdrant(QdrantError::UnexpectedStatus { status, .. })
                if status == StatusCode::SERVICE_UNAVAILABLE
        ));
    }
}

//! LongTermMemory backed by a Qdrant-compatible HTTP vector store.
//!
//! Speaks Qdrant's REST wire protocol directly (`PUT /collections/{name}/points`,
//! `POST /collections/{name}/points/search`) rather than pulling in the
//! official client crate, since only point upsert and vector search are
//! needed here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::instrument;
use uuid::Uuid;

use crate::adapters::vector::embedding::EmbeddingProvider;
use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{Learning, LearningOutcome};
use crate::domain::ports::{CollectionStats, LearningMatch, LongTermMemory};

pub struct QdrantLongTermMemory {
    client: reqwest::Client,
    endpoint: String,
    collection: String,
    vector_size: u64,
    embedder: Arc<dyn EmbeddingProvider>,
    collection_ready: OnceCell<()>,
}

impl QdrantLongTermMemory {
    pub fn new(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
        vector_size: u64,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            collection: collection.into(),
            vector_size,
            embedder,
            collection_ready: OnceCell::new(),
        }
    }

    /// Ensure the collection exists, per spec.md §4.4's "lazily ensured
    /// to exist on first use (name, vector size, cosine distance
    /// configured at start-up)". Qdrant's collection-create endpoint is
    /// itself idempotent, but the `OnceCell` avoids a round trip on every
    /// `store`/`query` call after the first.
    async fn ensure_collection(&self) -> OrchestratorResult<()> {
        self.collection_ready
            .get_or_try_init(|| async {
                let response = self
                    .client
                    .put(self.collection_url())
                    .json(&json!({ "vectors": { "size": self.vector_size, "distance": "Cosine" } }))
                    .send()
                    .await
                    .map_err(|e| OrchestratorError::Internal(anyhow::anyhow!(e)))?;

                if !response.status().is_success() && response.status() != reqwest::StatusCode::CONFLICT {
                    return Err(OrchestratorError::Internal(anyhow::anyhow!(
                        "vector store collection-create failed with status {}",
                        response.status()
                    )));
                }
                Ok(())
            })
            .await?;
        Ok(())
    }

    fn points_url(&self) -> String {
        format!("{}/collections/{}/points", self.endpoint, self.collection)
    }

    fn search_url(&self) -> String {
        format!("{}/collections/{}/points/search", self.endpoint, self.collection)
    }

    fn point_url(&self, id: Uuid) -> String {
        format!("{}/collections/{}/points/{}", self.endpoint, self.collection, id)
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.endpoint, self.collection)
    }

    fn delete_points_url(&self) -> String {
        format!("{}/collections/{}/points/delete", self.endpoint, self.collection)
    }
}

#[derive(Serialize)]
struct UpsertBody {
    points: Vec<Point>,
}

#[derive(Serialize)]
struct Point {
    id: Uuid,
    vector: Vec<f32>,
    payload: serde_json::Value,
}

#[derive(Serialize)]
struct SearchBody {
    vector: Vec<f32>,
    limit: usize,
    with_payload: bool,
    score_threshold: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct DeletePointsBody {
    points: Vec<Uuid>,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct CollectionInfoResponse {
    result: CollectionInfo,
}

#[derive(Deserialize)]
struct CollectionInfo {
    points_count: u64,
}

#[derive(Deserialize)]
struct SearchHit {
    score: f32,
    payload: LearningPayload,
}

#[derive(Deserialize)]
struct GetResponse {
    result: GetResult,
}

#[derive(Deserialize)]
struct GetResult {
    payload: LearningPayload,
    vector: Option<Vec<f32>>,
}

#[derive(Serialize, Deserialize)]
struct LearningPayload {
    goal_id: Uuid,
    outcome: String,
    text: String,
    created_at: String,
}

impl LearningPayload {
    fn into_learning(self, id: Uuid, embedding: Option<Vec<f32>>) -> OrchestratorResult<Learning> {
        let outcome = match self.outcome.as_str() {
            "success" => LearningOutcome::Success,
            "partial" => LearningOutcome::Partial,
            "failed" => LearningOutcome::Failed,
            other => return Err(OrchestratorError::Internal(anyhow::anyhow!("invalid learning outcome: {other}"))),
        };
        Ok(Learning {
            id,
            goal_id: self.goal_id,
            outcome,
            text: self.text,
            embedding,
            created_at: chrono::DateTime::parse_from_rfc3339(&self.created_at)
                .map_err(|e| OrchestratorError::Internal(anyhow::anyhow!(e)))?
                .with_timezone(&chrono::Utc),
        })
    }
}

#[async_trait]
impl LongTermMemory for QdrantLongTermMemory {
    #[instrument(skip(self, learning))]
    async fn store(&self, learning: &Learning) -> OrchestratorResult<()> {
        self.ensure_collection().await?;
        let embedding = match &learning.embedding {
            Some(v) => v.clone(),
            None => self.embedder.embed(&learning.text).await?,
        };

        let body = UpsertBody {
            points: vec![Point {
                id: learning.id,
                vector: embedding,
                payload: json!({
                    "goal_id": learning.goal_id,
                    "outcome": learning.outcome.as_str(),
                    "text": learning.text,
                    "created_at": learning.created_at.to_rfc3339(),
                }),
            }],
        };

        let response = self
            .client
            .put(self.points_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| OrchestratorError::Internal(anyhow::anyhow!(e)))?;

        if !response.status().is_success() {
            return Err(OrchestratorError::Internal(anyhow::anyhow!(
                "vector store upsert failed with status {}",
                response.status()
            )));
        }
        Ok(())
    }

    #[instrument(skip(self, query))]
    async fn query(
        &self,
        query: &str,
        limit: usize,
        threshold: f32,
        outcome_filter: Option<LearningOutcome>,
    ) -> OrchestratorResult<Vec<LearningMatch>> {
        self.ensure_collection().await?;
        let embedding = self.embedder.embed(query).await?;
        let filter = outcome_filter.map(|outcome| {
            json!({ "must": [{ "key": "outcome", "match": { "value": outcome.as_str() } }] })
        });

        let response = self
            .client
            .post(self.search_url())
            .json(&SearchBody { vector: embedding, limit, with_payload: true, score_threshold: threshold, filter })
            .send()
            .await
            .map_err(|e| OrchestratorError::Internal(anyhow::anyhow!(e)))?;

        if !response.status().is_success() {
            return Err(OrchestratorError::Internal(anyhow::anyhow!(
                "vector store search failed with status {}",
                response.status()
            )));
        }

        let parsed: SearchResponse =
            response.json().await.map_err(|e| OrchestratorError::Internal(anyhow::anyhow!(e)))?;

        parsed
            .result
            .into_iter()
            .map(|hit| {
                let learning = hit.payload.into_learning(Uuid::nil(), None)?;
                Ok(LearningMatch { learning, score: hit.score })
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn get(&self, id: Uuid) -> OrchestratorResult<Option<Learning>> {
        let response = self
            .client
            .get(self.point_url(id))
            .send()
            .await
            .map_err(|e| OrchestratorError::Internal(anyhow::anyhow!(e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(OrchestratorError::Internal(anyhow::anyhow!(
                "vector store get failed with status {}",
                response.status()
            )));
        }

        let parsed: GetResponse =
            response.json().await.map_err(|e| OrchestratorError::Internal(anyhow::anyhow!(e)))?;

        Ok(Some(parsed.result.payload.into_learning(id, parsed.result.vector)?))
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: Uuid) -> OrchestratorResult<()> {
        let response = self
            .client
            .post(self.delete_points_url())
            .json(&DeletePointsBody { points: vec![id] })
            .send()
            .await
            .map_err(|e| OrchestratorError::Internal(anyhow::anyhow!(e)))?;

        if !response.status().is_success() {
            return Err(OrchestratorError::Internal(anyhow::anyhow!(
                "vector store delete failed with status {}",
                response.status()
            )));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> OrchestratorResult<bool> {
        let response = self.client.get(self.collection_url()).send().await;
        Ok(matches!(response, Ok(r) if r.status().is_success()))
    }

    #[instrument(skip(self))]
    async fn stats(&self) -> OrchestratorResult<CollectionStats> {
        let response = self
            .client
            .get(self.collection_url())
            .send()
            .await
            .map_err(|e| OrchestratorError::Internal(anyhow::anyhow!(e)))?;

        if !response.status().is_success() {
            return Err(OrchestratorError::Internal(anyhow::anyhow!(
                "vector store stats failed with status {}",
                response.status()
            )));
        }

        let parsed: CollectionInfoResponse =
            response.json().await.map_err(|e| OrchestratorError::Internal(anyhow::anyhow!(e)))?;

        Ok(CollectionStats { points_count: parsed.result.points_count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubEmbedder;

    #[async_trait]
    impl EmbeddingProvider for StubEmbedder {
        async fn embed(&self, _text: &str) -> OrchestratorResult<Vec<f32>> {
            Ok(vec![0.1, 0.2, 0.3])
        }
    }

    fn memory(endpoint: String) -> QdrantLongTermMemory {
        QdrantLongTermMemory::new(endpoint, "learnings", 3, Arc::new(StubEmbedder))
    }

    #[tokio::test]
    async fn stats_reports_the_collection_point_count() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/collections/learnings")
            .with_status(200)
            .with_body(r#"{"result":{"points_count":42}}"#)
            .create_async()
            .await;

        let stats = memory(server.url()).stats().await.unwrap();
        assert_eq!(stats.points_count, 42);
    }

    #[tokio::test]
    async fn health_check_is_false_on_a_non_success_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("GET", "/collections/learnings").with_status(503).create_async().await;

        assert!(!memory(server.url()).health_check().await.unwrap());
    }

    #[tokio::test]
    async fn query_filters_by_outcome_and_threshold() {
        let mut server = mockito::Server::new_async().await;
        let _ensure = server.mock("PUT", "/collections/learnings").with_status(200).create_async().await;
        let _search = server
            .mock("POST", "/collections/learnings/points/search")
            .with_status(200)
            .with_body(
                r#"{"result":[{"score":0.91,"payload":{"goal_id":"00000000-0000-0000-0000-000000000001","outcome":"success","text":"retried build twice","created_at":"2026-01-01T00:00:00Z"}}]}"#,
            )
            .create_async()
            .await;

        let matches = memory(server.url())
            .query("add rate limiting", 5, 0.8, Some(LearningOutcome::Success))
            .await
            .unwrap();

        assert_eq!(matches.len(), 1);
        assert!((matches[0].score - 0.91).abs() < 1e-6);
        assert_eq!(matches[0].learning.outcome, LearningOutcome::Success);
    }
}

// src/vector/qdrant.rs

//! Qdrant-backed implementation of the vector index contract

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, DeletePointsBuilder,
    Distance, FieldType, Filter, PointId, PointStruct, SearchPointsBuilder, UpsertPointsBuilder,
    Value as QdrantValue, VectorParamsBuilder,
};
use tracing::{debug, info, warn};

use super::{ChunkPayload, ScopeFilter, VectorHit, VectorIndex, VectorPoint};
use crate::error::{ApiError, ApiResult};
use crate::utils::with_timeout;

/// Payload fields indexed for filtering.
const INDEXED_FIELDS: [&str; 3] = ["user_id", "youtube_video_id", "channel_id"];

pub struct QdrantIndex {
    client: Qdrant,
    call_timeout: Duration,
}

impl QdrantIndex {
    pub fn new(url: &str, call_timeout: Duration) -> ApiResult<Self> {
        // Skip compatibility check to allow minor version mismatches
        let client = Qdrant::from_url(url)
            .skip_compatibility_check()
            .build()
            .map_err(|e| ApiError::external_fatal(format!("failed to connect to Qdrant: {}", e)))?;

        Ok(Self {
            client,
            call_timeout,
        })
    }

    fn payload_map(payload: &ChunkPayload) -> HashMap<String, QdrantValue> {
        let mut map: HashMap<String, QdrantValue> = HashMap::new();
        map.insert("chunk_id".to_string(), payload.chunk_id.clone().into());
        map.insert("user_id".to_string(), payload.user_id.clone().into());
        map.insert(
            "youtube_video_id".to_string(),
            payload.youtube_video_id.clone().into(),
        );
        map.insert("chunk_index".to_string(), payload.chunk_index.into());
        map.insert("chunk_text".to_string(), payload.chunk_text.clone().into());
        if let Some(ref channel_id) = payload.channel_id {
            map.insert("channel_id".to_string(), channel_id.clone().into());
        }
        map
    }

    fn parse_payload(payload: &HashMap<String, QdrantValue>) -> Option<ChunkPayload> {
        Some(ChunkPayload {
            chunk_id: payload.get("chunk_id")?.as_str()?.to_string(),
            user_id: payload.get("user_id")?.as_str()?.to_string(),
            youtube_video_id: payload.get("youtube_video_id")?.as_str()?.to_string(),
            chunk_index: payload.get("chunk_index")?.as_integer()?,
            chunk_text: payload.get("chunk_text")?.as_str()?.to_string(),
            channel_id: payload
                .get("channel_id")
                .and_then(|v| v.as_str())
                .map(String::from),
        })
    }

    fn point_id_string(id: &PointId) -> Option<String> {
        use qdrant_client::qdrant::point_id::PointIdOptions;
        match id.point_id_options.as_ref()? {
            PointIdOptions::Uuid(u) => Some(u.clone()),
            PointIdOptions::Num(n) => Some(n.to_string()),
        }
    }

    fn scope_condition(filter: &ScopeFilter) -> Condition {
        match filter {
            ScopeFilter::User(user_id) => Condition::matches("user_id", user_id.clone()),
            ScopeFilter::Channel(channel_id) => Condition::matches("channel_id", channel_id.clone()),
        }
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn ensure_collection(&self, name: &str, dimensions: u64) -> ApiResult<()> {
        let exists = self
            .client
            .collection_exists(name)
            .await
            .map_err(|e| ApiError::external(format!("qdrant collection check: {}", e)))?;

        if !exists {
            info!("Creating Qdrant collection: {}", name);
            match self
                .client
                .create_collection(
                    CreateCollectionBuilder::new(name)
                        .vectors_config(VectorParamsBuilder::new(dimensions, Distance::Cosine)),
                )
                .await
            {
                Ok(_) => {}
                Err(e) => {
                    // Another process may have won the create race.
                    let error_msg = e.to_string();
                    if error_msg.contains("already exists") {
                        debug!("Collection {} already exists", name);
                    } else {
                        return Err(ApiError::external(format!(
                            "failed to create collection {}: {}",
                            name, e
                        )));
                    }
                }
            }
        }

        for field in INDEXED_FIELDS {
            if let Err(e) = self
                .client
                .create_field_index(CreateFieldIndexCollectionBuilder::new(
                    name,
                    field,
                    FieldType::Keyword,
                ))
                .await
            {
                let error_msg = e.to_string();
                if !error_msg.contains("already exists") {
                    warn!("Failed to index payload field {} on {}: {}", field, name, e);
                }
            }
        }

        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> ApiResult<()> {
        if points.is_empty() {
            return Ok(());
        }

        let qdrant_points: Vec<PointStruct> = points
            .into_iter()
            .map(|p| {
                let payload = Self::payload_map(&p.payload);
                PointStruct::new(p.id, p.vector, payload)
            })
            .collect();

        let count = qdrant_points.len();
        with_timeout(
            self.call_timeout,
            async {
                self.client
                    .upsert_points(UpsertPointsBuilder::new(collection, qdrant_points).wait(true))
                    .await
                    .map_err(|e| ApiError::external(format!("qdrant upsert: {}", e)))
            },
            "vector upsert",
        )
        .await?;

        debug!("Upserted {} points into {}", count, collection);
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        filter: ScopeFilter,
        limit: u64,
    ) -> ApiResult<Vec<VectorHit>> {
        let qdrant_filter = Filter::must([Self::scope_condition(&filter)]);

        let results = with_timeout(
            self.call_timeout,
            async {
                self.client
                    .search_points(
                        SearchPointsBuilder::new(collection, vector, limit)
                            .filter(qdrant_filter)
                            .with_payload(true),
                    )
                    .await
                    .map_err(|e| ApiError::external(format!("qdrant search: {}", e)))
            },
            "vector search",
        )
        .await?;

        let hits = results
            .result
            .into_iter()
            .filter_map(|point| {
                let id = point.id.as_ref().and_then(Self::point_id_string)?;
                let payload = Self::parse_payload(&point.payload)?;
                Some(VectorHit {
                    id,
                    score: point.score,
                    payload,
                })
            })
            .collect();

        Ok(hits)
    }

    async fn delete(&self, collection: &str, ids: Vec<String>) -> ApiResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let point_ids: Vec<PointId> = ids.into_iter().map(PointId::from).collect();

        with_timeout(
            self.call_timeout,
            async {
                self.client
                    .delete_points(
                        DeletePointsBuilder::new(collection)
                            .points(point_ids)
                            .wait(true),
                    )
                    .await
                    .map_err(|e| ApiError::external(format!("qdrant delete: {}", e)))
            },
            "vector delete",
        )
        .await?;

        Ok(())
    }
}

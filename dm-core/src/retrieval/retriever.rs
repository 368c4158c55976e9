//! Three-tier context retrieval.
//!
//! A query is answered from three sources, in priority order:
//!
//! 1. the running session's transcript,
//! 2. summaries of past sessions,
//! 3. campaign reference material, gated by story progression.
//!
//! Each tier queries the vector store, rescales distances, and contributes
//! at most its share of the chunk budget. A failing tier contributes
//! nothing; the others still answer.

use super::context::{format_context, merge_items, ContextItem, ContextSource};
use super::intent::QueryIntent;
use super::progression::{filter_by_progression, rank_content};
use crate::config::{DmConfig, RetrievalConfig};
use crate::embedding::{Embedder, EmbeddingError};
use crate::session::{EntryType, SessionEntry};
use crate::store::{ChunkMetadata, MetadataFilter, StoreError, VectorStore, FUTURE_POSSIBILITIES};
use crate::world_state::{StoryRelevanceContext, WorldStateStore};
use std::cmp::Ordering;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const CURRENT_SESSION_SLOTS: usize = 2;
const HISTORY_SLOTS: usize = 4;
const RECALL_HISTORY_SLOTS: usize = 6;
const RECALL_CAMPAIGN_SLOTS: usize = 2;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// How the chunk budget is split between tiers.
///
/// Later tiers are sized from what earlier tiers actually returned, so the
/// total never exceeds `max_chunks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierBudget {
    max_chunks: usize,
    session_recall: bool,
}

impl TierBudget {
    pub fn new(max_chunks: usize, intent: &QueryIntent) -> Self {
        Self {
            max_chunks,
            session_recall: intent.session_recall,
        }
    }

    pub fn current_session_slots(&self) -> usize {
        self.max_chunks.min(CURRENT_SESSION_SLOTS)
    }

    pub fn session_history_slots(&self, used: usize) -> usize {
        let cap = if self.session_recall {
            RECALL_HISTORY_SLOTS
        } else {
            HISTORY_SLOTS
        };
        cap.min(self.remaining(used))
    }

    pub fn campaign_slots(&self, used: usize) -> usize {
        if self.session_recall {
            RECALL_CAMPAIGN_SLOTS.min(self.remaining(used))
        } else {
            self.remaining(used)
        }
    }

    fn remaining(&self, used: usize) -> usize {
        self.max_chunks.saturating_sub(used)
    }
}

/// Query-time restriction on campaign content.
pub fn campaign_prefilter(intent: &QueryIntent) -> Option<MetadataFilter> {
    if intent.session_recall {
        Some(MetadataFilter::and([
            MetadataFilter::ne("is_dm_guide", true),
            MetadataFilter::ne("story_relevance", FUTURE_POSSIBILITIES),
        ]))
    } else if intent.dm_planning {
        None
    } else {
        Some(MetadataFilter::ne("contains_spoilers", true))
    }
}

/// Builds the context block for each player turn.
pub struct ContextRetriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    world: Arc<Mutex<WorldStateStore>>,
    campaign_collection: String,
    history_collection: String,
    current_session_collection: String,
    max_context_chunks: usize,
    weights: RetrievalConfig,
}

impl ContextRetriever {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        world: Arc<Mutex<WorldStateStore>>,
        config: &DmConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            world,
            campaign_collection: config.database.campaign_collection.clone(),
            history_collection: config.database.session_history_collection.clone(),
            current_session_collection: config.database.current_session_collection.clone(),
            max_context_chunks: config.content.max_context_chunks,
            weights: config.retrieval.clone(),
        }
    }

    /// Formatted context for `query`, or an empty string if nothing could be
    /// retrieved.
    pub async fn get_relevant_context(
        &self,
        query: &str,
        max_chunks: Option<usize>,
        current_session_id: Option<&str>,
    ) -> String {
        match self.retrieve(query, max_chunks, current_session_id).await {
            Ok(items) => format_context(&items),
            Err(e) => {
                warn!(error = %e, "context retrieval failed");
                String::new()
            }
        }
    }

    /// Ranked items from all tiers, highest priority first.
    pub async fn retrieve(
        &self,
        query: &str,
        max_chunks: Option<usize>,
        current_session_id: Option<&str>,
    ) -> Result<Vec<ContextItem>, RetrievalError> {
        let max_chunks = max_chunks.unwrap_or(self.max_context_chunks);
        if query.trim().is_empty() || max_chunks == 0 {
            return Ok(Vec::new());
        }

        let intent = QueryIntent::classify(query);
        let budget = TierBudget::new(max_chunks, &intent);
        let embedding = self.embedder.embed_query(query).await?;

        let mut items = Vec::with_capacity(max_chunks);

        if let Some(session_id) = current_session_id {
            let slots = budget.current_session_slots();
            let tier = self.current_session_tier(&embedding, session_id, slots).await;
            items.extend(tier_or_empty(ContextSource::CurrentSession, tier));
        }

        let slots = budget.session_history_slots(items.len());
        let tier = self.session_history_tier(&embedding, &intent, slots).await;
        items.extend(tier_or_empty(ContextSource::SessionHistory, tier));

        let slots = budget.campaign_slots(items.len());
        let tier = self.campaign_tier(query, &embedding, &intent, slots).await;
        items.extend(tier_or_empty(ContextSource::CampaignContent, tier));

        debug!(
            %query,
            items = items.len(),
            session_recall = intent.session_recall,
            "context retrieved"
        );
        Ok(merge_items(items))
    }

    async fn current_session_tier(
        &self,
        embedding: &[f32],
        session_id: &str,
        slots: usize,
    ) -> Result<Vec<ContextItem>, RetrievalError> {
        if slots == 0 {
            return Ok(Vec::new());
        }

        let filter = MetadataFilter::and([
            MetadataFilter::eq("session_id", session_id),
            MetadataFilter::is_in(
                "entry_type",
                [EntryType::PlayerInput.as_str(), EntryType::DmResponse.as_str()],
            ),
        ]);
        let hits = self
            .store
            .query(&self.current_session_collection, embedding, Some(&filter), slots)
            .await?;

        let items = hits
            .into_iter()
            .filter_map(|hit| match serde_json::from_str::<SessionEntry>(&hit.document) {
                Ok(entry) => {
                    let mut item = ContextItem::new(
                        entry.content,
                        ContextSource::CurrentSession,
                        hit.metadata,
                        hit.distance,
                    );
                    item.rescale(self.weights.current_session_factor);
                    Some(item)
                }
                Err(e) => {
                    warn!(id = %hit.id, error = %e, "skipping unreadable session entry");
                    None
                }
            })
            .collect();
        Ok(items)
    }

    async fn session_history_tier(
        &self,
        embedding: &[f32],
        intent: &QueryIntent,
        slots: usize,
    ) -> Result<Vec<ContextItem>, RetrievalError> {
        if slots == 0 {
            return Ok(Vec::new());
        }

        let hits = self
            .store
            .query(&self.history_collection, embedding, None, slots)
            .await?;

        let mut items: Vec<ContextItem> = hits
            .into_iter()
            .map(|hit| {
                let boost = self.history_boost(&hit.metadata, intent);
                let mut item = ContextItem::new(
                    hit.document,
                    ContextSource::SessionHistory,
                    hit.metadata,
                    hit.distance,
                );
                item.rescale(self.weights.session_history_base_factor - boost);
                item
            })
            .collect();

        items.sort_by(|a, b| {
            a.distance()
                .partial_cmp(&b.distance())
                .unwrap_or(Ordering::Equal)
        });
        Ok(items)
    }

    /// Boost subtracted from the Tier 2 factor, at most `max_total_boost`.
    fn history_boost(&self, metadata: &ChunkMetadata, intent: &QueryIntent) -> f32 {
        let w = &self.weights;
        let mut boost = 0.0;

        if let Some(n) = metadata.session_number {
            let horizon = w.recency_session_horizon.max(1.0);
            boost += w.max_recency_boost * (n as f32 / horizon).min(1.0);
        }
        if intent.session_recall {
            boost += w.session_recall_boost;
        }
        if intent.is_character_focused() && !metadata.characters_mentioned.is_empty() {
            boost += w.focus_boost;
        }
        if intent.is_location_focused() && !metadata.locations_mentioned.is_empty() {
            boost += w.focus_boost;
        }
        boost.clamp(0.0, w.max_total_boost.max(0.0))
    }

    async fn campaign_tier(
        &self,
        query: &str,
        embedding: &[f32],
        intent: &QueryIntent,
        slots: usize,
    ) -> Result<Vec<ContextItem>, RetrievalError> {
        if slots == 0 {
            return Ok(Vec::new());
        }

        let story = self.story_context(query).await;
        let filter = campaign_prefilter(intent);
        let hits = self
            .store
            .query(&self.campaign_collection, embedding, filter.as_ref(), slots * 2)
            .await?;

        let visible = filter_by_progression(hits, story.current_act_number);
        let ranked = rank_content(
            visible,
            &story.current_act,
            &story.current_arc,
            &self.weights,
            slots,
        );

        Ok(ranked
            .into_iter()
            .map(|hit| {
                ContextItem::new(
                    hit.document,
                    ContextSource::CampaignContent,
                    hit.metadata,
                    hit.distance,
                )
            })
            .collect())
    }

    async fn story_context(&self, query: &str) -> StoryRelevanceContext {
        let mut world = self.world.lock().await;
        match world.get_story_relevance_context(query).await {
            Ok(context) => context,
            Err(e) => {
                warn!(error = %e, "world state unavailable, using default progression");
                StoryRelevanceContext::default()
            }
        }
    }

    /// Start-up probe. An empty campaign collection counts as healthy.
    pub async fn test_retrieval(&self, probe: &str) -> Result<bool, RetrievalError> {
        if self.store.count(&self.campaign_collection).await? == 0 {
            return Ok(true);
        }
        Ok(!self.get_relevant_context(probe, None, None).await.is_empty())
    }
}

fn tier_or_empty(
    source: ContextSource,
    tier: Result<Vec<ContextItem>, RetrievalError>,
) -> Vec<ContextItem> {
    tier.unwrap_or_else(|e| {
        warn!(tier = ?source, error = %e, "retrieval tier failed");
        Vec::new()
    })
}

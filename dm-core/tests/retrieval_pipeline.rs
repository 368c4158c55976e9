//! End-to-end retrieval over the in-memory store with hashing embeddings.

use dm_core::embedding::{Embedder, HashingEmbedder};
use dm_core::retrieval::ContextRetriever;
use dm_core::session::SessionLog;
use dm_core::store::{ChunkMetadata, MemoryVectorStore, Record, VectorStore};
use dm_core::world_state::WorldStateStore;
use dm_core::DmConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

struct Campaign {
    config: DmConfig,
    store: Arc<MemoryVectorStore>,
    embedder: Arc<HashingEmbedder>,
    world: Arc<Mutex<WorldStateStore>>,
    retriever: ContextRetriever,
}

impl Campaign {
    fn new() -> Self {
        let config = DmConfig::default();
        let store = Arc::new(MemoryVectorStore::new());
        let embedder = Arc::new(HashingEmbedder::default());
        let world = Arc::new(Mutex::new(WorldStateStore::new(
            store.clone(),
            embedder.clone(),
            config.database.world_state_collection.clone(),
        )));
        let retriever = ContextRetriever::new(store.clone(), embedder.clone(), world.clone(), &config);
        Self {
            config,
            store,
            embedder,
            world,
            retriever,
        }
    }

    async fn add(&self, collection: &str, id: &str, text: &str, metadata: ChunkMetadata) {
        let record = Record::new(id, text, metadata).with_embedding(self.embedder.embed_text(text));
        self.store.add(collection, vec![record]).await.unwrap();
    }

    async fn add_campaign(&self, id: &str, text: &str, metadata: ChunkMetadata) {
        let collection = self.config.database.campaign_collection.clone();
        self.add(&collection, id, text, metadata).await;
    }

    async fn add_history(&self, id: &str, text: &str, session_number: u32) {
        let collection = self.config.database.session_history_collection.clone();
        let metadata = ChunkMetadata {
            session_number: Some(session_number),
            section_type: Some("key_events".to_string()),
            ..Default::default()
        };
        self.add(&collection, id, text, metadata).await;
    }

    fn session_log(&self) -> SessionLog {
        let embedder: Arc<dyn Embedder> = self.embedder.clone();
        SessionLog::new(
            self.store.clone(),
            embedder,
            self.config.database.current_session_collection.clone(),
            self.config.database.session_history_collection.clone(),
        )
    }
}

fn act(number: &str) -> ChunkMetadata {
    ChunkMetadata {
        act_number: Some(number.to_string()),
        story_relevance: Some("current_content".to_string()),
        content_type: Some("location".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_future_acts_hidden_until_reached() {
    let campaign = Campaign::new();
    campaign
        .add_campaign("village", "The village of Barovia lies under a grey sky.", act("I"))
        .await;
    campaign
        .add_campaign("amber", "The Amber Temple hides dark vestiges in the mountains.", act("III"))
        .await;
    campaign
        .add_campaign(
            "guide",
            "Running the Amber Temple: pace the vestige bargains slowly.",
            ChunkMetadata {
                is_dm_guide: Some(true),
                ..act("IV")
            },
        )
        .await;

    let query = "Tell me about the Amber Temple";
    let context = campaign.retriever.get_relevant_context(query, None, None).await;
    assert!(context.contains("village of Barovia"));
    assert!(context.contains("Running the Amber Temple"));
    assert!(!context.contains("dark vestiges"));

    campaign
        .world
        .lock()
        .await
        .update_story_progression(Some("Act III"), None)
        .await
        .unwrap();

    let context = campaign.retriever.get_relevant_context(query, None, None).await;
    assert!(context.contains("dark vestiges"));
    assert!(context.contains("[Campaign Content - location]"));
}

#[tokio::test]
async fn test_spoilers_excluded_from_standard_queries() {
    let campaign = Campaign::new();
    campaign
        .add_campaign(
            "reveal",
            "Ireena is the reincarnation of Tatyana.",
            ChunkMetadata {
                contains_spoilers: Some(true),
                ..act("I")
            },
        )
        .await;
    campaign
        .add_campaign("ireena", "Ireena Kolyana is the adopted daughter of the burgomaster.", act("I"))
        .await;

    let context = campaign
        .retriever
        .get_relevant_context("Tell me about Ireena", None, None)
        .await;
    assert!(context.contains("adopted daughter"));
    assert!(!context.contains("reincarnation"));

    // Planning queries see everything the party has reached.
    let context = campaign
        .retriever
        .get_relevant_context("Help me plan an encounter with Ireena", None, None)
        .await;
    assert!(context.contains("reincarnation"));
}

#[tokio::test]
async fn test_recall_query_budget_and_order() {
    let campaign = Campaign::new();
    let mut log = campaign.session_log();
    let session_id = log.start_session(Some(9)).await;
    for line in [
        "We ask the innkeeper about the road",
        "We follow the river toward the village",
        "We camp under the gallows tree",
    ] {
        log.log_player_input(line).await;
    }

    for n in 1..=8 {
        campaign
            .add_history(&format!("history_{n}"), &format!("In session {n} the party fought wolves near the village."), n)
            .await;
    }
    for n in 0..5 {
        campaign
            .add_campaign(&format!("chunk_{n}"), &format!("Village lore fragment {n}."), act("I"))
            .await;
    }

    let context = campaign
        .retriever
        .get_relevant_context("What happened last time in the village?", Some(10), Some(&session_id))
        .await;

    assert_eq!(context.matches("[Current Session]").count(), 2);
    assert_eq!(context.matches("[Session ").count(), 6);
    assert_eq!(context.matches("[Campaign Content").count(), 2);

    let first_history = context.find("[Session ").unwrap();
    let last_current = context.rfind("[Current Session]").unwrap();
    let first_campaign = context.find("[Campaign Content").unwrap();
    assert!(last_current < first_history);
    assert!(first_history < first_campaign);
}

#[tokio::test]
async fn test_other_sessions_never_leak_into_tier_one() {
    let campaign = Campaign::new();
    let mut log = campaign.session_log();
    log.start_session(Some(1)).await;
    log.log_player_input("I hide the silver dagger under the floorboards").await;
    log.end_session().await.unwrap();

    // Session ids have one-second resolution.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let current = log.start_session(Some(2)).await;
    let context = campaign
        .retriever
        .get_relevant_context("Where is the silver dagger?", None, Some(&current))
        .await;

    assert!(!context.contains("[Current Session]"));
    // The ended session is reachable through its summary instead.
    assert!(context.contains("[Session 1 - Session Summary]"));
}

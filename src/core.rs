//! Sorting core: the in-process decision service
//!
//! `SortingCore` owns the Atlas, Memory, session shards and the voting
//! engine. It exposes exactly two operations:
//!
//! - `classify(request)`: decide a category, returning a ticket
//! - `on_action_completed(completion)`: learn from a confirmed move
//!
//! Learning only ever happens through `on_action_completed`, after the
//! caller has executed the move, so abandoning a classification never leaves
//! shared state half-updated. Each ticket is applied at most once.

use crate::atlas::{display_name, Atlas};
use crate::config::{voter_ids, SortifyConfig};
use crate::error::{Error, Result};
use crate::external::{Embedder, Reasoner};
use crate::memory::Memory;
use crate::session::SessionManager;
use crate::types::{ClassificationRequest, ClassificationResult, UNKNOWN};
use crate::vector::{self, Vector};
use crate::voting::{
    AtlasVoter, ContentTypeVoter, FrequencyVoter, KeywordVoter, MemoryVoter, SessionVoter, Voter,
    VotingEngine,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Completed tickets remembered for duplicate detection
pub const TICKET_HISTORY: usize = 4096;

// =============================================================================
// Messages
// =============================================================================

/// A classification decision and the ticket that confirms it later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub ticket: Uuid,
    #[serde(flatten)]
    pub result: ClassificationResult,
}

/// Notification that a file was actually moved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    /// Ticket of the classification that was acted on
    pub ticket: Uuid,
    pub embedding: Vector,
    /// Category the file was filed under
    pub category: String,
    /// Destination folder
    pub folder_id: String,
    #[serde(default)]
    pub session_key: Option<String>,
    pub completed_at: DateTime<Utc>,
}

// =============================================================================
// Ticket ledger
// =============================================================================

/// Bounded set of applied tickets, oldest forgotten first
struct TicketLedger {
    seen: HashSet<Uuid>,
    order: VecDeque<Uuid>,
    capacity: usize,
}

impl TicketLedger {
    fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Record a ticket; false if it was already applied.
    fn claim(&mut self, ticket: Uuid) -> bool {
        if !self.seen.insert(ticket) {
            return false;
        }
        self.order.push_back(ticket);
        while self.order.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.seen.remove(&old);
            }
        }
        true
    }
}

// =============================================================================
// SortingCore
// =============================================================================

/// Classification engine facade
pub struct SortingCore {
    config: SortifyConfig,
    embedder: Arc<dyn Embedder>,
    atlas: Arc<Atlas>,
    memory: Arc<Memory>,
    sessions: Arc<SessionManager>,
    engine: VotingEngine,
    /// Present while the keyword voter is enabled; learns destination categories
    keywords: Option<Arc<KeywordVoter>>,
    tickets: RwLock<TicketLedger>,
}

impl SortingCore {
    /// Build a core with the standard voter set.
    pub fn new(
        config: SortifyConfig,
        embedder: Arc<dyn Embedder>,
        reasoner: Arc<dyn Reasoner>,
    ) -> Result<Self> {
        config.validate()?;
        if embedder.dimension() != config.dimension {
            return Err(Error::Config(format!(
                "embedder '{}' produces {} dimensions, configured dimension is {}",
                embedder.name(),
                embedder.dimension(),
                config.dimension
            )));
        }

        let memory = Arc::new(Memory::new(&config.memory, config.dimension));
        let sessions = Arc::new(SessionManager::new(config.session.clone()));
        let atlas = Arc::new(Atlas::new(&config.atlas, config.dimension, embedder.clone())?);

        let c = &config.classifier;
        let keywords = Arc::new(KeywordVoter::new(embedder.clone(), c.keyword_threshold));
        let mut voters: Vec<Arc<dyn Voter>> = vec![
            Arc::new(ContentTypeVoter::new()),
            keywords.clone(),
            Arc::new(AtlasVoter::new(atlas.clone(), config.atlas.match_threshold)),
            Arc::new(MemoryVoter::new(memory.clone(), c.memory_voter_threshold)),
            Arc::new(SessionVoter::new(sessions.clone())),
            Arc::new(FrequencyVoter::new(memory.clone())),
        ];
        // A voter left out of the weight table is disabled
        voters.retain(|v| config.weights.contains_key(v.id()));
        let keywords = config
            .weights
            .contains_key(voter_ids::KEYWORD)
            .then_some(keywords);

        let engine = VotingEngine::new(
            memory.clone(),
            voters,
            reasoner,
            config.weights.clone(),
            config.classifier.clone(),
            Duration::from_secs(config.reasoning.timeout_secs),
        )?;

        Ok(Self {
            tickets: RwLock::new(TicketLedger::new(TICKET_HISTORY)),
            config,
            embedder,
            atlas,
            memory,
            sessions,
            engine,
            keywords,
        })
    }

    pub fn config(&self) -> &SortifyConfig {
        &self.config
    }

    pub fn atlas(&self) -> &Arc<Atlas> {
        &self.atlas
    }

    pub fn memory(&self) -> &Arc<Memory> {
        &self.memory
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn engine(&self) -> &VotingEngine {
        &self.engine
    }

    /// Classify a request as of now.
    pub async fn classify(&self, request: &ClassificationRequest) -> Result<Classification> {
        self.classify_at(request, Utc::now()).await
    }

    /// Classify a request and issue a ticket for its eventual completion.
    pub async fn classify_at(
        &self,
        request: &ClassificationRequest,
        now: DateTime<Utc>,
    ) -> Result<Classification> {
        let result = self.engine.classify_at(request, now).await?;
        let ticket = Uuid::new_v4();
        tracing::info!(
            %ticket,
            category = %result.category,
            confidence = result.confidence,
            source = ?result.source,
            "Classified"
        );
        Ok(Classification { ticket, result })
    }

    /// Learn from a confirmed move.
    ///
    /// Updates Memory, the session shard and the Atlas. Returns `false`
    /// without touching any state for a duplicate ticket or an "Unknown"
    /// category. A malformed embedding is rejected before the ticket is
    /// consumed.
    pub async fn on_action_completed(&self, completion: Completion) -> Result<bool> {
        vector::validate(&completion.embedding, self.config.dimension)?;
        if completion.folder_id.is_empty() {
            return Err(Error::InvalidInput("completion has no folder".to_string()));
        }

        if !self.tickets.write().await.claim(completion.ticket) {
            tracing::warn!(ticket = %completion.ticket, "Duplicate completion ignored");
            return Ok(false);
        }
        if completion.category.is_empty() || completion.category == UNKNOWN {
            tracing::debug!(ticket = %completion.ticket, "Unknown completion, nothing learned");
            return Ok(false);
        }

        let Completion {
            ticket,
            embedding,
            category,
            folder_id,
            session_key,
            completed_at,
        } = completion;

        self.atlas
            .update(&folder_id, &embedding, Some(&category), completed_at)
            .await?;
        self.sessions
            .get_or_create(session_key.as_deref())
            .await
            .record(&category, completed_at)
            .await;
        self.memory.learn(embedding, &category, completed_at).await?;
        self.learn_category(&category).await;

        tracing::info!(%ticket, folder = %folder_id, category = %category, "Learned from completion");
        Ok(true)
    }

    /// Seed a destination folder from its display name, before any file has
    /// been moved into it.
    pub async fn register_folder(&self, folder_id: &str) -> Result<()> {
        let name = display_name(folder_id);
        let name_embedding = self.embedder.embed(&name).await?;
        self.atlas.register(folder_id, name_embedding).await?;
        self.learn_category(&name).await;
        Ok(())
    }

    /// Make a destination category known to the keyword voter. Failures are
    /// logged and dropped.
    async fn learn_category(&self, category: &str) {
        if let Some(keywords) = &self.keywords {
            if let Err(e) = keywords.learn_category(category).await {
                tracing::warn!(category, error = %e, "Keyword voter could not learn category");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{HashingEmbedder, NoReasoner};
    use crate::types::Source;

    const DIM: usize = 64;

    fn core() -> SortingCore {
        let config = SortifyConfig {
            dimension: DIM,
            ..Default::default()
        };
        SortingCore::new(config, Arc::new(HashingEmbedder::new(DIM)), Arc::new(NoReasoner)).unwrap()
    }

    fn unit(i: usize) -> Vector {
        let mut v = vec![0.0; DIM];
        v[i] = 1.0;
        v
    }

    fn completion(ticket: Uuid, embedding: Vector, category: &str, folder: &str) -> Completion {
        Completion {
            ticket,
            embedding,
            category: category.into(),
            folder_id: folder.into(),
            session_key: None,
            completed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_completion_feeds_fast_path() {
        let core = core();
        let request = ClassificationRequest::new(unit(0));

        let first = core.classify(&request).await.unwrap();
        assert!(first.result.is_unknown());

        let applied = core
            .on_action_completed(completion(first.ticket, unit(0), "Academic", "/home/u/College"))
            .await
            .unwrap();
        assert!(applied);

        let second = core.classify(&request).await.unwrap();
        assert_eq!(second.result.category, "Academic");
        assert_eq!(second.result.source, Source::Memory);
        assert_ne!(first.ticket, second.ticket);
    }

    #[tokio::test]
    async fn test_completion_updates_all_stores() {
        let core = core();
        let ticket = Uuid::new_v4();
        core.on_action_completed(completion(ticket, unit(1), "Music", "/home/u/Music"))
            .await
            .unwrap();

        assert_eq!(core.memory().len().await, 1);
        let cluster = core.atlas().get("/home/u/Music").await.unwrap();
        assert_eq!(cluster.sample_count(), 1);
        assert_eq!(cluster.category.as_deref(), Some("Music"));
        let session = core.sessions().get(None).await.unwrap();
        assert_eq!(session.context(Utc::now()).await.get("Music"), Some(&1));
    }

    #[tokio::test]
    async fn test_duplicate_completion_applied_once() {
        let core = core();
        let ticket = Uuid::new_v4();
        let c = completion(ticket, unit(2), "Code", "/home/u/Projects");

        assert!(core.on_action_completed(c.clone()).await.unwrap());
        assert!(!core.on_action_completed(c).await.unwrap());

        assert_eq!(core.memory().len().await, 1);
        let cluster = core.atlas().get("/home/u/Projects").await.unwrap();
        assert_eq!(cluster.sample_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_completion_learns_nothing() {
        let core = core();
        let applied = core
            .on_action_completed(completion(Uuid::new_v4(), unit(3), UNKNOWN, "/home/u/Review"))
            .await
            .unwrap();
        assert!(!applied);
        assert!(core.memory().is_empty().await);
        assert!(core.atlas().is_empty().await);
        assert_eq!(core.sessions().session_count().await, 0);
    }

    #[tokio::test]
    async fn test_malformed_completion_keeps_ticket() {
        let core = core();
        let ticket = Uuid::new_v4();
        let err = core
            .on_action_completed(completion(ticket, vec![1.0; 3], "Code", "/x"))
            .await
            .unwrap_err();
        assert!(err.is_input_error());

        // The ticket was not consumed by the rejected attempt
        assert!(core
            .on_action_completed(completion(ticket, unit(0), "Code", "/x"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_register_folder() {
        let core = core();
        core.register_folder("/home/u/Tax_Returns").await.unwrap();
        let cluster = core.atlas().get("/home/u/Tax_Returns").await.unwrap();
        assert_eq!(cluster.sample_count(), 0);
        assert!(cluster.name_embedding.is_some());
    }

    #[tokio::test]
    async fn test_completed_category_reaches_keyword_voter() {
        let core = core();
        core.on_action_completed(completion(Uuid::new_v4(), unit(5), "Recipes", "/home/u/Recipes"))
            .await
            .unwrap();

        let request = ClassificationRequest::new(unit(6)).with_keywords(["recipes"]);
        let classification = core.classify(&request).await.unwrap();
        assert_eq!(classification.result.category, "Recipes");
        assert!(classification
            .result
            .votes
            .iter()
            .any(|v| v.voter_id == voter_ids::KEYWORD && v.category == "Recipes"));
    }

    #[test]
    fn test_rejects_window_beyond_representable_time() {
        let mut config = SortifyConfig {
            dimension: DIM,
            ..Default::default()
        };
        config.session.window_secs = 10_000_000_000_000;
        let result = SortingCore::new(config, Arc::new(HashingEmbedder::new(DIM)), Arc::new(NoReasoner));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_embedder_dimension_must_match() {
        let result = SortingCore::new(
            SortifyConfig::default(),
            Arc::new(HashingEmbedder::new(16)),
            Arc::new(NoReasoner),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_ticket_ledger_forgets_oldest() {
        let mut ledger = TicketLedger::new(2);
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        assert!(ledger.claim(a));
        assert!(ledger.claim(b));
        assert!(!ledger.claim(a));
        assert!(ledger.claim(c));
        assert!(ledger.claim(a));
    }
}

//! Built-in voters
//!
//! | id             | signal                                   | confidence        |
//! |----------------|------------------------------------------|-------------------|
//! | `content_type` | MIME type and file extension             | fixed per rule    |
//! | `keyword`      | keywords vs. category reference texts    | cosine similarity |
//! | `atlas`        | Atlas folder match                       | cosine similarity |
//! | `memory`       | episodic memory at the voter threshold   | cosine similarity |
//! | `session`      | recent outcomes in the request's session | fixed             |
//! | `frequency`    | most common learned category             | share of records  |

use super::voter::Voter;
use crate::atlas::{Atlas, MatchTier};
use crate::config::voter_ids;
use crate::error::{Error, Result};
use crate::external::Embedder;
use crate::memory::Memory;
use crate::session::SessionManager;
use crate::types::{ClassificationRequest, Vote, UNKNOWN};
use crate::vector::{self, Vector};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};

/// Extension to category table, consulted after the MIME rules
const EXTENSION_TABLE: &[(&str, &[&str])] = &[
    ("Documents", &["pdf", "docx", "txt", "md"]),
    ("Images", &["jpg", "jpeg", "png", "gif", "svg"]),
    ("Video", &["mp4", "mkv", "mov", "avi"]),
    ("Audio", &["mp3", "wav", "flac"]),
    ("Archives", &["zip", "rar", "tar", "gz"]),
    ("Code", &["py", "js", "html", "css", "java", "cpp"]),
];

/// Fast-pass voter over MIME type and file extension.
pub struct ContentTypeVoter;

impl ContentTypeVoter {
    pub fn new() -> Self {
        Self
    }

    fn judge(mime: &str, ext: &str) -> Option<(&'static str, f64)> {
        if mime.starts_with("image/") {
            return Some(("Images", 0.9));
        }
        if mime.starts_with("video/") {
            return Some(("Video", 0.9));
        }
        if mime.starts_with("audio/") {
            return Some(("Audio", 0.9));
        }
        if mime.starts_with("text/x-python") || ext == "py" {
            return Some(("Code", 0.8));
        }
        if mime == "application/pdf" {
            return Some(("Documents", 0.5));
        }
        EXTENSION_TABLE
            .iter()
            .find(|(_, exts)| exts.contains(&ext))
            .map(|(category, _)| (*category, 0.6))
    }
}

impl Default for ContentTypeVoter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Voter for ContentTypeVoter {
    async fn vote(&self, request: &ClassificationRequest, _now: DateTime<Utc>) -> Result<Vec<Vote>> {
        let mime = request
            .mime_type
            .as_deref()
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let ext = request
            .file_name
            .as_deref()
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        Ok(Self::judge(&mime, &ext)
            .map(|(category, confidence)| Vote::new(self.id(), category, confidence))
            .into_iter()
            .collect())
    }

    fn id(&self) -> &str {
        voter_ids::CONTENT_TYPE
    }
}

/// Reference descriptions of the built-in categories. The keyword voter
/// embeds these instead of the bare names.
pub const CATEGORY_DESCRIPTIONS: &[(&str, &str)] = &[
    ("Documents", "Official documents, business letters, contracts, forms, legal papers, memos, administrative records, pdf, txt, docx."),
    ("Images", "Photos, pictures, screenshots, wallpapers, graphics, designs, camera rolls, jpg, png, image."),
    ("Video", "Movies, screen recordings, films, tv shows, episodes, clips, video footage, mp4, avi, mov."),
    ("Audio", "Music, songs, podcasts, voice notes, audiobooks, sound effects, recording, mp3, wav."),
    ("Archives", "Compressed zip files, rar, tar, 7z, backups, disk images, archive."),
    ("Code", "Programming code, scripts, source files, python, javascript, html, css, java, react, django, api, backend, frontend, def, class, import, function, return, var, const, let, database, sql, git, repo, pipeline."),
    ("Finance", "Invoices, receipts, tax returns, bank statements, bills, credit card reports, ledger, salary slips, accounting, money, price, cost, total, amount, pay, purchase."),
    ("Academic", "Educational materials, course content, machine learning, artificial intelligence, neural networks, deep learning, supervised learning, unsupervised learning, lectures, tutorials, study guides, textbooks, research, algorithms, data science, statistics, training, model, classification, regression."),
    ("College", "University administrative documents, syllabus, semester schedules, exam papers, assignments, practicals, labs, thesis, research projects, student enrollment, course registration, professor, grade, GPA."),
    ("Personal", "Family photos, private letters, medical records, id cards, passport, visa, personal journal, diary, health, insurance."),
    ("Projects", "Project source code, hackathon deliverables, development builds, technical specifications, repository data, readme, design doc, architecture."),
    ("Events", "Event tickets, conference schedules, meetup invites, workshop materials, calendar entries, rsvp, booking."),
];

/// Learned categories kept beyond the built-in table
const MAX_LEARNED_CATEGORIES: usize = 1024;

/// Cached embeddings of ad-hoc candidate names; cleared when full
const CANDIDATE_CACHE_CAPACITY: usize = 256;

/// Semantic voter comparing the request's keywords with category reference
/// texts.
///
/// Known categories are the built-in [`CATEGORY_DESCRIPTIONS`] plus those
/// learned from confirmed moves. A request with candidate categories is
/// scored against those candidates only; any other request is scored
/// against every known category.
pub struct KeywordVoter {
    embedder: Arc<dyn Embedder>,
    threshold: f64,
    builtin: OnceCell<BTreeMap<String, Vector>>,
    learned: RwLock<BTreeMap<String, Vector>>,
    candidates: RwLock<HashMap<String, Vector>>,
}

impl KeywordVoter {
    pub fn new(embedder: Arc<dyn Embedder>, threshold: f64) -> Self {
        Self {
            embedder,
            threshold,
            builtin: OnceCell::new(),
            learned: RwLock::new(BTreeMap::new()),
            candidates: RwLock::new(HashMap::new()),
        }
    }

    /// Built-in reference embeddings, computed on first use. A failed
    /// attempt is retried on the next call.
    async fn builtin(&self) -> Result<&BTreeMap<String, Vector>> {
        self.builtin
            .get_or_try_init(|| async {
                tracing::debug!("Embedding {} built-in categories", CATEGORY_DESCRIPTIONS.len());
                let mut table = BTreeMap::new();
                for (category, description) in CATEGORY_DESCRIPTIONS {
                    table.insert(category.to_string(), self.embedder.embed(description).await?);
                }
                Ok::<_, Error>(table)
            })
            .await
    }

    /// Add a category discovered at runtime, referenced by its name.
    ///
    /// Returns `false` when the category is already known, is "Unknown",
    /// or the learned table is full.
    pub async fn learn_category(&self, category: &str) -> Result<bool> {
        if category.is_empty() || category == UNKNOWN {
            return Ok(false);
        }
        if self.builtin().await?.contains_key(category) {
            return Ok(false);
        }
        {
            let learned = self.learned.read().await;
            if learned.contains_key(category) {
                return Ok(false);
            }
            if learned.len() >= MAX_LEARNED_CATEGORIES {
                tracing::debug!("Learned category table full, skipping '{}'", category);
                return Ok(false);
            }
        }

        let reference = self.embedder.embed(&reference_text(category)).await?;
        let mut learned = self.learned.write().await;
        if learned.len() >= MAX_LEARNED_CATEGORIES {
            return Ok(false);
        }
        let added = learned.insert(category.to_string(), reference).is_none();
        if added {
            tracing::debug!("Keyword voter learned category '{}'", category);
        }
        Ok(added)
    }

    async fn reference(&self, category: &str) -> Result<Vector> {
        if let Some(v) = self.builtin().await?.get(category) {
            return Ok(v.clone());
        }
        if let Some(v) = self.learned.read().await.get(category) {
            return Ok(v.clone());
        }
        if let Some(v) = self.candidates.read().await.get(category) {
            return Ok(v.clone());
        }

        let v = self.embedder.embed(&reference_text(category)).await?;
        let mut cache = self.candidates.write().await;
        if cache.len() >= CANDIDATE_CACHE_CAPACITY {
            cache.clear();
        }
        cache.insert(category.to_string(), v.clone());
        Ok(v)
    }

    /// Every known category with its reference embedding, in name order.
    async fn known(&self) -> Result<BTreeMap<String, Vector>> {
        let mut known = self.builtin().await?.clone();
        for (category, v) in self.learned.read().await.iter() {
            known.entry(category.clone()).or_insert_with(|| v.clone());
        }
        Ok(known)
    }
}

fn reference_text(category: &str) -> String {
    category.replace(['_', '-'], " ")
}

#[async_trait]
impl Voter for KeywordVoter {
    async fn vote(&self, request: &ClassificationRequest, _now: DateTime<Utc>) -> Result<Vec<Vote>> {
        if request.keywords.is_empty() {
            return Ok(Vec::new());
        }
        let query = self.embedder.embed(&request.keyword_text()).await?;

        let references = if request.candidate_categories.is_empty() {
            self.known().await?
        } else {
            let mut references = BTreeMap::new();
            for category in &request.candidate_categories {
                references.insert(category.clone(), self.reference(category).await?);
            }
            references
        };

        let mut best: Option<(&str, f64)> = None;
        for (category, reference) in &references {
            let similarity = vector::cosine_similarity(&query, reference)?;
            if best.map_or(true, |(_, s)| similarity > s) {
                best = Some((category.as_str(), similarity));
            }
        }

        Ok(best
            .filter(|(_, similarity)| *similarity >= self.threshold)
            .map(|(category, similarity)| Vote::new(self.id(), category, similarity))
            .into_iter()
            .collect())
    }

    fn id(&self) -> &str {
        voter_ids::KEYWORD
    }
}

/// Confidence of a vote backed only by a static category rule
pub const STATIC_RULE_CONFIDENCE: f64 = 0.6;

/// Semantic voter backed by the Atlas folder clusters.
pub struct AtlasVoter {
    atlas: Arc<Atlas>,
    threshold: f64,
}

impl AtlasVoter {
    pub fn new(atlas: Arc<Atlas>, threshold: f64) -> Self {
        Self { atlas, threshold }
    }

    /// Text the static category map is matched against.
    fn hint(request: &ClassificationRequest) -> String {
        let mut hint = request.keyword_text();
        if let Some(name) = &request.file_name {
            if !hint.is_empty() {
                hint.push(' ');
            }
            hint.push_str(name);
        }
        hint
    }
}

#[async_trait]
impl Voter for AtlasVoter {
    async fn vote(&self, request: &ClassificationRequest, _now: DateTime<Utc>) -> Result<Vec<Vote>> {
        let hint = Self::hint(request);
        let found = self
            .atlas
            .best_match(&request.text_embedding, self.threshold, Some(&hint))
            .await?;

        Ok(found
            .map(|m| {
                let confidence = match m.tier {
                    MatchTier::StaticRule => STATIC_RULE_CONFIDENCE,
                    MatchTier::Centroid | MatchTier::Name => m.similarity,
                };
                tracing::debug!(
                    folder = %m.folder_id,
                    tier = ?m.tier,
                    "Atlas voter matched '{}' ({:.3})",
                    m.category,
                    confidence
                );
                Vote::new(self.id(), m.category, confidence)
            })
            .into_iter()
            .collect())
    }

    fn id(&self) -> &str {
        voter_ids::ATLAS
    }
}

/// History voter: episodic recall at a lower threshold than the fast path.
pub struct MemoryVoter {
    memory: Arc<Memory>,
    threshold: f64,
}

impl MemoryVoter {
    pub fn new(memory: Arc<Memory>, threshold: f64) -> Self {
        Self { memory, threshold }
    }
}

#[async_trait]
impl Voter for MemoryVoter {
    async fn vote(&self, request: &ClassificationRequest, _now: DateTime<Utc>) -> Result<Vec<Vote>> {
        let recall = self
            .memory
            .recall(&request.text_embedding, self.threshold)
            .await?;
        Ok(recall
            .map(|r| Vote::new(self.id(), r.category, r.similarity))
            .into_iter()
            .collect())
    }

    fn id(&self) -> &str {
        voter_ids::MEMORY
    }
}

/// Temporal-locality voter over the request's session shard.
pub struct SessionVoter {
    sessions: Arc<SessionManager>,
}

impl SessionVoter {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl Voter for SessionVoter {
    async fn vote(&self, request: &ClassificationRequest, now: DateTime<Utc>) -> Result<Vec<Vote>> {
        match self.sessions.get(request.session_key.as_deref()).await {
            Some(session) => Ok(vec![session.vote(now).await]),
            None => Ok(Vec::new()),
        }
    }

    fn id(&self) -> &str {
        voter_ids::SESSION
    }
}

/// Votes the category learned most often, weighted by its share of memory.
pub struct FrequencyVoter {
    memory: Arc<Memory>,
}

impl FrequencyVoter {
    pub fn new(memory: Arc<Memory>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Voter for FrequencyVoter {
    async fn vote(&self, _request: &ClassificationRequest, _now: DateTime<Utc>) -> Result<Vec<Vote>> {
        let counts = self.memory.category_counts().await;
        let total: usize = counts.values().sum();
        if total == 0 {
            return Ok(Vec::new());
        }

        // Strict comparison over sorted keys: ties go to the first category
        let mut top: Option<(&String, usize)> = None;
        for (category, count) in &counts {
            if top.map_or(true, |(_, c)| *count > c) {
                top = Some((category, *count));
            }
        }

        Ok(top
            .map(|(category, count)| {
                Vote::new(self.id(), category.as_str(), count as f64 / total as f64)
            })
            .into_iter()
            .collect())
    }

    fn id(&self) -> &str {
        voter_ids::FREQUENCY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AtlasConfig, CategoryRule, MemoryConfig, SessionConfig};
    use crate::external::{HashingEmbedder, UnavailableEmbedder};

    fn request(dim: usize) -> ClassificationRequest {
        ClassificationRequest::new(vec![1.0; dim])
    }

    #[tokio::test]
    async fn test_content_type_mime_rules() {
        let voter = ContentTypeVoter::new();
        let votes = voter
            .vote(&request(2).with_mime_type("image/png"), Utc::now())
            .await
            .unwrap();
        assert_eq!(votes, vec![Vote::new("content_type", "Images", 0.9)]);

        let votes = voter
            .vote(&request(2).with_file_name("train.py"), Utc::now())
            .await
            .unwrap();
        assert_eq!(votes[0].category, "Code");
        assert_eq!(votes[0].confidence, 0.8);

        let votes = voter
            .vote(
                &request(2).with_mime_type("application/pdf").with_file_name("a.pdf"),
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(votes[0].category, "Documents");
        assert_eq!(votes[0].confidence, 0.5);
    }

    #[tokio::test]
    async fn test_content_type_extension_table() {
        let voter = ContentTypeVoter::new();
        let votes = voter
            .vote(&request(2).with_file_name("Backup.ZIP"), Utc::now())
            .await
            .unwrap();
        assert_eq!(votes, vec![Vote::new("content_type", "Archives", 0.6)]);

        let votes = voter
            .vote(&request(2).with_file_name("mystery.bin"), Utc::now())
            .await
            .unwrap();
        assert!(votes.is_empty());

        let votes = voter.vote(&request(2), Utc::now()).await.unwrap();
        assert!(votes.is_empty());
    }

    #[tokio::test]
    async fn test_keyword_voter_picks_closest_candidate() {
        let voter = KeywordVoter::new(Arc::new(HashingEmbedder::new(128)), 0.1);
        let req = request(2)
            .with_keywords(["physics", "homework", "lecture"])
            .with_candidates(["Physics", "Finance"]);

        let votes = voter.vote(&req, Utc::now()).await.unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].category, "Physics");
        assert!(votes[0].confidence > 0.1);
    }

    #[tokio::test]
    async fn test_keyword_voter_abstains() {
        let voter = KeywordVoter::new(Arc::new(HashingEmbedder::new(128)), 0.1);
        let no_keywords = request(2).with_candidates(["Finance"]);
        assert!(voter.vote(&no_keywords, Utc::now()).await.unwrap().is_empty());

        let unrelated = request(2)
            .with_keywords(["zebra"])
            .with_candidates(["Finance"]);
        assert!(voter.vote(&unrelated, Utc::now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_keyword_voter_without_candidates_uses_builtin_table() {
        let voter = KeywordVoter::new(Arc::new(HashingEmbedder::new(512)), 0.1);
        let req = request(2).with_keywords(["invoices", "receipts", "tax", "bank"]);

        let votes = voter.vote(&req, Utc::now()).await.unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].category, "Finance");
        assert!(votes[0].confidence > 0.4);
    }

    #[tokio::test]
    async fn test_keyword_voter_learned_category() {
        let voter = KeywordVoter::new(Arc::new(HashingEmbedder::new(512)), 0.1);
        let req = request(2).with_keywords(["pasta", "recipes"]);
        assert!(voter.vote(&req, Utc::now()).await.unwrap().is_empty());

        assert!(voter.learn_category("Recipes").await.unwrap());
        assert!(!voter.learn_category("Recipes").await.unwrap());
        assert!(!voter.learn_category("Finance").await.unwrap());
        assert!(!voter.learn_category(UNKNOWN).await.unwrap());

        let votes = voter.vote(&req, Utc::now()).await.unwrap();
        assert_eq!(votes[0].category, "Recipes");
        assert!((votes[0].confidence - 0.5f64.sqrt()).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_keyword_voter_embedder_failure() {
        let voter = KeywordVoter::new(Arc::new(UnavailableEmbedder::new(8)), 0.1);
        let req = request(2).with_keywords(["a1"]).with_candidates(["B"]);
        assert!(voter.vote(&req, Utc::now()).await.is_err());
    }

    #[tokio::test]
    async fn test_atlas_voter() {
        let config = AtlasConfig {
            category_map: vec![CategoryRule {
                pattern: "invoice".into(),
                folder: "/home/u/Finance".into(),
            }],
            ..Default::default()
        };
        let atlas = Arc::new(Atlas::new(&config, 2, Arc::new(HashingEmbedder::new(2))).unwrap());
        for _ in 0..3 {
            atlas
                .update("/home/u/Physics", &[1.0, 0.0], Some("Physics"), Utc::now())
                .await
                .unwrap();
        }
        let voter = AtlasVoter::new(atlas, 0.55);

        let votes = voter
            .vote(&ClassificationRequest::new(vec![1.0, 0.0]), Utc::now())
            .await
            .unwrap();
        assert_eq!(votes[0].category, "Physics");
        assert!((votes[0].confidence - 1.0).abs() < 1e-9);

        let votes = voter
            .vote(
                &ClassificationRequest::new(vec![0.0, 1.0]).with_file_name("invoice_march.pdf"),
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(votes, vec![Vote::new("atlas", "Finance", STATIC_RULE_CONFIDENCE)]);
    }

    #[tokio::test]
    async fn test_memory_voter_threshold() {
        let memory = Arc::new(Memory::new(&MemoryConfig::default(), 2));
        memory.learn(vec![1.0, 0.0], "Academic", Utc::now()).await.unwrap();
        let voter = MemoryVoter::new(memory, 0.70);

        let votes = voter
            .vote(&ClassificationRequest::new(vec![1.0, 0.9]), Utc::now())
            .await
            .unwrap();
        assert_eq!(votes[0].category, "Academic");

        let votes = voter
            .vote(&ClassificationRequest::new(vec![0.0, 1.0]), Utc::now())
            .await
            .unwrap();
        assert!(votes.is_empty());
    }

    #[tokio::test]
    async fn test_session_voter_uses_request_shard() {
        let sessions = Arc::new(SessionManager::new(SessionConfig::default()));
        let now = Utc::now();
        sessions.get_or_create(Some("alice")).await.record("Music", now).await;
        let voter = SessionVoter::new(sessions);

        let votes = voter
            .vote(&request(2).with_session_key("alice"), now)
            .await
            .unwrap();
        assert_eq!(votes[0].category, "Music");
        assert_eq!(votes[0].confidence, 0.7);

        let votes = voter.vote(&request(2).with_session_key("bob"), now).await.unwrap();
        assert!(votes.is_empty());
    }

    #[tokio::test]
    async fn test_frequency_voter() {
        let memory = Arc::new(Memory::new(&MemoryConfig::default(), 2));
        let voter = FrequencyVoter::new(memory.clone());
        assert!(voter.vote(&request(2), Utc::now()).await.unwrap().is_empty());

        for category in ["Code", "Academic", "Code", "Academic", "Music"] {
            memory.learn(vec![1.0, 0.0], category, Utc::now()).await.unwrap();
        }
        let votes = voter.vote(&request(2), Utc::now()).await.unwrap();
        // Academic and Code tie at 2 of 5; alphabetical order decides
        assert_eq!(votes, vec![Vote::new("frequency", "Academic", 0.4)]);
    }
}

//! Classification state machine
//!
//! ```text
//! MemoryCheck ──hit──────────────────────────────────────┐
//!      │ miss                                            ▼
//!      ▼                                              Resolved
//!   Voting ──normalized confidence >= threshold──────────▲
//!      │ below threshold                                 │
//!      ▼                                                 │
//!  Reasoning ──one call, one re-aggregation──────────────┘
//! ```

use super::aggregate::Tally;
use super::voter::Voter;
use crate::config::{voter_ids, ClassifierConfig};
use crate::error::{Error, Result};
use crate::external::Reasoner;
use crate::memory::Memory;
use crate::types::{ClassificationRequest, ClassificationResult, Source, Vote, UNKNOWN};
use crate::vector;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Stage of a single classification.
enum Stage {
    MemoryCheck,
    Voting,
    Reasoning(Tally),
    Resolved(ClassificationResult),
}

/// Weighted-ensemble classifier with a memory fast path and a single
/// reasoning escalation.
pub struct VotingEngine {
    memory: Arc<Memory>,
    voters: Vec<Arc<dyn Voter>>,
    reasoner: Arc<dyn Reasoner>,
    weights: BTreeMap<String, f64>,
    config: ClassifierConfig,
    reasoning_timeout: Duration,
    workers: Semaphore,
}

impl VotingEngine {
    /// Create an engine.
    ///
    /// Every voter and the reasoning vote must have a positive weight in
    /// `weights`; the table is fixed for the engine's lifetime.
    pub fn new(
        memory: Arc<Memory>,
        voters: Vec<Arc<dyn Voter>>,
        reasoner: Arc<dyn Reasoner>,
        weights: BTreeMap<String, f64>,
        config: ClassifierConfig,
        reasoning_timeout: Duration,
    ) -> Result<Self> {
        let required = voters
            .iter()
            .map(|v| v.id())
            .chain(std::iter::once(voter_ids::REASONING));
        for id in required {
            match weights.get(id) {
                Some(w) if w.is_finite() && *w > 0.0 => {}
                _ => {
                    return Err(Error::Config(format!(
                        "voter '{}' has no positive weight",
                        id
                    )))
                }
            }
        }

        tracing::info!(
            voters = ?voters.iter().map(|v| v.id()).collect::<Vec<_>>(),
            reasoner = reasoner.name(),
            workers = config.voter_workers,
            "Voting engine ready"
        );
        Ok(Self {
            workers: Semaphore::new(config.voter_workers.max(1)),
            memory,
            voters,
            reasoner,
            weights,
            config,
            reasoning_timeout,
        })
    }

    fn weight(&self, voter_id: &str) -> f64 {
        self.weights.get(voter_id).copied().unwrap_or(0.0)
    }

    /// Classify a request as of now.
    pub async fn classify(&self, request: &ClassificationRequest) -> Result<ClassificationResult> {
        self.classify_at(request, Utc::now()).await
    }

    /// Classify a request.
    ///
    /// Only malformed input is an error. Low confidence, voter failures and
    /// reasoning failures all produce a normal result, "Unknown" included.
    pub async fn classify_at(
        &self,
        request: &ClassificationRequest,
        now: DateTime<Utc>,
    ) -> Result<ClassificationResult> {
        vector::validate(&request.text_embedding, self.memory.dimension())?;

        let mut stage = Stage::MemoryCheck;
        loop {
            stage = match stage {
                Stage::MemoryCheck => self.memory_check(request).await?,
                Stage::Voting => {
                    let tally = self.collect_votes(request, now).await;
                    match tally.winner() {
                        Some((category, confidence))
                            if confidence >= self.config.escalation_threshold =>
                        {
                            tracing::debug!(
                                "Ensemble decided '{}' ({:.3})",
                                category,
                                confidence
                            );
                            Stage::Resolved(tally.resolve(Source::Ensemble))
                        }
                        _ => Stage::Reasoning(tally),
                    }
                }
                Stage::Reasoning(tally) => Stage::Resolved(self.escalate(request, tally).await),
                Stage::Resolved(result) => return Ok(result),
            };
        }
    }

    async fn memory_check(&self, request: &ClassificationRequest) -> Result<Stage> {
        let recall = self
            .memory
            .recall(&request.text_embedding, self.config.memory_fast_path_threshold)
            .await?;
        Ok(match recall {
            Some(hit) => {
                tracing::debug!(
                    "Memory fast path: '{}' (score: {:.3})",
                    hit.category,
                    hit.similarity
                );
                Stage::Resolved(ClassificationResult {
                    category: hit.category,
                    confidence: hit.similarity.clamp(0.0, 1.0),
                    source: Source::Memory,
                    votes: Vec::new(),
                })
            }
            None => Stage::Voting,
        })
    }

    /// Run every voter, at most `voter_workers` at a time.
    async fn collect_votes(&self, request: &ClassificationRequest, now: DateTime<Utc>) -> Tally {
        let ballots = self.voters.iter().map(|voter| async move {
            let _permit = self.workers.acquire().await.ok();
            (voter.id(), voter.vote(request, now).await)
        });
        let outcomes = futures::future::join_all(ballots).await;

        let mut tally = Tally::new();
        for (voter_id, outcome) in outcomes {
            match outcome {
                Ok(votes) => {
                    for vote in votes {
                        // Attribute to the registered id so weights always apply
                        let vote = Vote::new(voter_id, vote.category, vote.confidence);
                        tally.add(vote, self.weight(voter_id));
                    }
                }
                Err(e) => {
                    tracing::warn!(voter = voter_id, error = %e, "Voter failed, abstaining");
                }
            }
        }
        tally
    }

    /// Consult the reasoning service once and re-aggregate.
    ///
    /// Any failure, timeout or unusable answer keeps the ensemble result.
    async fn escalate(&self, request: &ClassificationRequest, mut tally: Tally) -> ClassificationResult {
        tracing::info!(
            reasoner = self.reasoner.name(),
            "Low ensemble confidence, escalating"
        );

        let answer = tokio::time::timeout(
            self.reasoning_timeout,
            self.reasoner
                .infer(&request.keywords, &request.candidate_categories),
        )
        .await;

        let category = match answer {
            Ok(Ok(category)) => category,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Reasoning failed, keeping ensemble result");
                return tally.resolve(Source::Ensemble);
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.reasoning_timeout.as_secs_f64(),
                    "Reasoning timed out, keeping ensemble result"
                );
                return tally.resolve(Source::Ensemble);
            }
        };

        let usable = !category.is_empty()
            && category != UNKNOWN
            && (request.candidate_categories.is_empty()
                || request.candidate_categories.contains(&category));
        if !usable {
            tracing::debug!("Reasoning abstained with '{}'", category);
            return tally.resolve(Source::Ensemble);
        }

        tally.add(
            Vote::new(voter_ids::REASONING, category, self.config.reasoning_confidence),
            self.weight(voter_ids::REASONING),
        );
        tally.resolve(Source::Reasoning)
    }
}

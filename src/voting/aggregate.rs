//! Weighted vote aggregation

use crate::types::{ClassificationResult, Source, Vote};
use std::collections::BTreeMap;

/// Running weighted tally of one request's votes.
///
/// `score(c) = Σ weight(voter) × confidence` over non-abstaining votes for
/// `c`. Normalized confidence divides the winner's score by the summed
/// weight of the voters that voted, each voter counted once.
#[derive(Debug, Clone, Default)]
pub struct Tally {
    scores: BTreeMap<String, f64>,
    participants: BTreeMap<String, f64>,
    votes: Vec<Vote>,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one vote. Abstentions and non-positive weights are ignored.
    pub fn add(&mut self, vote: Vote, weight: f64) {
        if vote.is_abstention() || weight.is_nan() || weight <= 0.0 {
            return;
        }
        *self.scores.entry(vote.category.clone()).or_insert(0.0) += weight * vote.confidence;
        self.participants.insert(vote.voter_id.clone(), weight);
        self.votes.push(vote);
    }

    pub fn score(&self, category: &str) -> f64 {
        self.scores.get(category).copied().unwrap_or(0.0)
    }

    /// Summed weight of participating voters.
    pub fn total_weight(&self) -> f64 {
        self.participants.values().sum()
    }

    /// Highest-scoring category and its normalized confidence.
    ///
    /// Equal top scores resolve to the alphabetically first category.
    /// `None` when every voter abstained.
    pub fn winner(&self) -> Option<(String, f64)> {
        let mut best: Option<(&String, f64)> = None;
        for (category, score) in &self.scores {
            if best.map_or(true, |(_, s)| *score > s) {
                best = Some((category, *score));
            }
        }
        let (category, score) = best?;
        let total = self.total_weight();
        let confidence = if total > 0.0 {
            (score / total).clamp(0.0, 1.0)
        } else {
            0.0
        };
        Some((category.clone(), confidence))
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    /// Resolve into a result; "Unknown" with confidence 0 if nobody voted.
    pub fn resolve(&self, source: Source) -> ClassificationResult {
        match self.winner() {
            Some((category, confidence)) => ClassificationResult {
                category,
                confidence,
                source,
                votes: self.votes.clone(),
            },
            None => ClassificationResult::unknown(source),
        }
    }
}

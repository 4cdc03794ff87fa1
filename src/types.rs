//! Request, vote and result types shared by the classification engine

use crate::vector::Vector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The explicit no-decision category.
pub const UNKNOWN: &str = "Unknown";

/// One voter's opinion on one category.
///
/// Confidence is clamped into `[0, 1]` on construction. A confidence of zero
/// (or the [`UNKNOWN`] category) is an abstention and never counts as
/// evidence for or against any category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub voter_id: String,
    pub category: String,
    pub confidence: f64,
}

impl Vote {
    pub fn new(voter_id: impl Into<String>, category: impl Into<String>, confidence: f64) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            voter_id: voter_id.into(),
            category: category.into(),
            confidence,
        }
    }

    /// A "no opinion" vote.
    pub fn abstain(voter_id: impl Into<String>) -> Self {
        Self::new(voter_id, UNKNOWN, 0.0)
    }

    pub fn is_abstention(&self) -> bool {
        self.confidence <= 0.0 || self.category.is_empty() || self.category == UNKNOWN
    }
}

/// Input to a classification, built by the extraction pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassificationRequest {
    /// Extracted keywords
    #[serde(default)]
    pub keywords: BTreeSet<String>,

    /// Embedding of the extracted text
    pub text_embedding: Vector,

    /// Categories the caller is willing to route to
    #[serde(default)]
    pub candidate_categories: BTreeSet<String>,

    /// Original file name, for extension rules
    #[serde(default)]
    pub file_name: Option<String>,

    /// Detected MIME type
    #[serde(default)]
    pub mime_type: Option<String>,

    /// Session shard key (None = the shared default session)
    #[serde(default)]
    pub session_key: Option<String>,
}

impl ClassificationRequest {
    pub fn new(text_embedding: Vector) -> Self {
        Self {
            text_embedding,
            ..Default::default()
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_candidates<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.candidate_categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }

    pub fn with_session_key(mut self, key: impl Into<String>) -> Self {
        self.session_key = Some(key.into());
        self
    }

    /// Keywords joined by spaces, in sorted order.
    pub fn keyword_text(&self) -> String {
        self.keywords
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Which path produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Episodic memory fast path
    Memory,
    /// Weighted voter ensemble
    Ensemble,
    /// Ensemble re-aggregated with the reasoning service's vote
    Reasoning,
}

/// Output of a classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: String,
    /// Normalized confidence in `[0, 1]`
    pub confidence: f64,
    pub source: Source,
    /// Non-abstaining votes that took part in the decision
    #[serde(default)]
    pub votes: Vec<Vote>,
}

impl ClassificationResult {
    /// The explicit no-decision outcome.
    pub fn unknown(source: Source) -> Self {
        Self {
            category: UNKNOWN.to_string(),
            confidence: 0.0,
            source,
            votes: Vec::new(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.category == UNKNOWN
    }
}

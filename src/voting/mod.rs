//! Weighted voting ensemble
//!
//! A [`VotingEngine`] runs a set of independent [`Voter`]s over a request,
//! combines their opinions with a fixed weight table and escalates to the
//! external reasoning service when the ensemble is unsure.

pub mod aggregate;
pub mod engine;
pub mod voter;
pub mod voters;

pub use aggregate::Tally;
pub use engine::VotingEngine;
pub use voter::Voter;
pub use voters::{
    AtlasVoter, ContentTypeVoter, FrequencyVoter, KeywordVoter, MemoryVoter, SessionVoter,
    CATEGORY_DESCRIPTIONS, STATIC_RULE_CONFIDENCE,
};

//! Pluggable voter interface

use crate::error::Result;
use crate::types::{ClassificationRequest, Vote};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// An independent classification strategy.
///
/// A voter returns one [`Vote`] per category it is willing to assert; an
/// empty list (or zero-confidence votes) means it abstains. Errors are not
/// fatal to classification: the engine logs them and treats the voter as
/// abstaining.
#[async_trait]
pub trait Voter: Send + Sync {
    /// Produce this voter's opinion on `request`.
    async fn vote(&self, request: &ClassificationRequest, now: DateTime<Utc>) -> Result<Vec<Vote>>;

    /// Stable identifier, also the key into the weight table.
    fn id(&self) -> &str;
}

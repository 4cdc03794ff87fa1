//! Reasoning service boundary
//!
//! The reasoning service is the slow, high-quality fallback consulted when
//! the voter ensemble is unsure. It may take seconds and may fail; callers
//! treat any failure as "no answer".

use crate::config::ReasoningConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// External reasoning service.
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Pick the best category for the given keywords.
    async fn infer(&self, keywords: &BTreeSet<String>, categories: &BTreeSet<String>)
        -> Result<String>;

    /// Human-readable name (used in logs).
    fn name(&self) -> &str;
}

/// Reasoner used when no service is configured. Always unavailable.
pub struct NoReasoner;

#[async_trait]
impl Reasoner for NoReasoner {
    async fn infer(
        &self,
        _keywords: &BTreeSet<String>,
        _categories: &BTreeSet<String>,
    ) -> Result<String> {
        Err(Error::Reasoning("no reasoning service configured".to_string()))
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// Wire request for [`HttpReasoner`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferRequest {
    pub keywords: Vec<String>,
    pub categories: Vec<String>,
}

/// Wire response for [`HttpReasoner`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferResponse {
    pub category: String,
}

/// Reasoning service reached over HTTP.
///
/// POSTs an [`InferRequest`] as JSON and expects an [`InferResponse`].
pub struct HttpReasoner {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpReasoner {
    /// Create a reasoner for `endpoint` with a per-request timeout.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Build from configuration; `None` when no endpoint is configured.
    pub fn from_config(config: &ReasoningConfig) -> Result<Option<Self>> {
        match &config.endpoint {
            Some(endpoint) => Ok(Some(Self::new(
                endpoint.clone(),
                Duration::from_secs(config.timeout_secs),
            )?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Reasoner for HttpReasoner {
    async fn infer(
        &self,
        keywords: &BTreeSet<String>,
        categories: &BTreeSet<String>,
    ) -> Result<String> {
        let body = InferRequest {
            keywords: keywords.iter().cloned().collect(),
            categories: categories.iter().cloned().collect(),
        };

        let response = self.client.post(&self.endpoint).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(Error::Reasoning(format!(
                "reasoning service returned {}",
                response.status()
            )));
        }
        let parsed: InferResponse = response.json().await?;
        Ok(parsed.category)
    }

    fn name(&self) -> &str {
        "http"
    }
}

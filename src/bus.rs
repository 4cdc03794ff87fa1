//! Typed message channel in front of the sorting core
//!
//! Producers (the file watcher, the move executor) hold a cloneable
//! [`CoreHandle`] and talk to a single worker task over a bounded channel:
//!
//! ```text
//! watcher  ── Classify{request, reply} ──┐
//!                                        ├──► worker ──► SortingCore
//! executor ── ActionCompleted(c) ────────┘
//! ```
//!
//! Classifications are served concurrently. Completions are applied in
//! arrival order; redelivered completions are dropped by the core's ticket
//! check, which makes at-least-once delivery safe.

use crate::core::{Classification, Completion, SortingCore};
use crate::error::{Error, Result};
use crate::types::ClassificationRequest;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Default channel capacity
pub const DEFAULT_CAPACITY: usize = 64;

/// Message accepted by the core worker
#[derive(Debug)]
pub enum CoreMessage {
    /// Classify a file; the decision is sent back on `reply`
    Classify {
        request: ClassificationRequest,
        reply: oneshot::Sender<Result<Classification>>,
    },
    /// A move was executed
    ActionCompleted(Completion),
}

/// Producer side of the core channel
#[derive(Clone)]
pub struct CoreHandle {
    tx: mpsc::Sender<CoreMessage>,
}

impl CoreHandle {
    /// Request a classification and wait for the decision.
    pub async fn classify(&self, request: ClassificationRequest) -> Result<Classification> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CoreMessage::Classify { request, reply })
            .await
            .map_err(|_| Error::Internal("core worker stopped".to_string()))?;
        rx.await
            .map_err(|_| Error::Internal("core worker dropped the request".to_string()))?
    }

    /// Report an executed move.
    pub async fn action_completed(&self, completion: Completion) -> Result<()> {
        self.tx
            .send(CoreMessage::ActionCompleted(completion))
            .await
            .map_err(|_| Error::Internal("core worker stopped".to_string()))
    }
}

/// Spawn the core worker. It stops once every handle has been dropped.
pub fn spawn(core: Arc<SortingCore>, capacity: usize) -> (CoreHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let worker = tokio::spawn(run(core, rx));
    (CoreHandle { tx }, worker)
}

async fn run(core: Arc<SortingCore>, mut rx: mpsc::Receiver<CoreMessage>) {
    tracing::debug!("Core worker started");
    while let Some(message) = rx.recv().await {
        match message {
            CoreMessage::Classify { request, reply } => {
                let core = core.clone();
                tokio::spawn(async move {
                    let result = core.classify(&request).await;
                    if reply.send(result).is_err() {
                        tracing::debug!("Classification abandoned by caller");
                    }
                });
            }
            CoreMessage::ActionCompleted(completion) => {
                let ticket = completion.ticket;
                if let Err(e) = core.on_action_completed(completion).await {
                    tracing::warn!(%ticket, error = %e, "Rejected completion");
                }
            }
        }
    }
    tracing::debug!("Core worker stopped");
}

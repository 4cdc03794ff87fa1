//! External collaborators consumed by the engine
//!
//! - [`Embedder`]: `embed(text) -> vector`
//! - [`Reasoner`]: `infer(keywords, categories) -> category`

pub mod embedder;
pub mod reasoner;

pub use embedder::{Embedder, HashingEmbedder, UnavailableEmbedder};
pub use reasoner::{HttpReasoner, InferRequest, InferResponse, NoReasoner, Reasoner};

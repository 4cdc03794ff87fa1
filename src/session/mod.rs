//! Session context: temporal locality of recent classifications

mod context;
mod manager;

pub use context::{SessionContext, SessionEvent};
pub use manager::{SessionManager, DEFAULT_SESSION};

//! Core runtime: configuration, the context budget, and the agent loop.

pub mod config;
pub mod context;
pub mod session;

pub use config::{Config, ConfigError};
pub use context::{ContextError, ContextManager};
pub use session::{AgentAnswer, AgentSession, SessionError, SessionState};

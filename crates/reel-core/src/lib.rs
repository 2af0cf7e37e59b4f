//! # reel-core
//!
//! Core types, traits, and status events for the chapter video pipeline.
//!
//! This crate provides the data model shared by the job queue and its
//! collaborators, the error taxonomy, the collaborator traits
//! ([`ChapterStore`], [`SearchProvider`], [`FastPathResolver`]), and the
//! [`StatusBus`] that broadcasts job transitions.

pub mod defaults;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, ProviderError, Result};
pub use events::{StatusBus, StatusEvent, StatusSubscription};
pub use logging::{init_logging, LogConfig, LogFormat};
pub use models::*;
pub use traits::*;

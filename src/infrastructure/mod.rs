//! Infrastructure layer: configuration, errors, transport, persistence.

pub mod config;
pub mod errors;
pub mod scheme_repository;
pub mod transport;

pub use config::{EndpointConfig, ExtractionConfig};
pub use errors::ExtractionError;
pub use scheme_repository::{SchemeStore, SqliteSchemeRepository, UpsertOutcome};
pub use transport::{HttpSession, TransportSession};

//! Domain layer: canonical record types and run-level events.

pub mod events;
pub mod scheme;

pub use events::{ExtractionEvent, RunResult, RunStatus};
pub use scheme::{IdentityKey, PersistedScheme, RawCapture, SchemeLevel, SchemeRecord};

//! The picvault backup engine.
//!
//! Everything stateful about a backup run lives here: the durable
//! checkpoint ([`ProgressStore`]), the walk over the library
//! ([`TraversalController`]), date-partitioned placement ([`FilePlacer`]),
//! and the state machine tying them together ([`BackupOrchestrator`]).
//!
//! The engine is written entirely against the capability traits
//! ([`GallerySurface`](picvault_surface::GallerySurface),
//! [`MetadataTool`](picvault_metadata::MetadataTool)) so every run-level
//! behaviour is testable against scripted implementations.

pub mod error;
pub mod orchestrate;
pub mod place;
pub mod progress;
pub mod traverse;

pub use crate::error::{Error, ErrorKind, Result};
pub use crate::orchestrate::{BackupOrchestrator, Context, Outcome};
pub use crate::place::{FilePlacer, Layout, Placement};
pub use crate::progress::ProgressStore;
pub use crate::traverse::TraversalController;

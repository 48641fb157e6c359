//! Debugger session engine.
//!
//! This module spawns debugger processes, runs one command at a time against
//! each of them, and keeps track of every live session.
//!
//! - [`launcher`]: process spawning and the readiness handshake
//! - [`boundary`]: deciding when a command's output is complete
//! - [`executor`]: a single request/response exchange
//! - [`registry`]: the id to session map
//! - [`manager`]: start, execute, terminate and shutdown

pub mod boundary;
pub mod error;
pub mod executor;
pub mod launcher;
pub mod manager;
pub mod registry;

pub use boundary::{BoundaryDetector, PromptMarkerDetector};
pub use error::{SessionError, SessionId};
pub use executor::{Annotation, CommandExecutor, CommandOutput};
pub use launcher::{launch, ExitInfo, LaunchSpec, OutputEvent, ProcessHandle, Readiness};
pub use manager::{ManagerConfig, SessionLifecycleManager, StartOptions, StartedSession};
pub use registry::{Session, SessionRegistry, SessionSummary, NO_TARGET};

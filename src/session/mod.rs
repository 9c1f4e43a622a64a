//! Session lifecycle: metadata, the in-memory registry and the join flow

pub mod error;
pub mod model;
pub mod registry;
pub mod service;

pub use error::SessionError;
pub use model::{Session, SessionStatus};
pub use registry::{SessionHandle, SessionRegistry};
pub use service::{JoinOutcome, SessionInfo, SessionService};

//! Shell sessions
//!
//! A session is one long-lived shell plus the driver task that runs commands
//! on it. [`SessionRegistry`] is the entry point.

pub mod driver;
pub mod events;
pub mod ids;
pub mod registry;

pub use driver::{DriverOptions, SessionInfo};
pub use events::{SessionEvent, SessionEventBus, SessionSubscription};
pub use ids::{AnyId, ChatId, IdAllocator, IdKind, ProcessId, SessionId};
pub use registry::{ConnectionTarget, SessionRegistry, SpawnOptions};

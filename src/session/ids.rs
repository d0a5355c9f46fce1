//! Session, process and chat identifiers
//!
//! Each kind is its own type, so a process id can never be passed where a
//! session id is expected. Allocation goes through [`IdAllocator`], which is
//! owned by the registry and never hands out the same value twice.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub const KIND: IdKind = $kind;

            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<$name> for AnyId {
            fn from(id: $name) -> Self {
                AnyId {
                    kind: $kind,
                    id: id.0,
                }
            }
        }

        impl TryFrom<AnyId> for $name {
            type Error = AnyId;

            fn try_from(any: AnyId) -> std::result::Result<Self, AnyId> {
                if any.kind == $kind {
                    Ok(Self(any.id))
                } else {
                    Err(any)
                }
            }
        }
    };
}

/// Identifier kind tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdKind {
    Session,
    Process,
    Chat,
}

identifier!(
    /// Identifies one shell session in the registry
    SessionId,
    IdKind::Session
);
identifier!(
    /// Identifies one spawned shell process
    ProcessId,
    IdKind::Process
);
identifier!(
    /// Identifies one chat thread attached to the engine
    ChatId,
    IdKind::Chat
);

/// Kind-tagged identifier, the form ids take when they cross the UI boundary
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnyId {
    pub kind: IdKind,
    pub id: String,
}

type Generator = Box<dyn FnMut() -> String + Send>;

/// Collision-checked id source.
///
/// Every issued value stays in its kind's used set for the allocator's
/// lifetime, including ids of destroyed sessions.
pub struct IdAllocator {
    generator: Generator,
    sessions: HashSet<String>,
    processes: HashSet<String>,
    chats: HashSet<String>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::with_generator(|| Uuid::new_v4().to_string())
    }

    /// Allocator drawing raw values from `generator`
    pub fn with_generator(generator: impl FnMut() -> String + Send + 'static) -> Self {
        Self {
            generator: Box::new(generator),
            sessions: HashSet::new(),
            processes: HashSet::new(),
            chats: HashSet::new(),
        }
    }

    pub fn session_id(&mut self) -> SessionId {
        SessionId(self.allocate(IdKind::Session))
    }

    pub fn process_id(&mut self) -> ProcessId {
        ProcessId(self.allocate(IdKind::Process))
    }

    pub fn chat_id(&mut self) -> ChatId {
        ChatId(self.allocate(IdKind::Chat))
    }

    /// Number of ids issued for `kind`
    pub fn issued(&self, kind: IdKind) -> usize {
        match kind {
            IdKind::Session => self.sessions.len(),
            IdKind::Process => self.processes.len(),
            IdKind::Chat => self.chats.len(),
        }
    }

    fn allocate(&mut self, kind: IdKind) -> String {
        loop {
            let candidate = (self.generator)();
            let used = match kind {
                IdKind::Session => &mut self.sessions,
                IdKind::Process => &mut self.processes,
                IdKind::Chat => &mut self.chats,
            };
            if used.insert(candidate.clone()) {
                return candidate;
            }
            warn!("Identifier collision for {:?}: {}, regenerating", kind, candidate);
        }
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for IdAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdAllocator")
            .field("sessions", &self.sessions.len())
            .field("processes", &self.processes.len())
            .field("chats", &self.chats.len())
            .finish()
    }
}

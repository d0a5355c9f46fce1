//! Session Event System
//!
//! Push-based delivery of command output to the UI layer. Each session has
//! its own bus; subscribers only ever see events of that session.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::boundary::CommandOutcome;
use crate::session::ids::SessionId;

/// Events emitted for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Live output of the pending command
    Partial { text: String },
    /// The pending command finished; exactly one per accepted command
    Complete(CommandOutcome),
    /// Recovered protocol anomaly or session-scoped failure
    Error { detail: String },
    /// The shell process exited
    Exited { code: Option<i32> },
}

impl SessionEvent {
    pub fn is_complete(&self) -> bool {
        matches!(self, SessionEvent::Complete(_))
    }
}

/// Receiving side of a session's event stream
pub struct SessionSubscription {
    session_id: SessionId,
    receiver: broadcast::Receiver<SessionEvent>,
}

impl SessionSubscription {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Next event; `None` once the session is gone
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(
                        session_id = %self.session_id,
                        "Session event subscriber lagged by {} events", count
                    );
                }
            }
        }
    }

    /// Next event without waiting
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Empty)
                | Err(broadcast::error::TryRecvError::Closed) => return None,
                Err(broadcast::error::TryRecvError::Lagged(count)) => {
                    warn!(
                        session_id = %self.session_id,
                        "Session event subscriber lagged by {} events", count
                    );
                }
            }
        }
    }

    /// Wait for the next completion, skipping other events
    pub async fn next_completion(&mut self) -> Option<CommandOutcome> {
        while let Some(event) = self.recv().await {
            if let SessionEvent::Complete(outcome) = event {
                return Some(outcome);
            }
        }
        None
    }
}

/// Per-session publisher
#[derive(Clone)]
pub struct SessionEventBus {
    session_id: SessionId,
    sender: broadcast::Sender<SessionEvent>,
    published: Arc<AtomicUsize>,
}

impl SessionEventBus {
    pub fn new(session_id: SessionId, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            session_id,
            sender,
            published: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn subscribe(&self) -> SessionSubscription {
        SessionSubscription {
            session_id: self.session_id.clone(),
            receiver: self.sender.subscribe(),
        }
    }

    pub fn publish(&self, event: SessionEvent) {
        self.published.fetch_add(1, Ordering::Relaxed);
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Total events published so far
    pub fn published(&self) -> usize {
        self.published.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for SessionEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEventBus")
            .field("session_id", &self.session_id)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

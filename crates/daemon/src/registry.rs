//! Tracks the set of connected realtime clients.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;
use uuid::Uuid;

/// One connected client: its id and the channel its writer task drains.
pub struct ClientSession {
    id: Uuid,
    tx: mpsc::UnboundedSender<String>,
}

impl ClientSession {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

/// The set of currently connected clients.
///
/// Mutated from exactly three places: client connect, client disconnect,
/// and the broadcast loop dropping a client whose send failed.
pub struct ClientRegistry {
    sessions: Mutex<HashMap<Uuid, ClientSession>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Add a newly connected client.
    pub fn register(&self, session: ClientSession) {
        self.sessions.lock().unwrap().insert(session.id, session);
    }

    /// Remove a client. Removing an id that is already gone is a no-op.
    pub fn unregister(&self, id: Uuid) -> bool {
        self.sessions.lock().unwrap().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Senders of all current clients, for iteration outside the lock.
    pub(crate) fn snapshot(&self) -> Vec<(Uuid, mpsc::UnboundedSender<String>)> {
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .map(|(id, session)| (*id, session.tx.clone()))
            .collect()
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

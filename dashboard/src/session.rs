use std::{collections::HashMap, sync::Arc};

use envmon_common::Session;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Live sessions keyed by the opaque token handed out at login. A session
/// left alone for `idle_ms` is dropped, keys included.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<Uuid, Session>>>,
    idle_ms: u64,
}

impl SessionStore {
    pub fn new(idle_ms: u64) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            idle_ms,
        }
    }

    pub async fn create(&self, session: Session, now_ms: u64) -> Uuid {
        let token = Uuid::new_v4();
        let mut sessions = self.sessions.lock().await;
        purge_idle(&mut sessions, self.idle_ms, now_ms);
        sessions.insert(token, session);
        token
    }

    /// Snapshot of the session. The request counter inside stays shared.
    pub async fn get(&self, token: &Uuid, now_ms: u64) -> Option<Session> {
        let mut sessions = self.sessions.lock().await;
        let idle = sessions.get(token)?.idle_ms(now_ms);
        if idle >= self.idle_ms {
            sessions.remove(token);
            return None;
        }
        let session = sessions.get_mut(token)?;
        session.touch(now_ms);
        Some(session.clone())
    }

    pub async fn update<R>(&self, token: &Uuid, apply: impl FnOnce(&mut Session) -> R) -> Option<R> {
        self.sessions.lock().await.get_mut(token).map(apply)
    }

    pub async fn remove(&self, token: &Uuid) -> Option<Session> {
        self.sessions.lock().await.remove(token)
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

fn purge_idle(sessions: &mut HashMap<Uuid, Session>, idle_ms: u64, now_ms: u64) {
    sessions.retain(|_, session| session.idle_ms(now_ms) < idle_ms);
}

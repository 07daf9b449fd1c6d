use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::LandwatchError;
use crate::services::ImageStore;

/// Time boundary separating an owner's current realtime results from older
/// ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub owner: String,
    pub started_at: DateTime<Utc>,
}

impl Session {
    /// A session starting now. Not active until installed in a registry.
    pub fn new(owner: &str) -> Self {
        Self {
            id: Uuid::now_v7(),
            owner: owner.to_string(),
            started_at: Utc::now(),
        }
    }
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
    store: Arc<dyn ImageStore>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn ImageStore>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            store,
        }
    }

    /// Replace any existing session for `owner` with a new one starting now.
    pub async fn start_session(&self, owner: &str) -> Session {
        let session = Session::new(owner);
        self.install(session.clone()).await;
        session
    }

    /// Make `session` the active one for its owner.
    pub async fn install(&self, session: Session) {
        let owner = session.owner.clone();
        let previous = self.sessions.write().await.insert(owner.clone(), session);
        if let Some(previous) = previous {
            debug!(target: "session", "Replaced session {} for {}", previous.id, owner);
        }
    }

    pub async fn current(&self, owner: &str) -> Option<Session> {
        self.sessions.read().await.get(owner).cloned()
    }

    /// Filenames of the owner's records processed since the session began,
    /// oldest first and without repeats.
    pub async fn images_since(
        &self,
        owner: &str,
        session: &Session,
    ) -> Result<Vec<String>, LandwatchError> {
        let records = self.store.find_since(owner, session.started_at).await?;
        let mut seen = HashSet::new();
        Ok(records
            .into_iter()
            .filter_map(|record| seen.insert(record.filename.clone()).then_some(record.filename))
            .collect())
    }

    pub async fn current_images(&self, owner: &str) -> Result<Vec<String>, LandwatchError> {
        match self.current(owner).await {
            Some(session) => self.images_since(owner, &session).await,
            None => Ok(Vec::new()),
        }
    }
}

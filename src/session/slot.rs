use std::sync::Arc;

use tokio::sync::Mutex;

use crate::auth::{SecureTokenStore, REFRESH_TOKEN_KEY};

use super::state::SessionStateMachine;

/// The persisted refresh-token slot.
///
/// All access is best-effort: failures are logged, never returned. Writes
/// and deletes are serialized through one lane, and writes re-check the
/// session generation inside it, so a delete issued after a reset cannot
/// be overtaken by a write from the previous session.
pub struct RefreshTokenSlot {
    store: Arc<dyn SecureTokenStore>,
    lane: Mutex<()>,
}

impl RefreshTokenSlot {
    pub fn new(store: Arc<dyn SecureTokenStore>) -> Self {
        Self {
            store,
            lane: Mutex::new(()),
        }
    }

    /// Read the persisted token. Read failures count as "no token".
    pub async fn load(&self) -> Option<String> {
        match self.store.get(REFRESH_TOKEN_KEY).await {
            Ok(value) => value.filter(|token| !token.is_empty()),
            Err(err) => {
                tracing::warn!(error = %err, "failed to read persisted refresh token");
                None
            }
        }
    }

    /// Persist `token` unless the session has moved past `generation`.
    pub async fn persist(&self, state: &SessionStateMachine, generation: u64, token: &str) {
        let _lane = self.lane.lock().await;
        if state.generation() != generation {
            tracing::debug!(generation, "skipping refresh token write for a superseded session");
            return;
        }
        if let Err(err) = self.store.set(REFRESH_TOKEN_KEY, token).await {
            tracing::warn!(error = %err, "failed to persist refresh token");
        }
    }

    /// Remove the persisted token.
    ///
    /// When the store refuses the delete, the slot is overwritten with an
    /// empty value, which [`load`](Self::load) treats as absent.
    pub async fn clear(&self) {
        let _lane = self.lane.lock().await;
        let Err(err) = self.store.delete(REFRESH_TOKEN_KEY).await else {
            return;
        };
        tracing::warn!(error = %err, "failed to delete persisted refresh token");
        if let Err(err) = self.store.set(REFRESH_TOKEN_KEY, "").await {
            tracing::warn!(error = %err, "failed to blank persisted refresh token");
        }
    }
}

use std::sync::Arc;

use crate::auth::{BrowserResult, PresentationOptions};

use super::SessionCore;

/// Tears the session down locally and at the issuer.
pub struct LogoutCoordinator {
    core: Arc<SessionCore>,
}

impl LogoutCoordinator {
    pub(crate) fn new(core: Arc<SessionCore>) -> Self {
        Self { core }
    }

    /// Log out. Never fails.
    ///
    /// The local reset happens first and unconditionally; it also bumps the
    /// generation, so an in-flight refresh or login cannot bring the session
    /// back or rewrite the slot after it has been cleared below. The remote
    /// logout page and the slot delete are both best-effort.
    pub async fn logout(&self) {
        let core = &self.core;
        let generation = core.state.reset();
        tracing::debug!(generation, "session reset for logout");

        match core.config.logout_url() {
            Ok(url) => {
                let outcome = core
                    .browser
                    .open(url.as_str(), &PresentationOptions::default())
                    .await;
                if let BrowserResult::Error { description } = outcome {
                    tracing::warn!(
                        description = description.as_deref().unwrap_or("unknown"),
                        "remote logout failed"
                    );
                }
            }
            Err(err) => tracing::warn!(error = %err, "cannot build logout URL"),
        }

        core.slot.clear().await;
    }
}

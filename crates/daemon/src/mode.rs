//! Operating mode controller: auto vs. approval-gated.

use std::sync::Arc;
use std::sync::RwLock;

use tracing::info;

use pincraft_core::DaemonMode;
use pincraft_store::{StateStore, StoreError};

/// Holds the current operating mode and keeps it durable.
///
/// Switching from approve to auto never auto-executes offers already
/// queued for approval; they wait for an explicit approve call.
pub struct ModeController {
    store: Arc<StateStore>,
    mode: RwLock<DaemonMode>,
}

impl ModeController {
    pub fn new(store: Arc<StateStore>, initial: DaemonMode) -> Self {
        Self {
            store,
            mode: RwLock::new(initial),
        }
    }

    /// Re-read the persisted mode; used once at startup after seeding.
    pub async fn restore(&self) -> Result<(), StoreError> {
        let persisted = self.store.get_daemon_config().await?.mode;
        *self.mode.write().expect("mode lock") = persisted;
        Ok(())
    }

    pub fn get_mode(&self) -> DaemonMode {
        *self.mode.read().expect("mode lock")
    }

    /// Change the mode durably; takes effect on the next event processed.
    pub async fn set_mode(&self, mode: DaemonMode) -> Result<(), StoreError> {
        self.store.set_daemon_config(Some(mode), None, None).await?;
        let old = {
            let mut guard = self.mode.write().expect("mode lock");
            std::mem::replace(&mut *guard, mode)
        };
        if old != mode {
            info!(from = %old, to = %mode, "mode changed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mode_persists_across_controllers() {
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        let ctrl = ModeController::new(store.clone(), DaemonMode::Auto);
        assert_eq!(ctrl.get_mode(), DaemonMode::Auto);

        ctrl.set_mode(DaemonMode::Approve).await.unwrap();
        assert_eq!(ctrl.get_mode(), DaemonMode::Approve);

        // A fresh controller restores the persisted value.
        let ctrl2 = ModeController::new(store, DaemonMode::Auto);
        ctrl2.restore().await.unwrap();
        assert_eq!(ctrl2.get_mode(), DaemonMode::Approve);
    }
}

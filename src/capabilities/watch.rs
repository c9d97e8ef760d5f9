use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::DomError;

/// A page region whose mutations should re-trigger overlay protection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchRegion {
    pub selector: String,
    pub subtree: bool,
}

impl WatchRegion {
    #[must_use]
    pub fn subtree(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            subtree: true,
        }
    }
}

pub type ViolationHandler = Arc<dyn Fn() + Send + Sync>;

/// A live observation. Disconnecting twice is harmless.
pub trait WatchHandle: Send + Sync {
    fn disconnect(&mut self) -> Result<(), DomError>;
}

#[async_trait]
pub trait RegionWatcher: Send + Sync {
    async fn watch(
        &self,
        region: &WatchRegion,
        on_violation: ViolationHandler,
    ) -> Result<Box<dyn WatchHandle>, DomError>;
}

/// For hosts without a mutation observer.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopWatcher;

#[derive(Debug, Default)]
struct NoopHandle;

impl WatchHandle for NoopHandle {
    fn disconnect(&mut self) -> Result<(), DomError> {
        Ok(())
    }
}

#[async_trait]
impl RegionWatcher for NoopWatcher {
    async fn watch(
        &self,
        _region: &WatchRegion,
        _on_violation: ViolationHandler,
    ) -> Result<Box<dyn WatchHandle>, DomError> {
        Ok(Box::new(NoopHandle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_watcher_hands_out_disconnectable_handle() {
        let mut handle = NoopWatcher
            .watch(&WatchRegion::subtree(".modal"), Arc::new(|| {}))
            .await
            .unwrap();
        assert!(handle.disconnect().is_ok());
        assert!(handle.disconnect().is_ok());
    }
}

//! Hosted services: singletons instantiated and started eagerly at
//! container startup rather than lazily on first resolution.

use async_trait::async_trait;

use crate::error::DiResult;

/// Implemented by services that need explicit start/stop hooks run by the
/// host during startup and graceful shutdown. Both methods default to a
/// no-op, so a hosted service with nothing to do at startup need not
/// override either.
#[async_trait]
pub trait HostedService: Send + Sync {
    /// Called once, after construction, in priority order.
    async fn start(&self) -> DiResult<()> {
        Ok(())
    }

    /// Called once, in reverse of start order, during shutdown.
    async fn stop(&self) -> DiResult<()> {
        Ok(())
    }
}

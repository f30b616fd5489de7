//! Reporting for failures that are deliberately not propagated.
//!
//! Cache writes after a successful store write, cache invalidations and click
//! flushes are best effort: their errors never reach the caller. They are
//! handed to an [`Observer`] instead so they stay visible.

use crate::Error;

/// Receives errors swallowed at best-effort call sites.
pub trait Observer: Send + Sync {
    /// `site` names the call site, e.g. `"cache.populate"`.
    fn report(&self, site: &'static str, err: &Error);
}

/// Logs suppressed errors with `tracing` at WARN.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn report(&self, site: &'static str, err: &Error) {
        tracing::warn!(site, error = %err, "suppressed error");
    }
}

/// Call sites reported through [`Observer`].
pub mod sites {
    pub const CACHE_READ: &str = "cache.read";
    pub const CACHE_POPULATE: &str = "cache.populate";
    pub const CACHE_INVALIDATE: &str = "cache.invalidate";
    pub const CLICK_FLUSH: &str = "clicks.flush";
}
